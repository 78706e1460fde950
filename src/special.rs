//! Special pages.
//!
//! Special pages are virtual titles in the `Special` namespace served by
//! handlers rather than the revision store. The dispatcher authorizes the
//! principal against the handler’s declared permissions, then delegates.
//! Handlers either redirect (the post/redirect/get pattern ends successful
//! POSTs on a `?done=true` URL) or return a context map for the view layer.

use crate::{
    auth::{AccessError, perms},
    config,
    db::{self, Repository, models::{MaskAction, User}},
    title::{self, Namespace},
};
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::sync::LazyLock;
use time::format_description::well_known::Rfc3339;

/// Grouping of special pages in the `SpecialPages` listing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Section {
    /// Page listings.
    PageLists,
    /// Page operations.
    PageOperations,
    /// User-related pages.
    Users,
    /// Everything else.
    Other,
}

impl Section {
    /// The canonical string form.
    fn as_str(self) -> &'static str {
        match self {
            Section::PageLists => "page_lists",
            Section::PageOperations => "page_operations",
            Section::Users => "users",
            Section::Other => "other",
        }
    }
}

/// What a handler asks the HTTP layer to do.
#[derive(Debug)]
pub enum Outcome {
    /// Redirect to the given full title with extra query parameters.
    Redirect {
        /// The target full title.
        page_title: String,
        /// Extra query parameters.
        params: Vec<(String, String)>,
    },
    /// Render the special page with this view data.
    Context(IndexMap<String, Value>),
}

impl Outcome {
    /// A redirect back to a special page with `done=true` set.
    fn done(name: &str, args: &[&str]) -> Self {
        let mut page_title = format!("Special:{name}");
        for arg in args {
            page_title.push('/');
            page_title += arg;
        }
        Outcome::Redirect {
            page_title,
            params: vec![("done".to_string(), "true".to_string())],
        }
    }
}

/// The request data a handler sees.
#[derive(Debug)]
pub struct RequestParams<'a> {
    /// The acting principal.
    pub user: &'a User,
    /// Whether the request was a POST.
    pub is_post: bool,
    /// Query and form parameters, merged.
    pub params: &'a IndexMap<String, String>,
}

impl RequestParams<'_> {
    /// Fetches a parameter.
    fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Fetches a parameter, treating the empty string as absent.
    fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|value| !value.is_empty())
    }

    /// Whether a checkbox-style parameter is set.
    fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some("1" | "true" | "on" | "yes"))
    }
}

/// Errors surfaced by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No special page has this name.
    #[error("no special page named '{0}'")]
    NotFound(String),
    /// The principal may not access the page.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// A repository operation failed.
    #[error(transparent)]
    Db(#[from] db::Error),
}

/// The function signature of a special page handler.
type HandlerFn = fn(&Repository, &RequestParams<'_>, &[&str]) -> Result<Outcome, DispatchError>;

/// A special page definition.
pub struct SpecialPage {
    /// The page name, matched against the title’s base name.
    pub name: &'static str,
    /// Permissions required to access the page.
    pub required_perms: &'static [&'static str],
    /// The access key for menu links pointing at this page.
    pub access_key: Option<&'static str>,
    /// The page’s category in listings.
    pub category: Section,
    /// The implementation.
    handler: HandlerFn,
}

impl SpecialPage {
    /// Checks whether the given user may access this page.
    pub fn can_user_access(&self, user: &User) -> bool {
        self.required_perms.iter().all(|p| user.has_permission(p))
    }
}

impl core::fmt::Debug for SpecialPage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpecialPage")
            .field("name", &self.name)
            .field("required_perms", &self.required_perms)
            .finish_non_exhaustive()
    }
}

/// The special page registry, in listing order. Built once at start-up.
pub fn registry() -> &'static IndexMap<&'static str, SpecialPage> {
    static REGISTRY: LazyLock<IndexMap<&'static str, SpecialPage>> = LazyLock::new(|| {
        let pages = [
            SpecialPage {
                name: "Contributions",
                required_perms: &[],
                access_key: Some("c"),
                category: Section::Users,
                handler: contributions,
            },
            SpecialPage {
                name: "Subpages",
                required_perms: &[],
                access_key: None,
                category: Section::PageLists,
                handler: subpages,
            },
            SpecialPage {
                name: "RandomPage",
                required_perms: &[],
                access_key: Some("x"),
                category: Section::PageLists,
                handler: random_page,
            },
            SpecialPage {
                name: "RecentChanges",
                required_perms: &[],
                access_key: Some("r"),
                category: Section::PageLists,
                handler: recent_changes,
            },
            SpecialPage {
                name: "Mute",
                required_perms: &[],
                access_key: None,
                category: Section::Users,
                handler: mute,
            },
            SpecialPage {
                name: "SendEmail",
                required_perms: &[],
                access_key: None,
                category: Section::Users,
                handler: send_email,
            },
            SpecialPage {
                name: "EditFollowList",
                required_perms: &[],
                access_key: None,
                category: Section::Users,
                handler: edit_follow_list,
            },
            SpecialPage {
                name: "DeletePage",
                required_perms: &[perms::WIKI_DELETE],
                access_key: Some("d"),
                category: Section::PageOperations,
                handler: delete_page,
            },
            SpecialPage {
                name: "RenamePage",
                required_perms: &[perms::WIKI_RENAME],
                access_key: Some("a"),
                category: Section::PageOperations,
                handler: rename_page,
            },
            SpecialPage {
                name: "ProtectPage",
                required_perms: &[perms::WIKI_PROTECT],
                access_key: Some("p"),
                category: Section::PageOperations,
                handler: protect_page,
            },
            SpecialPage {
                name: "ChangePageLanguage",
                required_perms: &[],
                access_key: None,
                category: Section::PageOperations,
                handler: change_page_language,
            },
            SpecialPage {
                name: "ChangePageContentType",
                required_perms: &[],
                access_key: None,
                category: Section::PageOperations,
                handler: change_page_content_type,
            },
            SpecialPage {
                name: "MaskRevisions",
                required_perms: &[perms::WIKI_MASK],
                access_key: None,
                category: Section::PageOperations,
                handler: mask_revisions,
            },
            SpecialPage {
                name: "SpecialPages",
                required_perms: &[],
                access_key: None,
                category: Section::Other,
                handler: special_pages,
            },
        ];
        pages.into_iter().map(|page| (page.name, page)).collect()
    });
    &REGISTRY
}

/// Routes a `Special:` title to its handler.
///
/// The title’s base name selects the handler; the remaining `/`-separated
/// segments become the handler’s positional arguments.
pub fn dispatch(
    repo: &Repository,
    request: &RequestParams<'_>,
    page_title: &str,
) -> Result<Outcome, DispatchError> {
    let mut segments = page_title.split('/');
    let base = segments.next().unwrap_or(page_title);
    let args = segments.collect::<Vec<_>>();

    let page = registry()
        .get(base)
        .ok_or_else(|| DispatchError::NotFound(base.to_string()))?;

    let missing = page
        .required_perms
        .iter()
        .filter(|p| !request.user.has_permission(p))
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(AccessError::MissingPermission(missing).into());
    }

    (page.handler)(repo, request, &args)
}

/// Resolves handler arguments into a `(namespace, title)` pair.
fn page_arg(args: &[&str]) -> Result<(&'static Namespace, String), DispatchError> {
    let raw = args.join("/");
    let canonical = title::canonicalize(&raw)
        .map_err(|_| DispatchError::NotFound(raw.clone()))?;
    let (ns, name) = title::split_title(&canonical);
    if name.is_empty() {
        return Err(DispatchError::NotFound(raw));
    }
    Ok((ns, name))
}

/// A revision summarized for view data. Masked usernames and comments come
/// out null.
fn revision_json(repo: &Repository, revision: &db::models::Revision) -> Value {
    let ns = Namespace::find_by_id(revision.namespace_id).unwrap_or_else(Namespace::main);
    let author = repo
        .user_by_id(revision.author_id)
        .filter(|author| !author.hide_username)
        .map(|author| author.username);
    json!({
        "id": revision.id,
        "page": ns.full_title(&revision.title),
        "date": revision.date.format(&Rfc3339).unwrap_or_default(),
        "author": author,
        "comment": if revision.comment_hidden { Value::Null } else { json!(revision.comment) },
        "minor": revision.is_minor,
        "bot": revision.is_bot,
        "tags": revision.tags,
        "size": revision.byte_size(),
    })
}

/// `Special:Contributions/<user>` — a user’s visible edits.
fn contributions(
    repo: &Repository,
    _request: &RequestParams<'_>,
    args: &[&str],
) -> Result<Outcome, DispatchError> {
    let username = args.first().copied().unwrap_or_default();
    let revisions = repo
        .contributions(username)
        .iter()
        .map(|revision| revision_json(repo, revision))
        .collect::<Vec<_>>();
    let mut context = IndexMap::new();
    context.insert("target_user".to_string(), json!(username));
    context.insert(
        "user_exists".to_string(),
        json!(repo.user_by_name(username).is_some()),
    );
    context.insert("contributions".to_string(), Value::Array(revisions));
    Ok(Outcome::Context(context))
}

/// `Special:Subpages/<page>` — subpages of a page.
fn subpages(
    repo: &Repository,
    _request: &RequestParams<'_>,
    args: &[&str],
) -> Result<Outcome, DispatchError> {
    let (ns, name) = page_arg(args)?;
    let titles = repo
        .subpages(ns, &name)
        .iter()
        .map(|page| json!(page.full_title()))
        .collect::<Vec<_>>();
    let mut context = IndexMap::new();
    context.insert("target_page".to_string(), json!(ns.full_title(&name)));
    context.insert("subpages".to_string(), Value::Array(titles));
    Ok(Outcome::Context(context))
}

/// `Special:RandomPage` — redirect to a random content page.
fn random_page(
    repo: &Repository,
    _request: &RequestParams<'_>,
    _args: &[&str],
) -> Result<Outcome, DispatchError> {
    let page_title = repo
        .random_page()
        .map_or_else(|| config::MAIN_PAGE_TITLE.to_string(), |page| page.full_title());
    Ok(Outcome::Redirect {
        page_title,
        params: Vec::new(),
    })
}

/// `Special:RecentChanges` — latest visible edits.
fn recent_changes(
    repo: &Repository,
    request: &RequestParams<'_>,
    _args: &[&str],
) -> Result<Outcome, DispatchError> {
    let limit = request
        .get("results_per_page")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(50)
        .clamp(20, 500);
    let revisions = repo
        .recent_changes(limit)
        .iter()
        .map(|revision| revision_json(repo, revision))
        .collect::<Vec<_>>();
    let journal = repo
        .logs()
        .iter()
        .rev()
        .take(limit)
        .map(|entry| {
            json!({
                "date": entry.date.format(&Rfc3339).unwrap_or_default(),
                "description": entry.kind.describe(),
            })
        })
        .collect::<Vec<_>>();
    let mut context = IndexMap::new();
    context.insert("changes".to_string(), Value::Array(revisions));
    context.insert("journal".to_string(), Value::Array(journal));
    Ok(Outcome::Context(context))
}

/// `Special:Mute/<user>` — toggle notification muting of another user.
fn mute(
    repo: &Repository,
    request: &RequestParams<'_>,
    args: &[&str],
) -> Result<Outcome, DispatchError> {
    let target = args.first().copied().unwrap_or_default();
    if request.is_post {
        repo.set_user_muted(request.user.id, target, request.flag("mute"))?;
        return Ok(Outcome::done("Mute", args));
    }
    let mut context = IndexMap::new();
    context.insert("target_user".to_string(), json!(target));
    context.insert(
        "muted".to_string(),
        json!(request.user.muted_users.iter().any(|name| name == target)),
    );
    Ok(Outcome::Context(context))
}

/// `Special:SendEmail/<user>` — compose form context. Delivery itself is the
/// mailer’s concern, not the wiki core’s.
fn send_email(
    repo: &Repository,
    request: &RequestParams<'_>,
    args: &[&str],
) -> Result<Outcome, DispatchError> {
    let target = args.first().copied().unwrap_or_default();
    if request.is_post && repo.user_by_name(target).is_some() {
        return Ok(Outcome::done("SendEmail", args));
    }
    let mut context = IndexMap::new();
    context.insert("target_user".to_string(), json!(target));
    context.insert(
        "user_exists".to_string(),
        json!(repo.user_by_name(target).is_some()),
    );
    Ok(Outcome::Context(context))
}

/// `Special:EditFollowList[/raw|/clear]` — view and edit the follow list.
fn edit_follow_list(
    repo: &Repository,
    request: &RequestParams<'_>,
    args: &[&str],
) -> Result<Outcome, DispatchError> {
    let mode = args.first().copied().unwrap_or_default();
    let user = request.user;

    if request.is_post {
        match mode {
            "clear" => {
                repo.clear_follow_list(user.id);
            }
            "raw" => {
                // The raw editor replaces the whole list with one title per
                // line; unparseable lines are skipped.
                repo.clear_follow_list(user.id);
                for line in request.get("titles").unwrap_or_default().lines() {
                    if let Ok(canonical) = title::canonicalize(line) {
                        let (ns, name) = title::split_title(&canonical);
                        if !name.is_empty() && ns.id != Namespace::SPECIAL {
                            repo.follow(user, ns, &name, true)?;
                        }
                    }
                }
            }
            _ => {
                if let Some(raw) = request.get_non_empty("unfollow")
                    && let Ok(canonical) = title::canonicalize(raw)
                {
                    let (ns, name) = title::split_title(&canonical);
                    repo.follow(user, ns, &name, false)?;
                }
            }
        }
        return Ok(Outcome::done("EditFollowList", &[]));
    }

    let entries = repo
        .follow_list(user.id)
        .iter()
        .map(|status| {
            let ns = Namespace::find_by_id(status.namespace_id).unwrap_or_else(Namespace::main);
            json!(ns.full_title(&status.title))
        })
        .collect::<Vec<_>>();
    let mut context = IndexMap::new();
    context.insert("mode".to_string(), json!(mode));
    context.insert("followed_pages".to_string(), Value::Array(entries));
    Ok(Outcome::Context(context))
}

/// `Special:DeletePage/<page>` — delete a page.
fn delete_page(
    repo: &Repository,
    request: &RequestParams<'_>,
    args: &[&str],
) -> Result<Outcome, DispatchError> {
    let (ns, name) = page_arg(args)?;
    if request.is_post {
        repo.delete(request.user, ns, &name, request.get_non_empty("reason"))?;
        return Ok(Outcome::done("DeletePage", args));
    }
    let mut context = IndexMap::new();
    context.insert("target_page".to_string(), json!(ns.full_title(&name)));
    context.insert("page_exists".to_string(), json!(repo.get(ns, &name).exists));
    Ok(Outcome::Context(context))
}

/// `Special:RenamePage/<page>` — rename a page, optionally leaving a
/// redirect behind.
fn rename_page(
    repo: &Repository,
    request: &RequestParams<'_>,
    args: &[&str],
) -> Result<Outcome, DispatchError> {
    let (ns, name) = page_arg(args)?;
    if request.is_post {
        let raw_target = request.get_non_empty("new_title").unwrap_or_default();
        let new_title = title::canonicalize(raw_target)
            .map_err(|_| DispatchError::NotFound(raw_target.to_string()))?;
        repo.rename(
            request.user,
            ns,
            &name,
            &new_title,
            request.flag("leave_redirect"),
            request.get_non_empty("reason"),
        )?;
        return Ok(Outcome::Redirect {
            page_title: ns.full_title(&new_title),
            params: vec![("done".to_string(), "true".to_string())],
        });
    }
    let mut context = IndexMap::new();
    context.insert("target_page".to_string(), json!(ns.full_title(&name)));
    context.insert(
        "can_leave_redirect".to_string(),
        json!(request.user.has_permission(perms::WIKI_DELETE)),
    );
    Ok(Outcome::Context(context))
}

/// `Special:ProtectPage/<page>` — restrict edits to a group.
fn protect_page(
    repo: &Repository,
    request: &RequestParams<'_>,
    args: &[&str],
) -> Result<Outcome, DispatchError> {
    let (ns, name) = page_arg(args)?;
    if request.is_post {
        let end_date = request
            .get_non_empty("end_date")
            .and_then(|raw| time::OffsetDateTime::parse(raw, &Rfc3339).ok());
        repo.protect(
            request.user,
            ns,
            &name,
            request.get_non_empty("level").unwrap_or("all"),
            request.flag("protect_talks"),
            request.get_non_empty("reason"),
            end_date,
        )?;
        return Ok(Outcome::done("ProtectPage", args));
    }
    let mut context = IndexMap::new();
    context.insert("target_page".to_string(), json!(ns.full_title(&name)));
    context.insert("groups".to_string(), json!(repo.group_labels()));
    context.insert(
        "current_level".to_string(),
        json!(repo
            .protection(ns.id, &name)
            .map(|protection| protection.protection_level)),
    );
    Ok(Outcome::Context(context))
}

/// `Special:ChangePageLanguage/<page>` — change a page’s content language.
fn change_page_language(
    repo: &Repository,
    request: &RequestParams<'_>,
    args: &[&str],
) -> Result<Outcome, DispatchError> {
    let (ns, name) = page_arg(args)?;
    if request.is_post {
        repo.set_content_language(
            request.user,
            ns,
            &name,
            request.get_non_empty("language").unwrap_or_default(),
            request.get_non_empty("reason"),
        )?;
        return Ok(Outcome::done("ChangePageLanguage", args));
    }
    let mut context = IndexMap::new();
    context.insert("target_page".to_string(), json!(ns.full_title(&name)));
    context.insert(
        "current_language".to_string(),
        json!(repo.get(ns, &name).content_language),
    );
    context.insert(
        "languages".to_string(),
        json!(config::LANGUAGES.iter().map(|l| l.code).collect::<Vec<_>>()),
    );
    Ok(Outcome::Context(context))
}

/// `Special:ChangePageContentType/<page>` — change a page’s content model.
fn change_page_content_type(
    repo: &Repository,
    request: &RequestParams<'_>,
    args: &[&str],
) -> Result<Outcome, DispatchError> {
    let (ns, name) = page_arg(args)?;
    if request.is_post {
        let raw = request.get_non_empty("content_type").unwrap_or_default();
        let content_type = raw
            .parse()
            .map_err(|_| DispatchError::NotFound(raw.to_string()))?;
        repo.set_content_type(request.user, ns, &name, content_type, request.get_non_empty("reason"))?;
        return Ok(Outcome::done("ChangePageContentType", args));
    }
    let mut context = IndexMap::new();
    context.insert("target_page".to_string(), json!(ns.full_title(&name)));
    context.insert(
        "current_content_type".to_string(),
        json!(repo.get(ns, &name).content_type.as_str()),
    );
    Ok(Outcome::Context(context))
}

/// `Special:MaskRevisions/<ids…>` — mask or unmask revisions.
fn mask_revisions(
    repo: &Repository,
    request: &RequestParams<'_>,
    args: &[&str],
) -> Result<Outcome, DispatchError> {
    let ids = args
        .iter()
        .filter_map(|arg| arg.parse::<u64>().ok())
        .collect::<Vec<_>>();
    if request.is_post {
        let action = match request.get("mask_action") {
            Some("mask_fully") => MaskAction::MaskFully,
            Some("mask_comments_only") => MaskAction::MaskCommentsOnly,
            Some("unmask_all") => MaskAction::UnmaskAll,
            Some("unmask_all_but_comments") => MaskAction::UnmaskAllButComments,
            other => {
                return Err(DispatchError::NotFound(
                    other.unwrap_or("mask_action").to_string(),
                ));
            }
        };
        repo.mask_revisions(request.user, &ids, action, request.get_non_empty("reason"))?;
        return Ok(Outcome::done("MaskRevisions", args));
    }
    let revisions = ids
        .iter()
        .filter_map(|id| repo.revision(*id))
        .map(|revision| revision_json(repo, &revision))
        .collect::<Vec<_>>();
    let mut context = IndexMap::new();
    context.insert("revisions".to_string(), Value::Array(revisions));
    Ok(Outcome::Context(context))
}

/// `Special:SpecialPages` — list every special page the user can access.
fn special_pages(
    _repo: &Repository,
    request: &RequestParams<'_>,
    _args: &[&str],
) -> Result<Outcome, DispatchError> {
    let pages = registry()
        .values()
        .map(|page| {
            json!({
                "name": page.name,
                "category": page.category.as_str(),
                "access_key": page.access_key,
                "accessible": page.can_user_access(request.user),
            })
        })
        .collect::<Vec<_>>();
    let mut context = IndexMap::new();
    context.insert("special_pages".to_string(), Value::Array(pages));
    Ok(Outcome::Context(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EditRequest;

    fn params() -> IndexMap<String, String> {
        IndexMap::new()
    }

    fn get_request<'a>(user: &'a User, params: &'a IndexMap<String, String>) -> RequestParams<'a> {
        RequestParams {
            user,
            is_post: false,
            params,
        }
    }

    #[test]
    fn unknown_special_page_is_not_found() {
        let repo = Repository::new();
        let user = repo.anonymous_principal("10.0.0.1");
        let params = params();
        assert!(matches!(
            dispatch(&repo, &get_request(&user, &params), "NoSuchPage"),
            Err(DispatchError::NotFound(_))
        ));
    }

    #[test]
    fn permissions_gate_page_operations() {
        let repo = Repository::new();
        let user = repo.anonymous_principal("10.0.0.1");
        let params = params();
        assert!(matches!(
            dispatch(&repo, &get_request(&user, &params), "DeletePage/Sandbox"),
            Err(DispatchError::Access(AccessError::MissingPermission(_)))
        ));
    }

    #[test]
    fn random_page_redirects_to_main_page_when_empty() {
        let repo = Repository::new();
        let user = repo.anonymous_principal("10.0.0.1");
        let params = params();
        match dispatch(&repo, &get_request(&user, &params), "RandomPage").unwrap() {
            Outcome::Redirect { page_title, .. } => {
                assert_eq!(page_title, config::MAIN_PAGE_TITLE);
            }
            Outcome::Context(_) => panic!("expected a redirect"),
        }
    }

    #[test]
    fn delete_page_posts_then_redirects_done() {
        let repo = Repository::new();
        let author = repo.anonymous_principal("10.0.0.1");
        repo.edit(EditRequest {
            author: &author,
            namespace: Namespace::main(),
            title: "Doomed".to_string(),
            content: "x".to_string(),
            comment: None,
            minor: false,
            follow: false,
            hidden_category: None,
            base_revision_id: None,
        })
        .unwrap();

        let admin_id = repo.create_user("Root").unwrap();
        repo.add_user_to_group(None, admin_id, "administrator", None).unwrap();
        let admin = repo.user_by_id(admin_id).unwrap();

        let params = params();
        let request = RequestParams {
            user: &admin,
            is_post: true,
            params: &params,
        };
        match dispatch(&repo, &request, "DeletePage/Doomed").unwrap() {
            Outcome::Redirect { page_title, params } => {
                assert_eq!(page_title, "Special:DeletePage/Doomed");
                assert!(params.contains(&("done".to_string(), "true".to_string())));
            }
            Outcome::Context(_) => panic!("expected a redirect"),
        }
        assert!(!repo.get(Namespace::main(), "Doomed").exists);
    }

    #[test]
    fn contributions_lists_visible_edits() {
        let repo = Repository::new();
        let author_id = repo.create_user("Ada").unwrap();
        let author = repo.user_by_id(author_id).unwrap();
        repo.edit(EditRequest {
            author: &author,
            namespace: Namespace::main(),
            title: "Engines".to_string(),
            content: "steam".to_string(),
            comment: Some("start".to_string()),
            minor: false,
            follow: false,
            hidden_category: None,
            base_revision_id: None,
        })
        .unwrap();

        let params = params();
        match dispatch(&repo, &get_request(&author, &params), "Contributions/Ada").unwrap() {
            Outcome::Context(context) => {
                let list = context["contributions"].as_array().unwrap();
                assert_eq!(list.len(), 1);
                assert_eq!(list[0]["page"], "Engines");
                assert_eq!(list[0]["author"], "Ada");
            }
            Outcome::Redirect { .. } => panic!("expected context"),
        }
    }

    #[test]
    fn special_pages_lists_accessibility() {
        let repo = Repository::new();
        let user = repo.anonymous_principal("10.0.0.1");
        let params = params();
        match dispatch(&repo, &get_request(&user, &params), "SpecialPages").unwrap() {
            Outcome::Context(context) => {
                let list = context["special_pages"].as_array().unwrap();
                assert_eq!(list.len(), registry().len());
                let delete = list
                    .iter()
                    .find(|entry| entry["name"] == "DeletePage")
                    .unwrap();
                assert_eq!(delete["accessible"], false);
            }
            Outcome::Redirect { .. } => panic!("expected context"),
        }
    }
}
