//! Routes for axum.

use crate::{
    AppState, auth,
    common,
    config,
    db::{self, EditRequest, models::User},
    parser, special,
    title::{self, Namespace, TitleError},
};
use axum::{
    Form,
    extract::{ConnectInfo, Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use indexmap::IndexMap;
use sailfish::TemplateSimple;
use std::net::SocketAddr;
use time::format_description::well_known::Rfc3339;

/// All errors that may occur while serving a wiki page.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// A repository error.
    #[error(transparent)]
    Db(#[from] db::Error),
    /// A special page dispatch error.
    #[error(transparent)]
    Dispatch(#[from] special::DispatchError),
    /// A templating engine error.
    #[error(transparent)]
    Template(#[from] sailfish::RenderError),
}

impl Error {
    /// The status code the error maps to.
    fn status(&self) -> StatusCode {
        match self {
            Error::Db(err) | Error::Dispatch(special::DispatchError::Db(err)) => db_status(err),
            Error::Dispatch(special::DispatchError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Dispatch(special::DispatchError::Access(_)) => StatusCode::FORBIDDEN,
            Error::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The status code a repository error maps to.
fn db_status(err: &db::Error) -> StatusCode {
    match err {
        db::Error::Access(_) => StatusCode::FORBIDDEN,
        db::Error::PageDoesNotExist(_)
        | db::Error::RevisionDoesNotExist(_)
        | db::Error::NoRevisions => StatusCode::NOT_FOUND,
        db::Error::ConcurrentEdit => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        error_page(status, &self.to_string())
    }
}

/// Renders the standard error shell with the given status.
fn error_page(status: StatusCode, message: &str) -> Response {
    #[derive(TemplateSimple)]
    #[template(path = "error.html")]
    struct ErrorTemplate<'a> {
        /// The name of the wiki.
        site: &'a str,
        /// The error text.
        message: &'a str,
    }

    let body = ErrorTemplate {
        site: &config::site().name,
        message,
    }
    .render_once()
    .unwrap_or_else(|_| message.to_string());
    (status, Html(body)).into_response()
}

/// The per-request view of query and form parameters.
type Params = IndexMap<String, String>;

/// Looks up a parameter, treating the empty string as absent.
fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str).filter(|value| !value.is_empty())
}

/// Whether a checkbox-style parameter is set.
fn flag(params: &Params, name: &str) -> bool {
    matches!(params.get(name).map(String::as_str), Some("1" | "true" | "on" | "yes"))
}

/// The actions supported by the main wiki view.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Action {
    /// Render the page.
    #[default]
    Read,
    /// Show the edit form.
    Edit,
    /// Commit an edit.
    Submit,
    /// Show the revision history.
    History,
    /// Show the talk threads.
    Talk,
    /// Show page information.
    Info,
    /// Serve the raw content.
    Raw,
}

impl Action {
    /// Parses the `action` query parameter, defaulting to `read`.
    fn from_params(params: &Params) -> Self {
        match param(params, "action") {
            Some("edit") => Action::Edit,
            Some("submit") => Action::Submit,
            Some("history") => Action::History,
            Some("talk") => Action::Talk,
            Some("info") => Action::Info,
            Some("raw") => Action::Raw,
            _ => Action::Read,
        }
    }
}

/// The index route: redirect to the main page.
pub(crate) async fn index_page() -> Redirect {
    Redirect::to(&wiki_url(config::MAIN_PAGE_TITLE))
}

/// The URL of a wiki page.
fn wiki_url(full_title: &str) -> String {
    format!("{}/{}", config::WIKI_PATH, title::url_encode(full_title))
}

/// The acting principal for a request. Sessions are out of scope here, so
/// every request acts as the anonymous visitor behind its address.
fn principal(state: &AppState, addr: SocketAddr) -> User {
    state.repo.anonymous_principal(&addr.ip().to_string())
}

/// The empty-title route (`/wiki` and `/wiki/`).
pub(crate) async fn wiki_root() -> Redirect {
    Redirect::to(&wiki_url(config::MAIN_PAGE_TITLE))
}

/// The main wiki view, GET side.
pub(crate) async fn wiki_get(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(raw_title): Path<String>,
    Query(params): Query<Params>,
) -> Result<Response, Error> {
    handle_wiki(&state, addr, &raw_title, &params, false)
}

/// The main wiki view, POST side. Form fields are merged over the query
/// parameters.
pub(crate) async fn wiki_post(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(raw_title): Path<String>,
    Query(params): Query<Params>,
    Form(form): Form<Params>,
) -> Result<Response, Error> {
    let mut merged = params;
    merged.extend(form);
    handle_wiki(&state, addr, &raw_title, &merged, true)
}

/// Dispatches one request to the wiki view.
fn handle_wiki(
    state: &AppState,
    addr: SocketAddr,
    raw_title: &str,
    params: &Params,
    is_post: bool,
) -> Result<Response, Error> {
    let user = principal(state, addr);

    let (ns, page_title) = match title::resolve(raw_title) {
        Ok(resolved) => resolved,
        Err(TitleError::Empty) => {
            return Ok(if raw_title.trim().is_empty() {
                Redirect::to(&wiki_url(config::MAIN_PAGE_TITLE)).into_response()
            } else {
                error_page(StatusCode::BAD_REQUEST, "empty title")
            });
        }
        Err(err @ TitleError::BadChar(_)) => {
            return Ok(error_page(StatusCode::BAD_REQUEST, &err.to_string()));
        }
    };

    // Requests for non-canonical spellings bounce to the canonical URL: the
    // stored page's casing when one exists, first-letter-capitalized
    // otherwise.
    let stored = state.repo.get(ns, &page_title);
    let page_title = if stored.exists {
        stored.title
    } else {
        title::capitalize_first(&page_title)
    };
    let full_title = ns.full_title(&page_title);
    let canonical = title::url_encode(&full_title);
    if raw_title != canonical {
        return Ok(Redirect::to(&wiki_url(&full_title)).into_response());
    }

    if ns.id == Namespace::SPECIAL {
        return handle_special(state, &user, &page_title, params, is_post);
    }

    match Action::from_params(params) {
        Action::Read => read_page(state, &user, ns, &page_title, params),
        Action::Raw => raw_page(state, ns, &page_title),
        Action::Edit => edit_page(state, &user, ns, &page_title, params, Vec::new()),
        Action::Submit if is_post => submit_page(state, &user, ns, &page_title, params),
        Action::Submit => edit_page(state, &user, ns, &page_title, params, Vec::new()),
        Action::History => history_page(state, &user, ns, &page_title, params),
        Action::Talk => talk_page(state, ns, &page_title),
        Action::Info => info_page(state, ns, &page_title),
    }
}

/// Runs a special page handler and converts its outcome.
fn handle_special(
    state: &AppState,
    user: &User,
    page_title: &str,
    params: &Params,
    is_post: bool,
) -> Result<Response, Error> {
    let request = special::RequestParams {
        user,
        is_post,
        params,
    };
    match special::dispatch(&state.repo, &request, page_title)? {
        special::Outcome::Redirect {
            page_title,
            params: redirect_params,
        } => {
            let mut url = wiki_url(&page_title);
            for (index, (name, value)) in redirect_params.iter().enumerate() {
                let sep = if index == 0 { '?' } else { '&' };
                url.push(sep);
                url += &format!(
                    "{}={}",
                    parser::functions::query_encode(name),
                    parser::functions::query_encode(value)
                );
            }
            Ok(Redirect::to(&url).into_response())
        }
        special::Outcome::Context(context) => {
            #[derive(TemplateSimple)]
            #[template(path = "special.html")]
            struct SpecialTemplate<'a> {
                /// The name of the wiki.
                site: &'a str,
                /// The special page title.
                title: &'a str,
                /// View data, serialized.
                context_json: &'a str,
                /// Whether the previous POST completed.
                done: bool,
            }

            let body = SpecialTemplate {
                site: &config::site().name,
                title: &format!("Special:{page_title}"),
                context_json: &serde_json::to_string_pretty(&context).unwrap_or_default(),
                done: flag(params, "done"),
            }
            .render_once()?;
            Ok(Html(body).into_response())
        }
    }
}

/// `action=read`: the rendered page.
fn read_page(
    state: &AppState,
    user: &User,
    ns: &'static Namespace,
    page_title: &str,
    params: &Params,
) -> Result<Response, Error> {
    let now = common::now();
    let repo = &state.repo;

    // Follow one redirect hop; access checks then apply to the target.
    let mut page = repo.get(ns, page_title);
    let mut redirected_from = None;
    if let Some((target_ns_id, target_title)) = page.redirects_to.clone()
        && !flag(params, "no_redirect")
        && let Some(target_ns) = Namespace::find_by_id(target_ns_id)
    {
        redirected_from = Some(page.full_title());
        page = repo.get(target_ns, &target_title);
    }
    let ns = page.namespace();
    let page_title = page.title.clone();
    let full_title = page.full_title();

    if !page.exists {
        return Ok(missing_page(&full_title));
    }

    let revision_id = param(params, "revid").and_then(|raw| raw.parse::<u64>().ok());
    if let Some(id) = revision_id {
        let revision = repo
            .revision(id)
            .ok_or(db::Error::RevisionDoesNotExist(id))?;
        if !auth::can_read_revision(user, &revision) {
            return Err(db::Error::Access(auth::AccessError::MissingPermission(vec![
                auth::perms::WIKI_MASK.to_string(),
            ]))
            .into());
        }
    }

    let output = repo.rendered_page(ns, &page_title, revision_id, now)?;

    #[derive(TemplateSimple)]
    #[template(path = "page.html")]
    struct PageTemplate<'a> {
        /// The name of the wiki.
        site: &'a str,
        /// The display language code.
        lang: &'a str,
        /// The display title.
        title: &'a str,
        /// The rendered wikicode.
        body: &'a str,
        /// The full title of the redirect source, if the request followed one.
        redirected_from: Option<&'a str>,
        /// Categories the page belongs to.
        categories: Vec<String>,
        /// Whether the dark color scheme is requested.
        dark_mode: bool,
        /// Whether the requester may edit the page.
        can_edit: bool,
        /// Whether the page is on the requester's follow list.
        following: bool,
    }

    let body = PageTemplate {
        site: &config::site().name,
        lang: param(params, "lang").unwrap_or(&user.language),
        title: output.display_title.as_deref().unwrap_or(&full_title),
        body: &output.html,
        redirected_from: redirected_from.as_deref(),
        categories: output
            .metadata
            .categories
            .iter()
            .map(|category| category.cat_title.clone())
            .collect(),
        dark_mode: flag(params, "dark_mode") || user.dark_mode,
        can_edit: auth::can_edit(repo, user, ns, &page_title, now).is_ok(),
        following: user.is_authenticated() && repo.is_following(user.id, ns.id, &page_title),
    }
    .render_once()?;
    Ok(Html(body).into_response())
}

/// The 404 body for a page with no revisions.
fn missing_page(full_title: &str) -> Response {
    error_page(
        StatusCode::NOT_FOUND,
        &format!("page '{full_title}' does not exist"),
    )
}

/// `action=raw`: the unrendered content, under the page’s MIME type.
fn raw_page(state: &AppState, ns: &'static Namespace, page_title: &str) -> Result<Response, Error> {
    let page = state.repo.get(ns, page_title);
    if !page.exists {
        return Ok(missing_page(&page.full_title()));
    }
    let content = state.repo.content(ns.id, page_title);
    Ok((
        [(header::CONTENT_TYPE, page.content_type.mime())],
        content,
    )
        .into_response())
}

/// `action=edit`: the edit form, possibly with errors from a failed submit.
fn edit_page(
    state: &AppState,
    user: &User,
    ns: &'static Namespace,
    page_title: &str,
    params: &Params,
    global_errors: Vec<String>,
) -> Result<Response, Error> {
    let now = common::now();
    let repo = &state.repo;
    let page = repo.get(ns, page_title);
    let latest = repo.latest_revision(ns.id, page_title, true);

    #[derive(TemplateSimple)]
    #[template(path = "edit.html")]
    struct EditTemplate<'a> {
        /// The name of the wiki.
        site: &'a str,
        /// The full page title.
        title: &'a str,
        /// The content being edited.
        content: &'a str,
        /// The latest revision id the form was loaded against.
        base_revision_id: Option<u64>,
        /// Whether the requester may save.
        can_edit: bool,
        /// Errors from a failed save.
        global_errors: Vec<String>,
    }

    let content = param(params, "content")
        .map(ToString::to_string)
        .unwrap_or_else(|| repo.content(ns.id, page_title));
    let body = EditTemplate {
        site: &config::site().name,
        title: &page.full_title(),
        content: &content,
        base_revision_id: latest.map(|revision| revision.id),
        can_edit: auth::can_edit(repo, user, ns, page_title, now).is_ok(),
        global_errors,
    }
    .render_once()?;
    Ok(Html(body).into_response())
}

/// `action=submit`: commit an edit, then redirect to the read view.
fn submit_page(
    state: &AppState,
    user: &User,
    ns: &'static Namespace,
    page_title: &str,
    params: &Params,
) -> Result<Response, Error> {
    let base_revision_id = param(params, "base_revision_id").and_then(|raw| raw.parse::<u64>().ok());
    let request = EditRequest {
        author: user,
        namespace: ns,
        title: page_title.to_string(),
        content: params.get("content").cloned().unwrap_or_default(),
        comment: param(params, "comment").map(ToString::to_string),
        minor: flag(params, "minor"),
        follow: flag(params, "follow"),
        hidden_category: (ns.id == Namespace::CATEGORY).then(|| flag(params, "hidden_category")),
        base_revision_id,
    };

    match state.repo.edit(request) {
        Ok(_) => {
            let url = format!("{}?done=true", wiki_url(&ns.full_title(page_title)));
            Ok(Redirect::to(&url).into_response())
        }
        Err(err @ (db::Error::ConcurrentEdit | db::Error::CommentTooLong(_))) => {
            edit_page(state, user, ns, page_title, params, vec![err.to_string()])
        }
        Err(err) => Err(err.into()),
    }
}

/// `action=history`: the page’s revisions, newest first.
fn history_page(
    state: &AppState,
    user: &User,
    ns: &'static Namespace,
    page_title: &str,
    params: &Params,
) -> Result<Response, Error> {
    let repo = &state.repo;
    let page = repo.get(ns, page_title);
    if !page.exists {
        return Ok(missing_page(&page.full_title()));
    }

    let per_page = param(params, "results_per_page")
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(50)
        .clamp(20, 500);
    let page_index = param(params, "page")
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1);

    /// One row of the history table.
    struct HistoryRow {
        /// The revision id.
        id: u64,
        /// The revision date, ISO-formatted.
        date: String,
        /// The author’s name.
        author: String,
        /// The comment, when visible.
        comment: String,
        /// Whether the revision is masked.
        hidden: bool,
        /// Whether the author marked the edit as minor.
        minor: bool,
        /// Byte-size change against the previous revision.
        size_diff: i64,
    }

    let can_see_hidden = user.has_permission(auth::perms::WIKI_MASK);
    let rows = repo
        .revisions(ns.id, page_title)
        .iter()
        .rev()
        .filter(|revision| can_see_hidden || !revision.hidden)
        .skip((page_index - 1) * per_page)
        .take(per_page)
        .map(|revision| HistoryRow {
            id: revision.id,
            date: revision.date.format(&Rfc3339).unwrap_or_default(),
            author: repo
                .user_by_id(revision.author_id)
                .map(|author| author.username)
                .unwrap_or_default(),
            comment: if revision.comment_hidden && !can_see_hidden {
                String::new()
            } else {
                revision.comment.clone().unwrap_or_default()
            },
            hidden: revision.hidden,
            minor: revision.is_minor,
            size_diff: repo.byte_size_diff(revision.id, false).unwrap_or_default(),
        })
        .collect::<Vec<_>>();

    #[derive(TemplateSimple)]
    #[template(path = "history.html")]
    struct HistoryTemplate<'a> {
        /// The name of the wiki.
        site: &'a str,
        /// The full page title.
        title: &'a str,
        /// The revision rows.
        rows: Vec<HistoryRow>,
    }

    let body = HistoryTemplate {
        site: &config::site().name,
        title: &page.full_title(),
        rows,
    }
    .render_once()?;
    Ok(Html(body).into_response())
}

/// `action=talk`: the page’s discussion threads.
fn talk_page(state: &AppState, ns: &'static Namespace, page_title: &str) -> Result<Response, Error> {
    let repo = &state.repo;
    let page = repo.get(ns, page_title);

    /// One topic and its messages.
    struct TopicView {
        /// The topic title.
        title: String,
        /// The name of the user who opened the topic.
        author: String,
        /// `(author, text)` pairs, oldest first.
        messages: Vec<(String, String)>,
    }

    let username = |id| {
        repo.user_by_id(id)
            .filter(|user: &User| !user.hide_username)
            .map(|user| user.username)
            .unwrap_or_default()
    };
    let topics = repo
        .topics_of_page(ns.id, page_title)
        .iter()
        .map(|topic| TopicView {
            title: repo.topic_title(topic.id),
            author: username(topic.author_id),
            messages: repo
                .messages_of_topic(topic.id)
                .iter()
                .map(|message| (username(message.author_id), repo.message_text(message.id)))
                .collect(),
        })
        .collect::<Vec<_>>();

    #[derive(TemplateSimple)]
    #[template(path = "talk.html")]
    struct TalkTemplate<'a> {
        /// The name of the wiki.
        site: &'a str,
        /// The full page title.
        title: &'a str,
        /// The discussion threads.
        topics: Vec<TopicView>,
    }

    let body = TalkTemplate {
        site: &config::site().name,
        title: &page.full_title(),
        topics,
    }
    .render_once()?;
    Ok(Html(body).into_response())
}

/// `action=info`: page metadata.
fn info_page(state: &AppState, ns: &'static Namespace, page_title: &str) -> Result<Response, Error> {
    let repo = &state.repo;
    let page = repo.get(ns, page_title);
    let protection = repo.protection(ns.id, page_title);

    #[derive(TemplateSimple)]
    #[template(path = "info.html")]
    struct InfoTemplate<'a> {
        /// The name of the wiki.
        site: &'a str,
        /// The full page title.
        title: &'a str,
        /// Whether the page exists.
        exists: bool,
        /// The content type name.
        content_type: &'a str,
        /// The content language code.
        content_language: &'a str,
        /// For category pages, whether the category is hidden.
        hidden_category: Option<bool>,
        /// The number of revisions.
        revision_count: usize,
        /// The protection level, if protected.
        protection_level: Option<String>,
        /// Why the page was protected.
        protection_reason: Option<String>,
        /// Full titles of pages redirecting here.
        redirects_here: Vec<String>,
        /// Full titles of pages linking here.
        links_here: Vec<String>,
        /// Journal entries about this page, oldest first.
        journal: Vec<String>,
    }

    let journal = repo
        .related_logs(ns.id, page_title)
        .iter()
        .map(|entry| {
            let performer = entry
                .performer_id
                .and_then(|id| repo.user_by_id(id))
                .filter(|user| !user.hide_username)
                .map_or_else(|| "system".to_string(), |user| user.username);
            format!(
                "{}: {} {}",
                entry.date.format(&Rfc3339).unwrap_or_default(),
                performer,
                entry.kind.describe()
            )
        })
        .collect();

    let body = InfoTemplate {
        site: &config::site().name,
        title: &page.full_title(),
        exists: page.exists,
        content_type: page.content_type.as_str(),
        content_language: &page.content_language,
        hidden_category: page.is_category_hidden,
        revision_count: repo.revisions(ns.id, page_title).len(),
        protection_level: protection.as_ref().map(|p| p.protection_level.clone()),
        protection_reason: protection.and_then(|p| p.reason),
        redirects_here: repo
            .redirects_to(ns.id, page_title)
            .iter()
            .map(db::models::Page::full_title)
            .collect(),
        links_here: repo
            .links_to(ns.id, page_title)
            .iter()
            .map(db::models::Page::full_title)
            .collect(),
        journal,
    }
    .render_once()?;
    Ok(Html(body).into_response())
}

/// Query options for `/wiki-api`.
#[derive(serde::Deserialize)]
pub(crate) struct WikiApiQuery {
    /// The API action. Only `query` is defined.
    action: String,
    /// The query kind: `static` or `gadget`.
    query: String,
    /// The full title of the resource page.
    title: String,
}

/// The wiki resource API: serves cached parses of static resources (CSS, JS,
/// JSON) under their proper MIME type.
pub(crate) async fn wiki_api(
    State(state): State<AppState>,
    Query(query): Query<WikiApiQuery>,
) -> Response {
    if query.action != "query" || !matches!(query.query.as_str(), "static" | "gadget") {
        return error_page(StatusCode::NOT_FOUND, "unknown API query");
    }
    let Ok((ns, page_title)) = title::resolve(&query.title) else {
        return error_page(StatusCode::NOT_FOUND, "bad title");
    };
    let page = state.repo.get(ns, &page_title);
    let mime = page.content_type.mime();
    if !page.exists
        || !matches!(
            page.content_type,
            db::models::ContentType::Css | db::models::ContentType::Js | db::models::ContentType::Json
        )
    {
        return error_page(StatusCode::NOT_FOUND, "no such resource");
    }
    let content = page
        .cache
        .map(|cache| cache.content)
        .unwrap_or_else(|| state.repo.content(ns.id, &page_title));
    ([(header::CONTENT_TYPE, mime)], content).into_response()
}
