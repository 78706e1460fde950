//! The wiki’s persistent record types.
//!
//! Records reference each other by key, never by object: users by numeric id,
//! pages by `(namespace_id, title)`. Protections, follow-list entries, links,
//! and categories may all reference pages that do not exist.

use crate::title::{self, Namespace};
use std::collections::BTreeSet;
use time::OffsetDateTime;

/// The content model of a page.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Wikicode, the default.
    #[default]
    WikiPage,
    /// A scripting module.
    Module,
    /// A style sheet.
    Css,
    /// A script.
    Js,
    /// Structured data.
    Json,
}

impl ContentType {
    /// The MIME type used when serving this content raw.
    pub fn mime(self) -> &'static str {
        match self {
            ContentType::WikiPage => "text/plain",
            ContentType::Module => "text/x-python3",
            ContentType::Js => "text/javascript",
            ContentType::Css => "text/css",
            ContentType::Json => "application/json",
        }
    }

    /// The canonical string form.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::WikiPage => "wikipage",
            ContentType::Module => "module",
            ContentType::Js => "js",
            ContentType::Css => "css",
            ContentType::Json => "json",
        }
    }
}

/// The error when a [`ContentType`] cannot be parsed from a string.
#[derive(Debug, thiserror::Error)]
#[error("unknown content type '{0}'")]
pub struct ContentTypeError(String);

impl core::str::FromStr for ContentType {
    type Err = ContentTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wikipage" => Ok(ContentType::WikiPage),
            "module" => Ok(ContentType::Module),
            "js" => Ok(ContentType::Js),
            "css" => Ok(ContentType::Css),
            "json" => Ok(ContentType::Json),
            _ => Err(ContentTypeError(s.to_string())),
        }
    }
}

/// The cached result of the most recent successful parse of a page.
#[derive(Clone, Debug)]
pub struct ParseCache {
    /// The rendered HTML.
    pub content: String,
    /// The revision the HTML was rendered from.
    pub revision_id: u64,
    /// How long the parse took, in milliseconds.
    pub duration_ms: u64,
    /// When the parse ran.
    pub date: OffsetDateTime,
    /// When the cache stops being served.
    pub expiry_date: OffsetDateTime,
    /// UTF-8 size of the wikicode.
    pub size_before: usize,
    /// UTF-8 size of the rendered HTML.
    pub size_after: usize,
}

/// A wiki page.
///
/// Identity is `(namespace_id, title)`. Pages are created on their first
/// saved revision and only ever logically deleted.
#[derive(Clone, Debug)]
pub struct Page {
    /// The namespace the page belongs to.
    pub namespace_id: i32,
    /// The page title, without namespace prefix.
    pub title: String,
    /// The content model.
    pub content_type: ContentType,
    /// Whether the page has been logically deleted.
    pub deleted: bool,
    /// For category pages only, whether the category is hidden from listings.
    pub is_category_hidden: Option<bool>,
    /// Code of the language the content is written in.
    pub content_language: String,
    /// The parse cache, when valid.
    pub cache: Option<ParseCache>,
    /// The redirect target, when the content is a redirect.
    pub redirects_to: Option<(i32, String)>,
    /// Whether the page is stored (false for shadow instances).
    pub exists: bool,
}

impl Page {
    /// Creates a shadow instance for a page that does not exist yet.
    pub fn shadow(ns: &Namespace, page_title: &str) -> Self {
        Self {
            namespace_id: ns.id,
            title: page_title.to_string(),
            content_type: ContentType::default(),
            deleted: false,
            is_category_hidden: (ns.id == Namespace::CATEGORY).then_some(false),
            content_language: crate::config::DEFAULT_LANGUAGE.to_string(),
            cache: None,
            redirects_to: None,
            exists: false,
        }
    }

    /// The page’s namespace.
    pub fn namespace(&self) -> &'static Namespace {
        Namespace::find_by_id(self.namespace_id).unwrap_or_else(Namespace::main)
    }

    /// The full title, `<namespace>:<title>`.
    pub fn full_title(&self) -> String {
        self.namespace().full_title(&self.title)
    }

    /// The part of the title before the first `/`.
    pub fn base_name(&self) -> &str {
        title::base_name(self.namespace(), &self.title)
    }

    /// The part of the title after the last `/`.
    pub fn page_name(&self) -> &str {
        title::page_name(self.namespace(), &self.title)
    }

    /// The part of the title before the last `/`.
    pub fn parent_title(&self) -> &str {
        title::parent_title(self.namespace(), &self.title)
    }

    /// Whether the page content is a redirect.
    pub fn is_redirect(&self) -> bool {
        self.redirects_to.is_some()
    }

    /// The chain of ancestor titles for a subpage, outermost first, as
    /// `(full title, display text)` pairs.
    pub fn parent_page_titles(&self) -> Vec<(String, String)> {
        let ns = self.namespace();
        if !ns.allows_subpages || !self.title.contains('/') {
            return Vec::new();
        }
        let parts = self.title.split('/').collect::<Vec<_>>();
        let mut titles = Vec::new();
        let mut buffer = String::new();
        for (index, part) in parts[..parts.len() - 1].iter().enumerate() {
            if !buffer.is_empty() {
                buffer.push('/');
            }
            buffer += part;
            let display = if index == 0 {
                ns.full_title(part)
            } else {
                (*part).to_string()
            };
            titles.push((ns.full_title(&buffer), display));
        }
        titles
    }

    /// The sort key used when no explicit one is set.
    pub fn default_sort_key(&self) -> &str {
        &self.title
    }
}

/// An immutable snapshot of a page’s content at the moment it was edited.
#[derive(Clone, Debug)]
pub struct Revision {
    /// The store-assigned revision id.
    pub id: u64,
    /// Namespace of the page the revision belongs to.
    pub namespace_id: i32,
    /// Title of the page the revision belongs to.
    pub title: String,
    /// When the revision was saved.
    pub date: OffsetDateTime,
    /// Id of the author. Survives user renames and masking.
    pub author_id: u64,
    /// The edit comment.
    pub comment: Option<String>,
    /// Whether the comment is masked.
    pub comment_hidden: bool,
    /// Whether the whole revision is masked.
    pub hidden: bool,
    /// Whether the author marked the edit as minor.
    pub is_minor: bool,
    /// Whether the edit was made by a bot account.
    pub is_bot: bool,
    /// Free-form metadata labels.
    pub tags: Vec<String>,
    /// The wikicode.
    pub content: String,
    /// True on the revision that created the page.
    pub page_creation: bool,
}

impl Revision {
    /// UTF-8 size of the content, in bytes.
    pub fn byte_size(&self) -> usize {
        self.content.len()
    }
}

/// A named set of permissions users can belong to.
#[derive(Clone, Debug)]
pub struct UserGroup {
    /// The ASCII-alphanumeric group label.
    pub label: String,
    /// Permissions granted to members.
    pub permissions: BTreeSet<String>,
    /// Whether privileged users may grant this group. Unassignable groups
    /// cannot be deleted either.
    pub assignable_by_users: bool,
}

/// A time-bounded prohibition of editing attached to a user account.
#[derive(Clone, Debug)]
pub struct UserBlock {
    /// When the block lapses. `None` means never.
    pub end_date: Option<OffsetDateTime>,
    /// Whether the blocked user may still post on their own user page.
    pub allow_messages_on_own_user_page: bool,
    /// Whether the blocked user may still edit their own settings.
    pub allow_editing_own_settings: bool,
}

impl UserBlock {
    /// Whether the block is in force at `now`.
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.end_date.is_none_or(|end| end > now)
    }
}

/// A time-bounded prohibition of editing attached to an IP address.
#[derive(Clone, Debug)]
pub struct IpBlock {
    /// The blocked address.
    #[allow(dead_code)]
    pub ip: String,
    /// When the block lapses. `None` means never.
    pub end_date: Option<OffsetDateTime>,
    /// Whether blocked visitors may still post on their own user page.
    pub allow_messages_on_own_user_page: bool,
    /// Whether blocked visitors may still create accounts.
    pub allow_account_creation: bool,
}

impl IpBlock {
    /// Whether the block is in force at `now`.
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.end_date.is_none_or(|end| end > now)
    }
}

/// A user’s gender, used for message selection.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[allow(dead_code)]
pub enum Gender {
    /// Unspecified.
    #[default]
    Neutral,
    /// Female.
    Female,
    /// Male.
    Male,
}

/// An acting principal: an authenticated account, or an anonymous visitor
/// identified by IP address.
///
/// Anonymous visitors get a real account (keyed by IP) on their first edit;
/// until then they exist only as an in-memory value with `id == 0`.
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub struct User {
    /// The store-assigned user id, or 0 for an unmaterialized visitor.
    pub id: u64,
    /// The account name.
    pub username: String,
    /// The IP address, for anonymous accounts only.
    pub ip: Option<String>,
    /// Labels of the groups the user belongs to.
    pub groups: Vec<String>,
    /// The resolved union of the groups’ permissions.
    pub permissions: BTreeSet<String>,
    /// Code of the user’s preferred display language.
    pub language: String,
    /// The user’s preferred time zone name.
    pub timezone: String,
    /// The user’s preferred strftime-style date format, if any.
    pub datetime_format: Option<String>,
    /// The user’s gender.
    pub gender: Gender,
    /// Whether the user prefers the dark color scheme.
    pub dark_mode: bool,
    /// Whether the username is masked from public listings.
    pub hide_username: bool,
    /// Whether this is a bot account.
    pub is_bot: bool,
    /// Whether pages the user creates are auto-added to their follow list.
    pub follow_created_pages: bool,
    /// Whether pages the user edits are auto-added to their follow list.
    pub follow_modified_pages: bool,
    /// Names of users whose notifications are muted.
    pub muted_users: Vec<String>,
    /// When the account was created.
    pub created_at: OffsetDateTime,
    /// The user’s block, if any.
    pub block: Option<UserBlock>,
}

impl User {
    /// Whether this principal is anonymous (identified by IP address).
    pub fn is_anonymous(&self) -> bool {
        self.ip.is_some()
    }

    /// Whether this principal is an authenticated account.
    pub fn is_authenticated(&self) -> bool {
        !self.is_anonymous()
    }

    /// Whether the account is new: anonymous, or younger than the configured
    /// number of days.
    pub fn is_new(&self, now: OffsetDateTime) -> bool {
        self.is_anonymous()
            || self.created_at > now - time::Duration::days(crate::config::NEW_ACCOUNT_DAYS)
    }

    /// Whether the user holds the given permission.
    pub fn has_permission(&self, perm: &str) -> bool {
        self.permissions.contains(perm)
    }

    /// Whether the user belongs to the given group.
    pub fn is_in_group(&self, label: &str) -> bool {
        self.groups.iter().any(|g| g == label)
    }

    /// Whether the user’s block is in force at `now`.
    pub fn is_blocked(&self, now: OffsetDateTime) -> bool {
        self.block.as_ref().is_some_and(|block| block.is_active(now))
    }
}

/// One entry of a user’s follow list.
#[derive(Clone, Debug)]
pub struct PageFollowStatus {
    /// The following user.
    pub user_id: u64,
    /// Namespace of the followed page.
    pub namespace_id: i32,
    /// Title of the followed page. The page may not exist.
    pub title: String,
    /// When the entry lapses. `None` means never.
    pub end_date: Option<OffsetDateTime>,
}

impl PageFollowStatus {
    /// Whether the entry is in force at `now`.
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.end_date.is_none_or(|end| end > now)
    }
}

/// The protection status of a page. Non-existent pages can be protected.
#[derive(Clone, Debug)]
pub struct PageProtection {
    /// Namespace of the protected page.
    pub namespace_id: i32,
    /// Title of the protected page.
    pub title: String,
    /// When the protection lapses. `None` means never.
    pub end_date: Option<OffsetDateTime>,
    /// Why the page was protected.
    pub reason: Option<String>,
    /// Label of the group whose members may still edit.
    pub protection_level: String,
    /// Whether posting on the page’s talk threads is restricted too.
    pub protect_talks: bool,
}

impl PageProtection {
    /// Whether the protection is in force at `now`.
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.end_date.is_none_or(|end| end > now)
    }
}

/// Membership of a page in a category, with an optional sort key.
/// The category page itself may not exist.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageCategory {
    /// Title of the category, without namespace prefix.
    pub cat_title: String,
    /// Optional sort key overriding the page’s default.
    pub sort_key: Option<String>,
}

/// A link from one page to another. The target may not exist.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageLink {
    /// Namespace of the link target.
    pub namespace_id: i32,
    /// Title of the link target.
    pub title: String,
}

/// A talk topic: a titled, hierarchical list of user messages under a page.
#[derive(Clone, Debug)]
pub struct Topic {
    /// The store-assigned topic id.
    pub id: u64,
    /// Namespace of the page the topic belongs to.
    pub namespace_id: i32,
    /// Title of the page the topic belongs to.
    pub title: String,
    /// Id of the user who opened the topic.
    pub author_id: u64,
    /// When the topic was opened.
    pub date: OffsetDateTime,
    /// Whether the topic has been logically deleted.
    pub deleted: bool,
}

/// One version of a topic’s title.
#[derive(Clone, Debug)]
pub struct TopicRevision {
    /// The store-assigned revision id.
    pub id: u64,
    /// The topic this revision belongs to.
    pub topic_id: u64,
    /// When the revision was saved.
    pub date: OffsetDateTime,
    /// Id of the author.
    #[allow(dead_code)]
    pub author_id: u64,
    /// The topic title at this point in time.
    pub title: String,
    /// Whether the revision is masked.
    pub hidden: bool,
}

/// A message posted under a topic.
#[derive(Clone, Debug)]
pub struct Message {
    /// The store-assigned message id.
    pub id: u64,
    /// The topic the message belongs to.
    pub topic_id: u64,
    /// Id of the user who posted the message.
    pub author_id: u64,
    /// When the message was posted.
    pub date: OffsetDateTime,
    /// The message this one replies to, if any. Parent pointers form a tree.
    pub response_to: Option<u64>,
    /// Whether the message has been logically deleted.
    pub deleted: bool,
}

/// One version of a message’s text.
#[derive(Clone, Debug)]
pub struct MessageRevision {
    /// The store-assigned revision id.
    pub id: u64,
    /// The message this revision belongs to.
    pub message_id: u64,
    /// When the revision was saved.
    pub date: OffsetDateTime,
    /// Id of the author.
    #[allow(dead_code)]
    pub author_id: u64,
    /// The message text at this point in time.
    pub text: String,
    /// Whether the revision is masked.
    pub hidden: bool,
}

/// What a revision masking operation does to the selected revisions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskAction {
    /// Hide the content and the comment.
    MaskFully,
    /// Hide only the comment.
    MaskCommentsOnly,
    /// Reveal everything.
    UnmaskAll,
    /// Reveal the content, keep the comment hidden.
    UnmaskAllButComments,
}

impl MaskAction {
    /// The canonical string form.
    pub fn as_str(self) -> &'static str {
        match self {
            MaskAction::MaskFully => "mask_fully",
            MaskAction::MaskCommentsOnly => "mask_comments_only",
            MaskAction::UnmaskAll => "unmask_all",
            MaskAction::UnmaskAllButComments => "unmask_all_but_comments",
        }
    }
}

/// An immutable journal entry recording an operation performed by a user.
#[derive(Clone, Debug)]
pub struct LogEntry {
    /// When the operation happened.
    pub date: OffsetDateTime,
    /// Who performed it, when known.
    pub performer_id: Option<u64>,
    /// What happened.
    pub kind: LogKind,
}

/// The payload of a [`LogEntry`].
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum LogKind {
    PageCreation {
        namespace_id: i32,
        title: String,
    },
    PageDeletion {
        namespace_id: i32,
        title: String,
        reason: Option<String>,
    },
    PageProtection {
        namespace_id: i32,
        title: String,
        end_date: Option<OffsetDateTime>,
        reason: Option<String>,
        protection_level: String,
        protect_talks: bool,
    },
    PageRename {
        namespace_id: i32,
        old_title: String,
        new_title: String,
        reason: Option<String>,
        leave_redirect: bool,
    },
    PageContentLanguage {
        namespace_id: i32,
        title: String,
        language: String,
        reason: Option<String>,
    },
    PageContentType {
        namespace_id: i32,
        title: String,
        content_type: ContentType,
        reason: Option<String>,
    },
    RevisionMask {
        revision_id: u64,
        action: MaskAction,
        reason: Option<String>,
    },
    UserAccountCreation {
        user_id: u64,
    },
    UserMask {
        user_id: u64,
        masked: bool,
        reason: Option<String>,
    },
    UserRename {
        user_id: u64,
        old_username: String,
        new_username: String,
        reason: Option<String>,
    },
    UserGroupChange {
        user_id: u64,
        group: String,
        joined: bool,
        reason: Option<String>,
    },
    UserBlock {
        user_id: u64,
        end_date: Option<OffsetDateTime>,
        allow_messages_on_own_user_page: bool,
        allow_editing_own_settings: bool,
        blocked: bool,
        reason: Option<String>,
    },
    IpBlock {
        ip: String,
        end_date: Option<OffsetDateTime>,
        allow_messages_on_own_user_page: bool,
        allow_account_creation: bool,
        blocked: bool,
        reason: Option<String>,
    },
}

impl LogKind {
    /// A one-line description of the operation, for journal listings.
    pub fn describe(&self) -> String {
        fn page(namespace_id: i32, page_title: &str) -> String {
            Namespace::find_by_id(namespace_id)
                .map_or_else(|| page_title.to_string(), |ns| ns.full_title(page_title))
        }
        fn because(reason: &Option<String>) -> String {
            reason
                .as_ref()
                .map(|reason| format!(" ({reason})"))
                .unwrap_or_default()
        }
        fn until(end_date: &Option<OffsetDateTime>) -> String {
            end_date.map_or_else(|| " indefinitely".to_string(), |end| format!(" until {end}"))
        }

        match self {
            LogKind::PageCreation {
                namespace_id,
                title,
            } => format!("created {}", page(*namespace_id, title)),
            LogKind::PageDeletion {
                namespace_id,
                title,
                reason,
            } => format!("deleted {}{}", page(*namespace_id, title), because(reason)),
            LogKind::PageProtection {
                namespace_id,
                title,
                end_date,
                reason,
                protection_level,
                protect_talks,
            } => format!(
                "protected {} at level '{protection_level}'{}{}{}",
                page(*namespace_id, title),
                if *protect_talks { ", talks included," } else { "" },
                until(end_date),
                because(reason)
            ),
            LogKind::PageRename {
                namespace_id,
                old_title,
                new_title,
                reason,
                leave_redirect,
            } => format!(
                "renamed {} to {}{}{}",
                page(*namespace_id, old_title),
                page(*namespace_id, new_title),
                if *leave_redirect { " leaving a redirect" } else { "" },
                because(reason)
            ),
            LogKind::PageContentLanguage {
                namespace_id,
                title,
                language,
                reason,
            } => format!(
                "set the content language of {} to {language}{}",
                page(*namespace_id, title),
                because(reason)
            ),
            LogKind::PageContentType {
                namespace_id,
                title,
                content_type,
                reason,
            } => format!(
                "set the content type of {} to {}{}",
                page(*namespace_id, title),
                content_type.as_str(),
                because(reason)
            ),
            LogKind::RevisionMask {
                revision_id,
                action,
                reason,
            } => format!(
                "applied {} to revision {revision_id}{}",
                action.as_str(),
                because(reason)
            ),
            LogKind::UserAccountCreation { user_id } => {
                format!("created user account {user_id}")
            }
            LogKind::UserMask {
                user_id,
                masked,
                reason,
            } => format!(
                "{} the username of user {user_id}{}",
                if *masked { "masked" } else { "unmasked" },
                because(reason)
            ),
            LogKind::UserRename {
                user_id,
                old_username,
                new_username,
                reason,
            } => format!(
                "renamed user {user_id} from '{old_username}' to '{new_username}'{}",
                because(reason)
            ),
            LogKind::UserGroupChange {
                user_id,
                group,
                joined,
                reason,
            } => format!(
                "{} user {user_id} {} group '{group}'{}",
                if *joined { "added" } else { "removed" },
                if *joined { "to" } else { "from" },
                because(reason)
            ),
            LogKind::UserBlock {
                user_id,
                end_date,
                allow_messages_on_own_user_page,
                allow_editing_own_settings,
                blocked,
                reason,
            } => {
                if *blocked {
                    format!(
                        "blocked user {user_id}{}{}{}{}",
                        until(end_date),
                        if *allow_messages_on_own_user_page {
                            ", own talk allowed"
                        } else {
                            ""
                        },
                        if *allow_editing_own_settings {
                            ", own settings allowed"
                        } else {
                            ""
                        },
                        because(reason)
                    )
                } else {
                    format!("unblocked user {user_id}{}", because(reason))
                }
            }
            LogKind::IpBlock {
                ip,
                end_date,
                allow_messages_on_own_user_page,
                allow_account_creation,
                blocked,
                reason,
            } => {
                if *blocked {
                    format!(
                        "blocked address {ip}{}{}{}{}",
                        until(end_date),
                        if *allow_messages_on_own_user_page {
                            ", own talk allowed"
                        } else {
                            ""
                        },
                        if *allow_account_creation {
                            ", account creation allowed"
                        } else {
                            ""
                        },
                        because(reason)
                    )
                } else {
                    format!("unblocked address {ip}{}", because(reason))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn content_type_mime_table() {
        assert_eq!(ContentType::WikiPage.mime(), "text/plain");
        assert_eq!(ContentType::Module.mime(), "text/x-python3");
        assert_eq!(ContentType::Js.mime(), "text/javascript");
        assert_eq!(ContentType::Css.mime(), "text/css");
        assert_eq!(ContentType::Json.mime(), "application/json");
        assert_eq!("css".parse::<ContentType>().unwrap(), ContentType::Css);
        assert!("html".parse::<ContentType>().is_err());
    }

    #[test]
    fn block_activity() {
        let now = datetime!(2024-06-01 12:00:00 UTC);
        let open_ended = UserBlock {
            end_date: None,
            allow_messages_on_own_user_page: true,
            allow_editing_own_settings: true,
        };
        assert!(open_ended.is_active(now));

        let expired = UserBlock {
            end_date: Some(now - time::Duration::seconds(1)),
            ..open_ended.clone()
        };
        assert!(!expired.is_active(now));
    }

    #[test]
    fn shadow_pages_do_not_exist() {
        let ns = Namespace::find_by_id(Namespace::CATEGORY).unwrap();
        let page = Page::shadow(ns, "Trains");
        assert!(!page.exists);
        assert_eq!(page.full_title(), "Category:Trains");
        assert_eq!(page.is_category_hidden, Some(false));
        let main = Page::shadow(Namespace::main(), "Trains");
        assert_eq!(main.is_category_hidden, None);
        assert_eq!(main.full_title(), "Trains");
    }

    #[test]
    fn log_descriptions_read_naturally() {
        let kind = LogKind::PageRename {
            namespace_id: Namespace::MAIN,
            old_title: "Before".to_string(),
            new_title: "After".to_string(),
            reason: Some("tidy".to_string()),
            leave_redirect: true,
        };
        assert_eq!(kind.describe(), "renamed Before to After leaving a redirect (tidy)");

        let kind = LogKind::UserGroupChange {
            user_id: 7,
            group: "patroller".to_string(),
            joined: false,
            reason: None,
        };
        assert_eq!(kind.describe(), "removed user 7 from group 'patroller'");
    }

    #[test]
    fn parent_titles_chain_up() {
        let user_ns = Namespace::find_by_id(Namespace::USER).unwrap();
        let page = Page::shadow(user_ns, "Ada/Notes/2024");
        assert_eq!(
            page.parent_page_titles(),
            vec![
                ("User:Ada".to_string(), "User:Ada".to_string()),
                ("User:Ada/Notes".to_string(), "Notes".to_string()),
            ]
        );
        assert!(Page::shadow(Namespace::main(), "Flat").parent_page_titles().is_empty());
    }

    #[test]
    fn revision_byte_size_is_utf8_length() {
        let revision = Revision {
            id: 1,
            namespace_id: 0,
            title: "T".to_string(),
            date: datetime!(2024-01-01 00:00:00 UTC),
            author_id: 1,
            comment: None,
            comment_hidden: false,
            hidden: false,
            is_minor: false,
            is_bot: false,
            tags: Vec::new(),
            content: "héllo".to_string(),
            page_creation: true,
        };
        assert_eq!(revision.byte_size(), 6);
    }
}
