//! The page repository.
//!
//! All persistent wiki state lives behind [`Repository`]: pages and their
//! revisions, protections, follow-lists, user accounts and groups, blocks,
//! talk threads, and the operation journal. Structural mutations (edit,
//! delete, rename, protect, mask) run under a single writer lock, which gives
//! them serializable semantics; reads take the shared lock and never block
//! each other.
//!
//! The store itself is a plain in-memory table set. Callers only ever see the
//! repository interface, so a persistent backend can replace the tables
//! without touching the rest of the crate.

pub mod models;

use crate::{
    auth::{self, AccessError, perms},
    config,
    title::{self, Namespace},
};
use indexmap::IndexMap;
use models::{
    ContentType, Gender, IpBlock, LogEntry, LogKind, MaskAction, Message, MessageRevision, Page,
    PageCategory, PageFollowStatus, PageLink, PageProtection, ParseCache, Revision, Topic,
    TopicRevision, User, UserBlock, UserGroup,
};
use parking_lot::RwLock;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use time::OffsetDateTime;
use unicase::UniCase;

/// Errors surfaced by repository operations.
///
/// The repository never silently swallows a failure: every error leaves the
/// store untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An authorization check failed.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// The page does not exist.
    #[error("page '{0}' does not exist")]
    PageDoesNotExist(String),
    /// The target title is already taken.
    #[error("title '{0}' already exists")]
    TitleAlreadyExists(String),
    /// The page changed between the caller’s snapshot and the commit.
    #[error("page was edited concurrently")]
    ConcurrentEdit,
    /// The page cannot be edited at all.
    #[error("page '{0}' cannot be edited")]
    CannotEditPage(String),
    /// Special pages have no stored content to edit.
    #[error("special pages cannot be edited")]
    EditSpecialPage,
    /// The page has no revisions.
    #[error("page has no revisions")]
    NoRevisions,
    /// The masking would hide the only visible revision of a page.
    #[error("cannot mask the only visible revision of a page")]
    CannotMaskLastRevision,
    /// No revision has the given id.
    #[error("revision {0} does not exist")]
    RevisionDoesNotExist(u64),
    /// Special pages cannot be followed.
    #[error("special pages cannot be followed")]
    FollowSpecialPage,
    /// No group has the given label.
    #[error("no user group '{0}'")]
    NoSuchGroup(String),
    /// No user has the given id.
    #[error("no user with id {0}")]
    NoSuchUser(u64),
    /// The username is already taken.
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),
    /// The group may not be deleted.
    #[error("group '{0}' is not deletable")]
    GroupNotDeletable(String),
    /// The edit comment exceeds the configured length.
    #[error("comment is too long ({0} characters)")]
    CommentTooLong(usize),
    /// The reply chain would loop.
    #[error("reply would create a cycle")]
    MessageCycle,
    /// No topic has the given id.
    #[error("topic {0} does not exist")]
    TopicDoesNotExist(u64),
    /// No message has the given id.
    #[error("message {0} does not exist")]
    MessageDoesNotExist(u64),
    /// No language has the given code.
    #[error("unknown language code '{0}'")]
    UnknownLanguage(String),
    /// The parse outgrew the expansion ceiling.
    #[error("page is too large to render")]
    ParseTooLarge,
    /// No permission has the given name.
    #[error("unknown permission '{0}'")]
    UnknownPermission(String),
}

/// Filters for category membership counts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CategoryFilter {
    /// Every member.
    All,
    /// Members that are not categories themselves.
    Pages,
    /// Members in the Category namespace.
    Subcategories,
    /// Members in the File namespace.
    Files,
}

/// One page edit, ready to be committed.
///
/// `base_revision_id` is the latest revision id the caller observed when it
/// loaded the page; the commit fails with [`Error::ConcurrentEdit`] when the
/// page has moved past it.
#[derive(Debug)]
pub struct EditRequest<'a> {
    /// The acting principal.
    pub author: &'a User,
    /// Namespace of the edited page.
    pub namespace: &'static Namespace,
    /// Canonical title of the edited page.
    pub title: String,
    /// The new wikicode.
    pub content: String,
    /// The edit comment.
    pub comment: Option<String>,
    /// Whether the author marked the edit as minor.
    pub minor: bool,
    /// Whether the author wants the page on their follow list.
    pub follow: bool,
    /// For category pages, the new hidden flag.
    pub hidden_category: Option<bool>,
    /// The latest revision id the caller observed, or `None` for a page the
    /// caller believes does not exist yet.
    pub base_revision_id: Option<u64>,
}

/// The key pages are stored under. Title comparison is case-insensitive, like
/// page lookup.
type PageKey = (i32, UniCase<String>);

/// Builds a [`PageKey`].
fn key(namespace_id: i32, page_title: &str) -> PageKey {
    (namespace_id, UniCase::new(page_title.to_string()))
}

/// Matches a redirect page: the whole (trimmed) content is one redirect
/// directive.
static REDIRECT_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^@REDIRECT\[\[([^\[\]]+)\]\]$").unwrap());

/// Returns the redirect target of the given content, if it is a redirect.
pub fn redirect_target(content: &str) -> Option<(&'static Namespace, String)> {
    let captures = REDIRECT_RE.captures(content.trim())?;
    let target = captures.get(1)?.as_str();
    let canonical = title::canonicalize(target).ok()?;
    let (ns, rest) = title::split_title(&canonical);
    (!rest.is_empty()).then_some((ns, rest))
}

/// A stored page with everything hanging off it.
#[derive(Debug)]
struct PageRecord {
    /// The page row.
    page: Page,
    /// The page’s revisions, oldest first.
    revisions: Vec<Revision>,
    /// Categories the page belongs to.
    categories: Vec<PageCategory>,
    /// Pages this page links to.
    links: Vec<PageLink>,
}

/// The in-memory table set.
#[derive(Debug, Default)]
struct Store {
    pages: HashMap<PageKey, PageRecord>,
    protections: HashMap<PageKey, PageProtection>,
    follows: HashMap<(u64, PageKey), PageFollowStatus>,
    users: HashMap<u64, User>,
    users_by_name: HashMap<UniCase<String>, u64>,
    users_by_ip: HashMap<String, u64>,
    groups: IndexMap<String, UserGroup>,
    ip_blocks: HashMap<String, IpBlock>,
    topics: HashMap<u64, Topic>,
    topic_revisions: Vec<TopicRevision>,
    messages: HashMap<u64, Message>,
    message_revisions: Vec<MessageRevision>,
    logs: Vec<LogEntry>,
    next_revision_id: u64,
    next_user_id: u64,
    next_topic_id: u64,
    next_message_id: u64,
}

impl Store {
    /// Resolves the union of a user’s group permissions into the user value.
    fn resolve_user(&self, user: &User) -> User {
        let mut user = user.clone();
        user.permissions = user
            .groups
            .iter()
            .filter_map(|label| self.groups.get(label))
            .flat_map(|group| group.permissions.iter().cloned())
            .collect();
        user
    }

    /// Appends a journal entry.
    fn log(&mut self, performer_id: Option<u64>, date: OffsetDateTime, kind: LogKind) {
        self.logs.push(LogEntry {
            date,
            performer_id,
            kind,
        });
    }

    /// Finds the revision with the given id, anywhere.
    fn revision(&self, id: u64) -> Option<&Revision> {
        self.pages
            .values()
            .flat_map(|record| record.revisions.iter())
            .find(|revision| revision.id == id)
    }

    /// The latest revision of a page, by date.
    fn latest_revision<'a>(
        &'a self,
        record: &'a PageRecord,
        skip_hidden: bool,
    ) -> Option<&'a Revision> {
        record
            .revisions
            .iter()
            .filter(|revision| !skip_hidden || !revision.hidden)
            .max_by_key(|revision| revision.date)
    }

    /// Creates a brand-new account row. The caller is responsible for
    /// uniqueness checks and journaling.
    fn insert_user(&mut self, username: &str, ip: Option<&str>, now: OffsetDateTime) -> u64 {
        self.next_user_id += 1;
        let id = self.next_user_id;
        let mut groups = vec!["all".to_string()];
        if ip.is_none() {
            groups.push("user".to_string());
        }
        let user = User {
            id,
            username: username.to_string(),
            ip: ip.map(ToString::to_string),
            groups,
            permissions: BTreeSet::new(),
            language: config::DEFAULT_LANGUAGE.to_string(),
            timezone: "UTC".to_string(),
            datetime_format: None,
            gender: Gender::default(),
            dark_mode: false,
            hide_username: false,
            is_bot: false,
            follow_created_pages: false,
            follow_modified_pages: false,
            muted_users: Vec::new(),
            created_at: now,
            block: None,
        };
        self.users_by_name.insert(UniCase::new(username.to_string()), id);
        if let Some(ip) = ip {
            self.users_by_ip.insert(ip.to_string(), id);
        }
        self.users.insert(id, user);
        id
    }
}

/// The wiki’s shared data store.
#[derive(Debug)]
pub struct Repository {
    /// The table set, behind the store-wide lock.
    store: RwLock<Store>,
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository {
    /// Creates an empty repository with the built-in groups and the
    /// maintenance account.
    pub fn new() -> Self {
        let mut store = Store::default();

        let builtin: &[(&str, &[&str], bool)] = &[
            ("all", &[perms::WIKI_EDIT], false),
            ("user", &[], false),
            ("autopatrolled", &[], true),
            ("patroller", &[perms::WIKI_REVERT], true),
            (
                "administrator",
                &[
                    perms::WIKI_DELETE,
                    perms::WIKI_RENAME,
                    perms::WIKI_REVERT,
                    perms::WIKI_PROTECT,
                    perms::WIKI_MASK,
                    perms::WIKI_EDIT_USER_PAGES,
                    perms::WIKI_EDIT_INTERFACE,
                    perms::EDIT_USER_GROUPS,
                    perms::BLOCK_USERS,
                    perms::RENAME_USERS,
                    perms::MASK_USERS,
                ],
                true,
            ),
        ];
        for (label, group_perms, assignable) in builtin {
            store.groups.insert(
                (*label).to_string(),
                UserGroup {
                    label: (*label).to_string(),
                    permissions: group_perms.iter().map(ToString::to_string).collect(),
                    assignable_by_users: *assignable,
                },
            );
        }

        let now = crate::common::now();
        let setup = store.insert_user(config::SETUP_USERNAME, None, now);
        if let Some(user) = store.users.get_mut(&setup) {
            user.groups.push("administrator".to_string());
            user.is_bot = true;
        }

        Self {
            store: RwLock::new(store),
        }
    }

    // ------------------------------------------------------------------
    // Users and groups
    // ------------------------------------------------------------------

    /// Returns the acting principal for an anonymous visitor.
    ///
    /// If the visitor already has an IP-keyed account (from an earlier edit),
    /// that account is returned; otherwise an unmaterialized value with
    /// `id == 0`.
    pub fn anonymous_principal(&self, ip: &str) -> User {
        let store = self.store.read();
        if let Some(id) = store.users_by_ip.get(ip)
            && let Some(user) = store.users.get(id)
        {
            return store.resolve_user(user);
        }
        let template = User {
            id: 0,
            username: anonymous_username(ip),
            ip: Some(ip.to_string()),
            groups: vec!["all".to_string()],
            permissions: BTreeSet::new(),
            language: config::DEFAULT_LANGUAGE.to_string(),
            timezone: "UTC".to_string(),
            datetime_format: None,
            gender: Gender::default(),
            dark_mode: false,
            hide_username: false,
            is_bot: false,
            follow_created_pages: false,
            follow_modified_pages: false,
            muted_users: Vec::new(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            block: None,
        };
        store.resolve_user(&template)
    }

    /// Creates an authenticated account. The username must be free.
    pub fn create_user(&self, username: &str) -> Result<u64, Error> {
        let now = crate::common::now();
        let mut store = self.store.write();
        if store.users_by_name.contains_key(&UniCase::new(username.to_string())) {
            return Err(Error::DuplicateUsername(username.to_string()));
        }
        let id = store.insert_user(username, None, now);
        store.log(Some(id), now, LogKind::UserAccountCreation { user_id: id });
        Ok(id)
    }

    /// Fetches a user by id, with permissions resolved.
    pub fn user_by_id(&self, id: u64) -> Option<User> {
        let store = self.store.read();
        store.users.get(&id).map(|user| store.resolve_user(user))
    }

    /// Fetches a user by name (case-insensitive), with permissions resolved.
    pub fn user_by_name(&self, username: &str) -> Option<User> {
        let store = self.store.read();
        store
            .users_by_name
            .get(&UniCase::new(username.to_string()))
            .and_then(|id| store.users.get(id))
            .map(|user| store.resolve_user(user))
    }

    /// Number of accounts.
    pub fn user_count(&self) -> usize {
        self.store.read().users.len()
    }

    /// Number of accounts with at least one visible edit in the last 30 days.
    pub fn active_user_count(&self, now: OffsetDateTime) -> usize {
        let store = self.store.read();
        let since = now - time::Duration::days(30);
        let active = store
            .pages
            .values()
            .flat_map(|record| record.revisions.iter())
            .filter(|revision| !revision.hidden && revision.date >= since)
            .map(|revision| revision.author_id)
            .collect::<BTreeSet<_>>();
        active.len()
    }

    /// Number of members of the given group.
    pub fn group_member_count(&self, label: &str) -> Result<usize, Error> {
        let store = self.store.read();
        if !store.groups.contains_key(label) {
            return Err(Error::NoSuchGroup(label.to_string()));
        }
        Ok(store
            .users
            .values()
            .filter(|user| user.groups.iter().any(|g| g == label))
            .count())
    }

    /// Fetches a group by label.
    pub fn group(&self, label: &str) -> Option<UserGroup> {
        self.store.read().groups.get(label).cloned()
    }

    /// All group labels, in registration order.
    pub fn group_labels(&self) -> Vec<String> {
        self.store.read().groups.keys().cloned().collect()
    }

    /// Creates a user group. Requires `edit_user_groups` unless performed by
    /// the system.
    pub fn create_group(
        &self,
        performer: Option<&User>,
        label: &str,
        permissions: &[&str],
    ) -> Result<(), Error> {
        require(performer, perms::EDIT_USER_GROUPS)?;
        if let Some(unknown) = permissions.iter().find(|p| !perms::ALL.contains(p)) {
            return Err(Error::UnknownPermission((*unknown).to_string()));
        }
        let mut store = self.store.write();
        store.groups.insert(
            label.to_string(),
            UserGroup {
                label: label.to_string(),
                permissions: permissions.iter().map(ToString::to_string).collect(),
                assignable_by_users: true,
            },
        );
        Ok(())
    }

    /// Deletes a user group. Unassignable groups cannot be deleted.
    pub fn delete_group(&self, performer: Option<&User>, label: &str) -> Result<(), Error> {
        require(performer, perms::EDIT_USER_GROUPS)?;
        let mut store = self.store.write();
        let group = store
            .groups
            .get(label)
            .ok_or_else(|| Error::NoSuchGroup(label.to_string()))?;
        if !group.assignable_by_users {
            return Err(Error::GroupNotDeletable(label.to_string()));
        }
        store.groups.shift_remove(label);
        for user in store.users.values_mut() {
            user.groups.retain(|g| g != label);
        }
        Ok(())
    }

    /// Adds a user to a group and journals the change.
    pub fn add_user_to_group(
        &self,
        performer: Option<&User>,
        user_id: u64,
        label: &str,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        require(performer, perms::EDIT_USER_GROUPS)?;
        let now = crate::common::now();
        let mut store = self.store.write();
        if !store.groups.contains_key(label) {
            return Err(Error::NoSuchGroup(label.to_string()));
        }
        let user = store.users.get_mut(&user_id).ok_or(Error::NoSuchUser(user_id))?;
        if !user.groups.iter().any(|g| g == label) {
            user.groups.push(label.to_string());
            store.log(
                performer.map(|p| p.id),
                now,
                LogKind::UserGroupChange {
                    user_id,
                    group: label.to_string(),
                    joined: true,
                    reason: reason.map(ToString::to_string),
                },
            );
        }
        Ok(())
    }

    /// Removes a user from a group and journals the change.
    pub fn remove_user_from_group(
        &self,
        performer: Option<&User>,
        user_id: u64,
        label: &str,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        require(performer, perms::EDIT_USER_GROUPS)?;
        let now = crate::common::now();
        let mut store = self.store.write();
        let user = store.users.get_mut(&user_id).ok_or(Error::NoSuchUser(user_id))?;
        if user.groups.iter().any(|g| g == label) {
            user.groups.retain(|g| g != label);
            store.log(
                performer.map(|p| p.id),
                now,
                LogKind::UserGroupChange {
                    user_id,
                    group: label.to_string(),
                    joined: false,
                    reason: reason.map(ToString::to_string),
                },
            );
        }
        Ok(())
    }

    /// Renames an account and journals the change. Revisions keep pointing at
    /// the account through its id.
    pub fn rename_user(
        &self,
        performer: Option<&User>,
        user_id: u64,
        new_username: &str,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        require(performer, perms::RENAME_USERS)?;
        let now = crate::common::now();
        let mut store = self.store.write();
        if store
            .users_by_name
            .get(&UniCase::new(new_username.to_string()))
            .is_some_and(|existing| *existing != user_id)
        {
            return Err(Error::DuplicateUsername(new_username.to_string()));
        }
        let user = store.users.get_mut(&user_id).ok_or(Error::NoSuchUser(user_id))?;
        let old_username = std::mem::replace(&mut user.username, new_username.to_string());
        store.users_by_name.remove(&UniCase::new(old_username.clone()));
        store
            .users_by_name
            .insert(UniCase::new(new_username.to_string()), user_id);
        store.log(
            performer.map(|p| p.id),
            now,
            LogKind::UserRename {
                user_id,
                old_username,
                new_username: new_username.to_string(),
                reason: reason.map(ToString::to_string),
            },
        );
        Ok(())
    }

    /// Masks or unmasks a username from public listings.
    pub fn set_user_masked(
        &self,
        performer: Option<&User>,
        user_id: u64,
        masked: bool,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        require(performer, perms::MASK_USERS)?;
        let now = crate::common::now();
        let mut store = self.store.write();
        let user = store.users.get_mut(&user_id).ok_or(Error::NoSuchUser(user_id))?;
        user.hide_username = masked;
        store.log(
            performer.map(|p| p.id),
            now,
            LogKind::UserMask {
                user_id,
                masked,
                reason: reason.map(ToString::to_string),
            },
        );
        Ok(())
    }

    /// Sets or clears a user block and journals the change.
    pub fn set_user_block(
        &self,
        performer: Option<&User>,
        user_id: u64,
        block: Option<UserBlock>,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        require(performer, perms::BLOCK_USERS)?;
        let now = crate::common::now();
        let mut store = self.store.write();
        let user = store.users.get_mut(&user_id).ok_or(Error::NoSuchUser(user_id))?;
        let kind = match &block {
            Some(block) => LogKind::UserBlock {
                user_id,
                end_date: block.end_date,
                allow_messages_on_own_user_page: block.allow_messages_on_own_user_page,
                allow_editing_own_settings: block.allow_editing_own_settings,
                blocked: true,
                reason: reason.map(ToString::to_string),
            },
            None => LogKind::UserBlock {
                user_id,
                end_date: None,
                allow_messages_on_own_user_page: true,
                allow_editing_own_settings: true,
                blocked: false,
                reason: reason.map(ToString::to_string),
            },
        };
        user.block = block;
        store.log(performer.map(|p| p.id), now, kind);
        Ok(())
    }

    /// Sets or clears an IP block and journals the change.
    pub fn set_ip_block(
        &self,
        performer: Option<&User>,
        ip: &str,
        block: Option<IpBlock>,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        require(performer, perms::BLOCK_USERS)?;
        let now = crate::common::now();
        let mut store = self.store.write();
        let kind = match &block {
            Some(block) => LogKind::IpBlock {
                ip: ip.to_string(),
                end_date: block.end_date,
                allow_messages_on_own_user_page: block.allow_messages_on_own_user_page,
                allow_account_creation: block.allow_account_creation,
                blocked: true,
                reason: reason.map(ToString::to_string),
            },
            None => LogKind::IpBlock {
                ip: ip.to_string(),
                end_date: None,
                allow_messages_on_own_user_page: true,
                allow_account_creation: true,
                blocked: false,
                reason: reason.map(ToString::to_string),
            },
        };
        match block {
            Some(block) => {
                store.ip_blocks.insert(ip.to_string(), block);
            }
            None => {
                store.ip_blocks.remove(ip);
            }
        }
        store.log(performer.map(|p| p.id), now, kind);
        Ok(())
    }

    /// Fetches the block for an IP address, if any.
    pub fn ip_block(&self, ip: &str) -> Option<IpBlock> {
        self.store.read().ip_blocks.get(ip).cloned()
    }

    /// Adds or removes a username on a user’s notification mute list.
    pub fn set_user_muted(&self, user_id: u64, target: &str, muted: bool) -> Result<(), Error> {
        let mut store = self.store.write();
        let user = store.users.get_mut(&user_id).ok_or(Error::NoSuchUser(user_id))?;
        if muted {
            if !user.muted_users.iter().any(|name| name == target) {
                user.muted_users.push(target.to_string());
            }
        } else {
            user.muted_users.retain(|name| name != target);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pages
    // ------------------------------------------------------------------

    /// Fetches a page. Always returns a value; pages that are not stored come
    /// back as shadow instances with `exists == false`.
    pub fn get(&self, ns: &'static Namespace, page_title: &str) -> Page {
        let store = self.store.read();
        match store.pages.get(&key(ns.id, page_title)) {
            Some(record) if !record.page.deleted => {
                let mut page = record.page.clone();
                page.exists = true;
                page
            }
            Some(record) => {
                let mut page = record.page.clone();
                page.exists = false;
                page
            }
            None => Page::shadow(ns, page_title),
        }
    }

    /// Commits one edit. See [`EditRequest`] for the concurrency contract.
    ///
    /// The revision insert, the link/category index refresh, the follow-list
    /// upsert, and the cache invalidation all commit atomically.
    pub fn edit(&self, request: EditRequest<'_>) -> Result<u64, Error> {
        let now = crate::common::now();
        let ns = request.namespace;
        if ns.id == Namespace::SPECIAL {
            return Err(Error::EditSpecialPage);
        }
        if !ns.is_editable {
            return Err(Error::CannotEditPage(ns.full_title(&request.title)));
        }
        auth::can_edit(self, request.author, ns, &request.title, now)?;
        if let Some(comment) = &request.comment
            && comment.chars().count() > config::COMMENT_MAX_LENGTH
        {
            return Err(Error::CommentTooLong(comment.chars().count()));
        }

        // Parsing-dependent work happens before the transaction so the parser
        // can freely read through the repository.
        let page_snapshot = self.get(ns, &request.title);
        let (links, categories) =
            crate::parser::extract_metadata(self, &page_snapshot, &request.content, now);
        let redirect = redirect_target(&request.content).map(|(ns, t)| (ns.id, t));

        let mut store = self.store.write();
        let page_key = key(ns.id, &request.title);

        let latest_id = store
            .pages
            .get(&page_key)
            .and_then(|record| store.latest_revision(record, false))
            .map(|revision| revision.id);
        if latest_id != request.base_revision_id {
            return Err(Error::ConcurrentEdit);
        }

        // First edits from anonymous visitors materialize an IP-keyed account.
        let author_id = if request.author.id != 0 {
            request.author.id
        } else if let Some(ip) = &request.author.ip {
            if let Some(id) = store.users_by_ip.get(ip) {
                *id
            } else {
                let id = store.insert_user(&anonymous_username(ip), Some(ip), now);
                store.log(Some(id), now, LogKind::UserAccountCreation { user_id: id });
                id
            }
        } else {
            return Err(Error::NoSuchUser(0));
        };

        let created = !store
            .pages
            .get(&page_key)
            .is_some_and(|record| !record.page.deleted);
        let had_revisions = store
            .pages
            .get(&page_key)
            .is_some_and(|record| !record.revisions.is_empty());

        let author = store
            .users
            .get(&author_id)
            .cloned()
            .ok_or(Error::NoSuchUser(author_id))?;
        let author_authenticated = author.ip.is_none();
        let auto_follow = (created && author.follow_created_pages) || author.follow_modified_pages;

        store.next_revision_id += 1;
        let revision_id = store.next_revision_id;

        let record = store.pages.entry(page_key.clone()).or_insert_with(|| PageRecord {
            page: Page {
                exists: true,
                ..Page::shadow(ns, &request.title)
            },
            revisions: Vec::new(),
            categories: Vec::new(),
            links: Vec::new(),
        });
        record.page.deleted = false;
        record.page.exists = true;
        if ns.id == Namespace::CATEGORY
            && let Some(hidden) = request.hidden_category
        {
            record.page.is_category_hidden = Some(hidden);
        }

        // Two revisions by one author can never share an instant.
        let mut date = now;
        while record
            .revisions
            .iter()
            .any(|revision| revision.author_id == author_id && revision.date == date)
        {
            date += time::Duration::microseconds(1);
        }

        record.revisions.push(Revision {
            id: revision_id,
            namespace_id: ns.id,
            title: request.title.clone(),
            date,
            author_id,
            comment: request.comment.clone(),
            comment_hidden: false,
            hidden: false,
            is_minor: request.minor,
            is_bot: author.is_bot,
            tags: Vec::new(),
            content: request.content.clone(),
            page_creation: !had_revisions,
        });
        record.links = links;
        record.categories = categories;
        record.page.redirects_to = redirect;
        record.page.cache = None;

        if created {
            store.log(
                Some(author_id),
                now,
                LogKind::PageCreation {
                    namespace_id: ns.id,
                    title: request.title.clone(),
                },
            );
        }

        if author_authenticated {
            let follow_key = (author_id, page_key);
            if request.follow || auto_follow {
                store.follows.entry(follow_key).or_insert(PageFollowStatus {
                    user_id: author_id,
                    namespace_id: ns.id,
                    title: request.title.clone(),
                    end_date: None,
                });
            } else {
                store.follows.remove(&follow_key);
            }
        }

        Ok(revision_id)
    }

    /// Logically deletes a page. Revisions are preserved.
    pub fn delete(
        &self,
        performer: &User,
        ns: &'static Namespace,
        page_title: &str,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        require(Some(performer), perms::WIKI_DELETE)?;
        let now = crate::common::now();
        let mut store = self.store.write();
        let record = store
            .pages
            .get_mut(&key(ns.id, page_title))
            .filter(|record| !record.page.deleted)
            .ok_or_else(|| Error::PageDoesNotExist(ns.full_title(page_title)))?;
        record.page.deleted = true;
        record.page.cache = None;
        store.log(
            Some(performer.id),
            now,
            LogKind::PageDeletion {
                namespace_id: ns.id,
                title: page_title.to_string(),
                reason: reason.map(ToString::to_string),
            },
        );
        Ok(())
    }

    /// Renames a page within its namespace, optionally leaving a redirect
    /// page behind at the old title.
    pub fn rename(
        &self,
        performer: &User,
        ns: &'static Namespace,
        page_title: &str,
        new_title: &str,
        leave_redirect: bool,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        require(Some(performer), perms::WIKI_RENAME)?;
        let now = crate::common::now();
        let mut store = self.store.write();
        let old_key = key(ns.id, page_title);
        let new_key = key(ns.id, new_title);
        if !store
            .pages
            .get(&old_key)
            .is_some_and(|record| !record.page.deleted)
        {
            return Err(Error::PageDoesNotExist(ns.full_title(page_title)));
        }
        if store
            .pages
            .get(&new_key)
            .is_some_and(|record| !record.page.deleted)
        {
            return Err(Error::TitleAlreadyExists(ns.full_title(new_title)));
        }

        let mut record = store.pages.remove(&old_key).ok_or(Error::ConcurrentEdit)?;
        record.page.title = new_title.to_string();
        record.page.cache = None;
        for revision in &mut record.revisions {
            revision.title = new_title.to_string();
        }
        store.pages.insert(new_key, record);

        if leave_redirect {
            store.next_revision_id += 1;
            let revision_id = store.next_revision_id;
            let full_new = ns.full_title(new_title);
            let content = redirect_wikicode(&full_new);
            store.pages.insert(
                old_key,
                PageRecord {
                    page: Page {
                        exists: true,
                        redirects_to: Some((ns.id, new_title.to_string())),
                        ..Page::shadow(ns, page_title)
                    },
                    revisions: vec![Revision {
                        id: revision_id,
                        namespace_id: ns.id,
                        title: page_title.to_string(),
                        date: now,
                        author_id: performer.id,
                        comment: reason.map(ToString::to_string),
                        comment_hidden: false,
                        hidden: false,
                        is_minor: false,
                        is_bot: performer.is_bot,
                        tags: Vec::new(),
                        content,
                        page_creation: true,
                    }],
                    categories: Vec::new(),
                    links: vec![PageLink {
                        namespace_id: ns.id,
                        title: new_title.to_string(),
                    }],
                },
            );
        }

        store.log(
            Some(performer.id),
            now,
            LogKind::PageRename {
                namespace_id: ns.id,
                old_title: page_title.to_string(),
                new_title: new_title.to_string(),
                reason: reason.map(ToString::to_string),
                leave_redirect,
            },
        );
        Ok(())
    }

    /// Protects a page (existing or not) at the given group level.
    pub fn protect(
        &self,
        performer: &User,
        ns: &'static Namespace,
        page_title: &str,
        level: &str,
        protect_talks: bool,
        reason: Option<&str>,
        end_date: Option<OffsetDateTime>,
    ) -> Result<(), Error> {
        require(Some(performer), perms::WIKI_PROTECT)?;
        let now = crate::common::now();
        let mut store = self.store.write();
        if !store.groups.contains_key(level) {
            return Err(Error::NoSuchGroup(level.to_string()));
        }
        store.protections.insert(
            key(ns.id, page_title),
            PageProtection {
                namespace_id: ns.id,
                title: page_title.to_string(),
                end_date,
                reason: reason.map(ToString::to_string),
                protection_level: level.to_string(),
                protect_talks,
            },
        );
        store.log(
            Some(performer.id),
            now,
            LogKind::PageProtection {
                namespace_id: ns.id,
                title: page_title.to_string(),
                end_date,
                reason: reason.map(ToString::to_string),
                protection_level: level.to_string(),
                protect_talks,
            },
        );
        Ok(())
    }

    /// Fetches the protection status for a page, if any.
    pub fn protection(&self, namespace_id: i32, page_title: &str) -> Option<PageProtection> {
        self.store
            .read()
            .protections
            .get(&key(namespace_id, page_title))
            .cloned()
    }

    /// Installs a protection row directly, without authorization or
    /// journaling. Test scaffolding.
    #[cfg(test)]
    pub(crate) fn insert_protection(&self, protection: PageProtection) {
        let mut store = self.store.write();
        store
            .protections
            .insert(key(protection.namespace_id, &protection.title), protection);
    }

    /// Masks or unmasks a set of revisions.
    ///
    /// Fails with [`Error::CannotMaskLastRevision`] when the set would hide
    /// the only remaining visible revision of any page.
    pub fn mask_revisions(
        &self,
        performer: &User,
        revision_ids: &[u64],
        action: MaskAction,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        require(Some(performer), perms::WIKI_MASK)?;
        let now = crate::common::now();
        let mut store = self.store.write();

        for id in revision_ids {
            if store.revision(*id).is_none() {
                return Err(Error::RevisionDoesNotExist(*id));
            }
        }

        if matches!(action, MaskAction::MaskFully) {
            for record in store.pages.values() {
                let remaining = record
                    .revisions
                    .iter()
                    .filter(|revision| !revision.hidden && !revision_ids.contains(&revision.id))
                    .count();
                let targeted = record
                    .revisions
                    .iter()
                    .any(|revision| revision_ids.contains(&revision.id));
                if targeted && remaining == 0 {
                    return Err(Error::CannotMaskLastRevision);
                }
            }
        }

        for record in store.pages.values_mut() {
            for revision in &mut record.revisions {
                if revision_ids.contains(&revision.id) {
                    match action {
                        MaskAction::MaskFully => {
                            revision.hidden = true;
                            revision.comment_hidden = true;
                        }
                        MaskAction::MaskCommentsOnly => {
                            revision.comment_hidden = true;
                        }
                        MaskAction::UnmaskAll => {
                            revision.hidden = false;
                            revision.comment_hidden = false;
                        }
                        MaskAction::UnmaskAllButComments => {
                            revision.hidden = false;
                            revision.comment_hidden = true;
                        }
                    }
                }
            }
        }

        for id in revision_ids {
            store.log(
                Some(performer.id),
                now,
                LogKind::RevisionMask {
                    revision_id: *id,
                    action,
                    reason: reason.map(ToString::to_string),
                },
            );
        }
        Ok(())
    }

    /// Adds or removes a follow-list entry. A no-op for anonymous principals
    /// and idempotent in both directions.
    pub fn follow(
        &self,
        user: &User,
        ns: &'static Namespace,
        page_title: &str,
        follow: bool,
    ) -> Result<bool, Error> {
        if ns.id == Namespace::SPECIAL {
            return Err(Error::FollowSpecialPage);
        }
        if user.is_anonymous() || user.id == 0 {
            return Ok(false);
        }
        let mut store = self.store.write();
        let follow_key = (user.id, key(ns.id, page_title));
        if follow {
            store.follows.entry(follow_key).or_insert(PageFollowStatus {
                user_id: user.id,
                namespace_id: ns.id,
                title: page_title.to_string(),
                end_date: None,
            });
        } else {
            store.follows.remove(&follow_key);
        }
        Ok(true)
    }

    /// Whether a user’s follow-list currently covers a page.
    pub fn is_following(&self, user_id: u64, namespace_id: i32, page_title: &str) -> bool {
        let now = crate::common::now();
        self.store
            .read()
            .follows
            .get(&(user_id, key(namespace_id, page_title)))
            .is_some_and(|status| status.is_active(now))
    }

    /// A user’s follow-list entries.
    pub fn follow_list(&self, user_id: u64) -> Vec<PageFollowStatus> {
        let mut list = self
            .store
            .read()
            .follows
            .values()
            .filter(|status| status.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        list.sort_by(|a, b| (a.namespace_id, &a.title).cmp(&(b.namespace_id, &b.title)));
        list
    }

    /// Clears a user’s follow-list. Returns the number of removed entries.
    pub fn clear_follow_list(&self, user_id: u64) -> usize {
        let mut store = self.store.write();
        let before = store.follows.len();
        store.follows.retain(|(owner, _), _| *owner != user_id);
        before - store.follows.len()
    }

    /// Changes the content language of a page. The performer must be able to
    /// edit the page.
    pub fn set_content_language(
        &self,
        performer: &User,
        ns: &'static Namespace,
        page_title: &str,
        language: &str,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        let now = crate::common::now();
        auth::can_edit(self, performer, ns, page_title, now)?;
        if config::language(language).is_none() {
            return Err(Error::UnknownLanguage(language.to_string()));
        }
        let mut store = self.store.write();
        let record = store
            .pages
            .get_mut(&key(ns.id, page_title))
            .filter(|record| !record.page.deleted)
            .ok_or_else(|| Error::PageDoesNotExist(ns.full_title(page_title)))?;
        record.page.content_language = language.to_string();
        record.page.cache = None;
        store.log(
            Some(performer.id),
            now,
            LogKind::PageContentLanguage {
                namespace_id: ns.id,
                title: page_title.to_string(),
                language: language.to_string(),
                reason: reason.map(ToString::to_string),
            },
        );
        Ok(())
    }

    /// Changes the content type of a page. The performer must be able to edit
    /// the page.
    pub fn set_content_type(
        &self,
        performer: &User,
        ns: &'static Namespace,
        page_title: &str,
        content_type: ContentType,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        let now = crate::common::now();
        auth::can_edit(self, performer, ns, page_title, now)?;
        let mut store = self.store.write();
        let record = store
            .pages
            .get_mut(&key(ns.id, page_title))
            .filter(|record| !record.page.deleted)
            .ok_or_else(|| Error::PageDoesNotExist(ns.full_title(page_title)))?;
        record.page.content_type = content_type;
        record.page.cache = None;
        store.log(
            Some(performer.id),
            now,
            LogKind::PageContentType {
                namespace_id: ns.id,
                title: page_title.to_string(),
                content_type,
                reason: reason.map(ToString::to_string),
            },
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Revisions
    // ------------------------------------------------------------------

    /// The latest revision of a page, optionally skipping masked ones.
    pub fn latest_revision(
        &self,
        namespace_id: i32,
        page_title: &str,
        skip_hidden: bool,
    ) -> Option<Revision> {
        let store = self.store.read();
        let record = store.pages.get(&key(namespace_id, page_title))?;
        store.latest_revision(record, skip_hidden).cloned()
    }

    /// Fetches a revision by id.
    pub fn revision(&self, id: u64) -> Option<Revision> {
        self.store.read().revision(id).cloned()
    }

    /// All revisions of a page, oldest first.
    pub fn revisions(&self, namespace_id: i32, page_title: &str) -> Vec<Revision> {
        let store = self.store.read();
        let Some(record) = store.pages.get(&key(namespace_id, page_title)) else {
            return Vec::new();
        };
        let mut revisions = record.revisions.clone();
        revisions.sort_by_key(|revision| revision.date);
        revisions
    }

    /// The revision that follows the given one on the same page, by date.
    pub fn next_revision(&self, id: u64, skip_hidden: bool) -> Option<Revision> {
        let store = self.store.read();
        let revision = store.revision(id)?;
        let record = store.pages.get(&key(revision.namespace_id, &revision.title))?;
        record
            .revisions
            .iter()
            .filter(|other| other.date > revision.date && (!skip_hidden || !other.hidden))
            .min_by_key(|other| other.date)
            .cloned()
    }

    /// The revision that precedes the given one on the same page, by date.
    pub fn previous_revision(&self, id: u64, skip_hidden: bool) -> Option<Revision> {
        let store = self.store.read();
        let revision = store.revision(id)?;
        let record = store.pages.get(&key(revision.namespace_id, &revision.title))?;
        record
            .revisions
            .iter()
            .filter(|other| other.date < revision.date && (!skip_hidden || !other.hidden))
            .max_by_key(|other| other.date)
            .cloned()
    }

    /// Whether the revision is the newest of its page.
    pub fn is_latest(&self, id: u64, skip_hidden: bool) -> bool {
        self.revision(id).is_some() && self.next_revision(id, skip_hidden).is_none()
    }

    /// Whether the revision is the oldest of its page.
    pub fn is_first(&self, id: u64, skip_hidden: bool) -> bool {
        self.revision(id).is_some() && self.previous_revision(id, skip_hidden).is_none()
    }

    /// The byte-size difference of a revision against its predecessor, or
    /// against zero for the first revision.
    pub fn byte_size_diff(&self, id: u64, skip_hidden: bool) -> Option<i64> {
        let revision = self.revision(id)?;
        let size = i64::try_from(revision.byte_size()).ok()?;
        Some(match self.previous_revision(id, skip_hidden) {
            Some(previous) => size - i64::try_from(previous.byte_size()).ok()?,
            None => size,
        })
    }

    /// The current (latest visible) content of a page, or the empty string.
    pub fn content(&self, namespace_id: i32, page_title: &str) -> String {
        self.latest_revision(namespace_id, page_title, true)
            .map(|revision| revision.content)
            .unwrap_or_default()
    }

    /// Writes back a successful parse into the page’s cache block.
    pub fn store_parse(
        &self,
        namespace_id: i32,
        page_title: &str,
        cache: ParseCache,
    ) -> Result<(), Error> {
        let mut store = self.store.write();
        let ns = Namespace::find_by_id(namespace_id).unwrap_or_else(Namespace::main);
        let record = store
            .pages
            .get_mut(&key(namespace_id, page_title))
            .ok_or_else(|| Error::PageDoesNotExist(ns.full_title(page_title)))?;
        record.page.cache = Some(cache);
        Ok(())
    }

    /// Returns the rendered HTML of a page, through the parse cache.
    ///
    /// With `revision_id` set, the specific revision is parsed and the cache
    /// is left alone; otherwise the cached parse is served when it is still
    /// valid for the latest visible revision, and refreshed when it is not.
    pub fn rendered_page(
        &self,
        ns: &'static Namespace,
        page_title: &str,
        revision_id: Option<u64>,
        now: OffsetDateTime,
    ) -> Result<crate::parser::ParseOutput, Error> {
        let page = self.get(ns, page_title);
        if !page.exists {
            return Err(Error::PageDoesNotExist(ns.full_title(page_title)));
        }

        if let Some(id) = revision_id {
            let revision = self
                .revision(id)
                .filter(|revision| {
                    revision.namespace_id == ns.id
                        && UniCase::new(revision.title.clone()) == UniCase::new(page_title.to_string())
                })
                .ok_or(Error::RevisionDoesNotExist(id))?;
            let content = revision.content.clone();
            return crate::parser::parse(self, &page, Some(&revision), &content, now)
                .map_err(|_| Error::ParseTooLarge);
        }

        let revision = self
            .latest_revision(ns.id, page_title, true)
            .ok_or(Error::NoRevisions)?;
        if let Some(cache) = &page.cache
            && cache.revision_id == revision.id
            && cache.expiry_date > now
        {
            return Ok(crate::parser::ParseOutput {
                html: cache.content.clone(),
                metadata: crate::parser::ParsingMetadata {
                    links: self.page_links(ns.id, page_title),
                    categories: self.page_categories(ns.id, page_title),
                    parse_duration_ms: cache.duration_ms,
                    parse_date: cache.date,
                    size_before: cache.size_before,
                    size_after: cache.size_after,
                    template_tag_error: false,
                },
                display_title: None,
                default_sort_key: None,
            });
        }

        self.refresh_parse(ns, page_title, now)
    }

    /// Re-parses the latest visible revision of a page and stores the result
    /// in the parse cache.
    pub fn refresh_parse(
        &self,
        ns: &'static Namespace,
        page_title: &str,
        now: OffsetDateTime,
    ) -> Result<crate::parser::ParseOutput, Error> {
        let page = self.get(ns, page_title);
        if !page.exists {
            return Err(Error::PageDoesNotExist(ns.full_title(page_title)));
        }
        let revision = self
            .latest_revision(ns.id, page_title, true)
            .ok_or(Error::NoRevisions)?;
        let content = revision.content.clone();
        let output = crate::parser::parse(self, &page, Some(&revision), &content, now)
            .map_err(|_| Error::ParseTooLarge)?;
        self.store_parse(
            ns.id,
            page_title,
            ParseCache {
                content: output.html.clone(),
                revision_id: revision.id,
                duration_ms: output.metadata.parse_duration_ms,
                date: output.metadata.parse_date,
                expiry_date: now + config::PARSE_CACHE_TTL,
                size_before: output.metadata.size_before,
                size_after: output.metadata.size_after,
            },
        )?;
        Ok(output)
    }

    // ------------------------------------------------------------------
    // Derived data and statistics
    // ------------------------------------------------------------------

    /// Number of non-deleted pages.
    pub fn page_count(&self) -> usize {
        self.store
            .read()
            .pages
            .values()
            .filter(|record| !record.page.deleted)
            .count()
    }

    /// Number of non-deleted, non-redirect pages in content namespaces.
    pub fn article_count(&self) -> usize {
        self.store
            .read()
            .pages
            .values()
            .filter(|record| {
                !record.page.deleted
                    && record.page.redirects_to.is_none()
                    && record.page.namespace().is_content
            })
            .count()
    }

    /// Number of non-deleted pages in the File namespace.
    pub fn file_count(&self) -> usize {
        self.pages_in_namespace(Namespace::FILE)
    }

    /// Number of visible (unmasked) page revisions.
    pub fn edit_count(&self) -> usize {
        self.store
            .read()
            .pages
            .values()
            .flat_map(|record| record.revisions.iter())
            .filter(|revision| !revision.hidden)
            .count()
    }

    /// Number of non-deleted pages in a namespace.
    pub fn pages_in_namespace(&self, namespace_id: i32) -> usize {
        self.store
            .read()
            .pages
            .values()
            .filter(|record| !record.page.deleted && record.page.namespace_id == namespace_id)
            .count()
    }

    /// Number of members of a category under the given filter.
    pub fn pages_in_category(&self, cat_title: &str, filter: CategoryFilter) -> usize {
        let store = self.store.read();
        store
            .pages
            .values()
            .filter(|record| !record.page.deleted)
            .filter(|record| {
                record
                    .categories
                    .iter()
                    .any(|category| category.cat_title == cat_title)
            })
            .filter(|record| match filter {
                CategoryFilter::All => true,
                CategoryFilter::Pages => record.page.namespace_id != Namespace::CATEGORY,
                CategoryFilter::Subcategories => record.page.namespace_id == Namespace::CATEGORY,
                CategoryFilter::Files => record.page.namespace_id == Namespace::FILE,
            })
            .count()
    }

    /// Members of a category, with their effective sort keys.
    pub fn category_members(&self, cat_title: &str) -> Vec<(Page, String)> {
        let store = self.store.read();
        let mut members = store
            .pages
            .values()
            .filter(|record| !record.page.deleted)
            .filter_map(|record| {
                record
                    .categories
                    .iter()
                    .find(|category| category.cat_title == cat_title)
                    .map(|category| {
                        let sort_key = category
                            .sort_key
                            .clone()
                            .unwrap_or_else(|| record.page.default_sort_key().to_string());
                        (record.page.clone(), sort_key)
                    })
            })
            .collect::<Vec<_>>();
        members.sort_by(|a, b| a.1.cmp(&b.1));
        members
    }

    /// Categories a page belongs to.
    pub fn page_categories(&self, namespace_id: i32, page_title: &str) -> Vec<PageCategory> {
        self.store
            .read()
            .pages
            .get(&key(namespace_id, page_title))
            .map(|record| record.categories.clone())
            .unwrap_or_default()
    }

    /// Link targets embedded in a page.
    pub fn page_links(&self, namespace_id: i32, page_title: &str) -> Vec<PageLink> {
        self.store
            .read()
            .pages
            .get(&key(namespace_id, page_title))
            .map(|record| record.links.clone())
            .unwrap_or_default()
    }

    /// Pages whose content links to the given page.
    pub fn links_to(&self, namespace_id: i32, page_title: &str) -> Vec<Page> {
        let target = UniCase::new(page_title.to_string());
        self.store
            .read()
            .pages
            .values()
            .filter(|record| !record.page.deleted)
            .filter(|record| {
                record.links.iter().any(|link| {
                    link.namespace_id == namespace_id && UniCase::new(link.title.clone()) == target
                })
            })
            .map(|record| record.page.clone())
            .collect()
    }

    /// Pages that redirect to the given page.
    pub fn redirects_to(&self, namespace_id: i32, page_title: &str) -> Vec<Page> {
        let target = UniCase::new(page_title.to_string());
        self.store
            .read()
            .pages
            .values()
            .filter(|record| !record.page.deleted)
            .filter(|record| {
                record.page.redirects_to.as_ref().is_some_and(|(ns, t)| {
                    *ns == namespace_id && UniCase::new(t.clone()) == target
                })
            })
            .map(|record| record.page.clone())
            .collect()
    }

    /// Non-deleted subpages of the given page.
    pub fn subpages(&self, ns: &'static Namespace, page_title: &str) -> Vec<Page> {
        if !ns.allows_subpages {
            return Vec::new();
        }
        let prefix = format!("{page_title}/");
        let mut pages = self
            .store
            .read()
            .pages
            .values()
            .filter(|record| !record.page.deleted && record.page.namespace_id == ns.id)
            .filter(|record| record.page.title.starts_with(&prefix))
            .map(|record| record.page.clone())
            .collect::<Vec<_>>();
        pages.sort_by(|a, b| a.title.cmp(&b.title));
        pages
    }

    /// Visible revisions authored by the given user, newest first.
    pub fn contributions(&self, username: &str) -> Vec<Revision> {
        let Some(user) = self.user_by_name(username) else {
            return Vec::new();
        };
        let store = self.store.read();
        let mut revisions = store
            .pages
            .values()
            .flat_map(|record| record.revisions.iter())
            .filter(|revision| revision.author_id == user.id && !revision.hidden)
            .cloned()
            .collect::<Vec<_>>();
        revisions.sort_by_key(|revision| std::cmp::Reverse(revision.date));
        revisions
    }

    /// The most recent visible revisions across the whole wiki, newest first.
    pub fn recent_changes(&self, limit: usize) -> Vec<Revision> {
        let store = self.store.read();
        let mut revisions = store
            .pages
            .values()
            .filter(|record| !record.page.deleted)
            .flat_map(|record| record.revisions.iter())
            .filter(|revision| !revision.hidden)
            .cloned()
            .collect::<Vec<_>>();
        revisions.sort_by_key(|revision| std::cmp::Reverse(revision.date));
        revisions.truncate(limit);
        revisions
    }

    /// A uniformly random non-deleted content page, if any exist.
    pub fn random_page(&self) -> Option<Page> {
        let store = self.store.read();
        let candidates = store
            .pages
            .values()
            .filter(|record| !record.page.deleted && record.page.namespace().is_content)
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return None;
        }
        let mut rng = SmallRng::from_os_rng();
        let index = rng.random_range(0..candidates.len());
        Some(candidates[index].page.clone())
    }

    /// Pages whose parse cache has lapsed, as `(namespace_id, title)` keys.
    pub fn pages_with_expired_cache(&self, now: OffsetDateTime) -> Vec<(i32, String)> {
        self.store
            .read()
            .pages
            .values()
            .filter(|record| !record.page.deleted)
            .filter(|record| {
                record
                    .page
                    .cache
                    .as_ref()
                    .is_some_and(|cache| cache.expiry_date <= now)
            })
            .map(|record| (record.page.namespace_id, record.page.title.clone()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Expiry sweeps
    // ------------------------------------------------------------------

    /// Removes protections whose end date has passed. Returns the count.
    pub fn delete_expired_page_protections(&self, now: OffsetDateTime) -> usize {
        let mut store = self.store.write();
        let before = store.protections.len();
        store
            .protections
            .retain(|_, protection| protection.end_date.is_none_or(|end| end > now));
        before - store.protections.len()
    }

    /// Removes follow-list entries whose end date has passed.
    pub fn delete_expired_page_follows(&self, now: OffsetDateTime) -> usize {
        let mut store = self.store.write();
        let before = store.follows.len();
        store
            .follows
            .retain(|_, status| status.end_date.is_none_or(|end| end > now));
        before - store.follows.len()
    }

    /// Removes user blocks whose end date has passed.
    pub fn delete_expired_user_blocks(&self, now: OffsetDateTime) -> usize {
        let mut store = self.store.write();
        let mut removed = 0;
        for user in store.users.values_mut() {
            if user
                .block
                .as_ref()
                .is_some_and(|block| block.end_date.is_some_and(|end| end <= now))
            {
                user.block = None;
                removed += 1;
            }
        }
        removed
    }

    /// Removes IP blocks whose end date has passed.
    pub fn delete_expired_ip_blocks(&self, now: OffsetDateTime) -> usize {
        let mut store = self.store.write();
        let before = store.ip_blocks.len();
        store
            .ip_blocks
            .retain(|_, block| block.end_date.is_none_or(|end| end > now));
        before - store.ip_blocks.len()
    }

    // ------------------------------------------------------------------
    // Talk threads
    // ------------------------------------------------------------------

    /// Opens a talk topic under a page.
    pub fn create_topic(
        &self,
        author: &User,
        ns: &'static Namespace,
        page_title: &str,
        topic_title: &str,
    ) -> Result<u64, Error> {
        let now = crate::common::now();
        auth::can_post_messages(self, author, ns, page_title, now)?;
        let mut store = self.store.write();
        store.next_topic_id += 1;
        let id = store.next_topic_id;
        store.topics.insert(
            id,
            Topic {
                id,
                namespace_id: ns.id,
                title: page_title.to_string(),
                author_id: author.id,
                date: now,
                deleted: false,
            },
        );
        store.next_revision_id += 1;
        let revision_id = store.next_revision_id;
        store.topic_revisions.push(TopicRevision {
            id: revision_id,
            topic_id: id,
            date: now,
            author_id: author.id,
            title: topic_title.to_string(),
            hidden: false,
        });
        Ok(id)
    }

    /// Posts a message under a topic, optionally as a reply.
    ///
    /// Parent pointers must form a tree; a reply whose ancestor chain loops
    /// is rejected.
    pub fn post_message(
        &self,
        author: &User,
        topic_id: u64,
        text: &str,
        response_to: Option<u64>,
    ) -> Result<u64, Error> {
        let now = crate::common::now();
        let (namespace_id, page_title) = {
            let store = self.store.read();
            let topic = store
                .topics
                .get(&topic_id)
                .filter(|topic| !topic.deleted)
                .ok_or(Error::TopicDoesNotExist(topic_id))?;
            (topic.namespace_id, topic.title.clone())
        };
        let ns = Namespace::find_by_id(namespace_id).unwrap_or_else(Namespace::main);
        auth::can_post_messages(self, author, ns, &page_title, now)?;

        let mut store = self.store.write();
        if let Some(parent_id) = response_to {
            let parent = store
                .messages
                .get(&parent_id)
                .ok_or(Error::MessageDoesNotExist(parent_id))?;
            if parent.topic_id != topic_id {
                return Err(Error::MessageDoesNotExist(parent_id));
            }
            // Walk the ancestor chain; a repeat visit means the stored tree
            // is already broken, and the insert must not extend it.
            let mut seen = BTreeSet::new();
            let mut cursor = Some(parent_id);
            while let Some(id) = cursor {
                if !seen.insert(id) {
                    return Err(Error::MessageCycle);
                }
                cursor = store.messages.get(&id).and_then(|message| message.response_to);
            }
        }

        store.next_message_id += 1;
        let id = store.next_message_id;
        store.messages.insert(
            id,
            Message {
                id,
                topic_id,
                author_id: author.id,
                date: now,
                response_to,
                deleted: false,
            },
        );
        store.next_revision_id += 1;
        let revision_id = store.next_revision_id;
        store.message_revisions.push(MessageRevision {
            id: revision_id,
            message_id: id,
            date: now,
            author_id: author.id,
            text: text.to_string(),
            hidden: false,
        });
        Ok(id)
    }

    /// Topics opened under a page, oldest first.
    pub fn topics_of_page(&self, namespace_id: i32, page_title: &str) -> Vec<Topic> {
        let needle = UniCase::new(page_title.to_string());
        let mut topics = self
            .store
            .read()
            .topics
            .values()
            .filter(|topic| {
                !topic.deleted
                    && topic.namespace_id == namespace_id
                    && UniCase::new(topic.title.clone()) == needle
            })
            .cloned()
            .collect::<Vec<_>>();
        topics.sort_by_key(|topic| topic.date);
        topics
    }

    /// The current (latest visible) title of a topic, or the empty string.
    pub fn topic_title(&self, topic_id: u64) -> String {
        self.store
            .read()
            .topic_revisions
            .iter()
            .filter(|revision| revision.topic_id == topic_id && !revision.hidden)
            .max_by_key(|revision| revision.date)
            .map(|revision| revision.title.clone())
            .unwrap_or_default()
    }

    /// Messages of a topic, oldest first.
    pub fn messages_of_topic(&self, topic_id: u64) -> Vec<Message> {
        let mut messages = self
            .store
            .read()
            .messages
            .values()
            .filter(|message| !message.deleted && message.topic_id == topic_id)
            .cloned()
            .collect::<Vec<_>>();
        messages.sort_by_key(|message| message.date);
        messages
    }

    /// The current (latest visible) text of a message, or the empty string.
    pub fn message_text(&self, message_id: u64) -> String {
        self.store
            .read()
            .message_revisions
            .iter()
            .filter(|revision| revision.message_id == message_id && !revision.hidden)
            .max_by_key(|revision| revision.date)
            .map(|revision| revision.text.clone())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Journal
    // ------------------------------------------------------------------

    /// The full operation journal, oldest first.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.store.read().logs.clone()
    }

    /// Journal entries that reference the given page.
    pub fn related_logs(&self, namespace_id: i32, page_title: &str) -> Vec<LogEntry> {
        let needle = UniCase::new(page_title.to_string());
        let matches = |ns: i32, title: &str| {
            ns == namespace_id && UniCase::new(title.to_string()) == needle
        };
        self.store
            .read()
            .logs
            .iter()
            .filter(|entry| match &entry.kind {
                LogKind::PageCreation { namespace_id, title }
                | LogKind::PageDeletion { namespace_id, title, .. }
                | LogKind::PageProtection { namespace_id, title, .. }
                | LogKind::PageContentLanguage { namespace_id, title, .. }
                | LogKind::PageContentType { namespace_id, title, .. } => {
                    matches(*namespace_id, title)
                }
                LogKind::PageRename {
                    namespace_id,
                    old_title,
                    new_title,
                    ..
                } => matches(*namespace_id, old_title) || matches(*namespace_id, new_title),
                _ => false,
            })
            .cloned()
            .collect()
    }
}

/// The account name of an anonymous visitor, keyed by their IP address.
pub fn anonymous_username(ip: &str) -> String {
    format!("Anonymous-{ip}")
}

/// The wikicode for a redirect to the given full title.
pub fn redirect_wikicode(full_title: &str) -> String {
    format!("@REDIRECT[[{full_title}]]")
}

/// Checks that a performer (when there is one) holds the given permission.
fn require(performer: Option<&User>, perm: &str) -> Result<(), Error> {
    match performer {
        Some(user) if !user.has_permission(perm) => Err(Error::Access(
            AccessError::MissingPermission(vec![perm.to_string()]),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests;
