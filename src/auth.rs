//! The authorization engine.
//!
//! Gates every read and edit on a `(namespace, title)` pair given the acting
//! principal and the current protection, block, and group state. Decisions
//! come back as `Result<(), AccessError>` so callers can surface the precise
//! reason for a denial.

use crate::{
    db::{Repository, models::{Revision, User}},
    title::{self, Namespace},
};
use time::OffsetDateTime;

/// All permission strings used throughout the wiki.
pub mod perms {
    /// Edit wiki pages.
    pub const WIKI_EDIT: &str = "wiki_edit";
    /// Delete wiki pages.
    pub const WIKI_DELETE: &str = "wiki_delete";
    /// Rename wiki pages.
    pub const WIKI_RENAME: &str = "wiki_rename";
    /// Revert edits on wiki pages.
    pub const WIKI_REVERT: &str = "wiki_revert";
    /// Protect wiki pages.
    pub const WIKI_PROTECT: &str = "wiki_protect";
    /// Mask and unmask page revisions.
    pub const WIKI_MASK: &str = "wiki_mask";
    /// Edit other users’ user pages.
    pub const WIKI_EDIT_USER_PAGES: &str = "wiki_edit_user_pages";
    /// Edit pages in the Interface namespace.
    pub const WIKI_EDIT_INTERFACE: &str = "wiki_edit_interface";
    /// Add users to and remove users from groups.
    pub const EDIT_USER_GROUPS: &str = "edit_user_groups";
    /// Block users and IP addresses.
    pub const BLOCK_USERS: &str = "block_users";
    /// Rename user accounts.
    pub const RENAME_USERS: &str = "rename_users";
    /// Mask usernames from public listings.
    pub const MASK_USERS: &str = "mask_users";

    /// Every permission, for enumeration in management views.
    pub const ALL: &[&str] = &[
        WIKI_EDIT,
        WIKI_DELETE,
        WIKI_RENAME,
        WIKI_REVERT,
        WIKI_PROTECT,
        WIKI_MASK,
        WIKI_EDIT_USER_PAGES,
        WIKI_EDIT_INTERFACE,
        EDIT_USER_GROUPS,
        BLOCK_USERS,
        RENAME_USERS,
        MASK_USERS,
    ];
}

/// The reason an access check failed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AccessError {
    /// The principal lacks one or more permissions.
    #[error("missing permission(s): {}", _0.join(", "))]
    MissingPermission(Vec<String>),
    /// The principal (or their IP address) is blocked.
    #[error("user is blocked")]
    Blocked,
    /// The page is protected above the principal’s groups.
    #[error("page is protected")]
    Protected,
}

/// Checks whether `user` may edit the page at `(ns, page_title)`.
///
/// Evaluated in order: namespace edit floor, principal block, IP block, page
/// protection, then the user-namespace ownership rule.
pub fn can_edit(
    repo: &Repository,
    user: &User,
    ns: &Namespace,
    page_title: &str,
    now: OffsetDateTime,
) -> Result<(), AccessError> {
    check_namespace_floor(user, ns)?;

    if user.is_blocked(now) {
        return Err(AccessError::Blocked);
    }

    if user.is_anonymous()
        && let Some(ip) = &user.ip
        && repo.ip_block(ip).is_some_and(|block| block.is_active(now))
    {
        return Err(AccessError::Blocked);
    }

    if let Some(protection) = repo.protection(ns.id, page_title)
        && protection.is_active(now)
        && !user.is_in_group(&protection.protection_level)
    {
        return Err(AccessError::Protected);
    }

    if ns.id == Namespace::USER
        && title::base_name(ns, page_title) != user.username
        && !user.has_permission(perms::WIKI_EDIT_USER_PAGES)
    {
        return Err(AccessError::MissingPermission(vec![
            perms::WIKI_EDIT_USER_PAGES.to_string(),
        ]));
    }

    Ok(())
}

/// Checks whether `user` may post talk messages on the page at
/// `(ns, page_title)`.
///
/// Follows the same steps as [`can_edit`], except that blocks are relaxed on
/// the principal’s own user page when the block permits it, and protections
/// only apply when they cover talks.
pub fn can_post_messages(
    repo: &Repository,
    user: &User,
    ns: &Namespace,
    page_title: &str,
    now: OffsetDateTime,
) -> Result<(), AccessError> {
    if !ns.is_editable {
        return Err(AccessError::MissingPermission(vec![
            perms::WIKI_EDIT.to_string(),
        ]));
    }

    let own_page = ns.id == Namespace::USER && title::base_name(ns, page_title) == user.username;

    if let Some(block) = &user.block
        && block.is_active(now)
        && !(own_page && block.allow_messages_on_own_user_page)
    {
        return Err(AccessError::Blocked);
    }

    if user.is_anonymous()
        && let Some(ip) = &user.ip
        && let Some(block) = repo.ip_block(ip)
        && block.is_active(now)
        && !(own_page && block.allow_messages_on_own_user_page)
    {
        return Err(AccessError::Blocked);
    }

    if let Some(protection) = repo.protection(ns.id, page_title)
        && protection.protect_talks
        && protection.is_active(now)
        && !user.is_in_group(&protection.protection_level)
    {
        return Err(AccessError::Protected);
    }

    Ok(())
}

/// Checks whether `user` may see the given revision.
///
/// Reading is only forbidden when the revision is masked and the principal
/// may not mask revisions themselves.
pub fn can_read_revision(user: &User, revision: &Revision) -> bool {
    !revision.hidden || user.has_permission(perms::WIKI_MASK)
}

/// Checks that the namespace is editable at all and that the user holds every
/// permission it requires.
fn check_namespace_floor(user: &User, ns: &Namespace) -> Result<(), AccessError> {
    if !ns.is_editable {
        return Err(AccessError::MissingPermission(vec![
            perms::WIKI_EDIT.to_string(),
        ]));
    }
    let missing = ns
        .required_perms
        .iter()
        .filter(|p| !user.has_permission(p))
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AccessError::MissingPermission(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Repository;
    use crate::db::models::{PageProtection, UserBlock};
    use time::macros::datetime;

    fn now() -> OffsetDateTime {
        datetime!(2024-06-01 12:00:00 UTC)
    }

    #[test]
    fn special_namespace_is_not_editable() {
        let repo = Repository::new();
        let user = repo.anonymous_principal("10.0.0.1");
        let special = Namespace::find_by_id(Namespace::SPECIAL).unwrap();
        assert!(matches!(
            can_edit(&repo, &user, special, "RandomPage", now()),
            Err(AccessError::MissingPermission(_))
        ));
    }

    #[test]
    fn anonymous_may_edit_main_namespace() {
        let repo = Repository::new();
        let user = repo.anonymous_principal("10.0.0.1");
        assert_eq!(can_edit(&repo, &user, Namespace::main(), "Sandbox", now()), Ok(()));
    }

    #[test]
    fn blocked_user_cannot_edit() {
        let repo = Repository::new();
        let id = repo.create_user("Mallory").unwrap();
        repo.set_user_block(
            None,
            id,
            Some(UserBlock {
                end_date: None,
                allow_messages_on_own_user_page: true,
                allow_editing_own_settings: true,
            }),
            None,
        )
        .unwrap();
        let user = repo.user_by_id(id).unwrap();
        assert_eq!(
            can_edit(&repo, &user, Namespace::main(), "Sandbox", now()),
            Err(AccessError::Blocked)
        );
        // Talk posting on their own user page stays allowed.
        let user_ns = Namespace::find_by_id(Namespace::USER).unwrap();
        assert_eq!(can_post_messages(&repo, &user, user_ns, "Mallory", now()), Ok(()));
        assert_eq!(
            can_post_messages(&repo, &user, Namespace::main(), "Sandbox", now()),
            Err(AccessError::Blocked)
        );
    }

    #[test]
    fn protection_gates_by_group() {
        let repo = Repository::new();
        repo.insert_protection(PageProtection {
            namespace_id: Namespace::MAIN,
            title: "Sandbox".to_string(),
            end_date: None,
            reason: None,
            protection_level: "administrator".to_string(),
            protect_talks: false,
        });
        let anon = repo.anonymous_principal("10.0.0.1");
        assert_eq!(
            can_edit(&repo, &anon, Namespace::main(), "Sandbox", now()),
            Err(AccessError::Protected)
        );
        // Talks are not protected here.
        assert_eq!(can_post_messages(&repo, &anon, Namespace::main(), "Sandbox", now()), Ok(()));

        let id = repo.create_user("Root").unwrap();
        repo.add_user_to_group(None, id, "administrator", None).unwrap();
        let admin = repo.user_by_id(id).unwrap();
        assert_eq!(can_edit(&repo, &admin, Namespace::main(), "Sandbox", now()), Ok(()));
    }

    #[test]
    fn expired_protection_is_inert() {
        let repo = Repository::new();
        repo.insert_protection(PageProtection {
            namespace_id: Namespace::MAIN,
            title: "Sandbox".to_string(),
            end_date: Some(now() - time::Duration::seconds(1)),
            reason: None,
            protection_level: "administrator".to_string(),
            protect_talks: false,
        });
        let anon = repo.anonymous_principal("10.0.0.1");
        assert_eq!(can_edit(&repo, &anon, Namespace::main(), "Sandbox", now()), Ok(()));
    }

    #[test]
    fn user_pages_belong_to_their_user() {
        let repo = Repository::new();
        let user_ns = Namespace::find_by_id(Namespace::USER).unwrap();
        let id = repo.create_user("Ada").unwrap();
        let ada = repo.user_by_id(id).unwrap();
        assert_eq!(can_edit(&repo, &ada, user_ns, "Ada", now()), Ok(()));
        assert_eq!(can_edit(&repo, &ada, user_ns, "Ada/Drafts", now()), Ok(()));
        assert_eq!(
            can_edit(&repo, &ada, user_ns, "Bob", now()),
            Err(AccessError::MissingPermission(vec![
                perms::WIKI_EDIT_USER_PAGES.to_string()
            ]))
        );
    }

    #[test]
    fn masked_revisions_need_the_mask_permission() {
        let repo = Repository::new();
        let anon = repo.anonymous_principal("10.0.0.1");
        let id = repo.create_user("Root").unwrap();
        repo.add_user_to_group(None, id, "administrator", None).unwrap();
        let admin = repo.user_by_id(id).unwrap();

        let mut revision = crate::db::models::Revision {
            id: 1,
            namespace_id: 0,
            title: "T".to_string(),
            date: now(),
            author_id: 1,
            comment: None,
            comment_hidden: false,
            hidden: false,
            is_minor: false,
            is_bot: false,
            tags: Vec::new(),
            content: String::new(),
            page_creation: true,
        };
        assert!(can_read_revision(&anon, &revision));
        revision.hidden = true;
        assert!(!can_read_revision(&anon, &revision));
        assert!(can_read_revision(&admin, &revision));
    }
}
