use super::*;
use crate::common;

fn admin(repo: &Repository) -> User {
    let id = repo.create_user("Root").unwrap();
    repo.add_user_to_group(None, id, "administrator", None).unwrap();
    repo.user_by_id(id).unwrap()
}

fn edit_simple(repo: &Repository, author: &User, full_title: &str, content: &str) -> Result<u64, Error> {
    let (ns, page_title) = title::split_title(full_title);
    let base_revision_id = repo.latest_revision(ns.id, &page_title, false).map(|r| r.id);
    repo.edit(EditRequest {
        author,
        namespace: ns,
        title: page_title,
        content: content.to_string(),
        comment: None,
        minor: false,
        follow: false,
        hidden_category: None,
        base_revision_id,
    })
}

#[test]
fn pages_exist_once_they_have_a_revision() {
    let repo = Repository::new();
    assert!(!repo.get(Namespace::main(), "Engines").exists);

    let author = repo.anonymous_principal("10.0.0.1");
    edit_simple(&repo, &author, "Engines", "steam").unwrap();

    let page = repo.get(Namespace::main(), "Engines");
    assert!(page.exists);
    assert_eq!(repo.content(Namespace::MAIN, "Engines"), "steam");
    assert_eq!(repo.revisions(Namespace::MAIN, "Engines").len(), 1);
    assert!(repo.revisions(Namespace::MAIN, "Engines")[0].page_creation);

    // Lookup is case-insensitive.
    assert!(repo.get(Namespace::main(), "engines").exists);
}

#[test]
fn anonymous_authors_are_materialized_by_ip() {
    let repo = Repository::new();
    let visitor = repo.anonymous_principal("10.0.0.7");
    assert_eq!(visitor.id, 0);

    edit_simple(&repo, &visitor, "Scratch", "x").unwrap();

    let account = repo.user_by_name("Anonymous-10.0.0.7").unwrap();
    assert!(account.is_anonymous());
    assert_ne!(account.id, 0);

    // The next request resolves straight to the stored account.
    assert_eq!(repo.anonymous_principal("10.0.0.7").id, account.id);

    // A second edit does not create a second account.
    edit_simple(&repo, &visitor, "Scratch", "y").unwrap();
    assert_eq!(
        repo.logs()
            .iter()
            .filter(|entry| matches!(entry.kind, LogKind::UserAccountCreation { .. }))
            .count(),
        1
    );
}

#[test]
fn concurrent_edits_conflict() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    edit_simple(&repo, &author, "Shared", "v0").unwrap();

    let base = repo.latest_revision(Namespace::MAIN, "Shared", false).map(|r| r.id);
    let make_request = |content: &str| EditRequest {
        author: &author,
        namespace: Namespace::main(),
        title: "Shared".to_string(),
        content: content.to_string(),
        comment: None,
        minor: false,
        follow: false,
        hidden_category: None,
        base_revision_id: base,
    };

    repo.edit(make_request("first")).unwrap();
    assert!(matches!(repo.edit(make_request("second")), Err(Error::ConcurrentEdit)));
    assert_eq!(repo.content(Namespace::MAIN, "Shared"), "first");
}

#[test]
fn stale_creation_also_conflicts() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    edit_simple(&repo, &author, "Raced", "v0").unwrap();

    // A caller that believed the page did not exist loses.
    let request = EditRequest {
        author: &author,
        namespace: Namespace::main(),
        title: "Raced".to_string(),
        content: "mine".to_string(),
        comment: None,
        minor: false,
        follow: false,
        hidden_category: None,
        base_revision_id: None,
    };
    assert!(matches!(repo.edit(request), Err(Error::ConcurrentEdit)));
}

#[test]
fn revision_dates_are_strictly_increasing_per_author() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    for content in ["a", "b", "c"] {
        edit_simple(&repo, &author, "Fast", content).unwrap();
    }
    let revisions = repo.revisions(Namespace::MAIN, "Fast");
    assert_eq!(revisions.len(), 3);
    for pair in revisions.windows(2) {
        assert!(pair[1].date > pair[0].date);
    }
}

#[test]
fn comments_are_length_checked() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    let request = EditRequest {
        author: &author,
        namespace: Namespace::main(),
        title: "Chatty".to_string(),
        content: "x".to_string(),
        comment: Some("y".repeat(config::COMMENT_MAX_LENGTH + 1)),
        minor: false,
        follow: false,
        hidden_category: None,
        base_revision_id: None,
    };
    assert!(matches!(repo.edit(request), Err(Error::CommentTooLong(_))));
    assert!(!repo.get(Namespace::main(), "Chatty").exists);
}

#[test]
fn redirects_are_detected_and_cleared() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");

    edit_simple(&repo, &author, "Old Name", "@REDIRECT[[New Name]]").unwrap();
    let page = repo.get(Namespace::main(), "Old Name");
    assert_eq!(page.redirects_to, Some((Namespace::MAIN, "New Name".to_string())));

    edit_simple(&repo, &author, "Old Name", "actual content").unwrap();
    assert_eq!(repo.get(Namespace::main(), "Old Name").redirects_to, None);

    // Partial matches are not redirects.
    edit_simple(&repo, &author, "Partial", "@REDIRECT[[X]] plus text").unwrap();
    assert_eq!(repo.get(Namespace::main(), "Partial").redirects_to, None);
}

#[test]
fn link_and_category_indexes_follow_edits() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    edit_simple(&repo, &author, "Hub", "[[Spoke]] [[Category:Wheels|h]]").unwrap();

    let links = repo.page_links(Namespace::MAIN, "Hub");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].title, "Spoke");
    let categories = repo.page_categories(Namespace::MAIN, "Hub");
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].cat_title, "Wheels");
    assert_eq!(categories[0].sort_key.as_deref(), Some("h"));
    assert_eq!(repo.pages_in_category("Wheels", CategoryFilter::All), 1);

    edit_simple(&repo, &author, "Hub", "no more links").unwrap();
    assert!(repo.page_links(Namespace::MAIN, "Hub").is_empty());
    assert!(repo.page_categories(Namespace::MAIN, "Hub").is_empty());
}

#[test]
fn follow_is_idempotent_and_ignores_anonymous() {
    let repo = Repository::new();
    let anonymous = repo.anonymous_principal("10.0.0.1");
    assert_eq!(repo.follow(&anonymous, Namespace::main(), "Watched", true).unwrap(), false);

    let id = repo.create_user("Ada").unwrap();
    let ada = repo.user_by_id(id).unwrap();
    assert_eq!(repo.follow(&ada, Namespace::main(), "Watched", true).unwrap(), true);
    repo.follow(&ada, Namespace::main(), "Watched", true).unwrap();
    assert_eq!(repo.follow_list(ada.id).len(), 1);
    assert!(repo.is_following(ada.id, Namespace::MAIN, "Watched"));

    repo.follow(&ada, Namespace::main(), "Watched", false).unwrap();
    repo.follow(&ada, Namespace::main(), "Watched", false).unwrap();
    assert!(repo.follow_list(ada.id).is_empty());

    let special = Namespace::find_by_id(Namespace::SPECIAL).unwrap();
    assert!(matches!(
        repo.follow(&ada, special, "RecentChanges", true),
        Err(Error::FollowSpecialPage)
    ));
}

#[test]
fn deletion_is_logical_and_preserves_revisions() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    edit_simple(&repo, &author, "Doomed", "content").unwrap();

    // Deleting needs the permission.
    assert!(matches!(
        repo.delete(&author, Namespace::main(), "Doomed", None),
        Err(Error::Access(AccessError::MissingPermission(_)))
    ));

    let root = admin(&repo);
    repo.delete(&root, Namespace::main(), "Doomed", Some("cleanup")).unwrap();
    let page = repo.get(Namespace::main(), "Doomed");
    assert!(!page.exists);
    assert!(page.deleted);
    assert_eq!(repo.revisions(Namespace::MAIN, "Doomed").len(), 1);
    assert!(repo
        .logs()
        .iter()
        .any(|entry| matches!(&entry.kind, LogKind::PageDeletion { title, .. } if title == "Doomed")));

    // Editing a deleted page restores it.
    edit_simple(&repo, &author, "Doomed", "back").unwrap();
    assert!(repo.get(Namespace::main(), "Doomed").exists);
    assert_eq!(repo.revisions(Namespace::MAIN, "Doomed").len(), 2);
}

#[test]
fn rename_moves_history_and_can_leave_a_redirect() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    edit_simple(&repo, &author, "Before", "content").unwrap();
    edit_simple(&repo, &author, "Taken", "content").unwrap();

    let root = admin(&repo);
    assert!(matches!(
        repo.rename(&root, Namespace::main(), "Before", "Taken", false, None),
        Err(Error::TitleAlreadyExists(_))
    ));

    repo.rename(&root, Namespace::main(), "Before", "After", true, None).unwrap();
    assert!(repo.get(Namespace::main(), "After").exists);
    assert_eq!(repo.revisions(Namespace::MAIN, "After").len(), 1);
    assert_eq!(repo.content(Namespace::MAIN, "After"), "content");

    let stub = repo.get(Namespace::main(), "Before");
    assert!(stub.exists);
    assert_eq!(stub.redirects_to, Some((Namespace::MAIN, "After".to_string())));
    assert_eq!(repo.content(Namespace::MAIN, "Before"), "@REDIRECT[[After]]");
    assert_eq!(repo.redirects_to(Namespace::MAIN, "After").len(), 1);
}

#[test]
fn masking_gates_and_guards_the_last_visible_revision() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    edit_simple(&repo, &author, "Seen", "v1").unwrap();
    edit_simple(&repo, &author, "Seen", "v2").unwrap();
    let revisions = repo.revisions(Namespace::MAIN, "Seen");
    let (first, second) = (revisions[0].id, revisions[1].id);

    let root = admin(&repo);
    assert!(matches!(
        repo.mask_revisions(&author, &[first], MaskAction::MaskFully, None),
        Err(Error::Access(AccessError::MissingPermission(_)))
    ));

    repo.mask_revisions(&root, &[first], MaskAction::MaskFully, None).unwrap();
    let masked = repo.revision(first).unwrap();
    assert!(masked.hidden && masked.comment_hidden);
    assert_eq!(
        repo.latest_revision(Namespace::MAIN, "Seen", true).unwrap().id,
        second
    );

    // Hiding the only remaining visible revision is rejected.
    assert!(matches!(
        repo.mask_revisions(&root, &[second], MaskAction::MaskFully, None),
        Err(Error::CannotMaskLastRevision)
    ));

    repo.mask_revisions(&root, &[first], MaskAction::UnmaskAllButComments, None).unwrap();
    let partially = repo.revision(first).unwrap();
    assert!(!partially.hidden && partially.comment_hidden);

    repo.mask_revisions(&root, &[first], MaskAction::UnmaskAll, None).unwrap();
    let restored = repo.revision(first).unwrap();
    assert!(!restored.hidden && !restored.comment_hidden);
}

#[test]
fn revision_traversal_can_skip_masked_revisions() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    for content in ["a", "b", "c"] {
        edit_simple(&repo, &author, "Walk", content).unwrap();
    }
    let revisions = repo.revisions(Namespace::MAIN, "Walk");
    let ids = revisions.iter().map(|revision| revision.id).collect::<Vec<_>>();

    let root = admin(&repo);
    repo.mask_revisions(&root, &[ids[1]], MaskAction::MaskFully, None).unwrap();

    assert_eq!(repo.next_revision(ids[0], false).unwrap().id, ids[1]);
    assert_eq!(repo.next_revision(ids[0], true).unwrap().id, ids[2]);
    assert_eq!(repo.previous_revision(ids[2], true).unwrap().id, ids[0]);
    assert!(repo.previous_revision(ids[0], false).is_none());
    assert_eq!(repo.byte_size_diff(ids[0], false), Some(1));
}

#[test]
fn protection_expiry_reopens_editing() {
    let repo = Repository::new();
    let root = admin(&repo);
    let now = common::now();
    repo.protect(
        &root,
        Namespace::main(),
        "Guarded",
        "administrator",
        false,
        Some("vandalism"),
        Some(now - time::Duration::seconds(1)),
    )
    .unwrap();

    // The protection row exists but has lapsed, so the edit floor is open;
    // the sweep then physically removes it.
    assert!(repo.protection(Namespace::MAIN, "Guarded").is_some());
    assert_eq!(repo.delete_expired_page_protections(now), 1);
    assert!(repo.protection(Namespace::MAIN, "Guarded").is_none());

    let visitor = repo.anonymous_principal("10.0.0.1");
    edit_simple(&repo, &visitor, "Guarded", "welcome back").unwrap();
}

#[test]
fn protection_requires_a_known_group() {
    let repo = Repository::new();
    let root = admin(&repo);
    assert!(matches!(
        repo.protect(&root, Namespace::main(), "X", "nonsense", false, None, None),
        Err(Error::NoSuchGroup(_))
    ));
}

#[test]
fn expiry_sweeps_remove_lapsed_rows() {
    let repo = Repository::new();
    let now = common::now();
    let id = repo.create_user("Ada").unwrap();
    let ada = repo.user_by_id(id).unwrap();
    repo.follow(&ada, Namespace::main(), "Soon Gone", true).unwrap();
    // Backdate the entry by writing it directly.
    {
        let mut store = repo.store.write();
        for status in store.follows.values_mut() {
            status.end_date = Some(now - time::Duration::seconds(1));
        }
    }
    assert_eq!(repo.delete_expired_page_follows(now), 1);

    repo.set_user_block(
        None,
        id,
        Some(UserBlock {
            end_date: Some(now - time::Duration::seconds(1)),
            allow_messages_on_own_user_page: true,
            allow_editing_own_settings: true,
        }),
        None,
    )
    .unwrap();
    assert_eq!(repo.delete_expired_user_blocks(now), 1);
    assert!(repo.user_by_id(id).unwrap().block.is_none());

    repo.set_ip_block(
        None,
        "10.0.0.9",
        Some(IpBlock {
            ip: "10.0.0.9".to_string(),
            end_date: Some(now - time::Duration::seconds(1)),
            allow_messages_on_own_user_page: true,
            allow_account_creation: true,
        }),
        None,
    )
    .unwrap();
    assert_eq!(repo.delete_expired_ip_blocks(now), 1);
    assert!(repo.ip_block("10.0.0.9").is_none());
}

#[test]
fn parse_cache_round_trip() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    edit_simple(&repo, &author, "Cached", "Hello").unwrap();

    let now = common::now();
    assert!(repo.get(Namespace::main(), "Cached").cache.is_none());

    let output = repo.rendered_page(Namespace::main(), "Cached", None, now).unwrap();
    assert_eq!(output.html, "Hello");
    let cached = repo.get(Namespace::main(), "Cached").cache.unwrap();
    assert_eq!(cached.content, "Hello");
    assert!(cached.expiry_date > now);

    // A further edit invalidates the cache.
    edit_simple(&repo, &author, "Cached", "Changed").unwrap();
    assert!(repo.get(Namespace::main(), "Cached").cache.is_none());

    // An expired cache is picked up by the refresh sweep.
    repo.rendered_page(Namespace::main(), "Cached", None, now).unwrap();
    {
        let mut store = repo.store.write();
        for record in store.pages.values_mut() {
            if let Some(cache) = &mut record.page.cache {
                cache.expiry_date = now - time::Duration::seconds(1);
            }
        }
    }
    assert_eq!(repo.pages_with_expired_cache(now).len(), 1);
    repo.refresh_parse(Namespace::main(), "Cached", now).unwrap();
    assert!(repo.get(Namespace::main(), "Cached").cache.unwrap().expiry_date > now);
}

#[test]
fn statistics_count_what_they_say() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    edit_simple(&repo, &author, "Article", "text").unwrap();
    edit_simple(&repo, &author, "Pointer", "@REDIRECT[[Article]]").unwrap();
    edit_simple(&repo, &author, "Help:Guide", "how-to").unwrap();

    assert_eq!(repo.page_count(), 3);
    // Redirects and non-content namespaces are not articles.
    assert_eq!(repo.article_count(), 1);
    assert_eq!(repo.edit_count(), 3);
    assert_eq!(repo.pages_in_namespace(Namespace::HELP), 1);
    assert_eq!(repo.active_user_count(common::now()), 1);
    assert!(repo.group_member_count("administrator").unwrap() >= 1);
    assert!(matches!(repo.group_member_count("nope"), Err(Error::NoSuchGroup(_))));
}

#[test]
fn content_language_and_type_changes_are_logged() {
    let repo = Repository::new();
    let author = repo.anonymous_principal("10.0.0.1");
    edit_simple(&repo, &author, "Styled", "body {}").unwrap();

    repo.set_content_language(&author, Namespace::main(), "Styled", "fr", None).unwrap();
    assert_eq!(repo.get(Namespace::main(), "Styled").content_language, "fr");
    assert!(matches!(
        repo.set_content_language(&author, Namespace::main(), "Styled", "xx", None),
        Err(Error::UnknownLanguage(_))
    ));

    repo.set_content_type(&author, Namespace::main(), "Styled", ContentType::Css, None).unwrap();
    assert_eq!(repo.get(Namespace::main(), "Styled").content_type, ContentType::Css);

    let kinds = repo
        .logs()
        .iter()
        .filter(|entry| {
            matches!(
                entry.kind,
                LogKind::PageContentLanguage { .. } | LogKind::PageContentType { .. }
            )
        })
        .count();
    assert_eq!(kinds, 2);
}

#[test]
fn talk_threads_reject_broken_reply_chains() {
    let repo = Repository::new();
    let id = repo.create_user("Ada").unwrap();
    let ada = repo.user_by_id(id).unwrap();

    let topic = repo.create_topic(&ada, Namespace::main(), "Engines", "Naming").unwrap();
    assert_eq!(repo.topic_title(topic), "Naming");

    let first = repo.post_message(&ada, topic, "First!", None).unwrap();
    let reply = repo.post_message(&ada, topic, "Replying", Some(first)).unwrap();
    assert_eq!(repo.messages_of_topic(topic).len(), 2);
    assert_eq!(repo.message_text(reply), "Replying");

    // Replies must reference a message of the same topic.
    let other = repo.create_topic(&ada, Namespace::main(), "Engines", "Other").unwrap();
    assert!(matches!(
        repo.post_message(&ada, other, "Cross-thread", Some(first)),
        Err(Error::MessageDoesNotExist(_))
    ));

    // A corrupted parent chain is refused rather than extended.
    {
        let mut store = repo.store.write();
        if let Some(message) = store.messages.get_mut(&first) {
            message.response_to = Some(reply);
        }
    }
    assert!(matches!(
        repo.post_message(&ada, topic, "Extending a loop", Some(reply)),
        Err(Error::MessageCycle)
    ));
}

#[test]
fn groups_have_assignment_rules() {
    let repo = Repository::new();
    let root = admin(&repo);

    assert!(matches!(
        repo.delete_group(Some(&root), "all"),
        Err(Error::GroupNotDeletable(_))
    ));

    assert!(matches!(
        repo.create_group(Some(&root), "oops", &["not_a_permission"]),
        Err(Error::UnknownPermission(_))
    ));

    repo.create_group(Some(&root), "cartographers", &[perms::WIKI_RENAME]).unwrap();
    let id = repo.create_user("Ada").unwrap();
    repo.add_user_to_group(Some(&root), id, "cartographers", Some("maps")).unwrap();
    assert!(repo.user_by_id(id).unwrap().has_permission(perms::WIKI_RENAME));

    repo.remove_user_from_group(Some(&root), id, "cartographers", None).unwrap();
    assert!(!repo.user_by_id(id).unwrap().has_permission(perms::WIKI_RENAME));

    repo.delete_group(Some(&root), "cartographers").unwrap();
    assert!(repo.group("cartographers").is_none());

    // Mere mortals cannot manage groups.
    let visitor = repo.anonymous_principal("10.0.0.1");
    assert!(matches!(
        repo.add_user_to_group(Some(&visitor), id, "patroller", None),
        Err(Error::Access(AccessError::MissingPermission(_)))
    ));
}

#[test]
fn user_rename_preserves_authorship() {
    let repo = Repository::new();
    let id = repo.create_user("Ada").unwrap();
    let ada = repo.user_by_id(id).unwrap();
    edit_simple(&repo, &ada, "Signed", "by ada").unwrap();

    let root = admin(&repo);
    repo.rename_user(Some(&root), id, "Countess", Some("request")).unwrap();
    assert!(repo.user_by_name("Ada").is_none());
    assert_eq!(repo.user_by_name("Countess").unwrap().id, id);
    assert_eq!(repo.contributions("Countess").len(), 1);
}

#[test]
fn redirect_helpers() {
    assert_eq!(redirect_wikicode("Wiki:Main Page"), "@REDIRECT[[Wiki:Main Page]]");
    let (ns, target) = redirect_target("  @REDIRECT[[Help:Guide]]  ").unwrap();
    assert_eq!(ns.id, Namespace::HELP);
    assert_eq!(target, "Guide");
    assert!(redirect_target("@REDIRECT[[Bad|Title]]").is_none());
    assert!(redirect_target("text @REDIRECT[[X]]").is_none());
}
