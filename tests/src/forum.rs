use bricklayer_client::{
    api::{self, NewPost, NewSession, PostUpdate, ProfileUpdate, ADMIN_PAGE_SIZE},
    list_users, toggle_admin, toggle_blocked, Db, Thread,
};
use bricklayer_mock_server::MockServer;

use crate::{join, post, registration};

#[tokio::test]
async fn usernames_are_unique() {
    let db = MockServer::new();
    join(&db, "alice").await;

    let mut r = registration("alice");
    r.email = String::from("other-alice@example.org");
    let err = db.sign_up(&r).await.unwrap_err();
    assert_eq!(
        err.api(),
        Some(&api::Error::NameAlreadyUsed(String::from("alice")))
    );

    let mut r = registration("carol");
    r.confirm_password = String::from("something-else");
    let err = db.sign_up(&r).await.unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::PasswordMismatch));

    let err = db
        .sign_in(&NewSession {
            email: String::from("alice@example.org"),
            password: String::from("wrong"),
        })
        .await
        .unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::PermissionDenied));
}

#[tokio::test]
async fn search() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    join(&db, "castlebuilder").await;
    let p = post(&db, &alice, "Epic Castle Build").await;
    post(&db, &alice, "Spaceship").await;
    db.add_tag_to_post(&alice, p.id, "Castles").await.unwrap();

    assert!(db.search("c").await.unwrap().is_empty());
    assert!(db.search("  a ").await.unwrap().is_empty());

    let res = db.search(" CASTLE ").await.unwrap();
    assert_eq!(
        res.posts.iter().map(|p| &p.title as &str).collect::<Vec<_>>(),
        vec!["Epic Castle Build"]
    );
    assert_eq!(res.users.len(), 1);
    assert_eq!(res.users[0].username, "castlebuilder");
    assert_eq!(res.tags, vec![api::TagName { name: String::from("castles") }]);
}

#[tokio::test]
async fn tags_are_normalized_and_shared() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    let p1 = post(&db, &alice, "Technic crane").await;
    let p2 = post(&db, &alice, "Technic excavator").await;

    let t1 = db.add_tag_to_post(&alice, p1.id, " Technic ").await.unwrap();
    let t2 = db.add_tag_to_post(&alice, p2.id, "TECHNIC").await.unwrap();
    db.add_tag_to_post(&alice, p2.id, "technic").await.unwrap();
    assert_eq!(t1, t2);
    assert_eq!(t1.name, "technic");
    assert_eq!(db.fetch_tags().await.unwrap().len(), 1);
    assert_eq!(db.fetch_tags_for_post(p2.id).await.unwrap(), vec![t2.clone()]);
    assert_eq!(db.fetch_posts_by_tag("Technic").await.unwrap().len(), 2);

    db.remove_tag_from_post(&alice, p1.id, t1.id).await.unwrap();
    let tagged = db.fetch_posts_by_tag("technic").await.unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].id, p2.id);
    assert!(db.fetch_posts_by_tag("unknown").await.unwrap().is_empty());
}

#[tokio::test]
async fn posts_and_categories() {
    let mut db = MockServer::new();
    let technic = db.admin_create_category("Technic", "technic");
    let alice = join(&db, "alice").await;
    let bob = join(&db, "bob").await;

    let p = db
        .create_post(
            &alice,
            &NewPost {
                author_id: alice.user,
                category_id: Some(technic.id),
                title: String::from("Liebherr crane"),
                content: String::from("Motorized with four motors"),
            },
        )
        .await
        .unwrap();
    post(&db, &alice, "Uncategorized musings").await;
    assert_eq!(p.category, Some(technic.to_ref()));
    assert_eq!(p.author_name(), "alice");

    let in_cat = db.fetch_posts_by_category("technic").await.unwrap();
    assert_eq!(in_cat.len(), 1);
    assert!(db.fetch_posts_by_category("nope").await.unwrap().is_empty());

    let update = PostUpdate {
        title: Some(String::from("Liebherr LR 13000")),
        ..Default::default()
    };
    let err = db.update_post(&bob, p.id, &update).await.unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::PermissionDenied));
    let updated = db.update_post(&alice, p.id, &update).await.unwrap();
    assert_eq!(updated.title, "Liebherr LR 13000");
    assert!(updated.updated_at.is_some());

    // posting on behalf of someone else is refused
    let err = db
        .create_post(
            &bob,
            &NewPost {
                author_id: alice.user,
                category_id: None,
                title: String::from("Impostor"),
                content: String::from("Not actually alice"),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::PermissionDenied));

    db.delete_post(&alice, p.id).await.unwrap();
    assert_eq!(db.fetch_posts().await.unwrap().len(), 1);
    assert!(db.fetch_posts_by_category("technic").await.unwrap().is_empty());
}

#[tokio::test]
async fn admin_panel() {
    let mut db = MockServer::new();
    let admin = join(&db, "admin").await;
    let users = {
        let mut users = Vec::new();
        for i in 0..ADMIN_PAGE_SIZE {
            users.push(join(&db, &format!("builder{i}")).await);
        }
        users
    };
    db.admin_set_flags(admin.user, true, false);

    let err = list_users(&db, &users[0], 0).await.unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::PermissionDenied));

    let page = list_users(&db, &admin, 0).await.unwrap();
    assert_eq!(page.total, ADMIN_PAGE_SIZE as u64 + 1);
    assert_eq!(page.total_pages(), 2);
    assert_eq!(page.items.len(), ADMIN_PAGE_SIZE);
    assert!(page.has_next());
    let last = list_users(&db, &admin, 1).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert!(!last.has_next());

    let err = toggle_admin(&db, &admin, admin.user).await.unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::SelfModification));
    let err = toggle_blocked(&db, &admin, admin.user).await.unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::SelfModification));

    let promoted = toggle_admin(&db, &admin, users[0].user).await.unwrap();
    assert!(promoted.is_admin);
    let blocked = toggle_blocked(&db, &admin, users[1].user).await.unwrap();
    assert!(blocked.is_blocked);
    let unblocked = toggle_blocked(&db, &users[0], users[1].user).await.unwrap();
    assert!(!unblocked.is_blocked);
}

#[tokio::test]
async fn profiles_and_stats() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    let bob = join(&db, "bob").await;
    let p = post(&db, &alice, "Pirate ship").await;
    let mut thread = Thread::load(&db, p.id, Some(&bob)).await.unwrap();
    thread.reply(&db, &bob, None, "Arr").await.unwrap();
    thread.reply(&db, &alice, None, "Arr indeed").await.unwrap();

    assert_eq!(
        db.stats().await.unwrap(),
        api::Stats {
            users: 2,
            posts: 1,
            comments: 2,
        }
    );

    let err = db
        .update_profile(
            &bob,
            &ProfileUpdate {
                username: Some(String::from("alice")),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err.api(), Some(api::Error::NameAlreadyUsed(_))));
    let bob_profile = db
        .update_profile(
            &bob,
            &ProfileUpdate {
                avatar_url: Some(String::from("https://example.org/bob.png")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        db.fetch_profile_by_username("bob").await.unwrap(),
        bob_profile
    );
    assert_eq!(db.top_profiles(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn fixture_round_trip() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    let p = post(&db, &alice, "Saved for later").await;
    let fixture = db.fixture().await;

    let json = serde_json::to_string(&fixture).unwrap();
    let mut restored = MockServer::from_fixture(serde_json::from_str(&json).unwrap());
    assert_eq!(restored.test_num_users(), 1);
    let (email, password) = restored.test_get_user_info(0);
    let s = restored
        .sign_in(&NewSession { email, password })
        .await
        .unwrap();
    assert_eq!(s.user, alice.user);
    assert_eq!(restored.fetch_post(p.id).await.unwrap().title, "Saved for later");
}

#[tokio::test]
async fn comment_edits() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    let bob = join(&db, "bob").await;
    let p = post(&db, &alice, "Lighthouse").await;
    let mut thread = Thread::load(&db, p.id, Some(&alice)).await.unwrap();
    let c = thread
        .reply(&db, &alice, None, "Does the light turn?")
        .await
        .unwrap();

    let err = db.update_comment(&bob, c.id, "Hijacked").await.unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::PermissionDenied));

    let err = db
        .update_comment(&alice, c.id, "now with spam")
        .await
        .unwrap_err();
    assert_eq!(
        err.api(),
        Some(&api::Error::ForbiddenContent(String::from("spam")))
    );
    let err = db.update_comment(&alice, c.id, "  ").await.unwrap_err();
    assert_eq!(
        err.api(),
        Some(&api::Error::EmptyField(String::from("content")))
    );

    let edited = db
        .update_comment(&alice, c.id, "It turns, with a motor")
        .await
        .unwrap();
    assert_eq!(edited.content, "It turns, with a motor");
    assert_eq!(edited.author_name(), "alice");
    thread.refresh_comments(&db).await.unwrap();
    assert_eq!(thread.comments[0].comment.content, "It turns, with a motor");

    db.delete_comment(&alice, c.id).await.unwrap();
    let err = db
        .update_comment(&alice, c.id, "Too late")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn post_edits() {
    let mut db = MockServer::new();
    let alice = join(&db, "alice").await;
    let bob = join(&db, "bob").await;
    let moderator = join(&db, "moderator").await;
    db.admin_set_flags(moderator.user, true, false);
    let p = post(&db, &alice, "Mos Eisley cantina").await;

    let update = PostUpdate {
        content: Some(String::from("Bob was here")),
        ..Default::default()
    };
    let err = db.update_post(&bob, p.id, &update).await.unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::PermissionDenied));
    let unchanged = db.fetch_post(p.id).await.unwrap();
    assert_eq!(unchanged.content, p.content);
    assert_eq!(unchanged.updated_at, None);

    let moved = db
        .update_post(
            &moderator,
            p.id,
            &PostUpdate {
                title: Some(String::from("Mos Eisley Cantina (75290)")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.title, "Mos Eisley Cantina (75290)");
    assert_eq!(moved.content, p.content);

    db.delete_post(&alice, p.id).await.unwrap();
    let err = db.update_post(&alice, p.id, &update).await.unwrap_err();
    assert!(err.is_not_found());
}
