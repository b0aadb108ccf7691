use bricklayer_client::{
    api::{self, Comment, MAX_COMMENT_LEN},
    walk_forest, CommentNode, Db, Error, Thread,
};
use bricklayer_mock_server::MockServer;

use crate::{join, post};

fn contents(forest: &[CommentNode<Comment>]) -> Vec<(usize, String)> {
    walk_forest(forest)
        .map(|(depth, n)| (depth, n.comment.content.clone()))
        .collect()
}

#[tokio::test]
async fn discussion_is_threaded() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    let bob = join(&db, "bob").await;
    let p = post(&db, &alice, "Epic Castle Build").await;

    let mut thread = Thread::load(&db, p.id, Some(&bob)).await.unwrap();
    assert_eq!(thread.comment_count(), 0);

    let first = thread
        .reply(&db, &bob, None, "Love the drawbridge")
        .await
        .unwrap();
    thread
        .reply(&db, &alice, Some(first.id), "Thanks, it actually opens")
        .await
        .unwrap();
    thread
        .reply(&db, &bob, None, "  What about the towers?  ")
        .await
        .unwrap();

    assert_eq!(
        contents(&thread.comments),
        vec![
            (0, String::from("Love the drawbridge")),
            (1, String::from("Thanks, it actually opens")),
            (0, String::from("What about the towers?")),
        ]
    );
    assert_eq!(thread.comments[0].comment.author_name(), "bob");

    // loading from scratch gives the same discussion
    let reloaded = Thread::load(&db, p.id, None).await.unwrap();
    assert_eq!(reloaded.comments, thread.comments);
    assert_eq!(db.fetch_post(p.id).await.unwrap().comments_count, 3);
}

#[tokio::test]
async fn reply_to_deleted_comment_moves_to_top_level() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    let p = post(&db, &alice, "Modular bakery").await;
    let mut thread = Thread::load(&db, p.id, Some(&alice)).await.unwrap();

    let parent = thread.reply(&db, &alice, None, "Parts list?").await.unwrap();
    thread
        .reply(&db, &alice, Some(parent.id), "Never mind, found it")
        .await
        .unwrap();
    db.delete_comment(&alice, parent.id).await.unwrap();
    thread.refresh_comments(&db).await.unwrap();

    assert_eq!(
        contents(&thread.comments),
        vec![(0, String::from("Never mind, found it"))]
    );
}

#[tokio::test]
async fn invalid_replies_are_refused() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    let p = post(&db, &alice, "Technic gearbox").await;
    let mut thread = Thread::load(&db, p.id, Some(&alice)).await.unwrap();

    let err = thread.reply(&db, &alice, None, "   ").await.unwrap_err();
    assert!(matches!(err, Error::Api(api::Error::EmptyField(_))));

    let err = thread
        .reply(&db, &alice, None, "Buy cheap bricks, SPAM inside")
        .await
        .unwrap_err();
    assert_eq!(
        err.api(),
        Some(&api::Error::ForbiddenContent(String::from("spam")))
    );

    let long = "a".repeat(MAX_COMMENT_LEN + 1);
    let err = thread.reply(&db, &alice, None, &long).await.unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::ContentTooLong(MAX_COMMENT_LEN)));

    let exactly = "a".repeat(MAX_COMMENT_LEN);
    thread.reply(&db, &alice, None, &exactly).await.unwrap();
    assert_eq!(thread.comment_count(), 1);
}

#[tokio::test]
async fn blocked_users_cannot_reply() {
    let mut db = MockServer::new();
    let alice = join(&db, "alice").await;
    let troll = join(&db, "troll").await;
    let p = post(&db, &alice, "Minifig display case").await;
    db.admin_set_flags(troll.user, false, true);

    let mut thread = Thread::load(&db, p.id, Some(&troll)).await.unwrap();
    let err = thread
        .reply(&db, &troll, None, "first!")
        .await
        .unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::UserBlocked));
    assert_eq!(thread.comment_count(), 0);
}

#[tokio::test]
async fn missing_post() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    let p = post(&db, &alice, "Soon gone").await;
    db.delete_post(&alice, p.id).await.unwrap();
    let err = Thread::load(&db, p.id, None).await.unwrap_err();
    assert!(err.is_not_found());
}
