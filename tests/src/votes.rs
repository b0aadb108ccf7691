use bolero_generator::TypeGenerator;
use bricklayer_client::{
    api::{self, VoteDirection, VoteState},
    Db, LocalVote, Thread, VoteTransition,
};
use bricklayer_mock_server::MockServer;

use crate::{join, post};

#[tokio::test]
async fn switching_moves_score_by_two() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    let bob = join(&db, "bob").await;
    let p = post(&db, &alice, "Rivendell review").await;
    let mut thread = Thread::load(&db, p.id, Some(&bob)).await.unwrap();

    let t = thread.vote_post(&db, &bob, VoteDirection::Up).await.unwrap();
    assert_eq!(t.score_delta, 1);
    let t = thread
        .vote_post(&db, &bob, VoteDirection::Down)
        .await
        .unwrap();
    assert_eq!(
        t,
        VoteTransition {
            next_vote: VoteState::Downvoted,
            score_delta: -2
        }
    );
    assert_eq!(thread.post_vote, LocalVote::new(-1, VoteState::Downvoted));
    assert_eq!(db.fetch_post(p.id).await.unwrap().score, -1);

    // withdrawing deletes the vote row
    thread
        .vote_post(&db, &bob, VoteDirection::Down)
        .await
        .unwrap();
    assert_eq!(thread.post_vote, LocalVote::new(0, VoteState::None));
    assert!(db
        .fetch_votes(&bob, &[api::Target::Post(p.id)])
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn failed_vote_is_rolled_back() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    let bob = join(&db, "bob").await;
    let p = post(&db, &alice, "Train layout").await;
    let mut thread = Thread::load(&db, p.id, Some(&bob)).await.unwrap();
    let c = thread.reply(&db, &alice, None, "Is it powered?").await.unwrap();

    thread
        .vote_comment(&db, &bob, c.id, VoteDirection::Up)
        .await
        .unwrap();
    let before = thread.comment_votes[&c.id];

    db.fail_next_writes(1).await;
    let err = thread
        .vote_comment(&db, &bob, c.id, VoteDirection::Down)
        .await
        .unwrap_err();
    assert!(err.api().is_none());
    assert_eq!(thread.comment_votes[&c.id], before);

    let reloaded = Thread::load(&db, p.id, Some(&bob)).await.unwrap();
    assert_eq!(reloaded.comment_votes[&c.id], before);
}

#[tokio::test]
async fn votes_need_a_valid_session() {
    let db = MockServer::new();
    let alice = join(&db, "alice").await;
    let p = post(&db, &alice, "Space base").await;
    let mut thread = Thread::load(&db, p.id, Some(&alice)).await.unwrap();
    db.sign_out(&alice).await.unwrap();

    let err = thread
        .vote_post(&db, &alice, VoteDirection::Up)
        .await
        .unwrap_err();
    assert_eq!(err.api(), Some(&api::Error::PermissionDenied));
    assert_eq!(thread.post_vote, LocalVote::new(0, VoteState::None));
}

#[derive(Clone, Debug, TypeGenerator)]
struct VoteOp {
    voter: bool,
    on_comment: bool,
    up: bool,
    fail: bool,
}

crate::do_tokio_test!(
    displayed_votes_match_backend,
    Vec<VoteOp>,
    |ops: Vec<VoteOp>| async move {
        let db = MockServer::new();
        let alice = join(&db, "alice").await;
        let bob = join(&db, "bob").await;
        let p = post(&db, &alice, "Ninjago city").await;
        let c = db
            .create_comment(
                &alice,
                &api::NewComment {
                    post_id: p.id,
                    parent_id: None,
                    author_id: alice.user,
                    content: String::from("Every floor is lit"),
                },
            )
            .await
            .unwrap();
        let mut threads = [
            Thread::load(&db, p.id, Some(&alice)).await.unwrap(),
            Thread::load(&db, p.id, Some(&bob)).await.unwrap(),
        ];

        for op in ops {
            let (i, s) = if op.voter { (1, &bob) } else { (0, &alice) };
            let dir = if op.up {
                VoteDirection::Up
            } else {
                VoteDirection::Down
            };
            if op.fail {
                db.fail_next_writes(1).await;
            }
            let res = if op.on_comment {
                threads[i].vote_comment(&db, s, c.id, dir).await
            } else {
                threads[i].vote_post(&db, s, dir).await
            };
            assert_eq!(res.is_err(), op.fail);
        }

        // each viewer's own vote state survives a reload, and scores add up
        for (i, s) in [&alice, &bob].into_iter().enumerate() {
            let fresh = Thread::load(&db, p.id, Some(s)).await.unwrap();
            assert_eq!(fresh.post_vote.state, threads[i].post_vote.state);
            assert_eq!(
                fresh.comment_votes[&c.id].state,
                threads[i].comment_votes[&c.id].state
            );
        }
        let fresh = Thread::load(&db, p.id, None).await.unwrap();
        let states = |f: &dyn Fn(&Thread) -> VoteState| {
            threads.iter().map(|t| f(t).value()).sum::<i64>()
        };
        assert_eq!(fresh.post_vote.score, states(&|t: &Thread| t.post_vote.state));
        assert_eq!(
            fresh.comment_votes[&c.id].score,
            states(&|t: &Thread| t.comment_votes[&c.id].state)
        );
    }
);
