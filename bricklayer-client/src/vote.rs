use std::fmt::Debug;

use crate::{
    api::{CommentId, PostId, Session, Target, VoteDirection, VoteState},
    Db, Error,
};

/// What happens when a user presses a vote button
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VoteTransition {
    pub next_vote: VoteState,

    /// Change to apply to the target's displayed score
    pub score_delta: i64,
}

/// Pressing the button of the current vote withdraws it, pressing the other
/// one switches (worth 2 points), and pressing any button with no current
/// vote casts it.
pub fn apply_vote(current: VoteState, requested: VoteDirection) -> VoteTransition {
    let next_vote = if current == VoteState::from(requested) {
        VoteState::None
    } else {
        VoteState::from(requested)
    };
    VoteTransition {
        next_vote,
        score_delta: next_vote.value() - current.value(),
    }
}

/// Posts and comments are both votable, and persisted the same way
pub trait VoteTarget: Copy + Debug + Send + Sync {
    fn target(self) -> Target;
}

impl VoteTarget for Target {
    fn target(self) -> Target {
        self
    }
}

impl VoteTarget for PostId {
    fn target(self) -> Target {
        Target::Post(self)
    }
}

impl VoteTarget for CommentId {
    fn target(self) -> Target {
        Target::Comment(self)
    }
}

/// The locally displayed score of a target, along with the viewer's vote
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LocalVote {
    pub score: i64,
    pub state: VoteState,
}

/// An optimistically applied vote, waiting for the backend's answer
#[must_use]
#[derive(Debug)]
pub struct PendingVote {
    prior: LocalVote,
    pub transition: VoteTransition,
}

impl LocalVote {
    pub fn new(score: i64, state: VoteState) -> LocalVote {
        LocalVote { score, state }
    }

    pub fn begin(&mut self, requested: VoteDirection) -> PendingVote {
        let prior = *self;
        let transition = apply_vote(self.state, requested);
        self.score += transition.score_delta;
        self.state = transition.next_vote;
        PendingVote { prior, transition }
    }

    /// Puts back exactly what was displayed before `begin`
    pub fn rollback(&mut self, pending: PendingVote) {
        *self = pending.prior;
    }
}

/// Votes on `target` on behalf of `session`
///
/// `local` is updated immediately, then the new vote is persisted: upserted
/// when there is one, deleted when it was withdrawn. If persisting fails,
/// `local` is rolled back and the error returned. Holding `&mut LocalVote`
/// for the whole call means a target cannot have two votes in flight.
pub async fn cast_vote<D, T>(
    db: &D,
    session: &Session,
    target: T,
    local: &mut LocalVote,
    requested: VoteDirection,
) -> Result<VoteTransition, Error>
where
    D: Db + ?Sized,
    T: VoteTarget,
{
    let pending = local.begin(requested);
    let transition = pending.transition;
    let target = target.target();
    let res = match transition.next_vote.direction() {
        Some(dir) => db.upsert_vote(session, target, dir).await.map(|_| ()),
        None => db.remove_vote(session, target).await,
    };
    match res {
        Ok(()) => Ok(transition),
        Err(err) => {
            tracing::warn!(?err, ?target, "failed persisting vote, rolling back");
            local.rollback(pending);
            Err(err)
        }
    }
}
