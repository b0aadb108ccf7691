use uuid::Uuid;

use crate::{CommentId, PostId, UserId};

/// Direction of a single vote, stored as `vote_type` = 1 or -1
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn value(self) -> i64 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }
}

impl From<VoteDirection> for i16 {
    fn from(d: VoteDirection) -> i16 {
        d.value() as i16
    }
}

impl TryFrom<i16> for VoteDirection {
    type Error = String;

    fn try_from(v: i16) -> Result<VoteDirection, String> {
        match v {
            1 => Ok(VoteDirection::Up),
            -1 => Ok(VoteDirection::Down),
            v => Err(format!("invalid vote_type {v}, expected 1 or -1")),
        }
    }
}

/// A user's current relationship to a post or comment
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum VoteState {
    #[default]
    None,
    Upvoted,
    Downvoted,
}

impl VoteState {
    /// Contribution of this vote to the target's score
    pub fn value(self) -> i64 {
        match self {
            VoteState::None => 0,
            VoteState::Upvoted => 1,
            VoteState::Downvoted => -1,
        }
    }

    pub fn direction(self) -> Option<VoteDirection> {
        match self {
            VoteState::None => None,
            VoteState::Upvoted => Some(VoteDirection::Up),
            VoteState::Downvoted => Some(VoteDirection::Down),
        }
    }
}

impl From<VoteDirection> for VoteState {
    fn from(d: VoteDirection) -> VoteState {
        match d {
            VoteDirection::Up => VoteState::Upvoted,
            VoteDirection::Down => VoteState::Downvoted,
        }
    }
}

impl From<Option<VoteDirection>> for VoteState {
    fn from(d: Option<VoteDirection>) -> VoteState {
        d.map(VoteState::from).unwrap_or(VoteState::None)
    }
}

/// The entity a vote applies to
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Target {
    Post(PostId),
    Comment(CommentId),
}

impl Target {
    /// Column of the votes table holding this kind of target, which is also
    /// half of the (user, target) uniqueness constraint
    pub fn column(&self) -> &'static str {
        match self {
            Target::Post(_) => "post_id",
            Target::Comment(_) => "comment_id",
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            Target::Post(p) => p.0,
            Target::Comment(c) => c.0,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Vote {
    pub user_id: UserId,
    pub post_id: Option<PostId>,
    pub comment_id: Option<CommentId>,
    pub vote_type: VoteDirection,
}

impl Vote {
    pub fn new(user_id: UserId, target: Target, vote_type: VoteDirection) -> Vote {
        let (post_id, comment_id) = match target {
            Target::Post(p) => (Some(p), None),
            Target::Comment(c) => (None, Some(c)),
        };
        Vote {
            user_id,
            post_id,
            comment_id,
            vote_type,
        }
    }

    /// None for malformed rows that reference neither or both kinds of target
    pub fn target(&self) -> Option<Target> {
        match (self.post_id, self.comment_id) {
            (Some(p), None) => Some(Target::Post(p)),
            (None, Some(c)) => Some(Target::Comment(c)),
            _ => None,
        }
    }
}
