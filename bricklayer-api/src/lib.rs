use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

mod auth;
pub use auth::{AuthInfo, AuthToken, NewSession, Registration, Session, MIN_PASSWORD_LEN};

mod category;
pub use category::{Category, CategoryId, CategoryRef};

mod comment;
pub use comment::{
    Comment, CommentId, NewComment, FORBIDDEN_WORDS, MAX_COMMENT_LEN,
};

mod error;
pub use error::Error;

mod post;
pub use post::{NewPost, Post, PostId, PostUpdate};

mod search;
pub use search::{SearchResults, TagName, MIN_SEARCH_LEN, SEARCH_LIMIT};

mod tag;
pub use tag::{Tag, TagId};

mod user;
pub use user::{Author, Profile, ProfileSummary, ProfileUpdate, UserId};

mod vote;
pub use vote::{Target, Vote, VoteDirection, VoteState};

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

/// Number of profiles per page of the admin user list
pub const ADMIN_PAGE_SIZE: usize = 20;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Stats {
    pub users: u64,
    pub posts: u64,
    pub comments: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: usize,
    pub per_page: usize,
}

impl<T> Page<T> {
    /// Always at least 1, so that an empty listing still renders as "page 1 of 1"
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 1;
        }
        std::cmp::max(1, self.total.div_ceil(self.per_page as u64))
    }

    pub fn has_next(&self) -> bool {
        (self.page as u64) + 1 < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 0
    }
}

// The validate functions throughout bricklayer-api check the invariants the
// backend cannot be trusted to enforce for us. They are called both before
// sending anything over the wire and by the mock server on reception.

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(s.to_string()));
    }
    Ok(())
}

pub fn validate_non_empty(field: &str, s: &str) -> Result<(), Error> {
    validate_string(s)?;
    if s.trim().is_empty() {
        return Err(Error::EmptyField(field.to_string()));
    }
    Ok(())
}

pub fn now() -> Time {
    Utc::now()
}
