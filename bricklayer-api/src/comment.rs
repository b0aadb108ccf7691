use uuid::Uuid;

use crate::{Author, Error, PostId, Time, UserId};

pub const MAX_COMMENT_LEN: usize = 500;

/// Case-insensitively matched anywhere in a comment
pub const FORBIDDEN_WORDS: &[&str] = &["spam", "offensive"];

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct CommentId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    pub author_id: UserId,
    pub content: String,
    #[serde(default)]
    pub score: i64,
    pub created_at: Time,
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(rename = "profiles", default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
}

impl Comment {
    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .map(|a| &a.username as &str)
            .unwrap_or("Unknown author")
    }

    pub fn validate_edit(text: &str) -> Result<(), Error> {
        validate_comment_text(text)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub author_id: UserId,
    pub content: String,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        validate_comment_text(&self.content)
    }
}

fn validate_comment_text(text: &str) -> Result<(), Error> {
    crate::validate_non_empty("content", text)?;
    if text.chars().count() > MAX_COMMENT_LEN {
        return Err(Error::ContentTooLong(MAX_COMMENT_LEN));
    }
    let lower = text.to_lowercase();
    if let Some(w) = FORBIDDEN_WORDS.iter().find(|w| lower.contains(*w)) {
        return Err(Error::ForbiddenContent(String::from(*w)));
    }
    Ok(())
}
