use uuid::Uuid;

use crate::{Author, CategoryId, CategoryRef, Error, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct PostId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub comments_count: i64,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: Time,
    #[serde(default)]
    pub updated_at: Option<Time>,

    #[serde(rename = "profiles", default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(rename = "categories", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryRef>,
}

impl Post {
    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .map(|a| &a.username as &str)
            .unwrap_or("Unknown author")
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewPost {
    pub author_id: UserId,
    pub category_id: Option<CategoryId>,
    pub title: String,
    pub content: String,
}

impl NewPost {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_non_empty("title", &self.title)?;
        crate::validate_non_empty("content", &self.content)?;
        Ok(())
    }
}

/// Only the fields set to `Some` are sent to the backend
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
}

impl PostUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(title) = &self.title {
            crate::validate_non_empty("title", title)?;
        }
        if let Some(content) = &self.content {
            crate::validate_non_empty("content", content)?;
        }
        Ok(())
    }

    pub fn apply_to(&self, p: &mut Post, now: Time) {
        if let Some(title) = &self.title {
            p.title = title.clone();
        }
        if let Some(content) = &self.content {
            p.content = content.clone();
        }
        if let Some(category_id) = self.category_id {
            p.category_id = Some(category_id);
        }
        p.updated_at = Some(now);
    }
}
