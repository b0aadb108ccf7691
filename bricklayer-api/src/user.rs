use crate::{Error, Time, STUB_UUID};

use uuid::Uuid;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub reputation: i64,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_blocked: bool,
    pub created_at: Time,
}

impl Profile {
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            id: self.id,
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            reputation: self.reputation,
        }
    }

    pub fn author(&self) -> Author {
        Author {
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// What search results and the community spotlight show of a user
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProfileSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub reputation: i64,
}

/// Author information embedded in post and comment rows
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Author {
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Only the fields set to `Some` are sent to the backend
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(username) = &self.username {
            crate::validate_non_empty("username", username)?;
            if username.chars().any(|c| c.is_whitespace() || c == ':') {
                return Err(Error::InvalidName(username.clone()));
            }
        }
        for s in [&self.first_name, &self.last_name, &self.avatar_url]
            .into_iter()
            .flatten()
        {
            crate::validate_string(s)?;
        }
        Ok(())
    }

    pub fn apply_to(&self, p: &mut Profile) {
        if let Some(username) = &self.username {
            p.username = username.clone();
        }
        if let Some(first_name) = &self.first_name {
            p.first_name = Some(first_name.clone());
        }
        if let Some(last_name) = &self.last_name {
            p.last_name = Some(last_name.clone());
        }
        if let Some(avatar_url) = &self.avatar_url {
            p.avatar_url = Some(avatar_url.clone());
        }
    }
}
