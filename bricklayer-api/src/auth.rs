use crate::{Error, Profile, UserId};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewSession {
    pub email: String,
    pub password: String,
}

impl NewSession {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_non_empty("email", &self.email)?;
        crate::validate_non_empty("password", &self.password)?;
        Ok(())
    }
}

/// Access token handed out by the auth service
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub String);

/// The signed-in identity, passed explicitly to every operation acting on
/// behalf of a user
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Session {
    pub user: UserId,
    pub token: AuthToken,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct Registration {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl Registration {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_non_empty("username", &self.username)?;
        if self.username.chars().any(|c| c.is_whitespace() || c == ':') {
            return Err(Error::InvalidName(self.username.clone()));
        }
        crate::validate_non_empty("first_name", &self.first_name)?;
        crate::validate_non_empty("last_name", &self.last_name)?;
        crate::validate_non_empty("email", &self.email)?;
        crate::validate_string(&self.password)?;
        if self.password != self.confirm_password {
            return Err(Error::PasswordMismatch);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::PasswordTooShort(MIN_PASSWORD_LEN));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthInfo {
    pub can_read: bool,
    pub can_post: bool,
    pub can_comment: bool,
    pub can_vote: bool,
    pub can_admin: bool,
}

impl AuthInfo {
    pub fn anonymous() -> AuthInfo {
        AuthInfo {
            can_read: true,
            ..Self::none()
        }
    }

    pub fn none() -> AuthInfo {
        AuthInfo {
            can_read: false,
            can_post: false,
            can_comment: false,
            can_vote: false,
            can_admin: false,
        }
    }

    pub fn for_profile(p: &Profile) -> AuthInfo {
        if p.is_blocked {
            return Self::anonymous();
        }
        AuthInfo {
            can_read: true,
            can_post: true,
            can_comment: true,
            can_vote: true,
            can_admin: p.is_admin,
        }
    }
}
