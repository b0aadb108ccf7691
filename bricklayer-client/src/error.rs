use crate::api::{self, Error as ApiError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    pub fn permission_denied() -> Error {
        Error::Api(ApiError::PermissionDenied)
    }

    pub fn not_found() -> Error {
        Error::Api(ApiError::NotFound)
    }

    pub fn name_already_used(name: String) -> Error {
        Error::Api(ApiError::NameAlreadyUsed(name))
    }

    pub fn self_modification() -> Error {
        Error::Api(ApiError::SelfModification)
    }

    pub fn user_blocked() -> Error {
        Error::Api(ApiError::UserBlocked)
    }

    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(err) => Some(err),
            Error::Anyhow(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api(api::Error::NotFound))
    }

    /// Message fit for showing to the person behind the screen
    ///
    /// Transport failures are logged in full and reduced to a generic message.
    pub fn user_message(&self) -> String {
        match self {
            Error::Anyhow(err) => {
                tracing::error!(?err, "request to backend failed");
                String::from("Could not reach the server, please try again later")
            }
            Error::Api(err) => err.to_string(),
        }
    }
}
