#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not found")]
    NotFound,

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Field {0} must not be empty")]
    EmptyField(String),

    #[error("Content is too long (max {0} characters)")]
    ContentTooLong(usize),

    #[error("Content contains forbidden word {0:?}")]
    ForbiddenContent(String),

    #[error("Invalid character in name {0:?}")]
    InvalidName(String),

    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("Password and confirmation do not match")]
    PasswordMismatch,

    #[error("Admins cannot change their own role or block status")]
    SelfModification,

    #[error("User is blocked")]
    UserBlocked,
}

impl Error {
    /// Interprets an error answer from the hosted backend
    ///
    /// The row API answers with `{"code", "message", "details", "hint"}` and
    /// the auth API with either `{"error", "error_description"}` or
    /// `{"code", "msg"}`. Anything we do not recognize ends up as `Unknown`.
    pub fn from_backend(status: http::StatusCode, body: &[u8]) -> Error {
        use http::StatusCode;
        let data: Option<serde_json::Value> = serde_json::from_slice(body).ok();
        let field = |name: &str| {
            data.as_ref()
                .and_then(|d| d.get(name))
                .and_then(|v| v.as_str())
                .map(String::from)
        };
        let message = field("message")
            .or_else(|| field("msg"))
            .or_else(|| field("error_description"))
            .or_else(|| field("error"))
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
        match (status, field("code").as_deref()) {
            // no row matched a single-object request
            (_, Some("PGRST116")) => Error::NotFound,
            // unique_violation
            (_, Some("23505")) => conflict(field("details"), message),
            // insufficient_privilege, row-level security
            (_, Some("42501")) => Error::PermissionDenied,
            (StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE, _) => Error::NotFound,
            (StatusCode::CONFLICT, _) => conflict(field("details"), message),
            (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => Error::PermissionDenied,
            _ => Error::Unknown(message),
        }
    }
}

/// Unique violations detail the clashing value as `Key (username)=(alice)
/// already exists.`
fn conflict(details: Option<String>, message: String) -> Error {
    let value = details.as_deref().and_then(|d| {
        let (_, rest) = d.split_once(")=(")?;
        let (value, _) = rest.rsplit_once(')')?;
        Some(String::from(value))
    });
    match value {
        Some(v) => Error::NameAlreadyUsed(v),
        None => Error::Unknown(message),
    }
}
