use uuid::Uuid;

use crate::Error;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct TagId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

impl Tag {
    /// Tags are stored trimmed and lower-cased, so that `Technic` and
    /// ` technic ` end up as the same tag
    pub fn normalize_name(name: &str) -> Result<String, Error> {
        crate::validate_non_empty("tag", name)?;
        Ok(name.trim().to_lowercase())
    }
}
