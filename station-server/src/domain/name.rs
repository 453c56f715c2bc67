//! Short human-readable names.

use std::fmt;

use serde::Serialize;

use super::FieldError;

/// Maximum length of any stored name.
pub const MAX_NAME_LEN: usize = 63;

/// A non-blank name of at most [`MAX_NAME_LEN`] characters.
///
/// Used for station, train, train type, crew and user names. Surrounding
/// whitespace is trimmed.
///
/// # Examples
///
/// ```
/// use station_server::domain::Name;
///
/// let name = Name::parse("name", "  Kyiv ").unwrap();
/// assert_eq!(name.as_str(), "Kyiv");
///
/// assert!(Name::parse("name", "   ").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    /// Parse a name, reporting failures against `field`.
    pub fn parse(field: &'static str, s: &str) -> Result<Self, FieldError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FieldError::new(field, "This field may not be blank."));
        }
        if trimmed.chars().count() > MAX_NAME_LEN {
            return Err(FieldError::new(
                field,
                format!("Ensure this field has no more than {MAX_NAME_LEN} characters."),
            ));
        }
        Ok(Name(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?})", self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
