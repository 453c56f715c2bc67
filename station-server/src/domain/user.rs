//! User accounts.

use std::fmt;

use serde::Serialize;

use super::{FieldError, InvalidFields, Name, UserId};

/// Maximum length of an email address.
const MAX_EMAIL_LEN: usize = 254;

/// A normalized (lowercase, trimmed) email address.
///
/// Emails identify users and are compared case-insensitively.
///
/// # Examples
///
/// ```
/// use station_server::domain::Email;
///
/// let email = Email::parse(" User@Example.COM ").unwrap();
/// assert_eq!(email.as_str(), "user@example.com");
///
/// assert!(Email::parse("not-an-email").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(s: &str) -> Result<Self, FieldError> {
        let invalid = || FieldError::new("email", "Enter a valid email address.");
        let normalized = s.trim().to_lowercase();

        if normalized.is_empty() || normalized.len() > MAX_EMAIL_LEN {
            return Err(invalid());
        }
        let (local, domain) = normalized.split_once('@').ok_or_else(invalid)?;
        if local.is_empty()
            || domain.contains('@')
            || normalized.chars().any(char::is_whitespace)
            || !is_valid_domain(domain)
        {
            return Err(invalid());
        }

        Ok(Email(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|l| {
            !l.is_empty()
                && !l.starts_with('-')
                && !l.ends_with('-')
                && l.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

impl fmt::Debug for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Email({})", self.0)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered user. Staff users may modify the catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub first_name: Name,
    pub last_name: Name,
    pub is_staff: bool,
}

/// Validated profile fields of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub email: Email,
    pub first_name: Name,
    pub last_name: Name,
}

impl Profile {
    pub fn new(email: &str, first_name: &str, last_name: &str) -> Result<Self, InvalidFields> {
        let email = Email::parse(email);
        let first_name = Name::parse("first_name", first_name);
        let last_name = Name::parse("last_name", last_name);
        InvalidFields::check([
            email.as_ref().err().cloned(),
            first_name.as_ref().err().cloned(),
            last_name.as_ref().err().cloned(),
        ])?;
        Ok(Self {
            email: email?,
            first_name: first_name?,
            last_name: last_name?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_addresses() {
        assert!(Email::parse("user@user.com").is_ok());
        assert!(Email::parse("first.last+tag@mail.example.org").is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in [
            "",
            "user",
            "@example.com",
            "user@",
            "user@localhost",
            "user@@example.com",
            "us er@example.com",
            "user@-example.com",
            "user@example..com",
        ] {
            assert!(Email::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn normalizes_case() {
        let a = Email::parse("Admin@Admin.com").unwrap();
        let b = Email::parse("admin@admin.com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn profile_reports_every_field() {
        let err = Profile::new("nope", "", "").unwrap_err();
        let fields: Vec<_> = err.0.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["email", "first_name", "last_name"]);
    }
}
