//! Caller identity from HTTP Basic credentials.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use super::password::{HashError, verify_password};
use super::permission::AccessDenied;
use crate::domain::{Email, User};
use crate::store::{Store, StoreError};

/// Credentials carried by an `Authorization: Basic ...` header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error(transparent)]
    Denied(#[from] AccessDenied),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Decode the value of an `Authorization` header.
///
/// Returns `None` for schemes other than Basic, which are ignored.
pub fn parse_basic(header: &str) -> Option<Result<BasicCredentials, AccessDenied>> {
    let (scheme, encoded) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    Some(decode(encoded.trim()))
}

fn decode(encoded: &str) -> Result<BasicCredentials, AccessDenied> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| AccessDenied::MalformedHeader)?;
    let text = String::from_utf8(bytes).map_err(|_| AccessDenied::MalformedHeader)?;
    let (email, password) = text.split_once(':').ok_or(AccessDenied::MalformedHeader)?;
    Ok(BasicCredentials {
        email: email.to_string(),
        password: password.to_string(),
    })
}

/// Resolve the caller from an optional `Authorization` header.
///
/// No header (or a non-Basic one) means an anonymous caller. Credentials
/// that are present but wrong are an error rather than anonymity.
pub async fn authenticate<S: Store + ?Sized>(
    store: &S,
    header: Option<&str>,
) -> Result<Option<User>, IdentityError> {
    let Some(parsed) = header.and_then(parse_basic) else {
        return Ok(None);
    };
    let credentials = parsed?;

    let email = Email::parse(&credentials.email).map_err(|_| AccessDenied::InvalidCredentials)?;
    let Some(stored) = store.find_credentials(&email).await? else {
        debug!(email = %email, "login for unknown user");
        return Err(AccessDenied::InvalidCredentials.into());
    };
    if !verify_password(&credentials.password, &stored.password_hash).await? {
        debug!(user = %stored.user.id, "wrong password");
        return Err(AccessDenied::InvalidCredentials.into());
    }
    Ok(Some(stored.user))
}

/// Build a header value; used by clients and tests.
pub fn basic_header(email: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{email}:{password}")))
}
