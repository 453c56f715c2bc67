//! Permission policies checked before a handler runs.

use axum::http::Method;

use crate::domain::User;

/// Whether a request only reads or may also modify data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

impl Action {
    /// `GET`, `HEAD` and `OPTIONS` are reads; everything else writes.
    pub fn of(method: &Method) -> Self {
        if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
            Action::Read
        } else {
            Action::Write
        }
    }
}

/// A request that may not proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("Authentication credentials were not provided.")]
    Unauthenticated,
    #[error("Invalid username/password.")]
    InvalidCredentials,
    #[error("Invalid basic header.")]
    MalformedHeader,
    #[error("You do not have permission to perform this action.")]
    Forbidden,
}

impl AccessDenied {
    /// Whether the client should retry with credentials, as opposed to
    /// being refused outright.
    pub fn is_authentication(self) -> bool {
        !matches!(self, AccessDenied::Forbidden)
    }
}

/// A rule deciding which callers may perform which actions.
pub trait Permission {
    fn check(caller: Option<&User>, action: Action) -> Result<(), AccessDenied>;
}

/// Anyone, signed in or not.
#[derive(Debug, Clone, Copy)]
pub struct AllowAny;

impl Permission for AllowAny {
    fn check(_: Option<&User>, _: Action) -> Result<(), AccessDenied> {
        Ok(())
    }
}

/// Any signed-in user.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated;

impl Permission for Authenticated {
    fn check(caller: Option<&User>, _: Action) -> Result<(), AccessDenied> {
        caller.map(|_| ()).ok_or(AccessDenied::Unauthenticated)
    }
}

/// Signed-in users may read; only staff may write.
#[derive(Debug, Clone, Copy)]
pub struct AdminOrAuthenticatedReadOnly;

impl Permission for AdminOrAuthenticatedReadOnly {
    fn check(caller: Option<&User>, action: Action) -> Result<(), AccessDenied> {
        let user = caller.ok_or(AccessDenied::Unauthenticated)?;
        match action {
            Action::Read => Ok(()),
            Action::Write if user.is_staff => Ok(()),
            Action::Write => Err(AccessDenied::Forbidden),
        }
    }
}
