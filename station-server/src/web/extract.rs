//! Request extractors: authenticated callers and JSON bodies.

use std::marker::PhantomData;

use axum::{
    body::Bytes,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::AppError;
use super::state::AppState;
use crate::auth::{AccessDenied, Action, Permission, authenticate};
use crate::domain::User;

/// The caller of a request, already checked against policy `P`.
///
/// Rejects the request with 401 or 403 before the handler runs.
pub struct Access<P> {
    user: Option<User>,
    _policy: PhantomData<fn() -> P>,
}

impl<P> Access<P> {
    /// The signed-in user; fails for anonymous callers.
    pub fn user(&self) -> Result<&User, AppError> {
        self.user
            .as_ref()
            .ok_or(AppError::Denied(AccessDenied::Unauthenticated))
    }
}

#[axum::async_trait]
impl<P: Permission> FromRequestParts<AppState> for Access<P> {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .map(|value| value.to_str())
            .transpose()
            .map_err(|_| AccessDenied::MalformedHeader)?;

        let user = authenticate(state.store.as_ref(), header).await?;
        P::check(user.as_ref(), Action::of(&parts.method))?;

        Ok(Self {
            user,
            _policy: PhantomData,
        })
    }
}

/// Parse a JSON request body. Failures are logged with the parser error and
/// its position only; bodies may hold passwords.
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(
            error = %e,
            line = e.line(),
            column = e.column(),
            len = body.len(),
            "invalid JSON body"
        );
        AppError::BadRequest {
            message: format!("JSON parse error - {e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use serde::Deserialize;

    use super::*;

    /// Log output collected in memory.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Body {
        name: String,
    }

    #[test]
    fn parses_json() {
        let body = Bytes::from_static(br#"{"name": "Kyiv"}"#);
        assert_eq!(
            parse_json::<Body>(&body).unwrap(),
            Body {
                name: "Kyiv".into()
            }
        );
    }

    #[test]
    fn malformed_json_is_bad_request() {
        let body = Bytes::from_static(b"{name");
        assert!(matches!(
            parse_json::<Body>(&body),
            Err(AppError::BadRequest { .. })
        ));
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Login {
        email: String,
        password: String,
    }

    #[test]
    fn failed_parse_does_not_log_body() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let body = Bytes::from_static(br#"{"email": "a@b.com", "password": "hunter2secret" oops}"#);
        let result = tracing::subscriber::with_default(subscriber, || parse_json::<Login>(&body));
        assert!(matches!(result, Err(AppError::BadRequest { .. })));

        let logged = captured.text();
        assert!(logged.contains("invalid JSON body"), "{logged}");
        assert!(logged.contains("column="), "{logged}");
        assert!(!logged.contains("hunter2secret"), "{logged}");
        assert!(!logged.contains("a@b.com"), "{logged}");
    }
}
