//! Mapping of every failure to an HTTP response.
//!
//! Validation failures render as field maps such as
//! `{"cargo": ["..."]}`; everything else as `{"detail": "..."}`.

use std::collections::BTreeMap;

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::auth::{AccessDenied, HashError, IdentityError};
use crate::domain::{InvalidFields, RangeError, ReservationError, SeatField, ValidationError};
use crate::reservation::{BookingError, TicketRejection};
use crate::store::{StoreError, constraint};

/// Key for errors that concern the record as a whole.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Group messages by field: `{"field": ["message", ...]}`.
pub fn field_map<'a>(errors: impl IntoIterator<Item = (&'a str, String)>) -> Value {
    let mut map: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (field, message) in errors {
        map.entry(field).or_default().push(message);
    }
    json!(map)
}

fn does_not_exist(id: i64) -> String {
    format!("Invalid pk \"{id}\" - object does not exist.")
}

/// Field map for a broken reservation rule.
pub fn reservation_errors(e: &ReservationError) -> Value {
    match e {
        ReservationError::Range(range) => field_map(
            range
                .violations
                .iter()
                .map(|v| (v.field.name(), v.to_string())),
        ),
        ReservationError::EmptyOrder => json!({ "tickets": field_map([(NON_FIELD_ERRORS, e.to_string())]) }),
        ReservationError::Conflict(_) | ReservationError::Ordering(_) => {
            field_map([(NON_FIELD_ERRORS, e.to_string())])
        }
    }
}

fn ticket_errors(reason: &TicketRejection) -> Value {
    match reason {
        TicketRejection::Invalid(e) => reservation_errors(e),
        TicketRejection::UnknownTrip(trip) => field_map([("trip", does_not_exist(trip.get()))]),
    }
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Field-level validation failure
    Invalid(Value),
    BadRequest { message: String },
    Denied(AccessDenied),
    NotFound { message: String },
    Internal { message: String },
}

impl AppError {
    pub fn not_found() -> Self {
        AppError::NotFound {
            message: "Not found.".to_string(),
        }
    }

    pub fn invalid_page() -> Self {
        AppError::NotFound {
            message: "Invalid page.".to_string(),
        }
    }

    /// A single-field validation failure.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        AppError::Invalid(field_map([(field, message.into())]))
    }

    /// A layout change that would strand sold tickets. `key` names the
    /// request field each violation is reported against.
    pub fn stranded(e: &RangeError, key: impl Fn(SeatField) -> &'static str) -> Self {
        AppError::Invalid(field_map(e.violations.iter().map(|v| {
            (
                key(v.field),
                format!(
                    "A sold ticket uses {} {}; {} must be at least {}.",
                    v.field,
                    v.value,
                    v.field.limit_name(),
                    v.value
                ),
            )
        })))
    }

    /// Map a rejected order onto `{"tickets": [...]}`, one entry per
    /// submitted ticket, empty for the accepted ones.
    pub fn booking(e: BookingError, submitted: usize) -> Self {
        match e {
            BookingError::Order(e) => e.into(),
            BookingError::Tickets(rejected) => {
                let mut tickets = vec![json!({}); submitted];
                for r in &rejected {
                    if let Some(slot) = tickets.get_mut(r.index) {
                        *slot = ticket_errors(&r.reason);
                    }
                }
                AppError::Invalid(json!({ "tickets": tickets }))
            }
            BookingError::Store(e) => e.into(),
        }
    }
}

impl From<InvalidFields> for AppError {
    fn from(e: InvalidFields) -> Self {
        AppError::Invalid(field_map(e.0.into_iter().map(|f| (f.field, f.message))))
    }
}

impl From<ReservationError> for AppError {
    fn from(e: ReservationError) -> Self {
        AppError::Invalid(reservation_errors(&e))
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::Fields(fields) => fields.into(),
            ValidationError::Reservation(e) => e.into(),
        }
    }
}

impl From<AccessDenied> for AppError {
    fn from(e: AccessDenied) -> Self {
        AppError::Denied(e)
    }
}

impl From<IdentityError> for AppError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Denied(e) => e.into(),
            IdentityError::Store(e) => e.into(),
            IdentityError::Hash(e) => e.into(),
        }
    }
}

impl From<HashError> for AppError {
    fn from(e: HashError) -> Self {
        AppError::Internal {
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => AppError::not_found(),
            StoreError::UniqueViolation { constraint: name } => match name.as_str() {
                constraint::USER_EMAIL => {
                    AppError::field("email", "user with this email already exists.")
                }
                constraint::ROUTE_ENDPOINTS => AppError::field(
                    NON_FIELD_ERRORS,
                    "The fields source, destination must make a unique set.",
                ),
                constraint::TICKET_SEAT => AppError::field(
                    NON_FIELD_ERRORS,
                    "The fields trip, cargo, seat must make a unique set.",
                ),
                other => AppError::Internal {
                    message: format!("unexpected unique violation on {other}"),
                },
            },
            StoreError::MissingReference { field, id, .. } => {
                AppError::field(field, does_not_exist(id))
            }
            StoreError::SeatOutOfRange { error, .. } => {
                AppError::Invalid(reservation_errors(&ReservationError::Range(error)))
            }
            StoreError::StrandedTickets(e) => AppError::stranded(&e, SeatField::limit_name),
            StoreError::Backend(message) => AppError::Internal { message },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Invalid(body) => (StatusCode::BAD_REQUEST, body),
            AppError::BadRequest { message } => {
                (StatusCode::BAD_REQUEST, json!({ "detail": message }))
            }
            AppError::Denied(denied) => {
                let status = if denied.is_authentication() {
                    StatusCode::UNAUTHORIZED
                } else {
                    StatusCode::FORBIDDEN
                };
                (status, json!({ "detail": denied.to_string() }))
            }
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, json!({ "detail": message })),
            AppError::Internal { message } => {
                error!(%message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "detail": "A server error occurred." }),
                )
            }
        };
        if status.is_client_error() {
            debug!(status = status.as_u16(), body = %body, "request rejected");
        }

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Basic realm=\"api\""),
            );
        }
        response
    }
}
