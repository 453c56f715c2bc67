//! Domain error types.
//!
//! These errors represent validation failures in the domain layer. They
//! are distinct from storage and HTTP errors, and every one of them is
//! recoverable by the caller correcting its input.

use std::fmt;

use super::TripId;

/// Which part of a seat reference is out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeatField {
    /// The car number
    Cargo,
    /// The seat number within a car
    Seat,
}

impl SeatField {
    /// Request field name.
    pub fn name(self) -> &'static str {
        match self {
            SeatField::Cargo => "cargo",
            SeatField::Seat => "seat",
        }
    }

    /// Name of the train attribute that bounds this field.
    pub fn limit_name(self) -> &'static str {
        match self {
            SeatField::Cargo => "cargo_num",
            SeatField::Seat => "places_in_cargo",
        }
    }
}

impl fmt::Display for SeatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One field outside the valid `1..=limit` range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeViolation {
    pub field: SeatField,
    pub value: i64,
    pub limit: u32,
}

impl fmt::Display for RangeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{field} number must be in available range: (1, {limit_name}): (1, {limit})",
            field = self.field,
            limit_name = self.field.limit_name(),
            limit = self.limit,
        )
    }
}

/// A ticket does not fit inside the train.
///
/// Holds every violated field, never an empty list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeError {
    pub violations: Vec<RangeViolation>,
}

impl RangeError {
    /// Returns the violation for `field`, if that field was out of range.
    pub fn violation(&self, field: SeatField) -> Option<&RangeViolation> {
        self.violations.iter().find(|v| v.field == field)
    }
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RangeError {}

/// The seat `(trip, cargo, seat)` is already sold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("The fields trip, cargo, seat must make a unique set.")]
pub struct SeatConflict {
    pub trip: TripId,
    pub cargo: u32,
    pub seat: u32,
}

/// Endpoints or times given in the wrong order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OrderingError {
    /// A route that starts where it ends
    #[error("Source can't be equal to Destination")]
    SameEndpoints,

    /// A trip that arrives before (or when) it departs
    #[error("Departure time can't be bigger than arrival time")]
    DepartureNotBeforeArrival,
}

/// Reservation invariant failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReservationError {
    /// Cargo or seat outside the train's physical bounds
    #[error("{0}")]
    Range(RangeError),

    /// Seat already booked for the trip
    #[error(transparent)]
    Conflict(SeatConflict),

    /// Order submitted without tickets
    #[error("This list may not be empty.")]
    EmptyOrder,

    /// Route or trip with reversed/equal endpoints or times
    #[error(transparent)]
    Ordering(OrderingError),
}

impl From<RangeError> for ReservationError {
    fn from(e: RangeError) -> Self {
        ReservationError::Range(e)
    }
}

impl From<SeatConflict> for ReservationError {
    fn from(e: SeatConflict) -> Self {
        ReservationError::Conflict(e)
    }
}

impl From<OrderingError> for ReservationError {
    fn from(e: OrderingError) -> Self {
        ReservationError::Ordering(e)
    }
}

/// A single invalid input field, e.g. a name that is too long.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Every invalid field of a submitted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFields(pub Vec<FieldError>);

impl InvalidFields {
    /// Collects the failures of independent field checks.
    pub fn check(failures: impl IntoIterator<Item = Option<FieldError>>) -> Result<(), Self> {
        let errors: Vec<FieldError> = failures.into_iter().flatten().collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(InvalidFields(errors))
        }
    }
}

impl From<FieldError> for InvalidFields {
    fn from(e: FieldError) -> Self {
        InvalidFields(vec![e])
    }
}

impl fmt::Display for InvalidFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "invalid fields: {}", parts.join(", "))
    }
}

impl std::error::Error for InvalidFields {}

/// Why a submitted record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// One or more fields are malformed
    #[error(transparent)]
    Fields(#[from] InvalidFields),

    /// The record breaks a reservation invariant
    #[error(transparent)]
    Reservation(#[from] ReservationError),
}

impl From<FieldError> for ValidationError {
    fn from(e: FieldError) -> Self {
        ValidationError::Fields(e.into())
    }
}

impl From<OrderingError> for ValidationError {
    fn from(e: OrderingError) -> Self {
        ValidationError::Reservation(e.into())
    }
}

impl From<RangeError> for ValidationError {
    fn from(e: RangeError) -> Self {
        ValidationError::Reservation(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RangeError {
            violations: vec![RangeViolation {
                field: SeatField::Cargo,
                value: 1000,
                limit: 10,
            }],
        };
        assert_eq!(
            err.to_string(),
            "cargo number must be in available range: (1, cargo_num): (1, 10)"
        );

        let err = ReservationError::Conflict(SeatConflict {
            trip: TripId(1),
            cargo: 1,
            seat: 1,
        });
        assert_eq!(
            err.to_string(),
            "The fields trip, cargo, seat must make a unique set."
        );

        assert_eq!(
            ReservationError::EmptyOrder.to_string(),
            "This list may not be empty."
        );

        let err = ReservationError::Ordering(OrderingError::SameEndpoints);
        assert_eq!(err.to_string(), "Source can't be equal to Destination");

        let err = ReservationError::Ordering(OrderingError::DepartureNotBeforeArrival);
        assert_eq!(
            err.to_string(),
            "Departure time can't be bigger than arrival time"
        );
    }

    #[test]
    fn range_error_lists_every_field() {
        let err = RangeError {
            violations: vec![
                RangeViolation {
                    field: SeatField::Cargo,
                    value: 1000,
                    limit: 10,
                },
                RangeViolation {
                    field: SeatField::Seat,
                    value: 1000,
                    limit: 20,
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("(1, cargo_num): (1, 10)"));
        assert!(text.contains("(1, places_in_cargo): (1, 20)"));
        assert_eq!(err.violation(SeatField::Seat).map(|v| v.limit), Some(20));
    }

    #[test]
    fn invalid_fields_collects_failures_only() {
        let result = InvalidFields::check([
            None,
            Some(FieldError::new("name", "This field may not be blank.")),
            None,
        ]);
        let err = result.unwrap_err();
        assert_eq!(err.0.len(), 1);
        assert_eq!(err.0[0].field, "name");

        assert!(InvalidFields::check([None, None]).is_ok());
    }
}
