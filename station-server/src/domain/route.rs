//! Routes between two stations.

use super::train::MAX_POSITIVE;
use super::{FieldError, OrderingError, RouteId, StationId, ValidationError};

/// A directed connection from one station to another.
///
/// # Invariants
///
/// - `source != destination`
/// - At most one route exists per `(source, destination)` pair; the store
///   enforces this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: RouteId,
    pub source: StationId,
    pub destination: StationId,
    /// Length in kilometres
    pub distance: u32,
}

/// A validated route that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoute {
    pub source: StationId,
    pub destination: StationId,
    pub distance: u32,
}

impl NewRoute {
    /// Validate route input.
    ///
    /// # Errors
    ///
    /// - a field error if `distance` does not fit in storage
    /// - [`OrderingError::SameEndpoints`] if the route is a loop
    pub fn new(
        source: StationId,
        destination: StationId,
        distance: u32,
    ) -> Result<Self, ValidationError> {
        if distance > MAX_POSITIVE {
            return Err(FieldError::new(
                "distance",
                format!("Ensure this value is less than or equal to {MAX_POSITIVE}."),
            )
            .into());
        }
        if source == destination {
            return Err(OrderingError::SameEndpoints.into());
        }
        Ok(Self {
            source,
            destination,
            distance,
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// A route from a station to itself is always an ordering error
        #[test]
        fn loop_always_rejected(id in any::<i64>(), distance in 0..=MAX_POSITIVE) {
            let err = NewRoute::new(StationId(id), StationId(id), distance).unwrap_err();
            prop_assert!(matches!(
                err,
                ValidationError::Reservation(crate::domain::ReservationError::Ordering(
                    OrderingError::SameEndpoints
                ))
            ));
        }

        /// Distinct endpoints with a storable distance always pass
        #[test]
        fn distinct_endpoints_accepted(a in any::<i64>(), b in any::<i64>(), distance in 0..=MAX_POSITIVE) {
            prop_assume!(a != b);
            prop_assert!(NewRoute::new(StationId(a), StationId(b), distance).is_ok());
        }
    }
}
