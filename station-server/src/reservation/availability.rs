//! Derived seat availability.

use tracing::error;

use crate::domain::{SeatLayout, TripId};

/// More tickets are sold for a trip than its train has seats.
///
/// Never displayed to users; it indicates corrupted data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("trip {trip} has {sold} tickets sold but only {capacity} seats")]
pub struct InvariantViolation {
    pub trip: TripId,
    pub capacity: u64,
    pub sold: u64,
}

/// Seats still available on a trip: `cargo_num * places_in_cargo - sold`.
///
/// `sold` must come from the same consistent read as `layout`. A negative
/// result is logged as an invariant violation and returned as an error.
pub fn compute_available_seats(
    trip: TripId,
    layout: &SeatLayout,
    sold: u64,
) -> Result<u64, InvariantViolation> {
    let capacity = layout.capacity();
    capacity.checked_sub(sold).ok_or_else(|| {
        let violation = InvariantViolation {
            trip,
            capacity,
            sold,
        };
        error!(
            trip = %trip,
            capacity,
            sold,
            "more tickets sold than seats available"
        );
        violation
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trip_has_full_capacity() {
        let layout = SeatLayout::new(10, 20).unwrap();
        assert_eq!(compute_available_seats(TripId(1), &layout, 0), Ok(200));
    }

    #[test]
    fn one_ticket_sold() {
        let layout = SeatLayout::new(10, 20).unwrap();
        assert_eq!(compute_available_seats(TripId(1), &layout, 1), Ok(199));
    }

    #[test]
    fn sold_out() {
        let layout = SeatLayout::new(2, 3).unwrap();
        assert_eq!(compute_available_seats(TripId(1), &layout, 6), Ok(0));
    }

    #[test]
    fn oversold_is_invariant_violation() {
        let layout = SeatLayout::new(2, 3).unwrap();
        let err = compute_available_seats(TripId(5), &layout, 7).unwrap_err();
        assert_eq!(
            err,
            InvariantViolation {
                trip: TripId(5),
                capacity: 6,
                sold: 7
            }
        );
        assert_eq!(
            err.to_string(),
            "trip 5 has 7 tickets sold but only 6 seats"
        );
    }
}
