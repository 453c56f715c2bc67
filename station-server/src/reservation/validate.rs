//! Seat range validation.

use crate::domain::{NewTicket, RangeError, RangeViolation, SeatField, SeatLayout, TripId};

/// Check that `(cargo, seat)` lies inside the train's layout.
///
/// Succeeds iff `1 <= cargo <= cargo_num` and `1 <= seat <= places_in_cargo`.
/// On failure every out-of-range field is reported together with its
/// valid range.
///
/// # Examples
///
/// ```
/// use station_server::domain::{SeatField, SeatLayout};
/// use station_server::reservation::validate_ticket;
///
/// let layout = SeatLayout::new(10, 20).unwrap();
/// assert!(validate_ticket(1, 1, &layout).is_ok());
///
/// let err = validate_ticket(1000, 1000, &layout).unwrap_err();
/// assert!(err.violation(SeatField::Cargo).is_some());
/// assert!(err.violation(SeatField::Seat).is_some());
/// ```
pub fn validate_ticket(cargo: i64, seat: i64, layout: &SeatLayout) -> Result<(), RangeError> {
    let violations: Vec<RangeViolation> = [
        (SeatField::Cargo, cargo, layout.cargo_num()),
        (SeatField::Seat, seat, layout.places_in_cargo()),
    ]
    .into_iter()
    .filter(|&(_, value, limit)| !(1..=i64::from(limit)).contains(&value))
    .map(|(field, value, limit)| RangeViolation {
        field,
        value,
        limit,
    })
    .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(RangeError { violations })
    }
}

/// Validate a requested seat and narrow it to a [`NewTicket`].
pub fn checked_ticket(
    trip: TripId,
    cargo: i64,
    seat: i64,
    layout: &SeatLayout,
) -> Result<NewTicket, RangeError> {
    validate_ticket(cargo, seat, layout)?;
    // Both values are within 1..=u32 limits after validation.
    let cargo = u32::try_from(cargo).unwrap_or(u32::MAX);
    let seat = u32::try_from(seat).unwrap_or(u32::MAX);
    Ok(NewTicket::new(trip, cargo, seat))
}

/// Check that every already-booked seat still fits in `layout`.
///
/// `extent` is the highest booked `(cargo, seat)` pair, as reported by
/// the store; `None` means nothing is booked.
pub fn validate_layout_change(
    layout: &SeatLayout,
    extent: Option<(u32, u32)>,
) -> Result<(), RangeError> {
    match extent {
        None => Ok(()),
        Some((max_cargo, max_seat)) => {
            validate_ticket(i64::from(max_cargo), i64::from(max_seat), layout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SeatLayout {
        SeatLayout::new(10, 20).unwrap()
    }

    #[test]
    fn accepts_corners() {
        assert!(validate_ticket(1, 1, &layout()).is_ok());
        assert!(validate_ticket(10, 20, &layout()).is_ok());
        assert!(validate_ticket(1, 20, &layout()).is_ok());
        assert!(validate_ticket(10, 1, &layout()).is_ok());
    }

    #[test]
    fn rejects_zero_and_negative() {
        let err = validate_ticket(0, 1, &layout()).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].field, SeatField::Cargo);
        assert_eq!(err.violations[0].value, 0);

        let err = validate_ticket(1, -3, &layout()).unwrap_err();
        assert_eq!(err.violations[0].field, SeatField::Seat);
    }

    #[test]
    fn names_both_fields_when_both_out_of_range() {
        let err = validate_ticket(1000, 1000, &layout()).unwrap_err();
        let cargo = err.violation(SeatField::Cargo).unwrap();
        let seat = err.violation(SeatField::Seat).unwrap();
        assert_eq!((cargo.value, cargo.limit), (1000, 10));
        assert_eq!((seat.value, seat.limit), (1000, 20));
        assert_eq!(
            cargo.to_string(),
            "cargo number must be in available range: (1, cargo_num): (1, 10)"
        );
        assert_eq!(
            seat.to_string(),
            "seat number must be in available range: (1, places_in_cargo): (1, 20)"
        );
    }

    #[test]
    fn checked_ticket_narrows() {
        let ticket = checked_ticket(TripId(4), 3, 7, &layout()).unwrap();
        assert_eq!(ticket, NewTicket::new(TripId(4), 3, 7));
        assert!(checked_ticket(TripId(4), 11, 7, &layout()).is_err());
    }

    #[test]
    fn layout_change() {
        assert!(validate_layout_change(&layout(), None).is_ok());
        assert!(validate_layout_change(&layout(), Some((10, 20))).is_ok());

        let smaller = SeatLayout::new(5, 20).unwrap();
        let err = validate_layout_change(&smaller, Some((6, 2))).unwrap_err();
        assert_eq!(err.violations[0].field, SeatField::Cargo);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// validate_ticket succeeds iff both values are inside their ranges
        #[test]
        fn succeeds_iff_in_range(
            cargo_num in 1u32..200,
            places in 1u32..200,
            cargo in -5i64..250,
            seat in -5i64..250,
        ) {
            let layout = SeatLayout::new(cargo_num, places).unwrap();
            let in_range = (1..=i64::from(cargo_num)).contains(&cargo)
                && (1..=i64::from(places)).contains(&seat);
            prop_assert_eq!(validate_ticket(cargo, seat, &layout).is_ok(), in_range);
        }

        /// Each reported violation names a field that really is out of range
        #[test]
        fn violations_are_exact(
            cargo_num in 1u32..50,
            places in 1u32..50,
            cargo in -5i64..60,
            seat in -5i64..60,
        ) {
            let layout = SeatLayout::new(cargo_num, places).unwrap();
            if let Err(err) = validate_ticket(cargo, seat, &layout) {
                let cargo_bad = !(1..=i64::from(cargo_num)).contains(&cargo);
                let seat_bad = !(1..=i64::from(places)).contains(&seat);
                prop_assert_eq!(err.violation(SeatField::Cargo).is_some(), cargo_bad);
                prop_assert_eq!(err.violation(SeatField::Seat).is_some(), seat_bad);
            }
        }
    }
}
