//! Trips: a train running over a route at a scheduled time.

use chrono::{DateTime, NaiveDate, Utc};

use super::{CrewId, OrderingError, RouteId, TrainId, TripId};

/// Departure and arrival of a trip.
///
/// Departure is strictly earlier than arrival by construction.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use station_server::domain::TripWindow;
///
/// let dep = Utc.with_ymd_and_hms(2024, 4, 1, 12, 30, 0).unwrap();
/// let arr = Utc.with_ymd_and_hms(2024, 4, 2, 18, 30, 0).unwrap();
///
/// assert!(TripWindow::new(dep, arr).is_ok());
/// assert!(TripWindow::new(arr, dep).is_err());
/// assert!(TripWindow::new(dep, dep).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TripWindow {
    departure: DateTime<Utc>,
    arrival: DateTime<Utc>,
}

impl TripWindow {
    pub fn new(departure: DateTime<Utc>, arrival: DateTime<Utc>) -> Result<Self, OrderingError> {
        if departure >= arrival {
            return Err(OrderingError::DepartureNotBeforeArrival);
        }
        Ok(Self { departure, arrival })
    }

    pub fn departure(&self) -> DateTime<Utc> {
        self.departure
    }

    pub fn arrival(&self) -> DateTime<Utc> {
        self.arrival
    }

    /// Whether the trip departs on `date` (UTC calendar day).
    pub fn departs_on(&self, date: NaiveDate) -> bool {
        self.departure.date_naive() == date
    }

    /// Whether the trip arrives on `date` (UTC calendar day).
    pub fn arrives_on(&self, date: NaiveDate) -> bool {
        self.arrival.date_naive() == date
    }

    /// Whether the trip has not departed yet at `now`.
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.departure > now
    }
}

/// A scheduled run of a train over a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trip {
    pub id: TripId,
    pub route: RouteId,
    pub train: TrainId,
    pub crew: Vec<CrewId>,
    pub window: TripWindow,
}

/// A validated trip that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrip {
    pub route: RouteId,
    pub train: TrainId,
    pub crew: Vec<CrewId>,
    pub window: TripWindow,
}

impl NewTrip {
    /// Builds a trip, dropping repeated crew members.
    pub fn new(route: RouteId, train: TrainId, crew: Vec<CrewId>, window: TripWindow) -> Self {
        let mut crew = crew;
        crew.sort_unstable();
        crew.dedup();
        Self {
            route,
            train,
            crew,
            window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn window_accessors() {
        let window = TripWindow::new(at(1, 8), at(2, 9)).unwrap();
        assert_eq!(window.departure(), at(1, 8));
        assert_eq!(window.arrival(), at(2, 9));
    }

    #[test]
    fn equal_times_rejected() {
        assert_eq!(
            TripWindow::new(at(1, 8), at(1, 8)),
            Err(OrderingError::DepartureNotBeforeArrival)
        );
    }

    #[test]
    fn date_matching() {
        let window = TripWindow::new(at(1, 8), at(2, 9)).unwrap();
        let may = |d| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
        assert!(window.departs_on(may(1)));
        assert!(!window.departs_on(may(2)));
        assert!(window.arrives_on(may(2)));
    }

    #[test]
    fn upcoming() {
        let window = TripWindow::new(at(1, 8), at(2, 9)).unwrap();
        assert!(window.is_upcoming(at(1, 8) - Duration::minutes(1)));
        assert!(!window.is_upcoming(at(1, 8)));
    }

    #[test]
    fn new_trip_dedups_crew() {
        let window = TripWindow::new(at(1, 8), at(2, 9)).unwrap();
        let trip = NewTrip::new(
            RouteId(1),
            TrainId(1),
            vec![CrewId(3), CrewId(1), CrewId(3)],
            window,
        );
        assert_eq!(trip.crew, vec![CrewId(1), CrewId(3)]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    proptest! {
        /// A window is valid iff departure is strictly before arrival
        #[test]
        fn ordering_property(start in 0i64..4_000_000_000, offset in -100_000i64..100_000) {
            let departure = DateTime::<Utc>::from_timestamp(start, 0).unwrap();
            let arrival = departure + Duration::seconds(offset);
            let result = TripWindow::new(departure, arrival);
            prop_assert_eq!(result.is_ok(), offset > 0);
        }
    }
}
