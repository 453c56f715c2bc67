//! Persistence for the reservation service.
//!
//! The [`Store`] trait is the seam between request handling and storage.
//! Two backends implement it:
//!
//! - [`MemoryStore`]: tables behind a single `RwLock`, with hash indexes
//!   that play the role of unique constraints.
//! - `PostgresStore` (feature `postgres`): diesel over an r2d2 pool, with
//!   real `UNIQUE` constraints.
//!
//! Both enforce that a `(trip, cargo, seat)` triple is sold at most once
//! and insert an order together with all of its tickets or not at all.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{
    Crew, Email, Name, NewCrew, NewRoute, NewStation, NewTicket, NewTrain, NewTrip, Order, Profile,
    RangeError, Route, RouteId, SeatKey, SeatLayout, Station, StationId, Train, TrainId, TrainType,
    Trip, TripId, User, UserId,
};

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresStore};

/// Names of the uniqueness constraints, shared by every backend.
pub mod constraint {
    /// One ticket per `(trip, cargo, seat)`.
    pub const TICKET_SEAT: &str = "tickets_trip_cargo_seat_key";
    /// One route per `(source, destination)`.
    pub const ROUTE_ENDPOINTS: &str = "routes_source_destination_key";
    /// One account per email.
    pub const USER_EMAIL: &str = "users_email_key";
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A uniqueness constraint (see [`constraint`]) rejected the write.
    #[error("unique constraint violation \"{constraint}\"")]
    UniqueViolation { constraint: String },

    /// The record refers to a row that does not exist.
    #[error("\"{field}\" refers to missing {entity} {id}")]
    MissingReference {
        field: &'static str,
        entity: &'static str,
        id: i64,
    },

    /// A ticket of an order lies outside its trip's train. `index` is the
    /// ticket's position in the batch passed to [`Store::insert_order`].
    #[error("ticket {index} does not fit the train: {error}")]
    SeatOutOfRange { index: usize, error: RangeError },

    /// A new seat layout would leave sold tickets outside the train.
    #[error("sold tickets do not fit the new layout: {0}")]
    StrandedTickets(RangeError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn missing(field: &'static str, entity: &'static str, id: impl Into<i64>) -> Self {
        StoreError::MissingReference {
            field,
            entity,
            id: id.into(),
        }
    }

    pub fn unique(constraint: &str) -> Self {
        StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }

    /// Whether this is a violation of the given uniqueness constraint.
    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

/// A 1-based page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u32,
    pub size: u32,
}

impl PageRequest {
    /// Page numbers and sizes below 1 are raised to 1.
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }
}

/// One page of results plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    /// Cuts one page out of an already sorted, already filtered listing.
    pub fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let items = all
            .into_iter()
            .skip(offset)
            .take(request.size as usize)
            .collect();
        Page { items, total }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }

    /// Whether a page after `request` exists.
    pub fn has_next(&self, request: PageRequest) -> bool {
        request.offset() + (self.items.len() as u64) < self.total
    }
}

/// Case-insensitive substring match, as used by listing filters.
pub fn icontains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Route listing filters: substrings of the endpoint station names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteFilter {
    pub source: Option<String>,
    pub destination: Option<String>,
}

impl RouteFilter {
    pub fn matches(&self, source: &Station, destination: &Station) -> bool {
        self.source
            .as_deref()
            .is_none_or(|q| icontains(source.name.as_str(), q))
            && self
                .destination
                .as_deref()
                .is_none_or(|q| icontains(destination.name.as_str(), q))
    }
}

/// Trip listing filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripFilter {
    /// Substring of the source station name
    pub from: Option<String>,
    /// Substring of the destination station name
    pub to: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub arrival_date: Option<NaiveDate>,
    /// Only trips departing strictly after this instant
    pub departs_after: Option<DateTime<Utc>>,
}

impl TripFilter {
    pub fn matches(&self, header: &TripHeader) -> bool {
        let window = header.trip.window;
        self.from
            .as_deref()
            .is_none_or(|q| icontains(header.source.name.as_str(), q))
            && self
                .to
                .as_deref()
                .is_none_or(|q| icontains(header.destination.name.as_str(), q))
            && self.departure_date.is_none_or(|d| window.departs_on(d))
            && self.arrival_date.is_none_or(|d| window.arrives_on(d))
            && self.departs_after.is_none_or(|t| window.is_upcoming(t))
    }
}

/// A train together with its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainView {
    pub train: Train,
    pub train_type: TrainType,
}

/// A route together with its endpoint stations.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteView {
    pub route: Route,
    pub source: Station,
    pub destination: Station,
}

/// A trip with the records needed to describe it.
#[derive(Debug, Clone, PartialEq)]
pub struct TripHeader {
    pub trip: Trip,
    pub route: Route,
    pub source: Station,
    pub destination: Station,
    pub train: Train,
}

/// A listed trip and how many tickets it has sold, read together.
#[derive(Debug, Clone, PartialEq)]
pub struct TripSummary {
    pub header: TripHeader,
    pub tickets_sold: u64,
}

/// Everything shown on a trip's detail page.
#[derive(Debug, Clone, PartialEq)]
pub struct TripDetails {
    pub header: TripHeader,
    pub train_type: TrainType,
    pub crew: Vec<Crew>,
    /// Sold `(cargo, seat)` pairs, sorted
    pub taken_seats: Vec<(u32, u32)>,
}

/// An order with the trips its tickets are for.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderView {
    pub order: Order,
    pub trips: Vec<TripHeader>,
}

impl OrderView {
    pub fn trip(&self, id: TripId) -> Option<&TripHeader> {
        self.trips.iter().find(|h| h.trip.id == id)
    }
}

/// Stored credentials of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
}

/// Storage operations needed by the service.
///
/// Implementations must be safe to share between request handlers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap round trip used by `/health`.
    async fn ping(&self) -> StoreResult<()>;

    // Users

    /// Fails with [`constraint::USER_EMAIL`] if the email is taken.
    async fn insert_user(
        &self,
        profile: Profile,
        password_hash: String,
        is_staff: bool,
    ) -> StoreResult<User>;
    async fn find_credentials(&self, email: &Email) -> StoreResult<Option<Credentials>>;
    async fn get_user(&self, id: UserId) -> StoreResult<User>;
    /// Replaces the profile, and the password hash when one is given.
    async fn update_user(
        &self,
        id: UserId,
        profile: Profile,
        password_hash: Option<String>,
    ) -> StoreResult<User>;

    // Catalogue

    async fn insert_crew(&self, crew: NewCrew) -> StoreResult<Crew>;
    async fn list_crews(&self, page: PageRequest) -> StoreResult<Page<Crew>>;

    async fn insert_train_type(&self, name: Name) -> StoreResult<TrainType>;
    async fn list_train_types(&self, page: PageRequest) -> StoreResult<Page<TrainType>>;

    async fn insert_train(&self, train: NewTrain) -> StoreResult<TrainView>;
    async fn list_trains(&self, page: PageRequest) -> StoreResult<Page<TrainView>>;
    async fn get_train(&self, id: TrainId) -> StoreResult<TrainView>;
    /// Fails with [`StoreError::StrandedTickets`] if a ticket sold on any of
    /// the train's trips falls outside the new layout.
    async fn update_train(&self, id: TrainId, train: NewTrain) -> StoreResult<TrainView>;

    async fn insert_station(&self, station: NewStation) -> StoreResult<Station>;
    async fn list_stations(&self, page: PageRequest) -> StoreResult<Page<Station>>;
    async fn get_station(&self, id: StationId) -> StoreResult<Station>;

    /// Fails with [`constraint::ROUTE_ENDPOINTS`] if the pair exists.
    async fn insert_route(&self, route: NewRoute) -> StoreResult<RouteView>;
    async fn list_routes(
        &self,
        filter: &RouteFilter,
        page: PageRequest,
    ) -> StoreResult<Page<RouteView>>;
    async fn get_route(&self, id: RouteId) -> StoreResult<RouteView>;

    // Trips

    async fn insert_trip(&self, trip: NewTrip) -> StoreResult<Trip>;
    async fn get_trip(&self, id: TripId) -> StoreResult<Trip>;
    async fn trip_details(&self, id: TripId) -> StoreResult<TripDetails>;
    /// Lists matching trips, each with its sold ticket count from the same
    /// read.
    async fn list_trips(
        &self,
        filter: &TripFilter,
        page: PageRequest,
    ) -> StoreResult<Page<TripSummary>>;
    /// Fails with [`StoreError::StrandedTickets`] if a ticket sold on the
    /// trip falls outside the layout of its (new) train.
    async fn update_trip(&self, id: TripId, trip: NewTrip) -> StoreResult<Trip>;
    /// Deletes the trip and its tickets.
    async fn delete_trip(&self, id: TripId) -> StoreResult<()>;
    /// The seat layout of the train running the trip.
    async fn trip_layout(&self, id: TripId) -> StoreResult<SeatLayout>;

    // Tickets and orders

    async fn seat_taken(&self, key: SeatKey) -> StoreResult<bool>;
    /// Inserts an order and all of its tickets atomically.
    ///
    /// Fails with [`constraint::TICKET_SEAT`] if any seat is already sold,
    /// and with [`StoreError::SeatOutOfRange`] if a ticket does not fit its
    /// trip's train as it is when the order commits. Nothing is written on
    /// failure.
    async fn insert_order(
        &self,
        user: UserId,
        created_at: DateTime<Utc>,
        tickets: &[NewTicket],
    ) -> StoreResult<Order>;
    /// The user's orders, newest first.
    async fn list_orders(&self, user: UserId, page: PageRequest) -> StoreResult<Page<OrderView>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_offsets() {
        assert_eq!(PageRequest::new(1, 10).offset(), 0);
        assert_eq!(PageRequest::new(3, 10).offset(), 20);
        assert_eq!(PageRequest::new(0, 0), PageRequest::new(1, 1));
    }

    #[test]
    fn page_slicing() {
        let all: Vec<u32> = (1..=25).collect();
        let request = PageRequest::new(3, 10);
        let page = Page::slice(all.clone(), request);
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);
        assert!(!page.has_next(request));

        let first = PageRequest::new(1, 10);
        assert!(Page::slice(all, first).has_next(first));
    }

    #[test]
    fn page_beyond_end_is_empty() {
        let page = Page::slice(vec![1, 2, 3], PageRequest::new(5, 10));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
    }

    #[test]
    fn case_insensitive_contains() {
        assert!(icontains("Kyiv-Pasazhyrskyi", "kyiv"));
        assert!(icontains("Lviv", "VI"));
        assert!(!icontains("Lviv", "Odesa"));
    }

    #[test]
    fn unique_violation_matching() {
        let err = StoreError::unique(constraint::TICKET_SEAT);
        assert!(err.is_unique_violation(constraint::TICKET_SEAT));
        assert!(!err.is_unique_violation(constraint::USER_EMAIL));
        assert!(!StoreError::not_found("trip", 1).is_unique_violation(constraint::TICKET_SEAT));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            StoreError::not_found("trip", 4).to_string(),
            "trip 4 not found"
        );
        assert_eq!(
            StoreError::missing("route", "route", 9).to_string(),
            "\"route\" refers to missing route 9"
        );
    }
}
