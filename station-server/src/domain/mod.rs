//! Domain types for the railway reservation service.
//!
//! This module contains the core domain model types that represent
//! validated railway data. All types enforce their invariants at construction
//! time, so code that receives these types can trust their validity.

mod crew;
mod error;
mod ids;
mod name;
mod route;
mod station;
mod ticket;
mod train;
mod trip;
mod user;

pub use crew::{Crew, CrewPosition, InvalidCrewPosition, NewCrew};
pub use error::{
    FieldError, InvalidFields, OrderingError, RangeError, RangeViolation, ReservationError,
    SeatConflict, SeatField, ValidationError,
};
pub use ids::{CrewId, OrderId, RouteId, StationId, TicketId, TrainId, TrainTypeId, TripId, UserId};
pub use name::{MAX_NAME_LEN, Name};
pub use route::{NewRoute, Route};
pub use station::{NewStation, Station};
pub use ticket::{NewTicket, Order, SeatKey, Ticket, sort_tickets};
pub use train::{MAX_POSITIVE, NewTrain, SeatLayout, Train, TrainType, check_positive};
pub use trip::{NewTrip, Trip, TripWindow};
pub use user::{Email, Profile, User};
