//! Reservation rules.
//!
//! A ticket is valid when its seat lies inside the trip's train and no
//! other ticket holds the same `(trip, cargo, seat)`. Orders are placed
//! all-or-nothing through [`Booking`], and availability is always derived
//! from capacity and sold tickets, never stored.

mod availability;
mod booking;
mod validate;

pub use availability::{InvariantViolation, compute_available_seats};
pub use booking::{
    Booking, BookingError, RejectedTicket, TicketRejection, TicketRequest, check_uniqueness,
};
pub use validate::{checked_ticket, validate_layout_change, validate_ticket};
