//! HTTP API for the reservation service.
//!
//! JSON endpoints under `/api/station` for the catalogue, trips and orders,
//! and under `/api/user` for registration and the caller's profile.

mod dto;
mod error;
mod extract;
mod routes;
mod state;

pub use dto::*;
pub use error::AppError;
pub use extract::Access;
pub use routes::create_router;
pub use state::AppState;
