//! Railway ticket reservation service.
//!
//! Staff maintain a catalogue of stations, routes, trains and crews and
//! schedule trips; customers place orders of seat tickets on those trips.
//! Every seat on a trip is sold at most once.

pub mod auth;
pub mod config;
pub mod domain;
pub mod reservation;
pub mod store;
pub mod web;
