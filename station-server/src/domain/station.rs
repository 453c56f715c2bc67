//! Stations.

use std::fmt;

use super::{FieldError, InvalidFields, Name, StationId};

/// A railway station with its coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: StationId,
    pub name: Name,
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Station {} ({}, {})",
            self.name, self.latitude, self.longitude
        )
    }
}

/// A validated station that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStation {
    pub name: Name,
    pub latitude: f64,
    pub longitude: f64,
}

impl NewStation {
    /// Validate station input.
    ///
    /// Latitude must lie in `-90..=90` and longitude in `-180..=180`.
    pub fn new(name: &str, latitude: f64, longitude: f64) -> Result<Self, InvalidFields> {
        let name = Name::parse("name", name);
        InvalidFields::check([
            name.as_ref().err().cloned(),
            check_coordinate("latitude", latitude, 90.0).err(),
            check_coordinate("longitude", longitude, 180.0).err(),
        ])?;
        Ok(Self {
            name: name?,
            latitude,
            longitude,
        })
    }
}

fn check_coordinate(field: &'static str, value: f64, bound: f64) -> Result<(), FieldError> {
    if value.is_finite() && (-bound..=bound).contains(&value) {
        Ok(())
    } else {
        Err(FieldError::new(
            field,
            format!("Ensure this value is between -{bound} and {bound}."),
        ))
    }
}
