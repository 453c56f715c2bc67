//! Trains, their types and seat layouts.

use std::fmt;

use super::{FieldError, InvalidFields, Name, TrainId, TrainTypeId};

/// Largest value a stored positive integer may hold.
pub const MAX_POSITIVE: u32 = i32::MAX as u32;

/// A category of train, e.g. "Intercity+".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainType {
    pub id: TrainTypeId,
    pub name: Name,
}

impl fmt::Display for TrainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

/// Physical seat layout of a train: `cargo_num` cars of
/// `places_in_cargo` seats each.
///
/// Both dimensions are positive by construction.
///
/// # Examples
///
/// ```
/// use station_server::domain::SeatLayout;
///
/// let layout = SeatLayout::new(10, 20).unwrap();
/// assert_eq!(layout.capacity(), 200);
///
/// assert!(SeatLayout::new(0, 20).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeatLayout {
    cargo_num: u32,
    places_in_cargo: u32,
}

impl SeatLayout {
    pub fn new(cargo_num: u32, places_in_cargo: u32) -> Result<Self, InvalidFields> {
        InvalidFields::check([
            check_positive("cargo_num", cargo_num).err(),
            check_positive("places_in_cargo", places_in_cargo).err(),
        ])?;
        Ok(Self {
            cargo_num,
            places_in_cargo,
        })
    }

    /// Number of cars.
    pub fn cargo_num(&self) -> u32 {
        self.cargo_num
    }

    /// Seats per car.
    pub fn places_in_cargo(&self) -> u32 {
        self.places_in_cargo
    }

    /// Total number of seats.
    pub fn capacity(&self) -> u64 {
        u64::from(self.cargo_num) * u64::from(self.places_in_cargo)
    }
}

/// Checks a stored positive integer (`1..=MAX_POSITIVE`).
pub fn check_positive(field: &'static str, value: u32) -> Result<(), FieldError> {
    if value == 0 {
        Err(FieldError::new(
            field,
            "Ensure this value is greater than or equal to 1.",
        ))
    } else if value > MAX_POSITIVE {
        Err(FieldError::new(
            field,
            format!("Ensure this value is less than or equal to {MAX_POSITIVE}."),
        ))
    } else {
        Ok(())
    }
}

/// A train of a given type and layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Train {
    pub id: TrainId,
    pub name: Name,
    pub layout: SeatLayout,
    pub train_type: TrainTypeId,
}

impl Train {
    pub fn capacity(&self) -> u64 {
        self.layout.capacity()
    }
}

/// A validated train that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrain {
    pub name: Name,
    pub layout: SeatLayout,
    pub train_type: TrainTypeId,
}

impl NewTrain {
    pub fn new(
        name: &str,
        cargo_num: u32,
        places_in_cargo: u32,
        train_type: TrainTypeId,
    ) -> Result<Self, InvalidFields> {
        let name = Name::parse("name", name);
        let layout = SeatLayout::new(cargo_num, places_in_cargo);

        let mut errors: Vec<FieldError> = name.as_ref().err().cloned().into_iter().collect();
        if let Err(InvalidFields(layout_errors)) = &layout {
            errors.extend(layout_errors.iter().cloned());
        }
        if !errors.is_empty() {
            return Err(InvalidFields(errors));
        }

        Ok(Self {
            name: name?,
            layout: layout?,
            train_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity() {
        let layout = SeatLayout::new(10, 20).unwrap();
        assert_eq!(layout.capacity(), 200);
        assert_eq!(layout.cargo_num(), 10);
        assert_eq!(layout.places_in_cargo(), 20);
    }

    #[test]
    fn capacity_does_not_overflow() {
        let layout = SeatLayout::new(MAX_POSITIVE, MAX_POSITIVE).unwrap();
        assert_eq!(
            layout.capacity(),
            u64::from(MAX_POSITIVE) * u64::from(MAX_POSITIVE)
        );
    }

    #[test]
    fn rejects_zero_dimensions() {
        let err = SeatLayout::new(0, 0).unwrap_err();
        let fields: Vec<_> = err.0.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["cargo_num", "places_in_cargo"]);
    }

    #[test]
    fn rejects_values_beyond_storage() {
        assert!(SeatLayout::new(MAX_POSITIVE + 1, 1).is_err());
    }

    #[test]
    fn new_train_collects_name_and_layout_errors() {
        let err = NewTrain::new("", 0, 5, TrainTypeId(1)).unwrap_err();
        let fields: Vec<_> = err.0.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "cargo_num"]);
    }

    #[test]
    fn train_type_display() {
        let tt = TrainType {
            id: TrainTypeId(1),
            name: Name::parse("name", "Intercity+").unwrap(),
        };
        assert_eq!(tt.to_string(), "Intercity+");
    }
}
