//! Train crew members.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{CrewId, InvalidFields, Name};

/// Job a crew member holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewPosition {
    StationMaster,
    TrainDriver,
    TicketInspector,
    PlatformAttendant,
    TrainDispatcher,
    SecurityGuard,
    CleaningStaff,
    Other,
}

impl CrewPosition {
    /// All positions, in display order.
    pub const ALL: [CrewPosition; 8] = [
        CrewPosition::StationMaster,
        CrewPosition::TrainDriver,
        CrewPosition::TicketInspector,
        CrewPosition::PlatformAttendant,
        CrewPosition::TrainDispatcher,
        CrewPosition::SecurityGuard,
        CrewPosition::CleaningStaff,
        CrewPosition::Other,
    ];

    /// Stored value, e.g. `"train_driver"`.
    pub fn as_str(self) -> &'static str {
        match self {
            CrewPosition::StationMaster => "station_master",
            CrewPosition::TrainDriver => "train_driver",
            CrewPosition::TicketInspector => "ticket_inspector",
            CrewPosition::PlatformAttendant => "platform_attendant",
            CrewPosition::TrainDispatcher => "train_dispatcher",
            CrewPosition::SecurityGuard => "security_guard",
            CrewPosition::CleaningStaff => "cleaning_staff",
            CrewPosition::Other => "other",
        }
    }
}

/// Error returned when parsing an unknown crew position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{0}\" is not a valid choice.")]
pub struct InvalidCrewPosition(pub String);

impl FromStr for CrewPosition {
    type Err = InvalidCrewPosition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrewPosition::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| InvalidCrewPosition(s.to_string()))
    }
}

impl fmt::Display for CrewPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A crew member who can be assigned to trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crew {
    pub id: CrewId,
    pub first_name: Name,
    pub last_name: Name,
    pub position: CrewPosition,
}

impl Crew {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl fmt::Display for Crew {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.full_name(), self.position)
    }
}

/// A validated crew member that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCrew {
    pub first_name: Name,
    pub last_name: Name,
    pub position: CrewPosition,
}

impl NewCrew {
    pub fn new(first_name: &str, last_name: &str, position: CrewPosition) -> Result<Self, InvalidFields> {
        let first_name = Name::parse("first_name", first_name);
        let last_name = Name::parse("last_name", last_name);
        InvalidFields::check([
            first_name.as_ref().err().cloned(),
            last_name.as_ref().err().cloned(),
        ])?;
        Ok(Self {
            first_name: first_name?,
            last_name: last_name?,
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crew() -> Crew {
        Crew {
            id: CrewId(1),
            first_name: Name::parse("first_name", "Olena").unwrap(),
            last_name: Name::parse("last_name", "Shevchenko").unwrap(),
            position: CrewPosition::TrainDriver,
        }
    }

    #[test]
    fn full_name() {
        assert_eq!(crew().full_name(), "Olena Shevchenko");
    }

    #[test]
    fn display() {
        assert_eq!(crew().to_string(), "Olena Shevchenko - train_driver");
    }

    #[test]
    fn position_parse_roundtrip() {
        for position in CrewPosition::ALL {
            assert_eq!(position.as_str().parse::<CrewPosition>(), Ok(position));
        }
        assert!("captain".parse::<CrewPosition>().is_err());
    }

    #[test]
    fn position_serde_matches_stored_value() {
        let json = serde_json::to_string(&CrewPosition::CleaningStaff).unwrap();
        assert_eq!(json, "\"cleaning_staff\"");
    }

    #[test]
    fn new_crew_reports_both_names() {
        let err = NewCrew::new("", "", CrewPosition::Other).unwrap_err();
        assert_eq!(err.0.len(), 2);
    }
}
