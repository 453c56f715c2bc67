//! Typed row identifiers.
//!
//! Every entity gets its own id type so a `TripId` can never be passed
//! where a `TrainId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Returns the raw database value.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

entity_id!(
    /// Identifier of a [`Station`](super::Station).
    StationId
);
entity_id!(
    /// Identifier of a [`Route`](super::Route).
    RouteId
);
entity_id!(
    /// Identifier of a [`TrainType`](super::TrainType).
    TrainTypeId
);
entity_id!(
    /// Identifier of a [`Train`](super::Train).
    TrainId
);
entity_id!(
    /// Identifier of a [`Crew`](super::Crew) member.
    CrewId
);
entity_id!(
    /// Identifier of a [`Trip`](super::Trip).
    TripId
);
entity_id!(
    /// Identifier of an [`Order`](super::Order).
    OrderId
);
entity_id!(
    /// Identifier of a [`Ticket`](super::Ticket).
    TicketId
);
entity_id!(
    /// Identifier of a [`User`](super::User).
    UserId
);
