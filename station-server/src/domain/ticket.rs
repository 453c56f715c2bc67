//! Tickets and orders.

use chrono::{DateTime, Utc};

use super::{OrderId, TicketId, TripId, UserId};

/// A seat on a specific trip. Unique across all tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeatKey {
    pub trip: TripId,
    pub cargo: u32,
    pub seat: u32,
}

/// A sold seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: TicketId,
    pub order: OrderId,
    pub trip: TripId,
    pub cargo: u32,
    pub seat: u32,
}

impl Ticket {
    pub fn key(&self) -> SeatKey {
        SeatKey {
            trip: self.trip,
            cargo: self.cargo,
            seat: self.seat,
        }
    }
}

/// A requested seat, not yet checked against the train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NewTicket {
    pub trip: TripId,
    pub cargo: u32,
    pub seat: u32,
}

impl NewTicket {
    pub fn new(trip: TripId, cargo: u32, seat: u32) -> Self {
        Self { trip, cargo, seat }
    }

    pub fn key(&self) -> SeatKey {
        SeatKey {
            trip: self.trip,
            cargo: self.cargo,
            seat: self.seat,
        }
    }
}

/// Tickets bought together by one user.
///
/// Created with at least one ticket. Deleting a trip removes its tickets
/// from existing orders. Tickets are ordered by `(cargo, seat)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub user: UserId,
    pub created_at: DateTime<Utc>,
    pub tickets: Vec<Ticket>,
}

/// Sorts tickets the way they are presented: by cargo, then seat.
pub fn sort_tickets(tickets: &mut [Ticket]) {
    tickets.sort_by_key(|t| (t.cargo, t.seat, t.id));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match() {
        let ticket = Ticket {
            id: TicketId(1),
            order: OrderId(1),
            trip: TripId(9),
            cargo: 2,
            seat: 5,
        };
        let request = NewTicket::new(TripId(9), 2, 5);
        assert_eq!(ticket.key(), request.key());
    }

    #[test]
    fn tickets_sorted_by_cargo_then_seat() {
        let make = |id, cargo, seat| Ticket {
            id: TicketId(id),
            order: OrderId(1),
            trip: TripId(1),
            cargo,
            seat,
        };
        let mut tickets = vec![make(1, 2, 1), make(2, 1, 7), make(3, 1, 3)];
        sort_tickets(&mut tickets);
        let seats: Vec<_> = tickets.iter().map(|t| (t.cargo, t.seat)).collect();
        assert_eq!(seats, vec![(1, 3), (1, 7), (2, 1)]);
    }
}
