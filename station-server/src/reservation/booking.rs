//! Order placement.
//!
//! An order is accepted only if every ticket in it is valid; otherwise
//! nothing is written and every rejected ticket is reported by its index.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::validate::checked_ticket;
use crate::domain::{
    NewTicket, Order, ReservationError, SeatConflict, SeatKey, SeatLayout, TripId, UserId,
};
use crate::store::{Store, StoreError, StoreResult, constraint};

/// A ticket as submitted by a customer, before any checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketRequest {
    pub trip: TripId,
    pub cargo: i64,
    pub seat: i64,
}

/// Why a single ticket of an order was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketRejection {
    Invalid(ReservationError),
    UnknownTrip(TripId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedTicket {
    /// Position of the ticket in the submitted order
    pub index: usize,
    pub reason: TicketRejection,
}

/// Why an order was not placed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookingError {
    /// The order as a whole is invalid (it has no tickets).
    #[error("{0}")]
    Order(ReservationError),

    #[error("{} ticket(s) rejected", .0.len())]
    Tickets(Vec<RejectedTicket>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn conflict(key: SeatKey) -> SeatConflict {
    SeatConflict {
        trip: key.trip,
        cargo: key.cargo,
        seat: key.seat,
    }
}

/// Whether the seat is still free.
///
/// The outer result reports storage failures; the inner one the verdict.
/// This check is advisory: the store's unique constraint is what finally
/// decides between two concurrent buyers.
pub async fn check_uniqueness<S: Store + ?Sized>(
    store: &S,
    key: SeatKey,
) -> StoreResult<Result<(), SeatConflict>> {
    if store.seat_taken(key).await? {
        Ok(Err(conflict(key)))
    } else {
        Ok(Ok(()))
    }
}

/// Places orders against a [`Store`].
pub struct Booking<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> Booking<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Validate and store an order with all of its tickets.
    ///
    /// Checks, per ticket: the trip exists, the seat lies inside the trip's
    /// train, the seat is not requested twice in this order, and the seat is
    /// not already sold. A seat sold between the check and the insert is
    /// caught by the store's unique constraint and reported the same way.
    pub async fn place_order(
        &self,
        user: UserId,
        requests: &[TicketRequest],
        now: DateTime<Utc>,
    ) -> Result<Order, BookingError> {
        if requests.is_empty() {
            debug!(user = %user, "rejected empty order");
            return Err(BookingError::Order(ReservationError::EmptyOrder));
        }

        let mut layouts: HashMap<TripId, Option<SeatLayout>> = HashMap::new();
        let mut seen: HashSet<SeatKey> = HashSet::new();
        let mut accepted: Vec<(usize, NewTicket)> = Vec::with_capacity(requests.len());
        let mut rejected = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            let layout = match layouts.get(&request.trip) {
                Some(layout) => *layout,
                None => {
                    let layout = match self.store.trip_layout(request.trip).await {
                        Ok(layout) => Some(layout),
                        Err(StoreError::NotFound { .. }) => None,
                        Err(e) => return Err(e.into()),
                    };
                    layouts.insert(request.trip, layout);
                    layout
                }
            };
            let Some(layout) = layout else {
                rejected.push(RejectedTicket {
                    index,
                    reason: TicketRejection::UnknownTrip(request.trip),
                });
                continue;
            };

            let ticket = match checked_ticket(request.trip, request.cargo, request.seat, &layout) {
                Ok(ticket) => ticket,
                Err(range) => {
                    rejected.push(RejectedTicket {
                        index,
                        reason: TicketRejection::Invalid(range.into()),
                    });
                    continue;
                }
            };

            let key = ticket.key();
            let verdict = if seen.insert(key) {
                check_uniqueness(self.store, key).await?
            } else {
                Err(conflict(key))
            };
            match verdict {
                Ok(()) => accepted.push((index, ticket)),
                Err(taken) => rejected.push(RejectedTicket {
                    index,
                    reason: TicketRejection::Invalid(taken.into()),
                }),
            }
        }

        if !rejected.is_empty() {
            debug!(user = %user, rejected = rejected.len(), "rejected order");
            return Err(BookingError::Tickets(rejected));
        }

        let tickets: Vec<NewTicket> = accepted.iter().map(|(_, t)| *t).collect();
        match self.store.insert_order(user, now, &tickets).await {
            Ok(order) => {
                debug!(
                    user = %user,
                    order = %order.id,
                    tickets = order.tickets.len(),
                    "placed order"
                );
                Ok(order)
            }
            Err(e) if e.is_unique_violation(constraint::TICKET_SEAT) => {
                Err(self.lost_race(&accepted).await)
            }
            Err(StoreError::MissingReference {
                field: "trip", id, ..
            }) => Err(BookingError::Tickets(
                accepted
                    .iter()
                    .filter(|(_, t)| t.trip.get() == id)
                    .map(|(index, t)| RejectedTicket {
                        index: *index,
                        reason: TicketRejection::UnknownTrip(t.trip),
                    })
                    .collect(),
            )),
            // The train was shrunk after the seats were checked
            Err(StoreError::SeatOutOfRange { index, error }) => {
                Err(BookingError::Tickets(vec![RejectedTicket {
                    index: accepted.get(index).map_or(index, |(i, _)| *i),
                    reason: TicketRejection::Invalid(ReservationError::Range(error)),
                }]))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Work out which seats were sold by a concurrent order.
    async fn lost_race(&self, accepted: &[(usize, NewTicket)]) -> BookingError {
        let mut rejected = Vec::new();
        for (index, ticket) in accepted {
            match self.store.seat_taken(ticket.key()).await {
                Ok(true) => rejected.push(RejectedTicket {
                    index: *index,
                    reason: TicketRejection::Invalid(conflict(ticket.key()).into()),
                }),
                Ok(false) => {}
                Err(e) => return e.into(),
            }
        }
        // The competing order may have been deleted since; blame the first seat.
        if rejected.is_empty() {
            if let Some((index, ticket)) = accepted.first() {
                rejected.push(RejectedTicket {
                    index: *index,
                    reason: TicketRejection::Invalid(conflict(ticket.key()).into()),
                });
            }
        }
        debug!(conflicts = rejected.len(), "lost a race for seats");
        BookingError::Tickets(rejected)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::domain::{
        Name, NewRoute, NewStation, NewTrain, NewTrip, Profile, SeatField, TripWindow,
    };
    use crate::reservation::compute_available_seats;
    use crate::store::{MemoryStore, PageRequest, TripFilter};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap()
    }

    /// A store holding one 10 x 20 train on one trip, and one customer.
    async fn setup() -> (MemoryStore, UserId, TripId) {
        let store = MemoryStore::new();
        let user = store
            .insert_user(
                Profile::new("user@user.com", "Test", "User").unwrap(),
                "hash".into(),
                false,
            )
            .await
            .unwrap();
        let a = store
            .insert_station(NewStation::new("Kyiv", 50.45, 30.52).unwrap())
            .await
            .unwrap();
        let b = store
            .insert_station(NewStation::new("Odesa", 46.48, 30.72).unwrap())
            .await
            .unwrap();
        let route = store
            .insert_route(NewRoute::new(a.id, b.id, 475).unwrap())
            .await
            .unwrap();
        let train_type = store
            .insert_train_type(Name::parse("name", "Night").unwrap())
            .await
            .unwrap();
        let train = store
            .insert_train(NewTrain::new("Chornomorets", 10, 20, train_type.id).unwrap())
            .await
            .unwrap();
        let departure = now() + Duration::days(3);
        let trip = store
            .insert_trip(NewTrip::new(
                route.route.id,
                train.train.id,
                vec![],
                TripWindow::new(departure, departure + Duration::hours(9)).unwrap(),
            ))
            .await
            .unwrap();
        (store, user.id, trip.id)
    }

    fn seat(trip: TripId, cargo: i64, seat: i64) -> TicketRequest {
        TicketRequest { trip, cargo, seat }
    }

    async fn available(store: &MemoryStore) -> u64 {
        let page = store
            .list_trips(&TripFilter::default(), PageRequest::new(1, 10))
            .await
            .unwrap();
        let summary = &page.items[0];
        compute_available_seats(
            summary.header.trip.id,
            &summary.header.train.layout,
            summary.tickets_sold,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_order_persists_nothing() {
        let (store, user, _) = setup().await;
        let err = Booking::new(&store)
            .place_order(user, &[], now())
            .await
            .unwrap_err();
        assert_eq!(err, BookingError::Order(ReservationError::EmptyOrder));
        let orders = store.list_orders(user, PageRequest::new(1, 10)).await.unwrap();
        assert_eq!(orders.total, 0);
    }

    #[tokio::test]
    async fn scenario_range_conflict_and_availability() {
        let (store, user, trip) = setup().await;
        let booking = Booking::new(&store);
        assert_eq!(available(&store).await, 200);

        let err = booking
            .place_order(user, &[seat(trip, 1000, 1000)], now())
            .await
            .unwrap_err();
        let rejected = match err {
            BookingError::Tickets(rejected) => rejected,
            other => panic!("expected ticket rejection, got {other:?}"),
        };
        assert_eq!(rejected.len(), 1);
        let TicketRejection::Invalid(ReservationError::Range(range)) = &rejected[0].reason else {
            panic!("expected range error, got {:?}", rejected[0].reason);
        };
        assert!(range.violation(SeatField::Cargo).is_some());
        assert!(range.violation(SeatField::Seat).is_some());

        booking
            .place_order(user, &[seat(trip, 1, 1)], now())
            .await
            .unwrap();
        assert_eq!(available(&store).await, 199);

        let err = booking
            .place_order(user, &[seat(trip, 1, 1)], now())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BookingError::Tickets(vec![RejectedTicket {
                index: 0,
                reason: TicketRejection::Invalid(ReservationError::Conflict(SeatConflict {
                    trip,
                    cargo: 1,
                    seat: 1
                })),
            }])
        );
        assert_eq!(available(&store).await, 199);
    }

    #[tokio::test]
    async fn failures_reported_per_ticket_and_nothing_written() {
        let (store, user, trip) = setup().await;
        let err = Booking::new(&store)
            .place_order(
                user,
                &[
                    seat(trip, 2, 2),
                    seat(trip, 2, 21),
                    seat(TripId(404), 1, 1),
                    seat(trip, 2, 2),
                ],
                now(),
            )
            .await
            .unwrap_err();
        let rejected = match err {
            BookingError::Tickets(rejected) => rejected,
            other => panic!("expected ticket rejection, got {other:?}"),
        };
        let indices: Vec<_> = rejected.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(rejected[1].reason, TicketRejection::UnknownTrip(TripId(404)));
        assert!(matches!(
            rejected[2].reason,
            TicketRejection::Invalid(ReservationError::Conflict(_))
        ));

        // The valid first ticket was not written either.
        let key = SeatKey { trip, cargo: 2, seat: 2 };
        assert_eq!(check_uniqueness(&store, key).await.unwrap(), Ok(()));
        assert_eq!(available(&store).await, 200);
    }

    #[tokio::test]
    async fn multi_ticket_order() {
        let (store, user, trip) = setup().await;
        let order = Booking::new(&store)
            .place_order(
                user,
                &[seat(trip, 3, 4), seat(trip, 1, 20), seat(trip, 10, 1)],
                now(),
            )
            .await
            .unwrap();
        let seats: Vec<_> = order.tickets.iter().map(|t| (t.cargo, t.seat)).collect();
        assert_eq!(seats, vec![(1, 20), (3, 4), (10, 1)]);
        assert_eq!(order.created_at, now());
        assert_eq!(available(&store).await, 197);
    }

    #[tokio::test]
    async fn check_uniqueness_reports_conflict() {
        let (store, user, trip) = setup().await;
        let key = SeatKey { trip, cargo: 5, seat: 6 };
        assert_eq!(check_uniqueness(&store, key).await.unwrap(), Ok(()));
        Booking::new(&store)
            .place_order(user, &[seat(trip, 5, 6)], now())
            .await
            .unwrap();
        assert_eq!(
            check_uniqueness(&store, key).await.unwrap(),
            Err(SeatConflict { trip, cargo: 5, seat: 6 })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_buyers_get_one_seat() {
        let (store, user, trip) = setup().await;
        let store = Arc::new(store);

        let attempts = (0..16).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                Booking::new(store.as_ref())
                    .place_order(user, &[seat(trip, 7, 7)], now())
                    .await
            })
        });
        let results: Vec<_> = futures::future::join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let placed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(placed, 1);
        for result in results.into_iter().filter_map(Result::err) {
            let rejected = match result {
                BookingError::Tickets(rejected) => rejected,
                other => panic!("expected a seat conflict, got {other:?}"),
            };
            assert!(matches!(
                rejected[0].reason,
                TicketRejection::Invalid(ReservationError::Conflict(_))
            ));
        }
        assert_eq!(available(&store).await, 199);
    }
}
