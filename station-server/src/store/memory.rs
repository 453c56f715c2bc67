//! In-memory store.
//!
//! All tables live behind one `tokio::sync::RwLock`, so every operation sees
//! a consistent snapshot and writers are serialized. Hash indexes stand in
//! for the unique constraints of the SQL schema.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    Credentials, OrderView, Page, PageRequest, RouteFilter, RouteView, Store, StoreError,
    StoreResult, TrainView, TripDetails, TripFilter, TripHeader, TripSummary, constraint,
};
use crate::domain::{
    Crew, CrewId, Email, Name, NewCrew, NewRoute, NewStation, NewTicket, NewTrain, NewTrip, Order,
    OrderId, Profile, Route, RouteId, SeatKey, SeatLayout, Station, StationId, Ticket, TicketId,
    Train, TrainId, TrainType, TrainTypeId, Trip, TripId, User, UserId, sort_tickets,
};
use crate::reservation::{validate_layout_change, validate_ticket};

#[derive(Debug, Clone)]
struct OrderRow {
    id: OrderId,
    user: UserId,
    created_at: DateTime<Utc>,
}

/// Last id handed out per table.
#[derive(Debug, Default)]
struct Sequences {
    user: i64,
    crew: i64,
    train_type: i64,
    train: i64,
    station: i64,
    route: i64,
    trip: i64,
    order: i64,
    ticket: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Default)]
struct Tables {
    ids: Sequences,
    users: BTreeMap<UserId, Credentials>,
    emails: HashMap<Email, UserId>,
    crews: BTreeMap<CrewId, Crew>,
    train_types: BTreeMap<TrainTypeId, TrainType>,
    trains: BTreeMap<TrainId, Train>,
    stations: BTreeMap<StationId, Station>,
    routes: BTreeMap<RouteId, Route>,
    route_endpoints: HashMap<(StationId, StationId), RouteId>,
    trips: BTreeMap<TripId, Trip>,
    orders: BTreeMap<OrderId, OrderRow>,
    tickets: BTreeMap<TicketId, Ticket>,
    seats: HashMap<SeatKey, TicketId>,
}

impl Tables {
    fn station(&self, id: StationId) -> StoreResult<&Station> {
        self.stations
            .get(&id)
            .ok_or_else(|| StoreError::not_found("station", id))
    }

    fn train(&self, id: TrainId) -> StoreResult<&Train> {
        self.trains
            .get(&id)
            .ok_or_else(|| StoreError::not_found("train", id))
    }

    fn trip(&self, id: TripId) -> StoreResult<&Trip> {
        self.trips
            .get(&id)
            .ok_or_else(|| StoreError::not_found("trip", id))
    }

    fn train_view(&self, train: &Train) -> StoreResult<TrainView> {
        let train_type = self
            .train_types
            .get(&train.train_type)
            .ok_or_else(|| StoreError::not_found("train type", train.train_type))?;
        Ok(TrainView {
            train: train.clone(),
            train_type: train_type.clone(),
        })
    }

    fn route_view(&self, route: &Route) -> StoreResult<RouteView> {
        Ok(RouteView {
            route: route.clone(),
            source: self.station(route.source)?.clone(),
            destination: self.station(route.destination)?.clone(),
        })
    }

    fn trip_header(&self, trip: &Trip) -> StoreResult<TripHeader> {
        let route = self
            .routes
            .get(&trip.route)
            .ok_or_else(|| StoreError::not_found("route", trip.route))?;
        let view = self.route_view(route)?;
        Ok(TripHeader {
            trip: trip.clone(),
            route: view.route,
            source: view.source,
            destination: view.destination,
            train: self.train(trip.train)?.clone(),
        })
    }

    fn check_train_refs(&self, train: &NewTrain) -> StoreResult<()> {
        if self.train_types.contains_key(&train.train_type) {
            Ok(())
        } else {
            Err(StoreError::missing(
                "train_type",
                "train type",
                train.train_type,
            ))
        }
    }

    fn check_trip_refs(&self, trip: &NewTrip) -> StoreResult<()> {
        if !self.routes.contains_key(&trip.route) {
            return Err(StoreError::missing("route", "route", trip.route));
        }
        if !self.trains.contains_key(&trip.train) {
            return Err(StoreError::missing("train", "train", trip.train));
        }
        if let Some(missing) = trip.crew.iter().find(|c| !self.crews.contains_key(c)) {
            return Err(StoreError::missing("crew", "crew", *missing));
        }
        Ok(())
    }

    fn tickets_of_trip(&self, trip: TripId) -> impl Iterator<Item = &Ticket> {
        self.tickets.values().filter(move |t| t.trip == trip)
    }

    /// Highest cargo and seat sold on any trip of the train.
    fn train_extent(&self, train: TrainId) -> Option<(u32, u32)> {
        let trips: HashSet<TripId> = self
            .trips
            .values()
            .filter(|t| t.train == train)
            .map(|t| t.id)
            .collect();
        extent(self.tickets.values().filter(|t| trips.contains(&t.trip)))
    }

    fn order_tickets(&self, order: OrderId) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .values()
            .filter(|t| t.order == order)
            .cloned()
            .collect();
        sort_tickets(&mut tickets);
        tickets
    }

    fn sold_per_trip(&self) -> HashMap<TripId, u64> {
        let mut sold = HashMap::new();
        for ticket in self.tickets.values() {
            *sold.entry(ticket.trip).or_insert(0) += 1;
        }
        sold
    }
}

/// Highest cargo and highest seat among `tickets`.
fn extent<'a>(tickets: impl Iterator<Item = &'a Ticket>) -> Option<(u32, u32)> {
    tickets.fold(None, |acc, t| match acc {
        None => Some((t.cargo, t.seat)),
        Some((c, s)) => Some((c.max(t.cargo), s.max(t.seat))),
    })
}

/// A [`Store`] that keeps everything in process memory.
///
/// Used when no database is configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        let _tables = self.tables.read().await;
        Ok(())
    }

    async fn insert_user(
        &self,
        profile: Profile,
        password_hash: String,
        is_staff: bool,
    ) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.emails.contains_key(&profile.email) {
            return Err(StoreError::unique(constraint::USER_EMAIL));
        }
        let id = UserId(next(&mut tables.ids.user));
        let user = User {
            id,
            email: profile.email,
            first_name: profile.first_name,
            last_name: profile.last_name,
            is_staff,
        };
        tables.emails.insert(user.email.clone(), id);
        tables.users.insert(
            id,
            Credentials {
                user: user.clone(),
                password_hash,
            },
        );
        Ok(user)
    }

    async fn find_credentials(&self, email: &Email) -> StoreResult<Option<Credentials>> {
        let tables = self.tables.read().await;
        Ok(tables
            .emails
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(&id)
            .map(|c| c.user.clone())
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn update_user(
        &self,
        id: UserId,
        profile: Profile,
        password_hash: Option<String>,
    ) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        let old_email = tables
            .users
            .get(&id)
            .map(|c| c.user.email.clone())
            .ok_or_else(|| StoreError::not_found("user", id))?;
        if tables.emails.get(&profile.email).is_some_and(|owner| *owner != id) {
            return Err(StoreError::unique(constraint::USER_EMAIL));
        }
        tables.emails.remove(&old_email);
        tables.emails.insert(profile.email.clone(), id);

        let credentials = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("user", id))?;
        credentials.user.email = profile.email;
        credentials.user.first_name = profile.first_name;
        credentials.user.last_name = profile.last_name;
        if let Some(hash) = password_hash {
            credentials.password_hash = hash;
        }
        Ok(credentials.user.clone())
    }

    async fn insert_crew(&self, crew: NewCrew) -> StoreResult<Crew> {
        let mut tables = self.tables.write().await;
        let id = CrewId(next(&mut tables.ids.crew));
        let crew = Crew {
            id,
            first_name: crew.first_name,
            last_name: crew.last_name,
            position: crew.position,
        };
        tables.crews.insert(id, crew.clone());
        Ok(crew)
    }

    async fn list_crews(&self, page: PageRequest) -> StoreResult<Page<Crew>> {
        let tables = self.tables.read().await;
        Ok(Page::slice(tables.crews.values().cloned().collect(), page))
    }

    async fn insert_train_type(&self, name: Name) -> StoreResult<TrainType> {
        let mut tables = self.tables.write().await;
        let id = TrainTypeId(next(&mut tables.ids.train_type));
        let train_type = TrainType { id, name };
        tables.train_types.insert(id, train_type.clone());
        Ok(train_type)
    }

    async fn list_train_types(&self, page: PageRequest) -> StoreResult<Page<TrainType>> {
        let tables = self.tables.read().await;
        Ok(Page::slice(tables.train_types.values().cloned().collect(), page))
    }

    async fn insert_train(&self, train: NewTrain) -> StoreResult<TrainView> {
        let mut tables = self.tables.write().await;
        tables.check_train_refs(&train)?;
        let id = TrainId(next(&mut tables.ids.train));
        let train = Train {
            id,
            name: train.name,
            layout: train.layout,
            train_type: train.train_type,
        };
        tables.trains.insert(id, train.clone());
        tables.train_view(&train)
    }

    async fn list_trains(&self, page: PageRequest) -> StoreResult<Page<TrainView>> {
        let tables = self.tables.read().await;
        let views = tables
            .trains
            .values()
            .map(|t| tables.train_view(t))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::slice(views, page))
    }

    async fn get_train(&self, id: TrainId) -> StoreResult<TrainView> {
        let tables = self.tables.read().await;
        tables.train_view(tables.train(id)?)
    }

    async fn update_train(&self, id: TrainId, train: NewTrain) -> StoreResult<TrainView> {
        let mut tables = self.tables.write().await;
        tables.check_train_refs(&train)?;
        tables.train(id)?;
        validate_layout_change(&train.layout, tables.train_extent(id))
            .map_err(StoreError::StrandedTickets)?;
        let stored = tables
            .trains
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("train", id))?;
        stored.name = train.name;
        stored.layout = train.layout;
        stored.train_type = train.train_type;
        let updated = stored.clone();
        tables.train_view(&updated)
    }

    async fn insert_station(&self, station: NewStation) -> StoreResult<Station> {
        let mut tables = self.tables.write().await;
        let id = StationId(next(&mut tables.ids.station));
        let station = Station {
            id,
            name: station.name,
            latitude: station.latitude,
            longitude: station.longitude,
        };
        tables.stations.insert(id, station.clone());
        Ok(station)
    }

    async fn list_stations(&self, page: PageRequest) -> StoreResult<Page<Station>> {
        let tables = self.tables.read().await;
        Ok(Page::slice(tables.stations.values().cloned().collect(), page))
    }

    async fn get_station(&self, id: StationId) -> StoreResult<Station> {
        let tables = self.tables.read().await;
        tables.station(id).cloned()
    }

    async fn insert_route(&self, route: NewRoute) -> StoreResult<RouteView> {
        let mut tables = self.tables.write().await;
        if !tables.stations.contains_key(&route.source) {
            return Err(StoreError::missing("source", "station", route.source));
        }
        if !tables.stations.contains_key(&route.destination) {
            return Err(StoreError::missing(
                "destination",
                "station",
                route.destination,
            ));
        }
        let endpoints = (route.source, route.destination);
        if tables.route_endpoints.contains_key(&endpoints) {
            return Err(StoreError::unique(constraint::ROUTE_ENDPOINTS));
        }
        let id = RouteId(next(&mut tables.ids.route));
        let route = Route {
            id,
            source: route.source,
            destination: route.destination,
            distance: route.distance,
        };
        tables.route_endpoints.insert(endpoints, id);
        tables.routes.insert(id, route.clone());
        tables.route_view(&route)
    }

    async fn list_routes(
        &self,
        filter: &RouteFilter,
        page: PageRequest,
    ) -> StoreResult<Page<RouteView>> {
        let tables = self.tables.read().await;
        let mut views = Vec::new();
        for route in tables.routes.values() {
            let view = tables.route_view(route)?;
            if filter.matches(&view.source, &view.destination) {
                views.push(view);
            }
        }
        views.sort_by_key(|v| (v.route.source, v.route.id));
        Ok(Page::slice(views, page))
    }

    async fn get_route(&self, id: RouteId) -> StoreResult<RouteView> {
        let tables = self.tables.read().await;
        let route = tables
            .routes
            .get(&id)
            .ok_or_else(|| StoreError::not_found("route", id))?;
        tables.route_view(route)
    }

    async fn insert_trip(&self, trip: NewTrip) -> StoreResult<Trip> {
        let mut tables = self.tables.write().await;
        tables.check_trip_refs(&trip)?;
        let id = TripId(next(&mut tables.ids.trip));
        let trip = Trip {
            id,
            route: trip.route,
            train: trip.train,
            crew: trip.crew,
            window: trip.window,
        };
        tables.trips.insert(id, trip.clone());
        Ok(trip)
    }

    async fn get_trip(&self, id: TripId) -> StoreResult<Trip> {
        let tables = self.tables.read().await;
        tables.trip(id).cloned()
    }

    async fn trip_details(&self, id: TripId) -> StoreResult<TripDetails> {
        let tables = self.tables.read().await;
        let trip = tables.trip(id)?;
        let header = tables.trip_header(trip)?;
        let train_type = tables.train_view(&header.train)?.train_type;
        let crew = trip
            .crew
            .iter()
            .filter_map(|c| tables.crews.get(c).cloned())
            .collect();
        let mut taken_seats: Vec<(u32, u32)> = tables
            .tickets_of_trip(id)
            .map(|t| (t.cargo, t.seat))
            .collect();
        taken_seats.sort_unstable();
        Ok(TripDetails {
            header,
            train_type,
            crew,
            taken_seats,
        })
    }

    async fn list_trips(
        &self,
        filter: &TripFilter,
        page: PageRequest,
    ) -> StoreResult<Page<TripSummary>> {
        let tables = self.tables.read().await;
        let sold = tables.sold_per_trip();
        let mut summaries = Vec::new();
        for trip in tables.trips.values() {
            let header = tables.trip_header(trip)?;
            if filter.matches(&header) {
                summaries.push(TripSummary {
                    tickets_sold: sold.get(&trip.id).copied().unwrap_or(0),
                    header,
                });
            }
        }
        Ok(Page::slice(summaries, page))
    }

    async fn update_trip(&self, id: TripId, trip: NewTrip) -> StoreResult<Trip> {
        let mut tables = self.tables.write().await;
        tables.check_trip_refs(&trip)?;
        tables.trip(id)?;
        let layout = tables.train(trip.train)?.layout;
        validate_layout_change(&layout, extent(tables.tickets_of_trip(id)))
            .map_err(StoreError::StrandedTickets)?;
        let stored = tables
            .trips
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("trip", id))?;
        stored.route = trip.route;
        stored.train = trip.train;
        stored.crew = trip.crew;
        stored.window = trip.window;
        Ok(stored.clone())
    }

    async fn delete_trip(&self, id: TripId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .trips
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("trip", id))?;
        let doomed: Vec<Ticket> = tables.tickets_of_trip(id).cloned().collect();
        for ticket in &doomed {
            tables.seats.remove(&ticket.key());
            tables.tickets.remove(&ticket.id);
        }
        debug!(trip = %id, tickets = doomed.len(), "deleted trip");
        Ok(())
    }

    async fn trip_layout(&self, id: TripId) -> StoreResult<SeatLayout> {
        let tables = self.tables.read().await;
        let trip = tables.trip(id)?;
        Ok(tables.train(trip.train)?.layout)
    }

    async fn seat_taken(&self, key: SeatKey) -> StoreResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.seats.contains_key(&key))
    }

    async fn insert_order(
        &self,
        user: UserId,
        created_at: DateTime<Utc>,
        tickets: &[NewTicket],
    ) -> StoreResult<Order> {
        let mut tables = self.tables.write().await;

        // Check everything before writing anything.
        if !tables.users.contains_key(&user) {
            return Err(StoreError::missing("user", "user", user));
        }
        let mut batch = HashSet::new();
        for (index, ticket) in tickets.iter().enumerate() {
            let trip = tables
                .trips
                .get(&ticket.trip)
                .ok_or_else(|| StoreError::missing("trip", "trip", ticket.trip))?;
            let layout = tables.train(trip.train)?.layout;
            validate_ticket(i64::from(ticket.cargo), i64::from(ticket.seat), &layout)
                .map_err(|error| StoreError::SeatOutOfRange { index, error })?;
            let key = ticket.key();
            if tables.seats.contains_key(&key) || !batch.insert(key) {
                return Err(StoreError::unique(constraint::TICKET_SEAT));
            }
        }

        let order_id = OrderId(next(&mut tables.ids.order));
        tables.orders.insert(
            order_id,
            OrderRow {
                id: order_id,
                user,
                created_at,
            },
        );
        let mut stored = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let id = TicketId(next(&mut tables.ids.ticket));
            let ticket = Ticket {
                id,
                order: order_id,
                trip: ticket.trip,
                cargo: ticket.cargo,
                seat: ticket.seat,
            };
            tables.seats.insert(ticket.key(), id);
            tables.tickets.insert(id, ticket.clone());
            stored.push(ticket);
        }
        sort_tickets(&mut stored);

        Ok(Order {
            id: order_id,
            user,
            created_at,
            tickets: stored,
        })
    }

    async fn list_orders(&self, user: UserId, page: PageRequest) -> StoreResult<Page<OrderView>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&OrderRow> = tables.orders.values().filter(|o| o.user == user).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let page = Page::slice(rows, page);
        let mut views = Vec::with_capacity(page.items.len());
        for row in &page.items {
            let tickets = tables.order_tickets(row.id);
            let mut trips = Vec::new();
            for trip_id in tickets.iter().map(|t| t.trip).collect::<BTreeSet<_>>() {
                trips.push(tables.trip_header(tables.trip(trip_id)?)?);
            }
            views.push(OrderView {
                order: Order {
                    id: row.id,
                    user: row.user,
                    created_at: row.created_at,
                    tickets,
                },
                trips,
            });
        }
        Ok(Page {
            items: views,
            total: page.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CrewPosition, SeatField, TripWindow};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        store: MemoryStore,
        user: UserId,
        train: TrainId,
        trip: TripId,
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, day, hour, 0, 0).unwrap()
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let user = store
            .insert_user(
                Profile::new("user@user.com", "Test", "User").unwrap(),
                "hash".into(),
                false,
            )
            .await
            .unwrap()
            .id;
        let kyiv = store
            .insert_station(NewStation::new("Kyiv", 50.45, 30.52).unwrap())
            .await
            .unwrap();
        let lviv = store
            .insert_station(NewStation::new("Lviv", 49.84, 24.03).unwrap())
            .await
            .unwrap();
        let route = store
            .insert_route(NewRoute::new(kyiv.id, lviv.id, 540).unwrap())
            .await
            .unwrap();
        let train_type = store
            .insert_train_type(Name::parse("name", "Intercity").unwrap())
            .await
            .unwrap();
        let train = store
            .insert_train(NewTrain::new("Hyundai", 10, 20, train_type.id).unwrap())
            .await
            .unwrap();
        let trip = store
            .insert_trip(NewTrip::new(
                route.route.id,
                train.train.id,
                vec![],
                TripWindow::new(at(1, 8), at(1, 15)).unwrap(),
            ))
            .await
            .unwrap();
        Fixture {
            store,
            user,
            train: train.train.id,
            trip: trip.id,
        }
    }

    #[tokio::test]
    async fn order_inserts_all_tickets_sorted() {
        let f = fixture().await;
        let order = f
            .store
            .insert_order(
                f.user,
                at(1, 1),
                &[NewTicket::new(f.trip, 2, 1), NewTicket::new(f.trip, 1, 5)],
            )
            .await
            .unwrap();
        let seats: Vec<_> = order.tickets.iter().map(|t| (t.cargo, t.seat)).collect();
        assert_eq!(seats, vec![(1, 5), (2, 1)]);
        assert!(f.store.seat_taken(SeatKey { trip: f.trip, cargo: 1, seat: 5 }).await.unwrap());
    }

    #[tokio::test]
    async fn taken_seat_rejects_whole_order() {
        let f = fixture().await;
        f.store
            .insert_order(f.user, at(1, 1), &[NewTicket::new(f.trip, 1, 1)])
            .await
            .unwrap();

        let err = f
            .store
            .insert_order(
                f.user,
                at(1, 2),
                &[NewTicket::new(f.trip, 3, 3), NewTicket::new(f.trip, 1, 1)],
            )
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(constraint::TICKET_SEAT));
        assert!(!f.store.seat_taken(SeatKey { trip: f.trip, cargo: 3, seat: 3 }).await.unwrap());

        let orders = f.store.list_orders(f.user, PageRequest::new(1, 10)).await.unwrap();
        assert_eq!(orders.total, 1);
    }

    #[tokio::test]
    async fn duplicate_inside_one_order_rejected() {
        let f = fixture().await;
        let err = f
            .store
            .insert_order(
                f.user,
                at(1, 1),
                &[NewTicket::new(f.trip, 1, 1), NewTicket::new(f.trip, 1, 1)],
            )
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(constraint::TICKET_SEAT));
    }

    #[tokio::test]
    async fn order_for_missing_trip() {
        let f = fixture().await;
        let err = f
            .store
            .insert_order(f.user, at(1, 1), &[NewTicket::new(TripId(99), 1, 1)])
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::missing("trip", "trip", TripId(99)));
    }

    #[tokio::test]
    async fn route_endpoints_unique() {
        let f = fixture().await;
        let err = f
            .store
            .insert_route(NewRoute::new(StationId(1), StationId(2), 10).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(constraint::ROUTE_ENDPOINTS));

        // The reverse direction is a different route.
        assert!(
            f.store
                .insert_route(NewRoute::new(StationId(2), StationId(1), 10).unwrap())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn route_to_missing_station() {
        let f = fixture().await;
        let err = f
            .store
            .insert_route(NewRoute::new(StationId(1), StationId(77), 10).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::missing("destination", "station", StationId(77)));
    }

    #[tokio::test]
    async fn email_unique() {
        let f = fixture().await;
        let err = f
            .store
            .insert_user(
                Profile::new("USER@user.com", "Other", "Person").unwrap(),
                "hash".into(),
                false,
            )
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(constraint::USER_EMAIL));
    }

    #[tokio::test]
    async fn update_user_keeps_email_index() {
        let f = fixture().await;
        let profile = Profile::new("new@user.com", "New", "Name").unwrap();
        let user = f.store.update_user(f.user, profile, Some("h2".into())).await.unwrap();
        assert_eq!(user.email.as_str(), "new@user.com");

        let old = Email::parse("user@user.com").unwrap();
        assert!(f.store.find_credentials(&old).await.unwrap().is_none());
        let creds = f.store.find_credentials(&user.email).await.unwrap().unwrap();
        assert_eq!(creds.password_hash, "h2");
    }

    #[tokio::test]
    async fn trip_references_checked() {
        let f = fixture().await;
        let window = TripWindow::new(at(2, 8), at(2, 9)).unwrap();
        let err = f
            .store
            .insert_trip(NewTrip::new(RouteId(1), f.train, vec![CrewId(5)], window))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::missing("crew", "crew", CrewId(5)));
    }

    #[tokio::test]
    async fn listing_counts_sold_tickets() {
        let f = fixture().await;
        f.store
            .insert_order(
                f.user,
                at(1, 1),
                &[NewTicket::new(f.trip, 1, 1), NewTicket::new(f.trip, 1, 2)],
            )
            .await
            .unwrap();

        let page = f
            .store
            .list_trips(&TripFilter::default(), PageRequest::new(1, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].tickets_sold, 2);
        assert_eq!(page.items[0].header.source.name.as_str(), "Kyiv");
    }

    #[tokio::test]
    async fn trip_filters() {
        let f = fixture().await;
        let all = PageRequest::new(1, 10);
        let by_name = TripFilter {
            from: Some("kyi".into()),
            to: Some("LVIV".into()),
            ..TripFilter::default()
        };
        assert_eq!(f.store.list_trips(&by_name, all).await.unwrap().total, 1);

        let wrong_way = TripFilter {
            from: Some("lviv".into()),
            ..TripFilter::default()
        };
        assert_eq!(f.store.list_trips(&wrong_way, all).await.unwrap().total, 0);

        let past = TripFilter {
            departs_after: Some(at(1, 8)),
            ..TripFilter::default()
        };
        assert_eq!(f.store.list_trips(&past, all).await.unwrap().total, 0);

        let upcoming = TripFilter {
            departs_after: Some(at(1, 8) - Duration::hours(1)),
            departure_date: Some(at(1, 0).date_naive()),
            ..TripFilter::default()
        };
        assert_eq!(f.store.list_trips(&upcoming, all).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn deleting_trip_cascades_to_tickets() {
        let f = fixture().await;
        f.store
            .insert_order(f.user, at(1, 1), &[NewTicket::new(f.trip, 4, 4)])
            .await
            .unwrap();
        f.store.delete_trip(f.trip).await.unwrap();

        let key = SeatKey { trip: f.trip, cargo: 4, seat: 4 };
        assert!(!f.store.seat_taken(key).await.unwrap());
        assert_eq!(
            f.store.get_trip(f.trip).await.unwrap_err(),
            StoreError::not_found("trip", f.trip)
        );
        let orders = f.store.list_orders(f.user, PageRequest::new(1, 10)).await.unwrap();
        assert!(orders.items[0].order.tickets.is_empty());
    }

    fn train_spec(cargo_num: u32, places: u32) -> NewTrain {
        NewTrain::new("Hyundai", cargo_num, places, TrainTypeId(1)).unwrap()
    }

    #[tokio::test]
    async fn shrinking_train_keeps_sold_seats() {
        let f = fixture().await;
        f.store
            .insert_order(
                f.user,
                at(1, 1),
                &[NewTicket::new(f.trip, 7, 2), NewTicket::new(f.trip, 3, 18)],
            )
            .await
            .unwrap();

        let err = f.store.update_train(f.train, train_spec(6, 20)).await.unwrap_err();
        let StoreError::StrandedTickets(range) = err else {
            panic!("expected stranded tickets, got {err:?}");
        };
        assert!(range.violation(SeatField::Cargo).is_some());
        assert!(range.violation(SeatField::Seat).is_none());
        assert_eq!(f.store.get_train(f.train).await.unwrap().train.layout.capacity(), 200);

        let view = f.store.update_train(f.train, train_spec(7, 18)).await.unwrap();
        assert_eq!(view.train.layout.capacity(), 126);
    }

    #[tokio::test]
    async fn order_checked_against_current_layout() {
        let f = fixture().await;
        // Shrunk after a booking validated against the old layout
        f.store.update_train(f.train, train_spec(1, 1)).await.unwrap();

        let err = f
            .store
            .insert_order(
                f.user,
                at(1, 1),
                &[NewTicket::new(f.trip, 1, 1), NewTicket::new(f.trip, 2, 2)],
            )
            .await
            .unwrap_err();
        let StoreError::SeatOutOfRange { index, error } = err else {
            panic!("expected an out-of-range seat, got {err:?}");
        };
        assert_eq!(index, 1);
        assert_eq!(error.violations.len(), 2);
        let key = SeatKey { trip: f.trip, cargo: 1, seat: 1 };
        assert!(!f.store.seat_taken(key).await.unwrap());
    }

    #[tokio::test]
    async fn moving_trip_to_smaller_train_keeps_sold_seats() {
        let f = fixture().await;
        f.store
            .insert_order(f.user, at(1, 1), &[NewTicket::new(f.trip, 5, 5)])
            .await
            .unwrap();
        let small = f.store.insert_train(train_spec(2, 40)).await.unwrap().train.id;
        let trip = f.store.get_trip(f.trip).await.unwrap();

        let err = f
            .store
            .update_trip(
                f.trip,
                NewTrip::new(trip.route, small, trip.crew.clone(), trip.window),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StrandedTickets(_)), "{err:?}");
        assert_eq!(f.store.get_trip(f.trip).await.unwrap().train, f.train);
    }

    #[tokio::test]
    async fn trip_details_include_taken_seats_and_crew() {
        let f = fixture().await;
        let driver = f
            .store
            .insert_crew(NewCrew::new("Ivan", "Petrenko", CrewPosition::TrainDriver).unwrap())
            .await
            .unwrap();
        let trip = f.store.get_trip(f.trip).await.unwrap();
        f.store
            .update_trip(
                f.trip,
                NewTrip::new(trip.route, trip.train, vec![driver.id], trip.window),
            )
            .await
            .unwrap();
        f.store
            .insert_order(
                f.user,
                at(1, 1),
                &[NewTicket::new(f.trip, 2, 2), NewTicket::new(f.trip, 1, 9)],
            )
            .await
            .unwrap();

        let details = f.store.trip_details(f.trip).await.unwrap();
        assert_eq!(details.taken_seats, vec![(1, 9), (2, 2)]);
        assert_eq!(details.crew, vec![driver]);
        assert_eq!(details.train_type.name.as_str(), "Intercity");
    }

    #[tokio::test]
    async fn orders_newest_first_and_private() {
        let f = fixture().await;
        f.store
            .insert_order(f.user, at(1, 1), &[NewTicket::new(f.trip, 1, 1)])
            .await
            .unwrap();
        f.store
            .insert_order(f.user, at(1, 3), &[NewTicket::new(f.trip, 1, 2)])
            .await
            .unwrap();
        let other = f
            .store
            .insert_user(
                Profile::new("other@user.com", "Other", "User").unwrap(),
                "hash".into(),
                false,
            )
            .await
            .unwrap();

        let mine = f.store.list_orders(f.user, PageRequest::new(1, 10)).await.unwrap();
        let times: Vec<_> = mine.items.iter().map(|o| o.order.created_at).collect();
        assert_eq!(times, vec![at(1, 3), at(1, 1)]);
        assert_eq!(mine.items[0].trips.len(), 1);

        let theirs = f.store.list_orders(other.id, PageRequest::new(1, 10)).await.unwrap();
        assert_eq!(theirs.total, 0);
    }
}
