use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{
    crews, orders, routes, stations, tickets, train_types, trains, trip_crews, trips, users,
};
use crate::domain::{
    Crew, CrewId, CrewPosition, Email, Name, OrderId, Route, RouteId, SeatLayout, Station,
    StationId, Ticket, TicketId, Train, TrainId, TrainType, TrainTypeId, Trip, TripId,
    TripWindow, User, UserId,
};
use crate::store::{StoreError, StoreResult};

/// A row that no longer satisfies the domain's invariants.
pub fn corrupt(table: &str, id: i64, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("invalid {table} row {id}: {reason}"))
}

pub fn to_i32(value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Backend(format!("{value} does not fit INTEGER")))
}

fn to_u32(table: &str, id: i64, value: i32) -> StoreResult<u32> {
    u32::try_from(value).map_err(|e| corrupt(table, id, e))
}

fn name(table: &str, id: i64, field: &'static str, value: &str) -> StoreResult<Name> {
    Name::parse(field, value).map_err(|e| corrupt(table, id, e))
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_staff: bool,
}

impl UserRow {
    pub fn into_user(self) -> StoreResult<User> {
        Ok(User {
            id: UserId(self.id),
            email: Email::parse(&self.email).map_err(|e| corrupt("users", self.id, e))?,
            first_name: name("users", self.id, "first_name", &self.first_name)?,
            last_name: name("users", self.id, "last_name", &self.last_name)?,
            is_staff: self.is_staff,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_staff: bool,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crews)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CrewRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub position: String,
}

impl CrewRow {
    pub fn into_crew(self) -> StoreResult<Crew> {
        Ok(Crew {
            id: CrewId(self.id),
            first_name: name("crews", self.id, "first_name", &self.first_name)?,
            last_name: name("crews", self.id, "last_name", &self.last_name)?,
            position: self
                .position
                .parse::<CrewPosition>()
                .map_err(|e| corrupt("crews", self.id, e))?,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crews)]
pub struct NewCrewRow {
    pub first_name: String,
    pub last_name: String,
    pub position: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = train_types)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TrainTypeRow {
    pub id: i64,
    pub name: String,
}

impl TrainTypeRow {
    pub fn into_train_type(self) -> StoreResult<TrainType> {
        Ok(TrainType {
            id: TrainTypeId(self.id),
            name: name("train_types", self.id, "name", &self.name)?,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = trains)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TrainRow {
    pub id: i64,
    pub name: String,
    pub cargo_num: i32,
    pub places_in_cargo: i32,
    pub train_type_id: i64,
}

impl TrainRow {
    pub fn layout(&self) -> StoreResult<SeatLayout> {
        SeatLayout::new(
            to_u32("trains", self.id, self.cargo_num)?,
            to_u32("trains", self.id, self.places_in_cargo)?,
        )
        .map_err(|e| corrupt("trains", self.id, e))
    }

    pub fn into_train(self) -> StoreResult<Train> {
        Ok(Train {
            id: TrainId(self.id),
            layout: self.layout()?,
            name: name("trains", self.id, "name", &self.name)?,
            train_type: TrainTypeId(self.train_type_id),
        })
    }
}

#[derive(Debug, AsChangeset, Insertable)]
#[diesel(table_name = trains)]
pub struct NewTrainRow {
    pub name: String,
    pub cargo_num: i32,
    pub places_in_cargo: i32,
    pub train_type_id: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = stations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StationRow {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl StationRow {
    pub fn into_station(self) -> StoreResult<Station> {
        Ok(Station {
            id: StationId(self.id),
            name: name("stations", self.id, "name", &self.name)?,
            latitude: self.latitude,
            longitude: self.longitude,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = stations)]
pub struct NewStationRow {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = routes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RouteRow {
    pub id: i64,
    pub source_id: i64,
    pub destination_id: i64,
    pub distance: i32,
}

impl RouteRow {
    pub fn into_route(self) -> StoreResult<Route> {
        Ok(Route {
            id: RouteId(self.id),
            source: StationId(self.source_id),
            destination: StationId(self.destination_id),
            distance: to_u32("routes", self.id, self.distance)?,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = routes)]
pub struct NewRouteRow {
    pub source_id: i64,
    pub destination_id: i64,
    pub distance: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = trips)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TripRow {
    pub id: i64,
    pub route_id: i64,
    pub train_id: i64,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
}

impl TripRow {
    pub fn into_trip(self, crew: Vec<CrewId>) -> StoreResult<Trip> {
        Ok(Trip {
            id: TripId(self.id),
            route: RouteId(self.route_id),
            train: TrainId(self.train_id),
            crew,
            window: TripWindow::new(self.departure_time, self.arrival_time)
                .map_err(|e| corrupt("trips", self.id, e))?,
        })
    }
}

#[derive(Debug, AsChangeset, Insertable)]
#[diesel(table_name = trips)]
pub struct NewTripRow {
    pub route_id: i64,
    pub train_id: i64,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = trip_crews)]
pub struct TripCrewRow {
    pub trip_id: i64,
    pub crew_id: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tickets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TicketRow {
    pub id: i64,
    pub order_id: i64,
    pub trip_id: i64,
    pub cargo: i32,
    pub seat: i32,
}

impl TicketRow {
    pub fn into_ticket(self) -> StoreResult<Ticket> {
        Ok(Ticket {
            id: TicketId(self.id),
            order: OrderId(self.order_id),
            trip: TripId(self.trip_id),
            cargo: to_u32("tickets", self.id, self.cargo)?,
            seat: to_u32("tickets", self.id, self.seat)?,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tickets)]
pub struct NewTicketRow {
    pub order_id: i64,
    pub trip_id: i64,
    pub cargo: i32,
    pub seat: i32,
}
