//! Data transfer objects for web requests and responses.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PageConfig;
use crate::domain::{
    Crew, CrewId, CrewPosition, FieldError, InvalidCrewPosition, InvalidFields, NewCrew, NewRoute,
    NewStation, NewTrain, NewTrip, Order, OrderId, Profile, RouteId, Station, StationId, Ticket,
    TicketId, Train, TrainId, TrainType, TrainTypeId, Trip, TripId, TripWindow, User, UserId,
    ValidationError,
};
use crate::reservation::TicketRequest;
use crate::store::{
    OrderView, Page, PageRequest, RouteFilter, RouteView, TrainView, TripDetails, TripFilter,
    TripHeader, TripSummary,
};

use super::error::AppError;

// ---------------------------------------------------------------------------
// Input helpers
// ---------------------------------------------------------------------------

const REQUIRED: &str = "This field is required.";

/// Collects field errors while reading optional inputs.
#[derive(Debug, Default)]
struct Fields {
    errors: Vec<FieldError>,
}

impl Fields {
    fn required<T>(&mut self, field: &'static str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.errors.push(FieldError::new(field, REQUIRED));
        }
        value
    }

    fn check<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        result.map_err(|e| self.errors.push(e)).ok()
    }

    /// The collected errors; only called once at least one was recorded.
    fn into_error(self) -> InvalidFields {
        InvalidFields(self.errors)
    }

    fn finish(self) -> Result<(), InvalidFields> {
        InvalidFields::check(self.errors.into_iter().map(Some))
    }
}

/// A stored integer that must be at least `min`.
fn stored_u32(field: &'static str, value: i64, min: u32) -> Result<u32, FieldError> {
    if value < i64::from(min) {
        return Err(FieldError::new(
            field,
            format!("Ensure this value is greater than or equal to {min}."),
        ));
    }
    u32::try_from(value).map_err(|_| {
        FieldError::new(
            field,
            format!("Ensure this value is less than or equal to {}.", i32::MAX),
        )
    })
}

fn parse_position(value: &str) -> Result<CrewPosition, FieldError> {
    value
        .parse()
        .map_err(|e: InvalidCrewPosition| FieldError::new("position", e.to_string()))
}

fn date(field: &'static str, value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d").map_err(|_| {
                AppError::field(
                    field,
                    "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.",
                )
            })
        })
        .transpose()
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// `?page=` and `?page_size=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct Paging {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl Paging {
    /// Resolve against the configured sizes; `page_size` is capped.
    pub fn request(&self, config: &PageConfig) -> PageRequest {
        let size = self
            .page_size
            .filter(|&s| s > 0)
            .unwrap_or(config.default_size)
            .min(config.max_size);
        PageRequest::new(self.page.unwrap_or(1), size)
    }
}

/// A page of results.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    /// Total number of matching items
    pub count: u64,

    /// Next page number, if any
    pub next: Option<u32>,

    /// Previous page number, if any
    pub previous: Option<u32>,

    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    /// Fails with 404 for a page past the end.
    pub fn new<U>(
        page: Page<U>,
        request: PageRequest,
        f: impl FnMut(U) -> T,
    ) -> Result<Self, AppError> {
        if request.number > 1 && page.items.is_empty() {
            return Err(AppError::invalid_page());
        }
        let next = page.has_next(request).then_some(request.number + 1);
        let previous = (request.number > 1).then_some(request.number - 1);
        let count = page.total;
        Ok(Self {
            count,
            next,
            previous,
            results: page.map(f).items,
        })
    }
}

// ---------------------------------------------------------------------------
// Crews, train types, stations
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CrewRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
}

impl CrewRequest {
    pub fn validate(self) -> Result<NewCrew, AppError> {
        let mut fields = Fields::default();
        let first_name = fields.required("first_name", self.first_name);
        let last_name = fields.required("last_name", self.last_name);
        let position = fields
            .required("position", self.position)
            .and_then(|p| fields.check(parse_position(&p)));
        let (Some(first_name), Some(last_name), Some(position)) = (first_name, last_name, position)
        else {
            return Err(fields.into_error().into());
        };
        Ok(NewCrew::new(&first_name, &last_name, position)?)
    }
}

#[derive(Debug, Serialize)]
pub struct CrewResponse {
    pub id: CrewId,
    pub first_name: String,
    pub last_name: String,
    pub position: CrewPosition,
}

impl From<Crew> for CrewResponse {
    fn from(crew: Crew) -> Self {
        Self {
            id: crew.id,
            first_name: crew.first_name.into_string(),
            last_name: crew.last_name.into_string(),
            position: crew.position,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrainTypeRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrainTypeResponse {
    pub id: TrainTypeId,
    pub name: String,
}

impl From<TrainType> for TrainTypeResponse {
    fn from(t: TrainType) -> Self {
        Self {
            id: t.id,
            name: t.name.into_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StationRequest {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl StationRequest {
    pub fn validate(self) -> Result<NewStation, AppError> {
        let mut fields = Fields::default();
        let name = fields.required("name", self.name);
        let latitude = fields.required("latitude", self.latitude);
        let longitude = fields.required("longitude", self.longitude);
        let (Some(name), Some(latitude), Some(longitude)) = (name, latitude, longitude) else {
            return Err(fields.into_error().into());
        };
        Ok(NewStation::new(&name, latitude, longitude)?)
    }
}

#[derive(Debug, Serialize)]
pub struct StationResponse {
    pub id: StationId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<Station> for StationResponse {
    fn from(s: Station) -> Self {
        Self {
            id: s.id,
            name: s.name.into_string(),
            latitude: s.latitude,
            longitude: s.longitude,
        }
    }
}

// ---------------------------------------------------------------------------
// Trains
// ---------------------------------------------------------------------------

/// Train fields; all are needed to create, any subset to patch.
#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    pub name: Option<String>,
    pub cargo_num: Option<i64>,
    pub places_in_cargo: Option<i64>,
    pub train_type: Option<i64>,
}

impl TrainRequest {
    /// Validate, filling absent fields from `base` when patching.
    pub fn validate(self, base: Option<&Train>) -> Result<NewTrain, AppError> {
        let mut fields = Fields::default();
        let name = fields.required(
            "name",
            self.name
                .or_else(|| base.map(|t| t.name.as_str().to_string())),
        );
        let cargo_num = match self.cargo_num {
            Some(n) => fields.check(stored_u32("cargo_num", n, 1)),
            None => fields.required("cargo_num", base.map(|t| t.layout.cargo_num())),
        };
        let places_in_cargo = match self.places_in_cargo {
            Some(n) => fields.check(stored_u32("places_in_cargo", n, 1)),
            None => fields.required("places_in_cargo", base.map(|t| t.layout.places_in_cargo())),
        };
        let train_type = fields.required(
            "train_type",
            self.train_type
                .map(TrainTypeId)
                .or_else(|| base.map(|t| t.train_type)),
        );
        let (Some(name), Some(cargo_num), Some(places_in_cargo), Some(train_type)) =
            (name, cargo_num, places_in_cargo, train_type)
        else {
            return Err(fields.into_error().into());
        };
        fields.finish()?;
        Ok(NewTrain::new(&name, cargo_num, places_in_cargo, train_type)?)
    }
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub id: TrainId,
    pub name: String,
    pub cargo_num: u32,
    pub places_in_cargo: u32,
    pub capacity: u64,
    /// Name of the train type
    pub train_type: String,
}

impl From<TrainView> for TrainResponse {
    fn from(view: TrainView) -> Self {
        train_response(view.train, &view.train_type)
    }
}

fn train_response(train: Train, train_type: &TrainType) -> TrainResponse {
    TrainResponse {
        id: train.id,
        cargo_num: train.layout.cargo_num(),
        places_in_cargo: train.layout.places_in_cargo(),
        capacity: train.capacity(),
        name: train.name.into_string(),
        train_type: train_type.name.as_str().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub source: Option<i64>,
    pub destination: Option<i64>,
    pub distance: Option<i64>,
}

impl RouteRequest {
    pub fn validate(self) -> Result<NewRoute, AppError> {
        let mut fields = Fields::default();
        let source = fields.required("source", self.source);
        let destination = fields.required("destination", self.destination);
        let distance = fields
            .required("distance", self.distance)
            .and_then(|d| fields.check(stored_u32("distance", d, 0)));
        let (Some(source), Some(destination), Some(distance)) = (source, destination, distance)
        else {
            return Err(fields.into_error().into());
        };
        Ok(NewRoute::new(StationId(source), StationId(destination), distance)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    pub source: Option<String>,
    pub destination: Option<String>,
}

impl RouteQuery {
    pub fn filter(self) -> RouteFilter {
        RouteFilter {
            source: self.source.filter(|s| !s.is_empty()),
            destination: self.destination.filter(|s| !s.is_empty()),
        }
    }
}

/// A route as created, with station ids.
#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub id: RouteId,
    pub source: StationId,
    pub destination: StationId,
    pub distance: u32,
}

impl From<RouteView> for RouteResponse {
    fn from(view: RouteView) -> Self {
        Self {
            id: view.route.id,
            source: view.route.source,
            destination: view.route.destination,
            distance: view.route.distance,
        }
    }
}

/// A listed route, with station names.
#[derive(Debug, Serialize)]
pub struct RouteListItem {
    pub id: RouteId,
    pub source: String,
    pub destination: String,
    pub distance: u32,
}

impl From<RouteView> for RouteListItem {
    fn from(view: RouteView) -> Self {
        Self {
            id: view.route.id,
            source: view.source.name.into_string(),
            destination: view.destination.name.into_string(),
            distance: view.route.distance,
        }
    }
}

/// A route with its stations in full.
#[derive(Debug, Serialize)]
pub struct RouteDetail {
    pub id: RouteId,
    pub source: StationResponse,
    pub destination: StationResponse,
    pub distance: u32,
}

impl From<RouteView> for RouteDetail {
    fn from(view: RouteView) -> Self {
        Self {
            id: view.route.id,
            source: view.source.into(),
            destination: view.destination.into(),
            distance: view.route.distance,
        }
    }
}

// ---------------------------------------------------------------------------
// Trips
// ---------------------------------------------------------------------------

/// Trip fields; all but `crew` are needed to create, any subset to patch.
#[derive(Debug, Deserialize)]
pub struct TripRequest {
    pub route: Option<i64>,
    pub train: Option<i64>,
    pub crew: Option<Vec<i64>>,
    pub departure_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
}

impl TripRequest {
    /// Validate, filling absent fields from `base` when patching.
    pub fn validate(self, base: Option<&Trip>) -> Result<NewTrip, AppError> {
        let mut fields = Fields::default();
        let route = fields.required(
            "route",
            self.route.map(RouteId).or_else(|| base.map(|t| t.route)),
        );
        let train = fields.required(
            "train",
            self.train.map(TrainId).or_else(|| base.map(|t| t.train)),
        );
        let crew = match self.crew {
            Some(ids) => ids.into_iter().map(CrewId).collect(),
            None => base.map(|t| t.crew.clone()).unwrap_or_default(),
        };
        let departure = fields.required(
            "departure_time",
            self.departure_time
                .or_else(|| base.map(|t| t.window.departure())),
        );
        let arrival = fields.required(
            "arrival_time",
            self.arrival_time
                .or_else(|| base.map(|t| t.window.arrival())),
        );
        let (Some(route), Some(train), Some(departure), Some(arrival)) =
            (route, train, departure, arrival)
        else {
            return Err(fields.into_error().into());
        };
        let window = TripWindow::new(departure, arrival).map_err(ValidationError::from)?;
        Ok(NewTrip::new(route, train, crew, window))
    }
}

#[derive(Debug, Deserialize)]
pub struct TripQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub departure_date: Option<String>,
    pub arrival_date: Option<String>,
}

impl TripQuery {
    /// Listing filter for trips departing after `now`.
    pub fn filter(self, now: DateTime<Utc>) -> Result<TripFilter, AppError> {
        Ok(TripFilter {
            departure_date: date("departure_date", self.departure_date.as_deref())?,
            arrival_date: date("arrival_date", self.arrival_date.as_deref())?,
            from: self.from.filter(|s| !s.is_empty()),
            to: self.to.filter(|s| !s.is_empty()),
            departs_after: Some(now),
        })
    }
}

/// A trip as created or updated, with ids.
#[derive(Debug, Serialize)]
pub struct TripResponse {
    pub id: TripId,
    pub route: RouteId,
    pub train: TrainId,
    pub crew: Vec<CrewId>,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
}

impl From<Trip> for TripResponse {
    fn from(trip: Trip) -> Self {
        Self {
            id: trip.id,
            route: trip.route,
            train: trip.train,
            crew: trip.crew,
            departure_time: trip.window.departure(),
            arrival_time: trip.window.arrival(),
        }
    }
}

/// A listed trip with its remaining seats.
#[derive(Debug, Serialize)]
pub struct TripListItem {
    pub id: TripId,
    pub source: String,
    pub destination: String,
    pub train_name: String,
    pub train_capacity: u64,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub tickets_available: u64,
}

impl TripListItem {
    pub fn new(summary: TripSummary, tickets_available: u64) -> Self {
        let TripHeader {
            trip,
            source,
            destination,
            train,
            ..
        } = summary.header;
        Self {
            id: trip.id,
            source: source.name.into_string(),
            destination: destination.name.into_string(),
            train_capacity: train.capacity(),
            train_name: train.name.into_string(),
            departure_time: trip.window.departure(),
            arrival_time: trip.window.arrival(),
            tickets_available,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeatResponse {
    pub cargo: u32,
    pub seat: u32,
}

/// A trip with its route, train, crew and sold seats.
#[derive(Debug, Serialize)]
pub struct TripDetail {
    pub id: TripId,
    pub route: RouteDetail,
    pub train: TrainResponse,
    /// Full names of the crew
    pub crew: Vec<String>,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub taken_seats: Vec<SeatResponse>,
}

impl From<TripDetails> for TripDetail {
    fn from(details: TripDetails) -> Self {
        let TripHeader {
            trip,
            route,
            source,
            destination,
            train,
        } = details.header;
        Self {
            id: trip.id,
            route: RouteView {
                route,
                source,
                destination,
            }
            .into(),
            train: train_response(train, &details.train_type),
            crew: details.crew.iter().map(Crew::full_name).collect(),
            departure_time: trip.window.departure(),
            arrival_time: trip.window.arrival(),
            taken_seats: details
                .taken_seats
                .into_iter()
                .map(|(cargo, seat)| SeatResponse { cargo, seat })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TicketInput {
    pub trip: i64,
    pub cargo: i64,
    pub seat: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub tickets: Option<Vec<TicketInput>>,
}

impl OrderRequest {
    pub fn tickets(self) -> Result<Vec<TicketRequest>, AppError> {
        let tickets = self.tickets.ok_or_else(|| AppError::field("tickets", REQUIRED))?;
        Ok(tickets
            .into_iter()
            .map(|t| TicketRequest {
                trip: TripId(t.trip),
                cargo: t.cargo,
                seat: t.seat,
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub id: TicketId,
    pub cargo: u32,
    pub seat: u32,
    pub trip: TripId,
}

impl From<&Ticket> for TicketResponse {
    fn from(t: &Ticket) -> Self {
        Self {
            id: t.id,
            cargo: t.cargo,
            seat: t.seat,
            trip: t.trip,
        }
    }
}

/// A placed order.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub tickets: Vec<TicketResponse>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            created_at: order.created_at,
            tickets: order.tickets.iter().map(TicketResponse::from).collect(),
        }
    }
}

/// Short description of the trip a listed ticket is for.
#[derive(Debug, Serialize)]
pub struct TicketTrip {
    pub id: TripId,
    pub source: String,
    pub destination: String,
    pub train_name: String,
    pub departure_time: DateTime<Utc>,
}

impl From<&TripHeader> for TicketTrip {
    fn from(h: &TripHeader) -> Self {
        Self {
            id: h.trip.id,
            source: h.source.name.as_str().to_string(),
            destination: h.destination.name.as_str().to_string(),
            train_name: h.train.name.as_str().to_string(),
            departure_time: h.trip.window.departure(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketListItem {
    pub id: TicketId,
    pub cargo: u32,
    pub seat: u32,
    pub trip: Option<TicketTrip>,
}

#[derive(Debug, Serialize)]
pub struct OrderListItem {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub tickets: Vec<TicketListItem>,
}

impl From<OrderView> for OrderListItem {
    fn from(view: OrderView) -> Self {
        let tickets = view
            .order
            .tickets
            .iter()
            .map(|t| TicketListItem {
                id: t.id,
                cargo: t.cargo,
                seat: t.seat,
                trip: view.trip(t.trip).map(TicketTrip::from),
            })
            .collect();
        Self {
            id: view.order.id,
            created_at: view.order.created_at,
            tickets,
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Registration or profile update. The password is write-only.
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserRequest {
    /// Validate the profile, filling absent fields from `base` when
    /// patching. The password is returned as given, unvalidated.
    pub fn validate(self, base: Option<&User>) -> Result<(Profile, Option<String>), AppError> {
        let mut fields = Fields::default();
        let email = fields.required(
            "email",
            self.email
                .or_else(|| base.map(|u| u.email.as_str().to_string())),
        );
        let first_name = fields.required(
            "first_name",
            self.first_name
                .or_else(|| base.map(|u| u.first_name.as_str().to_string())),
        );
        let last_name = fields.required(
            "last_name",
            self.last_name
                .or_else(|| base.map(|u| u.last_name.as_str().to_string())),
        );
        let (Some(email), Some(first_name), Some(last_name)) = (email, first_name, last_name)
        else {
            return Err(fields.into_error().into());
        };
        let profile = Profile::new(&email, &first_name, &last_name)?;
        Ok((profile, self.password))
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email.as_str().to_string(),
            first_name: u.first_name.into_string(),
            last_name: u.last_name.into_string(),
            is_staff: u.is_staff,
        }
    }
}
