//! PostgreSQL store using Diesel.
//!
//! Blocking diesel calls run on tokio's blocking pool with connections from
//! an r2d2 pool. Pending migrations are applied when the store connects.
//! Uniqueness is enforced by the schema's `UNIQUE` constraints; violations
//! surface as [`StoreError::UniqueViolation`] carrying the constraint name.

mod models;
mod schema;

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::dsl::{count_star, exists, max};
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::DatabaseErrorKind;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tokio::task;
use tracing::{error, info};

use super::{
    Credentials, OrderView, Page, PageRequest, RouteFilter, RouteView, Store, StoreError,
    StoreResult, TrainView, TripDetails, TripFilter, TripHeader, TripSummary,
};
use crate::domain::{
    Crew, CrewId, Email, Name, NewCrew, NewRoute, NewStation, NewTicket, NewTrain, NewTrip, Order,
    OrderId, Profile, RouteId, SeatKey, SeatLayout, Station, StationId, Ticket, Train, TrainId,
    TrainType, Trip, TripId, User, UserId, sort_tickets,
};
use crate::reservation::{validate_layout_change, validate_ticket};
use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Connection settings for [`PostgresStore`].
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    /// Maximum number of pooled connections
    pub max_pool_size: u32,
    pub connection_timeout: Duration,
}

impl PostgresConfig {
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_pool_size: 10,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(e: diesel::result::Error) -> Self {
        match &e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                match info.constraint_name() {
                    Some(constraint) => StoreError::unique(constraint),
                    None => {
                        error!(error = %e, "unique violation without constraint name");
                        StoreError::Backend(e.to_string())
                    }
                }
            }
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

fn pool_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("connection pool: {e}"))
}

/// `LIKE` pattern matching `needle` anywhere, with wildcards escaped.
fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// `[start, end)` of a UTC calendar day.
fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + chrono::Duration::days(1))
}

fn limits(page: PageRequest) -> (i64, i64) {
    (
        i64::from(page.size),
        i64::try_from(page.offset()).unwrap_or(i64::MAX),
    )
}

fn total(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

fn seat_pair((cargo, seat): (i32, i32)) -> StoreResult<(u32, u32)> {
    let to_u32 =
        |v: i32| u32::try_from(v).map_err(|_| StoreError::Backend(format!("negative seat {v}")));
    Ok((to_u32(cargo)?, to_u32(seat)?))
}

fn extent(row: (Option<i32>, Option<i32>)) -> StoreResult<Option<(u32, u32)>> {
    match row {
        (Some(cargo), Some(seat)) => seat_pair((cargo, seat)).map(Some),
        _ => Ok(None),
    }
}

/// Highest cargo and seat sold on any trip of `train`.
fn train_extent(conn: &mut PgConnection, train: i64) -> StoreResult<Option<(u32, u32)>> {
    let row = tickets::table
        .inner_join(trips::table)
        .filter(trips::train_id.eq(train))
        .select((max(tickets::cargo), max(tickets::seat)))
        .first::<(Option<i32>, Option<i32>)>(conn)?;
    extent(row)
}

fn trip_extent(conn: &mut PgConnection, trip: i64) -> StoreResult<Option<(u32, u32)>> {
    let row = tickets::table
        .filter(tickets::trip_id.eq(trip))
        .select((max(tickets::cargo), max(tickets::seat)))
        .first::<(Option<i32>, Option<i32>)>(conn)?;
    extent(row)
}

fn station_ids<'a>(rows: impl IntoIterator<Item = &'a RouteRow>) -> Vec<i64> {
    rows.into_iter()
        .flat_map(|r| [r.source_id, r.destination_id])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn load_stations(conn: &mut PgConnection, ids: &[i64]) -> StoreResult<HashMap<i64, Station>> {
    stations::table
        .filter(stations::id.eq_any(ids))
        .select(StationRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|row| Ok((row.id, row.into_station()?)))
        .collect()
}

fn route_views(conn: &mut PgConnection, rows: Vec<RouteRow>) -> StoreResult<Vec<RouteView>> {
    let by_id = load_stations(conn, &station_ids(&rows))?;
    let station = |id: i64| {
        by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("station", id))
    };
    rows.into_iter()
        .map(|row| {
            let source = station(row.source_id)?;
            let destination = station(row.destination_id)?;
            Ok(RouteView {
                route: row.into_route()?,
                source,
                destination,
            })
        })
        .collect()
}

fn train_views(conn: &mut PgConnection, rows: Vec<TrainRow>) -> StoreResult<Vec<TrainView>> {
    let type_ids: Vec<i64> = rows.iter().map(|r| r.train_type_id).collect();
    let types: HashMap<i64, TrainType> = train_types::table
        .filter(train_types::id.eq_any(&type_ids))
        .select(TrainTypeRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|row| Ok((row.id, row.into_train_type()?)))
        .collect::<StoreResult<_>>()?;
    rows.into_iter()
        .map(|row| {
            let train_type = types
                .get(&row.train_type_id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("train type", row.train_type_id))?;
            Ok(TrainView {
                train: row.into_train()?,
                train_type,
            })
        })
        .collect()
}

fn crew_ids(conn: &mut PgConnection, trip_ids: &[i64]) -> StoreResult<HashMap<i64, Vec<CrewId>>> {
    let pairs: Vec<(i64, i64)> = trip_crews::table
        .filter(trip_crews::trip_id.eq_any(trip_ids))
        .order((trip_crews::trip_id, trip_crews::crew_id))
        .select((trip_crews::trip_id, trip_crews::crew_id))
        .load(conn)?;
    let mut crew: HashMap<i64, Vec<CrewId>> = HashMap::new();
    for (trip, member) in pairs {
        crew.entry(trip).or_default().push(CrewId(member));
    }
    Ok(crew)
}

fn trips_with_crew(conn: &mut PgConnection, rows: Vec<TripRow>) -> StoreResult<Vec<Trip>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut crew = crew_ids(conn, &ids)?;
    rows.into_iter()
        .map(|row| {
            let members = crew.remove(&row.id).unwrap_or_default();
            row.into_trip(members)
        })
        .collect()
}

fn trip_headers(conn: &mut PgConnection, rows: Vec<TripRow>) -> StoreResult<Vec<TripHeader>> {
    let route_ids: Vec<i64> = rows.iter().map(|r| r.route_id).collect();
    let train_ids: Vec<i64> = rows.iter().map(|r| r.train_id).collect();

    let route_rows: Vec<RouteRow> = routes::table
        .filter(routes::id.eq_any(&route_ids))
        .select(RouteRow::as_select())
        .load(conn)?;
    let route_map: HashMap<RouteId, RouteView> = route_views(conn, route_rows)?
        .into_iter()
        .map(|v| (v.route.id, v))
        .collect();
    let train_map: HashMap<TrainId, Train> = trains::table
        .filter(trains::id.eq_any(&train_ids))
        .select(TrainRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|row| Ok((TrainId(row.id), row.into_train()?)))
        .collect::<StoreResult<_>>()?;

    trips_with_crew(conn, rows)?
        .into_iter()
        .map(|trip| {
            let view = route_map
                .get(&trip.route)
                .cloned()
                .ok_or_else(|| StoreError::not_found("route", trip.route))?;
            let train = train_map
                .get(&trip.train)
                .cloned()
                .ok_or_else(|| StoreError::not_found("train", trip.train))?;
            Ok(TripHeader {
                trip,
                route: view.route,
                source: view.source,
                destination: view.destination,
                train,
            })
        })
        .collect()
}

fn filtered_routes<'a>(filter: &RouteFilter) -> routes::BoxedQuery<'a, Pg> {
    let mut query = routes::table.into_boxed();
    if let Some(q) = &filter.source {
        query = query.filter(
            routes::source_id.eq_any(
                stations::table
                    .select(stations::id)
                    .filter(stations::name.ilike(contains_pattern(q))),
            ),
        );
    }
    if let Some(q) = &filter.destination {
        query = query.filter(
            routes::destination_id.eq_any(
                stations::table
                    .select(stations::id)
                    .filter(stations::name.ilike(contains_pattern(q))),
            ),
        );
    }
    query
}

fn filtered_trips<'a>(filter: &TripFilter) -> trips::BoxedQuery<'a, Pg> {
    let mut query = trips::table.into_boxed();
    if let Some(q) = &filter.from {
        query = query.filter(
            trips::route_id.eq_any(
                routes::table.select(routes::id).filter(
                    routes::source_id.eq_any(
                        stations::table
                            .select(stations::id)
                            .filter(stations::name.ilike(contains_pattern(q))),
                    ),
                ),
            ),
        );
    }
    if let Some(q) = &filter.to {
        query = query.filter(
            trips::route_id.eq_any(
                routes::table.select(routes::id).filter(
                    routes::destination_id.eq_any(
                        stations::table
                            .select(stations::id)
                            .filter(stations::name.ilike(contains_pattern(q))),
                    ),
                ),
            ),
        );
    }
    if let Some(date) = filter.departure_date {
        let (start, end) = day_bounds(date);
        query = query.filter(trips::departure_time.ge(start).and(trips::departure_time.lt(end)));
    }
    if let Some(date) = filter.arrival_date {
        let (start, end) = day_bounds(date);
        query = query.filter(trips::arrival_time.ge(start).and(trips::arrival_time.lt(end)));
    }
    if let Some(after) = filter.departs_after {
        query = query.filter(trips::departure_time.gt(after));
    }
    query
}

fn check_exists(
    found: Option<i64>,
    field: &'static str,
    entity: &'static str,
    id: i64,
) -> StoreResult<()> {
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::missing(field, entity, id)),
    }
}

fn check_trip_refs(conn: &mut PgConnection, trip: &NewTrip) -> StoreResult<()> {
    let route = routes::table
        .find(trip.route.get())
        .select(routes::id)
        .first::<i64>(conn)
        .optional()?;
    check_exists(route, "route", "route", trip.route.get())?;
    let train = trains::table
        .find(trip.train.get())
        .select(trains::id)
        .first::<i64>(conn)
        .optional()?;
    check_exists(train, "train", "train", trip.train.get())?;

    let wanted: Vec<i64> = trip.crew.iter().map(|c| c.get()).collect();
    let found: Vec<i64> = crews::table
        .filter(crews::id.eq_any(&wanted))
        .select(crews::id)
        .load(conn)?;
    if let Some(missing) = wanted.iter().find(|id| !found.contains(id)) {
        return Err(StoreError::missing("crew", "crew", *missing));
    }
    Ok(())
}

fn replace_crew(conn: &mut PgConnection, trip_id: i64, crew: &[CrewId]) -> StoreResult<()> {
    diesel::delete(trip_crews::table.filter(trip_crews::trip_id.eq(trip_id))).execute(conn)?;
    if crew.is_empty() {
        return Ok(());
    }
    let rows: Vec<TripCrewRow> = crew
        .iter()
        .map(|c| TripCrewRow {
            trip_id,
            crew_id: c.get(),
        })
        .collect();
    diesel::insert_into(trip_crews::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

fn trip_row(trip: &NewTrip) -> NewTripRow {
    NewTripRow {
        route_id: trip.route.get(),
        train_id: trip.train.get(),
        departure_time: trip.window.departure(),
        arrival_time: trip.window.arrival(),
    }
}

fn train_row(train: &NewTrain) -> StoreResult<NewTrainRow> {
    Ok(NewTrainRow {
        name: train.name.as_str().to_owned(),
        cargo_num: to_i32(train.layout.cargo_num())?,
        places_in_cargo: to_i32(train.layout.places_in_cargo())?,
        train_type_id: train.train_type.get(),
    })
}

fn check_train_type(conn: &mut PgConnection, train: &NewTrain) -> StoreResult<()> {
    let id = train.train_type.get();
    let found = train_types::table
        .find(id)
        .select(train_types::id)
        .first::<i64>(conn)
        .optional()?;
    check_exists(found, "train_type", "train type", id)
}

fn single<T>(mut items: Vec<T>, entity: &'static str, id: i64) -> StoreResult<T> {
    items.pop().ok_or_else(|| StoreError::not_found(entity, id))
}

/// A [`Store`] backed by PostgreSQL.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Build the connection pool and apply pending migrations.
    pub async fn connect(config: PostgresConfig) -> StoreResult<Self> {
        task::spawn_blocking(move || {
            let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
            let pool = Pool::builder()
                .max_size(config.max_pool_size)
                .connection_timeout(config.connection_timeout)
                .test_on_check_out(true)
                .build(manager)
                .map_err(pool_error)?;

            let mut conn = pool.get().map_err(pool_error)?;
            let applied = conn
                .run_pending_migrations(MIGRATIONS)
                .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
            info!(
                migrations = applied.len(),
                max_pool_size = config.max_pool_size,
                "connected to PostgreSQL"
            );
            Ok(Self { pool })
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {e}")))?
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(pool_error)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {e}")))?
    }

    /// Runs `f` in a read-only snapshot so related reads agree.
    async fn with_snapshot<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
    {
        self.with_conn(move |conn| {
            conn.build_transaction()
                .repeatable_read()
                .read_only()
                .run(f)
        })
        .await
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn ping(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn insert_user(
        &self,
        profile: Profile,
        password_hash: String,
        is_staff: bool,
    ) -> StoreResult<User> {
        let row = NewUserRow {
            email: profile.email.as_str().to_owned(),
            first_name: profile.first_name.into_string(),
            last_name: profile.last_name.into_string(),
            password_hash,
            is_staff,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(users::table)
                .values(&row)
                .returning(UserRow::as_returning())
                .get_result(conn)?
                .into_user()
        })
        .await
    }

    async fn find_credentials(&self, email: &Email) -> StoreResult<Option<Credentials>> {
        let email = email.as_str().to_owned();
        self.with_conn(move |conn| {
            let row = users::table
                .filter(users::email.eq(&email))
                .select(UserRow::as_select())
                .first(conn)
                .optional()?;
            row.map(|row| {
                let password_hash = row.password_hash.clone();
                Ok(Credentials {
                    user: row.into_user()?,
                    password_hash,
                })
            })
            .transpose()
        })
        .await
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        self.with_conn(move |conn| {
            users::table
                .find(id.get())
                .select(UserRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("user", id))?
                .into_user()
        })
        .await
    }

    async fn update_user(
        &self,
        id: UserId,
        profile: Profile,
        password_hash: Option<String>,
    ) -> StoreResult<User> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let row = diesel::update(users::table.find(id.get()))
                    .set((
                        users::email.eq(profile.email.as_str()),
                        users::first_name.eq(profile.first_name.as_str()),
                        users::last_name.eq(profile.last_name.as_str()),
                    ))
                    .returning(UserRow::as_returning())
                    .get_result(conn)
                    .optional()?
                    .ok_or_else(|| StoreError::not_found("user", id))?;
                if let Some(hash) = &password_hash {
                    diesel::update(users::table.find(id.get()))
                        .set(users::password_hash.eq(hash))
                        .execute(conn)?;
                }
                row.into_user()
            })
        })
        .await
    }

    async fn insert_crew(&self, crew: NewCrew) -> StoreResult<Crew> {
        let row = NewCrewRow {
            first_name: crew.first_name.into_string(),
            last_name: crew.last_name.into_string(),
            position: crew.position.as_str().to_owned(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(crews::table)
                .values(&row)
                .returning(CrewRow::as_returning())
                .get_result(conn)?
                .into_crew()
        })
        .await
    }

    async fn list_crews(&self, page: PageRequest) -> StoreResult<Page<Crew>> {
        let (limit, offset) = limits(page);
        self.with_snapshot(move |conn| {
            let count: i64 = crews::table.count().get_result(conn)?;
            let items = crews::table
                .order(crews::id)
                .limit(limit)
                .offset(offset)
                .select(CrewRow::as_select())
                .load(conn)?
                .into_iter()
                .map(CrewRow::into_crew)
                .collect::<StoreResult<_>>()?;
            Ok(Page {
                items,
                total: total(count),
            })
        })
        .await
    }

    async fn insert_train_type(&self, name: Name) -> StoreResult<TrainType> {
        let name = name.into_string();
        self.with_conn(move |conn| {
            diesel::insert_into(train_types::table)
                .values(train_types::name.eq(&name))
                .returning(TrainTypeRow::as_returning())
                .get_result(conn)?
                .into_train_type()
        })
        .await
    }

    async fn list_train_types(&self, page: PageRequest) -> StoreResult<Page<TrainType>> {
        let (limit, offset) = limits(page);
        self.with_snapshot(move |conn| {
            let count: i64 = train_types::table.count().get_result(conn)?;
            let items = train_types::table
                .order(train_types::id)
                .limit(limit)
                .offset(offset)
                .select(TrainTypeRow::as_select())
                .load(conn)?
                .into_iter()
                .map(TrainTypeRow::into_train_type)
                .collect::<StoreResult<_>>()?;
            Ok(Page {
                items,
                total: total(count),
            })
        })
        .await
    }

    async fn insert_train(&self, train: NewTrain) -> StoreResult<TrainView> {
        let row = train_row(&train)?;
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                check_train_type(conn, &train)?;
                let stored: TrainRow = diesel::insert_into(trains::table)
                    .values(&row)
                    .returning(TrainRow::as_returning())
                    .get_result(conn)?;
                let id = stored.id;
                single(train_views(conn, vec![stored])?, "train", id)
            })
        })
        .await
    }

    async fn list_trains(&self, page: PageRequest) -> StoreResult<Page<TrainView>> {
        let (limit, offset) = limits(page);
        self.with_snapshot(move |conn| {
            let count: i64 = trains::table.count().get_result(conn)?;
            let rows = trains::table
                .order(trains::id)
                .limit(limit)
                .offset(offset)
                .select(TrainRow::as_select())
                .load(conn)?;
            Ok(Page {
                items: train_views(conn, rows)?,
                total: total(count),
            })
        })
        .await
    }

    async fn get_train(&self, id: TrainId) -> StoreResult<TrainView> {
        self.with_snapshot(move |conn| {
            let rows = trains::table
                .find(id.get())
                .select(TrainRow::as_select())
                .load(conn)?;
            single(train_views(conn, rows)?, "train", id.get())
        })
        .await
    }

    async fn update_train(&self, id: TrainId, train: NewTrain) -> StoreResult<TrainView> {
        let row = train_row(&train)?;
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                check_train_type(conn, &train)?;
                // Blocks orders on this train's trips until the layout commits.
                trains::table
                    .find(id.get())
                    .select(trains::id)
                    .for_update()
                    .first::<i64>(conn)
                    .optional()?
                    .ok_or_else(|| StoreError::not_found("train", id))?;
                validate_layout_change(&train.layout, train_extent(conn, id.get())?)
                    .map_err(StoreError::StrandedTickets)?;
                let rows = diesel::update(trains::table.find(id.get()))
                    .set(&row)
                    .returning(TrainRow::as_returning())
                    .get_results(conn)?;
                single(train_views(conn, rows)?, "train", id.get())
            })
        })
        .await
    }

    async fn insert_station(&self, station: NewStation) -> StoreResult<Station> {
        let row = NewStationRow {
            name: station.name.into_string(),
            latitude: station.latitude,
            longitude: station.longitude,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(stations::table)
                .values(&row)
                .returning(StationRow::as_returning())
                .get_result(conn)?
                .into_station()
        })
        .await
    }

    async fn list_stations(&self, page: PageRequest) -> StoreResult<Page<Station>> {
        let (limit, offset) = limits(page);
        self.with_snapshot(move |conn| {
            let count: i64 = stations::table.count().get_result(conn)?;
            let items = stations::table
                .order(stations::id)
                .limit(limit)
                .offset(offset)
                .select(StationRow::as_select())
                .load(conn)?
                .into_iter()
                .map(StationRow::into_station)
                .collect::<StoreResult<_>>()?;
            Ok(Page {
                items,
                total: total(count),
            })
        })
        .await
    }

    async fn get_station(&self, id: StationId) -> StoreResult<Station> {
        self.with_conn(move |conn| {
            stations::table
                .find(id.get())
                .select(StationRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("station", id))?
                .into_station()
        })
        .await
    }

    async fn insert_route(&self, route: NewRoute) -> StoreResult<RouteView> {
        let row = NewRouteRow {
            source_id: route.source.get(),
            destination_id: route.destination.get(),
            distance: to_i32(route.distance)?,
        };
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let found: Vec<i64> = stations::table
                    .filter(stations::id.eq_any([row.source_id, row.destination_id]))
                    .select(stations::id)
                    .load(conn)?;
                for (field, id) in [("source", row.source_id), ("destination", row.destination_id)]
                {
                    if !found.contains(&id) {
                        return Err(StoreError::missing(field, "station", id));
                    }
                }
                let stored: RouteRow = diesel::insert_into(routes::table)
                    .values(&row)
                    .returning(RouteRow::as_returning())
                    .get_result(conn)?;
                let id = stored.id;
                single(route_views(conn, vec![stored])?, "route", id)
            })
        })
        .await
    }

    async fn list_routes(
        &self,
        filter: &RouteFilter,
        page: PageRequest,
    ) -> StoreResult<Page<RouteView>> {
        let filter = filter.clone();
        let (limit, offset) = limits(page);
        self.with_snapshot(move |conn| {
            let count: i64 = filtered_routes(&filter).count().get_result(conn)?;
            let rows = filtered_routes(&filter)
                .order((routes::source_id, routes::id))
                .limit(limit)
                .offset(offset)
                .select(RouteRow::as_select())
                .load(conn)?;
            Ok(Page {
                items: route_views(conn, rows)?,
                total: total(count),
            })
        })
        .await
    }

    async fn get_route(&self, id: RouteId) -> StoreResult<RouteView> {
        self.with_snapshot(move |conn| {
            let rows = routes::table
                .find(id.get())
                .select(RouteRow::as_select())
                .load(conn)?;
            single(route_views(conn, rows)?, "route", id.get())
        })
        .await
    }

    async fn insert_trip(&self, trip: NewTrip) -> StoreResult<Trip> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                check_trip_refs(conn, &trip)?;
                let stored: TripRow = diesel::insert_into(trips::table)
                    .values(&trip_row(&trip))
                    .returning(TripRow::as_returning())
                    .get_result(conn)?;
                replace_crew(conn, stored.id, &trip.crew)?;
                stored.into_trip(trip.crew.clone())
            })
        })
        .await
    }

    async fn get_trip(&self, id: TripId) -> StoreResult<Trip> {
        self.with_snapshot(move |conn| {
            let rows = trips::table
                .find(id.get())
                .select(TripRow::as_select())
                .load(conn)?;
            single(trips_with_crew(conn, rows)?, "trip", id.get())
        })
        .await
    }

    async fn trip_details(&self, id: TripId) -> StoreResult<TripDetails> {
        self.with_snapshot(move |conn| {
            let rows = trips::table
                .find(id.get())
                .select(TripRow::as_select())
                .load(conn)?;
            let header = single(trip_headers(conn, rows)?, "trip", id.get())?;

            let train_type = train_types::table
                .find(header.train.train_type.get())
                .select(TrainTypeRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("train type", header.train.train_type))?
                .into_train_type()?;
            let crew_ids: Vec<i64> = header.trip.crew.iter().map(|c| c.get()).collect();
            let crew = crews::table
                .filter(crews::id.eq_any(&crew_ids))
                .order(crews::id)
                .select(CrewRow::as_select())
                .load(conn)?
                .into_iter()
                .map(CrewRow::into_crew)
                .collect::<StoreResult<Vec<_>>>()?;
            let taken_seats = tickets::table
                .filter(tickets::trip_id.eq(id.get()))
                .order((tickets::cargo, tickets::seat))
                .select((tickets::cargo, tickets::seat))
                .load::<(i32, i32)>(conn)?
                .into_iter()
                .map(seat_pair)
                .collect::<StoreResult<Vec<_>>>()?;

            Ok(TripDetails {
                header,
                train_type,
                crew,
                taken_seats,
            })
        })
        .await
    }

    async fn list_trips(
        &self,
        filter: &TripFilter,
        page: PageRequest,
    ) -> StoreResult<Page<TripSummary>> {
        let filter = filter.clone();
        let (limit, offset) = limits(page);
        self.with_snapshot(move |conn| {
            let count: i64 = filtered_trips(&filter).count().get_result(conn)?;
            let rows = filtered_trips(&filter)
                .order(trips::id)
                .limit(limit)
                .offset(offset)
                .select(TripRow::as_select())
                .load(conn)?;
            let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
            let sold: HashMap<i64, i64> = tickets::table
                .filter(tickets::trip_id.eq_any(&ids))
                .group_by(tickets::trip_id)
                .select((tickets::trip_id, count_star()))
                .load::<(i64, i64)>(conn)?
                .into_iter()
                .collect();
            let items = trip_headers(conn, rows)?
                .into_iter()
                .map(|header| TripSummary {
                    tickets_sold: total(sold.get(&header.trip.id.get()).copied().unwrap_or(0)),
                    header,
                })
                .collect();
            Ok(Page {
                items,
                total: total(count),
            })
        })
        .await
    }

    async fn update_trip(&self, id: TripId, trip: NewTrip) -> StoreResult<Trip> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                check_trip_refs(conn, &trip)?;
                trips::table
                    .find(id.get())
                    .select(trips::id)
                    .for_update()
                    .first::<i64>(conn)
                    .optional()?
                    .ok_or_else(|| StoreError::not_found("trip", id))?;
                let layout = trains::table
                    .find(trip.train.get())
                    .select(TrainRow::as_select())
                    .for_share()
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| StoreError::missing("train", "train", trip.train))?
                    .layout()?;
                validate_layout_change(&layout, trip_extent(conn, id.get())?)
                    .map_err(StoreError::StrandedTickets)?;
                let stored: TripRow = diesel::update(trips::table.find(id.get()))
                    .set(&trip_row(&trip))
                    .returning(TripRow::as_returning())
                    .get_result(conn)
                    .optional()?
                    .ok_or_else(|| StoreError::not_found("trip", id))?;
                replace_crew(conn, stored.id, &trip.crew)?;
                stored.into_trip(trip.crew.clone())
            })
        })
        .await
    }

    async fn delete_trip(&self, id: TripId) -> StoreResult<()> {
        self.with_conn(move |conn| {
            let deleted = diesel::delete(trips::table.find(id.get())).execute(conn)?;
            if deleted == 0 {
                return Err(StoreError::not_found("trip", id));
            }
            Ok(())
        })
        .await
    }

    async fn trip_layout(&self, id: TripId) -> StoreResult<SeatLayout> {
        self.with_conn(move |conn| {
            trips::table
                .inner_join(trains::table)
                .filter(trips::id.eq(id.get()))
                .select(TrainRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("trip", id))?
                .layout()
        })
        .await
    }

    async fn seat_taken(&self, key: SeatKey) -> StoreResult<bool> {
        let cargo = to_i32(key.cargo)?;
        let seat = to_i32(key.seat)?;
        self.with_conn(move |conn| {
            let taken = diesel::select(exists(
                tickets::table
                    .filter(tickets::trip_id.eq(key.trip.get()))
                    .filter(tickets::cargo.eq(cargo))
                    .filter(tickets::seat.eq(seat)),
            ))
            .get_result(conn)?;
            Ok(taken)
        })
        .await
    }

    async fn insert_order(
        &self,
        user: UserId,
        created_at: DateTime<Utc>,
        tickets: &[NewTicket],
    ) -> StoreResult<Order> {
        let requested = tickets.to_vec();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                // Keep the trips and their trains from changing until the
                // order commits.
                let trip_ids: Vec<i64> = requested
                    .iter()
                    .map(|t| t.trip.get())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let layouts = trips::table
                    .inner_join(trains::table)
                    .filter(trips::id.eq_any(&trip_ids))
                    .select((trips::id, TrainRow::as_select()))
                    .for_share()
                    .load::<(i64, TrainRow)>(conn)?
                    .into_iter()
                    .map(|(trip, train)| Ok((trip, train.layout()?)))
                    .collect::<StoreResult<HashMap<i64, SeatLayout>>>()?;
                for (index, ticket) in requested.iter().enumerate() {
                    let layout = layouts
                        .get(&ticket.trip.get())
                        .ok_or_else(|| StoreError::missing("trip", "trip", ticket.trip))?;
                    validate_ticket(i64::from(ticket.cargo), i64::from(ticket.seat), layout)
                        .map_err(|error| StoreError::SeatOutOfRange { index, error })?;
                }

                let order: OrderRow = diesel::insert_into(orders::table)
                    .values(&NewOrderRow {
                        user_id: user.get(),
                        created_at,
                    })
                    .returning(OrderRow::as_returning())
                    .get_result(conn)?;
                let rows = requested
                    .iter()
                    .map(|t| {
                        Ok(NewTicketRow {
                            order_id: order.id,
                            trip_id: t.trip.get(),
                            cargo: to_i32(t.cargo)?,
                            seat: to_i32(t.seat)?,
                        })
                    })
                    .collect::<StoreResult<Vec<_>>>()?;
                let mut stored = diesel::insert_into(tickets::table)
                    .values(&rows)
                    .returning(TicketRow::as_returning())
                    .get_results(conn)?
                    .into_iter()
                    .map(TicketRow::into_ticket)
                    .collect::<StoreResult<Vec<Ticket>>>()?;
                sort_tickets(&mut stored);

                Ok(Order {
                    id: OrderId(order.id),
                    user,
                    created_at: order.created_at,
                    tickets: stored,
                })
            })
        })
        .await
    }

    async fn list_orders(&self, user: UserId, page: PageRequest) -> StoreResult<Page<OrderView>> {
        let (limit, offset) = limits(page);
        self.with_snapshot(move |conn| {
            let count: i64 = orders::table
                .filter(orders::user_id.eq(user.get()))
                .count()
                .get_result(conn)?;
            let rows: Vec<OrderRow> = orders::table
                .filter(orders::user_id.eq(user.get()))
                .order((orders::created_at.desc(), orders::id.desc()))
                .limit(limit)
                .offset(offset)
                .select(OrderRow::as_select())
                .load(conn)?;

            let order_ids: Vec<i64> = rows.iter().map(|o| o.id).collect();
            let mut by_order: HashMap<i64, Vec<Ticket>> = HashMap::new();
            let ticket_rows: Vec<TicketRow> = tickets::table
                .filter(tickets::order_id.eq_any(&order_ids))
                .select(TicketRow::as_select())
                .load(conn)?;
            for row in ticket_rows {
                by_order
                    .entry(row.order_id)
                    .or_default()
                    .push(row.into_ticket()?);
            }

            let trip_ids: Vec<i64> = by_order
                .values()
                .flatten()
                .map(|t| t.trip.get())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let trip_rows = trips::table
                .filter(trips::id.eq_any(&trip_ids))
                .select(TripRow::as_select())
                .load(conn)?;
            let headers = trip_headers(conn, trip_rows)?;

            let items = rows
                .into_iter()
                .map(|row| {
                    let mut tickets = by_order.remove(&row.id).unwrap_or_default();
                    sort_tickets(&mut tickets);
                    let wanted: BTreeSet<TripId> = tickets.iter().map(|t| t.trip).collect();
                    let trips = headers
                        .iter()
                        .filter(|h| wanted.contains(&h.trip.id))
                        .cloned()
                        .collect();
                    OrderView {
                        order: Order {
                            id: OrderId(row.id),
                            user,
                            created_at: row.created_at,
                            tickets,
                        },
                        trips,
                    }
                })
                .collect();
            Ok(Page {
                items,
                total: total(count),
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_escape_wildcards() {
        assert_eq!(contains_pattern("kyiv"), "%kyiv%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn day_bounds_cover_one_utc_day() {
        let date = NaiveDate::from_ymd_opt(2030, 6, 1).unwrap();
        let (start, end) = day_bounds(date);
        assert_eq!(start.to_rfc3339(), "2030-06-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2030-06-02T00:00:00+00:00");
    }

    #[test]
    fn page_limits() {
        assert_eq!(limits(PageRequest::new(3, 20)), (20, 40));
    }

    #[test]
    fn empty_extent() {
        assert_eq!(extent((None, None)), Ok(None));
        assert_eq!(extent((Some(3), Some(9))), Ok(Some((3, 9))));
    }
}
