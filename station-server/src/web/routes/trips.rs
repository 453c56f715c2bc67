//! Trips and their availability.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{Method, StatusCode},
};
use chrono::Utc;
use tracing::info;

use crate::auth::AdminOrAuthenticatedReadOnly;
use crate::domain::TripId;
use crate::reservation::compute_available_seats;
use crate::store::{Page, StoreError, TripSummary};
use crate::web::dto::*;
use crate::web::error::AppError;
use crate::web::extract::{Access, parse_json};
use crate::web::state::AppState;

type Staff = Access<AdminOrAuthenticatedReadOnly>;

/// Upcoming trips with the seats still available on each.
pub async fn list_trips(
    _: Staff,
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
    Query(query): Query<TripQuery>,
) -> Result<Json<Paginated<TripListItem>>, AppError> {
    let filter = query.filter(Utc::now())?;
    let request = paging.request(&state.pages);
    let page = state.store.list_trips(&filter, request).await?;

    let page = Page {
        items: with_availability(page.items),
        total: page.total,
    };
    Ok(Json(Paginated::new(page, request, |item| item)?))
}

/// Attach the remaining seats to each trip. An oversold trip is logged by
/// [`compute_available_seats`] and left out of the listing.
fn with_availability(summaries: Vec<TripSummary>) -> Vec<TripListItem> {
    summaries
        .into_iter()
        .filter_map(|summary| {
            let header = &summary.header;
            let available =
                compute_available_seats(header.trip.id, &header.train.layout, summary.tickets_sold)
                    .ok()?;
            Some(TripListItem::new(summary, available))
        })
        .collect()
}

pub async fn get_trip(
    _: Staff,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TripDetail>, AppError> {
    let details = state.store.trip_details(TripId(id)).await?;
    Ok(Json(details.into()))
}

pub async fn create_trip(
    _: Staff,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<TripResponse>), AppError> {
    let trip = parse_json::<TripRequest>(&body)?.validate(None)?;
    let trip = state.store.insert_trip(trip).await?;
    info!(trip = %trip.id, "created trip");
    Ok((StatusCode::CREATED, Json(trip.into())))
}

/// `PUT` replaces every field; `PATCH` only those given.
///
/// A new train must have room for every seat already sold on the trip.
pub async fn update_trip(
    _: Staff,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    method: Method,
    body: Bytes,
) -> Result<Json<TripResponse>, AppError> {
    let id = TripId(id);
    let current = state.store.get_trip(id).await?;
    let request: TripRequest = parse_json(&body)?;
    let base = (method == Method::PATCH).then_some(&current);
    let trip = request.validate(base)?;

    let trip = state
        .store
        .update_trip(id, trip)
        .await
        .map_err(|e| match e {
            StoreError::StrandedTickets(e) => AppError::stranded(&e, |_| "train"),
            e => e.into(),
        })?;
    info!(trip = %id, "updated trip");
    Ok(Json(trip.into()))
}

/// Deletes the trip together with its tickets.
pub async fn delete_trip(
    _: Staff,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let id = TripId(id);
    state.store.delete_trip(id).await?;
    info!(trip = %id, "deleted trip");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::{
        Name, Route, RouteId, SeatLayout, Station, StationId, Train, TrainId, TrainTypeId, Trip,
        TripWindow,
    };
    use crate::store::TripHeader;

    fn summary(id: i64, sold: u64) -> TripSummary {
        let station = |id: i64, name: &str| Station {
            id: StationId(id),
            name: Name::parse("name", name).unwrap(),
            latitude: 50.0,
            longitude: 30.0,
        };
        let departure = Utc.with_ymd_and_hms(2030, 6, 1, 8, 0, 0).unwrap();
        TripSummary {
            header: TripHeader {
                trip: Trip {
                    id: TripId(id),
                    route: RouteId(1),
                    train: TrainId(1),
                    crew: vec![],
                    window: TripWindow::new(departure, departure + chrono::Duration::hours(7))
                        .unwrap(),
                },
                route: Route {
                    id: RouteId(1),
                    source: StationId(1),
                    destination: StationId(2),
                    distance: 540,
                },
                source: station(1, "Kyiv"),
                destination: station(2, "Lviv"),
                train: Train {
                    id: TrainId(1),
                    name: Name::parse("name", "Hyundai").unwrap(),
                    layout: SeatLayout::new(2, 2).unwrap(),
                    train_type: TrainTypeId(1),
                },
            },
            tickets_sold: sold,
        }
    }

    #[test]
    fn oversold_trip_left_out() {
        let items = with_availability(vec![summary(1, 1), summary(2, 5), summary(3, 4)]);
        let listed: Vec<(TripId, u64)> = items.iter().map(|i| (i.id, i.tickets_available)).collect();
        assert_eq!(listed, vec![(TripId(1), 3), (TripId(3), 0)]);
    }
}
