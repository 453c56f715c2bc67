//! Crews, train types, trains, stations and routes.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{Method, StatusCode},
};
use tracing::info;

use crate::auth::AdminOrAuthenticatedReadOnly;
use crate::domain::{InvalidFields, Name, RouteId, StationId, TrainId};
use crate::web::dto::*;
use crate::web::error::AppError;
use crate::web::extract::{Access, parse_json};
use crate::web::state::AppState;

type Staff = Access<AdminOrAuthenticatedReadOnly>;

pub async fn list_crews(
    _: Staff,
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> Result<Json<Paginated<CrewResponse>>, AppError> {
    let request = paging.request(&state.pages);
    let page = state.store.list_crews(request).await?;
    Ok(Json(Paginated::new(page, request, CrewResponse::from)?))
}

pub async fn create_crew(
    _: Staff,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CrewResponse>), AppError> {
    let crew = parse_json::<CrewRequest>(&body)?.validate()?;
    let crew = state.store.insert_crew(crew).await?;
    info!(crew = %crew.id, "created crew member");
    Ok((StatusCode::CREATED, Json(crew.into())))
}

pub async fn list_train_types(
    _: Staff,
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> Result<Json<Paginated<TrainTypeResponse>>, AppError> {
    let request = paging.request(&state.pages);
    let page = state.store.list_train_types(request).await?;
    Ok(Json(Paginated::new(page, request, TrainTypeResponse::from)?))
}

pub async fn create_train_type(
    _: Staff,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<TrainTypeResponse>), AppError> {
    let request: TrainTypeRequest = parse_json(&body)?;
    let name = request
        .name
        .ok_or_else(|| AppError::field("name", "This field is required."))?;
    let name = Name::parse("name", &name).map_err(InvalidFields::from)?;
    let train_type = state.store.insert_train_type(name).await?;
    info!(train_type = %train_type.id, "created train type");
    Ok((StatusCode::CREATED, Json(train_type.into())))
}

pub async fn list_trains(
    _: Staff,
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> Result<Json<Paginated<TrainResponse>>, AppError> {
    let request = paging.request(&state.pages);
    let page = state.store.list_trains(request).await?;
    Ok(Json(Paginated::new(page, request, TrainResponse::from)?))
}

pub async fn create_train(
    _: Staff,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<TrainResponse>), AppError> {
    let train = parse_json::<TrainRequest>(&body)?.validate(None)?;
    let view = state.store.insert_train(train).await?;
    info!(train = %view.train.id, "created train");
    Ok((StatusCode::CREATED, Json(view.into())))
}

pub async fn get_train(
    _: Staff,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TrainResponse>, AppError> {
    let view = state.store.get_train(TrainId(id)).await?;
    Ok(Json(view.into()))
}

/// `PUT` replaces every field; `PATCH` only those given.
///
/// The new layout must still contain every seat sold on the train's trips.
pub async fn update_train(
    _: Staff,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    method: Method,
    body: Bytes,
) -> Result<Json<TrainResponse>, AppError> {
    let id = TrainId(id);
    let current = state.store.get_train(id).await?;
    let request: TrainRequest = parse_json(&body)?;
    let base = (method == Method::PATCH).then_some(&current.train);
    let train = request.validate(base)?;

    let view = state.store.update_train(id, train).await?;
    info!(train = %id, "updated train");
    Ok(Json(view.into()))
}

pub async fn list_stations(
    _: Staff,
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> Result<Json<Paginated<StationResponse>>, AppError> {
    let request = paging.request(&state.pages);
    let page = state.store.list_stations(request).await?;
    Ok(Json(Paginated::new(page, request, StationResponse::from)?))
}

pub async fn create_station(
    _: Staff,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<StationResponse>), AppError> {
    let station = parse_json::<StationRequest>(&body)?.validate()?;
    let station = state.store.insert_station(station).await?;
    info!(station = %station.id, "created station");
    Ok((StatusCode::CREATED, Json(station.into())))
}

pub async fn get_station(
    _: Staff,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StationResponse>, AppError> {
    let station = state.store.get_station(StationId(id)).await?;
    Ok(Json(station.into()))
}

pub async fn list_routes(
    _: Staff,
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<Paginated<RouteListItem>>, AppError> {
    let request = paging.request(&state.pages);
    let page = state.store.list_routes(&query.filter(), request).await?;
    Ok(Json(Paginated::new(page, request, RouteListItem::from)?))
}

pub async fn create_route(
    _: Staff,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<RouteResponse>), AppError> {
    let route = parse_json::<RouteRequest>(&body)?.validate()?;
    let view = state.store.insert_route(route).await?;
    info!(route = %view.route.id, "created route");
    Ok((StatusCode::CREATED, Json(view.into())))
}

pub async fn get_route(
    _: Staff,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RouteDetail>, AppError> {
    let view = state.store.get_route(RouteId(id)).await?;
    Ok(Json(view.into()))
}
