//! Orders of the signed-in user.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::Utc;
use tracing::info;

use crate::auth::Authenticated;
use crate::reservation::Booking;
use crate::web::dto::*;
use crate::web::error::AppError;
use crate::web::extract::{Access, parse_json};
use crate::web::state::AppState;

/// The caller's own orders, newest first.
pub async fn list_orders(
    access: Access<Authenticated>,
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> Result<Json<Paginated<OrderListItem>>, AppError> {
    let user = access.user()?;
    let request = paging.request(&state.pages);
    let page = state.store.list_orders(user.id, request).await?;
    Ok(Json(Paginated::new(page, request, OrderListItem::from)?))
}

/// Place an order; either every ticket is sold or none is.
pub async fn create_order(
    access: Access<Authenticated>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let user = access.user()?.id;
    let tickets = parse_json::<OrderRequest>(&body)?.tickets()?;

    let order = Booking::new(state.store.as_ref())
        .place_order(user, &tickets, Utc::now())
        .await
        .map_err(|e| AppError::booking(e, tickets.len()))?;

    info!(user = %user, order = %order.id, tickets = order.tickets.len(), "order placed");
    Ok((StatusCode::CREATED, Json(order.into())))
}
