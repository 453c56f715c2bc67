//! HTTP route handlers.

mod catalog;
mod orders;
mod trips;
mod users;

use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::error::AppError;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let station = Router::new()
        .route(
            "/crews",
            get(catalog::list_crews).post(catalog::create_crew),
        )
        .route(
            "/train_types",
            get(catalog::list_train_types).post(catalog::create_train_type),
        )
        .route(
            "/trains",
            get(catalog::list_trains).post(catalog::create_train),
        )
        .route(
            "/trains/:id",
            get(catalog::get_train)
                .put(catalog::update_train)
                .patch(catalog::update_train),
        )
        .route(
            "/stations",
            get(catalog::list_stations).post(catalog::create_station),
        )
        .route("/stations/:id", get(catalog::get_station))
        .route(
            "/routes",
            get(catalog::list_routes).post(catalog::create_route),
        )
        .route("/routes/:id", get(catalog::get_route))
        .route("/trips", get(trips::list_trips).post(trips::create_trip))
        .route(
            "/trips/:id",
            get(trips::get_trip)
                .put(trips::update_trip)
                .patch(trips::update_trip)
                .delete(trips::delete_trip),
        )
        .route(
            "/orders",
            get(orders::list_orders).post(orders::create_order),
        );

    let user = Router::new()
        .route("/register", post(users::register))
        .route(
            "/me",
            get(users::me).put(users::update_me).patch(users::update_me),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/api/station", station)
        .nest("/api/user", user)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health(State(state): State<AppState>) -> Result<&'static str, AppError> {
    state.store.ping().await?;
    Ok("ok")
}
