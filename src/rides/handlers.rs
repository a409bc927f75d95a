use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    api::{non_empty, ApiJson, ApiQuery},
    auth::session::DriverUser,
    embed::Related,
    error::AppError,
    model::{NewRide, RideFilter},
    state::AppState,
};

use super::dto::{CreateRideRequest, RideView, SearchQuery};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/rides/search", get(search_rides))
        .route("/rides/my", get(my_rides))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route("/rides", post(create_ride))
}

#[instrument(skip(state, payload))]
pub async fn create_ride(
    State(state): State<AppState>,
    DriverUser(driver): DriverUser,
    ApiJson(payload): ApiJson<CreateRideRequest>,
) -> Result<(StatusCode, Json<RideView>), AppError> {
    let origin = payload.origin.ok_or_else(|| AppError::missing("origin"))?;
    let destination = payload
        .destination
        .ok_or_else(|| AppError::missing("destination"))?;
    let date = payload.date.ok_or_else(|| AppError::missing("date"))?;
    let time = payload.time.ok_or_else(|| AppError::missing("time"))?;
    let available_seats = payload
        .available_seats
        .ok_or_else(|| AppError::missing("availableSeats"))?;
    let price = payload.price.ok_or_else(|| AppError::missing("price"))?;
    let vehicle_type = payload
        .vehicle_type
        .ok_or_else(|| AppError::missing("vehicleType"))?;

    if available_seats < 0 {
        return Err(AppError::Validation(
            "availableSeats must not be negative".into(),
        ));
    }
    if price < 0 {
        return Err(AppError::Validation("price must not be negative".into()));
    }

    let ride = state
        .store
        .create_ride(NewRide {
            driver_id: driver.user_id,
            origin,
            destination,
            date,
            time,
            available_seats,
            price,
            vehicle_type,
            notes: payload.notes.unwrap_or_default(),
        })
        .await?;

    info!(ride_id = %ride.id, driver_id = %driver.user_id, seats = ride.available_seats, "ride created");
    Ok((StatusCode::CREATED, Json(RideView::from(ride))))
}

#[instrument(skip(state))]
pub async fn search_rides(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<RideView>>, AppError> {
    let filter = RideFilter {
        origin: non_empty(query.origin),
        destination: non_empty(query.destination),
        date: non_empty(query.date),
    };
    let rides = state.store.search_rides(&filter).await?;

    let mut related = Related::new(state.store.as_ref());
    let mut items = Vec::with_capacity(rides.len());
    for ride in rides {
        items.push(related.with_driver(ride).await?);
    }
    Ok(Json(items))
}

#[instrument(skip(state))]
pub async fn my_rides(
    State(state): State<AppState>,
    DriverUser(driver): DriverUser,
) -> Result<Json<Vec<RideView>>, AppError> {
    let rides = state.store.rides_by_driver(driver.user_id).await?;
    Ok(Json(rides.into_iter().map(RideView::from).collect()))
}
