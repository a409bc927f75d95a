use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    api::{ApiJson, ApiPath, Message},
    auth::session::{CurrentUser, DriverUser, RiderUser},
    embed::Related,
    error::AppError,
    model::{Decision, NewRideRequest, Role},
    state::AppState,
};

use super::dto::{CreateRideRequestBody, RideRequestView, UpdateStatusRequest};

pub fn request_routes() -> Router<AppState> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/my", get(my_requests))
        .route("/requests/:id", patch(update_request_status))
}

#[instrument(skip(state, payload))]
pub async fn create_request(
    State(state): State<AppState>,
    RiderUser(rider): RiderUser,
    ApiJson(payload): ApiJson<CreateRideRequestBody>,
) -> Result<(StatusCode, Json<RideRequestView>), AppError> {
    let ride_id = payload.ride_id.ok_or_else(|| AppError::missing("rideId"))?;
    let seats = payload.seats.ok_or_else(|| AppError::missing("seats"))?;
    if seats <= 0 {
        return Err(AppError::Validation("seats must be greater than zero".into()));
    }

    let ride = state
        .store
        .find_ride(ride_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".into()))?;

    if ride.available_seats < seats {
        warn!(%ride_id, seats, available = ride.available_seats, "not enough seats");
        return Err(AppError::Validation("Not enough available seats".into()));
    }

    let request = state
        .store
        .create_request(NewRideRequest {
            ride_id,
            rider_id: rider.user_id,
            seats,
            message: payload.message.unwrap_or_default(),
        })
        .await?;

    info!(request_id = %request.id, %ride_id, rider_id = %rider.user_id, seats, "ride requested");
    Ok((StatusCode::CREATED, Json(RideRequestView::from(request))))
}

/// Drivers see requests against their rides (rider embedded, ride without
/// driver); riders see their own requests with the full ride.
#[instrument(skip(state))]
pub async fn my_requests(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<RideRequestView>>, AppError> {
    let mut related = Related::new(state.store.as_ref());

    let items = match user.role {
        Role::Driver => {
            let requests = state.store.requests_for_driver(user.user_id).await?;
            let mut items = Vec::with_capacity(requests.len());
            for req in requests {
                let rider = related.user(req.rider_id).await?;
                let ride = related.ride_summary(req.ride_id).await?;
                items.push(RideRequestView::from(req).with_rider(rider).with_ride(ride));
            }
            items
        }
        Role::Rider => {
            let requests = state.store.requests_by_rider(user.user_id).await?;
            let mut items = Vec::with_capacity(requests.len());
            for req in requests {
                let ride = related.ride_with_driver(req.ride_id).await?;
                items.push(RideRequestView::from(req).with_ride(ride));
            }
            items
        }
    };

    Ok(Json(items))
}

#[instrument(skip(state, payload))]
pub async fn update_request_status(
    State(state): State<AppState>,
    DriverUser(driver): DriverUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(payload): ApiJson<UpdateStatusRequest>,
) -> Result<Json<Message>, AppError> {
    // an id that is not a UUID cannot name any request
    let id: Uuid = id
        .parse()
        .map_err(|_| AppError::NotFound("Request not found".into()))?;

    let decision: Decision = payload
        .status
        .as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| AppError::Validation("Invalid status".into()))?;

    let request = state
        .store
        .find_request(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Request not found".into()))?;

    let owns_ride = state
        .store
        .find_ride(request.ride_id)
        .await?
        .is_some_and(|ride| ride.driver_id == driver.user_id);
    if !owns_ride {
        warn!(request_id = %id, driver_id = %driver.user_id, "request belongs to another driver");
        return Err(AppError::Forbidden(
            "You can only manage requests for your own rides".into(),
        ));
    }

    let resolved = state.store.resolve_request(id, decision).await.map_err(|e| {
        warn!(request_id = %id, error = %e, "request not resolved");
        AppError::from(e)
    })?;

    info!(request_id = %id, ride_id = %resolved.ride_id, status = %resolved.status, "ride request resolved");
    Ok(Message::new("Request updated successfully"))
}
