use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::UserView;
use crate::model::{RequestStatus, RideRequest};
use crate::rides::dto::RideView;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRideRequestBody {
    pub ride_id: Option<Uuid>,
    pub seats: Option<i32>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequestView {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub seats: i32,
    pub message: String,
    pub status: RequestStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rider: Option<UserView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride: Option<RideView>,
}

impl RideRequestView {
    pub fn with_rider(mut self, rider: Option<UserView>) -> Self {
        self.rider = rider;
        self
    }

    pub fn with_ride(mut self, ride: Option<RideView>) -> Self {
        self.ride = ride;
        self
    }
}

impl From<RideRequest> for RideRequestView {
    fn from(r: RideRequest) -> Self {
        Self {
            id: r.id,
            ride_id: r.ride_id,
            rider_id: r.rider_id,
            seats: r.seats,
            message: r.message,
            status: r.status,
            created_at: r.created_at,
            rider: None,
            ride: None,
        }
    }
}
