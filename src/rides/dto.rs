use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::UserView;
use crate::model::{Ride, RideStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRideRequest {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub available_seats: Option<i32>,
    pub price: Option<i32>,
    pub vehicle_type: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideView {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub date: String,
    pub time: String,
    pub available_seats: i32,
    pub price: i32,
    pub vehicle_type: String,
    pub notes: String,
    pub status: RideStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<UserView>,
}

impl RideView {
    pub fn with_driver(mut self, driver: Option<UserView>) -> Self {
        self.driver = driver;
        self
    }
}

impl From<Ride> for RideView {
    fn from(r: Ride) -> Self {
        Self {
            id: r.id,
            driver_id: r.driver_id,
            origin: r.origin,
            destination: r.destination,
            date: r.date,
            time: r.time,
            available_seats: r.available_seats,
            price: r.price,
            vehicle_type: r.vehicle_type,
            notes: r.notes,
            status: r.status,
            created_at: r.created_at,
            driver: None,
        }
    }
}
