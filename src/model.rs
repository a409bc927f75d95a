use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Driver,
    Rider,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "driver" => Ok(Role::Driver),
            "rider" => Ok(Role::Rider),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "ride_status", rename_all = "lowercase")]
pub enum RideStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
        };
        f.write_str(s)
    }
}

/// A driver's answer to a pending ride request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Decline,
}

impl Decision {
    pub fn status(self) -> RequestStatus {
        match self {
            Decision::Accept => RequestStatus::Accepted,
            Decision::Decline => RequestStatus::Declined,
        }
    }
}

impl FromStr for Decision {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(Decision::Accept),
            "declined" => Ok(Decision::Decline),
            _ => Err(()),
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String, // Argon2 PHC string, never exposed
    pub role: Role,
    pub rating: i32,
    pub total_rides: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Ride {
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
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct RideRequest {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub seats: i32,
    pub message: String,
    pub status: RequestStatus,
    pub created_at: OffsetDateTime,
}

/// Server-side state referenced by the session cookie.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewRide {
    pub driver_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub date: String,
    pub time: String,
    pub available_seats: i32,
    pub price: i32,
    pub vehicle_type: String,
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct NewRideRequest {
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub seats: i32,
    pub message: String,
}

/// Filters for the public ride search. Only active rides are ever returned.
#[derive(Debug, Clone, Default)]
pub struct RideFilter {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<String>,
}
