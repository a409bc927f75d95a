use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::model::{
    Decision, NewRide, NewRideRequest, NewUser, RequestStatus, Ride, RideFilter, RideRequest,
    Role, Session, User,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("request has already been {0}")]
    NotPending(RequestStatus),
    #[error("not enough available seats")]
    InsufficientSeats,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for users, rides, ride requests and sessions.
///
/// Every method is atomic on its own; nothing spans several calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn create_ride(&self, ride: NewRide) -> StoreResult<Ride>;
    async fn find_ride(&self, id: Uuid) -> StoreResult<Option<Ride>>;
    /// Active rides matching the filter, newest first.
    async fn search_rides(&self, filter: &RideFilter) -> StoreResult<Vec<Ride>>;
    async fn rides_by_driver(&self, driver_id: Uuid) -> StoreResult<Vec<Ride>>;

    /// Fails with [`StoreError::NotFound`] when the ride or rider is gone.
    async fn create_request(&self, request: NewRideRequest) -> StoreResult<RideRequest>;
    async fn find_request(&self, id: Uuid) -> StoreResult<Option<RideRequest>>;
    async fn requests_by_rider(&self, rider_id: Uuid) -> StoreResult<Vec<RideRequest>>;
    /// Requests targeting any ride owned by `driver_id`, newest first.
    async fn requests_for_driver(&self, driver_id: Uuid) -> StoreResult<Vec<RideRequest>>;
    /// Moves a pending request to its final status. Accepting takes the
    /// requested seats off the ride in the same unit of work and fails with
    /// [`StoreError::InsufficientSeats`] instead of going below zero.
    async fn resolve_request(&self, id: Uuid, decision: Decision) -> StoreResult<RideRequest>;

    /// Fails with [`StoreError::NotFound`] when the user is gone.
    async fn create_session(
        &self,
        user_id: Uuid,
        role: Role,
        expires_at: OffsetDateTime,
    ) -> StoreResult<Session>;
    /// Expired sessions are reported as absent.
    async fn find_session(&self, id: Uuid) -> StoreResult<Option<Session>>;
    /// Idempotent; the row is removed whether or not it has expired.
    async fn delete_session(&self, id: Uuid) -> StoreResult<()>;
    /// Removes every expired session and returns how many were dropped.
    async fn purge_expired_sessions(&self) -> StoreResult<u64>;
}
