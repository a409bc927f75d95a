use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::model::{
    Decision, NewRide, NewRideRequest, NewUser, RequestStatus, Ride, RideFilter, RideRequest,
    RideStatus, Role, Session, User,
};

#[derive(Default)]
struct Tables {
    // insertion order; newest-first listings walk these in reverse
    users: Vec<User>,
    rides: Vec<Ride>,
    requests: Vec<RideRequest>,
    sessions: HashMap<Uuid, Session>,
}

/// Process-local store for tests and `STORE_BACKEND=memory` runs. All
/// operations take one lock, so each call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn set_ride_status(&self, id: Uuid, status: RideStatus) {
        let mut t = self.tables.write().await;
        if let Some(ride) = t.rides.iter_mut().find(|r| r.id == id) {
            ride.status = status;
        }
    }

    /// Drops a user row without touching anything that references it.
    #[cfg(test)]
    pub async fn remove_user(&self, id: Uuid) {
        self.tables.write().await.users.retain(|u| u.id != id);
    }

    #[cfg(test)]
    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }

    /// Row counts of (users, rides, requests).
    #[cfg(test)]
    pub async fn counts(&self) -> (usize, usize, usize) {
        let t = self.tables.read().await;
        (t.users.len(), t.rides.len(), t.requests.len())
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("Email already registered"));
        }
        let row = User {
            id: Uuid::new_v4(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            password_hash: user.password_hash,
            role: user.role,
            rating: 5,
            total_rides: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(row.clone());
        Ok(row)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_ride(&self, ride: NewRide) -> StoreResult<Ride> {
        let mut t = self.tables.write().await;
        if !t.users.iter().any(|u| u.id == ride.driver_id) {
            return Err(StoreError::NotFound("User"));
        }
        let row = Ride {
            id: Uuid::new_v4(),
            driver_id: ride.driver_id,
            origin: ride.origin,
            destination: ride.destination,
            date: ride.date,
            time: ride.time,
            available_seats: ride.available_seats,
            price: ride.price,
            vehicle_type: ride.vehicle_type,
            notes: ride.notes,
            status: RideStatus::Active,
            created_at: OffsetDateTime::now_utc(),
        };
        t.rides.push(row.clone());
        Ok(row)
    }

    async fn find_ride(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        let t = self.tables.read().await;
        Ok(t.rides.iter().find(|r| r.id == id).cloned())
    }

    async fn search_rides(&self, filter: &RideFilter) -> StoreResult<Vec<Ride>> {
        let t = self.tables.read().await;
        let rides = t
            .rides
            .iter()
            .rev()
            .filter(|r| r.status == RideStatus::Active)
            .filter(|r| filter.origin.as_deref().map_or(true, |o| contains_ci(&r.origin, o)))
            .filter(|r| {
                filter
                    .destination
                    .as_deref()
                    .map_or(true, |d| contains_ci(&r.destination, d))
            })
            .filter(|r| filter.date.as_deref().map_or(true, |d| r.date == d))
            .cloned()
            .collect();
        Ok(rides)
    }

    async fn rides_by_driver(&self, driver_id: Uuid) -> StoreResult<Vec<Ride>> {
        let t = self.tables.read().await;
        Ok(t.rides
            .iter()
            .rev()
            .filter(|r| r.driver_id == driver_id)
            .cloned()
            .collect())
    }

    async fn create_request(&self, request: NewRideRequest) -> StoreResult<RideRequest> {
        let mut t = self.tables.write().await;
        if !t.rides.iter().any(|r| r.id == request.ride_id) {
            return Err(StoreError::NotFound("Ride"));
        }
        if !t.users.iter().any(|u| u.id == request.rider_id) {
            return Err(StoreError::NotFound("User"));
        }
        let row = RideRequest {
            id: Uuid::new_v4(),
            ride_id: request.ride_id,
            rider_id: request.rider_id,
            seats: request.seats,
            message: request.message,
            status: RequestStatus::Pending,
            created_at: OffsetDateTime::now_utc(),
        };
        t.requests.push(row.clone());
        Ok(row)
    }

    async fn find_request(&self, id: Uuid) -> StoreResult<Option<RideRequest>> {
        let t = self.tables.read().await;
        Ok(t.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn requests_by_rider(&self, rider_id: Uuid) -> StoreResult<Vec<RideRequest>> {
        let t = self.tables.read().await;
        Ok(t.requests
            .iter()
            .rev()
            .filter(|r| r.rider_id == rider_id)
            .cloned()
            .collect())
    }

    async fn requests_for_driver(&self, driver_id: Uuid) -> StoreResult<Vec<RideRequest>> {
        let t = self.tables.read().await;
        Ok(t.requests
            .iter()
            .rev()
            .filter(|req| {
                t.rides
                    .iter()
                    .any(|ride| ride.id == req.ride_id && ride.driver_id == driver_id)
            })
            .cloned()
            .collect())
    }

    async fn resolve_request(&self, id: Uuid, decision: Decision) -> StoreResult<RideRequest> {
        let mut guard = self.tables.write().await;
        let t = &mut *guard;

        let req_idx = t
            .requests
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound("Request"))?;
        let request = &t.requests[req_idx];
        if request.status != RequestStatus::Pending {
            return Err(StoreError::NotPending(request.status));
        }

        if decision == Decision::Accept {
            let (ride_id, seats) = (request.ride_id, request.seats);
            let ride = t
                .rides
                .iter_mut()
                .find(|r| r.id == ride_id)
                .ok_or(StoreError::NotFound("Ride"))?;
            if ride.available_seats < seats {
                return Err(StoreError::InsufficientSeats);
            }
            ride.available_seats -= seats;
        }

        let request = &mut t.requests[req_idx];
        request.status = decision.status();
        Ok(request.clone())
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        role: Role,
        expires_at: OffsetDateTime,
    ) -> StoreResult<Session> {
        let mut t = self.tables.write().await;
        if !t.users.iter().any(|u| u.id == user_id) {
            return Err(StoreError::NotFound("User"));
        }
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            role,
            expires_at,
        };
        t.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session(&self, id: Uuid) -> StoreResult<Option<Session>> {
        let t = self.tables.read().await;
        let now = OffsetDateTime::now_utc();
        Ok(t.sessions.get(&id).filter(|s| s.expires_at > now).cloned())
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<()> {
        self.tables.write().await.sessions.remove(&id);
        Ok(())
    }

    async fn purge_expired_sessions(&self) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        let now = OffsetDateTime::now_utc();
        let before = t.sessions.len();
        t.sessions.retain(|_, s| s.expires_at > now);
        Ok((before - t.sessions.len()) as u64)
    }
}
