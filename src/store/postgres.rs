use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::model::{
    Decision, NewRide, NewRideRequest, NewUser, RequestStatus, Ride, RideFilter, RideRequest,
    Role, Session, User,
};

const USER_COLUMNS: &str = "id, first_name, last_name, email, phone, password_hash, role, \
                            rating, total_rides, created_at";
const RIDE_COLUMNS: &str = r#"id, driver_id, origin, destination, "date", "time", available_seats,
                              price, vehicle_type, notes, status, created_at"#;
const REQUEST_COLUMNS: &str = "id, ride_id, rider_id, seats, message, status, created_at";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// `%term%` for ILIKE, with the pattern metacharacters in `term` escaped.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, first_name, last_name, email, phone, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.password_hash)
            .bind(user.role)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict("Email already registered")
                } else {
                    e.into()
                }
            })
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn create_ride(&self, ride: NewRide) -> StoreResult<Ride> {
        let sql = format!(
            r#"
            INSERT INTO rides (id, driver_id, origin, destination, "date", "time",
                               available_seats, price, vehicle_type, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {RIDE_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Ride>(&sql)
            .bind(Uuid::new_v4())
            .bind(ride.driver_id)
            .bind(&ride.origin)
            .bind(&ride.destination)
            .bind(&ride.date)
            .bind(&ride.time)
            .bind(ride.available_seats)
            .bind(ride.price)
            .bind(&ride.vehicle_type)
            .bind(&ride.notes)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::NotFound("User")
                } else {
                    e.into()
                }
            })
    }

    async fn find_ride(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        let sql = format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1");
        let ride = sqlx::query_as::<_, Ride>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(ride)
    }

    async fn search_rides(&self, filter: &RideFilter) -> StoreResult<Vec<Ride>> {
        let sql = format!(
            r#"
            SELECT {RIDE_COLUMNS}
            FROM rides
            WHERE status = 'active'
              AND ($1::text IS NULL OR origin ILIKE $1 ESCAPE '\')
              AND ($2::text IS NULL OR destination ILIKE $2 ESCAPE '\')
              AND ($3::text IS NULL OR "date" = $3)
            ORDER BY created_at DESC
            "#
        );
        let rides = sqlx::query_as::<_, Ride>(&sql)
            .bind(filter.origin.as_deref().map(contains_pattern))
            .bind(filter.destination.as_deref().map(contains_pattern))
            .bind(filter.date.as_deref())
            .fetch_all(&self.db)
            .await?;
        debug!(count = rides.len(), "ride search");
        Ok(rides)
    }

    async fn rides_by_driver(&self, driver_id: Uuid) -> StoreResult<Vec<Ride>> {
        let sql = format!(
            "SELECT {RIDE_COLUMNS} FROM rides WHERE driver_id = $1 ORDER BY created_at DESC"
        );
        let rides = sqlx::query_as::<_, Ride>(&sql)
            .bind(driver_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rides)
    }

    async fn create_request(&self, request: NewRideRequest) -> StoreResult<RideRequest> {
        let sql = format!(
            r#"
            INSERT INTO ride_requests (id, ride_id, rider_id, seats, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {REQUEST_COLUMNS}
            "#
        );
        sqlx::query_as::<_, RideRequest>(&sql)
            .bind(Uuid::new_v4())
            .bind(request.ride_id)
            .bind(request.rider_id)
            .bind(request.seats)
            .bind(&request.message)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::NotFound("Ride")
                } else {
                    e.into()
                }
            })
    }

    async fn find_request(&self, id: Uuid) -> StoreResult<Option<RideRequest>> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM ride_requests WHERE id = $1");
        let request = sqlx::query_as::<_, RideRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(request)
    }

    async fn requests_by_rider(&self, rider_id: Uuid) -> StoreResult<Vec<RideRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM ride_requests WHERE rider_id = $1 \
             ORDER BY created_at DESC"
        );
        let requests = sqlx::query_as::<_, RideRequest>(&sql)
            .bind(rider_id)
            .fetch_all(&self.db)
            .await?;
        Ok(requests)
    }

    async fn requests_for_driver(&self, driver_id: Uuid) -> StoreResult<Vec<RideRequest>> {
        let requests = sqlx::query_as::<_, RideRequest>(
            r#"
            SELECT rr.id, rr.ride_id, rr.rider_id, rr.seats, rr.message, rr.status, rr.created_at
            FROM ride_requests rr
            JOIN rides r ON r.id = rr.ride_id
            WHERE r.driver_id = $1
            ORDER BY rr.created_at DESC
            "#,
        )
        .bind(driver_id)
        .fetch_all(&self.db)
        .await?;
        Ok(requests)
    }

    async fn resolve_request(&self, id: Uuid, decision: Decision) -> StoreResult<RideRequest> {
        let mut tx = self.db.begin().await?;

        let select = format!("SELECT {REQUEST_COLUMNS} FROM ride_requests WHERE id = $1 FOR UPDATE");
        let request = sqlx::query_as::<_, RideRequest>(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("Request"))?;

        if request.status != RequestStatus::Pending {
            return Err(StoreError::NotPending(request.status));
        }

        if decision == Decision::Accept {
            let taken = sqlx::query(
                r#"
                UPDATE rides
                SET available_seats = available_seats - $2
                WHERE id = $1 AND available_seats >= $2
                "#,
            )
            .bind(request.ride_id)
            .bind(request.seats)
            .execute(&mut *tx)
            .await?;
            if taken.rows_affected() == 0 {
                return Err(StoreError::InsufficientSeats);
            }
        }

        let update = format!(
            "UPDATE ride_requests SET status = $2 WHERE id = $1 RETURNING {REQUEST_COLUMNS}"
        );
        let resolved = sqlx::query_as::<_, RideRequest>(&update)
            .bind(id)
            .bind(decision.status())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(resolved)
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        role: Role,
        expires_at: OffsetDateTime,
    ) -> StoreResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, user_id, role, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, role, expires_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(role)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::NotFound("User")
            } else {
                e.into()
            }
        })?;
        Ok(session)
    }

    async fn find_session(&self, id: Uuid) -> StoreResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, role, expires_at
            FROM sessions
            WHERE id = $1 AND expires_at > now()
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(session)
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn purge_expired_sessions(&self) -> StoreResult<u64> {
        let purged = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(&self.db)
            .await?;
        Ok(purged.rows_affected())
    }
}
