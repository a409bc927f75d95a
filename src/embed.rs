use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    auth::dto::UserView,
    model::Ride,
    rides::dto::RideView,
    store::{Store, StoreResult},
};

/// Resolves related rows for embedding while one response is being built.
/// Each user or ride is fetched at most once; rows that no longer exist come
/// back as `None` and are left out of the response.
pub struct Related<'a> {
    store: &'a dyn Store,
    users: HashMap<Uuid, Option<UserView>>,
    rides: HashMap<Uuid, Option<Ride>>,
}

impl<'a> Related<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            users: HashMap::new(),
            rides: HashMap::new(),
        }
    }

    pub async fn user(&mut self, id: Uuid) -> StoreResult<Option<UserView>> {
        if let Some(hit) = self.users.get(&id) {
            return Ok(hit.clone());
        }
        let view = self.store.find_user(id).await?.map(|u| UserView::from(&u));
        self.users.insert(id, view.clone());
        Ok(view)
    }

    async fn ride(&mut self, id: Uuid) -> StoreResult<Option<Ride>> {
        if let Some(hit) = self.rides.get(&id) {
            return Ok(hit.clone());
        }
        let ride = self.store.find_ride(id).await?;
        self.rides.insert(id, ride.clone());
        Ok(ride)
    }

    /// The ride without its driver.
    pub async fn ride_summary(&mut self, id: Uuid) -> StoreResult<Option<RideView>> {
        Ok(self.ride(id).await?.map(RideView::from))
    }

    /// The ride with its driver embedded.
    pub async fn ride_with_driver(&mut self, id: Uuid) -> StoreResult<Option<RideView>> {
        let Some(ride) = self.ride(id).await? else {
            return Ok(None);
        };
        self.with_driver(ride).await.map(Some)
    }

    pub async fn with_driver(&mut self, ride: Ride) -> StoreResult<RideView> {
        let driver = self.user(ride.driver_id).await?;
        Ok(RideView::from(ride).with_driver(driver))
    }
}
