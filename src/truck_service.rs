//! Truck administration and the unblock sweep
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::error::ApiError;
use super::store::{TruckStore, with_deadline};
use super::truck::{Truck, TruckEdit, TruckEditRequest, TruckFilter, TruckRequest};
use super::types::{Actor, Role, TimeStamp};
use super::utils::{TRUCK_HRP, decode_id, new_doc_id, normalize};

pub struct TruckService<S: TruckStore + 'static> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: TruckStore + 'static> TruckService<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Register a truck in the actor's branch. Identity is unique per branch.
    pub async fn insert_truck(&self, actor: &Actor, req: TruckRequest) -> Result<String, ApiError> {
        req.validate()?;
        let details = req.normalized();
        let id = new_doc_id(TRUCK_HRP)?;
        let audit = actor.stamp(TimeStamp::now());
        let truck = Truck {
            id: id.encoded,
            branch: actor.branch.clone(),
            identity: details.identity,
            plate: details.plate,
            mark: details.mark,
            owner: details.owner,
            email: details.email,
            phone: details.phone,
            deleted: false,
            score: 0,
            reset_score_at: None,
            blocked: false,
            block: None,
            created: audit.clone(),
            updated: audit,
        };

        let id = with_deadline(self.timeout, "insert_truck", self.store.insert_truck(id.key, truck)).await?;
        info!(truck_id = %id, branch = %actor.branch, "truck registered");
        Ok(id)
    }

    /// Contact and identity fields only. Score and block are left alone.
    pub async fn edit_truck(&self, actor: &Actor, id: &str, req: TruckEditRequest) -> Result<Truck, ApiError> {
        let (details, filter_timestamp) = req.validate()?;
        let edit = TruckEdit {
            key: decode_id(TRUCK_HRP, id)?,
            branch: actor.branch.clone(),
            filter_timestamp,
            updated: actor.stamp(TimeStamp::now()),
            details,
        };
        with_deadline(self.timeout, "edit_truck", self.store.edit_truck(edit)).await
    }

    pub async fn delete_truck(&self, actor: &Actor, id: &str) -> Result<Truck, ApiError> {
        let key = decode_id(TRUCK_HRP, id)?;
        let truck = with_deadline(
            self.timeout,
            "set_truck_deleted",
            self.store.set_truck_deleted(key, &actor.branch, true),
        )
        .await?;
        info!(truck_id = %id, "truck deactivated");
        Ok(truck)
    }

    pub async fn activate_truck(&self, actor: &Actor, id: &str) -> Result<Truck, ApiError> {
        let key = decode_id(TRUCK_HRP, id)?;
        let truck = with_deadline(
            self.timeout,
            "set_truck_deleted",
            self.store.set_truck_deleted(key, &actor.branch, false),
        )
        .await?;
        info!(truck_id = %id, "truck activated");
        Ok(truck)
    }

    pub async fn get_truck(&self, id: &str, branch_scope: Option<&str>) -> Result<Truck, ApiError> {
        let key = decode_id(TRUCK_HRP, id)?;
        with_deadline(self.timeout, "get_truck", self.store.get_truck(key, branch_scope)).await
    }

    pub async fn get_by_identity(&self, identity: &str, branch: &str) -> Result<Truck, ApiError> {
        let identity = normalize(identity);
        let branch = normalize(branch);
        with_deadline(
            self.timeout,
            "get_truck_by_identity",
            self.store.get_truck_by_identity(&identity, &branch),
        )
        .await
    }

    pub async fn find_trucks(&self, filter: &TruckFilter) -> Result<Vec<Truck>, ApiError> {
        with_deadline(self.timeout, "find_trucks", self.store.find_trucks(filter)).await
    }

    /// Maintenance operation: score back to zero. Admin or HSSE only.
    pub async fn reset_score(&self, actor: &Actor, id: &str) -> Result<Truck, ApiError> {
        actor.require_any(&[Role::Admin, Role::Hsse])?;
        let key = decode_id(TRUCK_HRP, id)?;
        let truck = with_deadline(
            self.timeout,
            "reset_score",
            self.store.reset_score(key, &actor.branch, actor.stamp(TimeStamp::now())),
        )
        .await?;
        info!(truck_id = %id, by = %actor.name, "truck score reset");
        Ok(truck)
    }

    /// Lift every block that has run its course. Returns how many trucks changed.
    pub async fn unblock_expired(&self) -> Result<usize, ApiError> {
        let lifted = with_deadline(
            self.timeout,
            "unblock_expired",
            self.store.unblock_expired(TimeStamp::now()),
        )
        .await?;
        for truck in &lifted {
            info!(truck_id = %truck.id, branch = %truck.branch, score = truck.score, "truck unblocked");
        }
        Ok(lifted.len())
    }
}
