//! Store contracts the services are written against.
//!
//! Every conditional operation filters on id and branch (and, for edits, the
//! last seen `updated.at`). A filter that no longer matches reports
//! `BadRequest` instead of overwriting.
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::error::ApiError;
use super::rules::{Rule, RuleEdit};
use super::truck::{Truck, TruckEdit, TruckFilter};
use super::types::{Audit, TimeStamp};
use super::violation::{StateChange, Violation, ViolationEdit, ViolationFilter};

#[async_trait]
pub trait ViolationStore: Send + Sync {
    /// Returns the external id of the stored document.
    async fn insert_violation(&self, key: [u8; 16], violation: Violation) -> Result<String, ApiError>;
    async fn edit_violation(&self, edit: ViolationEdit) -> Result<Violation, ApiError>;
    /// Applies `change` only while the document is still in `change.expected`.
    async fn change_state(&self, change: StateChange) -> Result<Violation, ApiError>;
    /// Refuses anything that is not Draft or NeedApprove.
    async fn delete_violation(&self, key: [u8; 16], branch: &str) -> Result<Violation, ApiError>;
    async fn push_image(&self, key: [u8; 16], branch: &str, path: &str) -> Result<Violation, ApiError>;
    async fn remove_image(&self, key: [u8; 16], branch: &str, path: &str) -> Result<Violation, ApiError>;
    /// `branch: None` searches every branch.
    async fn get_violation(&self, key: [u8; 16], branch: Option<&str>) -> Result<Violation, ApiError>;
    /// Newest first, at most `filter.limit` documents.
    async fn find_violations(&self, filter: &ViolationFilter) -> Result<Vec<Violation>, ApiError>;
}

#[async_trait]
pub trait TruckStore: Send + Sync {
    async fn insert_truck(&self, key: [u8; 16], truck: Truck) -> Result<String, ApiError>;
    async fn edit_truck(&self, edit: TruckEdit) -> Result<Truck, ApiError>;
    async fn set_truck_deleted(&self, key: [u8; 16], branch: &str, deleted: bool) -> Result<Truck, ApiError>;
    async fn get_truck(&self, key: [u8; 16], branch: Option<&str>) -> Result<Truck, ApiError>;
    async fn get_truck_by_identity(&self, identity: &str, branch: &str) -> Result<Truck, ApiError>;
    async fn find_trucks(&self, filter: &TruckFilter) -> Result<Vec<Truck>, ApiError>;
    async fn reset_score(&self, key: [u8; 16], branch: &str, by: Audit) -> Result<Truck, ApiError>;
    /// Lifts every block whose window ended at or before `now`. Returns the trucks it changed.
    async fn unblock_expired(&self, now: TimeStamp) -> Result<Vec<Truck>, ApiError>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn insert_rule(&self, key: [u8; 16], rule: Rule) -> Result<String, ApiError>;
    async fn edit_rule(&self, edit: RuleEdit) -> Result<Rule, ApiError>;
    async fn delete_rule(&self, key: [u8; 16], branch: &str) -> Result<Rule, ApiError>;
    async fn get_rule(&self, key: [u8; 16], branch: Option<&str>) -> Result<Rule, ApiError>;
    async fn get_rule_by_score(&self, score: u32, branch: &str) -> Result<Option<Rule>, ApiError>;
    async fn find_rules(&self, branch: Option<&str>) -> Result<Vec<Rule>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ApprovalCommand {
    pub key: [u8; 16],
    pub branch: String,
    pub approver: Audit,
}

#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub violation: Violation,
    pub truck: Truck,
    pub rule: Option<Rule>,
}

#[async_trait]
pub trait ApprovalLedger: Send + Sync {
    /// NeedApprove -> Approved together with the truck score and block update,
    /// committed as one unit.
    async fn commit_approval(&self, command: ApprovalCommand) -> Result<ApprovalOutcome, ApiError>;
}

pub trait Repository: ViolationStore + TruckStore + RuleStore + ApprovalLedger + 'static {}

impl<T> Repository for T where T: ViolationStore + TruckStore + RuleStore + ApprovalLedger + 'static {}

/// Bound a store call. Expiry is reported as an internal error; nothing is retried.
pub async fn with_deadline<T, F>(timeout: Duration, op: &'static str, fut: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(op, timeout_ms = timeout.as_millis() as u64, "store operation timed out");
            Err(ApiError::internal(
                "store operation timed out",
                format!("{op} exceeded {}ms", timeout.as_millis()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_expires_as_internal_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ApiError>(())
        };
        let err = with_deadline(Duration::from_millis(10), "slow_op", slow)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 500);
    }

    #[tokio::test]
    async fn deadline_passes_results_through() {
        let fast = async { Err::<(), _>(ApiError::not_found("gone")) };
        let err = with_deadline(Duration::from_secs(1), "fast_op", fast)
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::not_found("gone"));
    }
}
