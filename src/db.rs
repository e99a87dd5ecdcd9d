//! sled backed implementation of every store contract
use std::path::Path;

use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, abort};
use sled::{IVec, Transactional, Tree};

use super::error::ApiError;
use super::rules::{Rule, RuleEdit};
use super::scoring;
use super::state::ViolationState;
use super::store::{
    ApprovalCommand, ApprovalLedger, ApprovalOutcome, RuleStore, TruckStore, ViolationStore,
};
use super::truck::{Truck, TruckEdit, TruckFilter};
use super::types::{Audit, TimeStamp};
use super::utils::{RULE_HRP, TRUCK_HRP, VIOLATION_HRP, encode_key};
use super::violation::{StateChange, Violation, ViolationEdit, ViolationFilter};

type TxResult<T> = ConflictableTransactionResult<T, ApiError>;

/// The sled trees behind a `Store`. Every method here blocks on sled and is
/// only ever called from the blocking pool.
#[derive(Clone)]
struct Trees {
    violations: Tree,
    trucks: Tree,
    truck_identity: Tree, // branch \0 identity -> truck key
    rules: Tree,
    rule_score: Tree, // branch \0 score(be) -> rule key
}

pub struct Store {
    db: sled::Db,
    trees: Trees,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        Self::from_db(sled::open(path)?)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, ApiError> {
        let trees = Trees {
            violations: db.open_tree("violations")?,
            trucks: db.open_tree("trucks")?,
            truck_identity: db.open_tree("truck_identity")?,
            rules: db.open_tree("rules")?,
            rule_score: db.open_tree("rule_score")?,
        };
        Ok(Self { db, trees })
    }

    pub fn flush(&self) -> Result<(), ApiError> {
        self.db.flush()?;
        Ok(())
    }

    /// Run `op` on the blocking pool. The returned future stays pending while
    /// sled works, so a caller's deadline can fire. A timed out operation still
    /// runs to completion in the background.
    async fn run<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Trees) -> Result<T, ApiError> + Send + 'static,
    {
        run_blocking(self.trees.clone(), op).await
    }
}

async fn run_blocking<T, F>(trees: Trees, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Trees) -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&trees))
        .await
        .map_err(|e| ApiError::internal("store task failed", e))?
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, ApiError> {
    Ok(minicbor::to_vec(value)?)
}

fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T, ApiError> {
    Ok(minicbor::decode(bytes)?)
}

fn tx_encode<T: minicbor::Encode<()>>(value: &T) -> TxResult<Vec<u8>> {
    encode(value).map_err(ConflictableTransactionError::Abort)
}

fn tx_decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> TxResult<T> {
    decode(bytes).map_err(ConflictableTransactionError::Abort)
}

fn identity_key(branch: &str, identity: &str) -> Vec<u8> {
    let mut key = branch.as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(identity.as_bytes());
    key
}

fn score_key(branch: &str, score: u32) -> Vec<u8> {
    let mut key = branch.as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(&score.to_be_bytes());
    key
}

fn describe(hrp: &str, key: &[u8; 16]) -> String {
    encode_key(hrp, key).unwrap_or_else(|_| "<unprintable id>".to_string())
}

fn branch_matches(doc_branch: &str, wanted: Option<&str>) -> bool {
    wanted.is_none_or(|b| b == doc_branch)
}

impl Trees {
    fn insert_violation(&self, key: [u8; 16], violation: Violation) -> Result<String, ApiError> {
        self.violations.insert(&key[..], encode(&violation)?)?;
        Ok(violation.id)
    }

    fn edit_violation(&self, edit: ViolationEdit) -> Result<Violation, ApiError> {
        let edited = self.violations.transaction(|tx| {
            let not_updated = || ApiError::bad_request("violation not updated: id/timestamp validation failed");

            let Some(bytes) = tx.get(&edit.key[..])? else {
                return abort(not_updated());
            };
            let mut v: Violation = tx_decode(&bytes)?;
            if v.branch != edit.branch || v.updated.at != edit.filter_timestamp {
                return abort(not_updated());
            }
            if !v.state.is_open() {
                return abort(ApiError::bad_request(format!(
                    "violation in state {} can no longer be edited",
                    v.state
                )));
            }

            let mut updated = edit.updated.clone();
            if updated.at <= v.updated.at {
                updated.at = TimeStamp::after(v.updated.at);
            }
            v.truck_identity = edit.truck_identity.clone();
            v.plate = edit.plate.clone();
            v.mark = edit.mark.clone();
            v.owner = edit.owner.clone();
            v.kind = edit.kind;
            v.detail = edit.detail.clone();
            v.occurred_at = edit.occurred_at;
            v.location = edit.location.clone();
            v.updated = updated;

            tx.insert(&edit.key[..], tx_encode(&v)?)?;
            Ok(v)
        })?;
        Ok(edited)
    }

    fn change_state(&self, change: StateChange) -> Result<Violation, ApiError> {
        let changed = self.violations.transaction(|tx| {
            let not_updated =
                || ApiError::bad_request("violation not updated: id/branch/state validation failed");

            let Some(bytes) = tx.get(&change.key[..])? else {
                return abort(not_updated());
            };
            let mut v: Violation = tx_decode(&bytes)?;
            if v.branch != change.branch || v.state != change.expected {
                return abort(not_updated());
            }

            let mut updated = change.updated.clone();
            if updated.at <= v.updated.at {
                updated.at = TimeStamp::after(v.updated.at);
            }
            v.state = change.target;
            v.updated = updated;
            v.approved = None;

            tx.insert(&change.key[..], tx_encode(&v)?)?;
            Ok(v)
        })?;
        Ok(changed)
    }

    fn delete_violation(&self, key: [u8; 16], branch: &str) -> Result<Violation, ApiError> {
        let deleted = self.violations.transaction(|tx| {
            let not_deleted =
                || ApiError::bad_request("violation not deleted: id/branch/state validation failed");

            let Some(bytes) = tx.get(&key[..])? else {
                return abort(not_deleted());
            };
            let v: Violation = tx_decode(&bytes)?;
            if v.branch != branch || !v.state.is_open() {
                return abort(not_deleted());
            }
            tx.remove(&key[..])?;
            Ok(v)
        })?;
        Ok(deleted)
    }

    fn push_image(&self, key: [u8; 16], branch: &str, path: &str) -> Result<Violation, ApiError> {
        let v = self.violations.transaction(|tx| {
            let missing = || {
                ApiError::bad_request(format!(
                    "failed to attach image, violation {} not found",
                    describe(VIOLATION_HRP, &key)
                ))
            };
            let Some(bytes) = tx.get(&key[..])? else {
                return abort(missing());
            };
            let mut v: Violation = tx_decode(&bytes)?;
            if v.branch != branch {
                return abort(missing());
            }
            v.images.push(path.to_string());
            tx.insert(&key[..], tx_encode(&v)?)?;
            Ok(v)
        })?;
        Ok(v)
    }

    fn remove_image(&self, key: [u8; 16], branch: &str, path: &str) -> Result<Violation, ApiError> {
        let v = self.violations.transaction(|tx| {
            let missing = || {
                ApiError::bad_request(format!(
                    "failed to remove image, violation {} not found",
                    describe(VIOLATION_HRP, &key)
                ))
            };
            let Some(bytes) = tx.get(&key[..])? else {
                return abort(missing());
            };
            let mut v: Violation = tx_decode(&bytes)?;
            if v.branch != branch {
                return abort(missing());
            }
            v.images.retain(|image| image != path);
            tx.insert(&key[..], tx_encode(&v)?)?;
            Ok(v)
        })?;
        Ok(v)
    }

    fn get_violation(&self, key: [u8; 16], branch: Option<&str>) -> Result<Violation, ApiError> {
        let not_found = || {
            ApiError::not_found(format!(
                "violation with id {} not found",
                describe(VIOLATION_HRP, &key)
            ))
        };
        let bytes = self.violations.get(&key[..])?.ok_or_else(not_found)?;
        let v: Violation = decode(&bytes)?;
        if !branch_matches(&v.branch, branch) {
            return Err(not_found());
        }
        Ok(v)
    }

    fn find_violations(&self, filter: &ViolationFilter) -> Result<Vec<Violation>, ApiError> {
        let mut found = Vec::new();
        // uuid7 keys: reverse key order is newest first
        for entry in self.violations.iter().rev() {
            let (_, bytes) = entry?;
            let v: Violation = decode(&bytes)?;
            if filter.matches(&v) {
                found.push(v);
                if found.len() >= filter.limit {
                    break;
                }
            }
        }
        Ok(found)
    }
}

impl Trees {
    fn insert_truck(&self, key: [u8; 16], truck: Truck) -> Result<String, ApiError> {
        (&self.trucks, &self.truck_identity).transaction(|(trucks, identities)| {
            let index = identity_key(&truck.branch, &truck.identity);
            if identities.get(index.as_slice())?.is_some() {
                return abort(ApiError::bad_request(format!(
                    "truck identity {} is already registered",
                    truck.identity
                )));
            }
            identities.insert(index, &key[..])?;
            trucks.insert(&key[..], tx_encode(&truck)?)?;
            Ok(())
        })?;
        Ok(truck.id)
    }

    fn edit_truck(&self, edit: TruckEdit) -> Result<Truck, ApiError> {
        let edited = (&self.trucks, &self.truck_identity).transaction(|(trucks, identities)| {
            let not_updated = || ApiError::bad_request("truck not updated: id/timestamp validation failed");

            let Some(bytes) = trucks.get(&edit.key[..])? else {
                return abort(not_updated());
            };
            let mut truck: Truck = tx_decode(&bytes)?;
            if truck.branch != edit.branch || truck.updated.at != edit.filter_timestamp {
                return abort(not_updated());
            }

            let details = &edit.details;
            if details.identity != truck.identity {
                let index = identity_key(&truck.branch, &details.identity);
                if identities.get(index.as_slice())?.is_some() {
                    return abort(ApiError::bad_request(format!(
                        "truck identity {} is already registered",
                        details.identity
                    )));
                }
                identities.remove(identity_key(&truck.branch, &truck.identity))?;
                identities.insert(index, &edit.key[..])?;
            }

            let mut updated = edit.updated.clone();
            if updated.at <= truck.updated.at {
                updated.at = TimeStamp::after(truck.updated.at);
            }
            truck.identity = details.identity.clone();
            truck.plate = details.plate.clone();
            truck.mark = details.mark.clone();
            truck.owner = details.owner.clone();
            truck.email = details.email.clone();
            truck.phone = details.phone.clone();
            truck.updated = updated;

            trucks.insert(&edit.key[..], tx_encode(&truck)?)?;
            Ok(truck)
        })?;
        Ok(edited)
    }

    fn set_truck_deleted(&self, key: [u8; 16], branch: &str, deleted: bool) -> Result<Truck, ApiError> {
        let truck = self.trucks.transaction(|tx| {
            let not_updated = || ApiError::bad_request("truck not updated: id/branch validation failed");

            let Some(bytes) = tx.get(&key[..])? else {
                return abort(not_updated());
            };
            let mut truck: Truck = tx_decode(&bytes)?;
            if truck.branch != branch {
                return abort(not_updated());
            }
            truck.deleted = deleted;
            tx.insert(&key[..], tx_encode(&truck)?)?;
            Ok(truck)
        })?;
        Ok(truck)
    }

    fn get_truck(&self, key: [u8; 16], branch: Option<&str>) -> Result<Truck, ApiError> {
        let not_found =
            || ApiError::not_found(format!("truck with id {} not found", describe(TRUCK_HRP, &key)));
        let bytes = self.trucks.get(&key[..])?.ok_or_else(not_found)?;
        let truck: Truck = decode(&bytes)?;
        if !branch_matches(&truck.branch, branch) {
            return Err(not_found());
        }
        Ok(truck)
    }

    fn get_truck_by_identity(&self, identity: &str, branch: &str) -> Result<Truck, ApiError> {
        let not_found = || {
            ApiError::not_found(format!(
                "truck with identity {identity} not found in branch {branch}"
            ))
        };
        let truck_key = self
            .truck_identity
            .get(identity_key(branch, identity))?
            .ok_or_else(not_found)?;
        let bytes = self.trucks.get(&truck_key)?.ok_or_else(not_found)?;
        decode(&bytes)
    }

    fn find_trucks(&self, filter: &TruckFilter) -> Result<Vec<Truck>, ApiError> {
        let mut found = Vec::new();
        for entry in self.trucks.iter() {
            let (_, bytes) = entry?;
            let truck: Truck = decode(&bytes)?;
            if filter.matches(&truck) {
                found.push(truck);
            }
        }
        found.sort_by(|a, b| a.owner.cmp(&b.owner).then_with(|| a.identity.cmp(&b.identity)));
        Ok(found)
    }

    fn reset_score(&self, key: [u8; 16], branch: &str, by: Audit) -> Result<Truck, ApiError> {
        let truck = self.trucks.transaction(|tx| {
            let not_updated = || ApiError::bad_request("truck score not reset: id/branch validation failed");

            let Some(bytes) = tx.get(&key[..])? else {
                return abort(not_updated());
            };
            let mut truck: Truck = tx_decode(&bytes)?;
            if truck.branch != branch {
                return abort(not_updated());
            }
            let mut updated = by.clone();
            if updated.at <= truck.updated.at {
                updated.at = TimeStamp::after(truck.updated.at);
            }
            truck.score = 0;
            truck.reset_score_at = Some(updated.at);
            truck.updated = updated;
            tx.insert(&key[..], tx_encode(&truck)?)?;
            Ok(truck)
        })?;
        Ok(truck)
    }

    fn unblock_expired(&self, now: TimeStamp) -> Result<Vec<Truck>, ApiError> {
        let mut candidates: Vec<IVec> = Vec::new();
        for entry in self.trucks.iter() {
            let (key, bytes) = entry?;
            let truck: Truck = decode(&bytes)?;
            if truck.block_expired(now) {
                candidates.push(key);
            }
        }

        let mut lifted = Vec::new();
        for key in candidates {
            // re-checked inside the transaction so a fresh block is never lifted
            let changed = self.trucks.transaction(|tx| -> TxResult<Option<Truck>> {
                let Some(bytes) = tx.get(&key)? else {
                    return Ok(None);
                };
                let mut truck: Truck = tx_decode(&bytes)?;
                if !truck.block_expired(now) {
                    return Ok(None);
                }
                truck.blocked = false;
                tx.insert(key.clone(), tx_encode(&truck)?)?;
                Ok(Some(truck))
            })?;
            lifted.extend(changed);
        }
        Ok(lifted)
    }
}

impl Trees {
    fn insert_rule(&self, key: [u8; 16], rule: Rule) -> Result<String, ApiError> {
        (&self.rules, &self.rule_score).transaction(|(rules, scores)| {
            let index = score_key(&rule.branch, rule.score);
            if scores.get(index.as_slice())?.is_some() {
                return abort(ApiError::bad_request(format!(
                    "a rule for score {} already exists, edit it instead",
                    rule.score
                )));
            }
            scores.insert(index, &key[..])?;
            rules.insert(&key[..], tx_encode(&rule)?)?;
            Ok(())
        })?;
        Ok(rule.id)
    }

    fn edit_rule(&self, edit: RuleEdit) -> Result<Rule, ApiError> {
        let edited = (&self.rules, &self.rule_score).transaction(|(rules, scores)| {
            let not_updated = || ApiError::bad_request("rule not updated: id/timestamp validation failed");

            let Some(bytes) = rules.get(&edit.key[..])? else {
                return abort(not_updated());
            };
            let mut rule: Rule = tx_decode(&bytes)?;
            if rule.branch != edit.branch || rule.updated.at != edit.filter_timestamp {
                return abort(not_updated());
            }

            let details = &edit.details;
            if details.score != rule.score {
                let index = score_key(&rule.branch, details.score);
                if scores.get(index.as_slice())?.is_some() {
                    return abort(ApiError::bad_request(format!(
                        "a rule for score {} already exists, edit it instead",
                        details.score
                    )));
                }
                scores.remove(score_key(&rule.branch, rule.score))?;
                scores.insert(index, &edit.key[..])?;
            }

            let mut updated = edit.updated.clone();
            if updated.at <= rule.updated.at {
                updated.at = TimeStamp::after(rule.updated.at);
            }
            rule.score = details.score;
            rule.block_secs = details.block_secs;
            rule.description = details.description.clone();
            rule.updated = updated;

            rules.insert(&edit.key[..], tx_encode(&rule)?)?;
            Ok(rule)
        })?;
        Ok(edited)
    }

    fn delete_rule(&self, key: [u8; 16], branch: &str) -> Result<Rule, ApiError> {
        let deleted = (&self.rules, &self.rule_score).transaction(|(rules, scores)| {
            let not_deleted = || ApiError::bad_request("rule not deleted: id/branch validation failed");

            let Some(bytes) = rules.get(&key[..])? else {
                return abort(not_deleted());
            };
            let rule: Rule = tx_decode(&bytes)?;
            if rule.branch != branch {
                return abort(not_deleted());
            }
            scores.remove(score_key(&rule.branch, rule.score))?;
            rules.remove(&key[..])?;
            Ok(rule)
        })?;
        Ok(deleted)
    }

    fn get_rule(&self, key: [u8; 16], branch: Option<&str>) -> Result<Rule, ApiError> {
        let not_found =
            || ApiError::not_found(format!("rule with id {} not found", describe(RULE_HRP, &key)));
        let bytes = self.rules.get(&key[..])?.ok_or_else(not_found)?;
        let rule: Rule = decode(&bytes)?;
        if !branch_matches(&rule.branch, branch) {
            return Err(not_found());
        }
        Ok(rule)
    }

    fn get_rule_by_score(&self, score: u32, branch: &str) -> Result<Option<Rule>, ApiError> {
        let Some(rule_key) = self.rule_score.get(score_key(branch, score))? else {
            return Ok(None);
        };
        match self.rules.get(&rule_key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn find_rules(&self, branch: Option<&str>) -> Result<Vec<Rule>, ApiError> {
        let mut found = Vec::new();
        for entry in self.rules.iter() {
            let (_, bytes) = entry?;
            let rule: Rule = decode(&bytes)?;
            if branch_matches(&rule.branch, branch) {
                found.push(rule);
            }
        }
        found.sort_by(|a, b| a.branch.cmp(&b.branch).then_with(|| a.score.cmp(&b.score)));
        Ok(found)
    }
}

impl Trees {
    fn commit_approval(&self, command: ApprovalCommand) -> Result<ApprovalOutcome, ApiError> {
        let trees = (
            &self.violations,
            &self.trucks,
            &self.truck_identity,
            &self.rules,
            &self.rule_score,
        );
        let outcome = trees.transaction(|(violations, trucks, identities, rules, scores)| {
            let key = &command.key[..];
            let Some(bytes) = violations.get(key)? else {
                return abort(ApiError::not_found(format!(
                    "violation with id {} not found",
                    describe(VIOLATION_HRP, &command.key)
                )));
            };
            let mut violation: Violation = tx_decode(&bytes)?;
            if violation.branch != command.branch {
                return abort(ApiError::bad_request(
                    "violation not updated: id/branch/state validation failed",
                ));
            }
            if violation.state != ViolationState::NeedApprove {
                return abort(ApiError::bad_request(format!(
                    "document status cannot be changed to {}",
                    ViolationState::Approved
                )));
            }

            let truck_missing = || {
                ApiError::not_found(format!(
                    "truck with identity {} not found in branch {}",
                    violation.truck_identity, violation.branch
                ))
            };
            let Some(truck_key) =
                identities.get(identity_key(&violation.branch, &violation.truck_identity))?
            else {
                return abort(truck_missing());
            };
            let Some(bytes) = trucks.get(&truck_key)? else {
                return abort(truck_missing());
            };
            let mut truck: Truck = tx_decode(&bytes)?;

            let score = scoring::next_score(truck.score).map_err(ConflictableTransactionError::Abort)?;
            let rule: Option<Rule> = match scores.get(score_key(&truck.branch, score))? {
                Some(rule_key) => match rules.get(&rule_key)? {
                    Some(bytes) => Some(tx_decode(&bytes)?),
                    None => None,
                },
                None => None,
            };
            let change = scoring::score_change(&truck, rule.as_ref(), command.approver.at)
                .map_err(ConflictableTransactionError::Abort)?;
            change.apply(&mut truck);

            let mut approver = command.approver.clone();
            if approver.at <= violation.updated.at {
                approver.at = TimeStamp::after(violation.updated.at);
            }
            violation.state = ViolationState::Approved;
            violation.updated = approver.clone();
            violation.approved = Some(approver);
            violation.penalty_count = change.score;

            violations.insert(key, tx_encode(&violation)?)?;
            trucks.insert(truck_key, tx_encode(&truck)?)?;
            Ok(ApprovalOutcome {
                violation,
                truck,
                rule,
            })
        })?;
        Ok(outcome)
    }
}

#[async_trait]
impl ViolationStore for Store {
    async fn insert_violation(&self, key: [u8; 16], violation: Violation) -> Result<String, ApiError> {
        self.run(move |t| t.insert_violation(key, violation)).await
    }

    async fn edit_violation(&self, edit: ViolationEdit) -> Result<Violation, ApiError> {
        self.run(move |t| t.edit_violation(edit)).await
    }

    async fn change_state(&self, change: StateChange) -> Result<Violation, ApiError> {
        self.run(move |t| t.change_state(change)).await
    }

    async fn delete_violation(&self, key: [u8; 16], branch: &str) -> Result<Violation, ApiError> {
        let branch = branch.to_string();
        self.run(move |t| t.delete_violation(key, &branch)).await
    }

    async fn push_image(&self, key: [u8; 16], branch: &str, path: &str) -> Result<Violation, ApiError> {
        let (branch, path) = (branch.to_string(), path.to_string());
        self.run(move |t| t.push_image(key, &branch, &path)).await
    }

    async fn remove_image(&self, key: [u8; 16], branch: &str, path: &str) -> Result<Violation, ApiError> {
        let (branch, path) = (branch.to_string(), path.to_string());
        self.run(move |t| t.remove_image(key, &branch, &path)).await
    }

    async fn get_violation(&self, key: [u8; 16], branch: Option<&str>) -> Result<Violation, ApiError> {
        let branch = branch.map(str::to_string);
        self.run(move |t| t.get_violation(key, branch.as_deref())).await
    }

    async fn find_violations(&self, filter: &ViolationFilter) -> Result<Vec<Violation>, ApiError> {
        let filter = filter.clone();
        self.run(move |t| t.find_violations(&filter)).await
    }
}

#[async_trait]
impl TruckStore for Store {
    async fn insert_truck(&self, key: [u8; 16], truck: Truck) -> Result<String, ApiError> {
        self.run(move |t| t.insert_truck(key, truck)).await
    }

    async fn edit_truck(&self, edit: TruckEdit) -> Result<Truck, ApiError> {
        self.run(move |t| t.edit_truck(edit)).await
    }

    async fn set_truck_deleted(&self, key: [u8; 16], branch: &str, deleted: bool) -> Result<Truck, ApiError> {
        let branch = branch.to_string();
        self.run(move |t| t.set_truck_deleted(key, &branch, deleted)).await
    }

    async fn get_truck(&self, key: [u8; 16], branch: Option<&str>) -> Result<Truck, ApiError> {
        let branch = branch.map(str::to_string);
        self.run(move |t| t.get_truck(key, branch.as_deref())).await
    }

    async fn get_truck_by_identity(&self, identity: &str, branch: &str) -> Result<Truck, ApiError> {
        let (identity, branch) = (identity.to_string(), branch.to_string());
        self.run(move |t| t.get_truck_by_identity(&identity, &branch)).await
    }

    async fn find_trucks(&self, filter: &TruckFilter) -> Result<Vec<Truck>, ApiError> {
        let filter = filter.clone();
        self.run(move |t| t.find_trucks(&filter)).await
    }

    async fn reset_score(&self, key: [u8; 16], branch: &str, by: Audit) -> Result<Truck, ApiError> {
        let branch = branch.to_string();
        self.run(move |t| t.reset_score(key, &branch, by)).await
    }

    async fn unblock_expired(&self, now: TimeStamp) -> Result<Vec<Truck>, ApiError> {
        self.run(move |t| t.unblock_expired(now)).await
    }
}

#[async_trait]
impl RuleStore for Store {
    async fn insert_rule(&self, key: [u8; 16], rule: Rule) -> Result<String, ApiError> {
        self.run(move |t| t.insert_rule(key, rule)).await
    }

    async fn edit_rule(&self, edit: RuleEdit) -> Result<Rule, ApiError> {
        self.run(move |t| t.edit_rule(edit)).await
    }

    async fn delete_rule(&self, key: [u8; 16], branch: &str) -> Result<Rule, ApiError> {
        let branch = branch.to_string();
        self.run(move |t| t.delete_rule(key, &branch)).await
    }

    async fn get_rule(&self, key: [u8; 16], branch: Option<&str>) -> Result<Rule, ApiError> {
        let branch = branch.map(str::to_string);
        self.run(move |t| t.get_rule(key, branch.as_deref())).await
    }

    async fn get_rule_by_score(&self, score: u32, branch: &str) -> Result<Option<Rule>, ApiError> {
        let branch = branch.to_string();
        self.run(move |t| t.get_rule_by_score(score, &branch)).await
    }

    async fn find_rules(&self, branch: Option<&str>) -> Result<Vec<Rule>, ApiError> {
        let branch = branch.map(str::to_string);
        self.run(move |t| t.find_rules(branch.as_deref())).await
    }
}

#[async_trait]
impl ApprovalLedger for Store {
    async fn commit_approval(&self, command: ApprovalCommand) -> Result<ApprovalOutcome, ApiError> {
        self.run(move |t| t.commit_approval(command)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::with_deadline;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn trees() -> (tempfile::TempDir, Trees) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        (dir, store.trees.clone())
    }

    #[tokio::test]
    async fn slow_sled_work_does_not_outlive_the_deadline() {
        let (_dir, trees) = trees();
        let started = Instant::now();
        let slow = run_blocking(trees, |_| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        });

        let err = with_deadline(Duration::from_millis(10), "slow_sled", slow)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn blocking_pool_returns_store_results() {
        let (_dir, trees) = trees();
        let err = run_blocking(trees, |t| t.get_truck([7; 16], None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
