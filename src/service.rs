//! Service layer API for the violation workflow
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use super::certificate::DocumentGenerator;
use super::error::ApiError;
use super::notify::{MailJob, Notifier};
use super::rules::Rule;
use super::state::ViolationState;
use super::store::{ApprovalCommand, Repository, with_deadline};
use super::truck::Truck;
use super::types::{Actor, Role, TimeStamp};
use super::utils::{VIOLATION_HRP, decode_id, new_doc_id, normalize};
use super::violation::{
    StateChange, Violation, ViolationEdit, ViolationEditRequest, ViolationFilter, ViolationRequest,
    ViolationSummary,
};

pub struct ViolationService<R: Repository> {
    store: Arc<R>,
    documents: Arc<dyn DocumentGenerator>,
    notifier: Option<Notifier>,
    timeout: Duration,
}

impl<R: Repository> ViolationService<R> {
    pub fn new(store: Arc<R>, documents: Arc<dyn DocumentGenerator>, timeout: Duration) -> Self {
        Self {
            store,
            documents,
            notifier: None,
            timeout,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Load the violation behind `id`, scoped to `branch`.
    async fn load(&self, key: [u8; 16], branch: &str) -> Result<Violation, ApiError> {
        with_deadline(self.timeout, "get_violation", self.store.get_violation(key, Some(branch))).await
    }

    async fn truck_for(&self, identity: &str, branch: &str) -> Result<Truck, ApiError> {
        with_deadline(
            self.timeout,
            "get_truck_by_identity",
            self.store.get_truck_by_identity(identity, branch),
        )
        .await
    }

    /// Record a new violation against a registered truck. Any requested state
    /// other than NeedApprove is stored as Draft.
    pub async fn insert_violation(&self, actor: &Actor, req: ViolationRequest) -> Result<String, ApiError> {
        let kind = req.validate()?;
        let identity = normalize(&req.truck_identity);
        let truck = self.truck_for(&identity, &actor.branch).await?;

        let id = new_doc_id(VIOLATION_HRP)?;
        let now = TimeStamp::now();
        let audit = actor.stamp(now);
        let violation = Violation {
            id: id.encoded,
            branch: actor.branch.clone(),
            state: ViolationState::coerce_initial(req.state),
            truck_identity: truck.identity,
            plate: truck.plate,
            mark: truck.mark,
            owner: truck.owner,
            kind,
            detail: req.detail.trim().to_string(),
            occurred_at: req.occurred_at.unwrap_or(now),
            location: normalize(&req.location),
            images: Vec::new(),
            created: audit.clone(),
            updated: audit,
            approved: None,
            penalty_count: truck.score,
        };
        let state = violation.state;

        let id = with_deadline(
            self.timeout,
            "insert_violation",
            self.store.insert_violation(id.key, violation),
        )
        .await?;
        info!(violation_id = %id, branch = %actor.branch, %state, "violation recorded");
        Ok(id)
    }

    /// Field level edit guarded by the `updated.at` the caller last saw.
    pub async fn edit_violation(
        &self,
        actor: &Actor,
        id: &str,
        req: ViolationEditRequest,
    ) -> Result<Violation, ApiError> {
        let (kind, filter_timestamp) = req.validate()?;
        let key = decode_id(VIOLATION_HRP, id)?;
        let current = self.load(key, &actor.branch).await?;
        if current.state == ViolationState::Approved {
            return Err(ApiError::bad_request(format!(
                "violation in state {} can no longer be edited",
                current.state
            )));
        }
        let truck = self.truck_for(&normalize(&req.truck_identity), &actor.branch).await?;

        let edit = ViolationEdit {
            key,
            branch: actor.branch.clone(),
            filter_timestamp,
            updated: actor.stamp(TimeStamp::now()),
            truck_identity: truck.identity,
            plate: truck.plate,
            mark: truck.mark,
            owner: truck.owner,
            kind,
            detail: req.detail.trim().to_string(),
            occurred_at: req.occurred_at.unwrap_or(current.occurred_at),
            location: normalize(&req.location),
        };
        let edited = with_deadline(self.timeout, "edit_violation", self.store.edit_violation(edit)).await?;
        info!(violation_id = %id, branch = %actor.branch, "violation edited");
        Ok(edited)
    }

    async fn transition(
        &self,
        actor: &Actor,
        id: &str,
        expected: ViolationState,
        target: ViolationState,
    ) -> Result<Violation, ApiError> {
        let key = decode_id(VIOLATION_HRP, id)?;
        let current = self.load(key, &actor.branch).await?;
        if current.state != expected {
            return Err(ApiError::bad_request(format!(
                "document status cannot be changed to {target}"
            )));
        }

        let change = StateChange {
            key,
            branch: actor.branch.clone(),
            expected,
            target,
            updated: actor.stamp(TimeStamp::now()),
        };
        let changed = with_deadline(self.timeout, "change_state", self.store.change_state(change)).await?;
        info!(violation_id = %id, from = %expected, to = %target, "violation state changed");
        Ok(changed)
    }

    /// NeedApprove -> Draft.
    pub async fn send_to_draft(&self, actor: &Actor, id: &str) -> Result<Violation, ApiError> {
        self.transition(actor, id, ViolationState::NeedApprove, ViolationState::Draft)
            .await
    }

    /// Draft -> NeedApprove.
    pub async fn send_to_confirmation(&self, actor: &Actor, id: &str) -> Result<Violation, ApiError> {
        self.transition(actor, id, ViolationState::Draft, ViolationState::NeedApprove)
            .await
    }

    /// NeedApprove -> Approved, incrementing the truck score and applying the
    /// rule for the new score in the same commit. The certificate is rendered
    /// afterwards in the background.
    pub async fn approve(&self, actor: &Actor, id: &str) -> Result<Violation, ApiError> {
        actor.require_any(&[Role::Hsse])?;
        let key = decode_id(VIOLATION_HRP, id)?;
        let current = self.load(key, &actor.branch).await?;
        if current.state != ViolationState::NeedApprove {
            return Err(ApiError::bad_request(format!(
                "document status cannot be changed to {}",
                ViolationState::Approved
            )));
        }

        let command = ApprovalCommand {
            key,
            branch: actor.branch.clone(),
            approver: actor.stamp(TimeStamp::now()),
        };
        let outcome = with_deadline(self.timeout, "commit_approval", self.store.commit_approval(command)).await?;
        info!(
            violation_id = %id,
            truck = %outcome.truck.identity,
            score = outcome.truck.score,
            blocked = outcome.truck.blocked,
            "violation approved"
        );

        let rule = outcome
            .rule
            .clone()
            .unwrap_or_else(|| Rule::verbal_warning(&outcome.truck.branch, outcome.truck.score));
        self.spawn_certificate(outcome.violation.clone(), outcome.truck, rule);
        Ok(outcome.violation)
    }

    fn spawn_certificate(&self, violation: Violation, truck: Truck, rule: Rule) {
        let documents = Arc::clone(&self.documents);
        // detached: the approval has already committed
        tokio::task::spawn_blocking(move || {
            if let Err(err) = documents.generate(&violation, &truck, &rule) {
                error!(violation_id = %violation.id, error = %err, "failed to generate certificate");
            }
        });
    }

    /// Only Draft and NeedApprove documents can be removed.
    pub async fn delete_violation(&self, actor: &Actor, id: &str) -> Result<(), ApiError> {
        let key = decode_id(VIOLATION_HRP, id)?;
        let current = self.load(key, &actor.branch).await?;
        if !current.state.is_open() {
            return Err(ApiError::bad_request(format!(
                "violation in state {} cannot be deleted",
                current.state
            )));
        }
        with_deadline(
            self.timeout,
            "delete_violation",
            self.store.delete_violation(key, &actor.branch),
        )
        .await?;
        info!(violation_id = %id, branch = %actor.branch, "violation deleted");
        Ok(())
    }

    pub async fn push_image(&self, actor: &Actor, id: &str, path: &str) -> Result<Violation, ApiError> {
        let key = decode_id(VIOLATION_HRP, id)?;
        if path.trim().is_empty() {
            return Err(ApiError::bad_request("image: cannot be blank"));
        }
        with_deadline(
            self.timeout,
            "push_image",
            self.store.push_image(key, &actor.branch, path.trim()),
        )
        .await
    }

    pub async fn remove_image(&self, actor: &Actor, id: &str, path: &str) -> Result<Violation, ApiError> {
        let key = decode_id(VIOLATION_HRP, id)?;
        with_deadline(
            self.timeout,
            "remove_image",
            self.store.remove_image(key, &actor.branch, path.trim()),
        )
        .await
    }

    /// `branch_scope: None` looks across all branches.
    pub async fn get_violation_by_id(&self, id: &str, branch_scope: Option<&str>) -> Result<Violation, ApiError> {
        let key = decode_id(VIOLATION_HRP, id)?;
        let scope = branch_scope.map(normalize).filter(|b| !b.is_empty());
        with_deadline(
            self.timeout,
            "get_violation",
            self.store.get_violation(key, scope.as_deref()),
        )
        .await
    }

    pub async fn find_violations(&self, filter: ViolationFilter) -> Result<Vec<ViolationSummary>, ApiError> {
        let filter = filter.normalized();
        let found = with_deadline(self.timeout, "find_violations", self.store.find_violations(&filter)).await?;
        Ok(found.iter().map(ViolationSummary::from).collect())
    }

    /// Render the certificate of an approved violation again. The printed
    /// ordinal is the violation's position among its truck's approvals.
    /// Returns `None` when rendering failed; the failure is logged.
    pub async fn regenerate_certificate(&self, id: &str) -> Result<Option<PathBuf>, ApiError> {
        let key = decode_id(VIOLATION_HRP, id)?;
        let violation = with_deadline(self.timeout, "get_violation", self.store.get_violation(key, None)).await?;
        if violation.state != ViolationState::Approved {
            return Err(ApiError::bad_request(
                "certificate is only available for approved violations",
            ));
        }

        let filter = ViolationFilter {
            branch: Some(violation.branch.clone()),
            truck_identity: Some(violation.truck_identity.clone()),
            state: Some(ViolationState::Approved),
            limit: usize::MAX,
            ..Default::default()
        };
        let mut approved: Vec<Violation> = with_deadline(self.timeout, "find_violations", self.store.find_violations(&filter))
            .await?
            .into_iter()
            .filter(|v| v.truck_identity == violation.truck_identity)
            .collect();
        approved.sort_by_key(|v| v.approved.as_ref().map(|a| a.at));
        let position = approved
            .iter()
            .position(|v| v.id == violation.id)
            .ok_or_else(|| ApiError::internal("approved violation missing from its truck history", &violation.id))?;
        let ordinal = u32::try_from(position + 1)
            .map_err(|e| ApiError::internal("violation ordinal out of range", e))?;

        let rule = with_deadline(
            self.timeout,
            "get_rule_by_score",
            self.store.get_rule_by_score(ordinal, &violation.branch),
        )
        .await?
        .unwrap_or_else(|| Rule::verbal_warning(&violation.branch, ordinal));
        let truck = Truck::with_score_only(
            &violation.branch,
            &violation.truck_identity,
            ordinal,
            violation.updated.clone(),
        );

        let documents = Arc::clone(&self.documents);
        let rendered = tokio::task::spawn_blocking(move || {
            documents
                .generate(&violation, &truck, &rule)
                .map_err(|err| (violation.id.clone(), err))
        })
        .await
        .map_err(|e| ApiError::internal("certificate task failed", e))?;

        match rendered {
            Ok(path) => {
                info!(violation_id = %id, ordinal, path = %path.display(), "certificate regenerated");
                Ok(Some(path))
            }
            Err((violation_id, err)) => {
                error!(%violation_id, error = %err, "failed to regenerate certificate");
                Ok(None)
            }
        }
    }

    /// Queue a mail to the truck owner about an approved violation. Never
    /// waits for queue capacity; a full queue is reported as an internal error.
    pub async fn notify_owner(&self, actor: &Actor, id: &str) -> Result<MailJob, ApiError> {
        let notifier = self
            .notifier
            .as_ref()
            .ok_or_else(|| ApiError::internal("notifications are not configured", "no notifier"))?;
        let key = decode_id(VIOLATION_HRP, id)?;
        let violation = self.load(key, &actor.branch).await?;
        if violation.state != ViolationState::Approved {
            return Err(ApiError::bad_request(
                "only approved violations can be sent to the owner",
            ));
        }
        let truck = self.truck_for(&violation.truck_identity, &violation.branch).await?;
        if truck.email.is_empty() {
            return Err(ApiError::bad_request(format!(
                "truck {} has no email address",
                truck.identity
            )));
        }

        let job = MailJob {
            violation_id: violation.id,
            truck_identity: truck.identity,
            recipient: truck.email,
        };
        if !notifier.try_enqueue(job.clone()) {
            return Err(ApiError::internal(
                "notification queue is full, try again later",
                "queue at capacity",
            ));
        }
        info!(violation_id = %id, recipient = %job.recipient, "owner notification queued");
        Ok(job)
    }
}
