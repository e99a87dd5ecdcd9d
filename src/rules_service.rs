//! Rule administration. Every mutation needs ADMIN or HSSE.
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::error::ApiError;
use super::rules::{Rule, RuleEdit, RuleEditRequest, RuleRequest};
use super::store::{RuleStore, with_deadline};
use super::types::{Actor, Role, TimeStamp};
use super::utils::{RULE_HRP, decode_id, new_doc_id, normalize};

const RULE_ADMINS: [Role; 2] = [Role::Admin, Role::Hsse];

pub struct RulesService<S: RuleStore + 'static> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: RuleStore + 'static> RulesService<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn insert_rule(&self, actor: &Actor, req: RuleRequest) -> Result<String, ApiError> {
        actor.require_any(&RULE_ADMINS)?;
        req.validate()?;
        let id = new_doc_id(RULE_HRP)?;
        let rule = Rule {
            id: id.encoded,
            branch: actor.branch.clone(),
            score: req.score,
            block_secs: req.block_secs,
            description: req.description.trim().to_string(),
            updated: actor.stamp(TimeStamp::now()),
        };
        let score = rule.score;
        let id = with_deadline(self.timeout, "insert_rule", self.store.insert_rule(id.key, rule)).await?;
        info!(rule_id = %id, branch = %actor.branch, score, "rule created");
        Ok(id)
    }

    pub async fn edit_rule(&self, actor: &Actor, id: &str, req: RuleEditRequest) -> Result<Rule, ApiError> {
        actor.require_any(&RULE_ADMINS)?;
        let (details, filter_timestamp) = req.validate()?;
        let edit = RuleEdit {
            key: decode_id(RULE_HRP, id)?,
            branch: actor.branch.clone(),
            filter_timestamp,
            updated: actor.stamp(TimeStamp::now()),
            details,
        };
        let rule = with_deadline(self.timeout, "edit_rule", self.store.edit_rule(edit)).await?;
        info!(rule_id = %id, score = rule.score, "rule edited");
        Ok(rule)
    }

    pub async fn delete_rule(&self, actor: &Actor, id: &str) -> Result<(), ApiError> {
        actor.require_any(&RULE_ADMINS)?;
        let key = decode_id(RULE_HRP, id)?;
        let rule = with_deadline(self.timeout, "delete_rule", self.store.delete_rule(key, &actor.branch)).await?;
        info!(rule_id = %id, score = rule.score, "rule deleted");
        Ok(())
    }

    pub async fn get_rule(&self, id: &str, branch_scope: Option<&str>) -> Result<Rule, ApiError> {
        let key = decode_id(RULE_HRP, id)?;
        with_deadline(self.timeout, "get_rule", self.store.get_rule(key, branch_scope)).await
    }

    /// Sorted by branch, then score.
    pub async fn find_rules(&self, branch: Option<&str>) -> Result<Vec<Rule>, ApiError> {
        let branch = branch.map(normalize).filter(|b| !b.is_empty());
        with_deadline(self.timeout, "find_rules", self.store.find_rules(branch.as_deref())).await
    }
}
