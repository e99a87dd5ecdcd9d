//! Scoring and blocking policy applied on approval.
//!
//! Every approval adds exactly one point. The rule table is consulted with
//! the new score only, so rules are sparse point entries and the lookup is a
//! single key read.
use super::error::ApiError;
use super::rules::Rule;
use super::truck::{BlockWindow, ScoreChange, Truck};
use super::types::TimeStamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sanction {
    /// No rule for this score.
    Unruled,
    /// A rule with a zero block time.
    Warning,
    Block(BlockWindow),
}

pub fn next_score(current: u32) -> Result<u32, ApiError> {
    current
        .checked_add(1)
        .ok_or_else(|| ApiError::internal("truck score overflow", current))
}

pub fn sanction_for(rule: Option<&Rule>, now: TimeStamp) -> Result<Sanction, ApiError> {
    let Some(rule) = rule else {
        return Ok(Sanction::Unruled);
    };
    if !rule.blocks() {
        return Ok(Sanction::Warning);
    }
    BlockWindow::starting(now, rule.block_secs)
        .map(Sanction::Block)
        .ok_or_else(|| ApiError::internal("block window out of range", rule.block_secs))
}

/// The truck fields after one more approval. `rule` must be the rule for the
/// incremented score. Without a blocking rule the block fields stay as they were.
pub fn score_change(truck: &Truck, rule: Option<&Rule>, now: TimeStamp) -> Result<ScoreChange, ApiError> {
    let score = next_score(truck.score)?;
    if let Some(rule) = rule {
        if rule.score != score || rule.branch != truck.branch {
            return Err(ApiError::internal(
                "rule does not match the truck score",
                format!("rule {} for score {}", rule.id, rule.score),
            ));
        }
    }

    let change = match sanction_for(rule, now)? {
        Sanction::Block(window) => ScoreChange {
            score,
            blocked: true,
            block: Some(window),
        },
        Sanction::Unruled | Sanction::Warning => ScoreChange {
            score,
            blocked: truck.blocked,
            block: truck.block,
        },
    };
    Ok(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Audit;

    fn truck(score: u32) -> Truck {
        let audit = Audit {
            at: TimeStamp::now(),
            by: "test".into(),
            by_id: "t".into(),
        };
        Truck::with_score_only("BJM", "TR-01", score, audit)
    }

    fn rule(score: u32, block_secs: u64) -> Rule {
        Rule {
            block_secs,
            ..Rule::verbal_warning("BJM", score)
        }
    }

    #[test]
    fn no_rule_only_increments() {
        let change = score_change(&truck(0), None, TimeStamp::now()).unwrap();
        assert_eq!(change.score, 1);
        assert!(!change.blocked);
        assert_eq!(change.block, None);
    }

    #[test]
    fn warning_rule_does_not_block() {
        let change = score_change(&truck(0), Some(&rule(1, 0)), TimeStamp::now()).unwrap();
        assert_eq!(change.score, 1);
        assert!(!change.blocked);
    }

    #[test]
    fn blocking_rule_opens_window() {
        let now = TimeStamp::now();
        let change = score_change(&truck(2), Some(&rule(3, 86_400)), now).unwrap();
        assert_eq!(change.score, 3);
        assert!(change.blocked);
        let window = change.block.unwrap();
        assert_eq!(window.start, now);
        assert_eq!(window.len_secs(), 86_400);
    }

    #[test]
    fn unruled_score_keeps_existing_block() {
        let now = TimeStamp::now();
        let mut t = truck(3);
        t.blocked = true;
        t.block = BlockWindow::starting(now, 60);

        let change = score_change(&t, None, now).unwrap();
        assert_eq!(change.score, 4);
        assert!(change.blocked);
        assert_eq!(change.block, t.block);
    }

    #[test]
    fn mismatched_rule_is_rejected() {
        assert!(score_change(&truck(0), Some(&rule(5, 60)), TimeStamp::now()).is_err());
    }

    #[test]
    fn score_cannot_overflow() {
        assert!(next_score(u32::MAX).is_err());
    }
}
