//! Sanction rules keyed by (branch, score)
use super::error::ApiError;
use super::types::{Audit, TimeStamp};

/// Longest block a rule may impose, ten years.
pub const MAX_BLOCK_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub branch: String,
    #[n(2)]
    pub score: u32,
    #[n(3)]
    pub block_secs: u64, // 0 is a warning without blocking
    #[n(4)]
    pub description: String,
    #[n(5)]
    pub updated: Audit,
}

impl Rule {
    /// Used on the certificate when no rule matched the score.
    pub fn verbal_warning(branch: &str, score: u32) -> Self {
        Self {
            id: String::new(),
            branch: branch.to_string(),
            score,
            block_secs: 0,
            description: "Verbal warning given.".to_string(),
            updated: Audit {
                at: TimeStamp::now(),
                by: String::new(),
                by_id: String::new(),
            },
        }
    }

    pub fn blocks(&self) -> bool {
        self.block_secs > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleRequest {
    pub score: u32,
    pub block_secs: u64,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct RuleEditRequest {
    pub filter_timestamp: Option<TimeStamp>,
    pub score: u32,
    pub block_secs: u64,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct RuleEdit {
    pub key: [u8; 16],
    pub branch: String,
    pub filter_timestamp: TimeStamp,
    pub updated: Audit,
    pub details: RuleRequest,
}

impl RuleRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.score == 0 {
            return Err(ApiError::bad_request("score: must be at least 1"));
        }
        if self.block_secs > MAX_BLOCK_SECS {
            return Err(ApiError::bad_request(format!(
                "block_time: must not exceed {MAX_BLOCK_SECS} seconds"
            )));
        }
        if self.description.trim().is_empty() {
            return Err(ApiError::bad_request("description: cannot be blank"));
        }
        Ok(())
    }
}

impl RuleEditRequest {
    pub fn validate(&self) -> Result<(RuleRequest, TimeStamp), ApiError> {
        let filter_timestamp = self
            .filter_timestamp
            .ok_or_else(|| ApiError::bad_request("filter_timestamp: cannot be blank"))?;
        let details = RuleRequest {
            score: self.score,
            block_secs: self.block_secs,
            description: self.description.trim().to_string(),
        };
        details.validate()?;
        Ok((details, filter_timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_validation() {
        let ok = RuleRequest {
            score: 3,
            block_secs: 86_400,
            description: "one day block".into(),
        };
        assert!(ok.validate().is_ok());

        let zero = RuleRequest { score: 0, ..ok.clone() };
        assert!(zero.validate().is_err());

        let too_long = RuleRequest {
            block_secs: MAX_BLOCK_SECS + 1,
            ..ok
        };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn verbal_warning_never_blocks() {
        assert!(!Rule::verbal_warning("BJM", 1).blocks());
    }
}
