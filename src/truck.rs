//! Truck documents and the score/block fields the workflow owns
use super::error::ApiError;
use super::types::{Audit, TimeStamp};
use super::utils::normalize;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    #[n(0)]
    pub start: TimeStamp,
    #[n(1)]
    pub end: TimeStamp,
}

impl BlockWindow {
    /// `None` for a zero length, which means warning only.
    pub fn starting(start: TimeStamp, secs: u64) -> Option<Self> {
        if secs == 0 {
            return None;
        }
        let end = start.plus_secs(secs)?;
        Some(Self { start, end })
    }
    pub fn has_elapsed(&self, now: TimeStamp) -> bool {
        self.end <= now
    }
    pub fn len_secs(&self) -> i64 {
        self.start.secs_until(&self.end)
    }
}

// Key is the raw uuid7 behind `id`. Unique by (branch, identity).
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Truck {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub branch: String,
    #[n(2)]
    pub identity: String,
    #[n(3)]
    pub plate: String,
    #[n(4)]
    pub mark: String,
    #[n(5)]
    pub owner: String,
    #[n(6)]
    pub email: String,
    #[n(7)]
    pub phone: String,
    #[n(8)]
    pub deleted: bool,
    #[n(9)]
    pub score: u32,
    #[n(10)]
    pub reset_score_at: Option<TimeStamp>,
    #[n(11)]
    pub blocked: bool,
    #[n(12)]
    pub block: Option<BlockWindow>, // kept after the block is lifted
    #[n(13)]
    pub created: Audit,
    #[n(14)]
    pub updated: Audit,
}

impl Truck {
    /// Blocked, and the window is over.
    pub fn block_expired(&self, now: TimeStamp) -> bool {
        self.blocked && self.block.is_none_or(|w| w.has_elapsed(now))
    }

    /// Stand-in used when only the score matters to the certificate.
    pub fn with_score_only(branch: &str, identity: &str, score: u32, at: Audit) -> Self {
        Self {
            id: String::new(),
            branch: branch.to_string(),
            identity: identity.to_string(),
            plate: String::new(),
            mark: String::new(),
            owner: String::new(),
            email: String::new(),
            phone: String::new(),
            deleted: false,
            score,
            reset_score_at: None,
            blocked: false,
            block: None,
            created: at.clone(),
            updated: at,
        }
    }
}

/// The only fields the approval side effect writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreChange {
    pub score: u32,
    pub blocked: bool,
    pub block: Option<BlockWindow>,
}

impl ScoreChange {
    pub fn apply(&self, truck: &mut Truck) {
        truck.score = self.score;
        truck.blocked = self.blocked;
        truck.block = self.block;
    }
}

#[derive(Debug, Clone, Default)]
pub struct TruckRequest {
    pub identity: String,
    pub plate: String,
    pub mark: String,
    pub owner: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default)]
pub struct TruckEditRequest {
    pub filter_timestamp: Option<TimeStamp>,
    pub identity: String,
    pub plate: String,
    pub mark: String,
    pub owner: String,
    pub email: String,
    pub phone: String,
}

/// Store payload for a generic edit. Never touches score or block fields.
#[derive(Debug, Clone)]
pub struct TruckEdit {
    pub key: [u8; 16],
    pub branch: String,
    pub filter_timestamp: TimeStamp,
    pub updated: Audit,
    pub details: TruckRequest,
}

#[derive(Debug, Clone, Default)]
pub struct TruckFilter {
    pub branch: Option<String>,
    pub identity: Option<String>,
    pub owner: Option<String>,
    pub blocked_only: bool,
    pub include_deleted: bool,
}

impl TruckRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.identity.trim().is_empty() {
            return Err(ApiError::bad_request("no_identity: cannot be blank"));
        }
        if self.owner.trim().is_empty() {
            return Err(ApiError::bad_request("owner: cannot be blank"));
        }
        if !self.email.trim().is_empty() && !self.email.contains('@') {
            return Err(ApiError::bad_request("email: must be a valid email address"));
        }
        Ok(())
    }

    pub fn normalized(&self) -> Self {
        Self {
            identity: normalize(&self.identity),
            plate: normalize(&self.plate),
            mark: self.mark.trim().to_string(),
            owner: normalize(&self.owner),
            email: self.email.trim().to_lowercase(),
            phone: self.phone.trim().to_string(),
        }
    }
}

impl TruckEditRequest {
    pub fn validate(&self) -> Result<(TruckRequest, TimeStamp), ApiError> {
        let filter_timestamp = self
            .filter_timestamp
            .ok_or_else(|| ApiError::bad_request("filter_timestamp: cannot be blank"))?;
        let details = TruckRequest {
            identity: self.identity.clone(),
            plate: self.plate.clone(),
            mark: self.mark.clone(),
            owner: self.owner.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
        };
        details.validate()?;
        Ok((details.normalized(), filter_timestamp))
    }
}

impl TruckFilter {
    pub fn matches(&self, truck: &Truck) -> bool {
        if truck.deleted && !self.include_deleted {
            return false;
        }
        if let Some(branch) = self.branch.as_deref().map(normalize) {
            if !branch.is_empty() && truck.branch != branch {
                return false;
            }
        }
        if let Some(identity) = self.identity.as_deref().map(normalize) {
            if !truck.identity.contains(identity.as_str()) {
                return false;
            }
        }
        if let Some(owner) = self.owner.as_deref().map(normalize) {
            if !truck.owner.contains(owner.as_str()) {
                return false;
            }
        }
        !self.blocked_only || truck.blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_block_time_is_warning_only() {
        assert_eq!(BlockWindow::starting(TimeStamp::now(), 0), None);
    }

    #[test]
    fn window_length_matches_rule() {
        let w = BlockWindow::starting(TimeStamp::now(), 86_400).unwrap();
        assert_eq!(w.len_secs(), 86_400);
        assert!(w.end > w.start);
        assert!(!w.has_elapsed(w.start));
        assert!(w.has_elapsed(w.end));
    }

    #[test]
    fn request_normalizes_case() {
        let req = TruckRequest {
            identity: " tr-9 ".into(),
            owner: "pt maju".into(),
            email: "Ops@Example.COM".into(),
            ..Default::default()
        }
        .normalized();

        assert_eq!(req.identity, "TR-9");
        assert_eq!(req.owner, "PT MAJU");
        assert_eq!(req.email, "ops@example.com");
    }
}
