//! Violation documents, the requests that create them and the find filter
use std::fmt;
use std::str::FromStr;

use super::error::ApiError;
use super::state::ViolationState;
use super::types::{Audit, TimeStamp};
use super::utils::normalize;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_FIND_LIMIT: usize = 100;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    #[n(0)]
    Ppe,
    #[n(1)]
    Procedure,
    #[n(2)]
    Behavior,
    #[n(3)]
    Crime,
    #[n(4)]
    Other,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 5] = [
        ViolationKind::Ppe,
        ViolationKind::Procedure,
        ViolationKind::Behavior,
        ViolationKind::Crime,
        ViolationKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Ppe => "PPE",
            ViolationKind::Procedure => "PROCEDURE",
            ViolationKind::Behavior => "BEHAVIOR",
            ViolationKind::Crime => "CRIME",
            ViolationKind::Other => "OTHER",
        }
    }
}

impl FromStr for ViolationKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViolationKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let allowed: Vec<&str> = ViolationKind::ALL.iter().map(|k| k.as_str()).collect();
                ApiError::bad_request(format!(
                    "violation type {s} is not available. use {}",
                    allowed.join(", ")
                ))
            })
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Key is the raw uuid7 behind `id`
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    #[n(0)]
    pub id: String, // bech32 with the `viol` prefix
    #[n(1)]
    pub branch: String,
    #[n(2)]
    pub state: ViolationState,
    #[n(3)]
    pub truck_identity: String,
    #[n(4)]
    pub plate: String,
    #[n(5)]
    pub mark: String,
    #[n(6)]
    pub owner: String,
    #[n(7)]
    pub kind: ViolationKind,
    #[n(8)]
    pub detail: String,
    #[n(9)]
    pub occurred_at: TimeStamp,
    #[n(10)]
    pub location: String,
    #[n(11)]
    pub images: Vec<String>,
    #[n(12)]
    pub created: Audit,
    #[n(13)]
    pub updated: Audit,
    #[n(14)]
    pub approved: Option<Audit>, // only set while Approved
    #[n(15)]
    pub penalty_count: u32, // truck score snapshot
}

/// Input for a new violation.
#[derive(Debug, Clone)]
pub struct ViolationRequest {
    pub state: ViolationState,
    pub truck_identity: String,
    pub kind: String,
    pub detail: String,
    pub occurred_at: Option<TimeStamp>,
    pub location: String,
}

/// Input for an edit. `filter_timestamp` is the `updated.at` the caller last saw.
#[derive(Debug, Clone)]
pub struct ViolationEditRequest {
    pub filter_timestamp: Option<TimeStamp>,
    pub truck_identity: String,
    pub kind: String,
    pub detail: String,
    pub occurred_at: Option<TimeStamp>,
    pub location: String,
}

/// Field level update handed to the store, conditioned on id, branch and timestamp.
#[derive(Debug, Clone)]
pub struct ViolationEdit {
    pub key: [u8; 16],
    pub branch: String,
    pub filter_timestamp: TimeStamp,
    pub updated: Audit,
    pub truck_identity: String,
    pub plate: String,
    pub mark: String,
    pub owner: String,
    pub kind: ViolationKind,
    pub detail: String,
    pub occurred_at: TimeStamp,
    pub location: String,
}

/// A conditional state transition. Approval fields are cleared.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub key: [u8; 16],
    pub branch: String,
    pub expected: ViolationState,
    pub target: ViolationState,
    pub updated: Audit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: TimeStamp,
    pub end: TimeStamp,
}

impl TimeRange {
    /// Closed on both ends.
    pub fn contains(&self, at: &TimeStamp) -> bool {
        self.start <= *at && *at <= self.end
    }
}

/// `state: None` selects every state. `limit: 0` means the default page size.
#[derive(Debug, Clone, Default)]
pub struct ViolationFilter {
    pub branch: Option<String>,
    pub truck_identity: Option<String>,
    pub plate: Option<String>,
    pub state: Option<ViolationState>,
    pub period: Option<TimeRange>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationSummary {
    pub id: String,
    pub branch: String,
    pub state: ViolationState,
    pub truck_identity: String,
    pub plate: String,
    pub owner: String,
    pub kind: ViolationKind,
    pub detail: String,
    pub occurred_at: TimeStamp,
    pub location: String,
    pub images: Vec<String>,
}

fn required(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field}: cannot be blank")));
    }
    Ok(())
}

impl ViolationRequest {
    pub fn validate(&self) -> Result<ViolationKind, ApiError> {
        required("truck_identity", &self.truck_identity)?;
        required("type_violation", &self.kind)?;
        required("detail_violation", &self.detail)?;
        required("location", &self.location)?;
        self.kind.parse()
    }
}

impl ViolationEditRequest {
    pub fn validate(&self) -> Result<(ViolationKind, TimeStamp), ApiError> {
        let filter_timestamp = self
            .filter_timestamp
            .ok_or_else(|| ApiError::bad_request("filter_timestamp: cannot be blank"))?;
        required("truck_identity", &self.truck_identity)?;
        required("type_violation", &self.kind)?;
        required("detail_violation", &self.detail)?;
        required("location", &self.location)?;
        Ok((self.kind.parse()?, filter_timestamp))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| normalize(&v)).filter(|v| !v.is_empty())
}

impl ViolationFilter {
    /// Upper-cases the text filters, drops the plate filter when an identity
    /// filter is present and fills in the default limit.
    pub fn normalized(self) -> Self {
        let truck_identity = non_blank(self.truck_identity);
        let plate = match truck_identity {
            Some(_) => None,
            None => non_blank(self.plate),
        };
        Self {
            branch: non_blank(self.branch),
            truck_identity,
            plate,
            state: self.state,
            period: self.period,
            limit: if self.limit == 0 {
                DEFAULT_FIND_LIMIT
            } else {
                self.limit
            },
        }
    }

    pub fn matches(&self, v: &Violation) -> bool {
        if let Some(branch) = &self.branch {
            if &v.branch != branch {
                return false;
            }
        }
        if let Some(identity) = &self.truck_identity {
            if !v.truck_identity.contains(identity.as_str()) {
                return false;
            }
        }
        if let Some(plate) = &self.plate {
            if !v.plate.contains(plate.as_str()) {
                return false;
            }
        }
        if let Some(state) = self.state {
            if v.state != state {
                return false;
            }
        }
        if let Some(period) = &self.period {
            if !period.contains(&v.occurred_at) {
                return false;
            }
        }
        true
    }
}

impl From<&Violation> for ViolationSummary {
    fn from(v: &Violation) -> Self {
        Self {
            id: v.id.clone(),
            branch: v.branch.clone(),
            state: v.state,
            truck_identity: v.truck_identity.clone(),
            plate: v.plate.clone(),
            owner: v.owner.clone(),
            kind: v.kind,
            detail: v.detail.clone(),
            occurred_at: v.occurred_at,
            location: v.location.clone(),
            images: v.images.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_filter_wins_over_plate() {
        let filter = ViolationFilter {
            truck_identity: Some("tr-01".into()),
            plate: Some("da 1234".into()),
            ..Default::default()
        }
        .normalized();

        assert_eq!(filter.truck_identity.as_deref(), Some("TR-01"));
        assert_eq!(filter.plate, None);
        assert_eq!(filter.limit, DEFAULT_FIND_LIMIT);
    }

    #[test]
    fn blank_identity_keeps_plate() {
        let filter = ViolationFilter {
            truck_identity: Some("  ".into()),
            plate: Some("da 1234".into()),
            limit: 5,
            ..Default::default()
        }
        .normalized();

        assert_eq!(filter.truck_identity, None);
        assert_eq!(filter.plate.as_deref(), Some("DA 1234"));
        assert_eq!(filter.limit, 5);
    }

    #[test]
    fn request_rejects_unknown_kind() {
        let req = ViolationRequest {
            state: ViolationState::Draft,
            truck_identity: "TR-01".into(),
            kind: "speeding".into(),
            detail: "too fast".into(),
            occurred_at: None,
            location: "gate 2".into(),
        };
        assert!(matches!(req.validate(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn edit_requires_filter_timestamp() {
        let req = ViolationEditRequest {
            filter_timestamp: None,
            truck_identity: "TR-01".into(),
            kind: "ppe".into(),
            detail: "no helmet".into(),
            occurred_at: None,
            location: "yard".into(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn time_range_is_closed() {
        let start = TimeStamp::from_unix(100).unwrap();
        let end = TimeStamp::from_unix(200).unwrap();
        let range = TimeRange { start, end };

        assert!(range.contains(&start));
        assert!(range.contains(&end));
        assert!(!range.contains(&TimeStamp::from_unix(201).unwrap()));
    }
}
