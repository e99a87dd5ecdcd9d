//! Smoke Screen Unit tests for the violation system components
//!
//! These are unit tests that span the codebase, testing behavior in
//! isolation from the integration scenarios. They are intended as a
//! smoke-screen and mostly test the happy-path.

use truck_violation::{
    error::ApiError,
    state::ViolationState,
    truck::{Truck, TruckFilter, TruckRequest},
    types::{Audit, TimeStamp},
    utils::{RULE_HRP, TRUCK_HRP, VIOLATION_HRP, decode_id, new_doc_id},
    violation::{TimeRange, ViolationFilter, ViolationKind, ViolationRequest},
};

fn audit() -> Audit {
    Audit {
        at: TimeStamp::now(),
        by: "smoke".into(),
        by_id: "s-1".into(),
    }
}

// UTILS MODULE TESTS
mod utils_tests {
    use super::*;

    /// Every document kind gets its own human readable prefix.
    #[test]
    fn ids_carry_their_prefix() {
        for hrp in [VIOLATION_HRP, TRUCK_HRP, RULE_HRP] {
            let id = new_doc_id(hrp).unwrap();
            assert!(id.encoded.starts_with(&format!("{hrp}1")));
            assert_eq!(decode_id(hrp, &id.encoded).unwrap(), id.key);
        }
    }

    /// uuid7 keys sort by creation time, which newest-first listing relies on.
    #[test]
    fn keys_are_time_ordered() {
        let first = new_doc_id(VIOLATION_HRP).unwrap();
        let second = new_doc_id(VIOLATION_HRP).unwrap();
        assert!(first.key < second.key);
        assert_ne!(first.encoded, second.encoded);
    }

    #[test]
    fn garbage_ids_are_rejected() {
        assert!(matches!(
            decode_id(VIOLATION_HRP, "viol1nope"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(decode_id(VIOLATION_HRP, "").is_err());
    }
}

// ERROR MODULE TESTS
mod error_tests {
    use super::*;

    #[test]
    fn every_kind_has_status_and_tag() {
        let cases = [
            (ApiError::not_found("x"), 404, "not_found"),
            (ApiError::bad_request("x"), 400, "bad_request"),
            (ApiError::unauthorized("x"), 401, "unauthorized"),
            (ApiError::internal("x", "y"), 500, "internal_server_error"),
        ];
        for (err, status, tag) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(err.tag(), tag);
            assert_eq!(err.response().error, tag);
        }
    }
}

// VIOLATION MODULE TESTS
mod violation_tests {
    use super::*;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("ppe".parse::<ViolationKind>().unwrap(), ViolationKind::Ppe);
        assert_eq!(" Crime ".parse::<ViolationKind>().unwrap(), ViolationKind::Crime);
        let err = "parking".parse::<ViolationKind>().unwrap_err();
        assert!(err.to_string().contains("PPE, PROCEDURE, BEHAVIOR, CRIME, OTHER"));
    }

    #[test]
    fn request_requires_location() {
        let req = ViolationRequest {
            state: ViolationState::Draft,
            truck_identity: "TR-1".into(),
            kind: "other".into(),
            detail: "blocking the lane".into(),
            occurred_at: None,
            location: " ".into(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn period_filter_is_closed() {
        let start = TimeStamp::new_with(2025, 1, 1, 0, 0, 0).unwrap();
        let end = TimeStamp::new_with(2025, 1, 31, 23, 59, 59).unwrap();
        let range = TimeRange { start, end };
        assert!(range.contains(&start));
        assert!(range.contains(&end));
        assert!(!range.contains(&TimeStamp::new_with(2025, 2, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn zero_limit_becomes_default_page() {
        let filter = ViolationFilter::default().normalized();
        assert_eq!(filter.limit, 100);
        assert_eq!(filter.state, None);
    }
}

// TRUCK MODULE TESTS
mod truck_tests {
    use super::*;

    #[test]
    fn request_needs_identity_and_owner() {
        assert!(TruckRequest::default().validate().is_err());
        let ok = TruckRequest {
            identity: "TR-1".into(),
            owner: "PT A".into(),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
        let bad_mail = TruckRequest {
            email: "nobody".into(),
            ..ok
        };
        assert!(bad_mail.validate().is_err());
    }

    #[test]
    fn filter_hides_deleted_and_unblocked() {
        let mut truck = Truck::with_score_only("BJM", "TR-1", 0, audit());
        let blocked_only = TruckFilter {
            blocked_only: true,
            ..Default::default()
        };
        assert!(TruckFilter::default().matches(&truck));
        assert!(!blocked_only.matches(&truck));

        truck.deleted = true;
        assert!(!TruckFilter::default().matches(&truck));
        let with_deleted = TruckFilter {
            include_deleted: true,
            ..Default::default()
        };
        assert!(with_deleted.matches(&truck));
    }

    #[test]
    fn block_without_window_counts_as_expired() {
        let mut truck = Truck::with_score_only("BJM", "TR-1", 3, audit());
        truck.blocked = true;
        assert!(truck.block_expired(TimeStamp::now()));
        truck.blocked = false;
        assert!(!truck.block_expired(TimeStamp::now()));
    }
}
