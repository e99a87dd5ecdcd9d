//! Property-based tests for the scoring policy and the state space
//!
//! The scoring policy is pure, so every approval outcome can be checked
//! against randomly generated trucks and rules without a database.

use proptest::prelude::*;
use truck_violation::{
    rules::Rule,
    scoring::{Sanction, sanction_for, score_change},
    state::ViolationState,
    truck::{BlockWindow, Truck},
    types::{Audit, TimeStamp},
};

// PROPERTY TEST STRATEGIES

/// A fixed clock somewhere between 2020 and 2030.
fn clock_strategy() -> impl Strategy<Value = TimeStamp> {
    (1_577_836_800i64..1_893_456_000).prop_map(|secs| TimeStamp::from_unix(secs).unwrap())
}

/// A truck at any reachable score, possibly carrying an earlier block.
fn truck_strategy() -> impl Strategy<Value = Truck> {
    (0u32..10_000, any::<bool>(), 1u64..1_000_000).prop_map(|(score, blocked, secs)| {
        let at = TimeStamp::from_unix(1_500_000_000).unwrap();
        let audit = Audit {
            at,
            by: "prop".into(),
            by_id: "prop".into(),
        };
        let mut truck = Truck::with_score_only("BJM", "TR-PROP", score, audit);
        if blocked {
            truck.blocked = true;
            truck.block = BlockWindow::starting(at, secs);
        }
        truck
    })
}

fn rule_for(truck: &Truck, block_secs: u64) -> Rule {
    Rule {
        block_secs,
        ..Rule::verbal_warning(&truck.branch, truck.score + 1)
    }
}

proptest! {
    /// Every approval adds exactly one point.
    #[test]
    fn score_always_increments_by_one(
        truck in truck_strategy(),
        clock in clock_strategy(),
        block_secs in prop::option::of(0u64..10_000_000),
    ) {
        let rule = block_secs.map(|secs| rule_for(&truck, secs));
        let change = score_change(&truck, rule.as_ref(), clock).unwrap();
        prop_assert_eq!(change.score, truck.score + 1);
    }

    /// A blocking rule opens a window of exactly its block time starting now.
    #[test]
    fn blocking_rule_window_matches_block_time(
        truck in truck_strategy(),
        clock in clock_strategy(),
        block_secs in 1u64..10_000_000,
    ) {
        let rule = rule_for(&truck, block_secs);
        let change = score_change(&truck, Some(&rule), clock).unwrap();

        prop_assert!(change.blocked);
        let window = change.block.unwrap();
        prop_assert_eq!(window.start, clock);
        prop_assert_eq!(window.len_secs(), block_secs as i64);
        prop_assert!(window.end > window.start);
    }

    /// No rule, or a warning rule, leaves the block state exactly as it was.
    #[test]
    fn non_blocking_outcomes_keep_block_state(
        truck in truck_strategy(),
        clock in clock_strategy(),
        warning in any::<bool>(),
    ) {
        let rule = warning.then(|| rule_for(&truck, 0));
        let change = score_change(&truck, rule.as_ref(), clock).unwrap();

        prop_assert_eq!(change.blocked, truck.blocked);
        prop_assert_eq!(change.block, truck.block);
    }

    /// A rule for any other score is never applied.
    #[test]
    fn rule_for_another_score_is_rejected(
        truck in truck_strategy(),
        offset in 2u32..100,
    ) {
        let rule = Rule {
            block_secs: 60,
            ..Rule::verbal_warning(&truck.branch, truck.score + offset)
        };
        prop_assert!(score_change(&truck, Some(&rule), TimeStamp::now()).is_err());
    }

    /// The sanction depends only on the rule's block time.
    #[test]
    fn sanction_classification(clock in clock_strategy(), block_secs in 0u64..1_000_000) {
        let rule = Rule { block_secs, ..Rule::verbal_warning("BJM", 1) };
        let sanction = sanction_for(Some(&rule), clock).unwrap();
        if block_secs == 0 {
            prop_assert_eq!(sanction, Sanction::Warning);
        } else {
            prop_assert!(matches!(sanction, Sanction::Block(_)));
        }
        prop_assert_eq!(sanction_for(None, clock).unwrap(), Sanction::Unruled);
    }

    /// Whatever state a caller asks for, a new document starts open.
    #[test]
    fn new_documents_start_open(index in any::<i64>()) {
        let requested = ViolationState::from_index(index);
        let state = ViolationState::coerce_initial(requested);
        prop_assert!(state.is_open());
        prop_assert_ne!(state, ViolationState::Undefined);
    }
}
