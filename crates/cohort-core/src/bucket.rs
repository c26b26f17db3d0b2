//! # Bucket Module
//!
//! The deterministic assignment core: seed construction, the weighted
//! walk, and the audience gate.
//!
//! - Same identifier, same namespace, same weight table: same variant,
//!   every time, on every machine
//! - No clock, no RNG, no I/O; everything here is a pure function of
//!   its arguments
//! - Weight tables are walked in declaration order, so table order is
//!   part of an experiment's identity

use crate::hash::hash_seed;
use crate::primitives::AUDIENCE_SLOTS;
use crate::types::{CohortError, Identifier, VariantId};

use crate::experiment::{AudienceRule, VariantArm};

// =============================================================================
// SEEDING
// =============================================================================

/// Build the hash seed for an identifier and namespace.
///
/// The identifier comes first. Swapping the order would produce a
/// different hash and silently rebucket every subject.
#[must_use]
pub fn seed_for(identifier: &Identifier, namespace: &str) -> String {
    let mut seed = String::with_capacity(identifier.as_str().len() + namespace.len());
    seed.push_str(identifier.as_str());
    seed.push_str(namespace);
    seed
}

// =============================================================================
// ASSIGNMENT
// =============================================================================

/// Deterministically pick a variant from a weight table.
///
/// The hash of `identifier + namespace` is reduced modulo the total
/// weight, and the table is walked front to back: the first arm whose
/// cumulative weight exceeds the slot wins. Zero-weight arms never
/// advance the accumulator past the slot, so they can never win.
pub fn assign(
    identifier: &Identifier,
    namespace: &crate::types::ExperimentId,
    arms: &[VariantArm],
) -> Result<VariantId, CohortError> {
    let Some(first) = arms.first() else {
        return Err(CohortError::InvalidConfiguration(
            "weight table is empty".to_string(),
        ));
    };

    let total: u64 = arms.iter().map(|arm| u64::from(arm.weight.value())).sum();
    if total == 0 {
        return Err(CohortError::InvalidConfiguration(
            "total weight is zero".to_string(),
        ));
    }

    let seed = seed_for(identifier, namespace.as_str());
    let slot = u64::from(hash_seed(&seed)) % total;

    let mut cumulative: u64 = 0;
    for arm in arms {
        cumulative = cumulative.saturating_add(u64::from(arm.weight.value()));
        if slot < cumulative {
            return Ok(arm.id.clone());
        }
    }

    // slot < total and the accumulator reaches total, so the loop above
    // always returns. The first arm is the fallback if it ever did not.
    Ok(first.id.clone())
}

// =============================================================================
// AUDIENCE GATE
// =============================================================================

/// Map an identifier to an audience slot in `1..=AUDIENCE_SLOTS`.
#[must_use]
pub fn audience_slot(identifier: &Identifier, namespace: &str) -> u32 {
    let seed = seed_for(identifier, namespace);
    (hash_seed(&seed) % AUDIENCE_SLOTS) + 1
}

/// Whether an identifier falls inside an experiment's audience.
///
/// An absent rule admits everyone. The gate hashes the same seed as
/// [`assign`], so a subject's eligibility never flickers between
/// resolutions.
#[must_use]
pub fn in_audience(
    identifier: &Identifier,
    namespace: &str,
    rule: Option<&AudienceRule>,
) -> bool {
    match rule {
        None => true,
        Some(rule) => audience_slot(identifier, namespace) <= u32::from(rule.percentage),
    }
}

/// Whether an identifier falls inside a percentage rollout of a flag.
///
/// Same slot arithmetic as the audience gate, with the flag name as the
/// namespace. Raising the percentage only ever adds subjects; nobody
/// who was in at 20% drops out at 30%.
#[must_use]
pub fn in_rollout(identifier: &Identifier, flag: &str, percentage: u8) -> bool {
    audience_slot(identifier, flag) <= u32::from(percentage)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::experiment::AudienceRule;
    use crate::types::ExperimentId;

    fn fifty_fifty() -> Vec<VariantArm> {
        vec![
            VariantArm::new("control", "Control", 50),
            VariantArm::new("variant_a", "Variant A", 50),
        ]
    }

    #[test]
    fn known_subject_lands_on_control() {
        let identifier = Identifier::new("abc123");
        let namespace = ExperimentId::new("homepage_cta_test");

        let variant = assign(&identifier, &namespace, &fifty_fifty()).expect("assign");
        assert_eq!(variant.as_str(), "control");
    }

    #[test]
    fn assignment_is_deterministic() {
        let identifier = Identifier::new("user-42");
        let namespace = ExperimentId::new("pricing_test");
        let arms = fifty_fifty();

        let first = assign(&identifier, &namespace, &arms).expect("assign");
        for _ in 0..100 {
            let again = assign(&identifier, &namespace, &arms).expect("assign");
            assert_eq!(first, again);
        }
    }

    #[test]
    fn single_arm_always_wins() {
        let arms = vec![VariantArm::new("only", "Only", 25)];
        let namespace = ExperimentId::new("solo_test");

        for i in 0..50 {
            let identifier = Identifier::new(format!("subject-{}", i));
            let variant = assign(&identifier, &namespace, &arms).expect("assign");
            assert_eq!(variant.as_str(), "only");
        }
    }

    #[test]
    fn zero_weight_arm_never_wins() {
        let arms = vec![
            VariantArm::new("live", "Live", 100),
            VariantArm::new("dormant", "Dormant", 0),
        ];
        let namespace = ExperimentId::new("rollback_test");

        for i in 0..500 {
            let identifier = Identifier::new(format!("subject-{}", i));
            let variant = assign(&identifier, &namespace, &arms).expect("assign");
            assert_eq!(variant.as_str(), "live");
        }
    }

    #[test]
    fn leading_zero_weight_arm_never_wins() {
        let arms = vec![
            VariantArm::new("dormant", "Dormant", 0),
            VariantArm::new("live", "Live", 100),
        ];
        let namespace = ExperimentId::new("rollback_test");

        for i in 0..500 {
            let identifier = Identifier::new(format!("subject-{}", i));
            let variant = assign(&identifier, &namespace, &arms).expect("assign");
            assert_eq!(variant.as_str(), "live");
        }
    }

    #[test]
    fn empty_table_is_rejected() {
        let identifier = Identifier::new("abc123");
        let namespace = ExperimentId::new("empty_test");

        let err = assign(&identifier, &namespace, &[]).unwrap_err();
        assert!(matches!(err, CohortError::InvalidConfiguration(_)));
    }

    #[test]
    fn zero_total_is_rejected() {
        let identifier = Identifier::new("abc123");
        let namespace = ExperimentId::new("zero_test");
        let arms = vec![
            VariantArm::new("a", "A", 0),
            VariantArm::new("b", "B", 0),
        ];

        let err = assign(&identifier, &namespace, &arms).unwrap_err();
        assert!(err.to_string().contains("total weight is zero"));
    }

    #[test]
    fn namespaces_bucket_independently() {
        let arms = fifty_fifty();
        let first = ExperimentId::new("experiment_one");
        let second = ExperimentId::new("experiment_two");

        // At least one of a batch of subjects must land differently
        // across the two namespaces; identical outcomes everywhere
        // would mean the namespace is not feeding the hash.
        let mut differs = false;
        for i in 0..200 {
            let identifier = Identifier::new(format!("subject-{}", i));
            let a = assign(&identifier, &first, &arms).expect("assign");
            let b = assign(&identifier, &second, &arms).expect("assign");
            if a != b {
                differs = true;
                break;
            }
        }
        assert!(differs);
    }

    #[test]
    fn seed_concatenates_identifier_then_namespace() {
        let identifier = Identifier::new("abc123");
        assert_eq!(seed_for(&identifier, "homepage_cta_test"), "abc123homepage_cta_test");
    }

    #[test]
    fn audience_slot_stays_in_range() {
        for i in 0..1_000 {
            let identifier = Identifier::new(format!("subject-{}", i));
            let slot = audience_slot(&identifier, "gate_test");
            assert!((1..=AUDIENCE_SLOTS).contains(&slot));
        }
    }

    #[test]
    fn zero_percent_audience_admits_nobody() {
        let rule = AudienceRule::percent(0);
        for i in 0..100 {
            let identifier = Identifier::new(format!("subject-{}", i));
            assert!(!in_audience(&identifier, "gate_test", Some(&rule)));
        }
    }

    #[test]
    fn full_audience_admits_everybody() {
        let rule = AudienceRule::percent(100);
        for i in 0..100 {
            let identifier = Identifier::new(format!("subject-{}", i));
            assert!(in_audience(&identifier, "gate_test", Some(&rule)));
        }
    }

    #[test]
    fn absent_rule_admits_everybody() {
        let identifier = Identifier::new("anyone");
        assert!(in_audience(&identifier, "gate_test", None));
    }

    #[test]
    fn rollout_is_monotonic_in_percentage() {
        for i in 0..200 {
            let identifier = Identifier::new(format!("subject-{}", i));
            let mut admitted = false;
            for percentage in 0..=100_u8 {
                let now = in_rollout(&identifier, "new_checkout", percentage);
                // Once in, always in at any higher percentage.
                assert!(now || !admitted);
                admitted = now;
            }
            assert!(admitted);
        }
    }
}
