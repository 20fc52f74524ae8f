// weiser-core/src/domain/check/condition.rs

use crate::domain::check::descriptor::{Condition, Threshold};

/// Total over the condition set. `between` is inclusive on both ends.
/// A shape mismatch (pair for a unary condition or vice versa) cannot
/// survive descriptor validation; it evaluates to a failed check here
/// rather than a panic.
pub fn passes(condition: Condition, threshold: &Threshold, value: f64) -> bool {
    match condition {
        Condition::Between => match threshold.pair() {
            Some((lo, hi)) => value >= lo && value <= hi,
            None => false,
        },
        _ => match threshold.scalar() {
            Some(t) => match condition {
                Condition::Gt => value > t,
                Condition::Ge => value >= t,
                Condition::Lt => value < t,
                Condition::Le => value <= t,
                Condition::Eq => value == t,
                Condition::Neq => value != t,
                Condition::Between => false,
            },
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unary_conditions() {
        let t = Threshold::Scalar(10.0);
        assert!(passes(Condition::Gt, &t, 10.5));
        assert!(!passes(Condition::Gt, &t, 10.0));
        assert!(passes(Condition::Ge, &t, 10.0));
        assert!(passes(Condition::Lt, &t, 9.9));
        assert!(passes(Condition::Le, &t, 10.0));
        assert!(passes(Condition::Eq, &t, 10.0));
        assert!(!passes(Condition::Eq, &t, 10.1));
        assert!(passes(Condition::Neq, &t, 10.1));
    }

    #[test]
    fn test_between_is_inclusive() {
        let t = Threshold::Range(vec![1000.0, 2000.0]);
        assert!(passes(Condition::Between, &t, 1000.0));
        assert!(passes(Condition::Between, &t, 2000.0));
        assert!(passes(Condition::Between, &t, 1006.0));
        assert!(!passes(Condition::Between, &t, 999.99));
        assert!(!passes(Condition::Between, &t, 2500.0));
    }

    #[test]
    fn test_shape_mismatch_fails_closed() {
        assert!(!passes(
            Condition::Between,
            &Threshold::Scalar(1.0),
            1.0
        ));
        assert!(!passes(
            Condition::Gt,
            &Threshold::Range(vec![0.0, 1.0]),
            5.0
        ));
    }
}
