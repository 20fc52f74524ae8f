// weiser-core/src/domain/check/fingerprint.rs

use sha2::{Digest, Sha256};

// Unit separator keeps ("a", "bc") and ("ab", "c") from colliding.
const SEP: [u8; 1] = [0x1f];

/// Stable identity of a declared check: SHA-256 over
/// `(datasource, effective check name, dataset identifier)`.
/// Dimension values and time buckets are deliberately excluded so the
/// history of one declared check groups all of its partitions.
pub fn check_id(datasource: &str, name: &str, dataset_identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(datasource.as_bytes());
    hasher.update(SEP);
    hasher.update(name.as_bytes());
    hasher.update(SEP);
    hasher.update(dataset_identifier.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_across_calls() {
        let a = check_id("default", "orders_count", "orders");
        let b = check_id("default", "orders_count", "orders");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_every_component_matters() {
        let base = check_id("default", "orders_count", "orders");
        assert_ne!(base, check_id("prod", "orders_count", "orders"));
        assert_ne!(base, check_id("default", "vendor_count", "orders"));
        assert_ne!(base, check_id("default", "orders_count", "vendors"));
    }

    #[test]
    fn test_separator_prevents_concatenation_collisions() {
        assert_ne!(check_id("a", "bc", "d"), check_id("ab", "c", "d"));
    }
}
