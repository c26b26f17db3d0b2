//! # Seed Hash Module
//!
//! The 32-bit polynomial rolling hash behind every bucketing decision:
//! `h = ((h << 5) - h) + unit` per character, wrapping at 32 bits,
//! absolute value at the end.
//!
//! The walk runs over UTF-16 code units, not bytes: assignments written
//! by web clients use the same string hash over `charCodeAt` units, and
//! a subject bucketed in a browser must land in the same bucket here.
//! Changing the unit, the multiplier, or the wrap width would silently
//! rebucket every existing subject.

// =============================================================================
// ROLLING HASH
// =============================================================================

/// Hash a seed string to a non-negative 32-bit value.
///
/// `((h << 5) - h)` is `31 * h`; the wrapping `i32` arithmetic matches
/// 32-bit two's-complement overflow exactly. The result is the absolute
/// value, so the return type is `u32`: `abs(i32::MIN)` is 2_147_483_648
/// and does not fit an `i32`.
#[must_use]
pub fn hash_seed(seed: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in seed.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    hash.unsigned_abs()
}

// =============================================================================
// BASE36
// =============================================================================

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Render a hash value as a lowercase base36 string.
///
/// The compact form used for synthetic identifiers.
#[must_use]
pub fn to_base36(value: u32) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    let mut rest = value;
    while rest > 0 {
        digits.push(BASE36_DIGITS[(rest % 36) as usize]);
        rest /= 36;
    }
    digits.reverse();

    // The digits are ASCII by construction.
    String::from_utf8(digits).unwrap_or_default()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn empty_seed_hashes_to_zero() {
        assert_eq!(hash_seed(""), 0);
    }

    #[test]
    fn short_seeds_match_reference_values() {
        // h("a") = 97; h("ab") = 97*31 + 98; h("abc") = h("ab")*31 + 99
        assert_eq!(hash_seed("a"), 97);
        assert_eq!(hash_seed("ab"), 3_105);
        assert_eq!(hash_seed("abc"), 96_354);
    }

    #[test]
    fn wraparound_and_abs_match_reference() {
        // Seven characters are enough to push the accumulator negative;
        // the absolute value folds it back.
        assert_eq!(hash_seed("abc123h"), 1_207_861_288);
    }

    #[test]
    fn worked_example_seed() {
        // identifier "abc123" + namespace "homepage_cta_test"
        assert_eq!(hash_seed("abc123homepage_cta_test"), 2_030_457_346);
    }

    #[test]
    fn surrogate_pairs_hash_as_two_units() {
        // U+1F600 is the surrogate pair (55357, 56832):
        // 55357 * 31 + 56832 = 1_772_899
        assert_eq!(hash_seed("\u{1F600}"), 1_772_899);
    }

    #[test]
    fn hash_is_deterministic() {
        let seed = "some-identifier:some_namespace";
        let first = hash_seed(seed);
        for _ in 0..10 {
            assert_eq!(hash_seed(seed), first);
        }
    }

    #[test]
    fn base36_digits() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(9), "9");
        assert_eq!(to_base36(10), "a");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(97), "2p");
        assert_eq!(to_base36(1_295), "zz");
    }

    #[test]
    fn base36_is_lowercase_alphanumeric() {
        let rendered = to_base36(u32::MAX);
        assert!(rendered.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
