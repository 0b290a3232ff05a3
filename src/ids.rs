//! Deterministic location identifiers.
//!
//! A location's id is `|hash_code(key)|` where the key joins name, street,
//! city and zip. The hash is the classic 32-bit `h = h * 31 + unit` over
//! UTF-16 code units with wrapping arithmetic, so ids match across platforms
//! and across implementations that hash JavaScript-style strings.
//!
//! Collisions are possible and accepted: two distinct addresses sharing an id
//! would share one location row.

use crate::models::{Location, RefId};

/// The address fields a location id is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationKey<'a> {
    pub name: &'a str,
    pub street: &'a str,
    pub city: &'a str,
    pub zip: &'a str,
}

/// Anything that carries a location's address fields
pub trait Keyed {
    fn key(&self) -> LocationKey<'_>;
}

impl Keyed for Location {
    fn key(&self) -> LocationKey<'_> {
        LocationKey {
            name: &self.name,
            street: &self.address.street,
            city: &self.address.city,
            zip: &self.address.zip,
        }
    }
}

impl<T: Keyed> Keyed for &T {
    fn key(&self) -> LocationKey<'_> {
        (*self).key()
    }
}

pub fn hash_code(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Canonical key string. Case and whitespace are kept as given.
pub fn generate_key(key: LocationKey<'_>) -> String {
    format!("{}|{}|{}|{}", key.name, key.street, key.city, key.zip)
}

pub fn generate_location_id(key: LocationKey<'_>) -> RefId {
    // unsigned_abs keeps i32::MIN representable
    RefId(u64::from(hash_code(&generate_key(key)).unsigned_abs()))
}

/// Ids for a batch of locations, in input order
pub fn generate_location_ids<T: Keyed>(locations: &[T]) -> Vec<RefId> {
    locations
        .iter()
        .map(|loc| generate_location_id(loc.key()))
        .collect()
}

/// Pair each location with its generated id, in input order
pub fn with_generated_ids<T: Keyed>(locations: impl IntoIterator<Item = T>) -> Vec<(RefId, T)> {
    locations
        .into_iter()
        .map(|loc| (generate_location_id(loc.key()), loc))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Address;

    fn key<'a>(name: &'a str, street: &'a str, city: &'a str, zip: &'a str) -> LocationKey<'a> {
        LocationKey { name, street, city, zip }
    }

    #[test]
    fn test_hash_code_matches_known_values() {
        assert_eq!(hash_code(""), 0);
        assert_eq!(hash_code("a"), 97);
        assert_eq!(hash_code("abc"), 96354);
        assert_eq!(hash_code("hello"), 99162322);
        assert_eq!(hash_code("Hello World"), -862545276);
    }

    #[test]
    fn test_hash_code_hashes_utf16_units() {
        assert_eq!(hash_code("Café"), 2092609);
        // surrogate pair, two code units
        assert_eq!(hash_code("🙂"), 1772965);
    }

    #[test]
    fn test_location_id_handles_i32_min() {
        assert_eq!(hash_code("polygenelubricants"), i32::MIN);
        assert_eq!(
            RefId(u64::from(hash_code("polygenelubricants").unsigned_abs())),
            RefId(2147483648)
        );
    }

    #[test]
    fn test_location_id_is_deterministic() {
        let a = generate_location_id(key("X", "1 Main St", "Newton", "02458"));
        let b = generate_location_id(key("X", "1 Main St", "Newton", "02458"));
        assert_eq!(a, b);
        assert_eq!(a, RefId(1762765107));
    }

    #[test]
    fn test_location_id_is_non_negative_for_negative_hashes() {
        let k = key("X", "2 Main St", "Newton", "02458");
        assert!(hash_code(&generate_key(k)) < 0);
        assert_eq!(generate_location_id(k), RefId(275291182));
    }

    #[test]
    fn test_location_id_is_case_and_whitespace_sensitive() {
        let base = generate_location_id(key("X", "1 Main St", "Newton", "02458"));
        assert_ne!(base, generate_location_id(key("x", "1 Main St", "Newton", "02458")));
        assert_ne!(base, generate_location_id(key("X", "1 Main St ", "Newton", "02458")));
        assert_ne!(base, generate_location_id(key("X", "1 Main St", "Newton", "02459")));
    }

    #[test]
    fn test_batch_ids_follow_input_order() {
        let locations = vec![
            Location {
                name: "X".into(),
                address: Address { street: "1 Main St".into(), city: "Newton".into(), zip: "02458".into() },
                sign_up_link: None,
                latitude: None,
                longitude: None,
            },
            Location {
                name: "X".into(),
                address: Address { street: "2 Main St".into(), city: "Newton".into(), zip: "02458".into() },
                sign_up_link: None,
                latitude: None,
                longitude: None,
            },
        ];

        assert_eq!(
            generate_location_ids(&locations),
            vec![RefId(1762765107), RefId(275291182)]
        );

        let paired = with_generated_ids(&locations);
        assert_eq!(paired[0].0, RefId(1762765107));
        assert_eq!(paired[1].1.address.street, "2 Main St");
    }
}
