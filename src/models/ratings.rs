use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ItemId;

/// A star rating between 1 and 5
pub type Rating = u8;

pub const MIN_RATING: Rating = 1;
pub const MAX_RATING: Rating = 5;

/// A user's ratings keyed by item id
///
/// Ordered so that iteration (and therefore model training) is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct UserRatings {
    ratings: BTreeMap<ItemId, Rating>,
}

impl UserRatings {
    /// Creates an empty rating set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a rating
    pub fn rate(&mut self, item_id: ItemId, rating: Rating) -> Result<(), String> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(format!(
                "rating {} for item {} is outside {}..={}",
                rating, item_id, MIN_RATING, MAX_RATING
            ));
        }
        self.ratings.insert(item_id, rating);
        Ok(())
    }

    pub fn get(&self, item_id: ItemId) -> Option<Rating> {
        self.ratings.get(&item_id).copied()
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.ratings.contains_key(&item_id)
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, Rating)> + '_ {
        self.ratings.iter().map(|(id, r)| (*id, *r))
    }

    /// Merges another rating set into this one, the other side wins on conflicts
    pub fn merge(&mut self, other: &UserRatings) {
        for (id, rating) in other.iter() {
            self.ratings.insert(id, rating);
        }
    }

    /// Drops entries that are out of range, e.g. from a hand-edited user file
    pub fn sanitized(self) -> Self {
        Self {
            ratings: self
                .ratings
                .into_iter()
                .filter(|(_, r)| (MIN_RATING..=MAX_RATING).contains(r))
                .collect(),
        }
    }

    /// Stable fingerprint used by backends to skip retraining on unchanged input
    pub fn fingerprint(&self) -> u64 {
        // FNV-1a over the ordered pairs
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for (id, rating) in self.iter() {
            for byte in id.to_le_bytes().into_iter().chain([rating]) {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
        }
        hash
    }
}

impl FromIterator<(ItemId, Rating)> for UserRatings {
    fn from_iter<T: IntoIterator<Item = (ItemId, Rating)>>(iter: T) -> Self {
        Self {
            ratings: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for UserRatings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(id, rating)| format!("{}: {}", id, rating))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ratings() {
        let ratings = UserRatings::new();
        assert!(ratings.is_empty());
        assert_eq!(ratings.len(), 0);
    }

    #[test]
    fn test_rate_and_replace() {
        let mut ratings = UserRatings::new();
        ratings.rate(50, 2).unwrap();
        ratings.rate(50, 4).unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings.get(50), Some(4));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut ratings = UserRatings::new();
        assert!(ratings.rate(1, 0).is_err());
        assert!(ratings.rate(1, 6).is_err());
        assert!(ratings.is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a: UserRatings = [(1, 5), (50, 4)].into_iter().collect();
        let b: UserRatings = [(50, 4), (1, 5)].into_iter().collect();
        let c: UserRatings = [(1, 5), (50, 3)].into_iter().collect();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_json_uses_string_keys() {
        let ratings: UserRatings = [(1, 5), (100, 3)].into_iter().collect();
        let json = serde_json::to_string(&ratings).unwrap();
        assert_eq!(json, r#"{"1":5,"100":3}"#);

        let parsed: UserRatings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ratings);
    }

    #[test]
    fn test_sanitized_drops_invalid_entries() {
        let ratings: UserRatings = [(1, 5), (2, 0), (3, 9)].into_iter().collect();
        let clean = ratings.sanitized();
        assert_eq!(clean.len(), 1);
        assert!(clean.contains(1));
    }

    #[test]
    fn test_merge_prefers_incoming() {
        let mut base: UserRatings = [(1, 2)].into_iter().collect();
        let incoming: UserRatings = [(1, 5), (50, 4)].into_iter().collect();
        base.merge(&incoming);
        assert_eq!(base.get(1), Some(5));
        assert_eq!(base.len(), 2);
    }
}
