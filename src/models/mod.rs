use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod catalog;
pub mod device;
pub mod ratings;

pub use catalog::{CatalogEntry, CATALOG, RATEABLE_ITEMS};
pub use device::{
    ButtonState, DeviceState, DisplayState, IndicatorMode, InteractionCounters, InteractionKind,
    Microphone, TiltVector,
};
pub use ratings::{Rating, UserRatings};

/// Identifier of a catalog item
pub type ItemId = u32;

/// Identifier of a user as handed out by the user store
pub type UserId = u64;

/// Which recommendation backend a request is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Matrix-factorization style model, good for users with few ratings
    Primary,
    /// Higher-capacity neural model
    Secondary,
}

impl BackendChoice {
    /// Picks a backend from the number of ratings a user has given.
    ///
    /// Policy, not computation: at or above `threshold` ratings the secondary model is
    /// preferred, below it the primary one.
    pub fn for_rating_count(rating_count: usize, threshold: usize) -> Self {
        if rating_count >= threshold {
            BackendChoice::Secondary
        } else {
            BackendChoice::Primary
        }
    }
}

impl Display for BackendChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendChoice::Primary => write!(f, "primary"),
            BackendChoice::Secondary => write!(f, "secondary"),
        }
    }
}

/// A single recommendation request, created per user action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendationRequest {
    pub user_id: UserId,
    pub requested_count: usize,
    pub backend_choice: BackendChoice,
}

/// A recommended title, produced by a backend or by the fallback list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationItem {
    pub id: ItemId,
    pub title: String,
    pub genre_tags: Vec<String>,
    pub score: f64,
    /// Label of whatever produced the item (model name or "Popular")
    pub source_label: String,
}

impl RecommendationItem {
    /// Builds an item from a catalog entry with the given score
    pub fn from_entry(entry: &CatalogEntry, score: f64, source_label: &str) -> Self {
        Self {
            id: entry.id,
            title: entry.title.to_string(),
            genre_tags: entry.genres().map(str::to_string).collect(),
            score,
            source_label: source_label.to_string(),
        }
    }

    /// Checks the fields every displayed item must carry
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err(format!("item {} has an empty title", self.id));
        }
        if self.genre_tags.iter().all(|g| g.trim().is_empty()) {
            return Err(format!("item {} has no genre tags", self.id));
        }
        if !self.score.is_finite() {
            return Err(format!("item {} has a non-finite score", self.id));
        }
        Ok(())
    }

    /// Genres joined the way the catalog stores them
    pub fn genres_joined(&self) -> String {
        self.genre_tags.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_selection_threshold() {
        for count in 0..3 {
            assert_eq!(BackendChoice::for_rating_count(count, 3), BackendChoice::Primary);
        }
        for count in 3..6 {
            assert_eq!(BackendChoice::for_rating_count(count, 3), BackendChoice::Secondary);
        }
    }

    #[test]
    fn test_three_ratings_selects_secondary() {
        let mut ratings = UserRatings::new();
        ratings.rate(1, 5).unwrap();
        ratings.rate(50, 4).unwrap();
        ratings.rate(100, 3).unwrap();
        assert_eq!(
            BackendChoice::for_rating_count(ratings.len(), 3),
            BackendChoice::Secondary
        );
    }

    #[test]
    fn test_item_validation() {
        let good = RecommendationItem {
            id: 1,
            title: "Toy Story".to_string(),
            genre_tags: vec!["Animation".to_string()],
            score: 4.8,
            source_label: "Popular".to_string(),
        };
        assert!(good.validate().is_ok());

        let untitled = RecommendationItem {
            title: "  ".to_string(),
            ..good.clone()
        };
        assert!(untitled.validate().is_err());

        let no_genres = RecommendationItem {
            genre_tags: vec![],
            ..good.clone()
        };
        assert!(no_genres.validate().is_err());

        let nan_score = RecommendationItem {
            score: f64::NAN,
            ..good
        };
        assert!(nan_score.validate().is_err());
    }

    #[test]
    fn test_backend_choice_serialization() {
        assert_eq!(
            serde_json::to_string(&BackendChoice::Secondary).unwrap(),
            "\"secondary\""
        );
    }
}
