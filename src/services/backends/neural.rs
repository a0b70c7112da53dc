/// Neural collaborative filtering backend
///
/// A user is summarised as a genre profile: for every genre, the average of
/// `(rating - 3) / 2` over the rated titles carrying it. For a candidate item the
/// network sees `[profile ⊙ item_genres, item_genres]` through one fixed-weight ReLU
/// hidden layer; the output layer is fine-tuned per user against their ratings, on
/// top of the item's community average.
use std::collections::HashMap;

use parking_lot::RwLock;

use super::{check_count, fixed_weight, rank, RecommenderBackend};
use crate::{
    error::BackendError,
    models::{catalog::GENRES, CatalogEntry, ItemId, RecommendationItem, UserId, UserRatings, CATALOG},
};

const NAME: &str = "Neural CF";
const GENRE_COUNT: usize = GENRES.len();
const INPUTS: usize = GENRE_COUNT * 2;
const HIDDEN: usize = 12;
const EPOCHS: usize = 40;
const LEARNING_RATE: f64 = 0.3;

#[derive(Debug, Clone)]
struct UserModel {
    fingerprint: u64,
    profile: [f64; GENRE_COUNT],
    output_weights: [f64; HIDDEN],
    output_bias: f64,
    rated: Vec<ItemId>,
}

impl UserModel {
    fn cold() -> Self {
        Self {
            fingerprint: UserRatings::new().fingerprint(),
            profile: [0.0; GENRE_COUNT],
            output_weights: initial_output_weights(),
            output_bias: 0.0,
            rated: Vec::new(),
        }
    }
}

fn initial_output_weights() -> [f64; HIDDEN] {
    let mut weights = [0.0; HIDDEN];
    for (j, weight) in weights.iter_mut().enumerate() {
        *weight = fixed_weight(HIDDEN + j, INPUTS, 0.1);
    }
    weights
}

pub struct NeuralBackend {
    hidden_weights: [[f64; INPUTS]; HIDDEN],
    users: RwLock<HashMap<UserId, UserModel>>,
}

impl Default for NeuralBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NeuralBackend {
    pub fn new() -> Self {
        let mut hidden_weights = [[0.0; INPUTS]; HIDDEN];
        for (j, row) in hidden_weights.iter_mut().enumerate() {
            for (i, weight) in row.iter_mut().enumerate() {
                *weight = fixed_weight(j, i, 0.6);
            }
        }

        Self {
            hidden_weights,
            users: RwLock::new(HashMap::new()),
        }
    }

    fn genre_vector(entry: &CatalogEntry) -> [f64; GENRE_COUNT] {
        let mut vector = [0.0; GENRE_COUNT];
        for (index, genre) in GENRES.iter().enumerate() {
            if entry.has_genre(genre) {
                vector[index] = 1.0;
            }
        }
        vector
    }

    fn profile(ratings: &UserRatings) -> [f64; GENRE_COUNT] {
        let mut sums = [0.0; GENRE_COUNT];
        let mut counts = [0u32; GENRE_COUNT];

        for (id, rating) in ratings.iter() {
            let Some(entry) = crate::models::catalog::find(id) else {
                continue;
            };
            let signal = (f64::from(rating) - 3.0) / 2.0;
            for (index, genre) in GENRES.iter().enumerate() {
                if entry.has_genre(genre) {
                    sums[index] += signal;
                    counts[index] += 1;
                }
            }
        }

        let mut profile = [0.0; GENRE_COUNT];
        for index in 0..GENRE_COUNT {
            if counts[index] > 0 {
                profile[index] = sums[index] / f64::from(counts[index]);
            }
        }
        profile
    }

    fn hidden(&self, profile: &[f64; GENRE_COUNT], item: &[f64; GENRE_COUNT]) -> [f64; HIDDEN] {
        let mut input = [0.0; INPUTS];
        for g in 0..GENRE_COUNT {
            input[g] = profile[g] * item[g];
            input[GENRE_COUNT + g] = item[g];
        }

        let mut hidden = [0.0; HIDDEN];
        for (j, activation) in hidden.iter_mut().enumerate() {
            let z: f64 = self.hidden_weights[j]
                .iter()
                .zip(input.iter())
                .map(|(w, x)| w * x)
                .sum();
            *activation = z.max(0.0);
        }
        hidden
    }

    fn forward(&self, user: &UserModel, entry: &CatalogEntry) -> f64 {
        let item = Self::genre_vector(entry);
        let hidden = self.hidden(&user.profile, &item);
        let learned: f64 = user
            .output_weights
            .iter()
            .zip(hidden.iter())
            .map(|(w, h)| w * h)
            .sum();
        // Direct affinity path: how much the user likes this item's genres
        let affinity: f64 = user.profile.iter().zip(item.iter()).map(|(p, g)| p * g).sum();
        entry.average_rating + user.output_bias + learned + affinity
    }

    fn fit(&self, ratings: &UserRatings) -> UserModel {
        let mut user = UserModel {
            fingerprint: ratings.fingerprint(),
            profile: Self::profile(ratings),
            output_weights: initial_output_weights(),
            output_bias: 0.0,
            rated: ratings.iter().map(|(id, _)| id).collect(),
        };

        let observations: Vec<(&CatalogEntry, f64)> = ratings
            .iter()
            .filter_map(|(id, rating)| {
                crate::models::catalog::find(id).map(|entry| (entry, f64::from(rating)))
            })
            .collect();

        // Normalised LMS on the output layer keeps the step bounded whatever the activations
        for _ in 0..EPOCHS {
            for (entry, rating) in &observations {
                let hidden = self.hidden(&user.profile, &Self::genre_vector(entry));
                let error = rating - self.forward(&user, entry);
                let norm = 1.0 + hidden.iter().map(|h| h * h).sum::<f64>();
                let step = LEARNING_RATE * error / norm;
                user.output_bias += step;
                for (weight, activation) in user.output_weights.iter_mut().zip(hidden.iter()) {
                    *weight += step * activation;
                }
            }
        }

        user
    }
}

impl RecommenderBackend for NeuralBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn update_user_ratings(&self, user_id: UserId, ratings: &UserRatings) -> Result<(), BackendError> {
        let fingerprint = ratings.fingerprint();
        if let Some(existing) = self.users.read().get(&user_id) {
            if existing.fingerprint == fingerprint {
                tracing::debug!(user_id, backend = NAME, "Ratings unchanged; skipping retrain");
                return Ok(());
            }
        }

        let model = self.fit(ratings);
        tracing::info!(
            user_id,
            backend = NAME,
            rating_count = ratings.len(),
            "Fine-tuned output layer"
        );
        self.users.write().insert(user_id, model);
        Ok(())
    }

    fn get_recommendations(
        &self,
        user_id: UserId,
        count: usize,
    ) -> Result<Vec<RecommendationItem>, BackendError> {
        check_count(NAME, count)?;

        let user = self
            .users
            .read()
            .get(&user_id)
            .cloned()
            .unwrap_or_else(UserModel::cold);

        let scored: Vec<(&CatalogEntry, f64)> = CATALOG
            .iter()
            .filter(|entry| !user.rated.contains(&entry.id))
            .map(|entry| (entry, self.forward(&user, entry)))
            .collect();

        if scored.iter().any(|(_, score)| !score.is_finite()) {
            return Err(BackendError::Computation {
                backend: NAME,
                reason: "network produced a non-finite score".to_string(),
            });
        }
        if scored.is_empty() {
            return Err(BackendError::Computation {
                backend: NAME,
                reason: format!("no unrated items left for user {}", user_id),
            });
        }

        let items = rank(scored, count, NAME)
            .into_iter()
            .map(|mut item| {
                item.score = item.score.clamp(1.0, 5.0);
                item
            })
            .collect();
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratings(pairs: &[(ItemId, u8)]) -> UserRatings {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_profile_reflects_ratings() {
        let profile = NeuralBackend::profile(&ratings(&[(1, 5), (200, 1)]));
        let index = |genre: &str| GENRES.iter().position(|g| *g == genre).unwrap();

        assert_eq!(profile[index("Animation")], 1.0);
        assert_eq!(profile[index("Horror")], -1.0);
        assert_eq!(profile[index("Western")], 0.0);
    }

    #[test]
    fn test_cold_user_gets_well_formed_items() {
        let backend = NeuralBackend::new();
        let items = backend.get_recommendations(42, 3).unwrap();

        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.validate().is_ok()));
        assert!(items.iter().all(|i| i.source_label == NAME));
        for pair in items.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_rated_items_are_excluded() {
        let backend = NeuralBackend::new();
        let r = ratings(&[(1, 5), (50, 4), (100, 3)]);
        backend.update_user_ratings(9, &r).unwrap();

        let items = backend.get_recommendations(9, CATALOG.len()).unwrap();
        assert_eq!(items.len(), CATALOG.len() - 3);
        assert!(items.iter().all(|i| !r.contains(i.id)));
    }

    #[test]
    fn test_genre_affinity_drives_untrained_scores() {
        let backend = NeuralBackend::new();
        let untrained = |r: UserRatings| UserModel {
            profile: NeuralBackend::profile(&r),
            output_weights: [0.0; HIDDEN],
            ..UserModel::cold()
        };
        let family_fan = untrained(ratings(&[(1, 5), (364, 5), (200, 1), (47, 1)]));
        let crime_fan = untrained(ratings(&[(1, 1), (364, 1), (200, 5), (47, 5)]));

        let psycho = crate::models::catalog::find(1219).unwrap();
        let et = crate::models::catalog::find(1097).unwrap();

        assert!(backend.forward(&crime_fan, psycho) > backend.forward(&crime_fan, et));
        assert!(backend.forward(&family_fan, et) > backend.forward(&family_fan, psycho));
    }

    #[test]
    fn test_fine_tuning_reduces_training_error() {
        let backend = NeuralBackend::new();
        let r = ratings(&[(1, 1), (364, 1), (200, 5), (47, 5)]);
        let squared_error = |user: &UserModel| -> f64 {
            r.iter()
                .map(|(id, rating)| {
                    let entry = crate::models::catalog::find(id).unwrap();
                    (f64::from(rating) - backend.forward(user, entry)).powi(2)
                })
                .sum()
        };

        let before = UserModel {
            profile: NeuralBackend::profile(&r),
            ..UserModel::cold()
        };
        let after = backend.fit(&r);

        assert!(squared_error(&after) < squared_error(&before));
    }

    #[test]
    fn test_retrain_skipped_when_unchanged() {
        let backend = NeuralBackend::new();
        let r = ratings(&[(250, 5)]);
        backend.update_user_ratings(3, &r).unwrap();
        let before = backend.users.read().get(&3).cloned().unwrap();
        backend.update_user_ratings(3, &r).unwrap();
        let after = backend.users.read().get(&3).cloned().unwrap();
        assert_eq!(before.output_weights, after.output_weights);
    }

    #[test]
    fn test_zero_count_is_an_error() {
        let backend = NeuralBackend::new();
        assert!(backend.get_recommendations(1, 0).is_err());
    }
}
