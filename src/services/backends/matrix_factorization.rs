/// Matrix factorization backend
///
/// Item factors are derived once from the catalog: each genre owns a latent dimension
/// (folded modulo `FACTORS`) plus a little fixed noise, and each item's bias is its
/// community average relative to the catalog mean. A user is a bias plus a factor
/// vector fitted by SGD against their own ratings.
use std::collections::HashMap;

use parking_lot::RwLock;

use super::{check_count, fixed_weight, rank, RecommenderBackend};
use crate::{
    error::BackendError,
    models::{catalog::GENRES, CatalogEntry, ItemId, RecommendationItem, UserId, UserRatings, CATALOG},
};

const NAME: &str = "Matrix Factorization";
const FACTORS: usize = 8;
const EPOCHS: usize = 60;
const LEARNING_RATE: f64 = 0.05;
const REGULARIZATION: f64 = 0.02;

#[derive(Debug, Clone)]
struct UserModel {
    fingerprint: u64,
    bias: f64,
    factors: [f64; FACTORS],
    rated: Vec<ItemId>,
}

impl UserModel {
    fn cold() -> Self {
        Self {
            fingerprint: UserRatings::new().fingerprint(),
            bias: 0.0,
            factors: [0.0; FACTORS],
            rated: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct ItemModel {
    bias: f64,
    factors: [f64; FACTORS],
}

pub struct MatrixFactorizationBackend {
    global_mean: f64,
    items: HashMap<ItemId, ItemModel>,
    users: RwLock<HashMap<UserId, UserModel>>,
}

impl Default for MatrixFactorizationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixFactorizationBackend {
    pub fn new() -> Self {
        let global_mean =
            CATALOG.iter().map(|e| e.average_rating).sum::<f64>() / CATALOG.len() as f64;

        let items = CATALOG
            .iter()
            .map(|entry| (entry.id, Self::item_model(entry, global_mean)))
            .collect();

        Self {
            global_mean,
            items,
            users: RwLock::new(HashMap::new()),
        }
    }

    fn item_model(entry: &CatalogEntry, global_mean: f64) -> ItemModel {
        let genre_count = entry.genres().count().max(1) as f64;
        let mut factors = [0.0; FACTORS];
        for genre in entry.genres() {
            if let Some(index) = GENRES.iter().position(|g| *g == genre) {
                factors[index % FACTORS] += 0.5 / genre_count.sqrt();
            }
        }
        for (k, factor) in factors.iter_mut().enumerate() {
            *factor += fixed_weight(entry.id as usize, k, 0.05);
        }

        ItemModel {
            bias: entry.average_rating - global_mean,
            factors,
        }
    }

    fn predict(&self, user: &UserModel, item: &ItemModel) -> f64 {
        let dot: f64 = user
            .factors
            .iter()
            .zip(item.factors.iter())
            .map(|(p, q)| p * q)
            .sum();
        self.global_mean + item.bias + user.bias + dot
    }

    fn fit(&self, ratings: &UserRatings) -> UserModel {
        let mut user = UserModel {
            fingerprint: ratings.fingerprint(),
            bias: 0.0,
            factors: [0.0; FACTORS],
            rated: ratings.iter().map(|(id, _)| id).collect(),
        };
        // Start away from zero so the factor gradients are not all identical
        for (k, factor) in user.factors.iter_mut().enumerate() {
            *factor = fixed_weight(k, FACTORS, 0.1);
        }

        let observations: Vec<(&ItemModel, f64)> = ratings
            .iter()
            .filter_map(|(id, rating)| self.items.get(&id).map(|item| (item, f64::from(rating))))
            .collect();

        for _ in 0..EPOCHS {
            for (item, rating) in &observations {
                let error = rating - self.predict(&user, item);
                user.bias += LEARNING_RATE * (error - REGULARIZATION * user.bias);
                for k in 0..FACTORS {
                    let gradient = error * item.factors[k] - REGULARIZATION * user.factors[k];
                    user.factors[k] += LEARNING_RATE * gradient;
                }
            }
        }

        user
    }
}

impl RecommenderBackend for MatrixFactorizationBackend {
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
            user_bias = model.bias,
            "Fitted user factors"
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
            .filter_map(|entry| {
                self.items
                    .get(&entry.id)
                    .map(|item| (entry, self.predict(&user, item)))
            })
            .collect();

        if scored.is_empty() {
            return Err(BackendError::Computation {
                backend: NAME,
                reason: format!("no unrated items left for user {}", user_id),
            });
        }

        // Rank on raw predictions, report on the star scale
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
