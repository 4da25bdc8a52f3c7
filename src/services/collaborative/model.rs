//! Latent-factor regression over a single rater's history.
//!
//! There is only one rater, so items cannot be learned individually for titles
//! never rated. Instead every genre tag gets a bias and a factor vector and an
//! item is represented by the mean of its tags. The rater's preference vector
//! is fitted by SGD alongside them, so unseen candidates are scored through the
//! tags they share with the history.

use std::collections::HashMap;

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use crate::models::{RatedItem, MAX_RATING, MIN_RATING};

/// Fewer ratings than this and the fit is not attempted
pub const MIN_RATINGS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub factors: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub regularization: f32,
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            factors: 8,
            epochs: 50,
            learning_rate: 0.02,
            regularization: 0.05,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct TagParams {
    bias: f32,
    factors: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct LatentFactorModel {
    global_mean: f32,
    preference: Vec<f32>,
    tags: HashMap<String, TagParams>,
}

impl LatentFactorModel {
    /// Fits the model, or returns `None` below [`MIN_RATINGS`] usable ratings
    pub fn fit(ratings: &[RatedItem], options: FitOptions) -> Option<Self> {
        let usable: Vec<&RatedItem> = ratings.iter().filter(|r| r.has_valid_rating()).collect();
        if usable.len() < MIN_RATINGS {
            return None;
        }

        let mut rng = StdRng::seed_from_u64(options.seed);
        let init = |rng: &mut StdRng| -> Vec<f32> {
            (0..options.factors)
                .map(|_| rng.random_range(-0.1..0.1))
                .collect()
        };

        let global_mean = usable.iter().map(|r| r.rating).sum::<f32>() / usable.len() as f32;
        let mut model = Self {
            global_mean,
            preference: init(&mut rng),
            tags: HashMap::new(),
        };
        for item in &usable {
            for genre in &item.genres {
                if !model.tags.contains_key(genre) {
                    let factors = init(&mut rng);
                    model
                        .tags
                        .insert(genre.clone(), TagParams { bias: 0.0, factors });
                }
            }
        }

        let lr = options.learning_rate;
        let reg = options.regularization;
        let mut order: Vec<usize> = (0..usable.len()).collect();

        for _ in 0..options.epochs {
            order.shuffle(&mut rng);
            for &idx in &order {
                let item = usable[idx];
                if item.genres.is_empty() {
                    continue;
                }

                let err = item.rating - model.raw_predict(&item.genres);
                let share = 1.0 / item.genres.len() as f32;
                let item_vector = model.item_vector(&item.genres);

                for genre in &item.genres {
                    if let Some(tag) = model.tags.get_mut(genre) {
                        tag.bias += lr * (err * share - reg * tag.bias);
                        for (q, p) in tag.factors.iter_mut().zip(&model.preference) {
                            *q += lr * (err * share * p - reg * *q);
                        }
                    }
                }
                for (p, q) in model.preference.iter_mut().zip(&item_vector) {
                    *p += lr * (err * q - reg * *p);
                }
            }
        }

        tracing::debug!(
            ratings = usable.len(),
            tags = model.tags.len(),
            global_mean = model.global_mean,
            "Latent factor model fitted"
        );
        Some(model)
    }

    fn item_vector(&self, genres: &[String]) -> Vec<f32> {
        let mut vector = vec![0.0; self.preference.len()];
        let mut known = 0usize;
        for tag in genres.iter().filter_map(|g| self.tags.get(g)) {
            known += 1;
            for (v, q) in vector.iter_mut().zip(&tag.factors) {
                *v += q;
            }
        }
        if known > 0 {
            vector.iter_mut().for_each(|v| *v /= known as f32);
        }
        vector
    }

    fn raw_predict(&self, genres: &[String]) -> f32 {
        let known: Vec<&TagParams> = genres.iter().filter_map(|g| self.tags.get(g)).collect();
        if known.is_empty() {
            return self.global_mean;
        }

        let bias = known.iter().map(|t| t.bias).sum::<f32>() / known.len() as f32;
        let interaction: f32 = self
            .item_vector(genres)
            .iter()
            .zip(&self.preference)
            .map(|(q, p)| q * p)
            .sum();
        self.global_mean + bias + interaction
    }

    /// Predicted rating for an item with these tags, on the rating scale
    pub fn predict(&self, genres: &[String]) -> f32 {
        self.raw_predict(genres).clamp(MIN_RATING, MAX_RATING)
    }

    pub fn global_mean(&self) -> f32 {
        self.global_mean
    }
}
