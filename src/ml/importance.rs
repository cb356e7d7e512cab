//! Permutation feature importance

use anyhow::Result;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use super::Regressor;

/// Mean squared error increase when each column is shuffled, normalised to sum to 1.
///
/// Negative increases are clamped to zero. If no column matters every score is 0.
/// Shuffles are drawn from a single seeded generator, so results are reproducible.
pub fn permutation_importance<R: Regressor + ?Sized>(
    model: &R,
    x: &[Vec<f64>],
    y: &[f64],
    repeats: usize,
    seed: u64,
) -> Result<Vec<f64>> {
    if x.len() != y.len() {
        anyhow::bail!(
            "Feature and target count mismatch: {} rows, {} targets",
            x.len(),
            y.len()
        );
    }
    let Some(first) = x.first() else {
        anyhow::bail!("Cannot compute importance on empty dataset");
    };
    let n_features = first.len();
    let repeats = repeats.max(1);

    let baseline = mean_squared_error(&model.predict_batch(x)?, y);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut raw = Vec::with_capacity(n_features);
    for column in 0..n_features {
        let mut increase = 0.0;
        for _ in 0..repeats {
            let mut values: Vec<f64> = x.iter().map(|row| row[column]).collect();
            values.shuffle(&mut rng);

            let permuted: Vec<Vec<f64>> = x
                .iter()
                .zip(values)
                .map(|(row, value)| {
                    let mut row = row.clone();
                    row[column] = value;
                    row
                })
                .collect();

            increase += mean_squared_error(&model.predict_batch(&permuted)?, y) - baseline;
        }
        raw.push((increase / repeats as f64).max(0.0));
    }

    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        return Ok(vec![0.0; n_features]);
    }
    Ok(raw.into_iter().map(|v| v / total).collect())
}

fn mean_squared_error(predicted: &[f64], actual: &[f64]) -> f64 {
    let n = actual.len().max(1) as f64;
    predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (p - a).powi(2))
        .sum::<f64>()
        / n
}
