//! Column-wise z-score standardisation

use serde::{Deserialize, Serialize};

use crate::forecast::DataError;

/// Per-column mean and population standard deviation.
///
/// A constant column gets a scale of 1 so the transform stays invertible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &[Vec<f64>]) -> Result<Self, DataError> {
        let first = x.first().ok_or(DataError::InsufficientRows {
            required: 1,
            actual: 0,
        })?;
        let n_features = first.len();
        check_shape(x, n_features)?;

        let n = x.len() as f64;
        let means: Vec<f64> = (0..n_features)
            .map(|j| x.iter().map(|row| row[j]).sum::<f64>() / n)
            .collect();

        let scales = means
            .iter()
            .enumerate()
            .map(|(j, mean)| {
                let variance = x.iter().map(|row| (row[j] - mean).powi(2)).sum::<f64>() / n;
                let std = variance.sqrt();
                if std < 1e-10 {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Ok(Self { means, scales })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, DataError> {
        check_shape(x, self.n_features())?;
        Ok(x
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(self.scales.iter()))
                    .map(|(v, (mean, scale))| (v - mean) / scale)
                    .collect()
            })
            .collect())
    }

    pub fn inverse_transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, DataError> {
        check_shape(x, self.n_features())?;
        Ok(x
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(self.scales.iter()))
                    .map(|(v, (mean, scale))| v * scale + mean)
                    .collect()
            })
            .collect())
    }
}

fn check_shape(x: &[Vec<f64>], expected: usize) -> Result<(), DataError> {
    match x.iter().position(|row| row.len() != expected) {
        Some(row) => Err(DataError::ShapeMismatch {
            row,
            expected,
            actual: x[row].len(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fit_transform_standardises_columns() {
        let x = vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]];
        let scaler = StandardScaler::fit(&x).unwrap();

        assert_eq!(scaler.means, vec![2.0, 20.0]);
        let scaled = scaler.transform(&x).unwrap();
        for j in 0..2 {
            let mean: f64 = scaled.iter().map(|r| r[j]).sum::<f64>() / 3.0;
            let var: f64 = scaled.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_constant_column_uses_unit_scale() {
        let x = vec![vec![5.0], vec![5.0], vec![5.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        assert_eq!(scaler.scales, vec![1.0]);
        assert_eq!(scaler.transform(&x).unwrap(), vec![vec![0.0]; 3]);
    }

    #[test]
    fn test_shape_mismatch() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let err = scaler.transform(&[vec![1.0]]).unwrap_err();
        assert_eq!(
            err,
            DataError::ShapeMismatch { row: 0, expected: 2, actual: 1 }
        );
        assert!(StandardScaler::fit(&[]).is_err());
    }

    proptest! {
        #[test]
        fn prop_inverse_transform_round_trip(
            rows in prop::collection::vec(prop::collection::vec(-1e6f64..1e6, 3), 2..40)
        ) {
            let scaler = StandardScaler::fit(&rows).unwrap();
            let restored = scaler.inverse_transform(&scaler.transform(&rows).unwrap()).unwrap();
            for (original, back) in rows.iter().zip(restored.iter()) {
                for (a, b) in original.iter().zip(back.iter()) {
                    prop_assert!((a - b).abs() <= 1e-6 * (1.0 + a.abs()));
                }
            }
        }
    }
}
