//! Per-feature min-max scaling to [0, 1]

use crate::core::errors::StegError;
use crate::Result;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl MinMaxScaler {
    /// Learn per-column minimum and maximum
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(StegError::TrainingError("cannot fit a scaler on an empty matrix".to_string()));
        }

        let mut min = Vec::with_capacity(x.ncols());
        let mut max = Vec::with_capacity(x.ncols());
        for column in x.axis_iter(Axis(1)) {
            let (lo, hi) = column
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            min.push(lo);
            max.push(hi);
        }

        Ok(Self { min, max })
    }

    pub fn width(&self) -> usize {
        self.min.len()
    }

    /// Scale columns with the learned range; constant columns map to zero offset
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.width() {
            return Err(StegError::SchemaMismatch {
                message: format!("scaler expects {} features, got {}", self.width(), x.ncols()),
            });
        }

        let mut scaled = x.clone();
        for (j, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            let range = self.max[j] - self.min[j];
            let scale = if range == 0.0 { 1.0 } else { range };
            let min = self.min[j];
            column.mapv_inplace(|v| (v - min) / scale);
        }
        Ok(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_unit_range() {
        let x = array![[1.0, 10.0], [3.0, 20.0], [2.0, 30.0]];
        let scaler = MinMaxScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x).unwrap();

        assert_eq!(scaled, array![[0.0, 0.0], [1.0, 0.5], [0.5, 1.0]]);
    }

    #[test]
    fn test_constant_column_and_out_of_range() {
        let x = array![[5.0, 0.0], [5.0, 2.0]];
        let scaler = MinMaxScaler::fit(&x).unwrap();

        let scaled = scaler.transform(&array![[6.0, 4.0]]).unwrap();
        assert_eq!(scaled, array![[1.0, 2.0]]);
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = MinMaxScaler::fit(&array![[1.0, 2.0]]).unwrap();
        assert!(scaler.transform(&array![[1.0]]).is_err());
        assert!(MinMaxScaler::fit(&Array2::zeros((0, 3))).is_err());
    }
}
