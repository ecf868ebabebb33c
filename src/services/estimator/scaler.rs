use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column min-max normalizer onto [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Array1<f64>,
    range: Array1<f64>,
}

impl MinMaxScaler {
    /// Zero-width columns get a range of 1 so they transform to 0.
    pub fn fit(data: ArrayView2<'_, f64>) -> Self {
        let min = data.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
        let max = data.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));
        let range = (&max - &min).mapv(|r| if r.is_finite() && r > 0.0 { r } else { 1.0 });
        Self { min, range }
    }

    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Array2<f64> {
        (&data - &self.min) / &self.range
    }

    pub fn inverse_transform(&self, data: ArrayView2<'_, f64>) -> Array2<f64> {
        &data * &self.range + &self.min
    }

    pub fn columns(&self) -> usize {
        self.min.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scales_each_column_independently() {
        let data = array![[10.0, 1.0, 25.0], [12.0, 3.0, 25.0], [11.0, 2.0, 25.0]];
        let scaler = MinMaxScaler::fit(data.view());
        let scaled = scaler.transform(data.view());

        assert_eq!(scaled.row(0).to_vec(), vec![0.0, 0.0, 0.0]);
        assert_eq!(scaled.row(1).to_vec(), vec![1.0, 1.0, 0.0]);
        assert_eq!(scaled.row(2).to_vec(), vec![0.5, 0.5, 0.0]);
        assert_eq!(scaler.columns(), 3);
    }

    #[test]
    fn inverse_restores_unscaled_values() {
        let target = array![[100.0], [0.0], [37.5]];
        let scaler = MinMaxScaler::fit(target.view());
        let scaled = scaler.transform(target.view());
        let back = scaler.inverse_transform(scaled.view());
        for (a, b) in back.iter().zip(target.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn out_of_range_values_extrapolate() {
        let data = array![[10.0], [20.0]];
        let scaler = MinMaxScaler::fit(data.view());
        let scaled = scaler.transform(array![[25.0]].view());
        assert!((scaled[[0, 0]] - 1.5).abs() < 1e-12);
    }
}
