use ndarray::{s, Array2, ArrayView2};

use crate::prelude::{BIN_COUNT, MISSING};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Elementwise product of a count matrix and a 0/1 acceptance mask.
    pub fn apply_mask(counts: ArrayView2<u32>, mask: ArrayView2<f64>) -> Array2<f64> {
        counts.mapv(f64::from) * &mask
    }

    /// Zeroes every diameter column in `first..=last`, across all velocity rows.
    pub fn zero_columns(matrix: &mut Array2<f64>, first: usize, last: usize) {
        matrix.slice_mut(s![.., first..=last]).fill(0.0);
    }

    pub fn zeros() -> Array2<f64> {
        Array2::zeros((BIN_COUNT, BIN_COUNT))
    }

    /// A matrix in which every cell is the missing sentinel.
    pub fn missing() -> Array2<f64> {
        Array2::from_elem((BIN_COUNT, BIN_COUNT), MISSING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_and_column_zeroing() {
        let counts = Array2::from_elem((BIN_COUNT, BIN_COUNT), 2u32);
        let mut mask = Array2::zeros((BIN_COUNT, BIN_COUNT));
        mask[[3, 4]] = 1.0;
        mask[[3, 9]] = 1.0;
        let mut filtered = MatrixHelper::apply_mask(counts.view(), mask.view());
        assert_eq!(filtered.sum(), 4.0);

        MatrixHelper::zero_columns(&mut filtered, 0, 5);
        assert_eq!(filtered[[3, 4]], 0.0);
        assert_eq!(filtered[[3, 9]], 2.0);
        assert!(MatrixHelper::missing().iter().all(|v| v.is_nan()));
    }
}
