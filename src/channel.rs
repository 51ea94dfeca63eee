use nalgebra::{DMatrix, DVector};

use crate::error::Error;
use crate::factor_file::{FactorStore, StoredMatrix};
use crate::Result;

const U_PREFIX: &str = "U_";
const W_PREFIX: &str = "W_";
const VT_PREFIX: &str = "Vt_";

/// Keys under which the factors of channel `index` are stored, in `U, W, Vt`
/// order.
pub fn factor_keys(index: usize) -> [String; 3] {
    [
        format!("{}{}", U_PREFIX, index),
        format!("{}{}", W_PREFIX, index),
        format!("{}{}", VT_PREFIX, index),
    ]
}

/// Singular value decomposition `U * diag(W) * Vt` of one image plane.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    u: DMatrix<f64>,
    w: DVector<f64>,
    vt: DMatrix<f64>,
}

impl Channel {
    /// Thin decomposition, `W` holds `min(rows, cols)` values in descending
    /// order.
    pub fn decompose(matrix: DMatrix<f64>) -> Result<Self> {
        let svd = matrix
            .try_svd(true, true, f64::EPSILON, 0)
            .ok_or(Error::DecompositionDidNotConverge)?;
        let u = svd.u.ok_or(Error::DecompositionDidNotConverge)?;
        let vt = svd.v_t.ok_or(Error::DecompositionDidNotConverge)?;
        Ok(Self {
            u,
            w: svd.singular_values,
            vt,
        })
    }

    /// Wraps already known factors. Only the shapes are checked, orthogonality
    /// of `U` and `Vt` is trusted.
    pub fn from_factors(u: DMatrix<f64>, w: DVector<f64>, vt: DMatrix<f64>) -> Result<Self> {
        if u.ncols() != w.len() || vt.nrows() != w.len() {
            return Err(Error::MismatchOfFactorShapes {
                u: u.shape(),
                w: w.len(),
                vt: vt.shape(),
            });
        }
        Ok(Self { u, w, vt })
    }

    /// Reads the factors of channel `index`, `None` if none of them is
    /// present. Empty factors count as absent.
    pub fn restore(store: &FactorStore, index: usize) -> Result<Option<Self>> {
        let [u_key, w_key, vt_key] = factor_keys(index);
        let stored = |key: &str| store.get(key).filter(|matrix| !matrix.is_empty());
        let (u, w, vt) = match (stored(&u_key), stored(&w_key), stored(&vt_key)) {
            (None, None, None) => return Ok(None),
            (Some(u), Some(w), Some(vt)) => (u, w, vt),
            (None, _, _) => return Err(Error::MissingFactor(u_key)),
            (_, None, _) => return Err(Error::MissingFactor(w_key)),
            (_, _, None) => return Err(Error::MissingFactor(vt_key)),
        };
        let channel = Self::from_factors(
            u.to_matrix(&u_key)?,
            w.to_vector(&w_key)?,
            vt.to_matrix(&vt_key)?,
        )?;
        Ok(Some(channel))
    }

    pub fn serialize(&self, store: &mut FactorStore, index: usize) {
        let [u_key, w_key, vt_key] = factor_keys(index);
        store.insert(u_key, StoredMatrix::from_matrix(&self.u));
        store.insert(w_key, StoredMatrix::from_vector(&self.w));
        store.insert(vt_key, StoredMatrix::from_matrix(&self.vt));
    }

    pub fn u(&self) -> &DMatrix<f64> {
        &self.u
    }

    pub fn singular_values(&self) -> &DVector<f64> {
        &self.w
    }

    pub fn vt(&self) -> &DMatrix<f64> {
        &self.vt
    }

    pub fn rank(&self) -> usize {
        self.w.len()
    }

    /// Shape of the reconstructed plane.
    pub fn shape(&self) -> (usize, usize) {
        (self.u.nrows(), self.vt.ncols())
    }

    /// Number of singular values strictly greater than `threshold`.
    pub fn retained(&self, threshold: f64) -> usize {
        self.w.iter().filter(|&&value| value > threshold).count()
    }

    /// Reconstructs the plane from the singular values strictly greater than
    /// `threshold`, all others are zeroed.
    pub fn compose(&self, threshold: f64) -> DMatrix<f64> {
        let sigma = self
            .w
            .map(|value| if value > threshold { value } else { 0.0 });
        self.compose_with(&sigma)
    }

    /// Reconstructs the plane from the `rank` leading singular values, zero
    /// keeps all of them.
    pub fn compose_rank(&self, rank: usize) -> Result<DMatrix<f64>> {
        if rank > self.rank() {
            return Err(Error::RankOutOfRange(rank, self.rank()));
        }
        let keep = if rank == 0 { self.rank() } else { rank };
        let mut sigma = self.w.clone();
        sigma.rows_mut(keep, self.rank() - keep).fill(0.0);
        Ok(self.compose_with(&sigma))
    }

    fn compose_with(&self, sigma: &DVector<f64>) -> DMatrix<f64> {
        // U * diag(sigma) without materializing the diagonal matrix
        let mut scaled = self.u.clone();
        for (mut column, value) in scaled.column_iter_mut().zip(sigma.iter()) {
            column *= *value;
        }
        scaled * &self.vt
    }
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use nalgebra::{DMatrix, DVector};

    use super::{factor_keys, Channel};
    use crate::error::ErrorKind;
    use crate::factor_file::{FactorStore, StoredMatrix};

    fn test_matrix() -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 4, &[1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0])
    }

    fn patterned_matrix(rows: usize, cols: usize) -> DMatrix<f64> {
        DMatrix::from_fn(rows, cols, |row, col| {
            ((row * 7 + col * 13) % 17) as f64 * 15.0 + (row as f64 - col as f64).abs()
        })
    }

    fn frobenius_distance(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
        (a - b).norm()
    }

    #[test]
    fn decompose_into_thin_factors() {
        let channel = Channel::decompose(patterned_matrix(5, 3)).unwrap();
        assert_eq!(channel.u().shape(), (5, 3));
        assert_eq!(channel.singular_values().len(), 3);
        assert_eq!(channel.vt().shape(), (3, 3));
        assert_eq!(channel.shape(), (5, 3));

        let channel = Channel::decompose(patterned_matrix(3, 6)).unwrap();
        assert_eq!(channel.u().shape(), (3, 3));
        assert_eq!(channel.vt().shape(), (3, 6));
        assert_eq!(channel.shape(), (3, 6));
    }

    #[test]
    fn singular_values_are_sorted_and_non_negative() {
        let channel = Channel::decompose(patterned_matrix(8, 6)).unwrap();
        let values = channel.singular_values();
        for pair in values.as_slice().windows(2) {
            assert!(pair[0] >= pair[1], "{} is smaller than {}", pair[0], pair[1]);
        }
        assert!(values.iter().all(|&value| value >= 0.0));
    }

    #[test]
    fn compose_without_truncation_is_lossless() {
        for matrix in [test_matrix(), patterned_matrix(6, 9), patterned_matrix(9, 6)] {
            let channel = Channel::decompose(matrix.clone()).unwrap();
            for threshold in [0.0, -1.0, -1e9] {
                assert_abs_diff_eq!(channel.compose(threshold), matrix, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn compose_rank_one_matrix_from_one_value() {
        let channel = Channel::decompose(test_matrix()).unwrap();
        assert_eq!(channel.retained(1e-6), 1);
        assert_abs_diff_eq!(channel.compose(1e-6), test_matrix(), epsilon = 1e-12);
    }

    #[test]
    fn compose_above_largest_value_yields_zero_matrix() {
        let channel = Channel::decompose(patterned_matrix(4, 7)).unwrap();
        let largest = channel.singular_values()[0];
        for threshold in [largest, largest * 2.0] {
            let result = channel.compose(threshold);
            assert_eq!(result.shape(), (4, 7));
            assert!(result.iter().all(|&value| value == 0.0));
        }
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let u = DMatrix::identity(2, 2);
        let w = DVector::from_vec(vec![5.0, 2.0]);
        let vt = DMatrix::identity(2, 2);
        let channel = Channel::from_factors(u, w, vt).unwrap();
        assert_eq!(channel.retained(2.0), 1);
        assert_eq!(channel.compose(2.0), DMatrix::from_row_slice(2, 2, &[5.0, 0.0, 0.0, 0.0]));
        assert_eq!(channel.retained(1.999), 2);
    }

    #[test]
    fn degradation_is_monotonic_in_threshold() {
        let matrix = patterned_matrix(10, 8);
        let channel = Channel::decompose(matrix).unwrap();
        let lossless = channel.compose(0.0);
        let largest = channel.singular_values()[0];
        let mut previous_retained = usize::MAX;
        let mut previous_error = 0.0;
        for step in 0..=20 {
            let threshold = largest * step as f64 / 20.0;
            let retained = channel.retained(threshold);
            let error = frobenius_distance(&channel.compose(threshold), &lossless);
            assert!(retained <= previous_retained, "retained more values at {}", threshold);
            assert!(error + 1e-9 >= previous_error, "error decreased at {}", threshold);
            previous_retained = retained;
            previous_error = error;
        }
    }

    #[test]
    fn compose_with_leading_values() {
        let channel = Channel::decompose(patterned_matrix(6, 6)).unwrap();
        let all = channel.compose_rank(0).unwrap();
        assert_abs_diff_eq!(all, channel.compose(-1.0), epsilon = 1e-12);
        let full = channel.compose_rank(channel.rank()).unwrap();
        assert_abs_diff_eq!(full, all, epsilon = 1e-12);
        let two = channel.compose_rank(2).unwrap();
        let threshold = channel.singular_values()[2];
        assert!(channel.singular_values()[1] > threshold);
        assert_abs_diff_eq!(two, channel.compose(threshold), epsilon = 1e-9);
    }

    #[test]
    fn reject_rank_out_of_range() {
        let channel = Channel::decompose(test_matrix()).unwrap();
        let error = channel.compose_rank(3).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn construct_from_known_factors() {
        let u = DMatrix::from_row_slice(
            2,
            2,
            &[-0.7071067811865477, -0.7071067811865475, -0.7071067811865475, 0.7071067811865476],
        );
        let w = DVector::from_vec(vec![7.745966692414833e+00, 9.420554752102651e-16]);
        let vt = DMatrix::from_row_slice(
            2,
            4,
            &[
                -0.1825741858350552, -0.3651483716701107, -0.5477225575051661, -0.7302967433402214,
                -0.9737289911202952, 0.0326709649048479, 0.2156731140239386, 0.0653419298096959,
            ],
        );
        let channel = Channel::from_factors(u, w, vt).unwrap();
        assert_eq!(channel.retained(1e-6), 1);
        assert_abs_diff_eq!(channel.compose(1e-6), test_matrix(), epsilon = 1e-14);
    }

    #[test]
    fn reject_inconsistent_factor_shapes() {
        let u = DMatrix::identity(3, 3);
        let w = DVector::from_vec(vec![1.0, 1.0]);
        let vt = DMatrix::identity(2, 2);
        let error = Channel::from_factors(u, w, vt).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedFactorData);
    }

    #[test]
    fn serialize_under_indexed_keys() {
        let channel = Channel::decompose(test_matrix()).unwrap();
        let mut store = FactorStore::new();
        channel.serialize(&mut store, 2);
        assert_eq!(factor_keys(2), ["U_2", "W_2", "Vt_2"]);
        assert_eq!(store.get("U_2").unwrap().rows(), 2);
        assert_eq!(store.get("W_2").unwrap().cols(), 1);
        assert_eq!(store.get("Vt_2").unwrap().cols(), 4);
        let restored = Channel::restore(&store, 2).unwrap().unwrap();
        assert_eq!(restored, channel);
        assert!(Channel::restore(&store, 0).unwrap().is_none());
    }

    #[test]
    fn report_partially_stored_channel() {
        let mut store = FactorStore::new();
        store.insert("U_0", StoredMatrix::new(1, 1, vec![1.0]));
        store.insert("W_0", StoredMatrix::new(1, 1, vec![1.0]));
        let error = Channel::restore(&store, 0).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedFactorData);
        assert_eq!(error.to_string(), "Factor 'Vt_0' is missing from the factor file");
    }

    #[test]
    fn treat_empty_factors_as_absent() {
        let mut store = FactorStore::new();
        store.insert("U_0", StoredMatrix::new(0, 0, Vec::new()));
        store.insert("W_0", StoredMatrix::new(0, 1, Vec::new()));
        store.insert("Vt_0", StoredMatrix::new(0, 0, Vec::new()));
        assert!(Channel::restore(&store, 0).unwrap().is_none());

        store.insert("U_0", StoredMatrix::new(1, 1, vec![1.0]));
        store.insert("Vt_0", StoredMatrix::new(1, 1, vec![1.0]));
        let error = Channel::restore(&store, 0).unwrap_err();
        assert_eq!(error.to_string(), "Factor 'W_0' is missing from the factor file");
    }
}
