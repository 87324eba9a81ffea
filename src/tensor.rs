use crate::error::{DdpError, DdpResult};

/// 3階テンソル (d0 x d1 x d2), row-major storage.
///
/// Used for second derivatives of the dynamics: the leading axis is the
/// output component, the trailing two axes are the differentiated inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    dims: (usize, usize, usize),
    data: Vec<f64>,
}

impl Tensor3 {
    pub fn zeros(d0: usize, d1: usize, d2: usize) -> Self {
        Self {
            dims: (d0, d1, d2),
            data: vec![0.0; d0 * d1 * d2],
        }
    }

    /// Stacks `d0` matrices of equal shape along the leading axis.
    pub fn from_slices(slices: &[na::DMatrix<f64>]) -> DdpResult<Self> {
        let (d1, d2) = slices.first().map_or((0, 0), |m| m.shape());
        let mut t = Self::zeros(slices.len(), d1, d2);
        for (i, m) in slices.iter().enumerate() {
            if m.shape() != (d1, d2) {
                return Err(DdpError::DimensionMismatch {
                    what: "tensor slice",
                    expected: (d1, d2),
                    actual: m.shape(),
                });
            }
            for j in 0..d1 {
                for k in 0..d2 {
                    t[(i, j, k)] = m[(j, k)];
                }
            }
        }
        Ok(t)
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.dims
    }

    /// `i` 番目の成分の行列
    pub fn slice(&self, i: usize) -> na::DMatrix<f64> {
        let (_, d1, d2) = self.dims;
        na::DMatrix::from_fn(d1, d2, |j, k| self[(i, j, k)])
    }

    /// Folds `v` against the leading axis: `C[j,k] = Σ_i v_i T[i,j,k]`.
    pub fn contract(&self, v: &na::DVector<f64>) -> na::DMatrix<f64> {
        let (d0, d1, d2) = self.dims;
        assert_eq!(v.len(), d0, "vector length must match the leading axis");
        let mut c = na::DMatrix::zeros(d1, d2);
        for i in 0..d0 {
            for j in 0..d1 {
                for k in 0..d2 {
                    c[(j, k)] += v[i] * self[(i, j, k)];
                }
            }
        }
        c
    }

    fn offset(&self, (i, j, k): (usize, usize, usize)) -> usize {
        let (d0, d1, d2) = self.dims;
        assert!(i < d0 && j < d1 && k < d2, "index out of bounds");
        (i * d1 + j) * d2 + k
    }
}

impl core::ops::Index<(usize, usize, usize)> for Tensor3 {
    type Output = f64;

    fn index(&self, idx: (usize, usize, usize)) -> &f64 {
        &self.data[self.offset(idx)]
    }
}

impl core::ops::IndexMut<(usize, usize, usize)> for Tensor3 {
    fn index_mut(&mut self, idx: (usize, usize, usize)) -> &mut f64 {
        let o = self.offset(idx);
        &mut self.data[o]
    }
}
