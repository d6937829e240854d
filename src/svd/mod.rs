use anyhow::anyhow;
use ndarray::{Array1, Array2, ArrayView2};
use nshare::{IntoNalgebra, IntoNdarray2};
use single_svdlib::randomized::svd_flip;

use crate::ProjectorError;

/// Dense thin singular value decomposition `X = U · diag(s) · Vᵀ`.
///
/// The factorisation is done by `nalgebra`, which returns singular values in
/// descending order. Signs are then fixed with `svd_flip` so two fits of the
/// same matrix always agree on the orientation of every direction.
pub struct SVD {
    max_iterations: usize,
    compute_u: bool,
    u: Option<Array2<f64>>,
    s: Option<Array1<f64>>,
    vt: Option<Array2<f64>>,
}

impl SVD {
    pub fn new() -> Self {
        SVD {
            max_iterations: 0,
            compute_u: true,
            u: None,
            s: None,
            vt: None,
        }
    }

    /// Caps the number of implicit QR sweeps. `0` iterates until convergence.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Skips the left factor when only `s` and `Vᵀ` are needed.
    pub fn with_left_vectors(mut self, compute_u: bool) -> Self {
        self.compute_u = compute_u;
        self
    }

    pub fn compute(&mut self, x: ArrayView2<f64>) -> anyhow::Result<()> {
        let (n_rows, n_cols) = x.dim();
        log::trace!("Computing thin SVD of a {} × {} matrix", n_rows, n_cols);

        let matrix = x.into_nalgebra().clone_owned();
        let svd = nalgebra::SVD::try_new(
            matrix,
            self.compute_u,
            true,
            f64::EPSILON,
            self.max_iterations,
        )
        .ok_or_else(|| {
            ProjectorError::Decomposition(format!(
                "no convergence within {} iterations",
                self.max_iterations
            ))
        })?;

        let s = Array1::from(svd.singular_values.as_slice().to_vec());
        let mut vt = svd
            .v_t
            .ok_or_else(|| anyhow!("right singular vectors were not computed"))?;

        let u = match svd.u {
            Some(mut u) => {
                svd_flip(Some(&mut u), Some(&mut vt), false)
                    .map_err(|e| ProjectorError::Decomposition(e.to_string()))?;
                Some(u.into_ndarray2().into_owned())
            }
            None => {
                svd_flip(None, Some(&mut vt), false)
                    .map_err(|e| ProjectorError::Decomposition(e.to_string()))?;
                None
            }
        };

        self.u = u;
        self.s = Some(s);
        self.vt = Some(vt.into_ndarray2().into_owned());

        Ok(())
    }

    pub fn u(&self) -> Option<&Array2<f64>> {
        self.u.as_ref()
    }

    pub fn s(&self) -> Option<&Array1<f64>> {
        self.s.as_ref()
    }

    pub fn vt(&self) -> Option<&Array2<f64>> {
        self.vt.as_ref()
    }

    // Reconstruct the original matrix
    pub fn reconstruct(&self) -> Option<Array2<f64>> {
        match (self.u(), self.s(), self.vt()) {
            (Some(u), Some(s), Some(vt)) => {
                let s_diag = Array2::from_diag(s);
                Some(u.dot(&s_diag).dot(vt))
            }
            _ => None,
        }
    }

    /// Consumes the decomposition and hands back `(U, s, Vᵀ)`.
    pub fn into_parts(self) -> (Option<Array2<f64>>, Option<Array1<f64>>, Option<Array2<f64>>) {
        (self.u, self.s, self.vt)
    }
}

impl Default for SVD {
    fn default() -> Self {
        Self::new()
    }
}
