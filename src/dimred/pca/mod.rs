use anyhow::bail;
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use std::sync::Arc;

use crate::svd::SVD;
use crate::utils::ensure_finite;
use crate::ProjectorError;

// Trait for SVD implementations
pub trait SVDImplementation: Send + Sync {
    /// Singular values in descending order and the matching rows of `Vᵀ`
    /// from a thin SVD.
    fn compute(&self, matrix: ArrayView2<f64>) -> anyhow::Result<(Array1<f64>, Array2<f64>)>;
}

/// Dense SVD backed by `nalgebra`, see [`SVD`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NalgebraSVD {
    pub max_iterations: usize,
}

impl SVDImplementation for NalgebraSVD {
    fn compute(&self, matrix: ArrayView2<f64>) -> anyhow::Result<(Array1<f64>, Array2<f64>)> {
        // PCA only needs the right singular vectors.
        let mut svd = SVD::new()
            .with_max_iterations(self.max_iterations)
            .with_left_vectors(false);
        svd.compute(matrix)?;
        match svd.into_parts() {
            (_, Some(s), Some(vt)) => Ok((s, vt)),
            _ => bail!(ProjectorError::Decomposition("empty decomposition".to_string())),
        }
    }
}

pub struct PCABuilder<S: SVDImplementation> {
    n_components: Option<usize>,
    svd_implementation: Arc<S>,
}

impl<S: SVDImplementation> PCABuilder<S> {
    pub fn new(svd_implementation: S) -> Self {
        PCABuilder {
            n_components: None,
            svd_implementation: Arc::new(svd_implementation),
        }
    }

    /// Number of directions to keep. Defaults to `min(n_samples, n_features)`.
    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = Some(n_components);
        self
    }

    pub fn build(self) -> Pca<S> {
        Pca {
            n_components: self.n_components,
            svd_implementation: self.svd_implementation,
        }
    }
}

/// Principal component analysis on dense, row-per-sample data.
///
/// The estimator only carries configuration; [`Pca::fit`] hands back an
/// immutable [`FittedPca`] so a fitted model can be shared and swapped as a
/// whole.
pub struct Pca<S: SVDImplementation = NalgebraSVD> {
    n_components: Option<usize>,
    svd_implementation: Arc<S>,
}

impl<S: SVDImplementation> Pca<S> {
    pub fn fit(&self, x: ArrayView2<f64>) -> anyhow::Result<FittedPca> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_features == 0 {
            bail!(ProjectorError::EmptyInput);
        }
        ensure_finite(&x)?;

        let available = n_samples.min(n_features);
        let n_components = self.n_components.unwrap_or(available);
        if n_components == 0 || n_components > available {
            bail!(ProjectorError::InvalidComponentCount {
                requested: n_components,
                available,
            });
        }

        log::debug!(
            "Fitting PCA: {} samples × {} features, keeping {} components",
            n_samples,
            n_features,
            n_components
        );

        let mean = x.mean_axis(Axis(0)).ok_or(ProjectorError::EmptyInput)?;
        let centered = center(x, &mean);

        let (singular_values, vt) = self.svd_implementation.compute(centered.view())?;
        if vt.nrows() < n_components || vt.ncols() != n_features {
            bail!(ProjectorError::Decomposition(format!(
                "expected at least {} right singular vectors of length {}, got {:?}",
                n_components,
                n_features,
                vt.shape()
            )));
        }

        let components = vt.slice(s![..n_components, ..]).to_owned();

        // A single sample carries no variance.
        let eigenvalues = if n_samples > 1 {
            let dof = (n_samples - 1) as f64;
            singular_values.mapv(|v| v * v / dof)
        } else {
            Array1::zeros(singular_values.len())
        };

        let total_variance = eigenvalues.sum();
        let explained_variance = eigenvalues.slice(s![..n_components]).to_owned();
        let explained_variance_ratio = if total_variance > 0.0 {
            &explained_variance / total_variance
        } else {
            Array1::zeros(n_components)
        };

        Ok(FittedPca {
            n_samples,
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
            total_variance,
        })
    }

    pub fn fit_transform(&self, x: ArrayView2<f64>) -> anyhow::Result<(FittedPca, Array2<f64>)> {
        let fitted = self.fit(x)?;
        let transformed = fitted.transform(x)?;
        Ok((fitted, transformed))
    }
}

/// Subtracts `mean` from every row.
fn center(x: ArrayView2<f64>, mean: &Array1<f64>) -> Array2<f64> {
    let mut centered = x.to_owned();
    centered
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| {
            row -= mean;
        });
    centered
}

/// Result of [`Pca::fit`]: the mean and the ranked orthonormal directions.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedPca {
    n_samples: usize,
    mean: Array1<f64>,
    components: Array2<f64>,
    explained_variance: Array1<f64>,
    explained_variance_ratio: Array1<f64>,
    total_variance: f64,
}

impl FittedPca {
    /// Projects rows of `x` onto every fitted direction.
    pub fn transform(&self, x: ArrayView2<f64>) -> anyhow::Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            bail!(ProjectorError::ShapeMismatch {
                expected: vec![x.nrows(), self.n_features()],
                found: x.shape().to_vec(),
            });
        }
        ensure_finite(&x)?;

        let centered = center(x, &self.mean);
        Ok(centered.dot(&self.components.t()))
    }

    /// Maps component-space rows back into feature space.
    pub fn inverse_transform(&self, y: ArrayView2<f64>) -> anyhow::Result<Array2<f64>> {
        if y.ncols() != self.n_components() {
            bail!(ProjectorError::ShapeMismatch {
                expected: vec![y.nrows(), self.n_components()],
                found: y.shape().to_vec(),
            });
        }
        ensure_finite(&y)?;

        let mut x = y.dot(&self.components);
        x += &self.mean;
        Ok(x)
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.components.ncols()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// One row per direction, ordered by descending explained variance.
    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    pub fn explained_variance_ratio(&self) -> &Array1<f64> {
        &self.explained_variance_ratio
    }

    pub fn total_variance(&self) -> f64 {
        self.total_variance
    }
}
