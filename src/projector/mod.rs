//! # Parameter-space projector
//!
//! [`Projector`] fits PCA to a fixed collection of parameter vectors, such as
//! the iterates of an optimiser, and maps between parameter space and the
//! plane spanned by two chosen principal directions. Plotting code uses it to
//! lay a 2D scan grid over that plane and to turn grid points back into
//! parameter vectors.
//!
//! The first axis of a collection indexes the vectors; the remaining axes are
//! the parameter shape, which is restored on everything handed back.

use anyhow::bail;
use ndarray::{ArcArray, Array, Array1, Array2, ArrayBase, ArrayD, ArrayViewD, Axis, Data, Dimension, Ix1, IxDyn};
use std::sync::Arc;

use crate::dimred::pca::{FittedPca, NalgebraSVD, PCABuilder};
use crate::utils::{count_rows, flatten, parameter_size, reshape};
use crate::ProjectorError;

/// Display axes used when none are given.
pub const DEFAULT_COMPONENT_INDICES: (usize, usize) = (0, 1);

/// Margin added below and above the projected points by
/// [`Projector::suggested_bounds`].
pub const DEFAULT_BOUNDS_OFFSET: (f64, f64) = (-1.0, 1.0);

/// Inclusive `(lower, upper)` range along one display axis.
pub type AxisRange = (f64, f64);

/// PCA fitted to a collection of parameter vectors, with two of the fitted
/// directions selected as display axes.
///
/// The model always holds `max(component_indices) + 1` directions.
#[derive(Debug, Clone)]
pub struct Projector {
    points: ArcArray<f64, IxDyn>,
    parameter_shape: Vec<usize>,
    component_indices: (usize, usize),
    fitted: Arc<FittedPca>,
}

impl Projector {
    /// Fits a projector to `points`, whose first axis indexes the vectors.
    ///
    /// # Errors
    /// - [`ProjectorError::EmptyInput`] when there are no vectors or a vector
    ///   has no entries
    /// - [`ProjectorError::InvalidIndices`] when the collection cannot yield
    ///   `max(component_indices) + 1` directions
    pub fn new<D: Dimension>(
        points: Array<f64, D>,
        component_indices: (usize, usize),
    ) -> anyhow::Result<Self> {
        Self::from_shared(points.into_shared(), component_indices)
    }

    /// Same as [`Projector::new`] with [`DEFAULT_COMPONENT_INDICES`].
    pub fn with_default_indices<D: Dimension>(points: Array<f64, D>) -> anyhow::Result<Self> {
        Self::new(points, DEFAULT_COMPONENT_INDICES)
    }

    /// Fits a projector to an already shared collection without copying it.
    pub fn from_shared<D: Dimension>(
        points: ArcArray<f64, D>,
        component_indices: (usize, usize),
    ) -> anyhow::Result<Self> {
        let points = points.into_dyn();
        let parameter_shape = match points.shape().split_first() {
            Some((&n_points, rest)) if n_points > 0 && parameter_size(rest) > 0 => rest.to_vec(),
            _ => bail!(ProjectorError::EmptyInput),
        };

        let fitted = fit_collection(&points, &parameter_shape, component_indices)?;
        log::debug!(
            "Projector fitted to {} points of shape {:?}, display axes {:?}",
            points.len_of(Axis(0)),
            parameter_shape,
            component_indices
        );

        Ok(Projector {
            points,
            parameter_shape,
            component_indices,
            fitted: Arc::new(fitted),
        })
    }

    /// Selects new display axes and refits on the stored collection.
    ///
    /// Always refits, even for unchanged indices. On error the projector is
    /// left exactly as it was.
    pub fn set_component_indices(&mut self, component_indices: (usize, usize)) -> anyhow::Result<()> {
        let fitted = fit_collection(&self.points, &self.parameter_shape, component_indices)?;
        log::debug!(
            "Refitted projector: display axes {:?} -> {:?}, {} components",
            self.component_indices,
            component_indices,
            fitted.n_components()
        );

        self.fitted = Arc::new(fitted);
        self.component_indices = component_indices;
        Ok(())
    }

    /// Projects the stored collection onto every fitted direction,
    /// `(n_points, n_components)`.
    pub fn transform(&self) -> anyhow::Result<Array2<f64>> {
        self.transform_points(&self.points)
    }

    /// Projects caller-supplied vectors onto every fitted direction.
    ///
    /// `points` is either a collection `[n, ...parameter_shape]`, which may be
    /// empty, or a single vector of `parameter_shape`.
    pub fn transform_points<S, D>(&self, points: &ArrayBase<S, D>) -> anyhow::Result<Array2<f64>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let n_rows = count_rows(points.shape(), &self.parameter_shape)?;
        let flat = flatten(points, n_rows, self.fitted.n_features())?;
        self.fitted.transform(flat.view())
    }

    /// Reconstructs one parameter vector from its component-space
    /// coordinates: `coordinates · components + mean`.
    pub fn inverse_transform<S>(&self, coordinates: &ArrayBase<S, Ix1>) -> anyhow::Result<ArrayD<f64>>
    where
        S: Data<Elem = f64>,
    {
        if coordinates.len() != self.n_components() {
            bail!(ProjectorError::ShapeMismatch {
                expected: vec![self.n_components()],
                found: vec![coordinates.len()],
            });
        }

        let restored = self
            .fitted
            .inverse_transform(coordinates.view().insert_axis(Axis(0)))?;
        reshape(&restored.index_axis(Axis(0), 0), &self.parameter_shape)
    }

    /// Parameter vector at `(x, y)` on the display plane, with every other
    /// fitted coordinate set to zero. If both display axes coincide `y` wins.
    pub fn point_on_plane(&self, x: f64, y: f64) -> anyhow::Result<ArrayD<f64>> {
        let mut coordinates = Array1::zeros(self.n_components());
        coordinates[self.component_indices.0] = x;
        coordinates[self.component_indices.1] = y;
        self.inverse_transform(&coordinates)
    }

    /// Fitted directions as `[n_components, ...parameter_shape]`, ordered by
    /// descending explained variance.
    pub fn components(&self) -> anyhow::Result<ArrayD<f64>> {
        let mut shape = Vec::with_capacity(self.parameter_shape.len() + 1);
        shape.push(self.n_components());
        shape.extend_from_slice(&self.parameter_shape);
        reshape(self.fitted.components(), &shape)
    }

    /// Fitted mean in `parameter_shape`.
    pub fn mean(&self) -> anyhow::Result<ArrayD<f64>> {
        reshape(self.fitted.mean(), &self.parameter_shape)
    }

    /// Scan ranges `(x_range, y_range)` covering the stored collection along
    /// the two display axes, widened by `offset`: each range is
    /// `(min + offset.0, max + offset.1)`.
    ///
    /// Projects the collection afresh on every call.
    pub fn suggested_bounds(&self, offset: (f64, f64)) -> anyhow::Result<(AxisRange, AxisRange)> {
        let projected = self.transform()?;
        let (x_axis, y_axis) = self.component_indices;
        Ok((
            axis_range(&projected, x_axis, offset),
            axis_range(&projected, y_axis, offset),
        ))
    }

    pub fn component_indices(&self) -> (usize, usize) {
        self.component_indices
    }

    pub fn n_components(&self) -> usize {
        self.fitted.n_components()
    }

    pub fn parameter_shape(&self) -> &[usize] {
        &self.parameter_shape
    }

    pub fn points(&self) -> ArrayViewD<'_, f64> {
        self.points.view()
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        self.fitted.explained_variance()
    }

    pub fn explained_variance_ratio(&self) -> &Array1<f64> {
        self.fitted.explained_variance_ratio()
    }

    pub fn model(&self) -> &FittedPca {
        &self.fitted
    }

    /// Shared handle to the current fit. Later calls to
    /// [`Projector::set_component_indices`] replace the projector's model but
    /// leave this snapshot untouched.
    pub fn snapshot(&self) -> Arc<FittedPca> {
        Arc::clone(&self.fitted)
    }
}

/// Fits a projector with [`DEFAULT_COMPONENT_INDICES`].
pub fn fit_projector<D: Dimension>(points: Array<f64, D>) -> anyhow::Result<Projector> {
    Projector::with_default_indices(points)
}

fn fit_collection(
    points: &ArcArray<f64, IxDyn>,
    parameter_shape: &[usize],
    component_indices: (usize, usize),
) -> anyhow::Result<FittedPca> {
    let n_points = points.len_of(Axis(0));
    let width = parameter_size(parameter_shape);

    let required = component_indices.0.max(component_indices.1) + 1;
    let available = n_points.min(width);
    if required > available {
        bail!(ProjectorError::InvalidIndices {
            indices: component_indices,
            required,
            available,
        });
    }

    let flat = flatten(points, n_points, width)?;
    PCABuilder::new(NalgebraSVD::default())
        .n_components(required)
        .build()
        .fit(flat.view())
}

fn axis_range(projected: &Array2<f64>, axis: usize, offset: (f64, f64)) -> AxisRange {
    let (min, max) = projected
        .column(axis)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    (min + offset.0, max + offset.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};
    use std::f64::consts::SQRT_2;

    fn downcast(err: &anyhow::Error) -> &ProjectorError {
        err.downcast_ref::<ProjectorError>().unwrap()
    }

    #[test]
    fn test_triangle_bounds() {
        let projector = Projector::with_default_indices(array![[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]]).unwrap();
        let (x_range, y_range) = projector.suggested_bounds(DEFAULT_BOUNDS_OFFSET).unwrap();

        // first direction ±(1, -1)/√2 puts the points at 0, √2 and -√2
        assert_abs_diff_eq!(x_range.0, -SQRT_2 - 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(x_range.1, SQRT_2 + 1.0, epsilon = 1e-10);

        // second direction ±(1, 1)/√2 puts them at -2√2/3, √2/3, √2/3 up to sign
        let low = -2.0 * SQRT_2 / 3.0;
        let high = SQRT_2 / 3.0;
        let (lo, hi) = if y_range.0 + 1.0 < -0.5 { (low, high) } else { (-high, -low) };
        assert_abs_diff_eq!(y_range.0, lo - 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(y_range.1, hi + 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_bounds_offset_applied_per_side() {
        let projector = Projector::with_default_indices(array![[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]]).unwrap();
        let (tight_x, tight_y) = projector.suggested_bounds((0.0, 0.0)).unwrap();
        let (wide_x, wide_y) = projector.suggested_bounds((-0.5, 2.0)).unwrap();

        assert_abs_diff_eq!(wide_x.0, tight_x.0 - 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(wide_x.1, tight_x.1 + 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wide_y.0, tight_y.0 - 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(wide_y.1, tight_y.1 + 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_structured_parameter_shape() {
        let points = Array3::from_shape_fn((5, 2, 3), |(i, j, k)| {
            ((i + 1) * (j + 2)) as f64 + (k as f64) * (i as f64).sin()
        });
        let projector = Projector::new(points.clone(), (0, 2)).unwrap();

        assert_eq!(projector.parameter_shape(), &[2, 3]);
        assert_eq!(projector.n_components(), 3);
        assert_eq!(projector.components().unwrap().shape(), &[3, 2, 3]);
        assert_eq!(projector.mean().unwrap().shape(), &[2, 3]);
        assert_eq!(projector.transform().unwrap().shape(), &[5, 3]);

        let restored = projector.inverse_transform(&array![0.0, 0.0, 0.0]).unwrap();
        let mean = points.mean_axis(Axis(0)).unwrap();
        for (r, m) in restored.iter().zip(mean.iter()) {
            assert_abs_diff_eq!(*r, *m, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_point_on_plane() {
        let points = array![[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 3.0], [1.0, 1.0, 1.0]];
        let projector = Projector::new(points, (0, 2)).unwrap();

        let point = projector.point_on_plane(0.7, -1.3).unwrap();
        let coordinates = projector.transform_points(&point).unwrap();
        assert_eq!(coordinates.shape(), &[1, 3]);
        assert_abs_diff_eq!(coordinates[[0, 0]], 0.7, epsilon = 1e-10);
        assert_abs_diff_eq!(coordinates[[0, 1]], 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(coordinates[[0, 2]], -1.3, epsilon = 1e-10);
    }

    #[test]
    fn test_failed_refit_keeps_state() {
        let mut projector = Projector::with_default_indices(array![[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]]).unwrap();
        let before = projector.snapshot();

        let err = projector.set_component_indices((0, 2)).unwrap_err();
        assert_eq!(
            downcast(&err),
            &ProjectorError::InvalidIndices {
                indices: (0, 2),
                required: 3,
                available: 2,
            }
        );
        assert_eq!(projector.component_indices(), (0, 1));
        assert!(Arc::ptr_eq(&before, &projector.snapshot()));
    }

    #[test]
    fn test_snapshot_survives_refit() {
        let points = array![[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 3.0], [1.0, 1.0, 1.0]];
        let mut projector = Projector::with_default_indices(points).unwrap();
        let snapshot = projector.snapshot();

        projector.set_component_indices((1, 2)).unwrap();
        assert_eq!(snapshot.n_components(), 2);
        assert_eq!(projector.n_components(), 3);
        assert!(!Arc::ptr_eq(&snapshot, &projector.snapshot()));
    }

    #[test]
    fn test_empty_and_degenerate_input() {
        let err = Projector::with_default_indices(Array2::<f64>::zeros((0, 4))).unwrap_err();
        assert_eq!(downcast(&err), &ProjectorError::EmptyInput);

        let err = Projector::with_default_indices(ndarray::arr0(1.0)).unwrap_err();
        assert_eq!(downcast(&err), &ProjectorError::EmptyInput);

        let err = Projector::with_default_indices(Array3::<f64>::zeros((3, 0, 2))).unwrap_err();
        assert_eq!(downcast(&err), &ProjectorError::EmptyInput);
    }

    #[test]
    fn test_scalar_parameters() {
        // each parameter vector is a single number
        let projector = Projector::new(array![1.0, 2.0, 4.0], (0, 0)).unwrap();
        assert!(projector.parameter_shape().is_empty());
        assert_eq!(projector.n_components(), 1);
        assert_eq!(projector.mean().unwrap().ndim(), 0);

        let (x_range, y_range) = projector.suggested_bounds((0.0, 0.0)).unwrap();
        assert_eq!(x_range, y_range);
        assert_abs_diff_eq!(x_range.1 - x_range.0, 3.0, epsilon = 1e-10);
    }
}
