use anyhow::bail;
use ndarray::{ArrayBase, ArrayD, CowArray, Data, Dimension, Ix2, IxDyn};

use crate::ProjectorError;

/// Number of scalars in one parameter vector. An empty shape is a scalar.
pub(crate) fn parameter_size(parameter_shape: &[usize]) -> usize {
    parameter_shape.iter().product()
}

/// Number of parameter vectors in `points`, accepting either a collection
/// (`[n, ...parameter_shape]`) or a single vector (`parameter_shape`).
pub(crate) fn count_rows(shape: &[usize], parameter_shape: &[usize]) -> anyhow::Result<usize> {
    if shape == parameter_shape {
        return Ok(1);
    }
    match shape.split_first() {
        Some((&n_rows, rest)) if rest == parameter_shape => Ok(n_rows),
        _ => bail!(ProjectorError::ShapeMismatch {
            expected: parameter_shape.to_vec(),
            found: shape.to_vec(),
        }),
    }
}

/// Rejects NaN and infinite entries before they reach the decomposition.
pub(crate) fn ensure_finite<S, D>(values: &ArrayBase<S, D>) -> anyhow::Result<()>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    if !values.iter().all(|v| v.is_finite()) {
        bail!(ProjectorError::NonFiniteInput);
    }
    Ok(())
}

/// Views `points` as a `(n_rows, width)` matrix, copying only when the
/// memory layout does not allow a row-major reshape.
pub(crate) fn flatten<S, D>(
    points: &ArrayBase<S, D>,
    n_rows: usize,
    width: usize,
) -> anyhow::Result<CowArray<'_, f64, Ix2>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    points.to_shape((n_rows, width)).map_err(|_| {
        ProjectorError::ShapeMismatch {
            expected: vec![n_rows, width],
            found: points.shape().to_vec(),
        }
        .into()
    })
}

/// Copies `array` into a fresh array of `shape`.
pub(crate) fn reshape<S, D>(array: &ArrayBase<S, D>, shape: &[usize]) -> anyhow::Result<ArrayD<f64>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let reshaped = array.to_shape(IxDyn(shape)).map_err(|_| ProjectorError::ShapeMismatch {
        expected: shape.to_vec(),
        found: array.shape().to_vec(),
    })?;
    Ok(reshaped.into_owned())
}
