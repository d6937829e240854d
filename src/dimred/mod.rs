//! # Dimensionality Reduction
//!
//! Linear dimensionality reduction for dense data laid out one sample per
//! row. The fitted model is what [`crate::Projector`] uses to move between a
//! high-dimensional parameter space and a handful of principal coordinates.
//!
//! ## Currently Available
//! - **PCA** ([`pca`]): Principal Component Analysis via a thin SVD of the
//!   centred data

pub mod pca;
