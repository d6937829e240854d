pub mod dimred;
mod error;
pub mod projector;
pub mod svd;
mod utils;

pub use error::ProjectorError;
pub use projector::{fit_projector, Projector, DEFAULT_BOUNDS_OFFSET, DEFAULT_COMPONENT_INDICES};
