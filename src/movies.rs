//! The replacement movies and the order they are played in.

pub mod registry;
pub mod rotation;

pub use registry::{MovieEntry, MoviePath, MOVIES_FOLDER};
pub use rotation::RotationState;
