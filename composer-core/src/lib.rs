//! Composite catalog builder library

pub mod builders;
pub mod composite;
pub mod context;
pub mod declcfg;
pub mod delta;
pub mod error;
pub mod image;

pub use composite::Template;
pub use context::Context;
pub use error::{BuildError, CompositeError};
