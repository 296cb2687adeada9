//! Template loading, inheritance and validation.

pub mod merge;
pub mod resolver;

pub use merge::deep_merge;
pub use resolver::{ResolutionCache, TemplateResolver};
