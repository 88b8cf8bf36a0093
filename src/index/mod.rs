//! Byte-offset line indexes and the per-path registry that owns them.

pub mod line_index;
pub mod registry;

pub use line_index::{
    IndexProgress, IndexUpdate, LineIndex, Progress, SourceSignature, DEFAULT_PROGRESS_INTERVAL,
};
pub use registry::IndexRegistry;
