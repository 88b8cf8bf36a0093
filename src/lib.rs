// Library interface for jsonlview
// Streaming line index, windowed reads and parse caching for JSONL logs

pub mod cache;
pub mod cancel;
pub mod chunk;
pub mod columns;
pub mod config;
pub mod error;
pub mod index;
pub mod mode;
pub mod reader;
pub mod record;
pub mod search;
pub mod source;
pub mod tail;
pub mod workspace;

pub use config::Config;
pub use error::{Error, Result};
pub use index::{IndexRegistry, LineIndex};
pub use mode::{SourceMode, StreamingMode};
pub use record::Record;
pub use source::{LineStream, Refresh, SourceHandle};
pub use tail::{TailEvent, TailFollower};
pub use workspace::Workspace;
