// Parsed-record cache owned by each open source
mod parse_cache;

pub use parse_cache::{CacheStats, ParseCache, DEFAULT_CAPACITY};
