//! searchcache-core
//!
//! Types, traits and configuration shared by the embedding, vector, store and
//! resolver crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{CacheSettings, Config};
pub use error::{Error, Result};
pub use traits::{EmbedPurpose, Embedder, LiveSearch};
pub use types::{CacheEntry, IndexRecord, Payload, SearchHit};
