pub mod blob;
pub mod key;
pub mod memory;
pub mod migrate;
pub mod rehydrate;
pub mod store;

pub use key::CacheKey;
pub use memory::MemoryTier;
pub use store::{ArtifactStore, ArtifactStoreBuilder, KeyState, ProduceOutcome, StoreStats};
