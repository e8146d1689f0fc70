pub mod analytics;
pub mod cache;
pub mod config;
pub mod errors;
pub mod index;
pub mod model;
pub mod precompute;
pub mod source;

pub use analytics::{AnalyticsBuilder, EpisodeAnalytics, EpisodeArtifact, RuntimeContext, StandardAnalytics};
pub use cache::{ArtifactStore, ArtifactStoreBuilder, CacheKey, KeyState, MemoryTier, ProduceOutcome};
pub use config::GridlensConfig;
pub use errors::{ConfigError, IndexError, StoreError};
pub use index::{discover_agents, index_agents, AgentIndex};
pub use precompute::{BatchReport, Precomputer, WarmOptions};
pub use source::{EpisodeSource, JsonlEpisodeReader};
