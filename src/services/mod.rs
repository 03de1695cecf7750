//! Business logic services

pub mod auth;
pub mod cache;
pub mod comparator;
pub mod graph;
pub mod inventory;
pub mod membership;
pub mod normalizer;
pub mod policy_config;
pub mod progress;
pub mod resolution;
pub mod session;
pub mod settings_diff;
pub mod sources;

pub use auth::{ClientCredentialsProvider, StaticTokenProvider, TokenProvider};
pub use cache::{Cache, CacheEntry, CacheServiceStats, CacheStats, Caches};
pub use comparator::Comparator;
pub use graph::GraphClient;
pub use inventory::{Inventory, InventoryService};
pub use membership::MembershipResolver;
pub use progress::{LoadingStage, LogProgress, NoProgress, ProgressSink, ProgressUpdate};
pub use resolution::{AssignmentResolver, ResolveOptions};
pub use session::{CompareSession, ComputationState};
pub use settings_diff::SettingsDiffService;
pub use sources::{DirectorySource, PolicyConfigSource, PolicySource};
