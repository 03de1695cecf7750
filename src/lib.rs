//! Intune Assignment Checker
//!
//! Resolves which Intune policies apply to a user, device or group, explains
//! why (or why not), and compares several subjects side by side, including a
//! diff of the settings their effective policies configure.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use utils::{AppError, AppResult};

use models::ComparisonResult;
use services::{
    AssignmentResolver, Caches, CompareSession, Comparator, DirectorySource, GraphClient,
    InventoryService, MembershipResolver, PolicyConfigSource, PolicySource, ResolveOptions,
    SettingsDiffService,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub directory: Arc<dyn DirectorySource>,
    pub inventory: InventoryService,
    pub memberships: MembershipResolver,
    /// Uncapped resolver for single-subject views
    pub detail_resolver: AssignmentResolver,
    pub comparator: Comparator,
    pub settings: SettingsDiffService,
    /// Latest comparison; newer runs supersede older ones
    pub session: Arc<CompareSession<ComparisonResult>>,
    pub caches: Caches,
}

impl AppState {
    /// Wire the services over the given data sources
    pub fn new(
        config: AppConfig,
        policies: Arc<dyn PolicySource>,
        directory: Arc<dyn DirectorySource>,
        configs: Arc<dyn PolicyConfigSource>,
    ) -> Self {
        let caches = Caches::from_config(&config.cache);
        let memberships = MembershipResolver::new(directory.clone());

        Self {
            inventory: InventoryService::new(
                policies,
                directory.clone(),
                caches.inventory.clone(),
                config.compare.source_fetch_concurrency,
            ),
            comparator: Comparator::new(memberships.clone(), config.compare.display_limit),
            settings: SettingsDiffService::new(
                configs,
                caches.policy_config.clone(),
                config.compare.settings_fetch_concurrency,
            ),
            detail_resolver: AssignmentResolver::new(ResolveOptions::detail()),
            session: Arc::new(CompareSession::new()),
            memberships,
            directory,
            caches,
            config,
        }
    }

    /// State backed by a single Graph client
    pub fn with_graph(config: AppConfig, graph: GraphClient) -> Self {
        let graph = Arc::new(graph);
        Self::new(config, graph.clone(), graph.clone(), graph)
    }
}
