use std::sync::Arc;

use tessera_common::{EngineConfig, MetricsRegistry, Result};
use tessera_execution::Executor;
use tessera_storage::{Catalog, DataManager};

use crate::planner_facade::PlannerFacade;

pub type SharedSession = Arc<Session>;

/// Engine-wide state shared by every connection handle.
#[derive(Debug)]
pub struct Session {
    pub config: EngineConfig,
    pub catalog: Arc<Catalog>,
    pub metrics: MetricsRegistry,
    pub planner: PlannerFacade,
    pub executor: Executor,
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(Catalog::from_config(&config));
        let metrics = MetricsRegistry::new();
        let executor = Executor::new(
            DataManager::new(Arc::clone(&catalog)),
            metrics.clone(),
            &config,
        );
        Ok(Self {
            planner: PlannerFacade::new(&config),
            config,
            catalog,
            metrics,
            executor,
        })
    }

    pub fn prometheus_metrics(&self) -> String {
        self.metrics.render_prometheus()
    }
}
