use std::sync::Arc;

use sqlparser::ast::Statement;
use tessera_common::{EngineConfig, Result, SessionState};
use tessera_planner::{
    explain_logical, LogicalPlan, Optimizer, OptimizerConfig, OptimizerContext, OptimizerRule,
};
use tessera_storage::StatisticsProvider;

/// Statement-to-plan entry point shared by all connections.
#[derive(Debug, Default)]
pub struct PlannerFacade {
    optimizer: Optimizer,
    config: OptimizerConfig,
}

impl PlannerFacade {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            optimizer: Optimizer::new(),
            config: OptimizerConfig::from(config),
        }
    }

    pub fn plan_statement(
        &self,
        stmt: &Statement,
        session: &SessionState,
        statistics: &dyn StatisticsProvider,
    ) -> Result<LogicalPlan> {
        let ctx = OptimizerContext::new(session, statistics).with_config(self.config);
        self.optimizer.optimize(stmt, &ctx)
    }

    pub fn explain(
        &self,
        stmt: &Statement,
        session: &SessionState,
        statistics: &dyn StatisticsProvider,
    ) -> Result<String> {
        let plan = self.plan_statement(stmt, session, statistics)?;
        Ok(explain_logical(&plan))
    }

    pub fn register_rule(&self, rule: Arc<dyn OptimizerRule>) -> bool {
        self.optimizer.register_rule(rule)
    }

    pub fn deregister_rule(&self, name: &str) -> bool {
        self.optimizer.deregister_rule(name)
    }
}
