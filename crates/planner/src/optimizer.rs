use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sqlparser::ast::Statement;
use tessera_common::{EngineConfig, Result, SessionState};
use tessera_storage::StatisticsProvider;
use tracing::debug;

use crate::logical_plan::{
    GroupStrategy, JoinStrategy, LogicalPlan, PlanProperties, TableScanProperties,
};
use crate::sql_frontend::statement_to_logical;

/// Configuration knobs for the hint passes.
#[derive(Debug, Clone, Copy)]
pub struct OptimizerConfig {
    /// Joins whose smaller input has at most this many rows use a nested loop.
    pub nested_loop_join_max_rows: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for OptimizerConfig {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            nested_loop_join_max_rows: cfg.nested_loop_join_max_rows,
        }
    }
}

/// Everything the optimizer reads besides the statement itself.
pub struct OptimizerContext<'a> {
    pub session: &'a SessionState,
    pub statistics: &'a dyn StatisticsProvider,
    pub config: OptimizerConfig,
}

impl<'a> OptimizerContext<'a> {
    pub fn new(session: &'a SessionState, statistics: &'a dyn StatisticsProvider) -> Self {
        Self {
            session,
            statistics,
            config: OptimizerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    fn scan_rows(&self, scan: &TableScanProperties) -> Option<u64> {
        let db = scan
            .database
            .as_deref()
            .or(self.session.current_database())?;
        self.statistics
            .table_statistics(db, &scan.table)
            .map(|s| s.row_count)
    }

    fn scan_distinct(&self, scan: &TableScanProperties, column: &str) -> Option<u64> {
        let db = scan
            .database
            .as_deref()
            .or(self.session.current_database())?;
        self.statistics
            .column_statistics(db, &scan.table, column)
            .map(|s| s.distinct_count)
    }
}

/// Custom optimizer rule hook, run after the built-in passes.
pub trait OptimizerRule: Send + Sync {
    /// Stable rule name used by registry.
    fn name(&self) -> &str;
    /// Rewrite input plan and return transformed plan.
    fn rewrite(&self, plan: LogicalPlan, ctx: &OptimizerContext<'_>) -> Result<LogicalPlan>;
}

/// Rule-based optimizer: one plan per statement.
///
/// Plan shape is fixed by the SQL translation rules; the passes here only
/// choose physical strategies for joins and groupings.
pub struct Optimizer {
    custom_rules: RwLock<HashMap<String, Arc<dyn OptimizerRule>>>,
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .custom_rules
            .read()
            .map(|m| m.len())
            .unwrap_or_default();
        f.debug_struct("Optimizer")
            .field("custom_rules", &count)
            .finish()
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Self {
            custom_rules: RwLock::new(HashMap::new()),
        }
    }

    /// Register or replace a custom optimizer rule.
    ///
    /// Returns `true` when an existing rule with the same name was replaced.
    pub fn register_rule(&self, rule: Arc<dyn OptimizerRule>) -> bool {
        self.custom_rules
            .write()
            .expect("optimizer rule lock poisoned")
            .insert(rule.name().to_string(), rule)
            .is_some()
    }

    pub fn deregister_rule(&self, name: &str) -> bool {
        self.custom_rules
            .write()
            .expect("optimizer rule lock poisoned")
            .remove(name)
            .is_some()
    }

    /// Translate a statement and apply the hint passes.
    ///
    /// Fails with `UnsupportedStatement` for statement kinds without a plan
    /// form (DDL is handled separately, see [`crate::ddl`]).
    pub fn optimize(&self, stmt: &Statement, ctx: &OptimizerContext<'_>) -> Result<LogicalPlan> {
        let plan = statement_to_logical(stmt)?;
        self.optimize_plan(plan, ctx)
    }

    /// Pass order:
    /// 1. join strategy hint
    /// 2. group strategy hint
    /// 3. user-registered rules, by name
    pub fn optimize_plan(
        &self,
        plan: LogicalPlan,
        ctx: &OptimizerContext<'_>,
    ) -> Result<LogicalPlan> {
        let plan = transform_up(plan, &|p| Ok(join_strategy_hint(p, ctx)))?;
        let mut plan = transform_up(plan, &|p| Ok(group_strategy_hint(p, ctx)))?;

        let mut rules = self
            .custom_rules
            .read()
            .expect("optimizer rule lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect::<Vec<_>>();
        rules.sort_by(|a, b| a.0.cmp(&b.0));
        for (_name, rule) in rules {
            plan = rule.rewrite(plan, ctx)?;
        }
        Ok(plan)
    }
}

/// Bottom-up rewrite: children first, then the node itself.
pub fn transform_up(
    plan: LogicalPlan,
    f: &dyn Fn(LogicalPlan) -> Result<LogicalPlan>,
) -> Result<LogicalPlan> {
    let LogicalPlan {
        plan_type,
        properties,
        children,
    } = plan;
    let children = children
        .into_iter()
        .map(|c| transform_up(c, f))
        .collect::<Result<Vec<_>>>()?;
    f(LogicalPlan {
        plan_type,
        properties,
        children,
    })
}

// -----------------------------
// 1) Join strategy hint
// -----------------------------

fn join_strategy_hint(mut plan: LogicalPlan, ctx: &OptimizerContext<'_>) -> LogicalPlan {
    let rows: Vec<Option<u64>> = plan
        .children
        .iter()
        .map(|c| match &c.properties {
            PlanProperties::TableScan(s) => ctx.scan_rows(s),
            _ => None,
        })
        .collect();
    if let PlanProperties::Join(j) = &mut plan.properties {
        j.strategy = match rows.as_slice() {
            [Some(l), Some(r)] if (*l).min(*r) <= ctx.config.nested_loop_join_max_rows => {
                JoinStrategy::NestedLoop
            }
            // no stats -> hash
            _ => JoinStrategy::Hash,
        };
        debug!(left = %j.left, right = %j.right, strategy = ?j.strategy, "join strategy hint");
    }
    plan
}

// -----------------------------
// 2) Group strategy hint
// -----------------------------

fn group_strategy_hint(mut plan: LogicalPlan, ctx: &OptimizerContext<'_>) -> LogicalPlan {
    let keys = match &plan.properties {
        PlanProperties::Group(g) => g.keys.clone(),
        _ => return plan,
    };
    let strategy = match (keys.as_slice(), plan.children.first()) {
        ([key], Some(input)) => key_source(input, key)
            .and_then(|(scan, column)| {
                let rows = ctx.scan_rows(scan)?;
                let distinct = ctx.scan_distinct(scan, column)?;
                Some(if rows > 0 && distinct.saturating_mul(2) >= rows {
                    GroupStrategy::Sort
                } else {
                    GroupStrategy::Hash
                })
            })
            .unwrap_or(GroupStrategy::Hash),
        _ => GroupStrategy::Hash,
    };
    if let PlanProperties::Group(g) = &mut plan.properties {
        g.strategy = strategy;
    }
    plan
}

/// Finds the scan that produces `key` below filters and joins.
fn key_source<'p>(
    plan: &'p LogicalPlan,
    key: &'p str,
) -> Option<(&'p TableScanProperties, &'p str)> {
    let (qualifier, column) = match key.rsplit_once('.') {
        Some((q, c)) => (Some(q), c),
        None => (None, key),
    };
    let mut scans = Vec::new();
    plan.visit(&mut |p| {
        if let PlanProperties::TableScan(s) = &p.properties {
            scans.push(s);
        }
    });
    match (qualifier, scans.as_slice()) {
        (None, [only]) => Some((*only, column)),
        (Some(q), _) => scans
            .iter()
            .find(|s| s.relation() == q || s.table == q)
            .map(|s| (*s, column)),
        _ => None,
    }
}
