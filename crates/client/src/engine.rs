use std::sync::{Arc, RwLock};

use sqlparser::ast::{Statement, Use};
use tessera_common::{EngineConfig, Result, SessionState, StatementId, TesseraError};
use tessera_execution::{PlanSchema, QueryResult};
use tessera_planner::{statement_label, statement_to_ddl, DdlCommand, LogicalPlan, OptimizerRule};
use tessera_sql::{parse_sql, parse_statement};
use tessera_storage::{Catalog, TableMeta};
use tracing::{debug, info, info_span};

use crate::session::{Session, SharedSession};

/// One connection to an embedded engine.
///
/// Clones share the connection and its current database. [`Engine::connect`]
/// opens a new connection over the same catalog with its own current
/// database.
#[derive(Debug, Clone)]
pub struct Engine {
    session: SharedSession,
    state: Arc<RwLock<SessionState>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let state = SessionState::with_database(config.default_database.clone());
        let session = Arc::new(Session::new(config)?);
        Ok(Self {
            session,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// New connection sharing this engine, starting in the default database.
    pub fn connect(&self) -> Engine {
        let state = SessionState::with_database(self.session.config.default_database.clone());
        Self {
            session: Arc::clone(&self.session),
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.session.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.session.catalog
    }

    /// Runs every statement in `sql` in order and returns one result per
    /// statement. Stops at the first failing statement.
    pub fn sql(&self, sql: &str) -> Result<Vec<QueryResult>> {
        parse_sql(sql)?
            .iter()
            .map(|stmt| self.execute_statement(stmt))
            .collect()
    }

    /// Runs a single statement.
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        self.execute_statement(&parse_statement(sql)?)
    }

    pub fn execute_statement(&self, stmt: &Statement) -> Result<QueryResult> {
        let id = StatementId::next();
        let kind = statement_label(stmt);
        let _span = info_span!("statement", id = %id, kind = %kind).entered();
        let result = self.run_statement(stmt);
        self.session.metrics.record_statement(kind, result.is_ok());
        match &result {
            Ok(r) => debug!(rows = r.num_rows(), "statement finished"),
            Err(e) => debug!(error = %e, "statement failed"),
        }
        result
    }

    /// Optimized logical plan for a single query or DML statement.
    pub fn plan(&self, sql: &str) -> Result<LogicalPlan> {
        let stmt = parse_statement(sql)?;
        let state = self.state();
        self.session
            .planner
            .plan_statement(&stmt, &state, self.session.catalog.as_ref())
    }

    pub fn explain(&self, sql: &str) -> Result<String> {
        let stmt = parse_statement(sql)?;
        let state = self.state();
        self.session
            .planner
            .explain(&stmt, &state, self.session.catalog.as_ref())
    }

    /// Output columns of `sql` without running it.
    pub fn output_schema(&self, sql: &str) -> Result<PlanSchema> {
        let plan = self.plan(sql)?;
        self.session.executor.infer_schema(&plan, &self.state())
    }

    pub fn create_database(&self, name: &str) -> Result<()> {
        self.session.catalog.create_database(name)
    }

    /// Switches this connection's current database.
    pub fn use_database(&self, name: &str) -> Result<()> {
        self.session.catalog.use_database(name)?;
        self.state
            .write()
            .expect("session lock poisoned")
            .use_database(name);
        Ok(())
    }

    pub fn current_database(&self) -> Option<String> {
        self.state().current_database().map(str::to_string)
    }

    pub fn list_databases(&self) -> Vec<String> {
        self.session.catalog.list_databases()
    }

    /// Tables of the current database.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let state = self.state();
        let database = state.resolve_database(None)?;
        self.session.catalog.list_tables(database)
    }

    pub fn table_schema(&self, table: &str) -> Result<TableMeta> {
        let state = self.state();
        let database = state.resolve_database(None)?;
        self.session.catalog.get_table(database, table)
    }

    /// Adds a rewrite pass run after the built-in hint passes. Returns true
    /// when it replaced a rule of the same name.
    pub fn register_optimizer_rule(&self, rule: Arc<dyn OptimizerRule>) -> bool {
        self.session.planner.register_rule(rule)
    }

    pub fn deregister_optimizer_rule(&self, name: &str) -> bool {
        self.session.planner.deregister_rule(name)
    }

    pub fn prometheus_metrics(&self) -> String {
        self.session.prometheus_metrics()
    }

    fn state(&self) -> SessionState {
        self.state.read().expect("session lock poisoned").clone()
    }

    fn run_statement(&self, stmt: &Statement) -> Result<QueryResult> {
        if let Some(database) = use_target(stmt)? {
            self.use_database(&database)?;
            return Ok(QueryResult::empty());
        }
        let state = self.state();
        if let Some(command) = statement_to_ddl(stmt, &state)? {
            self.apply_ddl(command)?;
            return Ok(QueryResult::empty());
        }
        let plan = self
            .session
            .planner
            .plan_statement(stmt, &state, self.session.catalog.as_ref())?;
        self.session.executor.execute(&plan, &state)
    }

    fn apply_ddl(&self, command: DdlCommand) -> Result<()> {
        let catalog = &self.session.catalog;
        match command {
            DdlCommand::CreateDatabase {
                name,
                if_not_exists,
            } => match catalog.create_database(&name) {
                Err(TesseraError::DuplicateDatabase { .. }) if if_not_exists => Ok(()),
                other => other,
            },
            DdlCommand::DropDatabase { name, if_exists } => {
                match catalog.drop_database(&name) {
                    Err(TesseraError::DatabaseNotFound { .. }) if if_exists => return Ok(()),
                    other => other?,
                }
                let mut state = self.state.write().expect("session lock poisoned");
                if state.current_database() == Some(name.as_str()) {
                    info!(database = %name, "current database dropped");
                    *state = SessionState::new(None);
                }
                Ok(())
            }
            DdlCommand::CreateTable {
                meta,
                if_not_exists,
            } => match catalog.create_table(meta) {
                Ok(_) => Ok(()),
                Err(TesseraError::DuplicateTable { .. }) if if_not_exists => Ok(()),
                Err(e) => Err(e),
            },
            DdlCommand::DropTable {
                database,
                table,
                if_exists,
            } => match catalog.drop_table(&database, &table) {
                Err(TesseraError::TableNotFound { .. }) if if_exists => Ok(()),
                other => other,
            },
        }
    }
}

/// Database named by a `USE` statement, `None` for any other statement.
fn use_target(stmt: &Statement) -> Result<Option<String>> {
    let Statement::Use(target) = stmt else {
        return Ok(None);
    };
    match target {
        Use::Object(name) | Use::Database(name) | Use::Schema(name) => match name.0.as_slice() {
            [ident] => Ok(Some(ident.value.clone())),
            _ => Err(TesseraError::Unsupported(format!(
                "USE of a qualified name: {name}"
            ))),
        },
        other => Err(TesseraError::Unsupported(format!("{other}"))),
    }
}

#[cfg(test)]
mod tests {
    use tessera_sql::parse_statement;

    use super::use_target;

    #[test]
    fn use_statement_names_its_database() {
        let stmt = parse_statement("USE analytics").expect("parse");
        assert_eq!(use_target(&stmt).expect("use"), Some("analytics".to_string()));
        let quoted = parse_statement("USE \"Mixed Case\"").expect("parse");
        assert_eq!(use_target(&quoted).expect("use"), Some("Mixed Case".to_string()));
        let select = parse_statement("SELECT 1").expect("parse");
        assert_eq!(use_target(&select).expect("select"), None);
        // A string literal that merely starts with "USE " is not a USE.
        let literal = parse_statement("SELECT 'USE x'").expect("parse");
        assert_eq!(use_target(&literal).expect("select"), None);
    }
}
