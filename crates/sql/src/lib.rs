//! Parser boundary: turns SQL text into `sqlparser` statement nodes.
//!
//! The grammar itself lives in `sqlparser`; everything downstream consumes
//! [`Statement`] values and never mutates them.

use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tessera_common::{Result, TesseraError};

pub use sqlparser::ast;

pub fn parse_sql(sql: &str) -> Result<Vec<Statement>> {
    let dialect = GenericDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| TesseraError::Planning(e.to_string()))
}

/// Parses exactly one statement.
pub fn parse_statement(sql: &str) -> Result<Statement> {
    let mut stmts = parse_sql(sql)?;
    if stmts.len() != 1 {
        return Err(TesseraError::Planning(format!(
            "expected exactly one statement, got {}",
            stmts.len()
        )));
    }
    Ok(stmts.remove(0))
}
