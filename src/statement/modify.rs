use crate::error::CrudMiddlewareError;
use crate::placeholders::parse_expression;
use crate::render::{RenderedStatement, SqlWriter, validate_identifier};
use crate::shape::{StatementShape, UpdateOp};

use super::remove::{push_row_filter, required_criteria};
use super::{Filterable, PreparableStatement, StatementKind};

/// `UPDATE` of a table. Criteria and at least one operation are mandatory.
#[derive(Debug)]
pub struct Modify;

impl StatementKind for Modify {
    const NAME: &'static str = "modify";

    fn render(table: &str, shape: &StatementShape) -> Result<RenderedStatement, CrudMiddlewareError> {
        let criteria = required_criteria(Self::NAME, shape)?;
        if shape.operations().is_empty() {
            return Err(CrudMiddlewareError::ValidationError(
                "modify requires at least one operation".into(),
            ));
        }

        let mut sql = SqlWriter::new();
        sql.push("UPDATE ").push(table).push(" SET ");
        for (idx, op) in shape.operations().iter().enumerate() {
            if idx > 0 {
                sql.push(", ");
            }
            match op {
                UpdateOp::Set { column, value } => {
                    sql.push(column).push(" = ").push_expr(value);
                }
                UpdateOp::Unset { column } => {
                    sql.push(column).push(" = NULL");
                }
            }
        }
        push_row_filter(&mut sql, table, criteria, shape);
        Ok(sql.finish(false))
    }
}

impl Filterable for Modify {}

impl PreparableStatement<Modify> {
    /// Append `column = <expression>` to the operation list.
    ///
    /// # Errors
    /// Returns `ValidationError` for a bad column name or expression.
    pub fn set(&mut self, column: &str, value: &str) -> Result<&mut Self, CrudMiddlewareError> {
        validate_identifier(column)?;
        let value = parse_expression(value)?;
        self.shape_mut().push_operation(UpdateOp::Set {
            column: column.to_string(),
            value,
        });
        Ok(self)
    }

    /// Append `column = NULL` to the operation list.
    ///
    /// # Errors
    /// Returns `ValidationError` for a bad column name.
    pub fn unset(&mut self, column: &str) -> Result<&mut Self, CrudMiddlewareError> {
        validate_identifier(column)?;
        self.shape_mut().push_operation(UpdateOp::Unset {
            column: column.to_string(),
        });
        Ok(self)
    }
}
