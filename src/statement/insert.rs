use crate::binder::Slot;
use crate::error::CrudMiddlewareError;
use crate::render::{RenderedStatement, SqlWriter};
use crate::shape::StatementShape;
use crate::types::RowValues;

use super::{PreparableStatement, StatementKind};

/// `INSERT` of one or more rows into fixed columns.
#[derive(Debug)]
pub struct Insert;

impl StatementKind for Insert {
    const NAME: &'static str = "insert";

    fn render(table: &str, shape: &StatementShape) -> Result<RenderedStatement, CrudMiddlewareError> {
        if shape.rows().is_empty() {
            return Err(CrudMiddlewareError::ValidationError(
                "insert requires at least one row".into(),
            ));
        }

        let mut sql = SqlWriter::new();
        sql.push("INSERT INTO ")
            .push(table)
            .push(" (")
            .push(&shape.columns().join(", "))
            .push(") VALUES ");
        for (row_idx, row) in shape.rows().iter().enumerate() {
            if row_idx > 0 {
                sql.push(", ");
            }
            sql.push("(");
            for (idx, value) in row.iter().enumerate() {
                if idx > 0 {
                    sql.push(", ");
                }
                sql.push_slot(Slot::Literal(value.clone()));
            }
            sql.push(")");
        }
        Ok(sql.finish(false))
    }
}

impl PreparableStatement<Insert> {
    /// Append a row. Its width must match the column list.
    ///
    /// # Errors
    /// Returns `ValidationError` when the row has the wrong number of values.
    pub fn values<I, V>(&mut self, row: I) -> Result<&mut Self, CrudMiddlewareError>
    where
        I: IntoIterator<Item = V>,
        V: Into<RowValues>,
    {
        let row: Vec<RowValues> = row.into_iter().map(Into::into).collect();
        let width = self.shape().columns().len();
        if row.len() != width {
            return Err(CrudMiddlewareError::ValidationError(format!(
                "row has {} values for {width} columns",
                row.len()
            )));
        }
        self.shape_mut().push_row(row);
        Ok(self)
    }
}
