use crate::binder::Slot;
use crate::error::CrudMiddlewareError;
use crate::placeholders::parse_expression;
use crate::render::{RenderedStatement, SqlWriter};
use crate::shape::StatementShape;

use super::{Filterable, PreparableStatement, StatementKind, parse_all};

/// `SELECT` over a table.
#[derive(Debug)]
pub struct Find;

impl StatementKind for Find {
    const NAME: &'static str = "find";

    fn render(table: &str, shape: &StatementShape) -> Result<RenderedStatement, CrudMiddlewareError> {
        let mut sql = SqlWriter::new();
        sql.push("SELECT ");
        if shape.projection().is_empty() {
            sql.push("*");
        } else {
            sql.push_list(shape.projection());
        }
        sql.push(" FROM ").push(table);
        if let Some(criteria) = shape.criteria() {
            sql.push(" WHERE ").push_expr(criteria);
        }
        if !shape.group_by().is_empty() {
            sql.push(" GROUP BY ").push_list(shape.group_by());
        }
        if let Some(having) = shape.having() {
            if shape.group_by().is_empty() {
                return Err(CrudMiddlewareError::ValidationError(
                    "having requires group_by".into(),
                ));
            }
            sql.push(" HAVING ").push_expr(having);
        }
        if !shape.sort().is_empty() {
            sql.push(" ORDER BY ").push_list(shape.sort());
        }
        if shape.limit_ever_used() {
            sql.push(" LIMIT ")
                .push_slot(Slot::Limit)
                .push(" OFFSET ")
                .push_slot(Slot::Offset);
        }
        Ok(sql.finish(true))
    }
}

impl Filterable for Find {}

impl PreparableStatement<Find> {
    /// Replace the projection, e.g. `["_id", "ord * 2 AS twice"]`.
    ///
    /// # Errors
    /// Returns `ValidationError` for an empty or malformed expression.
    pub fn fields<I, S>(&mut self, fields: I) -> Result<&mut Self, CrudMiddlewareError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = parse_all(fields)?;
        self.shape_mut().set_projection(parsed);
        Ok(self)
    }

    /// # Errors
    /// Returns `ValidationError` for an empty or malformed expression.
    pub fn group_by<I, S>(&mut self, group_by: I) -> Result<&mut Self, CrudMiddlewareError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = parse_all(group_by)?;
        self.shape_mut().set_group_by(parsed);
        Ok(self)
    }

    /// # Errors
    /// Returns `ValidationError` for an empty or malformed expression.
    pub fn having(&mut self, having: &str) -> Result<&mut Self, CrudMiddlewareError> {
        let parsed = parse_expression(having)?;
        self.shape_mut().set_having(Some(parsed));
        Ok(self)
    }

    /// Skip rows before the first one returned.
    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.shape_mut().set_offset(offset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape_with_criteria(criteria: &str) -> StatementShape {
        let mut shape = StatementShape::new();
        shape.set_criteria(Some(parse_expression(criteria).unwrap()));
        shape
    }

    #[test]
    fn renders_full_select() {
        let mut shape = shape_with_criteria("ord > :min");
        shape.set_projection(parse_all(["kind", "count(*) AS n"]).unwrap());
        shape.set_group_by(parse_all(["kind"]).unwrap());
        shape.set_having(Some(parse_expression("count(*) > :min").unwrap()));
        shape.set_sort(parse_all(["kind"]).unwrap());

        let rendered = Find::render("docs", &shape).unwrap();
        assert_eq!(
            rendered.descriptor.sql.as_ref(),
            "SELECT kind, count(*) AS n FROM docs WHERE ord > $1 GROUP BY kind HAVING count(*) > $1 ORDER BY kind"
        );
        assert!(rendered.descriptor.returns_rows);
        assert_eq!(rendered.slots.len(), 1);
    }

    #[test]
    fn limit_bakes_window_slots_in() {
        let mut shape = shape_with_criteria("true");
        let before = Find::render("docs", &shape).unwrap();
        assert_eq!(before.descriptor.sql.as_ref(), "SELECT * FROM docs WHERE true");

        shape.set_limit(2);
        let after = Find::render("docs", &shape).unwrap();
        assert_eq!(
            after.descriptor.sql.as_ref(),
            "SELECT * FROM docs WHERE true LIMIT $1 OFFSET $2"
        );
        assert_eq!(after.slots, vec![Slot::Limit, Slot::Offset]);
    }

    #[test]
    fn having_without_grouping_is_rejected() {
        let mut shape = StatementShape::new();
        shape.set_having(Some(parse_expression("count(*) > 1").unwrap()));
        assert!(Find::render("docs", &shape).unwrap_err().is_validation());
    }
}
