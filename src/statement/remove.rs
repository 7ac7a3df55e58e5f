use crate::binder::Slot;
use crate::error::CrudMiddlewareError;
use crate::placeholders::ParsedExpr;
use crate::render::{RenderedStatement, SqlWriter};
use crate::shape::StatementShape;

use super::{Filterable, StatementKind};

/// `DELETE` from a table. Criteria are mandatory.
#[derive(Debug)]
pub struct Remove;

pub(super) fn required_criteria<'a>(
    kind: &str,
    shape: &'a StatementShape,
) -> Result<&'a ParsedExpr, CrudMiddlewareError> {
    shape.criteria().ok_or_else(|| {
        CrudMiddlewareError::ValidationError(format!("{kind} requires criteria"))
    })
}

/// Write the row filter of a modify or remove. Once a limit has been used, rows are picked by
/// a `ctid` subquery so sort and limit apply.
pub(super) fn push_row_filter(
    sql: &mut SqlWriter,
    table: &str,
    criteria: &ParsedExpr,
    shape: &StatementShape,
) {
    if !shape.limit_ever_used() {
        sql.push(" WHERE ").push_expr(criteria);
        return;
    }

    sql.push(" WHERE ctid IN (SELECT ctid FROM ")
        .push(table)
        .push(" WHERE ")
        .push_expr(criteria);
    if !shape.sort().is_empty() {
        sql.push(" ORDER BY ").push_list(shape.sort());
    }
    sql.push(" LIMIT ").push_slot(Slot::Limit).push(")");
}

impl StatementKind for Remove {
    const NAME: &'static str = "remove";

    fn render(table: &str, shape: &StatementShape) -> Result<RenderedStatement, CrudMiddlewareError> {
        let criteria = required_criteria(Self::NAME, shape)?;
        let mut sql = SqlWriter::new();
        sql.push("DELETE FROM ").push(table);
        push_row_filter(&mut sql, table, criteria, shape);
        Ok(sql.finish(false))
    }
}

impl Filterable for Remove {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholders::parse_expression;

    #[test]
    fn renders_plain_and_limited_delete() {
        let mut shape = StatementShape::new();
        shape.set_criteria(Some(parse_expression("ord < :max").unwrap()));
        assert_eq!(
            Remove::render("docs", &shape).unwrap().descriptor.sql.as_ref(),
            "DELETE FROM docs WHERE ord < $1"
        );

        shape.set_sort(vec![parse_expression("ord desc").unwrap()]);
        shape.set_limit(1);
        let rendered = Remove::render("docs", &shape).unwrap();
        assert_eq!(
            rendered.descriptor.sql.as_ref(),
            "DELETE FROM docs WHERE ctid IN (SELECT ctid FROM docs WHERE ord < $1 ORDER BY ord desc LIMIT $2)"
        );
        assert!(!rendered.descriptor.returns_rows);
    }

    #[test]
    fn criteria_are_required() {
        let shape = StatementShape::new();
        assert!(Remove::render("docs", &shape).unwrap_err().is_validation());
    }
}
