use std::collections::BTreeSet;

use crate::binder::RowWindow;
use crate::placeholders::ParsedExpr;
use crate::types::RowValues;

/// Structural clauses whose change invalidates a prepared template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClauseKind {
    Criteria,
    Projection,
    GroupBy,
    Having,
    Sort,
    Operations,
    Rows,
    Limit,
}

/// One entry of a modify statement's operation list.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// `column = <expression>`
    Set { column: String, value: ParsedExpr },
    /// `column = NULL`
    Unset { column: String },
}

/// What changed in the shape since the previous `execute()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeDelta {
    pub structural_change: bool,
    pub limit_first_use: bool,
}

/// Structural clauses of one statement plus the dirty tracking that drives re-preparation.
///
/// Every clause setter marks its clause dirty even when the new value equals the old one.
/// Limit and offset only dirty the shape the first time either is used: from then on the
/// template permanently carries both placeholders and new values are plain rebinds.
#[derive(Debug, Clone, Default)]
pub struct StatementShape {
    criteria: Option<ParsedExpr>,
    projection: Vec<ParsedExpr>,
    group_by: Vec<ParsedExpr>,
    having: Option<ParsedExpr>,
    sort: Vec<ParsedExpr>,
    operations: Vec<UpdateOp>,
    columns: Vec<String>,
    rows: Vec<Vec<RowValues>>,
    window: RowWindow,
    limit_ever_used: bool,
    dirty: BTreeSet<ClauseKind>,
    limit_first_use: bool,
    generation: u64,
}

impl StatementShape {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mark_dirty(&mut self, clause: ClauseKind) {
        self.dirty.insert(clause);
    }

    fn touch_window(&mut self) {
        if !self.limit_ever_used {
            self.mark_dirty(ClauseKind::Limit);
            self.limit_first_use = true;
            self.limit_ever_used = true;
        }
    }

    pub fn set_criteria(&mut self, criteria: Option<ParsedExpr>) {
        self.criteria = criteria;
        self.mark_dirty(ClauseKind::Criteria);
    }

    pub fn set_projection(&mut self, projection: Vec<ParsedExpr>) {
        self.projection = projection;
        self.mark_dirty(ClauseKind::Projection);
    }

    pub fn set_group_by(&mut self, group_by: Vec<ParsedExpr>) {
        self.group_by = group_by;
        self.mark_dirty(ClauseKind::GroupBy);
    }

    pub fn set_having(&mut self, having: Option<ParsedExpr>) {
        self.having = having;
        self.mark_dirty(ClauseKind::Having);
    }

    pub fn set_sort(&mut self, sort: Vec<ParsedExpr>) {
        self.sort = sort;
        self.mark_dirty(ClauseKind::Sort);
    }

    pub fn push_operation(&mut self, op: UpdateOp) {
        self.operations.push(op);
        self.mark_dirty(ClauseKind::Operations);
    }

    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
        self.mark_dirty(ClauseKind::Rows);
    }

    pub fn push_row(&mut self, row: Vec<RowValues>) {
        self.rows.push(row);
        self.mark_dirty(ClauseKind::Rows);
    }

    pub fn set_limit(&mut self, limit: u64) {
        self.window.limit = Some(limit);
        self.touch_window();
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.window.offset = Some(offset);
        self.touch_window();
    }

    /// Report and clear the changes accumulated since the last call.
    ///
    /// A structural change starts a new generation.
    pub fn take_delta(&mut self) -> ShapeDelta {
        let delta = ShapeDelta {
            structural_change: !self.dirty.is_empty(),
            limit_first_use: self.limit_first_use,
        };
        if delta.structural_change {
            self.generation += 1;
        }
        self.dirty.clear();
        self.limit_first_use = false;
        delta
    }

    #[must_use]
    pub fn is_dirty(&self, clause: ClauseKind) -> bool {
        self.dirty.contains(&clause)
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn limit_ever_used(&self) -> bool {
        self.limit_ever_used
    }

    #[must_use]
    pub fn window(&self) -> RowWindow {
        self.window
    }

    #[must_use]
    pub fn criteria(&self) -> Option<&ParsedExpr> {
        self.criteria.as_ref()
    }

    #[must_use]
    pub fn projection(&self) -> &[ParsedExpr] {
        &self.projection
    }

    #[must_use]
    pub fn group_by(&self) -> &[ParsedExpr] {
        &self.group_by
    }

    #[must_use]
    pub fn having(&self) -> Option<&ParsedExpr> {
        self.having.as_ref()
    }

    #[must_use]
    pub fn sort(&self) -> &[ParsedExpr] {
        &self.sort
    }

    #[must_use]
    pub fn operations(&self) -> &[UpdateOp] {
        &self.operations
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<RowValues>] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholders::parse_expression;

    #[test]
    fn setters_dirty_even_when_unchanged() {
        let mut shape = StatementShape::new();
        shape.set_sort(vec![parse_expression("_id").unwrap()]);
        assert!(shape.take_delta().structural_change);

        shape.set_sort(vec![parse_expression("_id").unwrap()]);
        assert!(shape.is_dirty(ClauseKind::Sort));
        assert!(shape.take_delta().structural_change);
        assert!(!shape.take_delta().structural_change);
    }

    #[test]
    fn limit_first_use_is_reported_once() {
        let mut shape = StatementShape::new();
        shape.set_limit(2);
        shape.set_offset(1);
        let first = shape.take_delta();
        assert!(first.structural_change);
        assert!(first.limit_first_use);
        assert!(shape.limit_ever_used());

        shape.set_limit(3);
        let second = shape.take_delta();
        assert_eq!(second, ShapeDelta::default());
        assert_eq!(shape.window().limit, Some(3));
        assert_eq!(shape.window().offset, Some(1));
    }

    #[test]
    fn generation_advances_only_on_structural_change() {
        let mut shape = StatementShape::new();
        assert_eq!(shape.generation(), 0);
        shape.take_delta();
        assert_eq!(shape.generation(), 0);
        shape.push_row(vec![RowValues::Int(1)]);
        shape.take_delta();
        assert_eq!(shape.generation(), 1);
    }
}
