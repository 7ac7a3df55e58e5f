use std::sync::Arc;

use crate::error::CrudMiddlewareError;
use crate::placeholders::parse_expression;
use crate::render::validate_identifier;
use crate::session::Session;
use crate::shape::StatementShape;

use super::{FindStatement, InsertStatement, ModifyStatement, PreparableStatement, RemoveStatement};

/// Entry point for statements against one table of a session.
#[derive(Debug, Clone)]
pub struct Table {
    session: Session,
    name: Arc<str>,
}

impl Session {
    /// # Errors
    /// Returns `ValidationError` if `name` is not a plain identifier.
    pub fn table(&self, name: &str) -> Result<Table, CrudMiddlewareError> {
        validate_identifier(name)?;
        Ok(Table {
            session: self.clone(),
            name: Arc::from(name),
        })
    }
}

impl Table {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn filtered(&self, criteria: &str) -> Result<StatementShape, CrudMiddlewareError> {
        let mut shape = StatementShape::new();
        shape.set_criteria(Some(parse_expression(criteria)?));
        Ok(shape)
    }

    /// Find rows matching `criteria`.
    ///
    /// # Errors
    /// Returns `ValidationError` for empty or malformed criteria.
    pub fn find(&self, criteria: &str) -> Result<FindStatement, CrudMiddlewareError> {
        let shape = self.filtered(criteria)?;
        Ok(PreparableStatement::new(
            self.session.clone(),
            Arc::clone(&self.name),
            shape,
        ))
    }

    /// Find every row.
    #[must_use]
    pub fn find_all(&self) -> FindStatement {
        PreparableStatement::new(
            self.session.clone(),
            Arc::clone(&self.name),
            StatementShape::new(),
        )
    }

    /// # Errors
    /// Returns `ValidationError` for empty or malformed criteria.
    pub fn modify(&self, criteria: &str) -> Result<ModifyStatement, CrudMiddlewareError> {
        let shape = self.filtered(criteria)?;
        Ok(PreparableStatement::new(
            self.session.clone(),
            Arc::clone(&self.name),
            shape,
        ))
    }

    /// # Errors
    /// Returns `ValidationError` for empty or malformed criteria.
    pub fn remove(&self, criteria: &str) -> Result<RemoveStatement, CrudMiddlewareError> {
        let shape = self.filtered(criteria)?;
        Ok(PreparableStatement::new(
            self.session.clone(),
            Arc::clone(&self.name),
            shape,
        ))
    }

    /// Insert rows into `columns`.
    ///
    /// # Errors
    /// Returns `ValidationError` for an empty column list or a bad column name.
    pub fn insert<I, S>(&self, columns: I) -> Result<InsertStatement, CrudMiddlewareError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns = columns
            .into_iter()
            .map(|column| {
                validate_identifier(column.as_ref()).map(|()| column.as_ref().to_string())
            })
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(CrudMiddlewareError::ValidationError(
                "insert requires at least one column".into(),
            ));
        }
        let mut shape = StatementShape::new();
        shape.set_columns(columns);
        Ok(PreparableStatement::new(
            self.session.clone(),
            Arc::clone(&self.name),
            shape,
        ))
    }
}
