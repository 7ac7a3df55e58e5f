//! Reusable statement builders.
//!
//! Every statement type is a [`PreparableStatement`] parameterised by a [`StatementKind`]
//! marker. The kind decides which clause setters exist and how the shape renders; execution,
//! binding and handle lifecycle are shared.

mod find;
mod insert;
mod modify;
mod remove;
mod table;

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::binder::ParameterBinder;
use crate::error::CrudMiddlewareError;
use crate::executor::run_plan;
use crate::handle::{HandleId, PreparedHandle};
use crate::placeholders::{ParsedExpr, parse_expression};
use crate::planner::{self, PrepareState};
use crate::render::RenderedStatement;
use crate::results::ResultSet;
use crate::session::Session;
use crate::shape::StatementShape;
use crate::types::RowValues;

pub use find::Find;
pub use insert::Insert;
pub use modify::Modify;
pub use remove::Remove;
pub use table::Table;

pub type FindStatement = PreparableStatement<Find>;
pub type ModifyStatement = PreparableStatement<Modify>;
pub type RemoveStatement = PreparableStatement<Remove>;
pub type InsertStatement = PreparableStatement<Insert>;

/// Clause vocabulary and rendering of one statement type.
pub trait StatementKind: Send + Sync + 'static {
    const NAME: &'static str;

    /// Render the current shape of a statement against `table`.
    ///
    /// # Errors
    /// Returns `ValidationError` when the shape is incomplete for this kind.
    fn render(table: &str, shape: &StatementShape) -> Result<RenderedStatement, CrudMiddlewareError>;
}

/// Kinds that accept criteria, sort and limit.
pub trait Filterable: StatementKind {}

/// Observable preparation state of one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementStats {
    pub is_prepared: bool,
    pub handle_id: Option<HandleId>,
    pub exec_count_under_current_handle: u64,
    pub generation: u64,
    pub state: &'static str,
}

/// A statement that can be executed many times, switching between one-off runs and a
/// server-side prepared handle as its shape settles.
pub struct PreparableStatement<K: StatementKind> {
    session: Session,
    table: Arc<str>,
    shape: StatementShape,
    binder: ParameterBinder,
    state: PrepareState,
    _kind: PhantomData<K>,
}

pub(crate) fn parse_all<I, S>(exprs: I) -> Result<Vec<ParsedExpr>, CrudMiddlewareError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    exprs
        .into_iter()
        .map(|expr| parse_expression(expr.as_ref()))
        .collect()
}

impl<K: StatementKind> PreparableStatement<K> {
    pub(crate) fn new(session: Session, table: Arc<str>, shape: StatementShape) -> Self {
        Self {
            session,
            table,
            shape,
            binder: ParameterBinder::new(),
            state: PrepareState::Fresh,
            _kind: PhantomData,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn shape(&self) -> &StatementShape {
        &self.shape
    }

    pub(crate) fn shape_mut(&mut self) -> &mut StatementShape {
        &mut self.shape
    }

    #[must_use]
    pub fn prepare_state(&self) -> &PrepareState {
        &self.state
    }

    /// Bind a named placeholder. Never changes the statement's shape.
    pub fn bind(&mut self, name: &str, value: impl Into<RowValues>) -> &mut Self {
        self.binder.bind(name, value);
        self
    }

    /// Bind the parameter at `position` (distinct named placeholders and each `?`, in order).
    pub fn bind_at(&mut self, position: usize, value: impl Into<RowValues>) -> &mut Self {
        self.binder.bind_at(position, value);
        self
    }

    /// Replace all bindings with an ordered list.
    pub fn bind_list<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<RowValues>,
    {
        self.binder.bind_list(values);
        self
    }

    pub fn bind_map<I, N, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<RowValues>,
    {
        self.binder.bind_map(values);
        self
    }

    pub fn clear_bindings(&mut self) -> &mut Self {
        self.binder.clear();
        self
    }

    /// Statement text of the current shape, as it would be sent to the server.
    ///
    /// # Errors
    /// Returns `ValidationError` when the shape is incomplete.
    pub fn sql(&self) -> Result<String, CrudMiddlewareError> {
        K::render(&self.table, &self.shape).map(|rendered| rendered.descriptor.sql.to_string())
    }

    /// Run the statement with the current bindings.
    ///
    /// The first execution of a shape is one-off; the second prepares it and later executions
    /// reuse the handle until a structural clause changes. Validation happens before any
    /// server round-trip.
    ///
    /// # Errors
    /// Returns validation errors for an incomplete shape or missing binding, and execution or
    /// transport errors reported by the session. A refused prepare is not an error.
    pub async fn execute(&mut self) -> Result<ResultSet, CrudMiddlewareError> {
        let rendered = K::render(&self.table, &self.shape)?;
        let params = self.binder.resolve(&rendered.slots, self.shape.window())?;

        let delta = self.shape.take_delta();
        let plan = planner::plan(&self.state, delta, self.session.options().prepare_mode);
        debug!(
            session = self.session.id(),
            kind = K::NAME,
            state = self.state.name(),
            ?delta,
            ?plan,
            "executing"
        );
        run_plan(
            &self.session,
            &mut self.state,
            plan,
            &rendered.descriptor,
            &params,
        )
        .await
    }

    /// Release the held handle now instead of on drop. The next execution starts over as if
    /// the statement were new.
    pub async fn deallocate(&mut self) {
        if let PrepareState::Prepared(handle) = std::mem::take(&mut self.state) {
            self.session.deallocate(handle).await;
        }
    }

    #[must_use]
    pub fn stats(&self) -> StatementStats {
        let handle = self.state.handle();
        StatementStats {
            is_prepared: handle.is_some(),
            handle_id: handle.map(PreparedHandle::id),
            exec_count_under_current_handle: handle.map_or(0, PreparedHandle::executions),
            generation: self.shape.generation(),
            state: self.state.name(),
        }
    }
}

impl<K: Filterable> PreparableStatement<K> {
    /// Replace the filter criteria.
    ///
    /// # Errors
    /// Returns `ValidationError` for an empty or malformed expression.
    pub fn criteria(&mut self, criteria: &str) -> Result<&mut Self, CrudMiddlewareError> {
        let parsed = parse_expression(criteria)?;
        self.shape.set_criteria(Some(parsed));
        Ok(self)
    }

    /// Replace the sort list, e.g. `["_id", "ord desc"]`.
    ///
    /// # Errors
    /// Returns `ValidationError` for an empty or malformed expression.
    pub fn sort<I, S>(&mut self, sort: I) -> Result<&mut Self, CrudMiddlewareError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = parse_all(sort)?;
        self.shape.set_sort(parsed);
        Ok(self)
    }

    /// Cap the number of rows read or changed.
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.shape.set_limit(limit);
        self
    }
}

impl<K: StatementKind> Drop for PreparableStatement<K> {
    fn drop(&mut self) {
        if let Some(handle) = self.state.handle() {
            self.session.queue_release(handle);
        }
    }
}

impl<K: StatementKind> std::fmt::Debug for PreparableStatement<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparableStatement")
            .field("kind", &K::NAME)
            .field("table", &self.table)
            .field("state", &self.state)
            .field("generation", &self.shape.generation())
            .finish()
    }
}
