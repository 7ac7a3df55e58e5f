use tracing::debug;

use crate::error::CrudMiddlewareError;
use crate::planner::{OneOffNext, Plan, PlannedAction, PrepareState};
use crate::protocol::ShapeDescriptor;
use crate::results::ResultSet;
use crate::session::{PrepareOutcome, Session};
use crate::types::RowValues;

/// Carry out `plan` against `session`, moving `state` to its next value.
///
/// The state transition is applied before the run is issued, so a failed execution leaves the
/// statement in the state the server last acknowledged: a freshly prepared handle stays owned,
/// and a deallocated one is never referenced again. A transport failure while preparing after a
/// deallocation leaves the statement `Fresh`. A handle's execution count only moves when a run
/// through it succeeds.
pub(crate) async fn run_plan(
    session: &Session,
    state: &mut PrepareState,
    plan: Plan,
    shape: &ShapeDescriptor,
    params: &[RowValues],
) -> Result<ResultSet, CrudMiddlewareError> {
    if plan.deallocate_current
        && state.is_prepared()
        && let PrepareState::Prepared(handle) = std::mem::take(state)
    {
        session.deallocate(handle).await;
    }

    match plan.action {
        PlannedAction::OneOff { next } => {
            *state = match (next, &*state) {
                (OneOffNext::KeepFailed, _) => PrepareState::FailedForShape,
                (OneOffNext::Increment, PrepareState::NotPrepared { executions }) => {
                    PrepareState::NotPrepared {
                        executions: executions.saturating_add(1),
                    }
                }
                (OneOffNext::Increment | OneOffNext::Reset, _) => {
                    PrepareState::NotPrepared { executions: 1 }
                }
            };
            session.execute_one_off(shape, params).await
        }
        PlannedAction::Prepare => match session.prepare(shape).await? {
            PrepareOutcome::Prepared(handle) => {
                *state = PrepareState::Prepared(handle.clone());
                let result = session.execute_prepared(&handle, params).await;
                if result.is_ok()
                    && let PrepareState::Prepared(held) = state
                {
                    held.record_execution();
                }
                result
            }
            PrepareOutcome::Rejected(reason) => {
                debug!(session = session.id(), %reason, "shape marked unpreparable");
                *state = PrepareState::FailedForShape;
                session.execute_one_off(shape, params).await
            }
        },
        PlannedAction::Reuse => match state {
            PrepareState::Prepared(handle) => {
                let result = session.execute_prepared(handle, params).await;
                if result.is_ok() {
                    handle.record_execution();
                }
                result
            }
            other => Err(CrudMiddlewareError::Other(format!(
                "reuse planned in state {}",
                other.name()
            ))),
        },
    }
}
