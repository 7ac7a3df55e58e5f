//! Per-call decision between one-off execution, preparing, and reusing a prepared handle.
//!
//! The planner is a pure function of the statement's current [`PrepareState`] and the
//! [`ShapeDelta`] reported at the start of `execute()`. The executor carries out the plan and
//! applies the resulting state transition.
//!
//! Transitions:
//!
//! | state              | structural change          | action                                |
//! |--------------------|----------------------------|---------------------------------------|
//! | any                | yes, limit first use, held | deallocate, prepare now               |
//! | any                | yes                        | deallocate if held, one-off, restart  |
//! | `Fresh`            | no                         | one-off, then `NotPrepared(1)`        |
//! | `NotPrepared`      | no                         | prepare (one-off + sticky on no)      |
//! | `Prepared`         | no                         | rebind, reuse handle                  |
//! | `FailedForShape`   | no                         | one-off, stay failed                  |
//!
//! A restart leaves the statement at `NotPrepared(1)` whatever it held before.

use crate::config::PrepareMode;
use crate::handle::PreparedHandle;
use crate::shape::ShapeDelta;

/// Where a statement stands with respect to server-side preparation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PrepareState {
    /// Never executed in the current shape.
    #[default]
    Fresh,
    /// Executed one-off `executions` times in the current shape.
    NotPrepared { executions: u64 },
    /// Holds a live handle for the current shape.
    Prepared(PreparedHandle),
    /// The server refused to prepare this shape; runs one-off until the shape changes.
    FailedForShape,
}

impl PrepareState {
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        matches!(self, PrepareState::Prepared(_))
    }

    #[must_use]
    pub fn handle(&self) -> Option<&PreparedHandle> {
        match self {
            PrepareState::Prepared(handle) => Some(handle),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PrepareState::Fresh => "fresh",
            PrepareState::NotPrepared { .. } => "not_prepared",
            PrepareState::Prepared(_) => "prepared",
            PrepareState::FailedForShape => "failed_for_shape",
        }
    }
}

/// State after a one-off run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneOffNext {
    /// Start a new shape generation at `NotPrepared { executions: 1 }`.
    Reset,
    /// Count one more run of an unchanged shape. Only `Direct` mode stays here.
    Increment,
    KeepFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    OneOff { next: OneOffNext },
    /// Prepare the current shape and execute through the new handle. A refused prepare turns
    /// into a one-off run and `FailedForShape`.
    Prepare,
    Reuse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Release the currently held handle before acting.
    pub deallocate_current: bool,
    pub action: PlannedAction,
}

impl Plan {
    fn one_off(deallocate_current: bool, next: OneOffNext) -> Self {
        Self {
            deallocate_current,
            action: PlannedAction::OneOff { next },
        }
    }
}

#[must_use]
pub fn plan(state: &PrepareState, delta: ShapeDelta, mode: PrepareMode) -> Plan {
    let held = state.is_prepared();

    if mode == PrepareMode::Direct {
        let next = if delta.structural_change {
            OneOffNext::Reset
        } else {
            OneOffNext::Increment
        };
        return Plan::one_off(held, next);
    }

    if delta.structural_change {
        if delta.limit_first_use && held {
            return Plan {
                deallocate_current: true,
                action: PlannedAction::Prepare,
            };
        }
        return Plan::one_off(held, OneOffNext::Reset);
    }

    match state {
        PrepareState::Fresh => Plan::one_off(false, OneOffNext::Reset),
        PrepareState::NotPrepared { .. } => Plan {
            deallocate_current: false,
            action: PlannedAction::Prepare,
        },
        PrepareState::Prepared(_) => Plan {
            deallocate_current: false,
            action: PlannedAction::Reuse,
        },
        PrepareState::FailedForShape => Plan::one_off(false, OneOffNext::KeepFailed),
    }
}
