//! Component lifecycle states and the transition table.

use crate::error::{Error, Result};
use std::fmt;

/// Lifecycle state of a component.
///
/// ```text
/// LOADED ⇄ IDLE ⇄ EXECUTING ⇄ PAUSE
///                     PAUSE → IDLE
/// any ─────────────────────────────► INVALID (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComponentState {
    /// Created, no capability allocated. Binding is only legal here.
    #[default]
    Loaded,
    /// Capability allocated, worker not scheduled.
    Idle,
    /// Worker performs domain work.
    Executing,
    /// Worker only waits for messages.
    Pause,
    /// Unrecoverable; only deinit is meaningful.
    Invalid,
}

impl ComponentState {
    /// Check that `self -> target` is in the transition table.
    pub fn check_transition(self, target: ComponentState) -> Result<()> {
        use ComponentState::*;

        if self == target {
            return Err(Error::SameState(self));
        }
        match (self, target) {
            (Invalid, _) => Err(Error::IncorrectStateTransition {
                from: self,
                to: target,
            }),
            (_, Invalid)
            | (Loaded, Idle)
            | (Idle, Loaded)
            | (Idle, Executing)
            | (Executing, Idle)
            | (Executing, Pause)
            | (Pause, Executing)
            | (Pause, Idle) => Ok(()),
            _ => Err(Error::IncorrectStateTransition {
                from: self,
                to: target,
            }),
        }
    }

    /// Encode as a message parameter.
    pub fn as_param(self) -> u32 {
        match self {
            Self::Loaded => 1,
            Self::Idle => 2,
            Self::Executing => 3,
            Self::Pause => 4,
            Self::Invalid => 5,
        }
    }

    /// Decode a message parameter.
    pub fn from_param(param: u32) -> Option<Self> {
        match param {
            1 => Some(Self::Loaded),
            2 => Some(Self::Idle),
            3 => Some(Self::Executing),
            4 => Some(Self::Pause),
            5 => Some(Self::Invalid),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loaded => "loaded",
            Self::Idle => "idle",
            Self::Executing => "executing",
            Self::Pause => "pause",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}
