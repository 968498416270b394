//! Job state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Job lifecycle states.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Queued and waiting to be claimed by the scheduler.
    #[default]
    Submitted,
    /// Claimed; a pipeline owns the job exclusively.
    Processing,
    /// Pipeline finished successfully.
    Done,
    /// Pipeline failed; `err_reason` carries the cause. A user-triggered
    /// retry moves the job back to Submitted.
    Errored,
}

impl JobState {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Processing => "PROCESSING",
            Self::Done => "DONE",
            Self::Errored => "ERRORED",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUBMITTED" => Some(Self::Submitted),
            "PROCESSING" => Some(Self::Processing),
            "DONE" => Some(Self::Done),
            "ERRORED" => Some(Self::Errored),
            _ => None,
        }
    }

    /// Check if this is a terminal status (no scheduler interest).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }

    /// A job may be deleted by an external removal request in any state
    /// except Processing, where a pipeline still owns its output directory.
    pub fn is_deletable(&self) -> bool {
        !matches!(self, Self::Processing)
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, target),
            (Submitted, Processing) | (Processing, Done | Errored) | (Errored, Submitted)
        )
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: JobState) -> Result<JobState, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}
