use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// The six stages of a run, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(into = "u8", try_from = "u8")]
#[strum(serialize_all = "snake_case")]
pub enum StageId {
    Propagation,
    Filter,
    Signal,
    Timeseries,
    Integration,
    Pool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownStage(pub u8);

impl fmt::Display for UnknownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no stage {} (stages are 1 to 6)", self.0)
    }
}

impl std::error::Error for UnknownStage {}

impl StageId {
    pub const ALL: [StageId; 6] = [
        StageId::Propagation,
        StageId::Filter,
        StageId::Signal,
        StageId::Timeseries,
        StageId::Integration,
        StageId::Pool,
    ];

    pub fn number(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_number(n: u8) -> Result<Self, UnknownStage> {
        n.checked_sub(1)
            .and_then(|i| Self::ALL.get(i as usize).copied())
            .ok_or(UnknownStage(n))
    }

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self as usize + 1).copied()
    }

    pub fn previous(self) -> Option<Self> {
        (self as usize).checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Stages from this one to the end.
    pub fn through_end(self) -> impl Iterator<Item = StageId> {
        Self::ALL.into_iter().skip(self as usize)
    }

    /// Only stages 2 to 6 leave an artifact on disk.
    pub fn persists_artifact(self) -> bool {
        self != StageId::Propagation
    }

    pub fn label(self) -> String {
        format!("stage {} ({})", self.number(), self)
    }
}

impl From<StageId> for u8 {
    fn from(stage: StageId) -> u8 {
        stage.number()
    }
}

impl TryFrom<u8> for StageId {
    type Error = UnknownStage;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::from_number(n)
    }
}
