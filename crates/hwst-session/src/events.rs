//! Session stages, correlation cookies and the events handed to the presentation layer.

use std::fmt;

use serde_json::Value;
use smol_str::SmolStr;

use crate::aggregate::FinalResult;
use crate::device::DeviceInfo;
use crate::plan::ResultState;

/// Explicit session state machine; each stage owns one event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    StartupInfo,
    Capabilities,
    PreviousResults,
    Ready,
    Running,
    Cancelling,
    Finished,
    /// The agent never answered or the connection dropped.
    Aborted,
    /// Left after inactivity or on request.
    Exited,
}

impl Stage {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Aborted | Self::Exited)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::StartupInfo => "startup-info",
            Self::Capabilities => "capabilities",
            Self::PreviousResults => "previous-results",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Finished => "finished",
            Self::Aborted => "aborted",
            Self::Exited => "exited",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Routes correlator events back to the stage request or plan element that issued them.
///
/// Element cookies carry the run number so replies from an earlier run never land on
/// the element with the same ordinal in a rerun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cookie {
    StartupInfo,
    Capabilities,
    PreviousResults,
    Element { run: u32, ordinal: u32 },
}

/// Typed notifications for the presentation layer, drained in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StageChanged {
        from: Stage,
        to: Stage,
    },
    DeviceInfo(DeviceInfo),
    /// Group names left after capability pruning.
    Capabilities {
        groups: Vec<SmolStr>,
    },
    PreviousResults {
        available: bool,
        end_time: Option<SmolStr>,
    },
    PlanBuilt {
        groups: usize,
        elements: usize,
    },
    Started {
        ordinal: u32,
    },
    Progress {
        ordinal: u32,
        progress: u8,
        group: usize,
        group_progress: u8,
    },
    Log {
        ordinal: u32,
        data: Value,
    },
    ErrorLog {
        ordinal: u32,
        code: Option<i64>,
        data: Option<Value>,
    },
    ElementResult {
        ordinal: u32,
        result: ResultState,
        status: i64,
    },
    GroupResult {
        group: usize,
        result: ResultState,
        filtered: ResultState,
    },
    Final(FinalResult),
    AgentMissing,
    ExitRequested {
        agent_busy: bool,
    },
}
