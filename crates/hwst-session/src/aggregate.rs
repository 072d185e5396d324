//! Progress and result aggregation over a plan.
//! - set_progress: clamp and fold element progress into its group
//! - set_result/recompute_group: classify status codes and derive group results
//! - compute_final: session verdict for the primary and filtered views

use serde_json::Value;

use crate::errcodes;
use crate::plan::{Plan, ResultState};
use crate::protocol::FilterReport;

/// Session verdict in both views; `show_filtered` picks the displayed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalResult {
    pub primary: ResultState,
    pub filtered: ResultState,
    pub show_filtered: bool,
}

impl FinalResult {
    #[must_use]
    pub fn displayed(&self) -> ResultState {
        if self.show_filtered {
            self.filtered
        } else {
            self.primary
        }
    }
}

/// Upper-case verdict used in agent log lines.
#[must_use]
pub fn verdict_text(result: ResultState) -> &'static str {
    match result {
        ResultState::Passed => "PASSED",
        state if state.is_failure() => "FAILED",
        _ => "WARNING",
    }
}

impl Plan {
    /// Store clamped progress and refold the owning group as the floored mean.
    ///
    /// Returns the owning group index, `None` for an unknown ordinal.
    pub fn set_progress(&mut self, ordinal: u32, progress: i64) -> Option<usize> {
        let index = self.group_of(ordinal)?;
        let element = self.element_mut(ordinal)?;
        // lossless after the clamp
        element.progress = u8::try_from(progress.clamp(0, 100)).unwrap_or(100);

        let group = &mut self.groups[index];
        let total: u32 = group
            .elements
            .iter()
            .map(|element| u32::from(element.progress))
            .sum();
        let count = u32::try_from(group.elements.len()).unwrap_or(u32::MAX).max(1);
        group.progress = u8::try_from(total / count).unwrap_or(100);
        Some(index)
    }

    /// Record a terminal status and classify it in both views.
    pub fn set_result(
        &mut self,
        ordinal: u32,
        status: i64,
        data: Option<Value>,
        filter: Option<FilterReport>,
    ) -> Option<usize> {
        let element = self.element_mut(ordinal)?;
        element.status = status;
        element.data = data;
        element.result = errcodes::classify(status);
        element.filter_status = match filter {
            Some(report) if report.enabled => report.status,
            _ => errcodes::filter_status(status),
        };
        element.filter_result = errcodes::filter_result(element.filter_status);
        self.group_of(ordinal)
    }

    /// Fold element results into the group's primary and filtered result.
    ///
    /// The first failed element decides the headline; otherwise the last non-passed one does.
    pub fn recompute_group(&mut self, group: usize) -> Option<ResultState> {
        let group = self.groups.get_mut(group)?;
        if group.elements.is_empty() {
            return Some(group.result);
        }
        let mut result = ResultState::Passed;
        let mut headline = None;
        for element in &group.elements {
            if element.result.is_failure() {
                result = ResultState::Failed;
                headline = Some(element.ordinal);
                break;
            }
            if element.result != ResultState::Passed {
                result = ResultState::Warning;
                headline = Some(element.ordinal);
            }
        }
        let filtered_failed = group
            .elements
            .iter()
            .any(|element| element.filter_result == ResultState::Error);

        group.result = result;
        group.headline = headline;
        group.filtered_result = if filtered_failed {
            ResultState::Failed
        } else {
            ResultState::Passed
        };
        Some(result)
    }

    #[must_use]
    pub fn compute_final(&self, cancelling: bool, show_filtered: bool) -> FinalResult {
        let mut primary = ResultState::Passed;
        for group in &self.groups {
            if group.result == ResultState::Failed {
                primary = ResultState::Failed;
                break;
            }
            if cancelling || group.result != ResultState::Passed {
                primary = ResultState::Warning;
            }
        }
        let filtered = if self
            .elements()
            .any(|element| element.filter_result == ResultState::Error)
        {
            ResultState::Failed
        } else {
            ResultState::Passed
        };
        FinalResult {
            primary,
            filtered,
            show_filtered,
        }
    }
}
