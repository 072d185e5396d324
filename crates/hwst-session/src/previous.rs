//! Stored results of the last run, as reported by the agent.

use serde_json::Value;
use smol_str::SmolStr;
use tracing::debug;

use crate::device::display_value;
use crate::errcodes;
use crate::plan::Plan;

/// A valid stored report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousReport {
    pub start_time: SmolStr,
    pub end_time: SmolStr,
    /// Stored status per report name.
    pub results: Vec<(SmolStr, i64)>,
}

impl PreviousReport {
    /// `None` unless `results_valid` is 0 and both timestamps are present.
    #[must_use]
    pub fn parse(payload: &Value) -> Option<Self> {
        let Some(object) = payload.as_object() else {
            debug!("previous results payload is not an object");
            return None;
        };
        if object.get("results_valid").and_then(Value::as_i64) != Some(0) {
            debug!("no valid previous results");
            return None;
        }
        let (Some(start), Some(end)) = (object.get("start_time"), object.get("end_time")) else {
            debug!("previous results without timestamps");
            return None;
        };
        let results = object
            .get("results")
            .and_then(Value::as_object)
            .map(|results| {
                results
                    .iter()
                    .map(|(name, entry)| {
                        let status = entry
                            .get("result")
                            .and_then(Value::as_i64)
                            .unwrap_or(errcodes::FAILURE);
                        (SmolStr::new(name), status)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            start_time: display_value(start),
            end_time: display_value(end),
            results,
        })
    }

    /// Load the stored statuses into `plan`; true when every element got a result.
    pub fn apply(&self, plan: &mut Plan) -> bool {
        for (name, status) in &self.results {
            let Some(ordinal) = plan.ordinal_for_report(name) else {
                debug!(diag = %name, "previous result for unknown diagnostic");
                continue;
            };
            plan.set_progress(ordinal, 100);
            if let Some(group) = plan.set_result(ordinal, *status, None, None) {
                plan.recompute_group(group);
            }
        }
        plan.all_finished()
    }
}
