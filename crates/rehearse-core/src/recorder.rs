//! Tool-call instrumentation for support turns.
//!
//! Responders report tool activity through [`ToolObserver`]. The
//! [`ToolUsageRecorder`] pairs start and end events by call id and hands the
//! completed calls to the turn that produced them.

use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::conversation::ToolUsage;

/// Receives tool-call events from a responder.
///
/// One observer is registered per conversation run, so events from
/// concurrent runs never mix.
pub trait ToolObserver: Send + Sync {
    /// A tool call is about to run.
    fn before_tool_call(
        &self,
        tool_call_id: &str,
        tool_name: &str,
        input: &BTreeMap<String, serde_json::Value>,
    );

    /// A tool call finished with the given output.
    fn after_tool_call(&self, tool_call_id: &str, output: &str);
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopToolObserver;

impl ToolObserver for NoopToolObserver {
    fn before_tool_call(&self, _: &str, _: &str, _: &BTreeMap<String, serde_json::Value>) {}

    fn after_tool_call(&self, _: &str, _: &str) {}
}

#[derive(Debug)]
struct PendingCall {
    tool_name: String,
    input: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default)]
struct RecorderState {
    pending: BTreeMap<String, PendingCall>,
    completed: Vec<ToolUsage>,
}

/// Correlates tool-call start/end events for one support turn.
///
/// Calls that start but never finish (a tool that failed inside the
/// responder) are dropped on [`drain`](Self::drain).
#[derive(Debug, Default)]
pub struct ToolUsageRecorder {
    state: Mutex<RecorderState>,
}

impl ToolUsageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a tool call.
    pub fn before(
        &self,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: BTreeMap<String, serde_json::Value>,
    ) {
        self.state.lock().pending.insert(
            tool_call_id.into(),
            PendingCall {
                tool_name: tool_name.into(),
                input,
            },
        );
    }

    /// Record the end of a tool call.
    pub fn after(&self, tool_call_id: &str, output: impl Into<String>) {
        let mut state = self.state.lock();
        match state.pending.remove(tool_call_id) {
            Some(call) => state.completed.push(ToolUsage {
                tool_name: call.tool_name,
                tool_input: call.input,
                tool_output: output.into(),
            }),
            None => {
                tracing::debug!(tool_call_id, "Tool call completed without a start event");
            }
        }
    }

    /// Take the completed calls in completion order and reset all state.
    pub fn drain(&self) -> Vec<ToolUsage> {
        let mut state = self.state.lock();
        if !state.pending.is_empty() {
            tracing::debug!(
                dropped = state.pending.len(),
                "Dropping tool calls that never completed"
            );
            state.pending.clear();
        }
        std::mem::take(&mut state.completed)
    }
}

impl ToolObserver for ToolUsageRecorder {
    fn before_tool_call(
        &self,
        tool_call_id: &str,
        tool_name: &str,
        input: &BTreeMap<String, serde_json::Value>,
    ) {
        self.before(tool_call_id, tool_name, input.clone());
    }

    fn after_tool_call(&self, tool_call_id: &str, output: &str) {
        self.after(tool_call_id, output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(q: &str) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::from([("query".to_string(), json!(q))])
    }

    #[test]
    fn test_pairs_events_by_id() {
        let recorder = ToolUsageRecorder::new();
        recorder.before("call_1", "search_knowledge_base", query("returns"));
        recorder.before("call_2", "search_knowledge_base", query("shipping"));
        recorder.after("call_2", "shipping info");
        recorder.after("call_1", "returns info");

        let usages = recorder.drain();
        assert_eq!(usages.len(), 2);
        assert_eq!(usages[0].tool_output, "shipping info");
        assert_eq!(usages[0].tool_input["query"], json!("shipping"));
        assert_eq!(usages[1].tool_output, "returns info");
    }

    #[test]
    fn test_pending_calls_are_dropped() {
        let recorder = ToolUsageRecorder::new();
        recorder.before("call_1", "search_knowledge_base", query("a"));
        recorder.before("call_2", "search_knowledge_base", query("b"));
        recorder.after("call_1", "done");

        let usages = recorder.drain();
        assert_eq!(usages.len(), 1);

        // The unfinished call must not surface later either.
        recorder.after("call_2", "late");
        assert!(recorder.drain().is_empty());
    }

    #[test]
    fn test_drain_clears_state() {
        let recorder = ToolUsageRecorder::new();
        recorder.before("call_1", "t", BTreeMap::new());
        recorder.after("call_1", "out");

        assert_eq!(recorder.drain().len(), 1);
        assert!(recorder.drain().is_empty());
    }

    #[test]
    fn test_after_without_before_is_ignored() {
        let recorder = ToolUsageRecorder::new();
        recorder.after("ghost", "out");
        assert!(recorder.drain().is_empty());
    }

    #[test]
    fn test_observer_interface_records() {
        let recorder = ToolUsageRecorder::new();
        let observer: &dyn ToolObserver = &recorder;
        observer.before_tool_call("id", "search_knowledge_base", &query("x"));
        observer.after_tool_call("id", "result");

        let usages = recorder.drain();
        assert_eq!(usages[0].tool_name, "search_knowledge_base");
    }
}
