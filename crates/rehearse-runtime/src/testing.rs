//! Test doubles shared across the runtime's unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rehearse_core::ToolObserver;

use crate::providers::ChatMessage;
use crate::responder::{Responder, ResponderError};
use crate::tools::{ToolSet, KNOWLEDGE_TOOL_NAME};

/// One call as seen by a [`ScriptedResponder`].
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub system_prompt: String,
    pub context: Vec<ChatMessage>,
    pub tool_names: Vec<String>,
}

/// Responder that replays a script of replies and failures.
pub struct ScriptedResponder {
    script: Mutex<VecDeque<Result<String, String>>>,
    delay: Option<Duration>,
    report_tool_use: bool,
    calls: AtomicUsize,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedResponder {
    pub fn new(script: impl IntoIterator<Item = Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            delay: None,
            report_tool_use: false,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn replies<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(replies.into_iter().map(|r| Ok(r.to_string())))
    }

    pub fn always_failing() -> Self {
        Self::new([])
    }

    /// Numbered replies (`prefix 1`, `prefix 2`, ...) once the script runs out.
    pub fn numbered(prefix: &'static str) -> NumberedResponder {
        NumberedResponder {
            prefix,
            calls: AtomicUsize::new(0),
            report_tool_use: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_tool_use(mut self) -> Self {
        self.report_tool_use = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }
}

fn record(
    seen: &Mutex<Vec<SeenRequest>>,
    system_prompt: &str,
    context: &[ChatMessage],
    tools: &ToolSet,
) {
    seen.lock().push(SeenRequest {
        system_prompt: system_prompt.to_string(),
        context: context.to_vec(),
        tool_names: tools.names().into_iter().map(String::from).collect(),
    });
}

fn report_knowledge_lookup(observer: &dyn ToolObserver, call: usize) {
    let id = format!("call_{call}");
    let input = BTreeMap::from([("query".to_string(), json!("returns"))]);
    observer.before_tool_call(&id, KNOWLEDGE_TOOL_NAME, &input);
    observer.after_tool_call(&id, "Returns are accepted within 30 days.");
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(
        &self,
        system_prompt: &str,
        context: &[ChatMessage],
        tools: &ToolSet,
        observer: &dyn ToolObserver,
    ) -> Result<String, ResponderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        record(&self.seen, system_prompt, context, tools);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(reply)) => {
                if self.report_tool_use {
                    report_knowledge_lookup(observer, call);
                }
                Ok(reply)
            }
            Some(Err(message)) => Err(ResponderError::Failed(message)),
            None => Err(ResponderError::Failed("script exhausted".to_string())),
        }
    }
}

/// Responder that never runs out: call `n` answers `"{prefix} {n}"`.
pub struct NumberedResponder {
    prefix: &'static str,
    calls: AtomicUsize,
    report_tool_use: bool,
    seen: Mutex<Vec<SeenRequest>>,
}

impl NumberedResponder {
    pub fn with_tool_use(mut self) -> Self {
        self.report_tool_use = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Responder for NumberedResponder {
    async fn respond(
        &self,
        system_prompt: &str,
        context: &[ChatMessage],
        tools: &ToolSet,
        observer: &dyn ToolObserver,
    ) -> Result<String, ResponderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        record(&self.seen, system_prompt, context, tools);
        if self.report_tool_use {
            report_knowledge_lookup(observer, call);
        }
        Ok(format!("{} {}", self.prefix, call))
    }
}
