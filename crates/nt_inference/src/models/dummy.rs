use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use nt_core::{Error, InferenceModel, Result, Task};

#[derive(Default)]
struct Script {
    queued: HashMap<Task, VecDeque<String>>,
    fixed: HashMap<Task, String>,
    failing: HashSet<Task>,
    calls: Vec<(Task, String)>,
}

/// Offline model answering from a script.
///
/// Queued answers are consumed first, then the fixed answer for the task.
/// A task with neither, or marked as failing, returns a capability error,
/// so an unscripted `DummyModel` drives every caller onto its fallback.
pub struct DummyModel {
    script: Mutex<Script>,
    delay: Option<Duration>,
}

impl fmt::Debug for DummyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyModel").field("delay", &self.delay).finish()
    }
}

impl Default for DummyModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyModel {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::default()),
            delay: None,
        }
    }

    /// Answer every call for `task` with `response`.
    pub fn with_response(self, task: Task, response: impl Into<String>) -> Self {
        self.lock().fixed.insert(task, response.into());
        self
    }

    pub fn with_failure(self, task: Task) -> Self {
        self.lock().failing.insert(task);
        self
    }

    /// Sleep before answering. Used to exercise the caller's timeout.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer the next call for `task` with `response`, once.
    pub fn push_response(&self, task: Task, response: impl Into<String>) {
        self.lock().queued.entry(task).or_default().push_back(response.into());
    }

    pub fn set_response(&self, task: Task, response: impl Into<String>) {
        self.lock().fixed.insert(task, response.into());
    }

    pub fn set_failure(&self, task: Task, failing: bool) {
        let mut script = self.lock();
        if failing {
            script.failing.insert(task);
        } else {
            script.failing.remove(&task);
        }
    }

    pub fn calls(&self) -> Vec<Task> {
        self.lock().calls.iter().map(|(task, _)| *task).collect()
    }

    pub fn call_count(&self, task: Task) -> usize {
        self.lock().calls.iter().filter(|(t, _)| *t == task).count()
    }

    pub fn prompts(&self, task: Task) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|(t, _)| *t == task)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn answer(&self, task: Task, prompt: &str) -> Result<String> {
        let mut script = self.lock();
        script.calls.push((task, prompt.to_string()));
        if script.failing.contains(&task) {
            return Err(Error::Capability(format!("{}: scripted failure", task)));
        }
        if let Some(response) = script.queued.get_mut(&task).and_then(|q| q.pop_front()) {
            return Ok(response);
        }
        script
            .fixed
            .get(&task)
            .cloned()
            .ok_or_else(|| Error::Capability(format!("{}: no scripted response", task)))
    }
}

#[async_trait]
impl InferenceModel for DummyModel {
    fn name(&self) -> &str {
        "Dummy"
    }

    async fn complete(&self, task: Task, prompt: &str) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer(task, prompt)
    }
}
