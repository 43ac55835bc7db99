//! Mock executors for dispatcher tests
//!
//! These executors never touch the network or the filesystem. They record
//! what the dispatcher hands them so tests can assert on ordering, attempt
//! numbers and per-key concurrency.

use async_trait::async_trait;
use codebot_core::{DispatchError, DispatchResult, ExecutionContext, Task, TaskExecutor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tracks how many executions are active per key and overall
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    inner: Mutex<ProbeState>,
}

#[derive(Debug, Default)]
struct ProbeState {
    active: HashMap<String, usize>,
    max_per_key: HashMap<String, usize>,
    active_total: usize,
    max_total: usize,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, key: &str) {
        let mut state = self.inner.lock().unwrap();
        let current = {
            let active = state.active.entry(key.to_string()).or_insert(0);
            *active += 1;
            *active
        };
        let max = state.max_per_key.entry(key.to_string()).or_insert(0);
        *max = (*max).max(current);
        state.active_total += 1;
        state.max_total = state.max_total.max(state.active_total);
    }

    pub fn exit(&self, key: &str) {
        let mut state = self.inner.lock().unwrap();
        if let Some(active) = state.active.get_mut(key) {
            *active = active.saturating_sub(1);
        }
        state.active_total = state.active_total.saturating_sub(1);
    }

    /// Highest number of simultaneous executions observed for `key`
    pub fn max_for(&self, key: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .max_per_key
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Highest observed value over every key
    pub fn max_per_key(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .max_per_key
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }

    pub fn max_total(&self) -> usize {
        self.inner.lock().unwrap().max_total
    }
}

/// Records every `(key, attempt)` pair it executes
///
/// Optionally sleeps for a fixed duration per call and fails the first
/// `fail_first` attempts of every task.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<(String, u32)>>>,
    probe: Arc<ConcurrencyProbe>,
    delay: Duration,
    fail_first: u32,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every attempt numbered `<= attempts`
    pub fn failing_first(mut self, attempts: u32) -> Self {
        self.fail_first = attempts;
        self
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Attempt numbers seen for `key`, in execution order
    pub fn attempts_for(&self, key: &str) -> Vec<u32> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, attempt)| *attempt)
            .collect()
    }

    pub fn probe(&self) -> Arc<ConcurrencyProbe> {
        Arc::clone(&self.probe)
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    fn name(&self) -> &str {
        "recording"
    }

    async fn execute(&self, _ctx: &ExecutionContext, task: &Task) -> DispatchResult<()> {
        let key = task.key();
        self.probe.enter(&key);
        self.calls.lock().unwrap().push((key.clone(), task.attempt));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.probe.exit(&key);

        if task.attempt <= self.fail_first {
            return Err(DispatchError::execution(format!(
                "scripted failure on attempt {}",
                task.attempt
            )));
        }
        Ok(())
    }
}

/// Always returns an execution error
#[derive(Debug, Clone, Default)]
pub struct FailingExecutor {
    calls: Arc<AtomicUsize>,
}

impl FailingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for FailingExecutor {
    fn name(&self) -> &str {
        "failing"
    }

    async fn execute(&self, _ctx: &ExecutionContext, task: &Task) -> DispatchResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DispatchError::execution(format!("{} failed", task.key())))
    }
}

/// Panics on every call
#[derive(Debug, Clone, Default)]
pub struct PanickingExecutor {
    calls: Arc<AtomicUsize>,
}

impl PanickingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for PanickingExecutor {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn execute(&self, _ctx: &ExecutionContext, task: &Task) -> DispatchResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("executor blew up on {}", task.key());
    }
}

/// Blocks until released or until the execution context is cancelled
#[derive(Debug, Clone, Default)]
pub struct BlockingExecutor {
    gate: CancellationToken,
    started: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
}

impl BlockingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let every blocked and future call complete successfully
    pub fn release(&self) {
        self.gate.cancel();
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Calls that returned because their context was cancelled
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for BlockingExecutor {
    fn name(&self) -> &str {
        "blocking"
    }

    async fn execute(&self, ctx: &ExecutionContext, task: &Task) -> DispatchResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = self.gate.cancelled() => Ok(()),
            _ = ctx.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                Err(DispatchError::execution(format!("{} cancelled", task.key())))
            }
        }
    }
}
