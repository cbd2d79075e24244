//! Scripted text generator for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::CallFailure;
use crate::errors::PromptforgeError;
use crate::providers::{Backend, GenerationRequest, TextGenerator};

/// Default reply: a single description line that every parser accepts.
pub const DEFAULT_REPLY: &str = "霓虹街头的赛博朋克女孩";

/// A text generator driven by per-key failure scripts.
///
/// A request matches a key when its user message contains the key. Matching
/// requests fail retryably until their failure budget is spent, or fail
/// fatally if the key is marked fatal. Every call is recorded, and the
/// number of calls in progress at once is tracked.
#[derive(Debug)]
pub struct ScriptedGenerator {
    backend: Backend,
    reply: String,
    delay: Duration,
    reachable: bool,
    failures: Mutex<HashMap<String, usize>>,
    fatal: HashSet<String>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    /// Creates a hosted-style generator that always answers [`DEFAULT_REPLY`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: Backend::Hosted,
            reply: DEFAULT_REPLY.to_string(),
            delay: Duration::ZERO,
            reachable: true,
            failures: Mutex::new(HashMap::new()),
            fatal: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sets the reported backend kind.
    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the reply text.
    #[must_use]
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    /// Makes every call take `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the startup probe fail.
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Makes the first `times` calls matching `key` fail retryably.
    #[must_use]
    pub fn fail_times(self, key: impl Into<String>, times: usize) -> Self {
        self.failures.lock().insert(key.into(), times);
        self
    }

    /// Makes every call matching `key` fail fatally.
    #[must_use]
    pub fn fatal_on(mut self, key: impl Into<String>) -> Self {
        self.fatal.insert(key.into());
        self
    }

    /// Returns the user message of every call, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns the total number of calls.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns how many calls matched `key`.
    #[must_use]
    pub fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.contains(key)).count()
    }

    /// Returns the most calls ever in progress at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self, user: &str) -> Option<CallFailure> {
        if let Some(key) = self.fatal.iter().find(|k| user.contains(k.as_str())) {
            return Some(CallFailure::fatal(format!("scripted fatal for {key}")));
        }
        let mut failures = self.failures.lock();
        let (key, remaining) = failures
            .iter_mut()
            .find(|(k, _)| user.contains(k.as_str()))?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(CallFailure::retryable(format!("scripted failure for {key}")))
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(current: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(current)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn probe(&self) -> Result<(), PromptforgeError> {
        if self.reachable {
            Ok(())
        } else {
            Err(PromptforgeError::service_unavailable(
                "scripted://probe",
                "connection refused",
            ))
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, CallFailure> {
        self.calls.lock().push(request.user.clone());
        let _guard = InFlightGuard::enter(&self.in_flight, &self.max_in_flight);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.scripted_failure(&request.user) {
            Some(failure) => Err(failure),
            None => Ok(self.reply.clone()),
        }
    }
}
