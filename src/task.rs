use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, trace, warn};

use crate::backend::RegionResult;
use crate::handle::HandlePin;
use crate::resolve::{bounded, AddressResolver};
use crate::unhandled::{self, CallbackPanic};

/// Longest host string copied into a lookup task.
pub const MAX_HOST_LEN: usize = 255;

/// Single-shot completion callback for an asynchronous lookup.
///
/// Receives `None` when the host could not be resolved or the database has
/// no record for it.
pub type Callback = Box<dyn FnOnce(Option<RegionResult>) + Send + 'static>;

/// Scheduling parameters carried by every asynchronous lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LookupOptions {
    /// Delay applied at the start of the background phase.
    pub sleep_for: Duration,
    /// Step recorded alongside the delay. Nothing retries on it.
    pub increment_by: u32,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            sleep_for: Duration::ZERO,
            increment_by: 2,
        }
    }
}

impl LookupOptions {
    pub fn with_latency(mut self, sleep_for: Duration) -> Self {
        self.sleep_for = sleep_for;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskState {
    Created,
    Enqueued,
    BackgroundRunning,
    CompletionPending,
    Delivered,
}

/// The record an asynchronous lookup carries across the background and
/// completion phases.
pub(crate) struct LookupTask {
    pin: Option<HandlePin>,
    resolver: Arc<dyn AddressResolver>,
    host: String,
    options: LookupOptions,
    callback: Option<Callback>,
    result: Option<RegionResult>,
    state: TaskState,
}

impl fmt::Debug for LookupTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupTask")
            .field("host", &self.host)
            .field("options", &self.options)
            .field("state", &self.state)
            .field("result", &self.result)
            .finish()
    }
}

impl LookupTask {
    pub(crate) fn new(
        pin: HandlePin,
        resolver: Arc<dyn AddressResolver>,
        host: &str,
        options: LookupOptions,
        callback: Callback,
    ) -> Self {
        Self {
            pin: Some(pin),
            resolver,
            host: bounded(host, MAX_HOST_LEN),
            options,
            callback: Some(callback),
            result: None,
            state: TaskState::Created,
        }
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> TaskState {
        self.state
    }

    pub(crate) fn enqueued(mut self) -> Self {
        self.advance(TaskState::Enqueued);
        self
    }

    fn advance(&mut self, next: TaskState) {
        trace!(host = %self.host, from = ?self.state, to = ?next, "lookup task");
        self.state = next;
    }

    /// Background phase: blocking delay, address resolution and the
    /// database read. Never unwinds.
    pub(crate) fn run(mut self) -> Self {
        self.advance(TaskState::BackgroundRunning);
        if !self.options.sleep_for.is_zero() {
            std::thread::sleep(self.options.sleep_for);
        }

        let found = panic::catch_unwind(AssertUnwindSafe(|| self.search()));
        self.result = match found {
            Ok(result) => result,
            Err(payload) => {
                let message = unhandled::panic_message(payload.as_ref());
                error!(host = %self.host, %message, "background lookup panicked");
                None
            }
        };
        self.advance(TaskState::CompletionPending);
        self
    }

    fn search(&self) -> Option<RegionResult> {
        let ipnum = self.resolver.resolve(&self.host);
        if ipnum == 0 {
            trace!(host = %self.host, "unresolvable host");
            return None;
        }
        let pin = self.pin.as_ref()?;
        match pin.database().region_by_numeric_address(ipnum) {
            Ok(found) => found,
            Err(err) => {
                warn!(host = %self.host, error = %err, "region lookup failed");
                None
            }
        }
    }

    /// Completion phase: release the pin, then hand the result to the
    /// callback exactly once.
    pub(crate) fn deliver(mut self) {
        drop(self.pin.take());
        let Some(callback) = self.callback.take() else {
            return;
        };
        let result = self.result.take();
        invoke(&self.host, callback, result);
        self.advance(TaskState::Delivered);
    }
}

impl Drop for LookupTask {
    // Reached with the callback still present only when the runtime dropped
    // the task before its completion phase ran.
    fn drop(&mut self) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        drop(self.pin.take());
        warn!(host = %self.host, state = ?self.state, "lookup task dropped before delivery");
        invoke(&self.host, callback, None);
        self.advance(TaskState::Delivered);
    }
}

fn invoke(host: &str, callback: Callback, result: Option<RegionResult>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || callback(result))) {
        unhandled::report(CallbackPanic::from_payload(host, payload));
    }
}
