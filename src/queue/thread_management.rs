//! Thread management and CPU affinity
//!
//! The consumer loop runs on a dedicated, named thread which can optionally be
//! pinned to a CPU core. `ManagedThread` adds a deadline-bounded join on top
//! of the standard join handle.

use core_affinity::CoreId;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Poll interval used while waiting for a thread to finish before a deadline
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Managed thread wrapper for the consumer loop
pub struct ManagedThread {
    join_handle: Option<JoinHandle<()>>,
    thread_name: String,
}

impl ManagedThread {
    pub(crate) fn new(join_handle: JoinHandle<()>, thread_name: String) -> Self {
        Self {
            join_handle: Some(join_handle),
            thread_name,
        }
    }

    /// Get the thread name
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Join the thread, waiting for it to complete
    pub fn join(mut self) -> thread::Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }

    /// Join the thread if it finishes before `deadline`
    ///
    /// Returns the thread back as `Err` if it is still running when the
    /// deadline passes.
    pub fn join_until(self, deadline: Instant) -> Result<thread::Result<()>, ManagedThread> {
        loop {
            if !self.is_running() {
                return Ok(self.join());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(self);
            }
            thread::sleep(JOIN_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("thread_name", &self.thread_name)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Thread builder with CPU affinity and naming support
#[derive(Debug, Clone, Default)]
pub struct ThreadBuilder {
    name: Option<String>,
    affinity: Option<CoreId>,
}

impl ThreadBuilder {
    /// Create a new thread builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set thread name
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Pin the thread to a CPU core
    ///
    /// A core that is not available is reported when the thread starts and
    /// the thread then runs unpinned.
    pub fn pin_at_core(mut self, core_id: usize) -> Self {
        self.affinity = Some(CoreId { id: core_id });
        self
    }

    /// Spawn a thread with the configured settings
    pub fn spawn<F>(self, f: F) -> std::io::Result<ManagedThread>
    where
        F: FnOnce() + Send + 'static,
    {
        let thread_name = self.name.unwrap_or_else(|| "ringflush-consumer".to_string());
        let affinity = self.affinity;

        let name_for_closure = thread_name.clone();
        let join_handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                set_affinity_if_defined(affinity, &name_for_closure);
                f();
            })?;

        Ok(ManagedThread::new(join_handle, thread_name))
    }
}

fn set_affinity_if_defined(affinity: Option<CoreId>, thread_name: &str) {
    if let Some(core_id) = affinity {
        if core_affinity::set_for_current(core_id) {
            tracing::debug!(thread = thread_name, core = core_id.id, "pinned thread to CPU core");
        } else {
            tracing::warn!(
                thread = thread_name,
                core = core_id.id,
                "could not pin thread to CPU core"
            );
        }
    }
}

/// Get available CPU core IDs
pub fn get_available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .unwrap_or_default()
        .iter()
        .map(|core| core.id)
        .collect()
}
