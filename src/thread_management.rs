//! Thread supplier helpers
//!
//! The core never spawns threads on its own behalf - the host decides how
//! processor loops are executed. These helpers cover the common cases:
//! named threads, optional CPU core pinning for latency-sensitive
//! consumers, and a join-on-drop wrapper. [`WorkerPool`](crate::WorkerPool)
//! uses them internally.

use std::thread::{self, JoinHandle};

use core_affinity::CoreId;
use tracing::{debug, warn};

/// Builder for processor threads with naming and optional core pinning.
pub struct ThreadBuilder {
    name: Option<String>,
    affinity: Option<CoreId>,
}

impl ThreadBuilder {
    /// Create a new thread builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: None,
            affinity: None,
        }
    }

    /// Pin the spawned thread to `core_id`.
    ///
    /// # Panics
    /// Panics if `core_id` is not present on this system; pinning to a
    /// nonexistent core would otherwise fail silently at run time.
    #[must_use]
    pub fn pin_at_core(mut self, core_id: usize) -> Self {
        let cores = available_cores();
        assert!(
            cores.contains(&core_id),
            "CPU core {core_id} is not available; available cores: {cores:?}"
        );
        self.affinity = Some(CoreId { id: core_id });
        self
    }

    /// Name the spawned thread.
    #[must_use]
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Spawn `f` on a new thread with the configured name and affinity.
    ///
    /// # Errors
    /// Propagates the OS error if the thread cannot be spawned.
    pub fn spawn<F>(self, f: F) -> std::io::Result<ManagedThread>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = self
            .name
            .unwrap_or_else(|| String::from("ringline-processor"));
        let affinity = self.affinity;

        let builder = thread::Builder::new().name(name.clone());
        let thread_name = name.clone();
        let join_handle = builder.spawn(move || {
            if let Some(core) = affinity {
                if core_affinity::set_for_current(core) {
                    debug!(thread = %thread_name, core = core.id, "pinned thread to core");
                } else {
                    warn!(thread = %thread_name, core = core.id, "could not pin thread to core");
                }
            }
            f();
        })?;

        Ok(ManagedThread {
            join_handle: Some(join_handle),
            name,
        })
    }
}

impl Default for ThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a spawned processor thread that joins on drop.
pub struct ManagedThread {
    join_handle: Option<JoinHandle<()>>,
    name: String,
}

impl ManagedThread {
    /// The thread's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the thread to finish.
    ///
    /// # Errors
    /// Returns the thread's panic payload if it panicked.
    pub fn join(mut self) -> thread::Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }

    /// True while the thread has not finished.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

/// IDs of the CPU cores available for pinning.
#[must_use]
pub fn available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .unwrap_or_default()
        .into_iter()
        .map(|core| core.id)
        .collect()
}
