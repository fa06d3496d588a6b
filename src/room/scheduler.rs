use std::{collections::HashMap, future::Future};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Named per-room background jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    Heartbeat,
    SpatialLoop,
    Cleanup,
}

/// Holds at most one task per [`Job`]. Starting a running job and cancelling
/// an idle one are both no-ops. Dropping the scheduler cancels everything.
#[derive(Debug, Default)]
pub struct RoomScheduler {
    jobs: Mutex<HashMap<Job, JoinHandle<()>>>,
}

impl RoomScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` unless `job` is already running. Returns whether it was
    /// spawned.
    pub fn start<F>(&self, job: Job, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut jobs = self.jobs.lock();
        if jobs.get(&job).is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        jobs.insert(job, tokio::spawn(task));
        true
    }

    /// Cancels any running `job` and spawns `task` in its place.
    pub fn restart<F>(&self, job: Job, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut jobs = self.jobs.lock();
        if let Some(previous) = jobs.insert(job, tokio::spawn(task)) {
            previous.abort();
        }
    }

    /// Cancels `job`. Returns whether it was running.
    pub fn cancel(&self, job: Job) -> bool {
        match self.jobs.lock().remove(&job) {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }

    pub fn is_running(&self, job: Job) -> bool {
        self.jobs
            .lock()
            .get(&job)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn cancel_all(&self) {
        for (_, handle) in self.jobs.lock().drain() {
            handle.abort();
        }
    }
}

impl Drop for RoomScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
