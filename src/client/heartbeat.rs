use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::utils::BusError;

/// Runs a callback at a fixed period. The beat count itself is owned by the
/// callback's target.
///
/// The ticking task is aborted when the heartbeat is dropped.
#[derive(Debug)]
pub struct Heartbeat {
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Start beating every `period`, which must be positive. The first beat
    /// fires one period after start.
    pub fn start<F>(runtime: &Handle, period: Duration, on_beat: F) -> Result<Self, BusError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(BusError::Config("heartbeat period must be positive".into()));
        }
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                trace!("Heartbeat");
                on_beat();
            }
        });
        Ok(Self { task })
    }

    pub fn stop(self) {}
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}
