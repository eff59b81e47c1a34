//! Status counter maintainer — background bookkeeping after engine writes.
//!
//! The engine never waits on counters. It drops a [`StatusTask`] into a
//! bounded queue and returns; a small pool of workers drains the queue and
//! applies each task to the store. Tasks are attempted at most once: a full
//! queue drops the task, a failing task is logged. Counters are therefore
//! eventually consistent, and tasks for the same setting may apply in any
//! order.

use std::sync::Arc;

use setgrid_core::config::StatusConfig;
use setgrid_state::{ModuleId, SettingId, StateResult, StateStore};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One unit of deferred bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusTask {
    /// Recompute a setting's status from its assignment rows.
    RefreshSetting(SettingId),
    AdjustSetting { setting_id: SettingId, delta: i64 },
    AdjustModule { module_id: ModuleId, delta: i64 },
    AdjustStatistic { key: &'static str, delta: i64 },
    /// Delete every assignment row of the given settings.
    PurgeAssignments(Vec<SettingId>),
    /// Delete every rule of the given settings.
    PurgeRules(Vec<SettingId>),
}

impl StatusTask {
    fn apply(&self, store: &StateStore) -> StateResult<()> {
        match self {
            StatusTask::RefreshSetting(id) => store.refresh_setting_status(*id).map(|_| ()),
            StatusTask::AdjustSetting { setting_id, delta } => {
                store.adjust_setting_status(*setting_id, *delta).map(|_| ())
            }
            StatusTask::AdjustModule { module_id, delta } => {
                store.adjust_module_status(*module_id, *delta).map(|_| ())
            }
            StatusTask::AdjustStatistic { key, delta } => {
                store.adjust_statistic(key, *delta).map(|_| ())
            }
            StatusTask::PurgeAssignments(ids) => store.purge_settings(ids).map(|_| ()),
            StatusTask::PurgeRules(ids) => store.delete_rules_for_settings(ids).map(|_| ()),
        }
    }
}

/// Cheap, cloneable sender side of the maintainer queue.
#[derive(Clone)]
pub struct StatusHandle {
    tx: mpsc::Sender<StatusTask>,
}

impl StatusHandle {
    /// Enqueue a task without waiting. Never fails; overflow is logged.
    pub fn schedule(&self, task: StatusTask) {
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task)) => {
                warn!(?task, "status queue full, task dropped");
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                warn!(?task, "status maintainer stopped, task dropped");
            }
        }
    }

    /// A handle whose tasks land in the returned receiver instead of a worker.
    #[cfg(test)]
    pub(crate) fn recording(capacity: usize) -> (Self, mpsc::Receiver<StatusTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

/// Owns the worker pool draining the status queue.
pub struct StatusMaintainer {
    handle: StatusHandle,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl StatusMaintainer {
    /// Start `config.workers` workers on the current tokio runtime.
    pub fn spawn(store: StateStore, config: &StatusConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let store = store.clone();
                let rx = rx.clone();
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    run_worker(worker, store, rx, shutdown_rx).await;
                })
            })
            .collect::<Vec<_>>();

        info!(
            workers = workers.len(),
            queue_capacity = config.queue_capacity,
            "status maintainer started"
        );

        Self {
            handle: StatusHandle { tx },
            shutdown_tx,
            workers,
        }
    }

    pub fn handle(&self) -> StatusHandle {
        self.handle.clone()
    }

    /// Stop the workers after they drain whatever is already queued.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "status worker panicked");
            }
        }
        info!("status maintainer stopped");
    }
}

async fn run_worker(
    worker: usize,
    store: StateStore,
    rx: Arc<Mutex<mpsc::Receiver<StatusTask>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker, "status worker started");
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                task = rx.recv() => task,
                _ = shutdown_rx.changed() => None,
            }
        };
        match next {
            Some(task) => run_task(worker, &store, task),
            None => break,
        }
    }

    // Drain what was queued before shutdown.
    let mut rx = rx.lock().await;
    while let Ok(task) = rx.try_recv() {
        run_task(worker, &store, task);
    }
    debug!(worker, "status worker stopped");
}

fn run_task(worker: usize, store: &StateStore, task: StatusTask) {
    match task.apply(store) {
        Ok(()) => debug!(worker, ?task, "status task applied"),
        Err(e) => error!(worker, ?task, error = %e, "status task failed"),
    }
}
