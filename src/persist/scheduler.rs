use super::byte_store::ByteStore;
use super::engine::EngineHandle;
use crate::core::{DbError, Result};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{Level, event};

/// Outcome reported to status callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStatus {
    Saving,
    Saved,
    Error,
}

impl fmt::Display for PersistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistStatus::Saving => write!(f, "saving"),
            PersistStatus::Saved => write!(f, "saved"),
            PersistStatus::Error => write!(f, "error"),
        }
    }
}

pub type StatusCallback = Arc<dyn Fn(PersistStatus) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Nothing scheduled, nothing writing.
    Idle,
    /// A debounce timer is armed.
    Pending,
    /// A write is in flight.
    Flushing,
    /// A write is in flight and a mutation arrived after its export began.
    FlushingDirty,
}

enum FlushTarget {
    Store(Arc<dyn ByteStore>),
    Disabled(String),
}

struct SchedulerState {
    phase: SchedulerPhase,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    /// Callbacks waiting for the next flush
    batch: Vec<StatusCallback>,
    in_flight: usize,
    last_status: Option<PersistStatus>,
}

struct Inner {
    engine: EngineHandle,
    target: FlushTarget,
    key: String,
    debounce: Duration,
    state: Mutex<SchedulerState>,
    write_lock: tokio::sync::Mutex<()>,
    idle: Notify,
}

/// Debounced snapshot writer.
///
/// Each [`schedule`](PersistScheduler::schedule) restarts the debounce timer;
/// only a timer that expires untouched exports the engine and writes the
/// snapshot. Writes are serialized on a single lock and the export is taken
/// after the lock is held, so the store always ends with the newest state.
#[derive(Clone)]
pub struct PersistScheduler {
    inner: Arc<Inner>,
}

impl PersistScheduler {
    pub fn new(
        engine: EngineHandle,
        store: Arc<dyn ByteStore>,
        key: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        Self::build(engine, FlushTarget::Store(store), key.into(), debounce)
    }

    /// A scheduler that never writes. Every request reports `Error`.
    pub fn disabled(engine: EngineHandle, reason: impl Into<String>) -> Self {
        Self::build(
            engine,
            FlushTarget::Disabled(reason.into()),
            String::new(),
            Duration::ZERO,
        )
    }

    fn build(engine: EngineHandle, target: FlushTarget, key: String, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                target,
                key,
                debounce,
                state: Mutex::new(SchedulerState {
                    phase: SchedulerPhase::Idle,
                    generation: 0,
                    timer: None,
                    batch: Vec::new(),
                    in_flight: 0,
                    last_status: None,
                }),
                write_lock: tokio::sync::Mutex::new(()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.inner.target, FlushTarget::Store(_))
    }

    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.inner.lock_state().phase
    }

    pub fn last_status(&self) -> Option<PersistStatus> {
        self.inner.lock_state().last_status
    }

    /// Requests a debounced flush. Must be called inside a tokio runtime.
    ///
    /// `callback` receives `Saving` before this returns, then `Saved` or
    /// `Error` once the flush covering this request completes.
    pub fn schedule(&self, callback: Option<StatusCallback>) {
        if let FlushTarget::Disabled(reason) = &self.inner.target {
            event!(Level::WARN, reason = %reason, "flush requested in memory-only mode");
            self.inner.lock_state().last_status = Some(PersistStatus::Error);
            if let Some(callback) = callback {
                callback(PersistStatus::Error);
            }
            return;
        }

        {
            let mut state = self.inner.lock_state();
            state.last_status = Some(PersistStatus::Saving);
            if let Some(callback) = &callback {
                state.batch.push(Arc::clone(callback));
            }

            match state.phase {
                SchedulerPhase::Idle | SchedulerPhase::Pending => {
                    state.phase = SchedulerPhase::Pending;
                    Inner::arm_timer(&self.inner, &mut state);
                }
                SchedulerPhase::Flushing | SchedulerPhase::FlushingDirty => {
                    state.phase = SchedulerPhase::FlushingDirty;
                }
            }
        }

        if let Some(callback) = callback {
            callback(PersistStatus::Saving);
        }
    }

    /// Writes the current state now, bypassing the debounce.
    ///
    /// A pending timer is cancelled and its callbacks are answered by this
    /// write.
    pub async fn flush_now(&self) -> Result<()> {
        if let FlushTarget::Disabled(reason) = &self.inner.target {
            self.inner.lock_state().last_status = Some(PersistStatus::Error);
            return Err(DbError::StoreUnavailable(reason.clone()));
        }

        let absorbed = {
            let mut state = self.inner.lock_state();
            let absorbed = match state.phase {
                SchedulerPhase::Pending => {
                    if let Some(timer) = state.timer.take() {
                        timer.abort();
                    }
                    state.generation += 1;
                    state.phase = SchedulerPhase::Flushing;
                    std::mem::take(&mut state.batch)
                }
                // This write starts after the running one and exports later
                SchedulerPhase::FlushingDirty => {
                    state.phase = SchedulerPhase::Flushing;
                    std::mem::take(&mut state.batch)
                }
                SchedulerPhase::Idle => {
                    state.phase = SchedulerPhase::Flushing;
                    Vec::new()
                }
                SchedulerPhase::Flushing => Vec::new(),
            };
            state.in_flight += 1;
            absorbed
        };

        let result = self.inner.write_snapshot().await;
        Inner::finish_flush(&self.inner, absorbed, result.is_ok());
        result.map(|_| ())
    }

    /// Resolves once nothing is pending or writing.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.phase() == SchedulerPhase::Idle {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm_timer(inner: &Arc<Inner>, state: &mut SchedulerState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        let task_inner = Arc::clone(inner);
        let debounce = inner.debounce;

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            Inner::fire(&task_inner, generation).await;
        }));
    }

    async fn fire(inner: &Arc<Inner>, generation: u64) {
        let callbacks = {
            let mut state = inner.lock_state();
            if state.generation != generation || state.phase != SchedulerPhase::Pending {
                return;
            }
            state.timer = None;
            state.phase = SchedulerPhase::Flushing;
            state.in_flight += 1;
            std::mem::take(&mut state.batch)
        };

        let ok = inner.write_snapshot().await.is_ok();
        Inner::finish_flush(inner, callbacks, ok);
    }

    fn finish_flush(inner: &Arc<Inner>, callbacks: Vec<StatusCallback>, ok: bool) {
        let status = if ok {
            PersistStatus::Saved
        } else {
            PersistStatus::Error
        };

        let became_idle = {
            let mut state = inner.lock_state();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.last_status = Some(status);

            if state.in_flight > 0 {
                false
            } else if state.phase == SchedulerPhase::FlushingDirty {
                state.phase = SchedulerPhase::Pending;
                Inner::arm_timer(inner, &mut state);
                false
            } else {
                state.phase = SchedulerPhase::Idle;
                true
            }
        };

        for callback in callbacks {
            callback(status);
        }
        if became_idle {
            inner.idle.notify_waiters();
        }
    }

    /// Export and put under the write lock. Returns the snapshot size.
    async fn write_snapshot(&self) -> Result<usize> {
        let FlushTarget::Store(store) = &self.target else {
            return Err(DbError::StoreUnavailable("persistence disabled".into()));
        };

        let _guard = self.write_lock.lock().await;
        let bytes = match self.engine.export_bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                event!(Level::ERROR, error = %err, "snapshot export failed");
                return Err(err);
            }
        };

        event!(Level::DEBUG, key = %self.key, bytes = bytes.len(), "snapshot flush started");
        match store.put(&self.key, &bytes).await {
            Ok(()) => {
                event!(Level::INFO, key = %self.key, bytes = bytes.len(), "snapshot flushed");
                Ok(bytes.len())
            }
            Err(err) => {
                event!(Level::ERROR, key = %self.key, error = %err, "snapshot flush failed");
                Err(err)
            }
        }
    }
}
