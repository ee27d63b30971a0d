//! Cancellable countdown timers, one task per (key, kind).
//!
//! The engine drives the three server-authoritative clocks a room can
//! have: the matchmaking ready-timeout, the pre-game countdown, and the
//! game clock. Timers of the same kind for the same key are mutually
//! exclusive — starting a new one replaces (aborts) any existing one —
//! and every timer is cancellable, so no orphaned tick keeps firing
//! against a deleted room.
//!
//! Timers live only in this process as owned task handles; nothing is
//! serialized through an external store. A restart therefore drops
//! in-flight countdowns — a documented limitation, not silent
//! corruption.
//!
//! # Integration
//!
//! The engine pushes [`TimerEvent`]s into an mpsc channel handed out at
//! construction; a single driver task consumes them:
//!
//! ```ignore
//! let (timers, mut ticks) = TimerEngine::new();
//! timers.start(room_id, TimerKind::Countdown, 5).await;
//! while let Some(event) = ticks.recv().await {
//!     // broadcast Tick { remaining }, act on Elapsed
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Which per-room clock a timer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Matchmaking ready-confirmation deadline.
    ReadyTimeout,
    /// Pre-game countdown after a room becomes eligible to start.
    Countdown,
    /// The game clock itself.
    Game,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReadyTimeout => "ready-timeout",
            Self::Countdown => "countdown",
            Self::Game => "game",
        };
        write!(f, "{s}")
    }
}

/// What a timer task is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    /// One second boundary; `remaining` seconds are left (counts down
    /// from the configured total to 1).
    Tick { remaining: u32 },
    /// The countdown reached zero.
    Elapsed,
}

/// An event emitted by a running timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEvent<K> {
    pub key: K,
    pub kind: TimerKind,
    pub signal: TimerSignal,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

type TaskMap<K> = Arc<Mutex<HashMap<(K, TimerKind), JoinHandle<()>>>>;

/// Owns all running countdown tasks, keyed by `(key, kind)`.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct TimerEngine<K> {
    events: mpsc::UnboundedSender<TimerEvent<K>>,
    tasks: TaskMap<K>,
}

impl<K> TimerEngine<K>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    /// Creates an engine and the receiving end of its event stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent<K>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: tx,
                tasks: Arc::new(Mutex::new(HashMap::new())),
            },
            rx,
        )
    }

    /// Starts a countdown of `seconds` for `(key, kind)`, replacing any
    /// timer of the same kind already running for that key.
    pub async fn start(&self, key: K, kind: TimerKind, seconds: u32) {
        let mut tasks = self.tasks.lock().await;
        if let Some(old) = tasks.remove(&(key.clone(), kind)) {
            old.abort();
            debug!(key = ?key, %kind, "replaced running timer");
        }
        let handle = tokio::spawn(run_countdown(
            key.clone(),
            kind,
            seconds,
            self.events.clone(),
            Arc::clone(&self.tasks),
        ));
        tasks.insert((key, kind), handle);
        // The task's self-removal needs this same lock, so it cannot run
        // ahead of the insert above even for zero-second timers.
    }

    /// Cancels a timer. Returns `true` if one was running.
    pub async fn cancel(&self, key: &K, kind: TimerKind) -> bool {
        let mut tasks = self.tasks.lock().await;
        match tasks.remove(&(key.clone(), kind)) {
            Some(handle) => {
                handle.abort();
                debug!(key = ?key, %kind, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancels every timer for `key` (room deleted or dissolved).
    pub async fn cancel_all(&self, key: &K) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|(k, kind), handle| {
            if k == key {
                handle.abort();
                debug!(key = ?key, %kind, "timer cancelled");
                false
            } else {
                true
            }
        });
    }

    /// Returns `true` if a timer of this kind is running for `key`.
    pub async fn is_running(&self, key: &K, kind: TimerKind) -> bool {
        self.tasks
            .lock()
            .await
            .contains_key(&(key.clone(), kind))
    }

    /// Number of running timers across all keys.
    pub async fn active_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Aborts every running timer. Used on server shutdown.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

/// The countdown task body: ticks once per second from `seconds` down to
/// 1, then signals `Elapsed` after the final second.
async fn run_countdown<K>(
    key: K,
    kind: TimerKind,
    seconds: u32,
    events: mpsc::UnboundedSender<TimerEvent<K>>,
    tasks: TaskMap<K>,
) where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    for remaining in (1..=seconds).rev() {
        interval.tick().await;
        let tick = TimerEvent {
            key: key.clone(),
            kind,
            signal: TimerSignal::Tick { remaining },
        };
        if events.send(tick).is_err() {
            // Receiver gone: the driver shut down. Stop ticking.
            tasks.lock().await.remove(&(key, kind));
            return;
        }
    }
    interval.tick().await;

    // Unregister before signalling, so a handler that restarts the same
    // kind cannot have its fresh entry clobbered by this cleanup.
    tasks.lock().await.remove(&(key.clone(), kind));
    let _ = events.send(TimerEvent {
        key,
        kind,
        signal: TimerSignal::Elapsed,
    });
}
