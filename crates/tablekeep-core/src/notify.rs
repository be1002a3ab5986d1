// ABOUTME: In-memory progress/notification channel for long-running operations.
// ABOUTME: Holds transient records in creation order, auto-dismisses them on timers, and broadcasts changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use ulid::{Generator, Ulid};

/// Default auto-dismiss delay for records that close on their own.
pub const DEFAULT_DURATION_MS: u64 = 5_000;

/// Lifecycle state of an operation as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    Queued,
    InProgress,
    Success,
    Error,
    Info,
}

impl NotificationKind {
    /// Success and info records close on their own; the rest wait for the user.
    pub fn auto_closes(&self) -> bool {
        matches!(self, NotificationKind::Success | NotificationKind::Info)
    }
}

/// A transient notification owned by the channel. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: Ulid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: Option<String>,
    pub error_detail: Option<String>,
    pub auto_close: bool,
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new record. `auto_close` defaults from the kind.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: Option<String>,
    pub error_detail: Option<String>,
    pub auto_close: Option<bool>,
    pub duration_ms: Option<u64>,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: None,
            error_detail: None,
            auto_close: None,
            duration_ms: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    pub fn auto_close(mut self, auto_close: bool) -> Self {
        self.auto_close = Some(auto_close);
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// A partial change to an existing record. `None` leaves a field alone.
/// When `kind` changes and `auto_close` is not given, auto_close follows the new kind.
#[derive(Debug, Clone, Default)]
pub struct NotificationUpdate {
    pub kind: Option<NotificationKind>,
    pub title: Option<String>,
    pub message: Option<Option<String>>,
    pub error_detail: Option<Option<String>>,
    pub auto_close: Option<bool>,
    pub duration_ms: Option<Option<u64>>,
}

impl NotificationUpdate {
    pub fn kind(kind: NotificationKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(Some(message.into()));
        self
    }

    pub fn with_error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(Some(detail.into()));
        self
    }
}

/// Change events broadcast to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Added(NotificationRecord),
    Updated(NotificationRecord),
    Removed(Ulid),
}

struct Inner {
    records: Vec<NotificationRecord>,
    timers: HashMap<Ulid, Timer>,
    next_generation: u64,
    ids: Generator,
}

/// A pending auto-dismiss. Only the timer whose generation is still current
/// may remove its record.
struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// The progress channel. Cheap to clone; clones share the same records.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<NotificationEvent>,
    default_duration_ms: u64,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::with_default_duration(DEFAULT_DURATION_MS)
    }

    /// Create a channel whose auto-closing records default to `duration_ms`.
    pub fn with_default_duration(duration_ms: u64) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: Vec::new(),
                timers: HashMap::new(),
                next_generation: 0,
                ids: Generator::new(),
            })),
            events,
            default_duration_ms: duration_ms,
        }
    }

    /// Subscribe to record changes.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events.subscribe()
    }

    /// Start a record with the kind's default auto-close policy.
    pub fn start(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: Option<String>,
    ) -> Ulid {
        let mut new = NewNotification::new(kind, title);
        new.message = message;
        self.push(new)
    }

    /// Start a fully specified record and return its id.
    pub fn push(&self, new: NewNotification) -> Ulid {
        let auto_close = new.auto_close.unwrap_or_else(|| new.kind.auto_closes());
        let duration_ms = match (auto_close, new.duration_ms) {
            (_, Some(ms)) => Some(ms),
            (true, None) => Some(self.default_duration_ms),
            (false, None) => None,
        };

        let record = {
            let mut inner = self.lock();
            // Monotonic within a millisecond, so ids never collide on a fast path.
            let id = inner.ids.generate().unwrap_or_else(|_| Ulid::new());
            let record = NotificationRecord {
                id,
                kind: new.kind,
                title: new.title,
                message: new.message,
                error_detail: new.error_detail,
                auto_close,
                duration_ms,
                created_at: Utc::now(),
            };
            inner.records.push(record.clone());
            if auto_close {
                self.schedule(&mut inner, id, duration_ms.unwrap_or(self.default_duration_ms));
            }
            record
        };

        let id = record.id;
        let _ = self.events.send(NotificationEvent::Added(record));
        id
    }

    /// Apply a partial update. Returns false if the record is gone.
    /// Any pending auto-dismiss restarts from now.
    pub fn update(&self, id: Ulid, update: NotificationUpdate) -> bool {
        let record = {
            let mut inner = self.lock();
            let Some(record) = inner.records.iter_mut().find(|r| r.id == id) else {
                return false;
            };

            if let Some(kind) = update.kind {
                record.kind = kind;
                if update.auto_close.is_none() {
                    record.auto_close = kind.auto_closes();
                }
            }
            if let Some(title) = update.title {
                record.title = title;
            }
            if let Some(message) = update.message {
                record.message = message;
            }
            if let Some(detail) = update.error_detail {
                record.error_detail = detail;
            }
            if let Some(auto_close) = update.auto_close {
                record.auto_close = auto_close;
            }
            if let Some(duration) = update.duration_ms {
                record.duration_ms = duration;
            }
            if record.auto_close && record.duration_ms.is_none() {
                record.duration_ms = Some(self.default_duration_ms);
            }
            let record = record.clone();

            if let Some(timer) = inner.timers.remove(&id) {
                timer.handle.abort();
            }
            if record.auto_close {
                self.schedule(
                    &mut inner,
                    id,
                    record.duration_ms.unwrap_or(self.default_duration_ms),
                );
            }
            record
        };

        let _ = self.events.send(NotificationEvent::Updated(record));
        true
    }

    /// Remove a record and cancel its timer. Returns false if it was already gone.
    pub fn remove(&self, id: Ulid) -> bool {
        let removed = {
            let mut inner = self.lock();
            if let Some(timer) = inner.timers.remove(&id) {
                timer.handle.abort();
            }
            remove_record(&mut inner, id)
        };
        if removed {
            let _ = self.events.send(NotificationEvent::Removed(id));
        }
        removed
    }

    /// All live records, oldest first.
    pub fn list(&self) -> Vec<NotificationRecord> {
        self.lock().records.clone()
    }

    pub fn get(&self, id: Ulid) -> Option<NotificationRecord> {
        self.lock().records.iter().find(|r| r.id == id).cloned()
    }

    /// Remove every record.
    pub fn clear(&self) {
        let ids: Vec<Ulid> = self.lock().records.iter().map(|r| r.id).collect();
        for id in ids {
            self.remove(id);
        }
    }

    /// Shorthand for a dismissable error record with an expandable detail.
    pub fn error(&self, title: impl Into<String>, detail: impl Into<String>) -> Ulid {
        self.push(NewNotification::new(NotificationKind::Error, title).error_detail(detail))
    }

    /// Shorthand for an auto-closing success record.
    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) -> Ulid {
        self.push(NewNotification::new(NotificationKind::Success, title).message(message))
    }

    /// Shorthand for an auto-closing info record.
    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) -> Ulid {
        self.push(NewNotification::new(NotificationKind::Info, title).message(message))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the auto-dismiss timer. Without a tokio runtime the record simply stays.
    fn schedule(&self, inner: &mut Inner, id: Ulid, duration_ms: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime for auto-dismiss of notification {}", id);
            return;
        };

        inner.next_generation += 1;
        let generation = inner.next_generation;
        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        let events = self.events.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if expire(&shared, id, generation) {
                let _ = events.send(NotificationEvent::Removed(id));
            }
        });
        inner.timers.insert(id, Timer { generation, handle });
    }
}

/// Remove `id` if the timer of `generation` is still the one scheduled for it.
/// A timer that woke just as its record was rescheduled finds a newer
/// generation and leaves the record alone.
fn expire(shared: &Mutex<Inner>, id: Ulid, generation: u64) -> bool {
    let mut inner = shared.lock().unwrap_or_else(|e| e.into_inner());
    match inner.timers.get(&id) {
        Some(timer) if timer.generation == generation => {
            inner.timers.remove(&id);
            remove_record(&mut inner, id)
        }
        _ => false,
    }
}

fn remove_record(inner: &mut Inner, id: Ulid) -> bool {
    let before = inner.records.len();
    inner.records.retain(|r| r.id != id);
    inner.records.len() != before
}
