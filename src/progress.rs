// ABOUTME: Background task mirroring notification channel events into the tracing log.
// ABOUTME: Stops on a shutdown signal after draining any events already queued.

use tablekeep_core::{NotificationEvent, NotificationKind, NotificationRecord};
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub fn spawn_notification_log(
    mut events: Receiver<NotificationEvent>,
    mut shutdown: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("notification log fell behind, {} events dropped", missed);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = &mut shutdown => {
                    while let Ok(event) = events.try_recv() {
                        log_event(&event);
                    }
                    break;
                }
            }
        }
    })
}

fn log_event(event: &NotificationEvent) {
    match event {
        NotificationEvent::Added(record) | NotificationEvent::Updated(record) => log_record(record),
        NotificationEvent::Removed(id) => tracing::debug!("notification {} dismissed", id),
    }
}

fn log_record(record: &NotificationRecord) {
    let message = record.message.as_deref().unwrap_or("");
    match record.kind {
        NotificationKind::Error => tracing::error!(
            "{}: {}",
            record.title,
            record.error_detail.as_deref().unwrap_or(message)
        ),
        NotificationKind::Queued | NotificationKind::InProgress => {
            tracing::debug!("{} {}", record.title, message)
        }
        NotificationKind::Success | NotificationKind::Info => {
            tracing::info!("{} {}", record.title, message)
        }
    }
}
