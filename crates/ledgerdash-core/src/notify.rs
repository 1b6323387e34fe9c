use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::datetime::Clock;
use crate::item::ReminderItem;
use crate::store::Reminders;

/// Default period between due checks.
pub const CHECK_PERIOD: Duration = Duration::from_secs(60);

/// A reminder fires when its due-time is at most this many seconds ahead.
pub const DUE_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Default,
    Granted,
    Denied,
    Unsupported,
}

/// Host notification surface.
pub trait Notifier: Send + Sync {
    fn request_permission(&self);
    fn permission(&self) -> NotificationPermission;
    fn notify(&self, title: &str, body: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueNotification {
    pub reminder_id: String,
    pub title: String,
    pub body: String,
}

/// Open reminders due within the next [`DUE_WINDOW_SECS`]. Nothing records
/// that a reminder already fired, so consecutive checks can repeat one.
pub fn collect_due_notifications(
    items: &[ReminderItem],
    now: NaiveDateTime,
) -> Vec<DueNotification> {
    items
        .iter()
        .filter(|item| !item.completed)
        .filter(|item| {
            let until_due = item.due_at() - now;
            until_due > TimeDelta::zero() && until_due <= TimeDelta::seconds(DUE_WINDOW_SECS)
        })
        .map(|item| DueNotification {
            reminder_id: item.id.clone(),
            title: format!("Financial Reminder: {}", item.title),
            body: format!("Your {} reminder is due now.", item.category),
        })
        .collect()
}

/// Sends every due notification; returns how many went out. Without a
/// permission grant this emits nothing.
#[instrument(skip_all, fields(now = %now))]
pub fn emit_due_notifications(
    notifier: &dyn Notifier,
    items: &[ReminderItem],
    now: NaiveDateTime,
) -> usize {
    let permission = notifier.permission();
    if permission != NotificationPermission::Granted {
        debug!(?permission, "skipping due check because permission is not granted");
        return 0;
    }

    let due = collect_due_notifications(items, now);
    for event in &due {
        info!(reminder = %event.reminder_id, "emitting due notification");
        notifier.notify(&event.title, &event.body);
    }
    due.len()
}

/// Writes notifications to stdout. Permission is decided up front by
/// configuration and takes effect once requested.
#[derive(Debug)]
pub struct TerminalNotifier {
    allowed: bool,
    permission: Mutex<NotificationPermission>,
}

impl TerminalNotifier {
    pub fn new(allowed: bool) -> Self {
        Self {
            allowed,
            permission: Mutex::new(NotificationPermission::Default),
        }
    }
}

impl Notifier for TerminalNotifier {
    fn request_permission(&self) {
        let granted = if self.allowed {
            NotificationPermission::Granted
        } else {
            NotificationPermission::Denied
        };
        *self.permission.lock() = granted;
        info!(permission = ?granted, "notification permission request completed");
    }

    fn permission(&self) -> NotificationPermission {
        *self.permission.lock()
    }

    fn notify(&self, title: &str, body: &str) {
        let mut out = io::stdout().lock();
        if let Err(err) = writeln!(out, "{title}\n  {body}") {
            warn!(error = %err, title, "failed to write notification");
        }
    }
}

/// Background due check over a shared reminder collection. Stops on
/// [`ReminderWatcher::stop`] or when dropped.
#[derive(Debug)]
pub struct ReminderWatcher {
    cancel: CancellationToken,
    ticks: watch::Receiver<u64>,
    handle: Option<JoinHandle<()>>,
}

impl ReminderWatcher {
    /// Requests notification permission, then checks every `period`,
    /// starting one period from now. Must be called inside a tokio runtime.
    #[instrument(skip(reminders, notifier, clock))]
    pub fn start(
        reminders: Arc<Mutex<Reminders>>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> Self {
        notifier.request_permission();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let (tick_tx, ticks) = watch::channel(0_u64);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("reminder watcher cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let snapshot = reminders.lock().items().to_vec();
                        let now = clock.now();
                        let fired = emit_due_notifications(notifier.as_ref(), &snapshot, now);
                        debug!(fired, reminders = snapshot.len(), "reminder check finished");
                        tick_tx.send_modify(|count| *count += 1);
                    }
                }
            }
        });

        info!(period_secs = period.as_secs(), "started reminder watcher");
        Self {
            cancel,
            ticks,
            handle: Some(handle),
        }
    }

    /// Number of completed checks, observable as it changes.
    pub fn ticks(&self) -> watch::Receiver<u64> {
        self.ticks.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancels the timer and waits for the task to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.await
        {
            warn!(error = %err, "reminder watcher ended abnormally");
        }
        info!("stopped reminder watcher");
    }
}

impl Drop for ReminderWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::datastore::MemoryStorage;
    use crate::datetime::ManualClock;
    use crate::item::ReminderCategory;
    use crate::store::ReminderDraft;

    #[derive(Debug)]
    struct RecordingNotifier {
        permission: NotificationPermission,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        fn new(permission: NotificationPermission) -> Self {
            Self {
                permission,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn request_permission(&self) {}

        fn permission(&self) -> NotificationPermission {
            self.permission
        }

        fn notify(&self, title: &str, body: &str) {
            self.sent.lock().push((title.to_string(), body.to_string()));
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .expect("valid datetime")
    }

    fn reminder(id: &str, due: NaiveDateTime, completed: bool) -> ReminderItem {
        ReminderItem {
            id: id.to_string(),
            title: format!("Pay {id}"),
            date: due.date(),
            time: due.time(),
            category: ReminderCategory::Bill,
            completed,
        }
    }

    #[test]
    fn due_window_is_open_at_now_and_closed_at_sixty_seconds() {
        let now = at(9, 0, 0);
        let items = vec![
            reminder("now", now, false),
            reminder("edge", at(9, 1, 0), false),
            reminder("beyond", at(9, 1, 1), false),
            reminder("past", at(8, 59, 59), false),
            reminder("done", at(9, 0, 30), true),
            reminder("soon", at(9, 0, 30), false),
        ];

        let ids: Vec<_> = collect_due_notifications(&items, now)
            .into_iter()
            .map(|n| n.reminder_id)
            .collect();
        assert_eq!(ids, vec!["edge", "soon"]);
    }

    #[test]
    fn notification_text_names_title_and_category() {
        let due = collect_due_notifications(&[reminder("card", at(9, 0, 0), false)], at(8, 59, 30));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].title, "Financial Reminder: Pay card");
        assert_eq!(due[0].body, "Your bill reminder is due now.");
    }

    #[test]
    fn nothing_is_emitted_without_permission() {
        let items = vec![reminder("card", at(9, 0, 0), false)];
        for permission in [
            NotificationPermission::Default,
            NotificationPermission::Denied,
            NotificationPermission::Unsupported,
        ] {
            let notifier = RecordingNotifier::new(permission);
            assert_eq!(emit_due_notifications(&notifier, &items, at(8, 59, 30)), 0);
            assert!(notifier.sent().is_empty());
        }

        let notifier = RecordingNotifier::new(NotificationPermission::Granted);
        assert_eq!(emit_due_notifications(&notifier, &items, at(8, 59, 30)), 1);
    }

    #[test]
    fn terminal_notifier_grants_only_when_allowed() {
        let allowed = TerminalNotifier::new(true);
        assert_eq!(allowed.permission(), NotificationPermission::Default);
        allowed.request_permission();
        assert_eq!(allowed.permission(), NotificationPermission::Granted);

        let blocked = TerminalNotifier::new(false);
        blocked.request_permission();
        assert_eq!(blocked.permission(), NotificationPermission::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_checks_each_period_until_stopped() {
        let mut reminders = Reminders::load(Arc::new(MemoryStorage::new()));
        let mut draft = ReminderDraft {
            title: "card".to_string(),
            date: "2025-01-01".to_string(),
            time: "09:00".to_string(),
            category: ReminderCategory::Bill,
        };
        assert!(reminders.add(&mut draft).is_applied());

        let reminders = Arc::new(Mutex::new(reminders));
        let clock = Arc::new(ManualClock::new(at(8, 59, 30)));
        let notifier = Arc::new(RecordingNotifier::new(NotificationPermission::Granted));

        let watcher = ReminderWatcher::start(
            reminders.clone(),
            notifier.clone(),
            clock.clone(),
            CHECK_PERIOD,
        );
        assert!(watcher.is_running());
        let mut ticks = watcher.ticks();

        ticks.wait_for(|count| *count >= 1).await.expect("first tick");
        assert_eq!(notifier.sent().len(), 1);

        clock.set(at(9, 0, 1));
        ticks.wait_for(|count| *count >= 2).await.expect("second tick");
        assert_eq!(notifier.sent().len(), 1);

        watcher.stop().await;
        clock.set(at(8, 59, 30));
        tokio::time::sleep(CHECK_PERIOD * 3).await;
        assert_eq!(notifier.sent().len(), 1);
    }
}
