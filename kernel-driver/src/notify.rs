//! Asynchronous notification of one registered consumer task.
//!
//! A task registers itself (via a command) and from then on receives a
//! signal whenever the driver has something to report. There is at most one
//! consumer; registering again replaces it. Delivery is attempted once and
//! failures are reported, never retried.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use log::Level;
use shared::signal::SI_QUEUE;

use crate::device::{SessionId, lock};
use crate::error::DeliveryError;

/// What the driver is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Periodic worker tick, numbered from 1.
    Tick(u64),
    DataReady,
    Custom(u32),
}

/// A queued signal as the receiving task sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub signo: i32,
    pub code: i32,
    pub kind: EventKind,
}

/// Where a task's signals end up.
pub trait SignalSink: Send + Sync {
    /// On failure, return a short reason.
    fn deliver(&self, notification: Notification) -> Result<(), &'static str>;
}

/// Handle on a user task.
#[derive(Clone)]
pub struct Task {
    pid: u32,
    sink: Option<Arc<dyn SignalSink>>,
}

impl Task {
    pub fn new(pid: u32, sink: Arc<dyn SignalSink>) -> Self {
        Self {
            pid,
            sink: Some(sink),
        }
    }

    /// A task with no signal handler installed; every delivery fails.
    pub fn detached(pid: u32) -> Self {
        Self { pid, sink: None }
    }

    /// A task whose signals are queued on the returned receiver.
    pub fn with_mailbox(pid: u32) -> (Self, SignalReceiver) {
        let (tx, rx) = channel::unbounded();
        (Self::new(pid, Arc::new(Mailbox(tx))), SignalReceiver(rx))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn send_signal(&self, notification: Notification) -> Result<(), DeliveryError> {
        let signo = notification.signo;
        let failed = |reason| DeliveryError {
            pid: self.pid,
            signo,
            reason,
        };
        match &self.sink {
            Some(sink) => sink.deliver(notification).map_err(failed),
            None => Err(failed("no handler installed")),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("pid", &self.pid)
            .field("attached", &self.sink.is_some())
            .finish()
    }
}

struct Mailbox(Sender<Notification>);

impl SignalSink for Mailbox {
    fn deliver(&self, notification: Notification) -> Result<(), &'static str> {
        self.0.send(notification).map_err(|_| "task has exited")
    }
}

/// Receiving end of [`Task::with_mailbox`].
pub struct SignalReceiver(Receiver<Notification>);

impl SignalReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification> {
        self.0.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<Notification> {
        self.0.try_recv().ok()
    }
}

/*──────────────────────────────── channel ───────────────────────────────*/

struct Consumer {
    session: SessionId,
    task: Task,
}

/// Single-consumer notification slot. Last registration wins.
pub struct NotificationChannel {
    name: String,
    signo: i32,
    consumer: Mutex<Option<Consumer>>,
}

impl NotificationChannel {
    pub fn new(name: &str, signo: i32) -> Self {
        Self {
            name: name.to_owned(),
            signo,
            consumer: Mutex::new(None),
        }
    }

    pub fn signo(&self) -> i32 {
        self.signo
    }

    pub fn register_consumer(&self, session: SessionId, task: Task) {
        let pid = task.pid();
        let previous = lock(&self.consumer).replace(Consumer { session, task });
        match previous {
            Some(old) if old.task.pid() != pid => crate::pr!(
                Level::Info,
                self.name,
                "consumer {} replaced by {}",
                old.task.pid(),
                pid
            ),
            _ => crate::pr!(Level::Info, self.name, "consumer {} registered", pid),
        }
    }

    pub fn clear_consumer(&self) {
        lock(&self.consumer).take();
    }

    /// Drop the consumer if `session` registered it. Returns whether it did.
    pub fn release_session(&self, session: SessionId) -> bool {
        let mut consumer = lock(&self.consumer);
        if consumer.as_ref().is_some_and(|c| c.session == session) {
            *consumer = None;
            true
        } else {
            false
        }
    }

    pub fn consumer_pid(&self) -> Option<u32> {
        lock(&self.consumer).as_ref().map(|c| c.task.pid())
    }

    /// Signal the consumer, if any. No consumer is not an error.
    pub fn notify(&self, kind: EventKind) -> Result<(), DeliveryError> {
        let Some(task) = lock(&self.consumer).as_ref().map(|c| c.task.clone()) else {
            crate::pr!(Level::Debug, self.name, "no consumer for {:?}", kind);
            return Ok(());
        };

        task.send_signal(Notification {
            signo: self.signo,
            code: SI_QUEUE,
            kind,
        })
        .inspect(|_| crate::pr!(Level::Debug, self.name, "sent {:?} to {}", kind, task.pid()))
        .inspect_err(|e| crate::pr!(Level::Warn, self.name, "{}", e))
    }
}

impl fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("name", &self.name)
            .field("signo", &self.signo)
            .field("consumer", &self.consumer_pid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::signal::SIGUSR1;

    const NOW: Duration = Duration::from_millis(0);

    #[test]
    fn notify_without_consumer_is_ok() {
        let ch = NotificationChannel::new("t", SIGUSR1);
        assert_eq!(ch.notify(EventKind::DataReady), Ok(()));
    }

    #[test]
    fn last_registration_wins() {
        let ch = NotificationChannel::new("t", SIGUSR1);
        let (first, first_rx) = Task::with_mailbox(100);
        let (second, second_rx) = Task::with_mailbox(200);

        ch.register_consumer(SessionId::next(), first);
        ch.register_consumer(SessionId::next(), second);
        ch.notify(EventKind::Tick(1)).unwrap();

        assert!(first_rx.try_recv().is_none());
        let got = second_rx.recv_timeout(NOW).unwrap();
        assert_eq!(
            got,
            Notification {
                signo: SIGUSR1,
                code: SI_QUEUE,
                kind: EventKind::Tick(1)
            }
        );
    }

    #[test]
    fn release_only_clears_own_registration() {
        let ch = NotificationChannel::new("t", SIGUSR1);
        let (owner, other) = (SessionId::next(), SessionId::next());
        ch.register_consumer(owner, Task::detached(1));

        assert!(!ch.release_session(other));
        assert_eq!(ch.consumer_pid(), Some(1));
        assert!(ch.release_session(owner));
        assert_eq!(ch.consumer_pid(), None);
    }

    #[test]
    fn failed_delivery_is_reported_once() {
        let ch = NotificationChannel::new("t", SIGUSR1);
        ch.register_consumer(SessionId::next(), Task::detached(42));

        let err = ch.notify(EventKind::DataReady).unwrap_err();
        assert_eq!(err.pid, 42);
        assert_eq!(err.signo, SIGUSR1);

        // the consumer stays registered
        assert_eq!(ch.consumer_pid(), Some(42));
    }

    #[test]
    fn exited_task_fails_delivery() {
        let ch = NotificationChannel::new("t", SIGUSR1);
        let (task, rx) = Task::with_mailbox(9);
        ch.register_consumer(SessionId::next(), task);
        drop(rx);
        assert_eq!(ch.notify(EventKind::Custom(3)).unwrap_err().reason, "task has exited");
    }
}
