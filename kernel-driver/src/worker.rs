//! Named background threads with cooperative, interruptible stop
//! (`kthread_run` / `kthread_stop`).

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::Level;

/// Held by the thread body. Stop is requested by dropping the sender side.
pub struct StopToken {
    rx: Receiver<()>,
}

impl StopToken {
    /// `kthread_should_stop`.
    pub fn should_stop(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `period` unless stopped first. Returns `true` when the
    /// thread should exit.
    pub fn sleep(&self, period: Duration) -> bool {
        !matches!(self.rx.recv_timeout(period), Err(RecvTimeoutError::Timeout))
    }
}

/// A running thread. Stops and joins on drop.
pub struct KThread {
    name: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl KThread {
    pub fn run<F>(name: &str, body: F) -> io::Result<Self>
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        let (tx, rx) = channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || body(StopToken { rx }))?;

        crate::pr!(Level::Info, name, "thread started");
        Ok(Self {
            name: name.to_owned(),
            stop: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Request stop and wait for the body to return.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => crate::pr!(Level::Info, self.name, "thread stopped"),
                Err(_) => crate::pr!(Level::Error, self.name, "thread panicked"),
            }
        }
    }
}

impl Drop for KThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    #[test]
    fn stop_interrupts_long_sleep() {
        let t = KThread::run("sleeper", |stop| {
            while !stop.sleep(Duration::from_secs(60)) {}
        })
        .unwrap();

        let started = Instant::now();
        t.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn body_runs_until_stopped() {
        let ticks = Arc::new(AtomicU32::new(0));
        let t = {
            let ticks = Arc::clone(&ticks);
            KThread::run("ticker", move |stop| {
                while !stop.should_stop() {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    if stop.sleep(Duration::from_millis(5)) {
                        break;
                    }
                }
            })
            .unwrap()
        };
        assert_eq!(t.name(), "ticker");

        thread::sleep(Duration::from_millis(50));
        drop(t);
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 1);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
