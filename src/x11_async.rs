//! X11 event source for the tokio loop
//!
//! x11rb only offers blocking reads or `poll_for_event`. A blocking worker
//! watches the connection fd with mio and wakes the loop through a [`Notify`].
//! Replies read while answering requests can leave events in x11rb's buffer
//! without the fd turning readable again, so [`X11EventSource::ready`] also
//! wakes on a short fallback tick.

use anyhow::{Context, Result};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Interval, MissedTickBehavior};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

const SOCKET_TOKEN: mio::Token = mio::Token(0);

/// How long the worker blocks in `poll` before checking for shutdown
const WORKER_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Fallback wake-up for events x11rb buffered on its own
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

pub struct X11EventSource {
    conn: Arc<RustConnection>,
    readable: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    fallback: Interval,
}

impl X11EventSource {
    /// Start the fd worker. Must be called from within a tokio runtime.
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        let fd = conn.stream().as_raw_fd();
        poll.registry()
            .register(&mut mio::unix::SourceFd(&fd), SOCKET_TOKEN, mio::Interest::READABLE)
            .context("Failed to register X11 fd with mio")?;

        let readable = Arc::new(Notify::new());
        let stopped = Arc::new(AtomicBool::new(false));
        spawn_worker(poll, readable.clone(), stopped.clone());

        let mut fallback = tokio::time::interval(DRAIN_INTERVAL);
        fallback.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            conn,
            readable,
            stopped,
            fallback,
        })
    }

    /// Hand every buffered event to `handle` until it asks to stop.
    /// Returns `false` if `handle` stopped early.
    pub fn drain(&self, mut handle: impl FnMut(Event) -> bool) -> Result<bool> {
        while let Some(event) = self.conn.poll_for_event()? {
            if !handle(event) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Wait until the socket is readable or the fallback tick fires
    pub async fn ready(&mut self) {
        tokio::select! {
            _ = self.readable.notified() => {}
            _ = self.fallback.tick() => {}
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.conn.flush().context("Failed to flush X11 connection")
    }
}

impl Drop for X11EventSource {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}

fn spawn_worker(mut poll: mio::Poll, readable: Arc<Notify>, stopped: Arc<AtomicBool>) {
    tokio::task::spawn_blocking(move || {
        let mut events = mio::Events::with_capacity(1);
        while !stopped.load(Ordering::Relaxed) {
            match poll.poll(&mut events, Some(WORKER_POLL_TIMEOUT)) {
                Ok(()) if events.iter().any(|event| event.token() == SOCKET_TOKEN) => readable.notify_one(),
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => tracing::warn!("X11 socket poll failed: {}", err),
            }
        }
        tracing::debug!("X11 socket worker stopped");
    });
}
