//! Events posted from other threads
//!
//! Host threads hold an [`EventSender`] and post closures that run on the
//! loop thread. Received events become zero-delay macrotasks. The loop keeps
//! waiting for events for as long as at least one sender is alive.

use super::queue::Task;
use crate::runtime::Runtime;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Work posted to the loop by a host thread
pub type HostEvent = Box<dyn FnOnce(&mut Runtime) + Send>;

/// Cloneable, `Send` handle for posting events to one event loop
pub struct EventSender {
    tx: Sender<HostEvent>,
    live: Arc<AtomicUsize>,
}

impl EventSender {
    /// Post an event; returns false once the loop has been dropped
    pub fn send<F>(&self, event: F) -> bool
    where
        F: FnOnce(&mut Runtime) + Send + 'static,
    {
        self.tx.send(Box::new(event)).is_ok()
    }
}

impl Clone for EventSender {
    fn clone(&self) -> Self {
        self.live.fetch_add(1, Ordering::SeqCst);
        Self {
            tx: self.tx.clone(),
            live: self.live.clone(),
        }
    }
}

impl Drop for EventSender {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("live", &self.live.load(Ordering::SeqCst))
            .finish()
    }
}

/// Receiving side, owned by the event loop
pub struct ExternalEvents {
    tx: Sender<HostEvent>,
    rx: Receiver<HostEvent>,
    live: Arc<AtomicUsize>,
    received: u64,
}

impl ExternalEvents {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            live: Arc::new(AtomicUsize::new(0)),
            received: 0,
        }
    }

    /// Hand out a new sender
    pub fn sender(&self) -> EventSender {
        self.live.fetch_add(1, Ordering::SeqCst);
        EventSender {
            tx: self.tx.clone(),
            live: self.live.clone(),
        }
    }

    /// Whether any sender is still alive. Check this *before* the final
    /// [`pump`](Self::pump): once it reads false, every event ever sent is
    /// already in the channel.
    pub fn has_live_senders(&self) -> bool {
        self.live.load(Ordering::SeqCst) > 0
    }

    /// Move every received event into the macrotask queue
    pub fn pump(&mut self, rt: &mut Runtime) -> usize {
        let mut count = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.enqueue(rt, event);
            count += 1;
        }
        count
    }

    /// Block up to `timeout` for one event; returns true if one arrived
    pub fn wait(&mut self, rt: &mut Runtime, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.enqueue(rt, event);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Total events received
    pub fn received(&self) -> u64 {
        self.received
    }

    fn enqueue(&mut self, rt: &mut Runtime, event: HostEvent) {
        self.received += 1;
        let now = rt.now();
        rt.queues.enqueue_macrotask(Task::External(event), 0, now);
    }
}

impl Default for ExternalEvents {
    fn default() -> Self {
        Self::new()
    }
}
