//! Microtask and macrotask queues
//!
//! The microtask queue is strict FIFO. Macrotasks are ordered by effective
//! fire time (`now + delay` at scheduling) and then by insertion sequence, so
//! two timers with the same deadline fire in the order they were scheduled.

use super::external::HostEvent;
use crate::runtime::async_runtime::FrameId;
use crate::runtime::promise::{PromiseReaction, PromiseRef, Settlement};
use crate::runtime::timers::TimerId;
use crate::runtime::Value;
use rustc_hash::FxHashMap as HashMap;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;

/// Deferred unit of work carried by a job
pub enum Task {
    /// Run one promise reaction with the settled value
    Reaction {
        reaction: PromiseReaction,
        settlement: Settlement,
        argument: Value,
    },
    /// Adopt the state of `thenable` into `promise`
    ResolveThenable {
        promise: PromiseRef,
        thenable: PromiseRef,
    },
    /// Call a script function (`queueMicrotask`)
    Callback { callback: Value, args: Vec<Value> },
    /// Fire a registered timer
    Timer(TimerId),
    /// Event posted by a host thread
    External(HostEvent),
}

impl Task {
    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Task::Reaction { .. } => "reaction",
            Task::ResolveThenable { .. } => "resolve-thenable",
            Task::Callback { .. } => "callback",
            Task::Timer(_) => "timer",
            Task::External(_) => "external",
        }
    }

    /// Frame this task resumes, if it is an await continuation
    pub fn resumes_frame(&self) -> Option<FrameId> {
        match self {
            Task::Reaction { reaction, .. } => reaction.resumed_frame(),
            _ => None,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Timer(id) => write!(f, "Task::Timer({})", id),
            other => write!(f, "Task::{}", other.label()),
        }
    }
}

/// A microtask (promise reactions, await continuations, queueMicrotask)
#[derive(Debug)]
pub struct Microtask {
    pub task: Task,
}

/// A macrotask (timers, host events)
#[derive(Debug)]
pub struct Macrotask {
    pub task: Task,
    /// Requested delay in milliseconds
    pub delay: u64,
    /// Clock time at which the task becomes due
    pub fire_at: u64,
    /// Insertion sequence, used as the FIFO tie-break
    pub seq: u64,
}

/// The microtask/macrotask queue pair
#[derive(Default)]
pub struct JobQueues {
    microtasks: VecDeque<Microtask>,
    /// Min-heap of `(fire_at, seq)` keys
    schedule: BinaryHeap<Reverse<(u64, u64)>>,
    /// Live macrotasks by sequence; cancelled ones are absent
    macrotasks: HashMap<u64, Macrotask>,
    next_seq: u64,
}

impl JobQueues {
    /// Create an empty queue pair
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a microtask
    pub fn enqueue_microtask(&mut self, task: Task) {
        tracing::trace!(task = task.label(), "enqueue microtask");
        self.microtasks.push_back(Microtask { task });
    }

    /// Schedule a macrotask `delay` ms after `now`, returning its sequence number
    pub fn enqueue_macrotask(&mut self, task: Task, delay: u64, now: u64) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let fire_at = now.saturating_add(delay);
        tracing::trace!(task = task.label(), delay, fire_at, seq, "enqueue macrotask");
        self.schedule.push(Reverse((fire_at, seq)));
        self.macrotasks.insert(
            seq,
            Macrotask {
                task,
                delay,
                fire_at,
                seq,
            },
        );
        seq
    }

    /// Check if there are pending microtasks
    pub fn has_microtasks(&self) -> bool {
        !self.microtasks.is_empty()
    }

    /// Check if there are pending (non-cancelled) macrotasks
    pub fn has_macrotasks(&self) -> bool {
        !self.macrotasks.is_empty()
    }

    /// Dequeue the oldest microtask
    pub fn pop_next_microtask(&mut self) -> Option<Microtask> {
        self.microtasks.pop_front()
    }

    /// Dequeue the macrotask with the smallest `(fire_at, seq)`
    pub fn pop_next_macrotask(&mut self) -> Option<Macrotask> {
        while let Some(Reverse((_, seq))) = self.schedule.pop() {
            if let Some(task) = self.macrotasks.remove(&seq) {
                return Some(task);
            }
        }
        None
    }

    /// Fire time of the next live macrotask
    pub fn peek_next_fire_time(&mut self) -> Option<u64> {
        while let Some(Reverse((fire_at, seq))) = self.schedule.peek().copied() {
            if self.macrotasks.contains_key(&seq) {
                return Some(fire_at);
            }
            self.schedule.pop();
        }
        None
    }

    /// Cancel a scheduled macrotask; returns false if it already ran or was cancelled
    pub fn cancel_macrotask(&mut self, seq: u64) -> bool {
        self.macrotasks.remove(&seq).is_some()
    }

    /// Number of queued microtasks
    pub fn microtask_len(&self) -> usize {
        self.microtasks.len()
    }

    /// Number of live macrotasks
    pub fn macrotask_len(&self) -> usize {
        self.macrotasks.len()
    }

    /// Drop all pending work, returning how many jobs were discarded
    pub fn clear(&mut self) -> usize {
        let dropped = self.microtasks.len() + self.macrotasks.len();
        self.microtasks.clear();
        self.macrotasks.clear();
        self.schedule.clear();
        dropped
    }
}

impl fmt::Debug for JobQueues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueues")
            .field("microtasks", &self.microtasks.len())
            .field("macrotasks", &self.macrotasks.len())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}
