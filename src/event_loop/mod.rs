//! Event Loop Implementation
//!
//! Drives a [`Runtime`] after its entry module has been evaluated:
//!
//!   1. Drain all microtasks (including ones enqueued while draining)
//!   2. Report rejections that are still unhandled
//!   3. If a macrotask exists, advance the clock to its fire time and run it
//!   4. Repeat until an exit is requested or nothing can run any more
//!
//! An exit request is honoured at the next job boundary; everything still
//! queued or suspended at that point is discarded.

pub mod external;
pub mod queue;

pub use external::{EventSender, ExternalEvents, HostEvent};
pub use queue::{JobQueues, Macrotask, Microtask, Task};

use crate::config::ClockMode;
use crate::error::{Error, Result};
use crate::runtime::{Discarded, PromiseReaction, PromiseState, Runtime, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitReason {
    /// Nothing queued, nothing suspended, no live event senders
    #[default]
    Quiescent,
    /// `exit(code)` or `kill()`
    Forced(i32),
    /// Nothing queued, but frames are suspended on promises that can never settle
    Stalled { suspended: usize },
}

impl ExitReason {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitReason::Forced(code) => *code,
            ExitReason::Quiescent | ExitReason::Stalled { .. } => 0,
        }
    }
}

/// Result of running the event loop
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub exit: ExitReason,
    /// Total number of microtasks that were dequeued and processed
    pub microtasks_processed: usize,
    /// Total number of macrotasks that were dequeued and processed
    pub macrotasks_processed: usize,
    /// Number of loop iterations (each iteration = drain microtasks + at most one macrotask)
    pub iterations: usize,
    /// Clock time when the loop finished
    pub final_time: u64,
    /// Queued jobs, timers and suspended frames dropped by a forced exit
    pub discarded: Discarded,
    pub unhandled_rejections: Vec<String>,
    pub uncaught_exceptions: Vec<String>,
    /// Set when the entry module failed after a top-level await
    pub entry_error: Option<Error>,
}

impl RunResult {
    /// Process exit status
    pub fn exit_code(&self) -> i32 {
        self.exit.exit_code()
    }
}

/// Runtime statistics for the event loop
#[derive(Clone, Debug, Default)]
pub struct EventLoopStats {
    /// Total microtasks processed across all ticks
    pub total_microtasks: u64,
    /// Total macrotasks processed across all ticks
    pub total_macrotasks: u64,
    /// Total number of event loop ticks
    pub total_ticks: u64,
    /// Maximum microtasks drained in a single tick
    pub max_microtasks_per_tick: u64,
    /// Longest tick duration in milliseconds (wall-clock)
    pub longest_tick_ms: u64,
    /// Events received from host threads
    pub external_events: u64,
}

/// The event loop: a runtime plus its external event channel
pub struct EventLoop {
    runtime: Runtime,
    events: ExternalEvents,
    stats: EventLoopStats,
}

impl EventLoop {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            events: ExternalEvents::new(),
            stats: EventLoopStats::default(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    pub fn into_runtime(self) -> Runtime {
        self.runtime
    }

    /// Handle for posting events from other threads
    pub fn event_sender(&self) -> EventSender {
        self.events.sender()
    }

    /// Get a snapshot of the current event loop statistics.
    pub fn stats(&self) -> EventLoopStats {
        self.stats.clone()
    }

    /// Reset all event loop statistics to zero.
    pub fn reset_stats(&mut self) {
        self.stats = EventLoopStats::default();
    }

    /// Load and evaluate the entry module, then run the loop.
    ///
    /// Synchronous load failures (resolution, compile, a throwing body
    /// anywhere in the import graph) are returned as `Err`. A failure after
    /// a top-level await is reported in [`RunResult::entry_error`].
    pub fn run_entry(&mut self, entry: &str) -> Result<RunResult> {
        let handle = self.runtime.load_entry(entry)?;
        tracing::debug!(entry, state = %handle.borrow().state, "entry module loaded");

        let entry_error: Rc<RefCell<Option<Error>>> = Rc::default();
        let evaluation = handle.borrow().evaluation.clone();
        if evaluation.borrow().state == PromiseState::Pending {
            let slot = entry_error.clone();
            self.runtime.perform_then(
                &evaluation,
                PromiseReaction::native(
                    |_, _| Ok(Value::Undefined),
                    move |_, reason| {
                        *slot.borrow_mut() = Some(reason.to_error());
                        Ok(Value::Undefined)
                    },
                ),
            );
        }

        let mut result = self.run();
        result.entry_error = entry_error.borrow_mut().take();
        if let Some(error) = &result.entry_error {
            tracing::error!(%error, "entry module failed");
        }
        Ok(result)
    }

    /// Run until exit, quiescence or stall
    pub fn run(&mut self) -> RunResult {
        let mut result = RunResult::default();
        let poll = Duration::from_millis(self.runtime.config.event_poll_ms.max(1));

        let exit = loop {
            if let Some(code) = self.runtime.exit_request() {
                break ExitReason::Forced(code);
            }
            let tick_start = Instant::now();
            self.stats.total_ticks += 1;

            let drained = self.runtime.run_microtasks();
            result.microtasks_processed += drained;
            self.stats.total_microtasks += drained as u64;
            self.stats.max_microtasks_per_tick =
                self.stats.max_microtasks_per_tick.max(drained as u64);
            if let Some(code) = self.runtime.exit_request() {
                self.record_tick(tick_start);
                break ExitReason::Forced(code);
            }
            self.runtime.check_unhandled_rejections();

            // Sample liveness before the final pump so no event is missed
            let live = self.events.has_live_senders();
            self.stats.external_events += self.events.pump(&mut self.runtime) as u64;

            if let Some(fire_at) = self.runtime.queues.peek_next_fire_time() {
                if live
                    && self.runtime.clock.mode() == ClockMode::Realtime
                    && fire_at > self.runtime.now()
                {
                    let wait = self.runtime.clock.until(fire_at);
                    if self.events.wait(&mut self.runtime, wait) {
                        self.stats.external_events += 1;
                        self.record_tick(tick_start);
                        continue;
                    }
                }
                if let Some(task) = self.runtime.queues.pop_next_macrotask() {
                    self.runtime.clock.advance_to(task.fire_at);
                    tracing::trace!(task = task.task.label(), at = task.fire_at, "run macrotask");
                    self.runtime.run_task(task.task);
                    self.runtime.stats.macrotasks_run += 1;
                    result.macrotasks_processed += 1;
                    self.stats.total_macrotasks += 1;
                }
                result.iterations += 1;
                self.record_tick(tick_start);
                continue;
            }

            self.record_tick(tick_start);
            if self.runtime.queues.has_microtasks() {
                continue;
            }
            if live {
                if self.events.wait(&mut self.runtime, poll) {
                    self.stats.external_events += 1;
                }
                continue;
            }

            let suspended = self.runtime.suspended_frames();
            break if suspended > 0 {
                tracing::warn!(suspended, "event loop stalled with suspended frames");
                ExitReason::Stalled { suspended }
            } else {
                ExitReason::Quiescent
            };
        };

        if let ExitReason::Forced(code) = exit {
            result.discarded = self.runtime.discard_pending();
            tracing::debug!(code, discarded = ?result.discarded, "forced exit");
        }
        result.exit = exit;
        result.final_time = self.runtime.now();
        result.unhandled_rejections = self.runtime.diagnostics.unhandled_rejections.clone();
        result.uncaught_exceptions = self.runtime.diagnostics.uncaught_exceptions.clone();
        tracing::info!(
            exit = ?result.exit,
            microtasks = result.microtasks_processed,
            macrotasks = result.macrotasks_processed,
            time = result.final_time,
            "event loop finished"
        );
        result
    }

    fn record_tick(&mut self, start: Instant) {
        let elapsed = start.elapsed().as_millis() as u64;
        self.stats.longest_tick_ms = self.stats.longest_tick_ms.max(elapsed);
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("runtime", &self.runtime)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::tests::test_runtime;

    fn reporter(label: &'static str) -> Value {
        Value::native(label, move |rt, _| {
            rt.report(label);
            Ok(Value::Undefined)
        })
    }

    #[test]
    fn test_empty_loop_is_quiescent() {
        let (rt, _) = test_runtime();
        let result = EventLoop::new(rt).run();
        assert_eq!(result.exit, ExitReason::Quiescent);
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_microtask_only_tick_is_timed() {
        let (mut rt, _) = test_runtime();
        let slow = Value::native("slow", |_, _| {
            std::thread::sleep(Duration::from_millis(6));
            Ok(Value::Undefined)
        });
        rt.queue_microtask(slow, vec![]);

        let mut event_loop = EventLoop::new(rt);
        let result = event_loop.run();
        assert_eq!(result.exit, ExitReason::Quiescent);
        assert_eq!(result.macrotasks_processed, 0);
        let stats = event_loop.stats();
        assert_eq!(stats.total_ticks, 1);
        assert!(stats.longest_tick_ms >= 5, "longest tick {}ms", stats.longest_tick_ms);
    }

    #[test]
    fn test_microtasks_run_before_macrotasks() {
        let (mut rt, log) = test_runtime();
        rt.set_timeout(reporter("timeout"), 0, vec![]);
        rt.queue_microtask(reporter("microtask"), vec![]);
        let result = EventLoop::new(rt).run();
        assert_eq!(log.entries(), vec!["microtask", "timeout"]);
        assert_eq!(result.microtasks_processed, 1);
        assert_eq!(result.macrotasks_processed, 1);
    }

    #[test]
    fn test_virtual_clock_jumps_to_timers() {
        let (mut rt, log) = test_runtime();
        rt.set_timeout(reporter("late"), 60_000, vec![]);
        let start = Instant::now();
        let result = EventLoop::new(rt).run();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(result.final_time, 60_000);
        assert_eq!(log.entries(), vec!["late"]);
    }

    #[test]
    fn test_forced_exit_discards_remaining_work() {
        let (mut rt, log) = test_runtime();
        rt.set_timeout(Value::native("exit", |rt, _| rt.call_global("exit", &[Value::Number(4.0)])), 10, vec![]);
        rt.set_timeout(reporter("never"), 20, vec![]);
        let result = EventLoop::new(rt).run();
        assert_eq!(result.exit, ExitReason::Forced(4));
        assert_eq!(result.exit_code(), 4);
        assert!(log.entries().is_empty());
        assert_eq!(result.final_time, 10);
        assert_eq!(result.discarded.timers, 1);
        assert_eq!(result.discarded.jobs, 1);
    }

    #[test]
    fn test_stall_is_detected() {
        let (mut rt, _) = test_runtime();
        let never = rt.create_promise();
        let body = Rc::new(
            move |_: &mut Runtime,
                  frame: &mut crate::runtime::FrameState,
                  _: crate::runtime::Resume|
                  -> std::result::Result<crate::runtime::Step, Value> {
                frame.suspend_at(1, Value::Promise(never.clone()))
            },
        );
        rt.call_async("waiter", body, vec![]);
        let result = EventLoop::new(rt).run();
        assert_eq!(result.exit, ExitReason::Stalled { suspended: 1 });
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn test_unhandled_rejection_does_not_stop_loop() {
        let (mut rt, log) = test_runtime();
        rt.rejected_promise(Value::from("ignored"));
        rt.set_timeout(reporter("still runs"), 5, vec![]);
        let result = EventLoop::new(rt).run();
        assert_eq!(result.exit, ExitReason::Quiescent);
        assert_eq!(result.unhandled_rejections, vec!["ignored".to_string()]);
        assert_eq!(log.entries(), vec!["still runs"]);
    }

    #[test]
    fn test_external_event_wakes_loop() {
        let (rt, log) = test_runtime();
        let mut event_loop = EventLoop::new(rt);
        let sender = event_loop.event_sender();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            sender.send(|rt| rt.report("event"));
        });
        let result = event_loop.run();
        worker.join().unwrap();
        assert_eq!(result.exit, ExitReason::Quiescent);
        assert_eq!(log.entries(), vec!["event"]);
        assert_eq!(event_loop.stats().external_events, 1);
    }
}
