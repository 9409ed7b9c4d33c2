//! Timers and the loop clock
//!
//! `setTimeout`, `setInterval`, `clearTimeout`, `clearInterval`, `sleep` and
//! `queueMicrotask`. Timer callbacks are macrotasks keyed by the clock time at
//! which they become due. The clock is virtual by default: advancing it is
//! instantaneous, so runs are deterministic and a 200ms timeout costs nothing.

use super::promise::PromiseRef;
use super::value::{Completion, Value};
use super::Runtime;
use crate::config::ClockMode;
use crate::error::{messages, Error, Result};
use crate::event_loop::queue::Task;
use rustc_hash::FxHashMap as HashMap;
use std::time::{Duration, Instant};

/// Timer identifier handed back to script (first id is 1)
pub type TimerId = u32;

/// Largest accepted delay in milliseconds (2^31 - 1)
pub const MAX_DELAY_MS: f64 = 2_147_483_647.0;

/// Check a delay and convert it to whole milliseconds
pub fn validate_delay(delay: f64) -> Result<u64> {
    if !delay.is_finite() || !(0.0..=MAX_DELAY_MS).contains(&delay) {
        return Err(Error::TimerScheduling(messages::invalid_delay(delay)));
    }
    Ok(delay.trunc() as u64)
}

/// Delay argument as passed from script; a missing delay means 0
fn delay_argument(arg: Option<&Value>) -> std::result::Result<u64, Value> {
    match arg {
        None | Some(Value::Undefined) => Ok(0),
        Some(Value::Number(n)) => validate_delay(*n).map_err(Value::from),
        Some(other) => Err(Error::TimerScheduling(format!(
            "{} (got {})",
            messages::INVALID_DELAY,
            other.type_of()
        ))
        .into()),
    }
}

/// Time source for the loop, in milliseconds since the runtime started
#[derive(Debug, Clone)]
pub struct Clock {
    mode: ClockMode,
    origin: Instant,
    now: u64,
}

impl Clock {
    pub fn new(mode: ClockMode) -> Self {
        Self {
            mode,
            origin: Instant::now(),
            now: 0,
        }
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Current time
    pub fn now(&self) -> u64 {
        match self.mode {
            ClockMode::Virtual => self.now,
            ClockMode::Realtime => self.now.max(self.elapsed()),
        }
    }

    /// Time left until `deadline` (always zero for a virtual clock)
    pub fn until(&self, deadline: u64) -> Duration {
        match self.mode {
            ClockMode::Virtual => Duration::ZERO,
            ClockMode::Realtime => Duration::from_millis(deadline.saturating_sub(self.now())),
        }
    }

    /// Move the clock forward to `deadline`; never moves backwards.
    /// A realtime clock sleeps until the deadline has passed.
    pub fn advance_to(&mut self, deadline: u64) {
        if self.mode == ClockMode::Realtime {
            let wait = self.until(deadline);
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
        }
        self.now = self.now().max(deadline);
    }

    fn elapsed(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// A registered timer
#[derive(Debug, Clone)]
struct TimerEntry {
    callback: Value,
    args: Vec<Value>,
    /// Repeat period for intervals
    interval: Option<u64>,
    /// Sequence number of the queued macrotask
    seq: u64,
}

/// Live timers by id
#[derive(Debug, Default)]
pub struct TimerRegistry {
    entries: HashMap<TimerId, TimerEntry>,
    next_id: TimerId,
    fired: u64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that may still fire
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total callbacks fired
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Forget every timer
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Next free id, skipping 0 and ids still held by live timers after
    /// wrap-around
    fn allocate_id(&mut self) -> TimerId {
        loop {
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if !self.entries.contains_key(&self.next_id) {
                return self.next_id;
            }
        }
    }
}

impl Runtime {
    /// Schedule `callback(args...)` to run once after `delay` ms
    pub fn set_timeout(&mut self, callback: Value, delay: u64, args: Vec<Value>) -> TimerId {
        self.add_timer(callback, delay, args, None)
    }

    /// Schedule `callback(args...)` every `interval` ms until cleared
    pub fn set_interval(&mut self, callback: Value, interval: u64, args: Vec<Value>) -> TimerId {
        self.add_timer(callback, interval, args, Some(interval))
    }

    fn add_timer(
        &mut self,
        callback: Value,
        delay: u64,
        args: Vec<Value>,
        interval: Option<u64>,
    ) -> TimerId {
        let id = self.timers.allocate_id();
        let seq = self
            .queues
            .enqueue_macrotask(Task::Timer(id), delay, self.clock.now());
        tracing::debug!(timer = id, delay, repeating = interval.is_some(), "timer scheduled");
        self.timers.entries.insert(
            id,
            TimerEntry {
                callback,
                args,
                interval,
                seq,
            },
        );
        id
    }

    /// Cancel a timer; returns false if it is unknown or already done
    pub fn clear_timer(&mut self, id: TimerId) -> bool {
        match self.timers.entries.remove(&id) {
            Some(entry) => {
                self.queues.cancel_macrotask(entry.seq);
                tracing::debug!(timer = id, "timer cleared");
                true
            }
            None => false,
        }
    }

    /// Promise fulfilled with `undefined` after `delay` ms
    pub fn sleep(&mut self, delay: u64) -> PromiseRef {
        let capability = self.new_promise_capability();
        self.set_timeout(capability.resolve, delay, Vec::new());
        capability.promise
    }

    /// Run a due timer. Intervals are rescheduled before their callback runs
    /// so the callback can clear them.
    pub(crate) fn fire_timer(&mut self, id: TimerId) {
        let Some(entry) = self.timers.entries.remove(&id) else {
            return;
        };
        let callback = entry.callback.clone();
        let args = entry.args.clone();
        if let Some(interval) = entry.interval {
            let seq = self
                .queues
                .enqueue_macrotask(Task::Timer(id), interval, self.clock.now());
            self.timers.entries.insert(id, TimerEntry { seq, ..entry });
        }
        self.timers.fired += 1;
        tracing::trace!(timer = id, now = self.clock.now(), "timer fired");

        if let Err(error) = self.call(&callback, &args) {
            self.report_uncaught(error);
        }
    }

    /// Number of timers that may still fire
    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }
}

fn timer_callback(name: &str, args: &[Value]) -> std::result::Result<Value, Value> {
    match args.first() {
        Some(callback) if callback.is_callable() => Ok(callback.clone()),
        _ => Err(Error::type_error(format!(
            "{}: {}",
            name,
            messages::not_a_function("callback")
        ))
        .into()),
    }
}

fn timer_id_argument(args: &[Value]) -> Option<TimerId> {
    args.first()
        .and_then(Value::as_number)
        .filter(|n| n.is_finite() && *n >= 1.0 && *n <= TimerId::MAX as f64)
        .map(|n| n as TimerId)
}

fn set_timeout_binding(rt: &mut Runtime, args: &[Value]) -> Completion {
    let callback = timer_callback("setTimeout", args)?;
    let delay = delay_argument(args.get(1))?;
    let extra = args.iter().skip(2).cloned().collect();
    Ok(Value::Number(rt.set_timeout(callback, delay, extra) as f64))
}

fn set_interval_binding(rt: &mut Runtime, args: &[Value]) -> Completion {
    let callback = timer_callback("setInterval", args)?;
    let interval = delay_argument(args.get(1))?;
    let extra = args.iter().skip(2).cloned().collect();
    Ok(Value::Number(rt.set_interval(callback, interval, extra) as f64))
}

fn clear_timer_binding(rt: &mut Runtime, args: &[Value]) -> Completion {
    if let Some(id) = timer_id_argument(args) {
        rt.clear_timer(id);
    }
    Ok(Value::Undefined)
}

fn sleep_binding(rt: &mut Runtime, args: &[Value]) -> Completion {
    let delay = delay_argument(args.first())?;
    Ok(Value::Promise(rt.sleep(delay)))
}

fn queue_microtask_binding(rt: &mut Runtime, args: &[Value]) -> Completion {
    let callback = timer_callback("queueMicrotask", args)?;
    rt.queue_microtask(callback, Vec::new());
    Ok(Value::Undefined)
}

/// Register the timer globals on a runtime
pub fn install(rt: &mut Runtime) {
    rt.register_native("setTimeout", set_timeout_binding);
    rt.register_native("setInterval", set_interval_binding);
    rt.register_native("clearTimeout", clear_timer_binding);
    rt.register_native("clearInterval", clear_timer_binding);
    rt.register_native("sleep", sleep_binding);
    rt.register_native("queueMicrotask", queue_microtask_binding);
}
