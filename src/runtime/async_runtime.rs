//! Async Runtime Support
//!
//! Async functions and module bodies run as explicit state machines. A body
//! is stepped with a [`Resume`] value and either finishes or asks to await a
//! value; the driver then parks the frame and registers a promise reaction
//! that resumes it through the microtask queue.
//!
//! Frames are owned by the [`AsyncDriver`] only while they are suspended.
//! A running frame lives on the Rust stack of whoever resumed it, so nested
//! async calls made from inside a body never alias the caller's state.

use super::promise::{PromiseReaction, PromiseRef, Settlement};
use super::value::{Completion, Value};
use super::Runtime;
use rustc_hash::FxHashMap as HashMap;
use std::fmt;
use std::rc::Rc;

/// Identifier of an async frame
pub type FrameId = u64;

/// How a suspended frame is resumed
#[derive(Debug, Clone)]
pub enum Resume {
    /// The awaited promise fulfilled (or this is the first step)
    Normal(Value),
    /// The awaited promise rejected; the value is thrown at the await point
    Throw(Value),
}

impl Resume {
    /// Turn the resumption into the completion of the `await` expression
    pub fn into_completion(self) -> Completion {
        match self {
            Resume::Normal(value) => Ok(value),
            Resume::Throw(reason) => Err(reason),
        }
    }
}

/// Outcome of stepping a body
#[derive(Debug, Clone)]
pub enum Step {
    /// Suspend until the value settles
    Await(Value),
    /// Finish with a return value
    Return(Value),
}

/// A resumable function body
///
/// `step` is called once to start the body and once per settled `await`.
/// Returning `Err` throws out of the function.
pub trait AsyncBody {
    fn step(
        &self,
        rt: &mut Runtime,
        frame: &mut FrameState,
        resume: Resume,
    ) -> std::result::Result<Step, Value>;
}

impl<F> AsyncBody for F
where
    F: Fn(&mut Runtime, &mut FrameState, Resume) -> std::result::Result<Step, Value>,
{
    fn step(
        &self,
        rt: &mut Runtime,
        frame: &mut FrameState,
        resume: Resume,
    ) -> std::result::Result<Step, Value> {
        self(rt, frame, resume)
    }
}

/// Saved execution state of a frame
#[derive(Debug, Clone, Default)]
pub struct FrameState {
    /// Where to continue on the next step (0 = start)
    pub resume_point: u32,
    /// Captured locals; arguments occupy the first slots
    pub locals: Vec<Value>,
}

impl FrameState {
    /// Create a state starting at resume point 0 with the given locals
    pub fn new(locals: Vec<Value>) -> Self {
        Self {
            resume_point: 0,
            locals,
        }
    }

    /// Read a local (undefined if never set)
    pub fn local(&self, index: usize) -> Value {
        self.locals.get(index).cloned().unwrap_or_default()
    }

    /// Write a local, growing the slot list as needed
    pub fn set_local(&mut self, index: usize, value: Value) {
        if index >= self.locals.len() {
            self.locals.resize(index + 1, Value::Undefined);
        }
        self.locals[index] = value;
    }

    /// Record where to continue and await `value`
    pub fn suspend_at(&mut self, point: u32, value: Value) -> std::result::Result<Step, Value> {
        self.resume_point = point;
        Ok(Step::Await(value))
    }
}

/// Lifecycle of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Running,
    Suspended,
    Returned,
    Threw,
}

/// One activation of an async function or module body
pub struct AsyncFrame {
    pub id: FrameId,
    pub name: String,
    body: Rc<dyn AsyncBody>,
    pub state: FrameState,
    /// Promise returned to the caller
    pub outer: PromiseRef,
    /// Promise the frame is suspended on
    pub awaiting: Option<PromiseRef>,
    pub status: FrameStatus,
}

impl fmt::Debug for AsyncFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFrame")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("resume_point", &self.state.resume_point)
            .field("status", &self.status)
            .finish()
    }
}

/// Counters kept by the driver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsyncStats {
    pub frames_created: u64,
    pub suspensions: u64,
    pub resumptions: u64,
    pub returned: u64,
    pub threw: u64,
    pub discarded: u64,
}

/// Owner of all suspended frames
#[derive(Default)]
pub struct AsyncDriver {
    frames: HashMap<FrameId, AsyncFrame>,
    next_id: FrameId,
    stats: AsyncStats,
}

impl AsyncDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames currently parked on an await
    pub fn suspended_count(&self) -> usize {
        self.frames.len()
    }

    /// Check whether a frame is suspended
    pub fn is_suspended(&self, id: FrameId) -> bool {
        self.frames.contains_key(&id)
    }

    /// Look at a suspended frame
    pub fn frame(&self, id: FrameId) -> Option<&AsyncFrame> {
        self.frames.get(&id)
    }

    pub fn stats(&self) -> &AsyncStats {
        &self.stats
    }

    /// Drop every suspended frame without resuming it
    pub fn discard_all(&mut self) -> usize {
        let count = self.frames.len();
        self.frames.clear();
        self.stats.discarded += count as u64;
        count
    }

    fn allocate_id(&mut self) -> FrameId {
        self.next_id += 1;
        self.next_id
    }
}

impl fmt::Debug for AsyncDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDriver")
            .field("suspended", &self.frames.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Runtime {
    /// Start an async function: run it synchronously up to its first await
    /// and return the promise for its eventual result.
    pub fn call_async(&mut self, name: &str, body: Rc<dyn AsyncBody>, args: Vec<Value>) -> PromiseRef {
        let outer = self.create_promise();
        let id = self.driver.allocate_id();
        self.driver.stats.frames_created += 1;
        tracing::trace!(frame = id, name, "start async frame");

        let frame = AsyncFrame {
            id,
            name: name.to_string(),
            body,
            state: FrameState::new(args),
            outer: outer.clone(),
            awaiting: None,
            status: FrameStatus::Running,
        };
        self.drive_frame(frame, Resume::Normal(Value::Undefined));
        outer
    }

    /// Step a frame once and act on the outcome
    fn drive_frame(&mut self, mut frame: AsyncFrame, resume: Resume) {
        frame.status = FrameStatus::Running;
        let body = frame.body.clone();
        match body.step(self, &mut frame.state, resume) {
            Ok(Step::Await(value)) => {
                let awaited = self.promise_resolve(value);
                let id = frame.id;
                tracing::trace!(frame = id, point = frame.state.resume_point, "frame suspended");
                frame.awaiting = Some(awaited.clone());
                frame.status = FrameStatus::Suspended;
                self.driver.frames.insert(id, frame);
                self.driver.stats.suspensions += 1;
                self.perform_then(&awaited, PromiseReaction::resume(id));
            }
            Ok(Step::Return(value)) => {
                frame.status = FrameStatus::Returned;
                self.driver.stats.returned += 1;
                tracing::trace!(frame = frame.id, "frame returned");
                self.resolve_promise(&frame.outer, value);
            }
            Err(reason) => {
                frame.status = FrameStatus::Threw;
                self.driver.stats.threw += 1;
                tracing::debug!(frame = frame.id, name = %frame.name, reason = %reason, "frame threw");
                self.reject_promise(&frame.outer, reason);
            }
        }
    }

    /// Continue a suspended frame with the settlement of its awaited promise
    pub(crate) fn resume_frame(&mut self, id: FrameId, settlement: Settlement, value: Value) {
        let Some(mut frame) = self.driver.frames.remove(&id) else {
            // Discarded by a forced exit
            tracing::trace!(frame = id, "ignoring resume of unknown frame");
            return;
        };
        frame.awaiting = None;
        self.driver.stats.resumptions += 1;
        let resume = match settlement {
            Settlement::Fulfilled => Resume::Normal(value),
            Settlement::Rejected => Resume::Throw(value),
        };
        self.drive_frame(frame, resume);
    }

    /// Frames currently parked on an await
    pub fn suspended_frames(&self) -> usize {
        self.driver.suspended_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::promise::PromiseState;
    use crate::runtime::tests::test_runtime;

    fn counter_body() -> Rc<dyn AsyncBody> {
        Rc::new(|rt: &mut Runtime, frame: &mut FrameState, resume: Resume| -> Result<Step, Value> {
            match frame.resume_point {
                0 => {
                    rt.report("start");
                    frame.suspend_at(1, Value::Number(1.0))
                }
                1 => {
                    let n = resume.into_completion()?;
                    rt.report(&format!("got {}", n));
                    frame.suspend_at(2, Value::Number(2.0))
                }
                _ => {
                    let n = resume.into_completion()?;
                    Ok(Step::Return(n))
                }
            }
        })
    }

    #[test]
    fn test_runs_synchronously_to_first_await() {
        let (mut rt, log) = test_runtime();
        let outer = rt.call_async("counter", counter_body(), vec![]);

        assert_eq!(log.entries(), vec!["start"]);
        assert_eq!(outer.borrow().state, PromiseState::Pending);
        assert_eq!(rt.suspended_frames(), 1);
        assert_eq!(rt.queues.microtask_len(), 1);
    }

    #[test]
    fn test_frame_resumes_and_returns() {
        let (mut rt, log) = test_runtime();
        let outer = rt.call_async("counter", counter_body(), vec![]);
        rt.run_microtasks();

        assert_eq!(log.entries(), vec!["start", "got 1"]);
        assert_eq!(outer.borrow().state, PromiseState::Fulfilled);
        assert_eq!(outer.borrow().value(), Some(&Value::Number(2.0)));
        assert_eq!(rt.suspended_frames(), 0);
        assert_eq!(rt.driver.stats().resumptions, 2);
    }

    #[test]
    fn test_rejected_await_throws_into_body() {
        let (mut rt, log) = test_runtime();
        let failing = rt.rejected_promise(Value::from("bad"));
        let body = Rc::new(move |rt: &mut Runtime, frame: &mut FrameState, resume: Resume| -> Result<Step, Value> {
            match frame.resume_point {
                0 => frame.suspend_at(1, Value::Promise(failing.clone())),
                _ => match resume.into_completion() {
                    Ok(_) => Ok(Step::Return(Value::from("unreachable"))),
                    Err(reason) => {
                        rt.report(&format!("caught {}", reason));
                        Ok(Step::Return(Value::Undefined))
                    }
                },
            }
        });
        let outer = rt.call_async("catcher", body, vec![]);
        rt.run_microtasks();

        assert_eq!(log.entries(), vec!["caught bad"]);
        assert_eq!(outer.borrow().state, PromiseState::Fulfilled);
    }

    #[test]
    fn test_uncaught_throw_rejects_outer() {
        let (mut rt, _) = test_runtime();
        let body = Rc::new(|_: &mut Runtime, _: &mut FrameState, _: Resume| -> Result<Step, Value> {
            Err(Value::from("boom"))
        });
        let outer = rt.call_async("thrower", body, vec![]);
        assert_eq!(outer.borrow().state, PromiseState::Rejected);
        assert_eq!(outer.borrow().value(), Some(&Value::from("boom")));
        assert_eq!(rt.driver.stats().threw, 1);
    }

    #[test]
    fn test_arguments_become_locals() {
        let (mut rt, log) = test_runtime();
        let body = Rc::new(|rt: &mut Runtime, frame: &mut FrameState, _: Resume| -> Result<Step, Value> {
            rt.report(&frame.local(0).to_js_string());
            frame.set_local(3, Value::Boolean(true));
            Ok(Step::Return(frame.local(3)))
        });
        let outer = rt.call_async("args", body, vec![Value::from("first")]);
        assert_eq!(log.entries(), vec!["first"]);
        assert_eq!(outer.borrow().value(), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_discarded_frame_is_never_resumed() {
        let (mut rt, log) = test_runtime();
        rt.call_async("counter", counter_body(), vec![]);
        assert_eq!(rt.driver.discard_all(), 1);
        rt.run_microtasks();

        assert_eq!(log.entries(), vec!["start"]);
        assert_eq!(rt.driver.stats().discarded, 1);
    }
}
