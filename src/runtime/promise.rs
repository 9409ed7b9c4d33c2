//! Promise Implementation
//!
//! Promises settle exactly once. Every reaction is delivered through the
//! microtask queue: reactions registered before settlement are enqueued at
//! settlement in registration order, and reactions registered afterwards are
//! enqueued immediately. Nothing is ever invoked synchronously from `then`.

use super::async_runtime::FrameId;
use super::value::{Completion, Value};
use super::Runtime;
use crate::error::{messages, Error};
use crate::event_loop::queue::Task;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Shared handle to a promise
pub type PromiseRef = Rc<RefCell<Promise>>;

/// Promise state enum
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PromiseState {
    /// Promise is pending - not yet settled
    Pending,
    /// Promise is fulfilled with a value
    Fulfilled,
    /// Promise is rejected with a reason
    Rejected,
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromiseState::Pending => write!(f, "pending"),
            PromiseState::Fulfilled => write!(f, "fulfilled"),
            PromiseState::Rejected => write!(f, "rejected"),
        }
    }
}

/// Which way a promise settled
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Settlement {
    Fulfilled,
    Rejected,
}

/// Promise entity
pub struct Promise {
    /// Runtime-unique id, for diagnostics
    pub id: u64,
    /// Current state of the promise
    pub state: PromiseState,
    /// The settled value (fulfillment value or rejection reason)
    pub result: Option<Value>,
    /// Reactions waiting for this promise to settle
    pub reactions: Vec<PromiseReaction>,
    /// Whether a rejection handler has been attached
    pub handled: bool,
}

impl Promise {
    fn new(id: u64) -> Self {
        Self {
            id,
            state: PromiseState::Pending,
            result: None,
            reactions: Vec::new(),
            handled: false,
        }
    }

    /// Whether the promise has left `Pending`
    pub fn is_settled(&self) -> bool {
        self.state != PromiseState::Pending
    }

    /// Settled value or reason, if any
    pub fn value(&self) -> Option<&Value> {
        self.result.as_ref()
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("result", &self.result)
            .field("reactions", &self.reactions.len())
            .field("handled", &self.handled)
            .finish()
    }
}

/// Native continuation used by the runtime itself (module loader, sleep, ...)
pub type NativeReaction = Rc<dyn Fn(&mut Runtime, Value) -> Completion>;

/// What runs when a reaction job fires
#[derive(Clone)]
pub enum Handler {
    /// Pass the value through (fulfill) or rethrow it (reject)
    Identity,
    /// Call a script function with the settled value
    Callback(Value),
    /// Resume a suspended async frame
    Resume(FrameId),
    /// Run a native continuation
    Native(NativeReaction),
}

/// A Promise reaction (one `then` registration)
#[derive(Clone)]
pub struct PromiseReaction {
    pub on_fulfilled: Handler,
    pub on_rejected: Handler,
    /// Derived promise settled with the handler's completion
    pub capability: Option<PromiseRef>,
}

impl PromiseReaction {
    /// Reaction that resumes an async frame on either outcome
    pub fn resume(frame: FrameId) -> Self {
        Self {
            on_fulfilled: Handler::Resume(frame),
            on_rejected: Handler::Resume(frame),
            capability: None,
        }
    }

    /// Reaction backed by native continuations
    pub fn native<F, R>(on_fulfilled: F, on_rejected: R) -> Self
    where
        F: Fn(&mut Runtime, Value) -> Completion + 'static,
        R: Fn(&mut Runtime, Value) -> Completion + 'static,
    {
        Self {
            on_fulfilled: Handler::Native(Rc::new(on_fulfilled)),
            on_rejected: Handler::Native(Rc::new(on_rejected)),
            capability: None,
        }
    }

    /// Frame resumed by this reaction, if any
    pub fn resumed_frame(&self) -> Option<FrameId> {
        match self.on_fulfilled {
            Handler::Resume(id) => Some(id),
            _ => None,
        }
    }
}

/// A promise together with its resolving functions (`new Promise(executor)`)
#[derive(Clone, Debug)]
pub struct PromiseCapability {
    pub promise: PromiseRef,
    /// Script-callable `resolve(value)`
    pub resolve: Value,
    /// Script-callable `reject(reason)`
    pub reject: Value,
}

impl Runtime {
    /// Create a new pending promise
    pub fn create_promise(&mut self) -> PromiseRef {
        self.next_promise_id += 1;
        self.stats.promises_created += 1;
        Rc::new(RefCell::new(Promise::new(self.next_promise_id)))
    }

    /// Create a fulfilled promise
    pub fn resolved_promise(&mut self, value: Value) -> PromiseRef {
        let promise = self.create_promise();
        self.resolve_promise(&promise, value);
        promise
    }

    /// Create a rejected promise
    pub fn rejected_promise(&mut self, reason: Value) -> PromiseRef {
        let promise = self.create_promise();
        self.reject_promise(&promise, reason);
        promise
    }

    /// `PromiseResolve`: promises pass through, anything else is wrapped
    pub fn promise_resolve(&mut self, value: Value) -> PromiseRef {
        match value {
            Value::Promise(p) => p,
            other => self.resolved_promise(other),
        }
    }

    /// Resolve a promise; promise values are adopted one microtask later
    pub fn resolve_promise(&mut self, promise: &PromiseRef, value: Value) {
        if promise.borrow().is_settled() {
            return;
        }
        match value {
            Value::Promise(thenable) => {
                if Rc::ptr_eq(promise, &thenable) {
                    let err = Error::type_error("Chaining cycle detected for promise");
                    self.reject_promise(promise, err.into());
                    return;
                }
                self.queues.enqueue_microtask(Task::ResolveThenable {
                    promise: promise.clone(),
                    thenable,
                });
            }
            other => self.settle(promise, Settlement::Fulfilled, other),
        }
    }

    /// Fulfill a promise with a value (no thenable adoption)
    pub fn fulfill_promise(&mut self, promise: &PromiseRef, value: Value) {
        self.settle(promise, Settlement::Fulfilled, value);
    }

    /// Reject a promise with a reason
    pub fn reject_promise(&mut self, promise: &PromiseRef, reason: Value) {
        self.settle(promise, Settlement::Rejected, reason);
    }

    fn settle(&mut self, promise: &PromiseRef, settlement: Settlement, value: Value) {
        let mut p = promise.borrow_mut();
        if p.is_settled() {
            return; // Already settled
        }
        p.state = match settlement {
            Settlement::Fulfilled => PromiseState::Fulfilled,
            Settlement::Rejected => PromiseState::Rejected,
        };
        p.result = Some(value.clone());
        let reactions = std::mem::take(&mut p.reactions);
        let unhandled = settlement == Settlement::Rejected && !p.handled;
        let id = p.id;
        drop(p);

        self.stats.promises_settled += 1;
        tracing::trace!(promise = id, ?settlement, reactions = reactions.len(), "promise settled");

        if unhandled {
            self.pending_rejections.push(promise.clone());
        }
        for reaction in reactions {
            self.enqueue_reaction(reaction, settlement, value.clone());
        }
    }

    fn enqueue_reaction(&mut self, reaction: PromiseReaction, settlement: Settlement, argument: Value) {
        self.queues.enqueue_microtask(Task::Reaction {
            reaction,
            settlement,
            argument,
        });
    }

    /// `PerformPromiseThen`: register a reaction, or enqueue it if already settled
    pub fn perform_then(&mut self, promise: &PromiseRef, reaction: PromiseReaction) {
        let mut p = promise.borrow_mut();
        let was_unhandled_rejection = p.state == PromiseState::Rejected && !p.handled;
        p.handled = true;
        match p.state {
            PromiseState::Pending => p.reactions.push(reaction),
            state => {
                let argument = p.result.clone().unwrap_or_default();
                drop(p);
                let settlement = if state == PromiseState::Fulfilled {
                    Settlement::Fulfilled
                } else {
                    Settlement::Rejected
                };
                self.enqueue_reaction(reaction, settlement, argument);
            }
        }
        if was_unhandled_rejection {
            self.pending_rejections.retain(|pending| !Rc::ptr_eq(pending, promise));
        }
    }

    /// `promise.then(onFulfilled, onRejected)`; returns the derived promise
    pub fn then(
        &mut self,
        promise: &Value,
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
    ) -> Completion {
        let source = promise
            .as_promise()
            .cloned()
            .ok_or_else(|| Error::type_error(messages::not_a_promise(&promise.to_js_string())))?;
        let derived = self.create_promise();
        let to_handler = |value: Option<Value>| match value {
            Some(f) if f.is_callable() => Handler::Callback(f),
            _ => Handler::Identity,
        };
        self.perform_then(
            &source,
            PromiseReaction {
                on_fulfilled: to_handler(on_fulfilled),
                on_rejected: to_handler(on_rejected),
                capability: Some(derived.clone()),
            },
        );
        Ok(Value::Promise(derived))
    }

    /// Mark a promise as handled without attaching a reaction
    pub fn mark_handled(&mut self, promise: &PromiseRef) {
        promise.borrow_mut().handled = true;
        self.pending_rejections.retain(|pending| !Rc::ptr_eq(pending, promise));
    }

    /// Create a pending promise with script-callable resolving functions
    pub fn new_promise_capability(&mut self) -> PromiseCapability {
        let promise = self.create_promise();
        let already_resolved = Rc::new(Cell::new(false));

        let resolve = {
            let promise = promise.clone();
            let already_resolved = already_resolved.clone();
            Value::native("resolve", move |rt, args| {
                if !already_resolved.replace(true) {
                    rt.resolve_promise(&promise, args.first().cloned().unwrap_or_default());
                }
                Ok(Value::Undefined)
            })
        };
        let reject = {
            let promise = promise.clone();
            Value::native("reject", move |rt, args| {
                if !already_resolved.replace(true) {
                    rt.reject_promise(&promise, args.first().cloned().unwrap_or_default());
                }
                Ok(Value::Undefined)
            })
        };

        PromiseCapability {
            promise,
            resolve,
            reject,
        }
    }

    /// Run one reaction job
    pub(crate) fn run_reaction_job(
        &mut self,
        reaction: PromiseReaction,
        settlement: Settlement,
        argument: Value,
    ) {
        let handler = match settlement {
            Settlement::Fulfilled => reaction.on_fulfilled,
            Settlement::Rejected => reaction.on_rejected,
        };
        let completion = match handler {
            Handler::Identity => match settlement {
                Settlement::Fulfilled => Ok(argument),
                Settlement::Rejected => Err(argument),
            },
            Handler::Callback(f) => self.call(&f, &[argument]),
            Handler::Native(f) => f(self, argument),
            Handler::Resume(frame) => {
                self.resume_frame(frame, settlement, argument);
                return;
            }
        };
        match (reaction.capability, completion) {
            (Some(derived), Ok(value)) => self.resolve_promise(&derived, value),
            (Some(derived), Err(reason)) => self.reject_promise(&derived, reason),
            (None, Ok(_)) => {}
            (None, Err(error)) => self.report_uncaught(error),
        }
    }

    /// Run a resolve-thenable job: `thenable.then(resolve, reject)`
    pub(crate) fn run_resolve_thenable_job(&mut self, promise: PromiseRef, thenable: PromiseRef) {
        self.perform_then(
            &thenable,
            PromiseReaction {
                on_fulfilled: Handler::Identity,
                on_rejected: Handler::Identity,
                capability: Some(promise),
            },
        );
    }

    /// Report rejections that are still unhandled at a microtask checkpoint
    pub(crate) fn check_unhandled_rejections(&mut self) {
        if self.pending_rejections.is_empty() {
            return;
        }
        for promise in std::mem::take(&mut self.pending_rejections) {
            let (handled, reason) = {
                let p = promise.borrow();
                (p.handled, p.result.clone().unwrap_or_default())
            };
            if handled {
                continue;
            }
            tracing::warn!(reason = %reason, "unhandled promise rejection");
            self.diagnostics.unhandled_rejections.push(reason.to_js_string());
            if self.config.report_unhandled_rejections {
                self.host.unhandled_rejection(&reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::tests::test_runtime;

    #[test]
    fn test_promise_lifecycle() {
        let (mut rt, _) = test_runtime();
        let promise = rt.create_promise();
        assert_eq!(promise.borrow().state, PromiseState::Pending);

        rt.fulfill_promise(&promise, Value::Number(42.0));
        assert_eq!(promise.borrow().state, PromiseState::Fulfilled);
        assert_eq!(promise.borrow().value(), Some(&Value::Number(42.0)));

        // Settles exactly once
        rt.reject_promise(&promise, Value::from("late"));
        assert_eq!(promise.borrow().state, PromiseState::Fulfilled);
    }

    #[test]
    fn test_then_on_settled_promise_is_deferred() {
        let (mut rt, log) = test_runtime();
        let promise = Value::Promise(rt.resolved_promise(Value::from("v")));
        let on_fulfilled = Value::native("h", |rt, args| {
            rt.report(&args[0].to_js_string());
            Ok(Value::Undefined)
        });
        rt.then(&promise, Some(on_fulfilled), None).unwrap();

        assert!(log.entries().is_empty());
        assert_eq!(rt.queues.microtask_len(), 1);
        rt.run_microtasks();
        assert_eq!(log.entries(), vec!["v".to_string()]);
    }

    #[test]
    fn test_reactions_run_in_registration_order() {
        let (mut rt, log) = test_runtime();
        let promise = rt.create_promise();
        for label in ["first", "second", "third"] {
            let handler = Value::native(label, move |rt, _| {
                rt.report(label);
                Ok(Value::Undefined)
            });
            rt.then(&Value::Promise(promise.clone()), Some(handler), None)
                .unwrap();
        }
        rt.fulfill_promise(&promise, Value::Undefined);
        rt.run_microtasks();
        assert_eq!(log.entries(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_then_chain_propagates_values() {
        let (mut rt, log) = test_runtime();
        let source = Value::Promise(rt.resolved_promise(Value::Number(1.0)));
        let double = Value::native("double", |_, args| {
            Ok(Value::Number(args[0].as_number().unwrap_or(0.0) * 2.0))
        });
        let derived = rt.then(&source, Some(double), None).unwrap();
        let record = Value::native("record", |rt, args| {
            rt.report(&args[0].to_js_string());
            Ok(Value::Undefined)
        });
        rt.then(&derived, Some(record), None).unwrap();
        rt.run_microtasks();
        assert_eq!(log.entries(), vec!["2"]);
    }

    #[test]
    fn test_rejection_skips_fulfill_handler() {
        let (mut rt, log) = test_runtime();
        let source = Value::Promise(rt.rejected_promise(Value::from("nope")));
        let never = Value::native("never", |rt, _| {
            rt.report("fulfilled");
            Ok(Value::Undefined)
        });
        let derived = rt.then(&source, Some(never), None).unwrap();
        let catch = Value::native("catch", |rt, args| {
            rt.report(&format!("caught {}", args[0]));
            Ok(Value::Undefined)
        });
        rt.then(&derived, None, Some(catch)).unwrap();
        rt.run_microtasks();
        assert_eq!(log.entries(), vec!["caught nope"]);
        assert!(rt.diagnostics().unhandled_rejections.is_empty());
    }

    #[test]
    fn test_resolving_with_promise_adopts_state() {
        let (mut rt, _) = test_runtime();
        let inner = rt.resolved_promise(Value::Number(7.0));
        let outer = rt.create_promise();
        rt.resolve_promise(&outer, Value::Promise(inner));
        assert_eq!(outer.borrow().state, PromiseState::Pending);

        rt.run_microtasks();
        assert_eq!(outer.borrow().state, PromiseState::Fulfilled);
        assert_eq!(outer.borrow().value(), Some(&Value::Number(7.0)));
    }

    #[test]
    fn test_self_resolution_rejects() {
        let (mut rt, _) = test_runtime();
        let promise = rt.create_promise();
        rt.mark_handled(&promise);
        rt.resolve_promise(&promise, Value::Promise(promise.clone()));
        assert_eq!(promise.borrow().state, PromiseState::Rejected);
    }

    #[test]
    fn test_capability_resolves_once() {
        let (mut rt, _) = test_runtime();
        let capability = rt.new_promise_capability();
        rt.call(&capability.resolve, &[Value::Number(1.0)]).unwrap();
        rt.call(&capability.reject, &[Value::from("ignored")]).unwrap();
        rt.call(&capability.resolve, &[Value::Number(2.0)]).unwrap();
        let p = capability.promise.borrow();
        assert_eq!(p.state, PromiseState::Fulfilled);
        assert_eq!(p.value(), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_then_requires_promise() {
        let (mut rt, _) = test_runtime();
        let err = rt.then(&Value::Number(1.0), None, None).unwrap_err();
        assert_eq!(err.to_error().kind(), crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn test_unhandled_rejection_is_reported_at_checkpoint() {
        let (mut rt, log) = test_runtime();
        rt.rejected_promise(Value::from("lost"));
        rt.run_microtasks();
        rt.check_unhandled_rejections();
        assert_eq!(rt.diagnostics().unhandled_rejections, vec!["lost".to_string()]);
        assert_eq!(log.rejections(), vec!["lost".to_string()]);
    }

    #[test]
    fn test_late_handler_clears_pending_rejection() {
        let (mut rt, _) = test_runtime();
        let promise = Value::Promise(rt.rejected_promise(Value::from("late")));
        let catch = Value::native("catch", |_, _| Ok(Value::Undefined));
        rt.then(&promise, None, Some(catch)).unwrap();
        rt.run_microtasks();
        rt.check_unhandled_rejections();
        assert!(rt.diagnostics().unhandled_rejections.is_empty());
    }
}
