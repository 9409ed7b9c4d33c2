//! Runtime environment for jobloop
//!
//! A [`Runtime`] owns everything one script execution needs: the job
//! queues, the clock, suspended async frames, the module graph, timers and
//! the host. Several runtimes can coexist in one process; nothing is global.

pub mod async_runtime;
pub mod host;
pub mod promise;
pub mod timers;
mod value;

pub use async_runtime::{AsyncBody, AsyncDriver, AsyncStats, FrameId, FrameState, FrameStatus, Resume, Step};
pub use host::{Host, RecordingHost, ReportLog, StdoutHost};
pub use promise::{
    Handler, Promise, PromiseCapability, PromiseReaction, PromiseRef, PromiseState, Settlement,
};
pub use timers::{validate_delay, Clock, TimerId};
pub use value::{Completion, Function, FunctionKind, Namespace, NativeFn, Value};

use crate::config::RuntimeConfig;
use crate::error::{messages, Error};
use crate::event_loop::queue::{JobQueues, Task};
use crate::modules::{FsSource, ModuleCompiler, ModuleGraph, SourceLoader};
use rustc_hash::FxHashMap as HashMap;
use std::path::Path;
use std::rc::Rc;
use timers::TimerRegistry;

/// Problems observed while running that did not stop the loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Reasons of rejections left unhandled at a microtask checkpoint
    pub unhandled_rejections: Vec<String>,
    /// Exceptions thrown by callbacks nobody could observe
    pub uncaught_exceptions: Vec<String>,
}

/// Work dropped by a forced exit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Discarded {
    pub jobs: usize,
    pub timers: usize,
    pub frames: usize,
}

/// Counters for work done by a runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub promises_created: u64,
    pub promises_settled: u64,
    pub microtasks_run: u64,
    pub macrotasks_run: u64,
}

/// The jobloop runtime
pub struct Runtime {
    pub(crate) config: RuntimeConfig,
    pub(crate) queues: JobQueues,
    pub(crate) clock: Clock,
    pub(crate) driver: AsyncDriver,
    pub(crate) modules: ModuleGraph,
    pub(crate) timers: TimerRegistry,
    pub(crate) host: Box<dyn Host>,
    globals: HashMap<String, Value>,
    exit_request: Option<i32>,
    pub(crate) pending_rejections: Vec<PromiseRef>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) next_promise_id: u64,
    pub(crate) stats: RuntimeStats,
}

impl Runtime {
    /// Create a runtime reading module sources from the configured code
    /// directory
    pub fn new(config: RuntimeConfig, host: Box<dyn Host>, compiler: Rc<dyn ModuleCompiler>) -> Self {
        Self::with_sources(config, host, compiler, Rc::new(FsSource))
    }

    /// Create a runtime with a custom source loader
    pub fn with_sources(
        config: RuntimeConfig,
        host: Box<dyn Host>,
        compiler: Rc<dyn ModuleCompiler>,
        sources: Rc<dyn SourceLoader>,
    ) -> Self {
        let root = config.resolved_code_dir();
        let mut rt = Self {
            clock: Clock::new(config.clock),
            queues: JobQueues::new(),
            driver: AsyncDriver::new(),
            modules: ModuleGraph::new(root, compiler, sources),
            timers: TimerRegistry::new(),
            host,
            globals: HashMap::default(),
            exit_request: None,
            pending_rejections: Vec::new(),
            diagnostics: Diagnostics::default(),
            next_promise_id: 0,
            stats: RuntimeStats::default(),
            config,
        };
        host::install(&mut rt);
        timers::install(&mut rt);
        rt
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Code directory module paths are rooted at
    pub fn code_dir(&self) -> &Path {
        self.modules.root()
    }

    pub fn modules(&self) -> &ModuleGraph {
        &self.modules
    }

    pub fn driver(&self) -> &AsyncDriver {
        &self.driver
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Current clock time in milliseconds
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Get a global value
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    /// Set a global value
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    /// Register a native function as a global
    pub fn register_native<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Runtime, &[Value]) -> Completion + 'static,
    {
        self.set_global(name, Value::native(name, f));
    }

    /// Call a function value. Async functions return their promise.
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> Completion {
        let Value::Function(function) = callee else {
            return Err(Error::type_error(messages::not_a_function(&callee.to_js_string())).into());
        };
        let function = function.clone();
        match &function.kind {
            FunctionKind::Native(f) => f(self, args),
            FunctionKind::Async(body) => {
                let promise = self.call_async(&function.name, body.clone(), args.to_vec());
                Ok(Value::Promise(promise))
            }
        }
    }

    /// Call a global function by name
    pub fn call_global(&mut self, name: &str, args: &[Value]) -> Completion {
        let callee = self
            .global(name)
            .ok_or_else(|| Value::from(Error::type_error(messages::not_a_function(name))))?;
        self.call(&callee, args)
    }

    /// Deliver `report(message)` to the host
    pub fn report(&mut self, message: &str) {
        tracing::debug!(message, "report");
        self.host.report(message);
    }

    /// Request termination with `code`; honoured at the next job boundary.
    /// The first request wins.
    pub fn request_exit(&mut self, code: i32) {
        if self.exit_request.is_none() {
            tracing::debug!(code, "exit requested");
            self.exit_request = Some(code);
        }
    }

    /// Abnormal termination (status 1)
    pub fn kill(&mut self) {
        self.request_exit(1);
    }

    /// Pending exit status, if termination was requested
    pub fn exit_request(&self) -> Option<i32> {
        self.exit_request
    }

    /// `queueMicrotask(callback)`
    pub fn queue_microtask(&mut self, callback: Value, args: Vec<Value>) {
        self.queues.enqueue_microtask(Task::Callback { callback, args });
    }

    /// Record an exception no script code can observe
    pub(crate) fn report_uncaught(&mut self, error: Value) {
        tracing::warn!(error = %error, "uncaught exception");
        self.diagnostics.uncaught_exceptions.push(error.to_js_string());
        self.host.uncaught_exception(&error);
    }

    /// Run one job
    pub(crate) fn run_task(&mut self, task: Task) {
        match task {
            Task::Reaction {
                reaction,
                settlement,
                argument,
            } => self.run_reaction_job(reaction, settlement, argument),
            Task::ResolveThenable { promise, thenable } => {
                self.run_resolve_thenable_job(promise, thenable)
            }
            Task::Callback { callback, args } => {
                if let Err(error) = self.call(&callback, &args) {
                    self.report_uncaught(error);
                }
            }
            Task::Timer(id) => self.fire_timer(id),
            Task::External(event) => event(self),
        }
    }

    /// Drain the microtask queue, including microtasks enqueued while
    /// draining. Stops early once exit has been requested. Returns the
    /// number of microtasks run.
    pub fn run_microtasks(&mut self) -> usize {
        let mut count = 0;
        while self.exit_request.is_none() {
            let Some(microtask) = self.queues.pop_next_microtask() else {
                break;
            };
            tracing::trace!(task = microtask.task.label(), frame = ?microtask.task.resumes_frame(), "run microtask");
            self.run_task(microtask.task);
            count += 1;
        }
        self.stats.microtasks_run += count as u64;
        count
    }

    /// Drop all queued jobs, suspended frames and timers
    pub(crate) fn discard_pending(&mut self) -> Discarded {
        let discarded = Discarded {
            jobs: self.queues.clear(),
            timers: self.timers.clear(),
            frames: self.driver.discard_all(),
        };
        self.pending_rejections.clear();
        tracing::debug!(?discarded, "discarded pending work");
        discarded
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("now", &self.clock.now())
            .field("queues", &self.queues)
            .field("driver", &self.driver)
            .field("modules", &self.modules)
            .field("exit_request", &self.exit_request)
            .finish()
    }
}
