//! Jobloop: the job scheduler and ES module loader core of a minimal
//! JavaScript runtime
//!
//! Jobloop decides *when* script code runs. It owns the microtask and
//! macrotask queues, the promise state machine, suspended async frames,
//! timers, and the module graph, and drives them with a single-threaded
//! event loop that runs until nothing is left to do or the script asks to
//! exit. Executing the script text itself is delegated to a
//! [`ModuleCompiler`](modules::ModuleCompiler).
//!
//! # Quick Start
//!
//! ```no_run
//! use jobloop::modules::{CompiledModule, NativeCompiler};
//! use jobloop::runtime::StdoutHost;
//! use jobloop::{EventLoop, Runtime, RuntimeConfig, Value};
//! use std::rc::Rc;
//!
//! fn main() -> jobloop::Result<()> {
//!     let config = RuntimeConfig::new().with_code_dir("./app");
//!     let mut compiler = NativeCompiler::new(config.resolved_code_dir());
//!     compiler.register(
//!         "main.js",
//!         CompiledModule::synchronous(&[], |rt, _| {
//!             rt.call_global("report", &[Value::from("hello")])?;
//!             Ok(())
//!         }),
//!     );
//!
//!     let runtime = Runtime::new(config, Box::new(StdoutHost), Rc::new(compiler));
//!     let result = EventLoop::new(runtime).run_entry("main.js")?;
//!     std::process::exit(result.exit_code());
//! }
//! ```
//!
//! # Module Overview
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`event_loop`] | job queues, the drain loop, cross-thread events |
//! | [`runtime`] | values, promises, async frames, timers, host bindings |
//! | [`modules`] | resolution, the module graph, loading and evaluation |
//! | [`config`] | serde-backed runtime configuration |
//! | [`probes`] | bundled regression scenarios |
#![allow(clippy::new_without_default)]
#![allow(clippy::type_complexity)]

pub mod config;
pub mod event_loop;
pub mod modules;
pub mod prelude;
pub mod probes;
pub mod runtime;

mod error;

pub use config::{ClockMode, RuntimeConfig};
pub use error::{messages, Error, ErrorKind, Result};
pub use event_loop::{EventLoop, ExitReason, RunResult};
pub use runtime::{Runtime, Value};

/// Jobloop version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
