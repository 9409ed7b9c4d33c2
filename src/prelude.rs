//! Prelude module for convenient imports
//!
//! ```no_run
//! use jobloop::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let probe = jobloop::probes::find("task-ordering").expect("bundled probe");
//!     let outcome = probe.run(RuntimeConfig::new())?;
//!     println!("{:?}", outcome.reports);
//!     Ok(())
//! }
//! ```

// Core runtime types
pub use crate::runtime::{Completion, Host, Runtime, StdoutHost, Value};

// Promises and async frames
pub use crate::runtime::{FrameState, PromiseRef, PromiseState, Resume, Step};

// Error handling
pub use crate::error::{Error, ErrorKind, Result};

// Scheduling
pub use crate::event_loop::{EventLoop, EventSender, ExitReason, RunResult};

// Modules
pub use crate::modules::{CompiledModule, ModuleCompiler, ModuleScope, NativeCompiler};

// Configuration
pub use crate::config::{ClockMode, RuntimeConfig};
