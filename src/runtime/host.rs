//! Host bindings
//!
//! The embedding host receives `report(message)` calls and diagnostics through
//! the [`Host`] trait. `exit(code)` and `kill()` are handled by the runtime
//! itself as a termination request honoured at the next job boundary.

use super::value::{Completion, Value};
use super::Runtime;
use std::cell::RefCell;
use std::rc::Rc;

/// Receiver for output produced by scripts
pub trait Host {
    /// Called synchronously for every `report(message)`
    fn report(&mut self, message: &str);

    /// A rejected promise had no handler at a microtask checkpoint
    fn unhandled_rejection(&mut self, reason: &Value) {
        tracing::error!(reason = %reason, "Uncaught (in promise)");
    }

    /// A callback or reaction threw and nothing could observe it
    fn uncaught_exception(&mut self, error: &Value) {
        tracing::error!(error = %error, "Uncaught");
    }
}

/// Host that prints reports to stdout and uncaught errors to stderr
#[derive(Debug, Default)]
pub struct StdoutHost;

impl Host for StdoutHost {
    fn report(&mut self, message: &str) {
        println!("{}", message);
    }

    fn unhandled_rejection(&mut self, reason: &Value) {
        eprintln!("Uncaught (in promise) {}", reason);
    }

    fn uncaught_exception(&mut self, error: &Value) {
        eprintln!("Uncaught {}", error);
    }
}

#[derive(Debug, Default)]
struct LogInner {
    reports: Vec<String>,
    rejections: Vec<String>,
    uncaught: Vec<String>,
}

/// Shared view of everything a [`RecordingHost`] received
#[derive(Debug, Clone, Default)]
pub struct ReportLog(Rc<RefCell<LogInner>>);

impl ReportLog {
    /// Reports in the order they were made
    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().reports.clone()
    }

    /// Unhandled rejection reasons
    pub fn rejections(&self) -> Vec<String> {
        self.0.borrow().rejections.clone()
    }

    /// Uncaught exceptions
    pub fn uncaught(&self) -> Vec<String> {
        self.0.borrow().uncaught.clone()
    }
}

/// Host that records everything; used by probes and tests
#[derive(Debug, Default)]
pub struct RecordingHost {
    log: ReportLog,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the recorded output, valid after the host is moved into a runtime
    pub fn log(&self) -> ReportLog {
        self.log.clone()
    }
}

impl Host for RecordingHost {
    fn report(&mut self, message: &str) {
        self.log.0.borrow_mut().reports.push(message.to_string());
    }

    fn unhandled_rejection(&mut self, reason: &Value) {
        self.log.0.borrow_mut().rejections.push(reason.to_js_string());
    }

    fn uncaught_exception(&mut self, error: &Value) {
        self.log.0.borrow_mut().uncaught.push(error.to_js_string());
    }
}

fn report_binding(rt: &mut Runtime, args: &[Value]) -> Completion {
    let message = args.first().cloned().unwrap_or_default().to_js_string();
    rt.report(&message);
    Ok(Value::Undefined)
}

fn exit_binding(rt: &mut Runtime, args: &[Value]) -> Completion {
    let code = match args.first() {
        Some(Value::Number(n)) if n.is_finite() => *n as i32,
        _ => 0,
    };
    rt.request_exit(code);
    Ok(Value::Undefined)
}

fn kill_binding(rt: &mut Runtime, _args: &[Value]) -> Completion {
    rt.kill();
    Ok(Value::Undefined)
}

/// Register `report`, `exit` and `kill` on a runtime
pub fn install(rt: &mut Runtime) {
    rt.register_native("report", report_binding);
    rt.register_native("exit", exit_binding);
    rt.register_native("kill", kill_binding);
}
