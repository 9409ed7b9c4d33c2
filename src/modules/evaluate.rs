//! Module loading and evaluation sequencing
//!
//! Loading is synchronous and depth-first: a module's imports are resolved,
//! loaded and (if possible) evaluated in declaration order before its own
//! body runs. A dependency still suspended on a top-level await keeps its
//! importers in `Loading` until its evaluation promise fulfils.

use super::{ModuleBody, ModuleHandle, ModuleRecord, ModuleScope, ModuleState};
use crate::error::{messages, Error, Result};
use crate::runtime::{
    AsyncBody, FrameState, PromiseReaction, PromiseRef, PromiseState, Resume, Runtime, Step, Value,
};
use rustc_hash::FxHashMap as HashMap;
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

/// Runs a module body as an async frame
struct ModuleFrame {
    body: Rc<dyn ModuleBody>,
    scope: ModuleScope,
}

impl AsyncBody for ModuleFrame {
    fn step(
        &self,
        rt: &mut Runtime,
        frame: &mut FrameState,
        resume: Resume,
    ) -> std::result::Result<Step, Value> {
        self.body.step(rt, &self.scope, frame, resume)
    }
}

impl Runtime {
    /// Load and evaluate the entry module (path relative to the code
    /// directory). Fails if the module or any import fails synchronously;
    /// a module suspended on a top-level await is returned in `Evaluating`.
    pub fn load_entry(&mut self, entry: &str) -> Result<ModuleHandle> {
        let path = self.modules.resolve_entry(entry)?;
        self.load_module(&path, true)
    }

    /// Load and evaluate the module at a canonical path
    pub fn load_module(&mut self, path: &Path, main: bool) -> Result<ModuleHandle> {
        let handle = self.load_inner(path, main);
        let failure = {
            let record = handle.borrow();
            match record.state {
                ModuleState::Failed => Some(record.error.clone().unwrap_or_default()),
                _ => None,
            }
        };
        match failure {
            Some(error) => Err(error.to_error()),
            None => Ok(handle),
        }
    }

    /// Dynamic-import entry point: resolve `specifier` from `referrer`, load
    /// it, and return its evaluation promise
    pub fn import_module(&mut self, specifier: &str, referrer: &Path) -> PromiseRef {
        match self.modules.resolve(specifier, Some(referrer)) {
            Ok(path) => {
                let handle = self.load_inner(&path, false);
                let evaluation = handle.borrow().evaluation.clone();
                evaluation
            }
            Err(error) => self.rejected_promise(error.into()),
        }
    }

    /// State of the module at a canonical path
    pub fn module_state(&self, path: &Path) -> Option<ModuleState> {
        self.modules.state(path)
    }

    fn load_inner(&mut self, path: &Path, main: bool) -> ModuleHandle {
        if let Some(handle) = self.modules.get(path) {
            return handle;
        }

        let evaluation = self.create_promise();
        // Failures surface through importers or the loop, never as
        // unhandled rejections of this promise
        evaluation.borrow_mut().handled = true;
        let handle = Rc::new(RefCell::new(ModuleRecord::new(path, evaluation, main)));
        self.modules.insert(handle.clone());
        self.set_module_state(&handle, ModuleState::Loading);

        self.modules.linking.push(path.to_path_buf());
        let linked = self.link_module(&handle);
        self.modules.linking.pop();

        match linked {
            Ok(pending) => self.evaluate_when_ready(&handle, pending),
            Err(error) => self.fail_module(&handle, error),
        }
        handle
    }

    /// Read, compile, and load every import. Returns the evaluation promises
    /// of imports that have not finished evaluating yet.
    fn link_module(&mut self, handle: &ModuleHandle) -> std::result::Result<Vec<PromiseRef>, Value> {
        let path = handle.borrow().path.clone();
        let source = self.modules.sources.read(&path)?;
        let compiled = self.modules.compiler.compile(&path, &source)?;

        let mut pending = Vec::new();
        let mut dependencies = Vec::with_capacity(compiled.imports.len());
        let mut imports = HashMap::default();
        for specifier in &compiled.imports {
            let dep_path = self.modules.resolve(specifier, Some(&path))?;
            if self.modules.is_linking(&dep_path) {
                return Err(Error::Module(messages::circular_import(
                    &dep_path.display().to_string(),
                ))
                .into());
            }

            let dep = self.load_inner(&dep_path, false);
            let dep = dep.borrow();
            match dep.state {
                ModuleState::Failed => return Err(dep.error.clone().unwrap_or_default()),
                ModuleState::Evaluated => {}
                _ => pending.push(dep.evaluation.clone()),
            }
            dependencies.push(dep_path.clone());
            imports.insert(specifier.clone(), dep.namespace.clone());
        }

        let mut record = handle.borrow_mut();
        record.body = Some(compiled.body);
        record.dependencies = dependencies;
        record.imports = imports;
        Ok(pending)
    }

    fn evaluate_when_ready(&mut self, handle: &ModuleHandle, pending: Vec<PromiseRef>) {
        if pending.is_empty() {
            self.run_module_body(handle);
            return;
        }

        tracing::debug!(
            module = %handle.borrow().url(),
            waiting = pending.len(),
            "module waiting on imports"
        );
        let remaining = Rc::new(Cell::new(pending.len()));
        for promise in pending {
            let ready = {
                let handle = handle.clone();
                let remaining = remaining.clone();
                move |rt: &mut Runtime, _: Value| {
                    if handle.borrow().state == ModuleState::Loading {
                        remaining.set(remaining.get() - 1);
                        if remaining.get() == 0 {
                            rt.run_module_body(&handle);
                        }
                    }
                    Ok(Value::Undefined)
                }
            };
            let failed = {
                let handle = handle.clone();
                move |rt: &mut Runtime, reason: Value| {
                    if handle.borrow().state == ModuleState::Loading {
                        rt.fail_module(&handle, reason);
                    }
                    Ok(Value::Undefined)
                }
            };
            self.perform_then(&promise, PromiseReaction::native(ready, failed));
        }
    }

    fn run_module_body(&mut self, handle: &ModuleHandle) {
        let (body, scope) = {
            let record = handle.borrow();
            (record.body.clone(), record.scope())
        };
        let Some(body) = body else {
            let error = Error::Module(format!("module '{}' has no body", scope.url()));
            self.fail_module(handle, error.into());
            return;
        };
        self.set_module_state(handle, ModuleState::Evaluating);

        let url = scope.url().to_string();
        let frame: Rc<dyn AsyncBody> = Rc::new(ModuleFrame { body, scope });
        let result = self.call_async(&url, frame, Vec::new());

        let (state, value) = {
            let p = result.borrow();
            (p.state, p.result.clone().unwrap_or_default())
        };
        match state {
            PromiseState::Fulfilled => self.finish_module(handle),
            PromiseState::Rejected => {
                self.mark_handled(&result);
                self.fail_module(handle, value);
            }
            PromiseState::Pending => {
                let done = {
                    let handle = handle.clone();
                    move |rt: &mut Runtime, _: Value| {
                        rt.finish_module(&handle);
                        Ok(Value::Undefined)
                    }
                };
                let failed = {
                    let handle = handle.clone();
                    move |rt: &mut Runtime, reason: Value| {
                        rt.fail_module(&handle, reason);
                        Ok(Value::Undefined)
                    }
                };
                self.perform_then(&result, PromiseReaction::native(done, failed));
            }
        }
    }

    fn finish_module(&mut self, handle: &ModuleHandle) {
        self.set_module_state(handle, ModuleState::Evaluated);
        let (evaluation, namespace) = {
            let record = handle.borrow();
            (record.evaluation.clone(), record.namespace.clone())
        };
        self.fulfill_promise(&evaluation, Value::Namespace(namespace));
    }

    fn fail_module(&mut self, handle: &ModuleHandle, error: Value) {
        let evaluation = {
            let mut record = handle.borrow_mut();
            if matches!(record.state, ModuleState::Evaluated | ModuleState::Failed) {
                return;
            }
            record.error = Some(error.clone());
            record.evaluation.clone()
        };
        tracing::debug!(module = %handle.borrow().url(), error = %error, "module failed");
        self.set_module_state(handle, ModuleState::Failed);
        self.reject_promise(&evaluation, error);
    }

    fn set_module_state(&mut self, handle: &ModuleHandle, state: ModuleState) {
        let mut record = handle.borrow_mut();
        tracing::debug!(module = %record.url(), from = %record.state, to = %state, "module state");
        record.state = state;
    }
}
