//! Shared test helpers for integration tests
#![allow(dead_code)]

use jobloop::modules::{CompiledModule, FsSource, MemorySource, NativeCompiler, SourceLoader};
use jobloop::runtime::{Completion, RecordingHost, ReportLog};
use jobloop::{EventLoop, Runtime, RuntimeConfig, Value};
use std::path::Path;
use std::rc::Rc;

/// Code directory used by in-memory module trees
pub const ROOT: &str = "/app";

/// A module tree under construction: native bodies plus the files they
/// stand for
pub struct App {
    config: RuntimeConfig,
    compiler: NativeCompiler,
    sources: MemorySource,
}

impl App {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::new().with_code_dir(ROOT))
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            compiler: NativeCompiler::new(config.resolved_code_dir()),
            sources: MemorySource::new(),
            config,
        }
    }

    /// Add a module at `relative`, backed by an in-memory source file
    pub fn module(mut self, relative: &str, module: CompiledModule) -> Self {
        let root = self.config.resolved_code_dir();
        self.sources.insert(root.join(relative), "// native");
        self.compiler.register(relative, module);
        self
    }

    /// Register a body without adding a source file for it
    pub fn body_only(mut self, relative: &str, module: CompiledModule) -> Self {
        self.compiler.register(relative, module);
        self
    }

    /// Build a runtime over the in-memory sources
    pub fn build(self) -> (Runtime, ReportLog) {
        let sources = Rc::new(self.sources.clone());
        self.build_with(sources)
    }

    /// Build a runtime reading sources from the configured code directory
    pub fn build_on_disk(self) -> (Runtime, ReportLog) {
        self.build_with(Rc::new(FsSource))
    }

    fn build_with(self, sources: Rc<dyn SourceLoader>) -> (Runtime, ReportLog) {
        let host = RecordingHost::new();
        let log = host.log();
        let rt = Runtime::with_sources(self.config, Box::new(host), Rc::new(self.compiler), sources);
        (rt, log)
    }

    /// Build, run `entry` to completion, and return the result with the
    /// reports it produced
    pub fn run(self, entry: &str) -> (jobloop::Result<jobloop::RunResult>, Vec<String>) {
        let (rt, log) = self.build();
        let result = EventLoop::new(rt).run_entry(entry);
        (result, log.entries())
    }
}

/// `report(message)` from native code
pub fn report(rt: &mut Runtime, message: &str) -> Completion {
    rt.call_global("report", &[Value::from(message)])
}

/// A function value that reports `label` when called
pub fn reporter(label: &'static str) -> Value {
    Value::native(label, move |rt, _| report(rt, label))
}

/// Write `files` under `dir`, creating parent directories
pub fn write_tree(dir: &Path, files: &[(&str, &str)]) {
    for (relative, text) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, text).unwrap();
    }
}
