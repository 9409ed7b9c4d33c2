//! Bundled regression probes
//!
//! Each probe is a small module tree (the JavaScript it stands for is kept
//! alongside) compiled natively through [`NativeCompiler`], plus the reports
//! and exit status a correct scheduler must produce for it.

mod import_promise;
mod module_singleton;
mod task_ordering;
mod timer_leak;

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::event_loop::{EventLoop, RunResult};
use crate::modules::{MemorySource, NativeCompiler, SourceLoader};
use crate::runtime::{RecordingHost, Runtime};
use std::path::Path;
use std::rc::Rc;

/// A bundled regression scenario
pub struct Probe {
    pub name: &'static str,
    pub description: &'static str,
    /// Entry module, relative to the code directory
    pub entry: &'static str,
    /// Module sources as `(relative path, JavaScript)`
    pub files: &'static [(&'static str, &'static str)],
    pub expected_reports: &'static [&'static str],
    pub expected_exit: i32,
    register: fn(&mut NativeCompiler),
}

static PROBES: &[Probe] = &[
    import_promise::PROBE,
    timer_leak::PROBE,
    module_singleton::PROBE,
    task_ordering::PROBE,
];

/// Every bundled probe
pub fn all() -> &'static [Probe] {
    PROBES
}

/// Look up a probe by name
pub fn find(name: &str) -> Option<&'static Probe> {
    PROBES.iter().find(|p| p.name == name)
}

/// What a probe run produced
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub reports: Vec<String>,
    pub result: RunResult,
}

impl ProbeOutcome {
    /// Differences from the probe's expectations; empty when it passed
    pub fn mismatches(&self, probe: &Probe) -> Vec<String> {
        let mut problems = Vec::new();
        if self.reports != probe.expected_reports {
            problems.push(format!(
                "reports {:?}, expected {:?}",
                self.reports, probe.expected_reports
            ));
        }
        if self.result.exit_code() != probe.expected_exit {
            problems.push(format!(
                "exit status {}, expected {}",
                self.result.exit_code(),
                probe.expected_exit
            ));
        }
        if self.result.discarded.timers > 0 {
            problems.push(format!(
                "{} timers still registered at exit",
                self.result.discarded.timers
            ));
        }
        if let Some(error) = &self.result.entry_error {
            problems.push(format!("entry module failed: {}", error));
        }
        problems
    }

    pub fn passed(&self, probe: &Probe) -> bool {
        self.mismatches(probe).is_empty()
    }
}

impl Probe {
    /// Run against the bundled sources, placed under the configured code
    /// directory in memory
    pub fn run(&self, config: RuntimeConfig) -> Result<ProbeOutcome> {
        let root = config.resolved_code_dir();
        let mut sources = MemorySource::new();
        for (path, text) in self.files {
            sources.insert(root.join(path), text);
        }
        self.run_with_sources(config, Rc::new(sources))
    }

    /// Run reading module sources through `sources`
    pub fn run_with_sources(
        &self,
        config: RuntimeConfig,
        sources: Rc<dyn SourceLoader>,
    ) -> Result<ProbeOutcome> {
        let mut compiler = NativeCompiler::new(config.resolved_code_dir());
        (self.register)(&mut compiler);

        let host = RecordingHost::new();
        let log = host.log();
        let runtime = Runtime::with_sources(config, Box::new(host), Rc::new(compiler), sources);
        let mut event_loop = EventLoop::new(runtime);

        tracing::info!(probe = self.name, entry = self.entry, "running probe");
        let result = event_loop.run_entry(self.entry)?;
        Ok(ProbeOutcome {
            reports: log.entries(),
            result,
        })
    }

    /// Write the probe's JavaScript sources under `dir`
    pub fn write_sources(&self, dir: &Path) -> Result<()> {
        for (relative, text) in self.files {
            let path = dir.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            std::fs::write(&path, text).map_err(|e| Error::io(&path, e))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}
