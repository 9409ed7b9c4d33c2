//! ES Modules System
//!
//! Module loading, resolution, and evaluation sequencing.
//!
//! # Features
//! - Relative resolution (`./`, `../`) with a `.js` fallback
//! - One record per canonical path; each module evaluated at most once
//! - Imports evaluated depth-first, in declaration order, before the importer
//! - Top-level await: importers wait on a dependency's evaluation promise
//! - Cycle detection (cycles are reported, not resolved)
//!
//! # Example
//! ```text
//! // imported.js
//! export function delay(ms) { return new Promise(r => setTimeout(r, ms)); }
//!
//! // main.js
//! import { delay } from './imported.js';
//! await delay(10);
//! report(import.meta.url);
//! ```

mod compiler;
mod evaluate;
mod source;

pub use compiler::{CompiledModule, ModuleBody, ModuleCompiler, NativeCompiler};
pub use source::{normalize, FsSource, MemorySource, SourceLoader};

use crate::error::{messages, Error, Result};
use crate::runtime::{Namespace, PromiseRef, Value};
use rustc_hash::FxHashMap as HashMap;
use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Module state during loading
///
/// Transitions only move forward: `Unresolved → Loading → Evaluating →
/// {Evaluated, Failed}`, with `Loading → Failed` for load-time errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Record created, nothing fetched yet
    Unresolved,
    /// Source read and compiled; dependencies loading or still evaluating
    Loading,
    /// Body running (possibly suspended on a top-level await)
    Evaluating,
    /// Body completed
    Evaluated,
    /// Loading or evaluation failed
    Failed,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Unresolved => "unresolved",
            ModuleState::Loading => "loading",
            ModuleState::Evaluating => "evaluating",
            ModuleState::Evaluated => "evaluated",
            ModuleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// `import.meta` contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportMeta {
    pub url: String,
    /// True only for the entry module
    pub main: bool,
}

/// A module in the graph
pub struct ModuleRecord {
    /// Canonical path
    pub path: PathBuf,
    pub state: ModuleState,
    /// Settles when the body finishes (fulfilled with the namespace) or the
    /// module fails (rejected with the error)
    pub evaluation: PromiseRef,
    /// Exports, shared with every importer
    pub namespace: Rc<Namespace>,
    /// Canonical paths of imports, in declaration order
    pub dependencies: Vec<PathBuf>,
    /// Import specifier to the imported module's namespace
    imports: HashMap<String, Rc<Namespace>>,
    body: Option<Rc<dyn ModuleBody>>,
    /// Originating error once `Failed`
    pub error: Option<Value>,
    pub main: bool,
}

impl ModuleRecord {
    fn new(path: &Path, evaluation: PromiseRef, main: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            state: ModuleState::Unresolved,
            evaluation,
            namespace: Rc::new(Namespace::new(path.display().to_string())),
            dependencies: Vec::new(),
            imports: HashMap::default(),
            body: None,
            error: None,
            main,
        }
    }

    /// Module URL (the canonical path as a string)
    pub fn url(&self) -> &str {
        self.namespace.url()
    }

    fn scope(&self) -> ModuleScope {
        ModuleScope {
            namespace: self.namespace.clone(),
            imports: self.imports.clone(),
            meta: ImportMeta {
                url: self.url().to_string(),
                main: self.main,
            },
        }
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("dependencies", &self.dependencies)
            .field("error", &self.error)
            .finish()
    }
}

/// Shared handle to a module record
pub type ModuleHandle = Rc<RefCell<ModuleRecord>>;

/// What a running module body can see
#[derive(Debug, Clone)]
pub struct ModuleScope {
    namespace: Rc<Namespace>,
    imports: HashMap<String, Rc<Namespace>>,
    meta: ImportMeta,
}

impl ModuleScope {
    pub fn url(&self) -> &str {
        &self.meta.url
    }

    /// `import.meta`
    pub fn meta(&self) -> &ImportMeta {
        &self.meta
    }

    /// `export <name> = value`
    pub fn export(&self, name: &str, value: Value) {
        self.namespace.set(name, value);
    }

    /// This module's own namespace
    pub fn namespace(&self) -> Rc<Namespace> {
        self.namespace.clone()
    }

    /// `import * as ns from '<specifier>'`
    pub fn import_namespace(&self, specifier: &str) -> std::result::Result<Value, Value> {
        self.imports
            .get(specifier)
            .map(|ns| Value::Namespace(ns.clone()))
            .ok_or_else(|| self.not_imported(specifier))
    }

    /// `import { <name> } from '<specifier>'`
    pub fn imported(&self, specifier: &str, name: &str) -> std::result::Result<Value, Value> {
        let namespace = self
            .imports
            .get(specifier)
            .ok_or_else(|| self.not_imported(specifier))?;
        namespace.get(name).ok_or_else(|| {
            Error::Module(messages::export_not_found(name, namespace.url())).into()
        })
    }

    fn not_imported(&self, specifier: &str) -> Value {
        Error::Module(format!(
            "'{}' is not imported by module '{}'",
            specifier,
            self.url()
        ))
        .into()
    }
}

/// All module records of a runtime, plus the collaborators used to load them
pub struct ModuleGraph {
    records: HashMap<PathBuf, ModuleHandle>,
    /// Modules currently being linked, innermost last
    linking: Vec<PathBuf>,
    compiler: Rc<dyn ModuleCompiler>,
    sources: Rc<dyn SourceLoader>,
    root: PathBuf,
}

impl ModuleGraph {
    pub fn new(
        root: impl Into<PathBuf>,
        compiler: Rc<dyn ModuleCompiler>,
        sources: Rc<dyn SourceLoader>,
    ) -> Self {
        Self {
            records: HashMap::default(),
            linking: Vec::new(),
            compiler,
            sources,
            root: normalize(&root.into()),
        }
    }

    /// Code directory all paths are rooted at
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an import specifier against the importing module (or the code
    /// directory when there is no referrer)
    pub fn resolve(&self, specifier: &str, referrer: Option<&Path>) -> Result<PathBuf> {
        let base = referrer.and_then(Path::parent).unwrap_or(&self.root);
        let referrer_name = referrer
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| self.root.display().to_string());

        if !(specifier.starts_with("./") || specifier.starts_with("../")) {
            tracing::debug!(specifier, reason = messages::BARE_SPECIFIER, "unresolvable specifier");
            return Err(Error::resolution(specifier, referrer_name));
        }
        self.find(base.join(specifier))
            .ok_or_else(|| Error::resolution(specifier, referrer_name))
    }

    /// Resolve the entry module path, relative to the code directory
    pub fn resolve_entry(&self, entry: &str) -> Result<PathBuf> {
        self.find(self.root.join(entry))
            .ok_or_else(|| Error::resolution(entry, self.root.display().to_string()))
    }

    fn find(&self, candidate: PathBuf) -> Option<PathBuf> {
        let candidate = normalize(&candidate);
        if self.sources.exists(&candidate) {
            return Some(candidate);
        }
        if candidate.extension().is_none() {
            let with_js = candidate.with_extension("js");
            if self.sources.exists(&with_js) {
                return Some(with_js);
            }
        }
        None
    }

    /// Look up a record by canonical path
    pub fn get(&self, path: &Path) -> Option<ModuleHandle> {
        self.records.get(path).cloned()
    }

    /// State of the module at `path`, if it has a record
    pub fn state(&self, path: &Path) -> Option<ModuleState> {
        self.records.get(path).map(|m| m.borrow().state)
    }

    /// Canonical paths of every record, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.records.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn insert(&mut self, handle: ModuleHandle) {
        let path = handle.borrow().path.clone();
        self.records.insert(path, handle);
    }

    fn is_linking(&self, path: &Path) -> bool {
        self.linking.iter().any(|p| p == path)
    }
}

impl fmt::Debug for ModuleGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleGraph")
            .field("root", &self.root)
            .field("modules", &self.records.len())
            .field("linking", &self.linking)
            .finish()
    }
}
