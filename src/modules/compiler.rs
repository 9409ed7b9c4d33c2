//! Compiler interface
//!
//! Turning module source into something runnable is the job of an external
//! compiler. The loader only needs two things from it: the import specifiers
//! the module declares, in source order, and a resumable body.

use super::source::normalize;
use super::ModuleScope;
use crate::error::{Error, Result};
use crate::runtime::{FrameState, Resume, Runtime, Step, Value};
use rustc_hash::FxHashMap as HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A resumable module body
///
/// Same contract as [`AsyncBody`](crate::runtime::AsyncBody), with access to
/// the module's scope (exports, imported bindings, `import.meta`).
pub trait ModuleBody {
    fn step(
        &self,
        rt: &mut Runtime,
        scope: &ModuleScope,
        frame: &mut FrameState,
        resume: Resume,
    ) -> std::result::Result<Step, Value>;
}

impl<F> ModuleBody for F
where
    F: Fn(&mut Runtime, &ModuleScope, &mut FrameState, Resume) -> std::result::Result<Step, Value>,
{
    fn step(
        &self,
        rt: &mut Runtime,
        scope: &ModuleScope,
        frame: &mut FrameState,
        resume: Resume,
    ) -> std::result::Result<Step, Value> {
        self(rt, scope, frame, resume)
    }
}

/// Output of compiling one module
#[derive(Clone)]
pub struct CompiledModule {
    /// Import specifiers in declaration order
    pub imports: Vec<String>,
    pub body: Rc<dyn ModuleBody>,
}

impl CompiledModule {
    pub fn new<B>(imports: &[&str], body: B) -> Self
    where
        B: ModuleBody + 'static,
    {
        Self {
            imports: imports.iter().map(|s| s.to_string()).collect(),
            body: Rc::new(body),
        }
    }

    /// A module whose body never awaits
    pub fn synchronous<F>(imports: &[&str], body: F) -> Self
    where
        F: Fn(&mut Runtime, &ModuleScope) -> std::result::Result<(), Value> + 'static,
    {
        Self::new(
            imports,
            move |rt: &mut Runtime,
                  scope: &ModuleScope,
                  _: &mut FrameState,
                  _: Resume|
                  -> std::result::Result<Step, Value> {
                body(rt, scope)?;
                Ok(Step::Return(Value::Undefined))
            },
        )
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("imports", &self.imports)
            .finish_non_exhaustive()
    }
}

/// Compiles module source text
pub trait ModuleCompiler {
    fn compile(&self, path: &Path, source: &str) -> Result<CompiledModule>;
}

/// Compiler backed by natively written module bodies
///
/// Each module path under `root` is registered with a body written in Rust;
/// the source text itself is not interpreted. Probes and tests use it to
/// stand in for the real compiler.
#[derive(Default)]
pub struct NativeCompiler {
    root: PathBuf,
    modules: HashMap<PathBuf, CompiledModule>,
}

impl NativeCompiler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize(&root.into()),
            modules: HashMap::default(),
        }
    }

    /// Register the body for the module at `relative` (from the root)
    pub fn register(&mut self, relative: &str, module: CompiledModule) -> &mut Self {
        self.modules.insert(normalize(&self.root.join(relative)), module);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleCompiler for NativeCompiler {
    fn compile(&self, path: &Path, _source: &str) -> Result<CompiledModule> {
        self.modules
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| Error::compile(path, "no compiled body registered for module"))
    }
}
