//! Two importers reach one dependency through different relative paths;
//! it is evaluated once and both see the same binding.

use super::Probe;
use crate::modules::{CompiledModule, ModuleScope, NativeCompiler};
use crate::runtime::{Runtime, Value};

const MAIN_JS: &str = r#"import { counter as a } from './a.js';
import { counter as b } from './lib/b.js';

report(a === b ? "same" : "different");
"#;

const A_JS: &str = r#"import { counter } from './shared.js';
report("a");
export { counter };
"#;

const B_JS: &str = r#"import { counter } from '../shared.js';
report("b");
export { counter };
"#;

const SHARED_JS: &str = r#"report("shared");
export function counter() {}
"#;

pub(super) const PROBE: Probe = Probe {
    name: "module-singleton",
    description: "a shared dependency imported twice is evaluated once",
    entry: "main.js",
    files: &[
        ("main.js", MAIN_JS),
        ("a.js", A_JS),
        ("lib/b.js", B_JS),
        ("shared.js", SHARED_JS),
    ],
    expected_reports: &["shared", "a", "b", "same"],
    expected_exit: 0,
    register,
};

fn register(compiler: &mut NativeCompiler) {
    compiler
        .register("shared.js", CompiledModule::synchronous(&[], shared))
        .register(
            "a.js",
            CompiledModule::synchronous(&["./shared.js"], |rt, scope| {
                reexport(rt, scope, "./shared.js", "a")
            }),
        )
        .register(
            "lib/b.js",
            CompiledModule::synchronous(&["../shared.js"], |rt, scope| {
                reexport(rt, scope, "../shared.js", "b")
            }),
        )
        .register(
            "main.js",
            CompiledModule::synchronous(&["./a.js", "./lib/b.js"], main),
        );
}

fn shared(rt: &mut Runtime, scope: &ModuleScope) -> Result<(), Value> {
    rt.call_global("report", &[Value::from("shared")])?;
    scope.export("counter", Value::native("counter", |_, _| Ok(Value::Undefined)));
    Ok(())
}

fn reexport(rt: &mut Runtime, scope: &ModuleScope, from: &str, label: &str) -> Result<(), Value> {
    let counter = scope.imported(from, "counter")?;
    rt.call_global("report", &[Value::from(label)])?;
    scope.export("counter", counter);
    Ok(())
}

fn main(rt: &mut Runtime, scope: &ModuleScope) -> Result<(), Value> {
    let a = scope.imported("./a.js", "counter")?;
    let b = scope.imported("./lib/b.js", "counter")?;
    let verdict = if a.strict_equals(&b) { "same" } else { "different" };
    rt.call_global("report", &[Value::from(verdict)])?;
    Ok(())
}
