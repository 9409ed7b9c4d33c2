//! Imported promise-returning function awaited inside an async function,
//! with a `.then` on that function's result and a later exit timer.

use super::Probe;
use crate::modules::{CompiledModule, ModuleScope, NativeCompiler};
use crate::runtime::{Runtime, Step, Value};

const MAIN_JS: &str = r#"import { delay } from './imported.js';

async function main() {
    report("before");
    await delay(100);
    report("after");
}

setTimeout(() => { exit(0) }, 200);
main().then(() => { report("then") });
"#;

const IMPORTED_JS: &str = r#"export function delay(ms) {
    return new Promise((resolve) => setTimeout(resolve, ms));
}
"#;

pub(super) const PROBE: Probe = Probe {
    name: "import-promise",
    description: "await an imported delay() inside async main, then exit from a timer",
    entry: "main.js",
    files: &[("main.js", MAIN_JS), ("imported.js", IMPORTED_JS)],
    expected_reports: &["before", "after", "then"],
    expected_exit: 0,
    register,
};

fn register(compiler: &mut NativeCompiler) {
    compiler
        .register("imported.js", CompiledModule::synchronous(&[], imported))
        .register("main.js", CompiledModule::synchronous(&["./imported.js"], main));
}

fn imported(_: &mut Runtime, scope: &ModuleScope) -> Result<(), Value> {
    let delay = Value::native("delay", |rt, args| {
        let ms = args.first().cloned().unwrap_or_default();
        let capability = rt.new_promise_capability();
        rt.call_global("setTimeout", &[capability.resolve, ms])?;
        Ok(Value::Promise(capability.promise))
    });
    scope.export("delay", delay);
    Ok(())
}

fn main(rt: &mut Runtime, scope: &ModuleScope) -> Result<(), Value> {
    let delay = scope.imported("./imported.js", "delay")?;
    let main = Value::async_function("main", move |rt, frame, resume| {
        match frame.resume_point {
            0 => {
                rt.call_global("report", &[Value::from("before")])?;
                let pending = rt.call(&delay, &[Value::Number(100.0)])?;
                frame.suspend_at(1, pending)
            }
            _ => {
                resume.into_completion()?;
                rt.call_global("report", &[Value::from("after")])?;
                Ok(Step::Return(Value::Undefined))
            }
        }
    });

    let exit_later = Value::native("", |rt, _| rt.call_global("exit", &[Value::Number(0.0)]));
    rt.call_global("setTimeout", &[exit_later, Value::Number(200.0)])?;

    let result = rt.call(&main, &[])?;
    let on_done = Value::native("", |rt, _| rt.call_global("report", &[Value::from("then")]));
    rt.then(&result, Some(on_done), None)?;
    Ok(())
}
