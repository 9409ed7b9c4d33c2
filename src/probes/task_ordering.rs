//! Synchronous code, promise reactions, `queueMicrotask` and timers
//! interleave in the standard order.

use super::Probe;
use crate::modules::{CompiledModule, ModuleScope, NativeCompiler};
use crate::runtime::{Runtime, Value};

const MAIN_JS: &str = r#"report("sync start");
setTimeout(() => report("timeout 50"), 50);
setTimeout(() => report("timeout 0"), 0);
Promise.resolve()
    .then(() => report("then 1"))
    .then(() => report("then 2"));
queueMicrotask(() => report("microtask"));
report("sync end");
"#;

pub(super) const PROBE: Probe = Probe {
    name: "task-ordering",
    description: "sync code, then microtasks in FIFO order, then timers by delay",
    entry: "main.js",
    files: &[("main.js", MAIN_JS)],
    expected_reports: &[
        "sync start",
        "sync end",
        "then 1",
        "microtask",
        "then 2",
        "timeout 0",
        "timeout 50",
    ],
    expected_exit: 0,
    register,
};

fn register(compiler: &mut NativeCompiler) {
    compiler.register("main.js", CompiledModule::synchronous(&[], main));
}

fn reporter(message: &'static str) -> Value {
    Value::native("", move |rt, _| {
        rt.call_global("report", &[Value::from(message)])
    })
}

fn main(rt: &mut Runtime, _: &ModuleScope) -> Result<(), Value> {
    rt.call_global("report", &[Value::from("sync start")])?;
    rt.call_global("setTimeout", &[reporter("timeout 50"), Value::Number(50.0)])?;
    rt.call_global("setTimeout", &[reporter("timeout 0"), Value::Number(0.0)])?;

    let resolved = Value::Promise(rt.resolved_promise(Value::Undefined));
    let first = rt.then(&resolved, Some(reporter("then 1")), None)?;
    rt.then(&first, Some(reporter("then 2")), None)?;

    rt.call_global("queueMicrotask", &[reporter("microtask")])?;
    rt.call_global("report", &[Value::from("sync end")])?;
    Ok(())
}
