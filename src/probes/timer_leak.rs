//! An async function running a hundred thousand sequential zero-delay sleeps
//! must not leave timer entries behind.

use super::Probe;
use crate::modules::{CompiledModule, ModuleScope, NativeCompiler};
use crate::runtime::{FrameState, Resume, Runtime, Step, Value};

const ITERATIONS: f64 = 100_000.0;

const MAIN_JS: &str = r#"(async () => {
    for (let i = 0; i < 100000; i++) {
        await sleep(0);
    }
    exit(0);
})();
"#;

pub(super) const PROBE: Probe = Probe {
    name: "timer-leak",
    description: "100000 sequential `await sleep(0)` inside an async function, then exit(0)",
    entry: "main.js",
    files: &[("main.js", MAIN_JS)],
    expected_reports: &[],
    expected_exit: 0,
    register,
};

fn register(compiler: &mut NativeCompiler) {
    compiler.register("main.js", CompiledModule::synchronous(&[], main));
}

fn main(rt: &mut Runtime, _: &ModuleScope) -> Result<(), Value> {
    rt.call(&Value::async_function("sleeper", sleeper), &[])?;
    Ok(())
}

fn sleeper(
    rt: &mut Runtime,
    frame: &mut FrameState,
    resume: Resume,
) -> Result<Step, Value> {
    // local 0: loop counter
    if frame.resume_point == 0 {
        frame.set_local(0, Value::Number(0.0));
    } else {
        resume.into_completion()?;
    }

    let i = frame.local(0).as_number().unwrap_or(ITERATIONS);
    if i < ITERATIONS {
        frame.set_local(0, Value::Number(i + 1.0));
        let slept = rt.call_global("sleep", &[Value::Number(0.0)])?;
        return frame.suspend_at(1, slept);
    }

    rt.call_global("exit", &[Value::Number(0.0)])?;
    Ok(Step::Return(Value::Undefined))
}
