//! Performance benchmarks for the jobloop scheduler
//!
//! Run with: cargo bench
//!
//! These benchmarks measure:
//! - Runtime construction
//! - Microtask drain throughput (promise chains, queueMicrotask)
//! - Timer ordering under the virtual clock
//! - Module graph loading
//! - The bundled probes end to end

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use jobloop::modules::{CompiledModule, MemorySource, NativeCompiler};
use jobloop::probes;
use jobloop::runtime::RecordingHost;
use jobloop::{EventLoop, Runtime, RuntimeConfig, Value};
use std::rc::Rc;

fn runtime(compiler: NativeCompiler, sources: MemorySource) -> Runtime {
    let config = RuntimeConfig::new().with_code_dir("/bench");
    Runtime::with_sources(config, Box::new(RecordingHost::new()), Rc::new(compiler), Rc::new(sources))
}

fn empty_runtime() -> Runtime {
    runtime(NativeCompiler::new("/bench"), MemorySource::new())
}

fn noop() -> Value {
    Value::native("noop", |_, _| Ok(Value::Undefined))
}

/// Benchmark: runtime construction and global installation
fn bench_cold_start(c: &mut Criterion) {
    c.bench_function("cold_start", |b| b.iter(|| black_box(empty_runtime())));
}

/// Benchmark: draining microtasks
fn bench_microtasks(c: &mut Criterion) {
    let mut group = c.benchmark_group("microtasks");

    for size in [100usize, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("queue_microtask", size), size, |b, &size| {
            b.iter(|| {
                let mut rt = empty_runtime();
                for _ in 0..size {
                    rt.queue_microtask(noop(), Vec::new());
                }
                black_box(rt.run_microtasks())
            })
        });

        group.bench_with_input(BenchmarkId::new("then_chain", size), size, |b, &size| {
            b.iter(|| {
                let mut rt = empty_runtime();
                let mut tail = Value::Promise(rt.resolved_promise(Value::Number(0.0)));
                for _ in 0..size {
                    tail = rt.then(&tail, Some(noop()), None).unwrap();
                }
                black_box(rt.run_microtasks())
            })
        });
    }

    group.finish();
}

/// Benchmark: timers through the event loop
fn bench_timers(c: &mut Criterion) {
    let mut group = c.benchmark_group("timers");

    for size in [100usize, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("reverse_delays", size), size, |b, &size| {
            b.iter(|| {
                let mut rt = empty_runtime();
                for delay in (0..size as u64).rev() {
                    rt.set_timeout(noop(), delay, Vec::new());
                }
                black_box(EventLoop::new(rt).run())
            })
        });

        group.bench_with_input(BenchmarkId::new("set_and_clear", size), size, |b, &size| {
            b.iter(|| {
                let mut rt = empty_runtime();
                let ids: Vec<_> = (0..size).map(|_| rt.set_timeout(noop(), 10, Vec::new())).collect();
                for id in ids {
                    rt.clear_timer(id);
                }
                black_box(EventLoop::new(rt).run())
            })
        });
    }

    group.finish();
}

/// Benchmark: loading a chain of modules
fn bench_module_loading(c: &mut Criterion) {
    let mut group = c.benchmark_group("modules");

    for depth in [10usize, 100].iter() {
        group.bench_with_input(BenchmarkId::new("import_chain", depth), depth, |b, &depth| {
            b.iter(|| {
                let mut compiler = NativeCompiler::new("/bench");
                let mut sources = MemorySource::new();
                for i in 0..depth {
                    let name = format!("m{}.js", i);
                    let next = format!("./m{}.js", i + 1);
                    let imports: Vec<&str> = if i + 1 < depth { vec![next.as_str()] } else { vec![] };
                    compiler.register(
                        &name,
                        CompiledModule::synchronous(&imports, |_, scope| {
                            scope.export("value", Value::Number(1.0));
                            Ok(())
                        }),
                    );
                    sources.insert(format!("/bench/{}", name), "// native");
                }
                let rt = runtime(compiler, sources);
                black_box(EventLoop::new(rt).run_entry("m0.js").unwrap())
            })
        });
    }

    group.finish();
}

/// Benchmark: bundled probes end to end
fn bench_probes(c: &mut Criterion) {
    let mut group = c.benchmark_group("probes");
    group.sample_size(20);

    for probe in probes::all() {
        group.bench_function(probe.name, |b| {
            b.iter(|| black_box(probe.run(RuntimeConfig::new().with_code_dir("/bench")).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cold_start,
    bench_microtasks,
    bench_timers,
    bench_module_loading,
    bench_probes,
);

criterion_main!(benches);
