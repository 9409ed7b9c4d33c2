//! Integration tests running the bundled probes

mod common;
use jobloop::modules::FsSource;
use jobloop::probes;
use jobloop::{ErrorKind, ExitReason, RuntimeConfig};
use pretty_assertions::assert_eq;
use std::rc::Rc;
use tempfile::tempdir;

#[test]
fn test_all_probes_pass_in_memory() {
    for probe in probes::all() {
        let outcome = probe.run(RuntimeConfig::new().with_code_dir(common::ROOT)).unwrap();
        assert!(outcome.passed(probe), "{}: {:?}", probe.name, outcome.mismatches(probe));
    }
}

#[test]
fn test_import_promise_from_disk() {
    let dir = tempdir().unwrap();
    let probe = probes::find("import-promise").unwrap();
    probe.write_sources(dir.path()).unwrap();
    assert!(dir.path().join("main.js").is_file());
    assert!(dir.path().join("imported.js").is_file());

    let config = RuntimeConfig::new().with_code_dir(dir.path());
    let outcome = probe.run_with_sources(config, Rc::new(FsSource)).unwrap();

    assert_eq!(outcome.reports, vec!["before", "after", "then"]);
    assert_eq!(outcome.result.exit, ExitReason::Forced(0));
    assert_eq!(outcome.result.final_time, 200);
    assert_eq!(outcome.result.discarded.frames, 0);
    assert!(outcome.passed(probe));
}

#[test]
fn test_probe_without_sources_on_disk_fails_to_resolve() {
    let dir = tempdir().unwrap();
    let probe = probes::find("task-ordering").unwrap();
    let config = RuntimeConfig::new().with_code_dir(dir.path());

    let error = probe.run_with_sources(config, Rc::new(FsSource)).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ResolutionError);
}

#[test]
fn test_timer_leak_leaves_no_timers() {
    let probe = probes::find("timer-leak").unwrap();
    let outcome = probe.run(RuntimeConfig::new()).unwrap();

    assert_eq!(outcome.result.exit, ExitReason::Forced(0));
    assert_eq!(outcome.result.discarded.timers, 0);
    assert_eq!(outcome.result.macrotasks_processed, 100_000);
    assert_eq!(outcome.result.discarded.frames, 0);
    assert_eq!(outcome.result.final_time, 0);
}

#[test]
fn test_module_singleton_nested_layout_on_disk() {
    let dir = tempdir().unwrap();
    let probe = probes::find("module-singleton").unwrap();
    probe.write_sources(dir.path()).unwrap();
    assert!(dir.path().join("lib").join("b.js").is_file());

    let config = RuntimeConfig::new().with_code_dir(dir.path());
    let outcome = probe.run_with_sources(config, Rc::new(FsSource)).unwrap();
    assert_eq!(outcome.reports, vec!["shared", "a", "b", "same"]);
    assert_eq!(outcome.result.exit, ExitReason::Quiescent);
}
