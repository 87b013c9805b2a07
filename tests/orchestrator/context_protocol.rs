//! Failure classification across nested frames, deferral timing and
//! fail-fast behaviour.

use piilop::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Zone {
    id: String,
    provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneOptions {
    provider: String,
}

impl Resource for Zone {
    type CreateOptions = ZoneOptions;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A zones kind whose create function always fails, used by one test.
fn broken_zones(registry: &mut TestRegistry) {
    let zones = registry.new_manager::<Zone>("zones").unwrap();
    zones
        .register_wrapped_create_fn(
            |o: &ZoneOptions| format!("examples create_zone {}", o.provider),
            |_ctx: Context, _options: ZoneOptions| async {
                Err::<Zone, _>(Error::action("quota exceeded"))
            },
        )
        .unwrap();

    let rm = zones.clone();
    registry
        .register(TestEntry::new(
            "examples use_zone aws",
            "zones",
            move |ctx: Context| {
                let rm = rm.clone();
                async move {
                    let spec = SearchSpec::<Zone>::new(ZoneOptions {
                        provider: "aws".into(),
                    });
                    rm.find_data_and_call(&ctx, spec, |_zone| async { Ok(()) })
                        .await
                }
            },
        ))
        .unwrap();
}

fn failing(name: &str) -> TestEntry {
    let message = format!("{} broke", name);
    TestEntry::new(name, "flaky", move |_ctx: Context| {
        let message = message.clone();
        async move { Err(Error::assertion(message)) }
    })
}

fn passing(name: &str) -> TestEntry {
    TestEntry::new(name, "flaky", |_ctx: Context| async { Ok(()) })
}

#[tokio::test]
async fn test_nested_failure_skips_the_enclosing_test() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    broken_zones(&mut registry);
    let main = runner(&monitor, registry);

    let report = main.run_test(RunOptions::new()).await.unwrap();

    assert_eq!(
        monitor.logs(),
        vec![
            "START examples use_zone aws",
            "START examples create_zone aws",
            "FINISH examples create_zone aws :: failed",
            "TEST FAILED!\n\ttest: examples use_zone aws -> examples create_zone aws\n\terror:quota exceeded",
            "FINISH examples use_zone aws :: skipped",
            "TEST SKIPPED:\n\ttest: examples use_zone aws",
        ]
    );

    let outcome = report.outcome("examples use_zone aws").unwrap();
    assert_eq!(outcome.status, TestStatus::Skipped);
    assert_eq!(outcome.error.as_deref(), Some("quota exceeded"));
    assert_eq!(report.skipped(), 1);
    assert!(!report.is_success());

    // nothing was cached by the failed create
    assert_eq!(main.registry().resources().get("zones").unwrap().active_count(), 0);
}

#[tokio::test]
async fn test_direct_failure_is_reported_once() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    registry.register(failing("flaky one")).unwrap();
    let main = runner(&monitor, registry);

    let report = main.run_test(RunOptions::new()).await.unwrap();
    assert_eq!(
        monitor.logs(),
        vec![
            "START flaky one",
            "FINISH flaky one :: failed",
            "TEST FAILED!\n\ttest: flaky one\n\terror:assertion failed: flaky one broke",
        ]
    );
    assert_eq!(report.outcome("flaky one").unwrap().status, TestStatus::Failed);
    assert_eq!(report.failed(), 1);
}

#[tokio::test]
async fn test_run_continues_after_failure_by_default() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    registry.register(passing("flaky a")).unwrap();
    registry.register(failing("flaky b")).unwrap();
    registry.register(passing("flaky c")).unwrap();
    let main = runner(&monitor, registry);

    let report = main.run_test(RunOptions::new()).await.unwrap();
    let statuses: Vec<_> = report
        .outcomes()
        .iter()
        .map(|o| (o.name.as_str(), o.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("flaky a", TestStatus::Passed),
            ("flaky b", TestStatus::Failed),
            ("flaky c", TestStatus::Passed),
        ]
    );
}

#[tokio::test]
async fn test_fail_fast_stops_after_first_failure() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    registry.register(passing("flaky a")).unwrap();
    registry.register(failing("flaky b")).unwrap();
    registry.register(passing("flaky c")).unwrap();
    let main = runner(&monitor, registry);

    let report = main
        .run_test(RunOptions::new().fail_fast(true))
        .await
        .unwrap();
    assert_eq!(report.outcomes().len(), 2);
    assert!(report.outcome("flaky c").is_none());
    assert!(!monitor.logs().iter().any(|l| l.contains("flaky c")));
}

#[tokio::test]
async fn test_deferred_callbacks_run_before_finish() {
    let monitor = Monitor::new();
    let root = Context::new(monitor.observer());

    let m = monitor.clone();
    root.run("outer", |outer| async move {
        let m2 = m.clone();
        outer.defer(0, move || m2.log("released outer"))?;
        outer
            .run("inner", |inner| async move {
                let m3 = m.clone();
                // one level up: released when "outer" closes
                inner.defer(1, move || m3.log("released from inner"))?;
                m.log("inner body");
                Ok(())
            })
            .await
    })
    .await
    .unwrap();

    assert_eq!(
        monitor.logs(),
        vec![
            "START outer",
            "START inner",
            "inner body",
            "FINISH inner :: passed",
            "released outer",
            "released from inner",
            "FINISH outer :: passed",
        ]
    );
    assert!(root.is_root());
    assert_eq!(root.depth(), 0);
}

#[tokio::test]
async fn test_alias_frame_is_silent() {
    let monitor = Monitor::new();
    let root = Context::new(monitor.observer());

    root.run("create thing", |ctx| async move {
        ctx.run("create thing", |alias| async move {
            assert_eq!(alias.depth(), 1);
            Ok(())
        })
        .await
    })
    .await
    .unwrap();

    assert_eq!(
        monitor.logs(),
        vec!["START create thing", "FINISH create thing :: passed"]
    );
}

#[test]
fn test_breadcrumbs_follow_open_frames() {
    let monitor = Monitor::new();
    let root = Context::new(monitor.observer());
    let outer = root.begin("get cluster").unwrap();
    let inner = outer.begin("create network aws").unwrap();

    assert_eq!(inner.breadcrumbs(), vec!["get cluster", "create network aws"]);
    assert_eq!(inner.stack_info().render_breadcrumbs(), "get cluster -> create network aws");
    assert_eq!(inner.owner_tag(), "create network aws");

    // the outer frame cannot close while its child is open
    assert!(matches!(outer.clone().end(), Err(Error::FrameOrder { .. })));

    let outer = inner.end().unwrap();
    let root = outer.end().unwrap();
    assert!(matches!(root.end(), Err(Error::StackEmpty)));
}
