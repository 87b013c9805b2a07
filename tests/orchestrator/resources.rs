//! Resource reuse, lock lifetimes and registry snapshots driven through
//! real test runs.

use piilop::prelude::*;
use serde_json::Value;

use crate::common::*;

fn creates(monitor: &Monitor) -> usize {
    monitor
        .logs()
        .iter()
        .filter(|l| l.as_str() == "POST examples/grandparents")
        .count()
}

#[tokio::test]
async fn test_instances_are_reused_across_tests() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    let grandparents = create_grandparents(&monitor, &mut registry);

    for name in ["examples reuse one", "examples reuse two"] {
        let rm = grandparents.clone();
        registry
            .register(TestEntry::new(name, "grandparents", move |ctx: Context| {
                let rm = rm.clone();
                async move {
                    let data = rm
                        .find_data(&ctx, SearchSpec::<Grandparent>::new(provider("aws")))
                        .await?;
                    check(data.id == "TN-0", format!("expected TN-0, got {}", data.id))
                }
            }))
            .unwrap();
    }
    let main = runner(&monitor, registry);

    let report = main.run_test(RunOptions::new()).await.unwrap();
    assert!(report.is_success(), "{:?}", report.outcomes());
    assert_eq!(creates(&monitor), 1);

    let active = grandparents.active();
    assert_eq!(active.len(), 1);
    assert!(!active[0].lock().is_locked());
}

#[tokio::test]
async fn test_release_level_holds_lock_until_test_ends() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    let grandparents = create_grandparents(&monitor, &mut registry);

    let rm = grandparents.clone();
    registry
        .register(TestEntry::new(
            "examples hold grandparent",
            "grandparents",
            move |ctx: Context| {
                let rm = rm.clone();
                async move {
                    let cell = ctx
                        .run("examples borrow grandparent", |helper| async move {
                            let spec = SearchSpec::<Grandparent>::new(provider("azure")).release_level(1);
                            rm.find_state(&helper, spec).await
                        })
                        .await?;
                    let state = cell.lock();
                    check(
                        state.locked_by.as_deref() == Some("examples borrow grandparent"),
                        format!("lock released early: {:?}", state.locked_by),
                    )
                }
            },
        ))
        .unwrap();
    let main = runner(&monitor, registry);

    let report = main
        .run_test(RunOptions::new().name_prefix("examples hold"))
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report.outcomes());

    let active = grandparents.active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].lock().data.favorite_provider, "azure");
    assert!(!active[0].lock().is_locked());
}

#[tokio::test]
async fn test_release_past_root_is_rejected_and_unlocks() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    let grandparents = create_grandparents(&monitor, &mut registry);
    let ctx = Context::new(monitor.observer());

    let spec = SearchSpec::<Grandparent>::new(provider("aws")).release_level(1);
    let err = grandparents.find_state(&ctx, spec).await.unwrap_err();
    assert!(matches!(err, Error::DeferPastRoot { level: 1 }));
    assert!(!grandparents.active()[0].lock().is_locked());
}

#[tokio::test]
async fn test_snapshot_survives_json_text() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    create_parents(&monitor, &mut registry);
    let main = runner(&monitor, registry);
    main.run_test(RunOptions::new()).await.unwrap();

    let text = main.registry().resources().save().unwrap().to_string();

    let fresh_monitor = Monitor::new();
    let mut fresh = TestRegistry::new();
    let fresh_parents = create_parents(&fresh_monitor, &mut fresh);
    let fresh_main = runner(&fresh_monitor, fresh);
    let snapshot: Value = serde_json::from_str(&text).unwrap();
    fresh_main.registry().resources().load(&snapshot).unwrap();

    assert_eq!(resource_info(&fresh_main), resource_info(&main));
    assert_eq!(fresh_parents.deleted().len(), 2);
    assert!(fresh_parents.active().is_empty());
}

#[tokio::test]
async fn test_load_requires_every_kind() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    let parents = create_parents(&monitor, &mut registry);
    let main = runner(&monitor, registry);
    main.run_test(RunOptions::new().name_prefix("examples create_parent"))
        .await
        .unwrap();
    let before = resource_info(&main);

    let mut snapshot = main.registry().resources().save().unwrap();
    snapshot.as_object_mut().unwrap().remove("grandparents");
    let err = main.registry().resources().load(&snapshot).unwrap_err();
    assert!(matches!(err, Error::MissingResourceData(ref kind) if kind == "grandparents"));

    // neither kind was touched
    assert_eq!(resource_info(&main), before);
    assert_eq!(parents.active().len(), 2);
}

#[tokio::test]
async fn test_get_or_create_and_delete() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    let grandparents = create_grandparents(&monitor, &mut registry);
    let ctx = Context::new(monitor.observer());

    // nothing matches, so one is created and deleted straight away
    grandparents
        .get_or_create_and_delete(&ctx, |s: &State<Grandparent>| !s.is_locked(), provider("gcp"))
        .await
        .unwrap();
    assert_eq!(creates(&monitor), 1);
    assert!(grandparents.active().is_empty());

    let gone = grandparents.deleted();
    assert_eq!(gone.len(), 1);
    assert_eq!(gone[0].lock().locked_by.as_deref(), Some("delete"));
    assert!(monitor.logs().contains(&"DELETE examples/grandparents/TN-0".to_string()));
}

#[tokio::test]
async fn test_clean_deletes_everything_left_active() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    let parents = create_parents(&monitor, &mut registry);
    let main = runner(&monitor, registry);
    main.run_test(RunOptions::new().name_prefix("examples create_parent"))
        .await
        .unwrap();
    assert_eq!(parents.active().len(), 2);

    let resources = main.registry().resources();
    resources.clean(main.root()).await.unwrap();

    for kind in resources.names() {
        assert_eq!(resources.get(&kind).unwrap().active_count(), 0, "{}", kind);
    }
    assert_eq!(parents.deleted().len(), 2);
    assert!(monitor
        .logs()
        .contains(&"DELETE examples/grandparents/TN-4".to_string()));

    resources.clear();
    assert!(parents.deleted().is_empty());
}
