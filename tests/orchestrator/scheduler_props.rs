//! Plan errors surface before anything runs; plans respect every edge.

use piilop::prelude::*;
use proptest::prelude::*;
use proptest::sample::Index;

use crate::common::*;

fn noop(name: &str, suite: &str) -> TestEntry {
    TestEntry::new(name, suite, |_ctx: Context| async { Ok(()) })
}

#[tokio::test]
async fn test_cycle_is_reported_before_running() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    registry
        .register(noop("alpha create", "alpha").with_depends_on(["beta"]))
        .unwrap();
    registry
        .register(noop("beta create", "beta").with_depends_on(["alpha"]))
        .unwrap();
    let main = runner(&monitor, registry);

    let err = main.run_test(RunOptions::new()).await.unwrap_err();
    assert!(matches!(err, Error::DependencyCycle { .. }), "{}", err);
    assert!(err.is_configuration());
    assert!(monitor.logs().is_empty());
    assert!(main.show_test_list(&mut |_: &str| {}).is_err());
}

#[tokio::test]
async fn test_unknown_dependency_is_reported() {
    let monitor = Monitor::new();
    let mut registry = TestRegistry::new();
    registry
        .register(noop("alpha create", "alpha").with_depends_on(["gamma"]))
        .unwrap();
    let main = runner(&monitor, registry);

    let err = main.run_test(RunOptions::new()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "test \"alpha create\" has a dependency \"gamma\" which was not found"
    );
    assert!(monitor.logs().is_empty());
}

#[test]
fn test_prefix_tokens_match_names() {
    let mut registry = TestRegistry::new();
    registry.register(noop("report", "reports").with_depends_on(["setup "])).unwrap();
    registry.register(noop("setup network", "infra")).unwrap();
    registry.register(noop("setup cluster", "infra")).unwrap();
    let plan: Vec<String> = registry.plan().unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(plan, vec!["setup network", "setup cluster", "report"]);
}

fn priority(n: usize) -> Priority {
    match n {
        0 => Priority::First,
        1 => Priority::Normal,
        _ => Priority::Last,
    }
}

/// `(priority, dependencies on earlier entries)` per entry
fn layouts() -> impl Strategy<Value = Vec<(usize, Vec<Index>)>> {
    prop::collection::vec((0usize..3, prop::collection::vec(any::<Index>(), 0..3)), 1..12)
}

proptest! {
    #[test]
    fn plans_respect_priorities_and_edges(layout in layouts()) {
        let mut registry = TestRegistry::new();
        let mut edges = Vec::new();
        for (i, (p, deps)) in layout.iter().enumerate() {
            let targets: Vec<usize> = if i == 0 {
                Vec::new()
            } else {
                deps.iter().map(|d| d.index(i)).collect()
            };
            let tokens: Vec<String> = targets.iter().map(|j| format!("e{:02}", j)).collect();
            edges.extend(targets.iter().map(|&j| (i, j)));
            registry
                .register(
                    noop(&format!("e{:02}", i), &format!("s{:02}", i))
                        .with_priority(priority(*p))
                        .with_depends_on(tokens),
                )
                .unwrap();
        }

        let plan = registry.plan().unwrap();
        let position = |name: &str| plan.iter().position(|e| e.name == name).unwrap();

        prop_assert_eq!(plan.len(), layout.len());
        let again: Vec<String> = registry.plan().unwrap().into_iter().map(|e| e.name).collect();
        let names: Vec<String> = plan.iter().map(|e| e.name.clone()).collect();
        prop_assert_eq!(&again, &names);

        // every Last entry runs after every other entry
        if let Some(first_last) = plan.iter().position(|e| e.priority == Priority::Last) {
            prop_assert!(plan[first_last..].iter().all(|e| e.priority == Priority::Last));
        }

        for (i, j) in edges {
            let (waiter, target) = (format!("e{:02}", i), format!("e{:02}", j));
            let target_last = priority(layout[j].0) == Priority::Last;
            if target_last {
                prop_assert!(position(&target) > position(&waiter));
            } else {
                prop_assert!(position(&target) < position(&waiter));
            }
        }
    }
}
