//! Delete tests must wait for every user of a resource and must never take
//! an instance something else still depends on.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use piilop::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::*;

/// Hosting service holding containers and the apps installed on them
#[derive(Default)]
struct FakeService {
    containers: Mutex<BTreeMap<String, Vec<String>>>,
}

impl FakeService {
    fn container_ids(&self) -> Vec<String> {
        self.containers.lock().keys().cloned().collect()
    }

    fn apps_on(&self, container: &str) -> Vec<String> {
        self.containers
            .lock()
            .get(container)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContainerOptions {
    os: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Container {
    id: String,
    os: String,
}

impl Resource for Container {
    type CreateOptions = ContainerOptions;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppOptions {
    os: String,
    pkg_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct App {
    container_id: String,
    id: String,
    os: String,
    pkg_name: String,
}

impl Resource for App {
    type CreateOptions = AppOptions;

    fn id(&self) -> &str {
        &self.id
    }
}

fn os(name: &str) -> ContainerOptions {
    ContainerOptions { os: name.into() }
}

fn app(os: &str, pkg_name: &str) -> AppOptions {
    AppOptions {
        os: os.into(),
        pkg_name: pkg_name.into(),
    }
}

fn register_containers(
    monitor: &Monitor,
    service: &Arc<FakeService>,
    registry: &mut TestRegistry,
) -> Arc<ResourceManager<Container>> {
    let containers = registry.new_manager::<Container>("Containers").unwrap();

    let (m, svc) = (monitor.clone(), service.clone());
    containers
        .register_wrapped_create_fn(
            |o: &ContainerOptions| format!("create container {}", o.os),
            move |_ctx: Context, options: ContainerOptions| {
                let (m, svc) = (m.clone(), svc.clone());
                async move {
                    let id = m.arbitrary_name();
                    m.log(format!("creating container {} with os {}", id, options.os));
                    svc.containers.lock().insert(id.clone(), Vec::new());
                    tokio::task::yield_now().await;
                    Ok(Container { id, os: options.os })
                }
            },
        )
        .unwrap();

    let (m, svc) = (monitor.clone(), service.clone());
    containers.register_delete_fn(move |_ctx: Context, data: Container| {
        let (m, svc) = (m.clone(), svc.clone());
        async move {
            check(data.os == "ubuntu", format!("unexpected container {:?}", data))?;
            m.log(format!("deleting container {}", data.id));
            match svc.containers.lock().remove(&data.id) {
                Some(_) => Ok(()),
                None => Err(Error::action(format!("container {} not found", data.id))),
            }
        }
    });

    registry
        .register_create_tests(
            &containers,
            |o: &ContainerOptions| format!("create container {}", o.os),
            &[],
            Priority::First,
            "Containers",
            vec![os("ubuntu"), os("windows")],
        )
        .unwrap();

    let rm = containers.clone();
    registry
        .register(TestEntry::new(
            "test we can get Ubuntu containers",
            "Containers",
            move |ctx: Context| {
                let rm = rm.clone();
                async move {
                    let cell = rm
                        .get_or_create(
                            &ctx,
                            |s: &State<Container>| s.data.os == "ubuntu" && !s.is_locked(),
                            os("ubuntu"),
                            |s: &mut State<Container>| s.lock("testing container GET"),
                        )
                        .await?;
                    let mut state = cell.lock();
                    let result = check(state.data.os == "ubuntu", "wrong operating system");
                    state.unlock();
                    result
                }
            },
        ))
        .unwrap();

    registry
        .register_delete_tests(
            &containers,
            |o: &ContainerOptions| format!("delete container {}", o.os),
            &[],
            Priority::Last,
            "Containers",
            vec![os("ubuntu")],
        )
        .unwrap();

    containers
}

fn register_apps(
    monitor: &Monitor,
    service: &Arc<FakeService>,
    registry: &mut TestRegistry,
    containers: &Arc<ResourceManager<Container>>,
) -> Arc<ResourceManager<App>> {
    let apps = registry.new_manager::<App>("Apps").unwrap();
    let name = |o: &AppOptions| format!("create app on os {}, pkg name {}", o.os, o.pkg_name);

    let (m, svc, hosts) = (monitor.clone(), service.clone(), containers.clone());
    apps.register_wrapped_create_fn(name, move |ctx: Context, options: AppOptions| {
        let (m, svc, hosts) = (m.clone(), svc.clone(), hosts.clone());
        async move {
            let host = hosts
                .find_state(&ctx, SearchSpec::<Container>::new(os(&options.os)))
                .await?;
            let mut host = host.lock();
            let id = m.arbitrary_name();
            m.log(format!(
                "installing app {} as {} on container {}",
                options.pkg_name, id, host.data.id
            ));
            svc.containers
                .lock()
                .get_mut(&host.data.id)
                .ok_or_else(|| Error::action(format!("container {} not found", host.data.id)))?
                .push(id.clone());
            host.add_dependent(format!("app-{}", id));
            Ok(App {
                container_id: host.data.id.clone(),
                id,
                os: options.os,
                pkg_name: options.pkg_name,
            })
        }
    })
    .unwrap();

    let (m, svc, hosts) = (monitor.clone(), service.clone(), containers.clone());
    apps.register_delete_fn(move |_ctx: Context, data: App| {
        m.log(format!("deleting app {}", data.id));
        if let Some(installed) = svc.containers.lock().get_mut(&data.container_id) {
            installed.retain(|id| id != &data.id);
        }
        hosts.remove_dependent(|c: &Container| c.id == data.container_id, &format!("app-{}", data.id));
        async { Ok(()) }
    });

    registry
        .register_create_tests(
            &apps,
            name,
            &["Containers"],
            Priority::First,
            "Apps",
            vec![app("ubuntu", "nodejs"), app("windows", "skifree")],
        )
        .unwrap();

    registry
        .register_delete_tests(
            &apps,
            |o: &AppOptions| format!("delete app on os {}, pkg name {}", o.os, o.pkg_name),
            &["Containers"],
            Priority::Last,
            "Apps",
            vec![app("ubuntu", "nodejs")],
        )
        .unwrap();

    let rm = apps.clone();
    let svc = service.clone();
    registry
        .register(
            TestEntry::new("test Python on Ubuntu", "Apps", move |ctx: Context| {
                let rm = rm.clone();
                let svc = svc.clone();
                async move {
                    let python = rm
                        .find_data(&ctx, SearchSpec::<App>::new(app("ubuntu", "python")))
                        .await?;
                    check(
                        svc.apps_on(&python.container_id).contains(&python.id),
                        "python is not installed",
                    )?;
                    check(python.pkg_name == "python", "wrong package")
                }
            })
            .with_depends_on(["Containers"]),
        )
        .unwrap();

    apps
}

#[tokio::test]
async fn test_container_suite() {
    let monitor = Monitor::new();
    let service = Arc::new(FakeService::default());
    let mut registry = TestRegistry::new();
    let containers = register_containers(&monitor, &service, &mut registry);
    let main = runner(&monitor, registry);

    assert_eq!(
        test_list(&main),
        vec![
            "create container ubuntu",
            "create container windows",
            "test we can get Ubuntu containers",
            "delete container ubuntu",
        ]
    );

    let report = main.run_test(RunOptions::new()).await.unwrap();
    assert!(report.is_success(), "{:?}", report.outcomes());

    // The create tests share their name with the wrapped create function,
    // so each is announced once.
    assert_eq!(
        monitor.logs(),
        vec![
            "START create container ubuntu",
            "creating container TN-0 with os ubuntu",
            "FINISH create container ubuntu :: passed",
            "START create container windows",
            "creating container TN-1 with os windows",
            "FINISH create container windows :: passed",
            "START test we can get Ubuntu containers",
            "FINISH test we can get Ubuntu containers :: passed",
            "START delete container ubuntu",
            "deleting container TN-0",
            "FINISH delete container ubuntu :: passed",
        ]
    );
    assert_eq!(service.container_ids(), vec!["TN-1"]);
    assert_eq!(containers.active().len(), 1);
    assert_eq!(containers.deleted()[0].lock().data.id, "TN-0");
}

#[tokio::test]
async fn test_container_delete_skips_instances_with_dependents() {
    let monitor = Monitor::new();
    let service = Arc::new(FakeService::default());
    let mut registry = TestRegistry::new();
    let containers = register_containers(&monitor, &service, &mut registry);
    let apps = register_apps(&monitor, &service, &mut registry, &containers);
    let main = runner(&monitor, registry);

    assert_eq!(
        test_list(&main),
        vec![
            "create container ubuntu",
            "create container windows",
            "test we can get Ubuntu containers",
            "create app on os ubuntu, pkg name nodejs",
            "create app on os windows, pkg name skifree",
            "test Python on Ubuntu",
            "delete app on os ubuntu, pkg name nodejs",
            "delete container ubuntu",
        ]
    );

    let report = main.run_test(RunOptions::new()).await.unwrap();
    assert!(report.is_success(), "{:?}", report.outcomes());

    // The first ubuntu container still hosts python when the delete test
    // runs, so a fresh container is created just to be deleted.
    assert_eq!(
        monitor.logs(),
        vec![
            "START create container ubuntu",
            "creating container TN-0 with os ubuntu",
            "FINISH create container ubuntu :: passed",
            "START create container windows",
            "creating container TN-1 with os windows",
            "FINISH create container windows :: passed",
            "START test we can get Ubuntu containers",
            "FINISH test we can get Ubuntu containers :: passed",
            "START create app on os ubuntu, pkg name nodejs",
            "installing app nodejs as TN-2 on container TN-0",
            "FINISH create app on os ubuntu, pkg name nodejs :: passed",
            "START create app on os windows, pkg name skifree",
            "installing app skifree as TN-3 on container TN-1",
            "FINISH create app on os windows, pkg name skifree :: passed",
            "START test Python on Ubuntu",
            "START create app on os ubuntu, pkg name python",
            "installing app python as TN-4 on container TN-0",
            "FINISH create app on os ubuntu, pkg name python :: passed",
            "FINISH test Python on Ubuntu :: passed",
            "START delete app on os ubuntu, pkg name nodejs",
            "deleting app TN-2",
            "FINISH delete app on os ubuntu, pkg name nodejs :: passed",
            "START delete container ubuntu",
            "START create container ubuntu",
            "creating container TN-5 with os ubuntu",
            "FINISH create container ubuntu :: passed",
            "deleting container TN-5",
            "FINISH delete container ubuntu :: passed",
        ]
    );

    assert_eq!(service.container_ids(), vec!["TN-0", "TN-1"]);
    assert_eq!(service.apps_on("TN-0"), vec!["TN-4"]);

    let survivors: Vec<_> = containers.active().iter().map(|c| c.lock().clone()).collect();
    assert_eq!(survivors[0].data.id, "TN-0");
    assert_eq!(survivors[0].dependents, vec!["app-TN-4"]);
    assert!(survivors.iter().all(|s| !s.is_locked()));
    assert_eq!(containers.deleted()[0].lock().data.id, "TN-5");

    let installed: Vec<_> = apps.active().iter().map(|a| a.lock().data.id.clone()).collect();
    assert_eq!(installed, vec!["TN-3", "TN-4"]);
}
