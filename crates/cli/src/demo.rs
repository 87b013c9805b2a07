//! Demo suite: networks, clusters built on networks, backups of clusters.
//!
//! Everything lives in an in-memory [`FakeCloud`]; a cluster records itself
//! as a dependent of its network and a backup as a dependent of its cluster,
//! so delete tests tear them down leaf first.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use piilop_context::Context;
use piilop_core::{Error, Priority, Result};
use piilop_resources::{Resource, ResourceManager, SearchSpec, State};
use piilop_runner::{ResourceSuite, TestEntry, TestRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Providers every create and delete test is generated for
pub const PROVIDERS: [&str; 3] = ["aws", "azure", "gcp"];

/// In-memory stand-in for a cloud provider API
#[derive(Debug, Default)]
pub struct FakeCloud {
    objects: Mutex<BTreeMap<String, String>>,
}

impl FakeCloud {
    /// Create an object in `collection` and return its id.
    pub fn post(&self, collection: &str) -> String {
        let id = Uuid::new_v4().to_string();
        info!("POST {} -> {}", collection, id);
        self.objects.lock().insert(id.clone(), collection.to_string());
        id
    }

    /// Delete an object. Objects this process never created are ignored.
    pub fn delete(&self, collection: &str, id: &str) {
        info!("DELETE {}/{}", collection, id);
        if self.objects.lock().remove(id).is_none() {
            debug!(collection, id, "object unknown to this process");
        }
    }

    /// Check if an object exists
    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.objects.lock().contains_key(id)
    }

    /// Number of live objects
    #[cfg(test)]
    pub fn live_objects(&self) -> usize {
        self.objects.lock().len()
    }
}

fn random_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("piilop-{}", &id[..8])
}

fn per_provider<T>(make: impl Fn(String) -> T) -> Vec<T> {
    PROVIDERS.iter().map(|p| make(p.to_string())).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkOptions {
    pub provider: String,
}

impl Resource for Network {
    type CreateOptions = NetworkOptions;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterOptions {
    pub provider: String,
}

impl Resource for Cluster {
    type CreateOptions = ClusterOptions;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub id: String,
    pub name: String,
    pub source_cluster_id: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupOptions {
    pub provider: String,
}

impl Resource for Backup {
    type CreateOptions = BackupOptions;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Demo registry backed by a fresh cloud.
pub fn build_registry() -> Result<TestRegistry> {
    build_registry_with(Arc::new(FakeCloud::default()))
}

/// Demo registry backed by `cloud`.
pub fn build_registry_with(cloud: Arc<FakeCloud>) -> Result<TestRegistry> {
    let mut registry = TestRegistry::new();
    let networks = register_networks(&mut registry, &cloud)?;
    let clusters = register_clusters(&mut registry, &cloud, networks)?;
    register_backups(&mut registry, &cloud, clusters)?;
    Ok(registry)
}

fn register_networks(
    registry: &mut TestRegistry,
    cloud: &Arc<FakeCloud>,
) -> Result<Arc<ResourceManager<Network>>> {
    let create_cloud = cloud.clone();
    let delete_cloud = cloud.clone();
    let networks = registry.new_resource_manager(
        ResourceSuite::<Network>::new("networks")
            .create(
                |o: &NetworkOptions| format!("create_network {}", o.provider),
                per_provider(|provider| NetworkOptions { provider }),
                move |_ctx: Context, options: NetworkOptions| {
                    let network = Network {
                        id: create_cloud.post("networks"),
                        name: random_name(),
                        provider: options.provider,
                    };
                    async move { Ok(network) }
                },
            )
            .delete(
                |o: &NetworkOptions| format!("delete_network {}", o.provider),
                per_provider(|provider| NetworkOptions { provider }),
                move |_ctx: Context, network: Network| {
                    delete_cloud.delete("networks", &network.id);
                    async { Ok(()) }
                },
            ),
    )?;

    let rm = networks.clone();
    registry.register(TestEntry::new("get_network", "networks", move |ctx: Context| {
        let networks = rm.clone();
        async move {
            let cell = networks
                .get_or_create(
                    &ctx,
                    |s: &State<Network>| !s.is_locked() && s.data.provider == "aws",
                    NetworkOptions {
                        provider: "aws".into(),
                    },
                    |s: &mut State<Network>| s.lock("infra get network"),
                )
                .await?;
            let mut network = cell.lock();
            let checked = expect_provider("network", &network.data.provider, "aws");
            network.unlock();
            checked
        }
    }))?;
    Ok(networks)
}

fn register_clusters(
    registry: &mut TestRegistry,
    cloud: &Arc<FakeCloud>,
    networks: Arc<ResourceManager<Network>>,
) -> Result<Arc<ResourceManager<Cluster>>> {
    let clusters = registry.new_manager::<Cluster>("clusters")?;

    let create_networks = networks.clone();
    let create_cloud = cloud.clone();
    clusters.register_wrapped_create_fn(
        |o: &ClusterOptions| format!("mesdb create_cluster {}", o.provider),
        move |ctx: Context, options: ClusterOptions| {
            let networks = create_networks.clone();
            let cloud = create_cloud.clone();
            async move {
                // held until this create's frame closes
                let network = networks
                    .find_state(
                        &ctx,
                        SearchSpec::new(NetworkOptions {
                            provider: options.provider.clone(),
                        }),
                    )
                    .await?;
                let mut network = network.lock();
                let cluster = Cluster {
                    id: cloud.post("clusters"),
                    name: random_name(),
                    network_id: network.data.id.clone(),
                    provider: options.provider,
                };
                network.add_dependent(format!("cluster-{}", cluster.id));
                Ok(cluster)
            }
        },
    )?;

    let delete_cloud = cloud.clone();
    clusters.register_wrapped_delete_fn(
        |c: &Cluster| format!("mesdb teardown_cluster {}", c.provider),
        move |_ctx: Context, cluster: Cluster| {
            networks.remove_dependent(
                |n: &Network| n.id == cluster.network_id,
                &format!("cluster-{}", cluster.id),
            );
            delete_cloud.delete("clusters", &cluster.id);
            async { Ok(()) }
        },
    )?;

    registry.register_create_tests(
        &clusters,
        |o: &ClusterOptions| format!("mesdb create_cluster {}", o.provider),
        &["networks"],
        Priority::Normal,
        "clusters",
        per_provider(|provider| ClusterOptions { provider }),
    )?;
    registry.register_delete_tests(
        &clusters,
        |o: &ClusterOptions| format!("mesdb delete_cluster {}", o.provider),
        &["networks"],
        Priority::Last,
        "clusters",
        per_provider(|provider| ClusterOptions { provider }),
    )?;

    let rm = clusters.clone();
    let entry = TestEntry::new("mesdb get_cluster aws", "clusters", move |ctx: Context| {
        let clusters = rm.clone();
        async move {
            let cluster = clusters
                .find_data(
                    &ctx,
                    SearchSpec::new(ClusterOptions {
                        provider: "aws".into(),
                    }),
                )
                .await?;
            info!(id = %cluster.id, network = %cluster.network_id, "got cluster");
            expect_provider("cluster", &cluster.provider, "aws")
        }
    })
    .with_depends_on(["networks"]);
    registry.register(entry)?;
    Ok(clusters)
}

fn register_backups(
    registry: &mut TestRegistry,
    cloud: &Arc<FakeCloud>,
    clusters: Arc<ResourceManager<Cluster>>,
) -> Result<()> {
    let create_clusters = clusters.clone();
    let create_cloud = cloud.clone();
    let delete_cloud = cloud.clone();
    let backups = registry.new_resource_manager(
        ResourceSuite::<Backup>::new("backups")
            .depends_on(["clusters"])
            .create(
                |o: &BackupOptions| format!("mesdb create_backup {}", o.provider),
                per_provider(|provider| BackupOptions { provider }),
                move |ctx: Context, options: BackupOptions| {
                    let clusters = create_clusters.clone();
                    let cloud = create_cloud.clone();
                    async move {
                        let spec = SearchSpec::<Cluster>::new(ClusterOptions {
                            provider: options.provider.clone(),
                        });
                        clusters
                            .find_state_and_call(&ctx, spec, |cell| {
                                let mut cluster = cell.lock();
                                let backup = Backup {
                                    id: cloud.post("backups"),
                                    name: random_name(),
                                    source_cluster_id: cluster.data.id.clone(),
                                    provider: options.provider.clone(),
                                };
                                cluster.add_dependent(format!("backup-{}", backup.id));
                                async move { Ok(backup) }
                            })
                            .await
                    }
                },
            )
            .delete(
                |o: &BackupOptions| format!("mesdb delete_backup {}", o.provider),
                per_provider(|provider| BackupOptions { provider }),
                move |_ctx: Context, backup: Backup| {
                    clusters.remove_dependent(
                        |c: &Cluster| c.id == backup.source_cluster_id,
                        &format!("backup-{}", backup.id),
                    );
                    delete_cloud.delete("backups", &backup.id);
                    async { Ok(()) }
                },
            ),
    )?;

    let entry = TestEntry::new("mesdb get_backup aws", "backups", move |ctx: Context| {
        let backups = backups.clone();
        async move {
            let backup = backups
                .find_data(
                    &ctx,
                    SearchSpec::new(BackupOptions {
                        provider: "aws".into(),
                    }),
                )
                .await?;
            info!(id = %backup.id, cluster = %backup.source_cluster_id, "got backup");
            expect_provider("backup", &backup.provider, "aws")
        }
    })
    .with_depends_on(["clusters"]);
    registry.register(entry)?;
    Ok(())
}

fn expect_provider(kind: &str, actual: &str, wanted: &str) -> Result<()> {
    if actual == wanted {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "expected {} {} to be on {}",
            kind, actual, wanted
        )))
    }
}
