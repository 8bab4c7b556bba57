//! Kubernetes-backed node and pod cache built on `kube` reflectors

use super::{ClusterError, NodeLister, PodLister};
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::watcher;
use kube::{Api, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delay before the watch stream is polled again after an error
const WATCH_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Node and pod listers kept current by watch streams
#[derive(Clone)]
pub struct KubeClusterCache {
    nodes: Store<Node>,
    pods: Store<Pod>,
    nodes_synced: Arc<AtomicBool>,
    pods_synced: Arc<AtomicBool>,
}

impl KubeClusterCache {
    /// Start watching nodes and pods; returns the cache and the watch tasks
    pub fn start(client: Client) -> (Self, Vec<JoinHandle<()>>) {
        let (nodes, node_writer) = reflector::store::<Node>();
        let (pods, pod_writer) = reflector::store::<Pod>();
        let nodes_synced = Arc::new(AtomicBool::new(false));
        let pods_synced = Arc::new(AtomicBool::new(false));

        let node_task = tokio::spawn(drive(
            "nodes",
            reflector::reflector(
                node_writer,
                watcher(Api::<Node>::all(client.clone()), watcher::Config::default()),
            ),
            nodes_synced.clone(),
        ));
        let pod_task = tokio::spawn(drive(
            "pods",
            reflector::reflector(
                pod_writer,
                watcher(Api::<Pod>::all(client), watcher::Config::default()),
            ),
            pods_synced.clone(),
        ));

        (
            Self {
                nodes,
                pods,
                nodes_synced,
                pods_synced,
            },
            vec![node_task, pod_task],
        )
    }

    /// True once both watches have completed an initial list
    pub fn is_synced(&self) -> bool {
        self.nodes_synced.load(Ordering::Acquire) && self.pods_synced.load(Ordering::Acquire)
    }

    /// Wait until both watches have listed once
    pub async fn wait_for_sync(&self, poll: Duration) {
        while !self.is_synced() {
            tokio::time::sleep(poll).await;
        }
        info!(
            nodes = self.nodes.state().len(),
            pods = self.pods.state().len(),
            "Cluster cache synced"
        );
    }
}

async fn drive<K, S>(kind: &'static str, stream: S, synced: Arc<AtomicBool>)
where
    K: Send + 'static,
    S: futures_util::Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
{
    stream
        .for_each(|event| {
            let synced = synced.clone();
            async move {
                match event {
                    Ok(watcher::Event::Restarted(objects)) => {
                        debug!(kind, count = objects.len(), "Watch relisted");
                        synced.store(true, Ordering::Release);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(kind, error = %e, "Watch stream error, retrying");
                        tokio::time::sleep(WATCH_ERROR_BACKOFF).await;
                    }
                }
            }
        })
        .await;
    warn!(kind, "Watch stream ended");
}

impl NodeLister for KubeClusterCache {
    fn list(&self) -> Vec<Arc<Node>> {
        self.nodes.state()
    }

    fn get(&self, name: &str) -> Result<Arc<Node>, ClusterError> {
        self.nodes
            .get(&ObjectRef::new(name))
            .ok_or_else(|| ClusterError::NodeNotFound(name.to_string()))
    }
}

impl PodLister for KubeClusterCache {
    fn list(&self) -> Vec<Arc<Pod>> {
        self.pods.state()
    }

    fn get(&self, namespace: &str, name: &str) -> Result<Arc<Pod>, ClusterError> {
        self.pods
            .get(&ObjectRef::new(name).within(namespace))
            .ok_or_else(|| ClusterError::PodNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
