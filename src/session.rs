use anyhow::Result;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::debug;

use crate::mirror::WatchEvent;
use crate::model::{DiscoveredKind, ResourceObject, UsageSample};
use crate::nav::NavScope;

/// The backend collaborator serving snapshots, diff streams, usage samples
/// and kind discovery. The engine only ever talks to this seam.
pub trait ClusterBackend: Clone + Send + Sync + 'static {
    fn fetch_snapshot(
        &self,
        scope: &NavScope,
    ) -> impl Future<Output = Result<Vec<ResourceObject>>> + Send;

    fn open_watch(
        &self,
        scope: &NavScope,
    ) -> impl Future<Output = Result<BoxStream<'static, Result<WatchEvent>>>> + Send;

    fn poll_pod_usage(
        &self,
        namespace: Option<&str>,
    ) -> impl Future<Output = Result<Vec<UsageSample>>> + Send;

    fn poll_node_usage(&self) -> impl Future<Output = Result<Vec<UsageSample>>> + Send;

    fn list_kinds(&self) -> impl Future<Output = Result<Vec<DiscoveredKind>>> + Send;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionPhase {
    Connecting,
    Open,
    ClosedClean,
    ClosedError,
}

/// Message from the session's tasks to the owning event loop, tagged with
/// the scope generation it belongs to. The consumer drops anything stale.
#[derive(Debug)]
pub struct EngineMessage {
    pub generation: u64,
    pub payload: EnginePayload,
}

#[derive(Debug)]
pub enum EnginePayload {
    Snapshot(Vec<ResourceObject>),
    SnapshotFailed(String),
    WatchOpened,
    Event(WatchEvent),
    WatchClosed { error: Option<String> },
    Usage(Vec<UsageSample>),
    UsageFailed(String),
}

/// Owns the live connection for the active scope: one watch task plus at
/// most one pod-usage and one node-usage poller.
///
/// Activation bumps a monotonic generation counter and aborts the previous
/// tasks; anything they had in flight completes against a stale generation
/// and is ignored downstream. There is no automatic retry; a lost watch
/// stays lost until the scope is explicitly re-activated.
pub struct WatchSession<B> {
    backend: B,
    tx: mpsc::UnboundedSender<EngineMessage>,
    generation: u64,
    tasks: Vec<JoinHandle<()>>,
}

impl<B: ClusterBackend> WatchSession<B> {
    pub fn new(backend: B, tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self {
            backend,
            tx,
            generation: 0,
            tasks: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Swaps the backend (context switch). The generation counter keeps
    /// counting so messages from the previous backend stay distinguishable.
    pub fn set_backend(&mut self, backend: B) {
        self.deactivate();
        self.backend = backend;
    }

    /// Tears down the previous scope's tasks and starts the new scope's
    /// watch and pollers. Returns the new generation.
    pub fn activate(&mut self, scope: &NavScope, usage_interval: Duration) -> u64 {
        self.deactivate();
        self.generation += 1;
        let generation = self.generation;
        debug!("activating scope {} generation={generation}", scope.describe());

        let backend = self.backend.clone();
        let tx = self.tx.clone();
        let watch_scope = scope.clone();
        self.tasks.push(tokio::spawn(async move {
            run_watch(backend, watch_scope, generation, tx).await;
        }));

        if scope.kind.wants_pod_usage() {
            let backend = self.backend.clone();
            let tx = self.tx.clone();
            let namespace = scope.namespace.clone();
            self.tasks.push(tokio::spawn(async move {
                run_pod_usage(backend, namespace, generation, tx, usage_interval).await;
            }));
        }
        if scope.kind.wants_node_usage() {
            let backend = self.backend.clone();
            let tx = self.tx.clone();
            self.tasks.push(tokio::spawn(async move {
                run_node_usage(backend, generation, tx, usage_interval).await;
            }));
        }

        generation
    }

    pub fn deactivate(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl<B> Drop for WatchSession<B> {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

async fn run_watch<B: ClusterBackend>(
    backend: B,
    scope: NavScope,
    generation: u64,
    tx: mpsc::UnboundedSender<EngineMessage>,
) {
    let objects = match backend.fetch_snapshot(&scope).await {
        Ok(objects) => objects,
        Err(error) => {
            let _ = tx.send(EngineMessage {
                generation,
                payload: EnginePayload::SnapshotFailed(format!("{error:#}")),
            });
            return;
        }
    };
    if tx
        .send(EngineMessage {
            generation,
            payload: EnginePayload::Snapshot(objects),
        })
        .is_err()
    {
        return;
    }

    let mut stream = match backend.open_watch(&scope).await {
        Ok(stream) => stream,
        Err(error) => {
            let _ = tx.send(EngineMessage {
                generation,
                payload: EnginePayload::WatchClosed {
                    error: Some(format!("{error:#}")),
                },
            });
            return;
        }
    };
    if tx
        .send(EngineMessage {
            generation,
            payload: EnginePayload::WatchOpened,
        })
        .is_err()
    {
        return;
    }

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                if tx
                    .send(EngineMessage {
                        generation,
                        payload: EnginePayload::Event(event),
                    })
                    .is_err()
                {
                    return;
                }
            }
            Err(error) => {
                let _ = tx.send(EngineMessage {
                    generation,
                    payload: EnginePayload::WatchClosed {
                        error: Some(format!("{error:#}")),
                    },
                });
                return;
            }
        }
    }

    let _ = tx.send(EngineMessage {
        generation,
        payload: EnginePayload::WatchClosed { error: None },
    });
}

async fn run_pod_usage<B: ClusterBackend>(
    backend: B,
    namespace: Option<String>,
    generation: u64,
    tx: mpsc::UnboundedSender<EngineMessage>,
    every: Duration,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match backend.poll_pod_usage(namespace.as_deref()).await {
            Ok(samples) => {
                if tx
                    .send(EngineMessage {
                        generation,
                        payload: EnginePayload::Usage(samples),
                    })
                    .is_err()
                {
                    return;
                }
            }
            Err(error) => {
                // One failure suspends polling until the scope changes.
                let _ = tx.send(EngineMessage {
                    generation,
                    payload: EnginePayload::UsageFailed(format!("{error:#}")),
                });
                return;
            }
        }
    }
}

async fn run_node_usage<B: ClusterBackend>(
    backend: B,
    generation: u64,
    tx: mpsc::UnboundedSender<EngineMessage>,
    every: Duration,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match backend.poll_node_usage().await {
            Ok(samples) => {
                if tx
                    .send(EngineMessage {
                        generation,
                        payload: EnginePayload::Usage(samples),
                    })
                    .is_err()
                {
                    return;
                }
            }
            Err(error) => {
                let _ = tx.send(EngineMessage {
                    generation,
                    payload: EnginePayload::UsageFailed(format!("{error:#}")),
                });
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ClusterBackend, EngineMessage, EnginePayload, WatchSession};
    use crate::mirror::{EventKind, WatchEvent};
    use crate::model::{DiscoveredKind, ResourceKind, ResourceObject, UsageSample};
    use crate::nav::NavScope;
    use anyhow::Result;
    use futures::stream::{self, BoxStream};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::time::Duration;

    #[derive(Clone)]
    struct FakeBackend {
        snapshot: Arc<Vec<ResourceObject>>,
        events: Arc<Vec<WatchEvent>>,
    }

    impl ClusterBackend for FakeBackend {
        async fn fetch_snapshot(&self, _scope: &NavScope) -> Result<Vec<ResourceObject>> {
            Ok(self.snapshot.as_ref().clone())
        }

        async fn open_watch(
            &self,
            _scope: &NavScope,
        ) -> Result<BoxStream<'static, Result<WatchEvent>>> {
            let events: Vec<Result<WatchEvent>> =
                self.events.iter().cloned().map(Ok).collect();
            Ok(Box::pin(stream::iter(events)))
        }

        async fn poll_pod_usage(&self, _namespace: Option<&str>) -> Result<Vec<UsageSample>> {
            anyhow::bail!("connection refused")
        }

        async fn poll_node_usage(&self) -> Result<Vec<UsageSample>> {
            Ok(Vec::new())
        }

        async fn list_kinds(&self) -> Result<Vec<DiscoveredKind>> {
            Ok(Vec::new())
        }
    }

    fn pod(name: &str) -> ResourceObject {
        ResourceObject::from_payload(
            "pods",
            json!({"metadata": {"name": name, "namespace": "default"}}),
        )
        .unwrap()
    }

    async fn drain_until_closed(rx: &mut mpsc::UnboundedReceiver<EngineMessage>) -> Vec<EngineMessage> {
        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            let closed = matches!(message.payload, EnginePayload::WatchClosed { .. });
            messages.push(message);
            if closed {
                break;
            }
        }
        messages
    }

    #[tokio::test]
    async fn watch_messages_arrive_in_order_with_their_generation() {
        let backend = FakeBackend {
            snapshot: Arc::new(vec![pod("p1")]),
            events: Arc::new(vec![WatchEvent::new(EventKind::Added, pod("p2"))]),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = WatchSession::new(backend, tx);

        let scope = NavScope::browse(ResourceKind::Services, Some("default".to_string()));
        let generation = session.activate(&scope, Duration::from_secs(60));
        assert_eq!(generation, 1);

        let messages = drain_until_closed(&mut rx).await;
        assert!(messages.iter().all(|message| message.generation == 1));

        assert!(matches!(messages[0].payload, EnginePayload::Snapshot(ref objects) if objects.len() == 1));
        assert!(matches!(messages[1].payload, EnginePayload::WatchOpened));
        assert!(matches!(messages[2].payload, EnginePayload::Event(_)));
        assert!(matches!(
            messages[3].payload,
            EnginePayload::WatchClosed { error: None }
        ));
    }

    #[tokio::test]
    async fn reactivation_bumps_the_generation() {
        let backend = FakeBackend {
            snapshot: Arc::new(Vec::new()),
            events: Arc::new(Vec::new()),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = WatchSession::new(backend, tx);

        let scope = NavScope::browse(ResourceKind::Services, None);
        let first = session.activate(&scope, Duration::from_secs(60));
        let _ = drain_until_closed(&mut rx).await;
        let second = session.activate(&scope, Duration::from_secs(60));
        assert!(second > first);

        let messages = drain_until_closed(&mut rx).await;
        assert!(messages.iter().all(|message| message.generation == second));
    }

    #[tokio::test]
    async fn failed_usage_poll_reports_once_and_stops() {
        let backend = FakeBackend {
            snapshot: Arc::new(Vec::new()),
            events: Arc::new(Vec::new()),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = WatchSession::new(backend, tx);

        let scope = NavScope::browse(ResourceKind::Pods, Some("default".to_string()));
        session.activate(&scope, Duration::from_millis(5));

        let mut failures = 0;
        let mut closed = false;
        // The watch drains immediately; the poller must emit exactly one
        // failure even though several intervals elapse.
        let deadline = tokio::time::Instant::now() + Duration::from_millis(100);
        while let Ok(Some(message)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            match message.payload {
                EnginePayload::UsageFailed(ref reason) => {
                    assert!(reason.contains("connection refused"));
                    failures += 1;
                }
                EnginePayload::WatchClosed { .. } => closed = true,
                _ => {}
            }
        }
        assert!(closed);
        assert_eq!(failures, 1);
    }
}
