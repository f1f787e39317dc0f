use anyhow::{Context, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use kube::api::{Api, DeleteParams, ListParams, LogParams, WatchEvent as RawWatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, Config};
use serde_json::Value;
use tracing::warn;

use crate::metrics::{normalize_cpu, normalize_mem};
use crate::mirror::{EventKind, WatchEvent};
use crate::model::{DiscoveredKind, ResourceKind, ResourceObject, UsageSample};
use crate::nav::NavScope;
use crate::session::ClusterBackend;

const LIST_LIMIT: u32 = 500;

/// Gateway to the cluster: dynamic list/watch for any kind, usage samples
/// from metrics.k8s.io, API discovery, and the kubeconfig context catalog.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
    cluster: String,
    user: String,
    default_namespace: String,
    contexts: Vec<String>,
}

impl KubeGateway {
    pub async fn new(context: Option<String>) -> Result<Self> {
        let kubeconfig = Kubeconfig::read().ok();

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            let options = KubeConfigOptions {
                context: context.clone(),
                cluster: None,
                user: None,
            };
            Config::from_custom_kubeconfig(kubeconfig_value, &options)
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            if context.is_some() {
                anyhow::bail!(
                    "kubeconfig not found; context switching is unavailable in this environment"
                );
            }
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let cluster = config.cluster_url.to_string();
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;

        let mut contexts = kubeconfig
            .as_ref()
            .map(|cfg| {
                cfg.contexts
                    .iter()
                    .map(|entry| entry.name.clone())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        contexts.sort();
        contexts.dedup();

        let active_context = context
            .or_else(|| kubeconfig.as_ref().and_then(|cfg| cfg.current_context.clone()))
            .unwrap_or_else(|| "in-cluster".to_string());
        let user = kubeconfig
            .as_ref()
            .and_then(|cfg| {
                cfg.contexts
                    .iter()
                    .find(|entry| entry.name == active_context)
                    .and_then(|entry| entry.context.as_ref())
                    .and_then(|ctx| ctx.user.clone())
            })
            .unwrap_or_else(|| "-".to_string());

        Ok(Self {
            client,
            context: active_context,
            cluster,
            user,
            default_namespace,
            contexts,
        })
    }

    pub async fn switch_context(&mut self, context: &str) -> Result<()> {
        let switched = Self::new(Some(context.to_string())).await?;
        *self = switched;
        Ok(())
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn contexts(&self) -> Vec<String> {
        self.contexts.clone()
    }

    pub async fn fetch_pod_logs(
        &self,
        namespace: &str,
        pod_name: &str,
        previous: bool,
    ) -> Result<String> {
        let pods: Api<k8s_openapi::api::core::v1::Pod> =
            Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            previous,
            tail_lines: Some(500),
            timestamps: true,
            ..LogParams::default()
        };

        let logs = pods
            .logs(pod_name, &params)
            .await
            .with_context(|| format!("failed to load logs for {namespace}/{pod_name}"))?;

        Ok(logs)
    }

    pub async fn delete_object(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let api = self.dynamic_api(kind, namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .with_context(|| format!("failed to delete {} {name}", kind.plural()))?;
        Ok(())
    }

    fn dynamic_api(&self, kind: &ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let (group, version, plural, kind_name) = kind.api_coordinates();
        let gvk = GroupVersionKind::gvk(&group, &version, &kind_name);
        let resource = ApiResource::from_gvk_with_plural(&gvk, &plural);
        match namespace {
            Some(namespace) if !kind.cluster_scoped() => {
                Api::namespaced_with(self.client.clone(), namespace, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn scoped_api(&self, scope: &NavScope) -> Api<DynamicObject> {
        self.dynamic_api(&scope.kind, scope.namespace.as_deref())
    }

    fn metrics_api(&self, kind: &str, plural: &str, namespace: Option<&str>) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, plural);
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

impl ClusterBackend for KubeGateway {
    async fn fetch_snapshot(&self, scope: &NavScope) -> Result<Vec<ResourceObject>> {
        let api = self.scoped_api(scope);
        let mut params = ListParams::default().limit(LIST_LIMIT);
        if let Some(selector) = &scope.label_selector {
            params = params.labels(selector);
        }
        if let Some(selector) = &scope.field_selector {
            params = params.fields(selector);
        }

        let list = api
            .list(&params)
            .await
            .with_context(|| format!("failed to list {}", scope.kind.plural()))?;

        let plural = scope.kind.plural().to_string();
        Ok(list
            .items
            .into_iter()
            .filter_map(|item| convert_object(&plural, &item))
            .collect())
    }

    async fn open_watch(&self, scope: &NavScope) -> Result<BoxStream<'static, Result<WatchEvent>>> {
        let api = self.scoped_api(scope);
        let mut params = WatchParams::default();
        if let Some(selector) = &scope.label_selector {
            params = params.labels(selector);
        }
        if let Some(selector) = &scope.field_selector {
            params = params.fields(selector);
        }

        let stream = api
            .watch(&params, "0")
            .await
            .with_context(|| format!("failed to open watch for {}", scope.kind.plural()))?;

        let plural = scope.kind.plural().to_string();
        let mapped = stream
            .filter_map(move |item| {
                let plural = plural.clone();
                async move {
                    match item {
                        Ok(RawWatchEvent::Added(object)) => {
                            convert_event(&plural, EventKind::Added, &object)
                        }
                        Ok(RawWatchEvent::Modified(object)) => {
                            convert_event(&plural, EventKind::Modified, &object)
                        }
                        Ok(RawWatchEvent::Deleted(object)) => {
                            convert_event(&plural, EventKind::Deleted, &object)
                        }
                        Ok(RawWatchEvent::Bookmark(_)) => None,
                        Ok(RawWatchEvent::Error(status)) => {
                            Some(Err(anyhow::anyhow!("watch stream error: {status:?}")))
                        }
                        Err(error) => Some(Err(
                            anyhow::Error::new(error).context("watch stream failed")
                        )),
                    }
                }
            })
            .boxed();

        Ok(mapped)
    }

    async fn poll_pod_usage(&self, namespace: Option<&str>) -> Result<Vec<UsageSample>> {
        let api = self.metrics_api("PodMetrics", "pods", namespace);
        let list = api
            .list(&ListParams::default().limit(LIST_LIMIT))
            .await
            .context("failed to poll pod usage")?;

        Ok(list
            .items
            .iter()
            .filter_map(|item| {
                let value = serde_json::to_value(item).ok()?;
                pod_usage_sample(&value)
            })
            .collect())
    }

    async fn poll_node_usage(&self) -> Result<Vec<UsageSample>> {
        let api = self.metrics_api("NodeMetrics", "nodes", None);
        let list = api
            .list(&ListParams::default().limit(LIST_LIMIT))
            .await
            .context("failed to poll node usage")?;

        Ok(list
            .items
            .iter()
            .filter_map(|item| {
                let value = serde_json::to_value(item).ok()?;
                node_usage_sample(&value)
            })
            .collect())
    }

    async fn list_kinds(&self) -> Result<Vec<DiscoveredKind>> {
        let mut kinds = Vec::new();

        let core = self
            .client
            .list_core_api_resources("v1")
            .await
            .context("failed to list core API resources")?;
        for resource in core.resources {
            if resource.name.contains('/') {
                continue;
            }
            kinds.push(DiscoveredKind {
                name: resource.name.to_ascii_lowercase(),
                kind: resource.kind,
                short_names: resource.short_names.unwrap_or_default(),
                namespaced: resource.namespaced,
                group: String::new(),
                version: "v1".to_string(),
            });
        }

        let groups = self
            .client
            .list_api_groups()
            .await
            .context("failed to list API groups")?;
        for group in groups.groups {
            let Some(preferred) = group
                .preferred_version
                .or_else(|| group.versions.first().cloned())
            else {
                continue;
            };
            let list = match self
                .client
                .list_api_group_resources(&preferred.group_version)
                .await
            {
                Ok(list) => list,
                Err(error) => {
                    warn!("discovery failed for {}: {error}", preferred.group_version);
                    continue;
                }
            };
            let (group_name, version) = preferred
                .group_version
                .split_once('/')
                .map(|(g, v)| (g.to_string(), v.to_string()))
                .unwrap_or_else(|| (String::new(), preferred.group_version.clone()));
            for resource in list.resources {
                if resource.name.contains('/') {
                    continue;
                }
                kinds.push(DiscoveredKind {
                    name: resource.name.to_ascii_lowercase(),
                    kind: resource.kind,
                    short_names: resource.short_names.unwrap_or_default(),
                    namespaced: resource.namespaced,
                    group: group_name.clone(),
                    version: version.clone(),
                });
            }
        }

        Ok(kinds)
    }
}

fn convert_object(plural: &str, object: &DynamicObject) -> Option<ResourceObject> {
    let payload = serde_json::to_value(object).ok()?;
    ResourceObject::from_payload(plural, payload)
}

fn convert_event(
    plural: &str,
    kind: EventKind,
    object: &DynamicObject,
) -> Option<Result<WatchEvent>> {
    match convert_object(plural, object) {
        Some(converted) => Some(Ok(WatchEvent::new(kind, converted))),
        None => {
            // A payload with no usable identity fails only this event.
            warn!("dropping malformed {kind:?} event for {plural}");
            None
        }
    }
}

/// Sums the per-container usage of one PodMetrics item.
fn pod_usage_sample(value: &Value) -> Option<UsageSample> {
    let name = value.pointer("/metadata/name").and_then(Value::as_str)?;
    let containers = value.get("containers").and_then(Value::as_array)?;

    let mut cpu = 0.0;
    let mut memory = 0.0;
    for container in containers {
        if let Some(usage) = container.get("usage") {
            cpu += usage
                .get("cpu")
                .and_then(Value::as_str)
                .map(normalize_cpu)
                .unwrap_or(0.0);
            memory += usage
                .get("memory")
                .and_then(Value::as_str)
                .map(normalize_mem)
                .unwrap_or(0.0);
        }
    }

    Some(UsageSample {
        name: name.to_string(),
        cpu_millicores: cpu,
        memory_kibibytes: memory,
    })
}

fn node_usage_sample(value: &Value) -> Option<UsageSample> {
    let name = value.pointer("/metadata/name").and_then(Value::as_str)?;
    let usage = value.get("usage")?;

    Some(UsageSample {
        name: name.to_string(),
        cpu_millicores: usage
            .get("cpu")
            .and_then(Value::as_str)
            .map(normalize_cpu)
            .unwrap_or(0.0),
        memory_kibibytes: usage
            .get("memory")
            .and_then(Value::as_str)
            .map(normalize_mem)
            .unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::{node_usage_sample, pod_usage_sample};
    use serde_json::json;

    #[test]
    fn pod_usage_sums_containers() {
        let sample = pod_usage_sample(&json!({
            "metadata": {"name": "api-0", "namespace": "default"},
            "containers": [
                {"name": "api", "usage": {"cpu": "250m", "memory": "512Mi"}},
                {"name": "sidecar", "usage": {"cpu": "500000n", "memory": "1024Ki"}}
            ]
        }))
        .expect("pod metrics item should parse");

        assert_eq!(sample.name, "api-0");
        assert_eq!(sample.cpu_millicores, 250.5);
        assert_eq!(sample.memory_kibibytes, 525_312.0);
    }

    #[test]
    fn node_usage_reads_root_usage() {
        let sample = node_usage_sample(&json!({
            "metadata": {"name": "worker-1"},
            "usage": {"cpu": "2", "memory": "1Gi"}
        }))
        .expect("node metrics item should parse");

        assert_eq!(sample.name, "worker-1");
        assert_eq!(sample.cpu_millicores, 2000.0);
        assert_eq!(sample.memory_kibibytes, 1_048_576.0);
    }

    #[test]
    fn malformed_usage_items_are_skipped() {
        assert!(pod_usage_sample(&json!({"containers": []})).is_none());
        assert!(node_usage_sample(&json!({"metadata": {"name": "n"}})).is_none());
    }
}
