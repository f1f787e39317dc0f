use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// A resource collection the view can be scoped to. The static variants cover
/// the kinds the UI knows how to pivot from; anything else reported by API
/// discovery travels as `Discovered`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Pods,
    Deployments,
    StatefulSets,
    Services,
    ConfigMaps,
    Secrets,
    Ingresses,
    PersistentVolumeClaims,
    PersistentVolumes,
    Namespaces,
    Nodes,
    Discovered(DiscoveredKind),
}

/// One entry from API discovery.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct DiscoveredKind {
    pub name: String,
    pub kind: String,
    pub short_names: Vec<String>,
    pub namespaced: bool,
    pub group: String,
    pub version: String,
}

impl DiscoveredKind {
    pub fn matches_token(&self, token: &str) -> bool {
        self.name.eq_ignore_ascii_case(token)
            || self.kind.eq_ignore_ascii_case(token)
            || self
                .short_names
                .iter()
                .any(|short| short.eq_ignore_ascii_case(token))
    }
}

impl ResourceKind {
    pub fn title(&self) -> String {
        match self {
            Self::Pods => "Pods".to_string(),
            Self::Deployments => "Deployments".to_string(),
            Self::StatefulSets => "StatefulSets".to_string(),
            Self::Services => "Services".to_string(),
            Self::ConfigMaps => "ConfigMaps".to_string(),
            Self::Secrets => "Secrets".to_string(),
            Self::Ingresses => "Ingresses".to_string(),
            Self::PersistentVolumeClaims => "PVC".to_string(),
            Self::PersistentVolumes => "PersistentVolumes".to_string(),
            Self::Namespaces => "Namespaces".to_string(),
            Self::Nodes => "Nodes".to_string(),
            Self::Discovered(discovered) => discovered.kind.clone(),
        }
    }

    pub fn plural(&self) -> &str {
        match self {
            Self::Pods => "pods",
            Self::Deployments => "deployments",
            Self::StatefulSets => "statefulsets",
            Self::Services => "services",
            Self::ConfigMaps => "configmaps",
            Self::Secrets => "secrets",
            Self::Ingresses => "ingresses",
            Self::PersistentVolumeClaims => "persistentvolumeclaims",
            Self::PersistentVolumes => "persistentvolumes",
            Self::Namespaces => "namespaces",
            Self::Nodes => "nodes",
            Self::Discovered(discovered) => &discovered.name,
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "po" | "pod" | "pods" => Some(Self::Pods),
            "deploy" | "deployment" | "deployments" | "dp" => Some(Self::Deployments),
            "sts" | "statefulset" | "statefulsets" => Some(Self::StatefulSets),
            "svc" | "service" | "services" => Some(Self::Services),
            "cm" | "configmap" | "configmaps" | "config-map" | "config-maps" => {
                Some(Self::ConfigMaps)
            }
            "sec" | "secret" | "secrets" => Some(Self::Secrets),
            "ing" | "ingress" | "ingresses" => Some(Self::Ingresses),
            "pvc"
            | "persistentvolumeclaim"
            | "persistentvolumeclaims"
            | "persistent-volume-claim"
            | "persistent-volume-claims" => Some(Self::PersistentVolumeClaims),
            "pv" | "persistentvolume" | "persistentvolumes" | "persistent-volume"
            | "persistent-volumes" => Some(Self::PersistentVolumes),
            "ns" | "namespace" | "namespaces" => Some(Self::Namespaces),
            "no" | "node" | "nodes" => Some(Self::Nodes),
            _ => None,
        }
    }

    pub fn cluster_scoped(&self) -> bool {
        match self {
            Self::Namespaces | Self::Nodes | Self::PersistentVolumes => true,
            Self::Discovered(discovered) => !discovered.namespaced,
            _ => false,
        }
    }

    /// Pod usage samples are joined only onto the pods view.
    pub fn wants_pod_usage(&self) -> bool {
        matches!(self, Self::Pods)
    }

    /// Node usage samples are joined only onto the nodes view.
    pub fn wants_node_usage(&self) -> bool {
        matches!(self, Self::Nodes)
    }

    /// (group, version, plural, kind) for the dynamic API.
    pub fn api_coordinates(&self) -> (String, String, String, String) {
        let (group, version, plural, kind) = match self {
            Self::Pods => ("", "v1", "pods", "Pod"),
            Self::Deployments => ("apps", "v1", "deployments", "Deployment"),
            Self::StatefulSets => ("apps", "v1", "statefulsets", "StatefulSet"),
            Self::Services => ("", "v1", "services", "Service"),
            Self::ConfigMaps => ("", "v1", "configmaps", "ConfigMap"),
            Self::Secrets => ("", "v1", "secrets", "Secret"),
            Self::Ingresses => ("networking.k8s.io", "v1", "ingresses", "Ingress"),
            Self::PersistentVolumeClaims => {
                ("", "v1", "persistentvolumeclaims", "PersistentVolumeClaim")
            }
            Self::PersistentVolumes => ("", "v1", "persistentvolumes", "PersistentVolume"),
            Self::Namespaces => ("", "v1", "namespaces", "Namespace"),
            Self::Nodes => ("", "v1", "nodes", "Node"),
            Self::Discovered(discovered) => {
                return (
                    discovered.group.clone(),
                    discovered.version.clone(),
                    discovered.name.clone(),
                    discovered.kind.clone(),
                );
            }
        };
        (
            group.to_string(),
            version.to_string(),
            plural.to_string(),
            kind.to_string(),
        )
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.plural())
    }
}

/// Uniquely addresses one mirror entry. Namespace is empty for cluster-scoped
/// kinds.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ResourceIdentity {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for ResourceIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// One mirrored object: identity plus the raw manifest payload. The payload
/// is replaced wholesale on modify, never merged.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceObject {
    pub identity: ResourceIdentity,
    pub created: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    pub payload: Value,
}

impl ResourceObject {
    /// Builds an object from a raw manifest. Returns `None` when the payload
    /// has no `metadata.name`; such events are dropped by the caller.
    pub fn from_payload(kind: &str, payload: Value) -> Option<Self> {
        let metadata = payload.get("metadata")?;
        let name = metadata.get("name").and_then(Value::as_str)?;
        if name.is_empty() {
            return None;
        }
        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let created = metadata
            .get("creationTimestamp")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|stamp| stamp.with_timezone(&Utc));
        let labels = metadata
            .get("labels")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(key, value)| {
                        value.as_str().map(|text| (key.clone(), text.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            identity: ResourceIdentity::new(kind, namespace, name),
            created,
            labels,
            payload,
        })
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn namespace(&self) -> &str {
        &self.identity.namespace
    }

    pub fn status_phase(&self) -> Option<&str> {
        self.payload
            .pointer("/status/phase")
            .and_then(Value::as_str)
    }
}

/// One usage reading for a resource, normalized to fixed units. Joined onto
/// rows by name within the active namespace scope.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSample {
    pub name: String,
    pub cpu_millicores: f64,
    pub memory_kibibytes: f64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum SortKey {
    #[default]
    Name,
    Age,
    Cpu,
    Memory,
    Restarts,
}

impl SortKey {
    pub fn label(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Age => "age",
            Self::Cpu => "cpu",
            Self::Memory => "mem",
            Self::Restarts => "restarts",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ResourceKind, ResourceObject};
    use serde_json::json;

    #[test]
    fn resource_aliases_map_to_expected_kinds() {
        assert_eq!(ResourceKind::from_token("po"), Some(ResourceKind::Pods));
        assert_eq!(
            ResourceKind::from_token("deploy"),
            Some(ResourceKind::Deployments)
        );
        assert_eq!(
            ResourceKind::from_token("sts"),
            Some(ResourceKind::StatefulSets)
        );
        assert_eq!(
            ResourceKind::from_token("svc"),
            Some(ResourceKind::Services)
        );
        assert_eq!(
            ResourceKind::from_token("pvc"),
            Some(ResourceKind::PersistentVolumeClaims)
        );
        assert_eq!(
            ResourceKind::from_token("NS"),
            Some(ResourceKind::Namespaces)
        );
        assert_eq!(ResourceKind::from_token("no"), Some(ResourceKind::Nodes));
        assert_eq!(ResourceKind::from_token("whatever"), None);
    }

    #[test]
    fn cluster_scoped_kinds_have_no_namespace() {
        assert!(ResourceKind::Nodes.cluster_scoped());
        assert!(ResourceKind::Namespaces.cluster_scoped());
        assert!(ResourceKind::PersistentVolumes.cluster_scoped());
        assert!(!ResourceKind::Pods.cluster_scoped());
        assert!(!ResourceKind::Deployments.cluster_scoped());
    }

    #[test]
    fn object_parses_identity_and_labels() {
        let object = ResourceObject::from_payload(
            "pods",
            json!({
                "metadata": {
                    "name": "api-0",
                    "namespace": "default",
                    "creationTimestamp": "2026-01-10T08:30:00Z",
                    "labels": {"app": "api", "tier": "web"}
                },
                "status": {"phase": "Running"}
            }),
        )
        .expect("payload with a name should parse");

        assert_eq!(object.identity.name, "api-0");
        assert_eq!(object.identity.namespace, "default");
        assert_eq!(object.identity.kind, "pods");
        assert_eq!(object.labels.get("app").map(String::as_str), Some("api"));
        assert_eq!(object.status_phase(), Some("Running"));
        assert!(object.created.is_some());
    }

    #[test]
    fn object_without_name_is_rejected() {
        assert!(ResourceObject::from_payload("pods", json!({"metadata": {}})).is_none());
        assert!(ResourceObject::from_payload("pods", json!({"spec": {}})).is_none());
    }
}
