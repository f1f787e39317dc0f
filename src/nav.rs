use serde_json::{Map, Value};

use crate::model::{DiscoveredKind, ResourceKind, ResourceObject};

/// The active resource scope. Exactly one exists at a time; every mutation
/// implies tearing down and recreating the mirror and watch session.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NavScope {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub drill_down: Option<String>,
}

impl NavScope {
    pub fn browse(kind: ResourceKind, namespace: Option<String>) -> Self {
        let namespace = if kind.cluster_scoped() { None } else { namespace };
        Self {
            kind,
            namespace,
            label_selector: None,
            field_selector: None,
            drill_down: None,
        }
    }

    pub fn clear_selectors(&mut self) {
        self.label_selector = None;
        self.field_selector = None;
        self.drill_down = None;
    }

    pub fn has_selectors(&self) -> bool {
        self.label_selector.is_some() || self.field_selector.is_some() || self.drill_down.is_some()
    }

    /// Header label: `pods @ default`, `pods (web) [app=web]`, `nodes @ all`.
    pub fn describe(&self) -> String {
        let mut label = self.kind.plural().to_string();
        if let Some(anchor) = &self.drill_down {
            label.push_str(&format!(" ({anchor})"));
        }
        match &self.namespace {
            Some(namespace) => label.push_str(&format!(" @ {namespace}")),
            None if !self.kind.cluster_scoped() => label.push_str(" @ all"),
            None => {}
        }
        if let Some(selector) = &self.label_selector {
            label.push_str(&format!(" [{selector}]"));
        }
        if let Some(selector) = &self.field_selector {
            label.push_str(&format!(" [{selector}]"));
        }
        label
    }
}

/// Modal focus. At most one is open; the config switcher is tracked
/// separately because it may be toggled on top of any of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    Detail { title: String, body: String },
    Logs { title: String, body: String },
    Shell { title: String, body: String },
    Yaml { title: String, body: String },
    DeleteConfirm {
        kind: ResourceKind,
        namespace: Option<String>,
        name: String,
    },
    Help,
}

/// Alias resolution table: the static kind aliases unioned with whatever API
/// discovery reported. Discovered entries override static ones.
#[derive(Debug, Default)]
pub struct KindRegistry {
    discovered: Vec<DiscoveredKind>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_discovered(&mut self, kinds: Vec<DiscoveredKind>) {
        self.discovered = kinds;
    }

    pub fn discovered(&self) -> &[DiscoveredKind] {
        &self.discovered
    }

    pub fn resolve(&self, token: &str) -> Option<ResourceKind> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        if let Some(entry) = self
            .discovered
            .iter()
            .find(|kind| kind.matches_token(token))
        {
            // A discovered plural that names a built-in kind lands on the
            // built-in variant so per-kind activation still applies.
            return Some(
                ResourceKind::from_token(&entry.name)
                    .unwrap_or_else(|| ResourceKind::Discovered(entry.clone())),
            );
        }
        ResourceKind::from_token(token)
    }
}

/// A resolved scope-changing command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeCommand {
    SwitchKind(ResourceKind),
    SwitchNamespace(String),
    ClearNamespace,
}

/// Maps a free-text command token to a scope change. Unresolvable input maps
/// to `None` and the caller leaves the scope untouched.
pub fn resolve_command(input: &str, registry: &KindRegistry) -> Option<ScopeCommand> {
    let cleaned = input.trim().to_ascii_lowercase();
    if cleaned.is_empty() {
        return None;
    }

    if let Some(kind) = registry.resolve(&cleaned) {
        return Some(ScopeCommand::SwitchKind(kind));
    }

    if let Some(rest) = cleaned
        .strip_prefix("ns ")
        .or_else(|| cleaned.strip_prefix("namespace "))
    {
        let namespace = rest.split_whitespace().last()?;
        return Some(ScopeCommand::SwitchNamespace(namespace.to_string()));
    }

    if cleaned == "all" || cleaned == "0" {
        return Some(ScopeCommand::ClearNamespace);
    }

    None
}

/// What activating a row does, dispatched on the scope's kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    PodsBySelector { label_selector: String, anchor: String },
    PodsInNamespace { namespace: String },
    PodsOnNode { field_selector: String, anchor: String },
    OpenLogs,
}

/// Per-kind activation rule table.
///
/// Workload kinds pivot to the pods their selector matches; namespaces and
/// nodes narrow the pod scope; pods open the logs overlay. Everything else
/// ignores activation.
pub fn activation_for(kind: &ResourceKind, object: &ResourceObject) -> Option<Activation> {
    match kind {
        ResourceKind::Deployments | ResourceKind::StatefulSets => {
            let selector = object
                .payload
                .pointer("/spec/selector/matchLabels")?
                .as_object()?;
            Some(Activation::PodsBySelector {
                label_selector: selector_string(selector),
                anchor: object.name().to_string(),
            })
        }
        ResourceKind::Services => {
            let selector = object.payload.pointer("/spec/selector")?.as_object()?;
            Some(Activation::PodsBySelector {
                label_selector: selector_string(selector),
                anchor: object.name().to_string(),
            })
        }
        ResourceKind::Namespaces => Some(Activation::PodsInNamespace {
            namespace: object.name().to_string(),
        }),
        ResourceKind::Nodes => Some(Activation::PodsOnNode {
            field_selector: format!("spec.nodeName={}", object.name()),
            anchor: object.name().to_string(),
        }),
        ResourceKind::Pods => Some(Activation::OpenLogs),
        _ => None,
    }
}

/// `k=v` pairs comma-joined in the source map's insertion order.
fn selector_string(selector: &Map<String, Value>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={}", value.as_str().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::{
        Activation, KindRegistry, NavScope, ScopeCommand, activation_for, resolve_command,
    };
    use crate::model::{DiscoveredKind, ResourceKind, ResourceObject};
    use serde_json::json;

    fn registry_with(discovered: Vec<DiscoveredKind>) -> KindRegistry {
        let mut registry = KindRegistry::new();
        registry.set_discovered(discovered);
        registry
    }

    fn discovered(name: &str, kind: &str, short_names: &[&str], namespaced: bool) -> DiscoveredKind {
        DiscoveredKind {
            name: name.to_string(),
            kind: kind.to_string(),
            short_names: short_names.iter().map(|s| s.to_string()).collect(),
            namespaced,
            group: "example.io".to_string(),
            version: "v1".to_string(),
        }
    }

    #[test]
    fn static_aliases_resolve_without_discovery() {
        let registry = KindRegistry::new();
        assert_eq!(
            resolve_command("deploy", &registry),
            Some(ScopeCommand::SwitchKind(ResourceKind::Deployments))
        );
        assert_eq!(
            resolve_command("  SVC  ", &registry),
            Some(ScopeCommand::SwitchKind(ResourceKind::Services))
        );
    }

    #[test]
    fn discovered_entries_override_static_aliases() {
        // A CRD claiming the "po" short name takes precedence over pods.
        let registry = registry_with(vec![discovered(
            "podmonitors",
            "PodMonitor",
            &["po"],
            true,
        )]);
        match resolve_command("po", &registry) {
            Some(ScopeCommand::SwitchKind(ResourceKind::Discovered(entry))) => {
                assert_eq!(entry.name, "podmonitors");
            }
            other => panic!("expected discovered kind, got {other:?}"),
        }
    }

    #[test]
    fn discovered_builtin_plural_lands_on_builtin_variant() {
        let registry = registry_with(vec![DiscoveredKind {
            name: "pods".to_string(),
            kind: "Pod".to_string(),
            short_names: vec!["po".to_string()],
            namespaced: true,
            group: String::new(),
            version: "v1".to_string(),
        }]);
        assert_eq!(
            resolve_command("po", &registry),
            Some(ScopeCommand::SwitchKind(ResourceKind::Pods))
        );
    }

    #[test]
    fn namespace_command_takes_last_token() {
        let registry = KindRegistry::new();
        assert_eq!(
            resolve_command("ns kube-system", &registry),
            Some(ScopeCommand::SwitchNamespace("kube-system".to_string()))
        );
        assert_eq!(
            resolve_command("namespace staging", &registry),
            Some(ScopeCommand::SwitchNamespace("staging".to_string()))
        );
    }

    #[test]
    fn all_and_zero_clear_the_namespace() {
        let registry = KindRegistry::new();
        assert_eq!(
            resolve_command("all", &registry),
            Some(ScopeCommand::ClearNamespace)
        );
        assert_eq!(
            resolve_command("0", &registry),
            Some(ScopeCommand::ClearNamespace)
        );
    }

    #[test]
    fn unresolvable_tokens_are_no_ops() {
        let registry = KindRegistry::new();
        assert_eq!(resolve_command("frobnicate", &registry), None);
        assert_eq!(resolve_command("", &registry), None);
        assert_eq!(resolve_command("   ", &registry), None);
    }

    fn object(kind: &str, payload: serde_json::Value) -> ResourceObject {
        ResourceObject::from_payload(kind, payload).expect("test object should parse")
    }

    #[test]
    fn deployment_activation_derives_the_pod_selector() {
        let deployment = object(
            "deployments",
            json!({
                "metadata": {"name": "checkout", "namespace": "shop"},
                "spec": {"selector": {"matchLabels": {"app": "x", "tier": "web"}}}
            }),
        );

        assert_eq!(
            activation_for(&ResourceKind::Deployments, &deployment),
            Some(Activation::PodsBySelector {
                label_selector: "app=x,tier=web".to_string(),
                anchor: "checkout".to_string(),
            })
        );
    }

    #[test]
    fn service_activation_uses_the_spec_selector() {
        let service = object(
            "services",
            json!({
                "metadata": {"name": "api", "namespace": "shop"},
                "spec": {"selector": {"app": "api"}}
            }),
        );

        assert_eq!(
            activation_for(&ResourceKind::Services, &service),
            Some(Activation::PodsBySelector {
                label_selector: "app=api".to_string(),
                anchor: "api".to_string(),
            })
        );
    }

    #[test]
    fn workload_without_selector_does_not_activate() {
        let deployment = object(
            "deployments",
            json!({"metadata": {"name": "legacy"}, "spec": {}}),
        );
        assert_eq!(activation_for(&ResourceKind::Deployments, &deployment), None);
    }

    #[test]
    fn node_activation_pins_pods_by_field_selector() {
        let node = object("nodes", json!({"metadata": {"name": "worker-1"}}));
        assert_eq!(
            activation_for(&ResourceKind::Nodes, &node),
            Some(Activation::PodsOnNode {
                field_selector: "spec.nodeName=worker-1".to_string(),
                anchor: "worker-1".to_string(),
            })
        );
    }

    #[test]
    fn namespace_and_pod_activations() {
        let namespace = object("namespaces", json!({"metadata": {"name": "staging"}}));
        assert_eq!(
            activation_for(&ResourceKind::Namespaces, &namespace),
            Some(Activation::PodsInNamespace {
                namespace: "staging".to_string()
            })
        );

        let pod = object("pods", json!({"metadata": {"name": "api-0"}}));
        assert_eq!(
            activation_for(&ResourceKind::Pods, &pod),
            Some(Activation::OpenLogs)
        );

        let secret = object("secrets", json!({"metadata": {"name": "creds"}}));
        assert_eq!(activation_for(&ResourceKind::Secrets, &secret), None);
    }

    #[test]
    fn browse_scope_drops_namespace_for_cluster_kinds() {
        let scope = NavScope::browse(ResourceKind::Nodes, Some("default".to_string()));
        assert!(scope.namespace.is_none());

        let scope = NavScope::browse(ResourceKind::Pods, Some("default".to_string()));
        assert_eq!(scope.namespace.as_deref(), Some("default"));
    }
}
