use chrono::Utc;
use tracing::debug;

use crate::input::Action;
use crate::metrics::MetricsOverlay;
use crate::mirror::MirrorStore;
use crate::model::{DiscoveredKind, ResourceKind, SortKey};
use crate::nav::{
    Activation, KindRegistry, NavScope, Overlay, ScopeCommand, activation_for, resolve_command,
};
use crate::session::{EngineMessage, EnginePayload, SessionPhase};
use crate::view::{Projection, ViewRow};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Command,
    Filter,
    Confirm,
}

/// Side effect the event loop must execute after an action was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    None,
    ActivateScope,
    LoadPodLogs {
        namespace: String,
        name: String,
    },
    ExecProbe {
        namespace: String,
        name: String,
        command: Vec<String>,
    },
    DeleteObject {
        kind: ResourceKind,
        namespace: Option<String>,
        name: String,
    },
    SwitchContext {
        context: String,
    },
}

/// Holds the active scope, the mirror and its projection, the overlay focus
/// stack, and the generation gate for session messages. All mutation happens
/// on the event-loop task.
pub struct App {
    context: String,
    cluster: String,
    user: String,
    scope: NavScope,
    registry: KindRegistry,
    mirror: MirrorStore,
    usage: MetricsOverlay,
    projection: Projection,
    overlay: Option<Overlay>,
    overlay_scroll: u16,
    config_switch: bool,
    config_cursor: usize,
    contexts: Vec<String>,
    phase: SessionPhase,
    scope_error: Option<String>,
    mode: InputMode,
    input: String,
    status: String,
    running: bool,
    generation: u64,
}

impl App {
    pub fn new(context: String, cluster: String, user: String, namespace: Option<String>) -> Self {
        Self {
            context,
            cluster,
            user,
            scope: NavScope::browse(ResourceKind::Pods, namespace),
            registry: KindRegistry::new(),
            mirror: MirrorStore::new(),
            usage: MetricsOverlay::new(),
            projection: Projection::new(),
            overlay: None,
            overlay_scroll: 0,
            config_switch: false,
            config_cursor: 0,
            contexts: Vec::new(),
            phase: SessionPhase::Connecting,
            scope_error: None,
            mode: InputMode::Normal,
            input: String::new(),
            status: "Connecting to cluster…".to_string(),
            running: true,
            generation: 0,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        if matches!(self.overlay, Some(Overlay::DeleteConfirm { .. })) {
            InputMode::Confirm
        } else {
            self.mode
        }
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

    pub fn scope(&self) -> &NavScope {
        &self.scope
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn scope_error(&self) -> Option<&str> {
        self.scope_error.as_deref()
    }

    pub fn metrics_degraded(&self) -> Option<&str> {
        self.usage.degraded()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn filter(&self) -> &str {
        self.projection.filter()
    }

    pub fn sort_key(&self) -> SortKey {
        self.projection.sort_key()
    }

    pub fn sort_desc(&self) -> bool {
        self.projection.sort_desc()
    }

    pub fn rows(&self) -> &[ViewRow] {
        self.projection.rows()
    }

    pub fn cursor(&self) -> usize {
        self.projection.cursor()
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn overlay_scroll(&self) -> u16 {
        self.overlay_scroll
    }

    pub fn config_switch_active(&self) -> bool {
        self.config_switch
    }

    pub fn config_cursor(&self) -> usize {
        self.config_cursor
    }

    pub fn contexts(&self) -> &[String] {
        &self.contexts
    }

    pub fn set_contexts(&mut self, contexts: Vec<String>) {
        self.config_cursor = contexts
            .iter()
            .position(|name| name == &self.context)
            .unwrap_or(0);
        self.contexts = contexts;
    }

    pub fn set_kube_target(&mut self, context: String, cluster: String, user: String) {
        self.context = context;
        self.cluster = cluster;
        self.user = user;
    }

    pub fn set_discovered(&mut self, kinds: Vec<DiscoveredKind>) {
        self.registry.set_discovered(kinds);
    }

    /// True when rows should carry a namespace column.
    pub fn show_namespace_column(&self) -> bool {
        self.scope.namespace.is_none() && !self.scope.kind.cluster_scoped()
    }

    /// Prepares state for a freshly activated scope. The filter survives;
    /// cursor memory, mirror contents and usage samples do not.
    pub fn begin_scope(&mut self, generation: u64) {
        self.generation = generation;
        self.mirror.clear();
        self.usage.reset();
        self.projection.reset_for_scope();
        self.phase = SessionPhase::Connecting;
        self.scope_error = None;
    }

    /// Applies one session message. Anything tagged with a generation other
    /// than the active one belongs to an abandoned scope and is dropped.
    pub fn handle_message(&mut self, message: EngineMessage) {
        if message.generation != self.generation {
            debug!(
                "dropping stale message for generation {} (active {})",
                message.generation, self.generation
            );
            return;
        }

        match message.payload {
            EnginePayload::Snapshot(objects) => {
                self.mirror.reset(objects);
                self.recompute();
                self.status = format!(
                    "Loaded {} {}",
                    self.mirror.len(),
                    self.scope.kind.plural()
                );
            }
            EnginePayload::SnapshotFailed(reason) => {
                self.phase = SessionPhase::ClosedError;
                self.scope_error = Some(reason);
            }
            EnginePayload::WatchOpened => {
                self.phase = SessionPhase::Open;
            }
            EnginePayload::Event(event) => {
                self.mirror.apply(event);
                self.recompute();
            }
            EnginePayload::WatchClosed { error } => match error {
                Some(reason) => {
                    self.phase = SessionPhase::ClosedError;
                    self.scope_error = Some(reason);
                }
                None => {
                    self.phase = SessionPhase::ClosedClean;
                    self.status = "Watch closed; press r to reconnect".to_string();
                }
            },
            EnginePayload::Usage(samples) => {
                self.usage.replace(samples);
                self.recompute();
            }
            EnginePayload::UsageFailed(reason) => {
                self.status = format!("Metrics degraded: {reason}");
                self.usage.degrade(reason);
            }
        }
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        // A pending delete confirmation swallows everything else.
        if let Some(Overlay::DeleteConfirm {
            kind,
            namespace,
            name,
        }) = self.overlay.clone()
        {
            return match action {
                Action::ConfirmYes => {
                    self.overlay = None;
                    self.status = format!("Deleting {name}…");
                    AppCommand::DeleteObject {
                        kind,
                        namespace,
                        name,
                    }
                }
                Action::ConfirmNo => {
                    self.overlay = None;
                    self.status = "Delete cancelled".to_string();
                    AppCommand::None
                }
                _ => AppCommand::None,
            };
        }

        if matches!(self.mode, InputMode::Command | InputMode::Filter) {
            return self.apply_editing_action(action);
        }

        // The config switcher sits on top of any other overlay.
        if self.config_switch {
            return self.apply_config_switch_action(action);
        }

        if self.overlay.is_some() {
            return self.apply_overlay_action(action);
        }

        match action {
            Action::Quit => {
                self.running = false;
                AppCommand::None
            }
            Action::Down => {
                self.projection.move_cursor(1);
                AppCommand::None
            }
            Action::Up => {
                self.projection.move_cursor(-1);
                AppCommand::None
            }
            Action::PageDown => {
                self.projection.move_cursor(10);
                AppCommand::None
            }
            Action::PageUp => {
                self.projection.move_cursor(-10);
                AppCommand::None
            }
            Action::Top => {
                self.projection.cursor_to_start();
                AppCommand::None
            }
            Action::Bottom => {
                self.projection.cursor_to_end();
                AppCommand::None
            }
            Action::ActivateRow => self.activate_selected(),
            Action::Escape => self.escape(),
            Action::StartCommand => {
                self.mode = InputMode::Command;
                self.input.clear();
                self.status = "Command mode (resource, ns <name>, all)".to_string();
                AppCommand::None
            }
            Action::StartFilter => {
                self.mode = InputMode::Filter;
                self.input = self.projection.filter().to_string();
                self.status = "Filter mode".to_string();
                AppCommand::None
            }
            Action::ToggleHelp => {
                self.open_overlay(Overlay::Help);
                AppCommand::None
            }
            Action::ShowDetail => {
                if let Some(overlay) = self.selected_detail_overlay() {
                    self.open_overlay(overlay);
                }
                AppCommand::None
            }
            Action::ShowYaml => {
                if let Some(overlay) = self.selected_yaml_overlay() {
                    self.open_overlay(overlay);
                }
                AppCommand::None
            }
            Action::LoadLogs => self.load_selected_logs(),
            Action::ExecProbe => {
                if self.scope.kind == ResourceKind::Pods {
                    self.mode = InputMode::Command;
                    self.input = "exec ".to_string();
                    self.status = "Exec mode (:exec <command>)".to_string();
                } else {
                    self.status = "Exec is only available for pods".to_string();
                }
                AppCommand::None
            }
            Action::ConfirmDelete => {
                if let Some(row) = self.projection.selected_row() {
                    let identity = row.object.identity.clone();
                    let namespace = if identity.namespace.is_empty() {
                        None
                    } else {
                        Some(identity.namespace)
                    };
                    self.open_overlay(Overlay::DeleteConfirm {
                        kind: self.scope.kind.clone(),
                        namespace,
                        name: identity.name,
                    });
                }
                AppCommand::None
            }
            Action::ToggleConfigSwitch => {
                self.config_switch = true;
                AppCommand::None
            }
            Action::ClearNamespace => {
                self.scope.namespace = None;
                self.scope.clear_selectors();
                self.status = format!("Browsing {}", self.scope.describe());
                AppCommand::ActivateScope
            }
            Action::SortBy(key) => {
                let descending = !matches!(key, SortKey::Name);
                self.projection.set_sort(key, descending);
                self.recompute();
                self.status = format!("Sorted by {}", key.label());
                AppCommand::None
            }
            Action::Refresh => {
                self.status = format!("Reconnecting {}", self.scope.describe());
                AppCommand::ActivateScope
            }
            Action::ConfirmYes | Action::ConfirmNo => {
                self.status = "Nothing to confirm".to_string();
                AppCommand::None
            }
            Action::SubmitInput | Action::CancelInput | Action::Backspace | Action::InputChar(_) => {
                AppCommand::None
            }
        }
    }

    fn apply_editing_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::InputChar(c) => {
                self.input.push(c);
                AppCommand::None
            }
            Action::Backspace => {
                self.input.pop();
                AppCommand::None
            }
            Action::CancelInput | Action::Escape => {
                self.mode = InputMode::Normal;
                self.input.clear();
                self.status = "Input cancelled".to_string();
                AppCommand::None
            }
            Action::SubmitInput | Action::ActivateRow => {
                let submitted = std::mem::take(&mut self.input);
                let mode = self.mode;
                self.mode = InputMode::Normal;
                match mode {
                    InputMode::Filter => {
                        self.projection.set_filter(submitted.trim().to_string());
                        self.recompute();
                        AppCommand::None
                    }
                    InputMode::Command => self.execute_command(&submitted),
                    _ => AppCommand::None,
                }
            }
            _ => AppCommand::None,
        }
    }

    fn apply_config_switch_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Down => {
                if !self.contexts.is_empty() {
                    self.config_cursor = (self.config_cursor + 1).min(self.contexts.len() - 1);
                }
                AppCommand::None
            }
            Action::Up => {
                self.config_cursor = self.config_cursor.saturating_sub(1);
                AppCommand::None
            }
            Action::ActivateRow => {
                let Some(context) = self.contexts.get(self.config_cursor).cloned() else {
                    return AppCommand::None;
                };
                self.config_switch = false;
                if context == self.context {
                    self.status = format!("Already using context '{context}'");
                    return AppCommand::None;
                }
                self.status = format!("Switching to context '{context}'…");
                AppCommand::SwitchContext { context }
            }
            Action::Escape | Action::ToggleConfigSwitch => {
                self.config_switch = false;
                AppCommand::None
            }
            Action::Quit => {
                self.running = false;
                AppCommand::None
            }
            _ => AppCommand::None,
        }
    }

    fn apply_overlay_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Escape => self.close_overlay(),
            Action::Down => self.overlay_scroll = self.overlay_scroll.saturating_add(1),
            Action::Up => self.overlay_scroll = self.overlay_scroll.saturating_sub(1),
            Action::PageDown => self.overlay_scroll = self.overlay_scroll.saturating_add(10),
            Action::PageUp => self.overlay_scroll = self.overlay_scroll.saturating_sub(10),
            Action::Top => self.overlay_scroll = 0,
            Action::ToggleHelp => {
                if matches!(self.overlay, Some(Overlay::Help)) {
                    self.close_overlay();
                } else {
                    self.open_overlay(Overlay::Help);
                }
            }
            Action::ToggleConfigSwitch => self.config_switch = true,
            Action::Quit => self.running = false,
            _ => {}
        }
        AppCommand::None
    }

    fn execute_command(&mut self, input: &str) -> AppCommand {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return AppCommand::None;
        }

        // One-shot exec in the selected pod, rendered into the shell overlay.
        if trimmed == "exec" || trimmed.starts_with("exec ") {
            return self.execute_exec_command(trimmed);
        }

        match resolve_command(trimmed, &self.registry) {
            Some(ScopeCommand::SwitchKind(kind)) => {
                if kind.cluster_scoped() {
                    self.scope.namespace = None;
                }
                self.scope.kind = kind;
                self.scope.clear_selectors();
                self.status = format!("Browsing {}", self.scope.describe());
                AppCommand::ActivateScope
            }
            Some(ScopeCommand::SwitchNamespace(namespace)) => {
                self.scope = NavScope::browse(ResourceKind::Pods, Some(namespace));
                self.status = format!("Browsing {}", self.scope.describe());
                AppCommand::ActivateScope
            }
            Some(ScopeCommand::ClearNamespace) => {
                self.scope.namespace = None;
                self.scope.clear_selectors();
                self.status = format!("Browsing {}", self.scope.describe());
                AppCommand::ActivateScope
            }
            None => {
                // Unresolvable tokens leave the scope untouched.
                debug!("ignoring unresolvable command token '{trimmed}'");
                AppCommand::None
            }
        }
    }

    fn execute_exec_command(&mut self, trimmed: &str) -> AppCommand {
        if self.scope.kind != ResourceKind::Pods {
            self.status = "Exec is only available for pods".to_string();
            return AppCommand::None;
        }
        let command: Vec<String> = trimmed
            .strip_prefix("exec")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if command.is_empty() {
            self.status = "Usage: exec <command>".to_string();
            return AppCommand::None;
        }
        let Some(row) = self.projection.selected_row() else {
            self.status = "No pod selected".to_string();
            return AppCommand::None;
        };
        let identity = row.object.identity.clone();
        AppCommand::ExecProbe {
            namespace: self.pod_namespace(&identity.namespace),
            name: identity.name,
            command,
        }
    }

    fn activate_selected(&mut self) -> AppCommand {
        let Some(row) = self.projection.selected_row() else {
            return AppCommand::None;
        };
        let object = row.object.clone();

        match activation_for(&self.scope.kind, &object) {
            Some(Activation::PodsBySelector {
                label_selector,
                anchor,
            }) => {
                self.scope.kind = ResourceKind::Pods;
                self.scope.label_selector = Some(label_selector);
                self.scope.field_selector = None;
                self.scope.drill_down = Some(anchor);
                self.status = format!("Browsing {}", self.scope.describe());
                AppCommand::ActivateScope
            }
            Some(Activation::PodsInNamespace { namespace }) => {
                self.scope = NavScope::browse(ResourceKind::Pods, Some(namespace));
                self.status = format!("Browsing {}", self.scope.describe());
                AppCommand::ActivateScope
            }
            Some(Activation::PodsOnNode {
                field_selector,
                anchor,
            }) => {
                self.scope.kind = ResourceKind::Pods;
                self.scope.namespace = None;
                self.scope.label_selector = None;
                self.scope.field_selector = Some(field_selector);
                self.scope.drill_down = Some(anchor);
                self.status = format!("Browsing {}", self.scope.describe());
                AppCommand::ActivateScope
            }
            Some(Activation::OpenLogs) => AppCommand::LoadPodLogs {
                namespace: self.pod_namespace(object.namespace()),
                name: object.name().to_string(),
            },
            None => AppCommand::None,
        }
    }

    fn load_selected_logs(&mut self) -> AppCommand {
        if self.scope.kind != ResourceKind::Pods {
            self.status = "Logs are only available for pods".to_string();
            return AppCommand::None;
        }
        let Some(row) = self.projection.selected_row() else {
            return AppCommand::None;
        };
        let identity = row.object.identity.clone();
        AppCommand::LoadPodLogs {
            namespace: self.pod_namespace(&identity.namespace),
            name: identity.name,
        }
    }

    fn pod_namespace(&self, object_namespace: &str) -> String {
        if object_namespace.is_empty() {
            self.scope
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string())
        } else {
            object_namespace.to_string()
        }
    }

    fn escape(&mut self) -> AppCommand {
        if self.overlay.is_some() {
            self.close_overlay();
            return AppCommand::None;
        }

        self.usage.acknowledge();
        let had_selectors = self.scope.has_selectors();
        self.scope.clear_selectors();
        self.projection.clear_filter();
        if had_selectors {
            self.status = format!("Browsing {}", self.scope.describe());
            AppCommand::ActivateScope
        } else {
            self.recompute();
            AppCommand::None
        }
    }

    fn selected_detail_overlay(&self) -> Option<Overlay> {
        let row = self.projection.selected_row()?;
        let object = &row.object;
        let mut body = String::new();
        body.push_str(&format!("Name:       {}\n", object.name()));
        if !object.namespace().is_empty() {
            body.push_str(&format!("Namespace:  {}\n", object.namespace()));
        }
        body.push_str(&format!("Kind:       {}\n", object.identity.kind));
        if let Some(phase) = object.status_phase() {
            body.push_str(&format!("Phase:      {phase}\n"));
        }
        body.push_str(&format!("Age:        {}\n", row.age_label()));
        if !object.labels.is_empty() {
            body.push_str("Labels:\n");
            for (key, value) in &object.labels {
                body.push_str(&format!("  {key}={value}\n"));
            }
        }
        Some(Overlay::Detail {
            title: format!("Detail {}", object.identity),
            body,
        })
    }

    fn selected_yaml_overlay(&self) -> Option<Overlay> {
        let row = self.projection.selected_row()?;
        let object = &row.object;
        let body = serde_yaml::to_string(&object.payload)
            .unwrap_or_else(|error| format!("failed to render YAML: {error}"));
        Some(Overlay::Yaml {
            title: format!("YAML {}", object.identity),
            body,
        })
    }

    pub fn set_logs_overlay(&mut self, title: impl Into<String>, body: String) {
        self.open_overlay(Overlay::Logs {
            title: title.into(),
            body,
        });
    }

    pub fn set_shell_overlay(&mut self, title: impl Into<String>, body: String) {
        self.open_overlay(Overlay::Shell {
            title: title.into(),
            body,
        });
    }

    fn open_overlay(&mut self, overlay: Overlay) {
        self.overlay = Some(overlay);
        self.overlay_scroll = 0;
    }

    fn close_overlay(&mut self) {
        self.overlay = None;
        self.overlay_scroll = 0;
    }

    fn recompute(&mut self) {
        self.projection
            .recompute(&self.mirror, &self.usage, Utc::now());
    }
}
