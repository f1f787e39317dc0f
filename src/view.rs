use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

use crate::metrics::{MetricsOverlay, normalize_cpu, normalize_mem};
use crate::mirror::MirrorStore;
use crate::model::{ResourceIdentity, ResourceObject, SortKey, UsageSample};

/// One projected row: the mirrored object joined with its usage sample plus
/// the fields derived from both. Recomputed on every read, never cached
/// across mirror mutations.
#[derive(Debug, Clone)]
pub struct ViewRow {
    pub object: ResourceObject,
    pub usage: Option<UsageSample>,
    pub age_seconds: i64,
    pub ready: (usize, usize),
    pub restarts: u64,
    pub cpu_of_request_pct: u64,
    pub cpu_of_limit_pct: u64,
    pub mem_of_request_pct: u64,
    pub mem_of_limit_pct: u64,
}

impl ViewRow {
    fn derive(object: ResourceObject, usage: Option<UsageSample>, now: DateTime<Utc>) -> Self {
        let age_seconds = object
            .created
            .map(|created| (now - created).num_seconds().max(0))
            .unwrap_or(0);
        let ready = container_readiness(&object.payload);
        let restarts = container_restarts(&object.payload);
        let (request_cpu, request_mem, limit_cpu, limit_mem) = container_resources(&object.payload);
        let cpu = usage.as_ref().map(|sample| sample.cpu_millicores).unwrap_or(0.0);
        let mem = usage
            .as_ref()
            .map(|sample| sample.memory_kibibytes)
            .unwrap_or(0.0);

        Self {
            object,
            usage,
            age_seconds,
            ready,
            restarts,
            cpu_of_request_pct: percentage(cpu, request_cpu),
            cpu_of_limit_pct: percentage(cpu, limit_cpu),
            mem_of_request_pct: percentage(mem, request_mem),
            mem_of_limit_pct: percentage(mem, limit_mem),
        }
    }

    pub fn cpu_millicores(&self) -> f64 {
        self.usage
            .as_ref()
            .map(|sample| sample.cpu_millicores)
            .unwrap_or(0.0)
    }

    pub fn memory_kibibytes(&self) -> f64 {
        self.usage
            .as_ref()
            .map(|sample| sample.memory_kibibytes)
            .unwrap_or(0.0)
    }

    pub fn age_label(&self) -> String {
        format_elapsed_seconds(self.age_seconds)
    }
}

fn percentage(usage: f64, reference: f64) -> u64 {
    if reference > 0.0 {
        (usage / reference * 100.0).round() as u64
    } else {
        0
    }
}

fn container_readiness(payload: &Value) -> (usize, usize) {
    let Some(statuses) = payload
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
    else {
        return (0, 0);
    };
    let ready = statuses
        .iter()
        .filter(|status| status.get("ready").and_then(Value::as_bool) == Some(true))
        .count();
    (ready, statuses.len())
}

fn container_restarts(payload: &Value) -> u64 {
    payload
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .map(|statuses| {
            statuses
                .iter()
                .filter_map(|status| status.get("restartCount").and_then(Value::as_u64))
                .sum()
        })
        .unwrap_or(0)
}

/// Sums (requests.cpu, requests.memory, limits.cpu, limits.memory) over the
/// pod's containers, in millicores and kibibytes.
fn container_resources(payload: &Value) -> (f64, f64, f64, f64) {
    let Some(containers) = payload.pointer("/spec/containers").and_then(Value::as_array) else {
        return (0.0, 0.0, 0.0, 0.0);
    };

    let mut totals = (0.0, 0.0, 0.0, 0.0);
    for container in containers {
        if let Some(requests) = container.pointer("/resources/requests") {
            totals.0 += quantity(requests, "cpu", normalize_cpu);
            totals.1 += quantity(requests, "memory", normalize_mem);
        }
        if let Some(limits) = container.pointer("/resources/limits") {
            totals.2 += quantity(limits, "cpu", normalize_cpu);
            totals.3 += quantity(limits, "memory", normalize_mem);
        }
    }
    totals
}

fn quantity(section: &Value, field: &str, normalize: fn(&str) -> f64) -> f64 {
    section
        .get(field)
        .and_then(Value::as_str)
        .map(normalize)
        .unwrap_or(0.0)
}

fn format_elapsed_seconds(seconds: i64) -> String {
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3_600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h", seconds / 3_600)
    } else {
        format!("{}d", seconds / 86_400)
    }
}

/// Derives the ordered, filtered row sequence and keeps the cursor valid
/// across updates.
///
/// The cursor follows the previously selected identity when it survives a
/// recompute; otherwise it clamps into `[0, len-1]`. Filter and sort changes
/// reset it to the top; incremental mirror updates never do.
#[derive(Debug, Default)]
pub struct Projection {
    filter: String,
    sort_key: SortKey,
    sort_desc: bool,
    rows: Vec<ViewRow>,
    cursor: usize,
    selected: Option<ResourceIdentity>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recompute(&mut self, mirror: &MirrorStore, overlay: &MetricsOverlay, now: DateTime<Utc>) {
        let needle = self.filter.trim().to_ascii_lowercase();
        let mut rows: Vec<ViewRow> = mirror
            .snapshot()
            .iter()
            .filter(|object| matches_filter(object, &needle))
            .map(|object| {
                let usage = overlay.sample(object.name()).cloned();
                ViewRow::derive(object.clone(), usage, now)
            })
            .collect();

        let sort_key = self.sort_key;
        rows.sort_by(|left, right| {
            let ordering = compare_rows(left, right, sort_key);
            if self.sort_desc {
                ordering.reverse()
            } else {
                ordering
            }
        });

        if rows.is_empty() {
            self.cursor = 0;
            self.selected = None;
        } else if let Some(selected) = &self.selected
            && let Some(index) = rows
                .iter()
                .position(|row| &row.object.identity == selected)
        {
            self.cursor = index;
        } else {
            self.cursor = self.cursor.min(rows.len() - 1);
            self.selected = Some(rows[self.cursor].object.identity.clone());
        }

        self.rows = rows;
    }

    pub fn rows(&self) -> &[ViewRow] {
        &self.rows
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selected_row(&self) -> Option<&ViewRow> {
        self.rows.get(self.cursor)
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn set_filter(&mut self, text: impl Into<String>) {
        self.filter = text.into();
        self.reset_cursor();
    }

    pub fn clear_filter(&mut self) {
        self.filter.clear();
        self.reset_cursor();
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn sort_desc(&self) -> bool {
        self.sort_desc
    }

    pub fn set_sort(&mut self, key: SortKey, descending: bool) {
        self.sort_key = key;
        self.sort_desc = descending;
        self.reset_cursor();
    }

    /// Scope activation: rows and cursor memory go, the filter text stays.
    pub fn reset_for_scope(&mut self) {
        self.rows.clear();
        self.reset_cursor();
    }

    pub fn move_cursor(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        let last = self.rows.len() - 1;
        let next = self.cursor.saturating_add_signed(delta).min(last);
        self.cursor = next;
        self.selected = Some(self.rows[next].object.identity.clone());
    }

    pub fn cursor_to_start(&mut self) {
        self.cursor = 0;
        self.selected = self.rows.first().map(|row| row.object.identity.clone());
    }

    pub fn cursor_to_end(&mut self) {
        if self.rows.is_empty() {
            self.cursor = 0;
            self.selected = None;
            return;
        }
        self.cursor = self.rows.len() - 1;
        self.selected = self.rows.last().map(|row| row.object.identity.clone());
    }

    fn reset_cursor(&mut self) {
        self.cursor = 0;
        self.selected = None;
    }
}

/// Case-insensitive substring match against the object's name and, when
/// present, its status phase. The empty filter passes everything.
fn matches_filter(object: &ResourceObject, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if object.name().to_ascii_lowercase().contains(needle) {
        return true;
    }
    object
        .status_phase()
        .is_some_and(|phase| phase.to_ascii_lowercase().contains(needle))
}

fn compare_rows(left: &ViewRow, right: &ViewRow, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => left.object.identity.name.cmp(&right.object.identity.name),
        SortKey::Age => {
            let left_created = left.object.created.map(|t| t.timestamp()).unwrap_or(0);
            let right_created = right.object.created.map(|t| t.timestamp()).unwrap_or(0);
            left_created.cmp(&right_created)
        }
        SortKey::Cpu => left
            .cpu_millicores()
            .partial_cmp(&right.cpu_millicores())
            .unwrap_or(Ordering::Equal),
        SortKey::Memory => left
            .memory_kibibytes()
            .partial_cmp(&right.memory_kibibytes())
            .unwrap_or(Ordering::Equal),
        SortKey::Restarts => left.restarts.cmp(&right.restarts),
    }
}
