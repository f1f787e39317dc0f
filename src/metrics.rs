use std::collections::HashMap;

use crate::model::UsageSample;

/// Converts a vendor-formatted CPU quantity into millicores.
///
/// Suffixes: `n` nanocores, `u` microcores, `m` millicores, none means whole
/// cores. Malformed input normalizes to zero; integer rounding happens at
/// presentation time, never here.
pub fn normalize_cpu(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0.0;
    }

    if let Some(number) = raw.strip_suffix('n') {
        parse_number(number) / 1_000_000.0
    } else if let Some(number) = raw.strip_suffix('u') {
        parse_number(number) / 1_000.0
    } else if let Some(number) = raw.strip_suffix('m') {
        parse_number(number)
    } else {
        parse_number(raw) * 1_000.0
    }
}

/// Converts a vendor-formatted memory quantity into kibibytes.
///
/// `Ki/Mi/Gi/Ti` are binary (base 1024), `k/M/G/T` are decimal (base 1000,
/// converted to Ki), a bare number is raw bytes.
pub fn normalize_mem(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() || raw == "0" {
        return 0.0;
    }

    const BINARY_UNITS: [(&str, f64); 4] = [
        ("Ki", 1.0),
        ("Mi", 1_024.0),
        ("Gi", 1_048_576.0),
        ("Ti", 1_073_741_824.0),
    ];
    const DECIMAL_UNITS: [(&str, f64); 4] = [
        ("k", 1_000.0),
        ("M", 1_000_000.0),
        ("G", 1_000_000_000.0),
        ("T", 1_000_000_000_000.0),
    ];

    for (suffix, kibibytes) in BINARY_UNITS {
        if let Some(number) = raw.strip_suffix(suffix) {
            return parse_number(number) * kibibytes;
        }
    }
    for (suffix, bytes) in DECIMAL_UNITS {
        if let Some(number) = raw.strip_suffix(suffix) {
            return parse_number(number) * bytes / 1_024.0;
        }
    }

    parse_number(raw) / 1_024.0
}

fn parse_number(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(0.0)
}

/// Last-known usage samples for the active scope, keyed by resource name.
///
/// A pure enrichment over the mirror: replaced wholesale per successful poll,
/// left stale on failure, and never required for the mirror to be consistent.
/// After one failed poll the scope stays suspended until it is reactivated.
#[derive(Debug, Default)]
pub struct MetricsOverlay {
    samples: HashMap<String, UsageSample>,
    degraded: Option<String>,
    suspended: bool,
}

impl MetricsOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, samples: Vec<UsageSample>) {
        self.samples = samples
            .into_iter()
            .map(|sample| (sample.name.clone(), sample))
            .collect();
    }

    /// Marks the overlay degraded and suspends polling for the scope. The
    /// stale samples are intentionally kept.
    pub fn degrade(&mut self, reason: impl Into<String>) {
        self.degraded = Some(reason.into());
        self.suspended = true;
    }

    /// Dismisses the degraded banner without resuming polling.
    pub fn acknowledge(&mut self) {
        self.degraded = None;
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.degraded = None;
        self.suspended = false;
    }

    pub fn sample(&self, name: &str) -> Option<&UsageSample> {
        self.samples.get(name)
    }

    pub fn degraded(&self) -> Option<&str> {
        self.degraded.as_deref()
    }

    pub fn suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{MetricsOverlay, normalize_cpu, normalize_mem};
    use crate::model::UsageSample;

    #[test]
    fn cpu_suffixes_normalize_to_millicores() {
        assert_eq!(normalize_cpu("250m"), 250.0);
        assert_eq!(normalize_cpu("2"), 2000.0);
        assert_eq!(normalize_cpu("500000n"), 0.5);
        assert_eq!(normalize_cpu("1500u"), 1.5);
        assert_eq!(normalize_cpu(""), 0.0);
        assert_eq!(normalize_cpu("garbage"), 0.0);
    }

    #[test]
    fn memory_suffixes_normalize_to_kibibytes() {
        assert_eq!(normalize_mem("512Mi"), 524_288.0);
        assert_eq!(normalize_mem("1Gi"), 1_048_576.0);
        assert_eq!(normalize_mem("2Ti"), 2_147_483_648.0);
        assert_eq!(normalize_mem("100Ki"), 100.0);
        assert_eq!(normalize_mem("2048"), 2.0);
        assert_eq!(normalize_mem("0"), 0.0);
    }

    #[test]
    fn decimal_memory_converts_through_bytes() {
        assert_eq!(normalize_mem("1G").trunc() as u64, 976_562);
        assert_eq!(normalize_mem("1k"), 1_000.0 / 1_024.0);
        assert_eq!(normalize_mem("5M"), 5_000_000.0 / 1_024.0);
        assert_eq!(normalize_mem("1T"), 1_000_000_000_000.0 / 1_024.0);
    }

    fn sample(name: &str, cpu: f64) -> UsageSample {
        UsageSample {
            name: name.to_string(),
            cpu_millicores: cpu,
            memory_kibibytes: 0.0,
        }
    }

    #[test]
    fn replace_swaps_samples_wholesale() {
        let mut overlay = MetricsOverlay::new();
        overlay.replace(vec![sample("a", 1.0), sample("b", 2.0)]);
        overlay.replace(vec![sample("b", 3.0)]);

        assert!(overlay.sample("a").is_none());
        assert_eq!(overlay.sample("b").map(|s| s.cpu_millicores), Some(3.0));
    }

    #[test]
    fn degrade_keeps_stale_samples_and_suspends() {
        let mut overlay = MetricsOverlay::new();
        overlay.replace(vec![sample("a", 1.0)]);
        overlay.degrade("connection refused");

        assert!(overlay.suspended());
        assert_eq!(overlay.degraded(), Some("connection refused"));
        assert_eq!(overlay.sample("a").map(|s| s.cpu_millicores), Some(1.0));

        overlay.acknowledge();
        assert!(overlay.degraded().is_none());
        assert!(overlay.suspended());
    }

    #[test]
    fn reset_clears_everything_for_the_next_scope() {
        let mut overlay = MetricsOverlay::new();
        overlay.replace(vec![sample("a", 1.0)]);
        overlay.degrade("boom");
        overlay.reset();

        assert!(overlay.is_empty());
        assert!(overlay.degraded().is_none());
        assert!(!overlay.suspended());
    }
}
