//! Gauge sinks monitors write through.

use crate::watch::traits::GaugeSink;
use metrics::Label;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Gauge published through the `metrics` facade.
///
/// Values only reach the exposition endpoint once a recorder, normally the
/// Prometheus one, has been installed for the process.
#[derive(Debug, Clone)]
pub struct PrometheusGauge {
    name: String,
    label_names: Vec<String>,
}

impl PrometheusGauge {
    /// Describe the gauge to the installed recorder.
    pub fn register(name: impl Into<String>, help: impl Into<String>, label_names: Vec<String>) -> Self {
        let name = name.into();
        metrics::describe_gauge!(name.clone(), help.into());
        Self { name, label_names }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

impl GaugeSink for PrometheusGauge {
    fn set(&self, labels: &[String], value: f64) {
        let labels: Vec<Label> = self
            .label_names
            .iter()
            .zip(labels)
            .map(|(name, value)| Label::new(name.clone(), value.clone()))
            .collect();
        metrics::gauge!(self.name.clone(), labels).set(value);
    }
}

/// In-memory gauge keeping every write and the latest value per label set.
#[derive(Debug, Default)]
pub struct MemoryGauge {
    inner: Mutex<MemoryGaugeState>,
}

#[derive(Debug, Default)]
struct MemoryGaugeState {
    writes: Vec<(Vec<String>, f64)>,
    latest: BTreeMap<Vec<String>, f64>,
}

impl MemoryGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write in order.
    pub fn writes(&self) -> Vec<(Vec<String>, f64)> {
        self.state().writes.clone()
    }

    /// Current value of one label set.
    pub fn get(&self, labels: &[&str]) -> Option<f64> {
        let key: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.state().latest.get(&key).copied()
    }

    /// Current value of every label set.
    pub fn values(&self) -> BTreeMap<Vec<String>, f64> {
        self.state().latest.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryGaugeState> {
        // A panicking writer cannot leave the maps half updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GaugeSink for MemoryGauge {
    fn set(&self, labels: &[String], value: f64) {
        let mut state = self.state();
        state.writes.push((labels.to_vec(), value));
        state.latest.insert(labels.to_vec(), value);
    }
}
