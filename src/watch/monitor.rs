//! Monitors turn records of a snapshot into gauge writes.

use crate::config::{MonitorConfig, MonitorKind};
use crate::watch::data::{Row, Snapshot};
use crate::watch::extract::{extract, LabelRule, ValueRule};
use crate::watch::traits::GaugeSink;
use std::sync::Arc;
use tracing::{debug, trace};

/// A named metric definition bound to its gauge.
pub struct Monitor {
    id: String,
    title: String,
    kind: MonitorKind,
    rule: ValueRule,
    gauge: Arc<dyn GaugeSink>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("kind", &self.kind)
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        rule: ValueRule,
        gauge: Arc<dyn GaugeSink>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: MonitorKind::Gauge,
            rule,
            gauge,
        }
    }

    /// Build a monitor from its configuration and the gauge it writes to.
    pub fn from_config(config: &MonitorConfig, gauge: Arc<dyn GaugeSink>) -> Self {
        let value = &config.value;
        let mut rule = ValueRule::new(&value.source_id, &value.record_id, &value.header)
            .with_format(&value.format);
        for label in &value.labels {
            rule = rule.with_label(match &label.format {
                Some(format) if !format.is_empty() => LabelRule::new(&label.header).with_format(format),
                _ => LabelRule::new(&label.header),
            });
        }

        Self {
            id: config.id.clone(),
            title: config.title.clone(),
            kind: config.kind,
            rule,
            gauge,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> MonitorKind {
        self.kind
    }

    pub fn rule(&self) -> &ValueRule {
        &self.rule
    }

    /// Write one metric per row, in row order.
    pub fn push(&self, rows: &[Row]) {
        for row in rows {
            let metric = extract(row, &self.rule);
            self.gauge.set(&metric.labels, metric.value);
            debug!(metric = %self.id, labels = ?metric.labels, value = metric.value, "Written");
        }
    }

    /// Push this monitor's rows out of `snapshot`.
    ///
    /// Returns `false` when the snapshot lacks the source or the record; the
    /// gauge then keeps its last published value.
    pub fn observe(&self, snapshot: &Snapshot) -> bool {
        match snapshot.rows(&self.rule.source_id, &self.rule.record_id) {
            Some(rows) => {
                self.push(rows);
                true
            }
            None => {
                trace!(
                    metric = %self.id,
                    source = %self.rule.source_id,
                    record = %self.rule.record_id,
                    "No data for monitor in this cycle"
                );
                false
            }
        }
    }
}
