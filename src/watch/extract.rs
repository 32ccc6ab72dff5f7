//! Turning rows into metric values.

use crate::watch::data::Row;
use crate::watch::scan::ScanPattern;

/// One value written to a gauge. Not retained after the write.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub labels: Vec<String>,
    pub value: f64,
}

/// How one label value is read from a row.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRule {
    pub header: String,
    pub format: Option<ScanPattern>,
}

impl LabelRule {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            format: None,
        }
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(ScanPattern::new(format));
        self
    }

    fn extract(&self, row: &Row) -> String {
        let Some(raw) = row.get(&self.header) else {
            return String::new();
        };
        match &self.format {
            Some(format) => format.scan_string(raw).unwrap_or_default(),
            None => raw.clone(),
        }
    }
}

/// Where a monitor finds its rows and how it reads them.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRule {
    pub source_id: String,
    pub record_id: String,
    /// Field carrying the primary value
    pub header: String,
    pub format: ScanPattern,
    /// Declaration order fixes gauge dimensionality
    pub labels: Vec<LabelRule>,
}

impl ValueRule {
    pub fn new(
        source_id: impl Into<String>,
        record_id: impl Into<String>,
        header: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            record_id: record_id.into(),
            header: header.into(),
            format: ScanPattern::default(),
            labels: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = ScanPattern::new(format);
        self
    }

    pub fn with_label(mut self, label: LabelRule) -> Self {
        self.labels.push(label);
        self
    }

    /// Label names in gauge dimension order.
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.header.clone()).collect()
    }
}

/// Extract labels and value from `row` according to `rule`.
///
/// Missing fields and scan mismatches degrade to `0.0` and empty labels.
pub fn extract(row: &Row, rule: &ValueRule) -> Metric {
    let value = row
        .get(&rule.header)
        .and_then(|raw| rule.format.scan_f64(raw))
        .unwrap_or(0.0);
    let labels = rule.labels.iter().map(|l| l.extract(row)).collect();
    Metric { labels, value }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downstream() -> Vec<Row> {
        let rows: [&[(&str, &str)]; 2] = [
            &[
                ("correcteds", "29883"),
                ("dcid", "76"),
                ("freq", "138.00 MHz"),
                ("modulation", "256QAM"),
                ("name", "Downstream 4"),
                ("power", "2.33 dBmV"),
            ],
            &[
                ("correcteds", "29882"),
                ("dcid", "75"),
                ("freq", "118.00 MHz"),
                ("modulation", "256QAM"),
                ("name", "Downstream 3"),
                ("power", "2.35 dBmV"),
            ],
        ];
        rows.iter()
            .map(|r| r.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
            .collect()
    }

    fn extract_all(rule: &ValueRule) -> Vec<Metric> {
        downstream().iter().map(|row| extract(row, rule)).collect()
    }

    fn metric(labels: &[&str], value: f64) -> Metric {
        Metric {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            value,
        }
    }

    #[test]
    fn test_missing_header_yields_zero() {
        let rule = ValueRule::new("modem", "downstream", "");
        assert_eq!(extract_all(&rule), vec![metric(&[], 0.0), metric(&[], 0.0)]);
    }

    #[test]
    fn test_integer_verb_yields_zero() {
        let rule = ValueRule::new("modem", "downstream", "correcteds").with_format("%d");
        assert_eq!(extract_all(&rule), vec![metric(&[], 0.0), metric(&[], 0.0)]);
    }

    #[test]
    fn test_default_format() {
        let rule = ValueRule::new("modem", "downstream", "correcteds");
        assert_eq!(
            extract_all(&rule),
            vec![metric(&[], 29883.0), metric(&[], 29882.0)]
        );
    }

    #[test]
    fn test_value_with_raw_labels() {
        let rule = ValueRule::new("modem", "downstream", "freq")
            .with_format("%f MHz")
            .with_label(LabelRule::new("dcid"))
            .with_label(LabelRule::new("name"));

        assert_eq!(
            extract_all(&rule),
            vec![
                metric(&["76", "Downstream 4"], 138.0),
                metric(&["75", "Downstream 3"], 118.0),
            ]
        );
        assert_eq!(rule.label_names(), vec!["dcid", "name"]);
    }

    #[test]
    fn test_value_with_scanned_labels() {
        let rule = ValueRule::new("modem", "downstream", "modulation")
            .with_format("%fQAM")
            .with_label(LabelRule::new("power").with_format("%s dBmV"));

        assert_eq!(
            extract_all(&rule),
            vec![metric(&["2.33"], 256.0), metric(&["2.35"], 256.0)]
        );
    }

    #[test]
    fn test_missing_label_field_is_empty() {
        let rule = ValueRule::new("modem", "downstream", "snr")
            .with_format("%f dB")
            .with_label(LabelRule::new("ucid").with_format("%s"))
            .with_label(LabelRule::new("name"));

        assert_eq!(
            extract_all(&rule),
            vec![
                metric(&["", "Downstream 4"], 0.0),
                metric(&["", "Downstream 3"], 0.0),
            ]
        );
    }
}
