use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.?\d*").expect("Invalid regex"));

/// Where a single lab value falls against its reference range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Low,
    High,
    Normal,
    /// Value or range could not be read as numbers
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthStatus::Low => "LOW",
            HealthStatus::High => "HIGH",
            HealthStatus::Normal => "NORMAL",
            HealthStatus::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedValue {
    pub parameter: String,
    pub value: String,
    pub reference_range: String,
    pub status: HealthStatus,
    /// e.g. "Hemoglobin: 10.1 g/dL (LOW - Normal: 12.0 - 15.5)"
    pub summary: String,
}

/// Compares the first number in `value` with a `min - max` reference range.
/// Bounds are inclusive. Signs are ignored, like the numbers on printed reports.
pub fn classify(value: &str, reference_range: &str) -> HealthStatus {
    let Some(value) = first_number(value) else {
        return HealthStatus::Unknown;
    };
    if !reference_range.contains('-') {
        return HealthStatus::Unknown;
    }

    let bounds: Vec<f64> = NUMBER
        .find_iter(reference_range)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    let [min, max] = bounds[..] else {
        return HealthStatus::Unknown;
    };

    if value < min {
        HealthStatus::Low
    } else if value > max {
        HealthStatus::High
    } else {
        HealthStatus::Normal
    }
}

pub fn describe(parameter: &str, value: &str, reference_range: &str) -> ClassifiedValue {
    let status = classify(value, reference_range);
    let summary = match status {
        HealthStatus::Low | HealthStatus::High => {
            format!("{parameter}: {value} ({status} - Normal: {reference_range})")
        }
        HealthStatus::Normal => format!("{parameter}: {value} (NORMAL - Range: {reference_range})"),
        HealthStatus::Unknown => format!("{parameter}: {value} (Reference: {reference_range})"),
    };
    ClassifiedValue {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reference_range: reference_range.to_string(),
        status,
        summary,
    }
}

fn first_number(text: &str) -> Option<f64> {
    NUMBER.find(text).and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_against_range() {
        assert_eq!(classify("10.1 g/dL", "12.0 - 15.5"), HealthStatus::Low);
        assert_eq!(classify("16", "12.0-15.5"), HealthStatus::High);
        assert_eq!(classify("13.2", "12.0 - 15.5"), HealthStatus::Normal);
    }

    #[test]
    fn bounds_are_inclusive() {
        assert_eq!(classify("12.0", "12.0 - 15.5"), HealthStatus::Normal);
        assert_eq!(classify("15.5", "12.0 - 15.5"), HealthStatus::Normal);
    }

    #[test]
    fn unreadable_inputs_are_unknown() {
        assert_eq!(classify("negative", "0 - 5"), HealthStatus::Unknown);
        assert_eq!(classify("4.2", "< 5.0"), HealthStatus::Unknown);
        assert_eq!(classify("4.2", "1 - 2 - 3"), HealthStatus::Unknown);
        assert_eq!(classify("4.2", "-"), HealthStatus::Unknown);
    }

    #[test]
    fn summary_names_the_status() {
        let low = describe("Hemoglobin", "10.1 g/dL", "12.0 - 15.5");
        assert_eq!(low.summary, "Hemoglobin: 10.1 g/dL (LOW - Normal: 12.0 - 15.5)");

        let unknown = describe("Glucose", "n/a", "70 - 99");
        assert_eq!(unknown.status, HealthStatus::Unknown);
        assert_eq!(unknown.summary, "Glucose: n/a (Reference: 70 - 99)");
    }
}
