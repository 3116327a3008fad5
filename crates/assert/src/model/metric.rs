use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::lenient;

/// Label set of a sample.
pub type Labels = BTreeMap<String, String>;

/// Type of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// Monotonic counter
    Counter,
    /// Gauge
    Gauge,
    /// Family without a `# TYPE` line
    Untyped,
    /// Summary with quantiles
    Summary,
    /// Histogram with buckets
    Histogram,
}

impl MetricType {
    /// Upper-case name as written in snapshot files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "COUNTER",
            Self::Gauge => "GAUGE",
            Self::Untyped => "UNTYPED",
            Self::Summary => "SUMMARY",
            Self::Histogram => "HISTOGRAM",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "counter" => Ok(Self::Counter),
            "gauge" => Ok(Self::Gauge),
            "untyped" | "unknown" | "" => Ok(Self::Untyped),
            "summary" => Ok(Self::Summary),
            "histogram" => Ok(Self::Histogram),
            other => Err(format!("unknown metric type '{other}'")),
        }
    }
}

impl Serialize for MetricType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MetricType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A counter, gauge or untyped sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainSample {
    /// Labels
    #[serde(default, deserialize_with = "lenient::string_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    /// Sample timestamp in milliseconds, if exposed
    #[serde(default, deserialize_with = "lenient::optional_string", skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<String>,
    /// Value
    #[serde(default, deserialize_with = "lenient::string")]
    pub value: String,
}

/// A summary sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarySample {
    /// Labels
    #[serde(default, deserialize_with = "lenient::string_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    /// Sample timestamp in milliseconds, if exposed
    #[serde(default, deserialize_with = "lenient::optional_string", skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<String>,
    /// Quantile → value
    #[serde(default, deserialize_with = "lenient::string_map")]
    pub quantiles: BTreeMap<String, String>,
    /// Observation count
    #[serde(default, deserialize_with = "lenient::string")]
    pub count: String,
    /// Observation sum
    #[serde(default, deserialize_with = "lenient::string")]
    pub sum: String,
}

/// A histogram sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramSample {
    /// Labels
    #[serde(default, deserialize_with = "lenient::string_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    /// Sample timestamp in milliseconds, if exposed
    #[serde(default, deserialize_with = "lenient::optional_string", skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<String>,
    /// Upper bound → cumulative count
    #[serde(default, deserialize_with = "lenient::string_map")]
    pub buckets: BTreeMap<String, String>,
    /// Observation count
    #[serde(default, deserialize_with = "lenient::string")]
    pub count: String,
    /// Observation sum
    #[serde(default, deserialize_with = "lenient::string")]
    pub sum: String,
}

/// One sample of a family; its shape follows the family type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Sample {
    /// Counter, gauge or untyped
    Plain(PlainSample),
    /// Summary
    Summary(SummarySample),
    /// Histogram
    Histogram(HistogramSample),
}

impl Sample {
    /// Labels of the sample, whatever its shape.
    #[must_use]
    pub const fn labels(&self) -> &Labels {
        match self {
            Self::Plain(s) => &s.labels,
            Self::Summary(s) => &s.labels,
            Self::Histogram(s) => &s.labels,
        }
    }

    /// Name of the sample shape, for diagnostics.
    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Plain(_) => "plain",
            Self::Summary(_) => "summary",
            Self::Histogram(_) => "histogram",
        }
    }

    fn from_value(kind: MetricType, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            MetricType::Summary => Self::Summary(serde_json::from_value(value)?),
            MetricType::Histogram => Self::Histogram(serde_json::from_value(value)?),
            MetricType::Counter | MetricType::Gauge | MetricType::Untyped => {
                Self::Plain(serde_json::from_value(value)?)
            }
        })
    }
}

/// A named group of samples sharing a metric type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFamily")]
pub struct Family {
    /// Family name; on the expected side it may carry a `notContains ` prefix
    pub name: String,
    /// Help text
    #[serde(default)]
    pub help: String,
    /// Metric type
    #[serde(rename = "type")]
    pub kind: MetricType,
    /// Samples
    pub metrics: Vec<Sample>,
}

impl Family {
    /// Create an empty family.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: MetricType) -> Self {
        Self {
            name: name.into(),
            help: String::new(),
            kind,
            metrics: Vec::new(),
        }
    }
}

/// Wire form of a family; samples are decoded once the type is known.
#[derive(Deserialize)]
struct RawFamily {
    name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    help: String,
    #[serde(rename = "type", default = "untyped")]
    kind: MetricType,
    #[serde(default)]
    metrics: Vec<serde_json::Value>,
}

const fn untyped() -> MetricType {
    MetricType::Untyped
}

impl TryFrom<RawFamily> for Family {
    type Error = String;

    fn try_from(raw: RawFamily) -> Result<Self, Self::Error> {
        let metrics = raw
            .metrics
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                Sample::from_value(raw.kind, value)
                    .map_err(|e| format!("family '{}' sample #{i}: {e}", raw.name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: raw.name,
            help: raw.help,
            kind: raw.kind,
            metrics,
        })
    }
}
