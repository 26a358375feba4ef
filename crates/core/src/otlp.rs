//! OTLP/JSON unpacking into flat rows.
//!
//! Collector exports land in object storage as `Export*ServiceRequest`
//! envelopes encoded as JSON. This module flattens them into one row per
//! span, log record or metric data point, matching the raw table layouts.
//!
//! Integers may arrive as JSON numbers or strings (proto3 JSON encodes
//! 64-bit values as strings) and enums as numbers or names; both are accepted.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::signal::Signal;

/// Flattened attribute map, sorted by key.
pub type Attributes = BTreeMap<String, String>;

const UNKNOWN_SERVICE: &str = "unknown";

const SPAN_KIND_NAMES: [&str; 6] = [
    "SPAN_KIND_UNSPECIFIED",
    "SPAN_KIND_INTERNAL",
    "SPAN_KIND_SERVER",
    "SPAN_KIND_CLIENT",
    "SPAN_KIND_PRODUCER",
    "SPAN_KIND_CONSUMER",
];

const STATUS_CODE_NAMES: [&str; 3] = ["STATUS_CODE_UNSET", "STATUS_CODE_OK", "STATUS_CODE_ERROR"];

const SEVERITY_NAMES: [&str; 25] = [
    "UNSPECIFIED", "TRACE", "TRACE2", "TRACE3", "TRACE4", "DEBUG", "DEBUG2", "DEBUG3", "DEBUG4",
    "INFO", "INFO2", "INFO3", "INFO4", "WARN", "WARN2", "WARN3", "WARN4", "ERROR", "ERROR2",
    "ERROR3", "ERROR4", "FATAL", "FATAL2", "FATAL3", "FATAL4",
];

// ============================================================================
// Flattened rows
// ============================================================================

/// Event attached to a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub timestamp_ns: i64,
    pub name: String,
    pub attributes: Attributes,
}

/// Link from a span to another span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanLink {
    pub trace_id: String,
    pub span_id: String,
    pub trace_state: String,
    pub attributes: Attributes,
}

/// One span, as stored in `otel_traces`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub timestamp_ns: i64,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: String,
    pub trace_state: String,
    pub span_name: String,
    pub span_kind: String,
    pub service_name: String,
    pub resource_attributes: Attributes,
    pub scope_name: String,
    pub scope_version: String,
    pub span_attributes: Attributes,
    pub duration_ns: u64,
    pub status_code: String,
    pub status_message: String,
    pub events: Vec<SpanEvent>,
    pub links: Vec<SpanLink>,
}

/// One log record, as stored in `otel_logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp_ns: i64,
    pub trace_id: String,
    pub span_id: String,
    pub severity_number: u8,
    pub severity_text: String,
    pub body: String,
    pub service_name: String,
    pub resource_attributes: Attributes,
    pub log_attributes: Attributes,
}

/// One metric data point, as stored in `otel_metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp_ns: i64,
    pub metric_name: String,
    pub metric_description: String,
    pub metric_unit: String,
    pub metric_type: String,
    pub value: f64,
    pub service_name: String,
    pub resource_attributes: Attributes,
    pub metric_attributes: Attributes,
}

/// Rows unpacked from one file.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalBatch {
    Traces(Vec<Span>),
    Logs(Vec<LogRecord>),
    Metrics(Vec<MetricPoint>),
}

impl SignalBatch {
    pub fn signal(&self) -> Signal {
        match self {
            Self::Traces(_) => Signal::Traces,
            Self::Logs(_) => Signal::Logs,
            Self::Metrics(_) => Signal::Metrics,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Traces(rows) => rows.len(),
            Self::Logs(rows) => rows.len(),
            Self::Metrics(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unpack one OTLP/JSON envelope of the given signal.
pub fn unpack(signal: Signal, raw: &[u8]) -> Result<SignalBatch> {
    match signal {
        Signal::Traces => unpack_traces(raw).map(SignalBatch::Traces),
        Signal::Logs => unpack_logs(raw).map(SignalBatch::Logs),
        Signal::Metrics => unpack_metrics(raw).map(SignalBatch::Metrics),
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyValue {
    key: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Default, Deserialize)]
struct Resource {
    #[serde(default)]
    attributes: Vec<KeyValue>,
}

#[derive(Debug, Default, Deserialize)]
struct Scope {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

/// Enum encoded either by number or by name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnumCode {
    Number(i64),
    Name(String),
}

impl Default for EnumCode {
    fn default() -> Self {
        Self::Number(0)
    }
}

impl EnumCode {
    /// Resolve against a name table, falling back to the first entry.
    fn name_in(&self, names: &[&'static str]) -> &'static str {
        let found = match self {
            Self::Number(n) => usize::try_from(*n).ok().and_then(|i| names.get(i)),
            Self::Name(s) => names.iter().find(|n| **n == s.as_str()),
        };
        found.copied().unwrap_or(names[0])
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportTraceRequest {
    #[serde(default)]
    resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSpans {
    #[serde(default)]
    resource: Resource,
    #[serde(default)]
    scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Deserialize)]
struct ScopeSpans {
    #[serde(default)]
    scope: Scope,
    #[serde(default)]
    spans: Vec<WireSpan>,
}

#[derive(Debug, Default, Deserialize)]
struct WireStatus {
    #[serde(default)]
    code: EnumCode,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSpan {
    trace_id: String,
    span_id: String,
    #[serde(default)]
    parent_span_id: String,
    #[serde(default)]
    trace_state: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    kind: EnumCode,
    #[serde(default, deserialize_with = "de_u64")]
    start_time_unix_nano: u64,
    #[serde(default, deserialize_with = "de_u64")]
    end_time_unix_nano: u64,
    #[serde(default)]
    attributes: Vec<KeyValue>,
    #[serde(default)]
    events: Vec<WireEvent>,
    #[serde(default)]
    links: Vec<WireLink>,
    #[serde(default)]
    status: WireStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(default, deserialize_with = "de_u64")]
    time_unix_nano: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    attributes: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLink {
    #[serde(default)]
    trace_id: String,
    #[serde(default)]
    span_id: String,
    #[serde(default)]
    trace_state: String,
    #[serde(default)]
    attributes: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportLogsRequest {
    #[serde(default)]
    resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceLogs {
    #[serde(default)]
    resource: Resource,
    #[serde(default)]
    scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeLogs {
    #[serde(default)]
    log_records: Vec<WireLogRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLogRecord {
    #[serde(default, deserialize_with = "de_u64")]
    time_unix_nano: u64,
    #[serde(default, deserialize_with = "de_u64")]
    observed_time_unix_nano: u64,
    #[serde(default)]
    trace_id: String,
    #[serde(default)]
    span_id: String,
    #[serde(default)]
    severity_number: EnumCode,
    #[serde(default)]
    severity_text: String,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    attributes: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportMetricsRequest {
    #[serde(default)]
    resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceMetrics {
    #[serde(default)]
    resource: Resource,
    #[serde(default)]
    scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Deserialize)]
struct ScopeMetrics {
    #[serde(default)]
    metrics: Vec<WireMetric>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetric {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    unit: String,
    gauge: Option<NumberPoints>,
    sum: Option<NumberPoints>,
    histogram: Option<SumPoints>,
    exponential_histogram: Option<SumPoints>,
    summary: Option<SumPoints>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NumberPoints {
    #[serde(default)]
    data_points: Vec<NumberDataPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NumberDataPoint {
    #[serde(default)]
    attributes: Vec<KeyValue>,
    #[serde(default, deserialize_with = "de_u64")]
    time_unix_nano: u64,
    as_double: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    as_int: Option<i64>,
}

impl NumberDataPoint {
    fn value(&self) -> f64 {
        match (self.as_double, self.as_int) {
            (Some(d), _) if d != 0.0 => d,
            (_, Some(i)) => i as f64,
            (Some(d), None) => d,
            (None, None) => 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SumPoints {
    #[serde(default)]
    data_points: Vec<SumDataPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SumDataPoint {
    #[serde(default)]
    attributes: Vec<KeyValue>,
    #[serde(default, deserialize_with = "de_u64")]
    time_unix_nano: u64,
    sum: Option<f64>,
}

fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| de::Error::custom(format!("expected unsigned integer, got {}", n))),
        Value::String(s) => s.parse().map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected integer, got {}", other))),
    }
}

fn de_opt_i64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected integer, got {}", n))),
        Value::String(s) => s.parse().map(Some).map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected integer, got {}", other))),
    }
}

// ============================================================================
// Flattening helpers
// ============================================================================

/// Render an `AnyValue` as a string.
///
/// Scalars render as their plain value (`true`/`false` for booleans);
/// arrays, key/value lists and bytes render as compact JSON.
pub fn flatten_any_value(value: &Value) -> String {
    let Value::Object(obj) = value else {
        return match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    };

    if let Some(Value::String(s)) = obj.get("stringValue") {
        return s.clone();
    }
    if let Some(Value::Bool(b)) = obj.get("boolValue") {
        return b.to_string();
    }
    match obj.get("intValue") {
        Some(Value::String(s)) => return s.clone(),
        Some(Value::Number(n)) => return n.to_string(),
        _ => {}
    }
    if let Some(d) = obj.get("doubleValue").and_then(Value::as_f64) {
        return format!("{:?}", d);
    }
    if obj.is_empty() {
        return String::new();
    }
    value.to_string()
}

fn flatten_attributes(attrs: &[KeyValue]) -> Attributes {
    attrs
        .iter()
        .map(|kv| (kv.key.clone(), flatten_any_value(&kv.value)))
        .collect()
}

fn service_name(resource_attrs: &Attributes) -> String {
    resource_attrs
        .get("service.name")
        .cloned()
        .unwrap_or_else(|| UNKNOWN_SERVICE.to_string())
}

fn normalize_id(id: &str) -> String {
    id.to_ascii_lowercase()
}

fn nanos(ns: u64) -> i64 {
    i64::try_from(ns).unwrap_or(i64::MAX)
}

fn parse_envelope<'a, T: Deserialize<'a>>(signal: Signal, raw: &'a [u8]) -> Result<T> {
    serde_json::from_slice(raw)
        .map_err(|e| Error::parse(format!("invalid OTLP {} envelope: {}", signal, e)))
}

// ============================================================================
// Unpackers
// ============================================================================

/// Flatten an `ExportTraceServiceRequest` into span rows.
pub fn unpack_traces(raw: &[u8]) -> Result<Vec<Span>> {
    let request: ExportTraceRequest = parse_envelope(Signal::Traces, raw)?;

    let mut rows = Vec::new();
    for resource_spans in request.resource_spans {
        let resource_attributes = flatten_attributes(&resource_spans.resource.attributes);
        let service_name = service_name(&resource_attributes);

        for scope_spans in resource_spans.scope_spans {
            for span in scope_spans.spans {
                let events = span
                    .events
                    .iter()
                    .map(|e| SpanEvent {
                        timestamp_ns: nanos(e.time_unix_nano),
                        name: e.name.clone(),
                        attributes: flatten_attributes(&e.attributes),
                    })
                    .collect();

                let links = span
                    .links
                    .iter()
                    .map(|l| SpanLink {
                        trace_id: normalize_id(&l.trace_id),
                        span_id: normalize_id(&l.span_id),
                        trace_state: l.trace_state.clone(),
                        attributes: flatten_attributes(&l.attributes),
                    })
                    .collect();

                rows.push(Span {
                    timestamp_ns: nanos(span.start_time_unix_nano),
                    trace_id: normalize_id(&span.trace_id),
                    span_id: normalize_id(&span.span_id),
                    parent_span_id: normalize_id(&span.parent_span_id),
                    trace_state: span.trace_state,
                    span_name: span.name,
                    span_kind: span.kind.name_in(&SPAN_KIND_NAMES).to_string(),
                    service_name: service_name.clone(),
                    resource_attributes: resource_attributes.clone(),
                    scope_name: scope_spans.scope.name.clone(),
                    scope_version: scope_spans.scope.version.clone(),
                    span_attributes: flatten_attributes(&span.attributes),
                    duration_ns: span
                        .end_time_unix_nano
                        .saturating_sub(span.start_time_unix_nano),
                    status_code: span.status.code.name_in(&STATUS_CODE_NAMES).to_string(),
                    status_message: span.status.message,
                    events,
                    links,
                });
            }
        }
    }

    Ok(rows)
}

fn severity_number(code: &EnumCode) -> u8 {
    let index = match code {
        EnumCode::Number(n) => usize::try_from(*n).ok(),
        EnumCode::Name(s) => {
            let bare = s.strip_prefix("SEVERITY_NUMBER_").unwrap_or(s);
            SEVERITY_NAMES.iter().position(|n| *n == bare)
        }
    };
    index
        .filter(|i| *i < SEVERITY_NAMES.len())
        .and_then(|i| u8::try_from(i).ok())
        .unwrap_or(0)
}

/// Flatten an `ExportLogsServiceRequest` into log rows.
///
/// Records without an event time fall back to their observed time.
pub fn unpack_logs(raw: &[u8]) -> Result<Vec<LogRecord>> {
    let request: ExportLogsRequest = parse_envelope(Signal::Logs, raw)?;

    let mut rows = Vec::new();
    for resource_logs in request.resource_logs {
        let resource_attributes = flatten_attributes(&resource_logs.resource.attributes);
        let service_name = service_name(&resource_attributes);

        for scope_logs in resource_logs.scope_logs {
            for record in scope_logs.log_records {
                let ts = if record.time_unix_nano != 0 {
                    record.time_unix_nano
                } else {
                    record.observed_time_unix_nano
                };
                let severity_number = severity_number(&record.severity_number);
                let severity_text = if record.severity_text.is_empty() {
                    SEVERITY_NAMES[usize::from(severity_number)].to_string()
                } else {
                    record.severity_text
                };

                rows.push(LogRecord {
                    timestamp_ns: nanos(ts),
                    trace_id: normalize_id(&record.trace_id),
                    span_id: normalize_id(&record.span_id),
                    severity_number,
                    severity_text,
                    body: flatten_any_value(&record.body),
                    service_name: service_name.clone(),
                    resource_attributes: resource_attributes.clone(),
                    log_attributes: flatten_attributes(&record.attributes),
                });
            }
        }
    }

    Ok(rows)
}

/// Metric type name and `(timestamp, value, attributes)` per data point.
fn metric_points(metric: &WireMetric) -> (&'static str, Vec<(u64, f64, Attributes)>) {
    let number = |points: &NumberPoints| {
        points
            .data_points
            .iter()
            .map(|dp| (dp.time_unix_nano, dp.value(), flatten_attributes(&dp.attributes)))
            .collect()
    };
    let summed = |points: &SumPoints| {
        points
            .data_points
            .iter()
            .map(|dp| {
                (
                    dp.time_unix_nano,
                    dp.sum.unwrap_or(0.0),
                    flatten_attributes(&dp.attributes),
                )
            })
            .collect()
    };

    if let Some(ref g) = metric.gauge {
        ("Gauge", number(g))
    } else if let Some(ref s) = metric.sum {
        ("Sum", number(s))
    } else if let Some(ref h) = metric.histogram {
        ("Histogram", summed(h))
    } else if let Some(ref h) = metric.exponential_histogram {
        ("ExponentialHistogram", summed(h))
    } else if let Some(ref s) = metric.summary {
        ("Summary", summed(s))
    } else {
        ("Unknown", Vec::new())
    }
}

/// Flatten an `ExportMetricsServiceRequest` into one row per data point.
pub fn unpack_metrics(raw: &[u8]) -> Result<Vec<MetricPoint>> {
    let request: ExportMetricsRequest = parse_envelope(Signal::Metrics, raw)?;

    let mut rows = Vec::new();
    for resource_metrics in request.resource_metrics {
        let resource_attributes = flatten_attributes(&resource_metrics.resource.attributes);
        let service_name = service_name(&resource_attributes);

        for scope_metrics in resource_metrics.scope_metrics {
            for metric in scope_metrics.metrics {
                let (metric_type, points) = metric_points(&metric);
                for (ts, value, metric_attributes) in points {
                    rows.push(MetricPoint {
                        timestamp_ns: nanos(ts),
                        metric_name: metric.name.clone(),
                        metric_description: metric.description.clone(),
                        metric_unit: metric.unit.clone(),
                        metric_type: metric_type.to_string(),
                        value,
                        service_name: service_name.clone(),
                        resource_attributes: resource_attributes.clone(),
                        metric_attributes,
                    });
                }
            }
        }
    }

    Ok(rows)
}
