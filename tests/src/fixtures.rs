//! OTLP/JSON file generators.

use serde_json::{json, Value};

/// 2024-01-01T00:00:00Z in nanoseconds.
pub const JAN_1_2024_NS: i64 = 1_704_067_200_000_000_000;

/// One day in nanoseconds.
pub const DAY_NS: i64 = 86_400_000_000_000;

fn resource(service: &str) -> Value {
    json!({
        "attributes": [
            {"key": "service.name", "value": {"stringValue": service}},
            {"key": "deployment.environment", "value": {"stringValue": "test"}}
        ]
    })
}

/// A span id that sorts by `n`.
pub fn span_id(seed: u32, n: usize) -> String {
    format!("{:08x}{:08x}", seed, n)
}

/// Trace export with `n` spans starting at `start_ns`, one millisecond apart.
pub fn trace_file(service: &str, seed: u32, n: usize, start_ns: i64) -> String {
    let spans: Vec<Value> = (0..n)
        .map(|i| {
            let start = start_ns + i as i64 * 1_000_000;
            json!({
                "traceId": format!("{:024x}{:08x}", seed, i),
                "spanId": span_id(seed, i),
                "name": format!("GET /items/{}", i),
                "kind": 2,
                "startTimeUnixNano": start.to_string(),
                "endTimeUnixNano": (start + 5_000_000).to_string(),
                "attributes": [
                    {"key": "http.method", "value": {"stringValue": "GET"}},
                    {"key": "http.status_code", "value": {"intValue": "200"}}
                ],
                "status": {"code": 1}
            })
        })
        .collect();

    json!({
        "resourceSpans": [{
            "resource": resource(service),
            "scopeSpans": [{"scope": {"name": "integration-tests"}, "spans": spans}]
        }]
    })
    .to_string()
}

/// Log export with `n` records.
pub fn log_file(service: &str, n: usize, start_ns: i64) -> String {
    let records: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "timeUnixNano": (start_ns + i as i64).to_string(),
                "severityNumber": 9,
                "body": {"stringValue": format!("request {} handled", i)}
            })
        })
        .collect();

    json!({
        "resourceLogs": [{
            "resource": resource(service),
            "scopeLogs": [{"logRecords": records}]
        }]
    })
    .to_string()
}

/// Metric export with one gauge of `n` points.
pub fn metric_file(service: &str, n: usize, start_ns: i64) -> String {
    let points: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "timeUnixNano": (start_ns + i as i64).to_string(),
                "asDouble": i as f64 * 0.5
            })
        })
        .collect();

    json!({
        "resourceMetrics": [{
            "resource": resource(service),
            "scopeMetrics": [{"metrics": [{
                "name": "queue.depth",
                "unit": "1",
                "gauge": {"dataPoints": points}
            }]}]
        }]
    })
    .to_string()
}

/// Content no loader can parse.
pub fn malformed_file() -> &'static str {
    r#"{"resourceSpans": [{"scopeSpans": "#
}
