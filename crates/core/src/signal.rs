//! Telemetry signal types and their table bindings.

use serde::{Deserialize, Serialize};

/// Telemetry signal type.
///
/// Each signal has its own object-storage prefix, raw table and file ledger;
/// loaders for different signals share no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Traces,
    Logs,
    Metrics,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Traces, Signal::Logs, Signal::Metrics];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Logs => "logs",
            Self::Metrics => "metrics",
        }
    }

    /// Raw table the signal's rows land in.
    pub const fn raw_table(&self) -> &'static str {
        match self {
            Self::Traces => "otel_traces",
            Self::Logs => "otel_logs",
            Self::Metrics => "otel_metrics",
        }
    }

    /// Ledger table recording per-file progress.
    pub const fn ledger_table(&self) -> &'static str {
        match self {
            Self::Traces => "loader_file_watermark",
            Self::Logs => "log_loader_file_watermark",
            Self::Metrics => "metric_loader_file_watermark",
        }
    }

    /// Human label for one row of this signal, used in logs.
    pub const fn row_label(&self) -> &'static str {
        match self {
            Self::Traces => "spans",
            Self::Logs => "log records",
            Self::Metrics => "data points",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Signal {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "traces" => Ok(Self::Traces),
            "logs" => Ok(Self::Logs),
            "metrics" => Ok(Self::Metrics),
            other => Err(crate::Error::config(format!("unknown signal: {}", other))),
        }
    }
}
