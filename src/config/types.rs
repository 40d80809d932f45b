use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for cdrflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where the CDR exports come from
    #[serde(default)]
    pub input: InputConfig,

    /// Where the normalized leg stream goes
    #[serde(default)]
    pub output: OutputConfig,

    /// SIP endpoint directory export
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Internal extension numbering
    #[serde(default)]
    pub extensions: ExtensionConfig,

    /// Routing (CMS/pilot) numbers, unioned with auto-detected ones
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Voicemail pilot
    #[serde(default)]
    pub voicemail: VoicemailConfig,

    /// Streaming behavior
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Logging
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Input location: a directory of CDR exports or a single file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    pub path: PathBuf,
}

/// Output CSV target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
}

/// SIP endpoint directory export location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// XML export of `<SipEndpoint>` entries. Absent means no directory;
    /// direction resolution then leans on party-id markers.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Extension numbering plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// Exact numbers or inclusive `LOW-HIGH` ranges. Empty enables
    /// discovery mode.
    #[serde(default)]
    pub ranges: Vec<String>,
}

/// Known routing numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub numbers: Vec<String>,
}

/// Voicemail pilot number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoicemailConfig {
    /// Configured pilot; absent means the first auto-detected pilot of the
    /// run is used.
    #[serde(default)]
    pub number: Option<String>,
}

/// Streaming behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Evict oldest groups once the cache holds more legs than this.
    /// 0 disables eviction.
    #[serde(default)]
    pub max_cached_legs: usize,

    /// Emit calls as soon as their direction is unambiguous.
    #[serde(default)]
    pub detect_completion: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        StreamingConfig {
            max_cached_legs: 0,
            detect_completion: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}
