//! Configuration loading and validation.

mod loader;
mod types;

pub use types::{
    Config, EndpointConfig, ExtensionConfig, InputConfig, OutputConfig, RoutingConfig,
    StreamingConfig, TelemetryConfig, VoicemailConfig,
};
