/// Settings for the process-wide tracing subscriber
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Default filter directive; `RUST_LOG` takes precedence when set
    pub log_level: String,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>, log_level: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            log_level: log_level.into(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new("babeltower", "info")
    }
}
