use serde::Deserialize;

/// Agent configuration, loaded once at startup.
///
/// A TOML file (path given as the first CLI argument) provides the base;
/// environment variables override it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Server HTTP address (host:port).
    pub address: String,
    /// Seconds between collector samples.
    pub poll_interval: u64,
    /// Seconds between dispatcher-initiated sends.
    pub report_interval: u64,
    /// Ship one batch request per report instead of one request per metric.
    pub batch: bool,
    /// Shared HMAC key; empty disables signing.
    pub key: String,
    /// Worker count for concurrent sends; floored to 1.
    pub rate_limit: usize,
    /// PEM path of the server's RSA public key; empty disables encryption.
    pub crypto_key: String,
    /// Server gRPC address; empty means HTTP only.
    pub grpc_address: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            poll_interval: 2,
            report_interval: 10,
            batch: true,
            key: String::new(),
            rate_limit: 1,
            crypto_key: String::new(),
            grpc_address: String::new(),
        }
    }
}

impl AgentConfig {
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config: Self = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env();
        if config.rate_limit == 0 {
            config.rate_limit = 1;
        }
        Ok(config)
    }

    fn apply_env(&mut self) {
        apply_string("ADDRESS", &mut self.address);
        apply_parsed("POLL_INTERVAL", &mut self.poll_interval);
        apply_parsed("REPORT_INTERVAL", &mut self.report_interval);
        apply_parsed("BATCH", &mut self.batch);
        apply_string("KEY", &mut self.key);
        apply_parsed("RATE_LIMIT", &mut self.rate_limit);
        apply_string("CRYPTO_KEY", &mut self.crypto_key);
        apply_string("GRPC_ADDRESS", &mut self.grpc_address);
    }
}

fn apply_string(name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(name) {
        *target = value;
    }
}

fn apply_parsed<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(value) = std::env::var(name) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var = name, value = %value, "Ignoring unparseable environment override"),
        }
    }
}
