use serde::Deserialize;

/// Server configuration, loaded once at startup and passed by reference.
///
/// Values come from a TOML file (path given as the first CLI argument) and
/// are then overridden by environment variables; a missing file means
/// defaults plus environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP bind address.
    pub address: String,
    /// Seconds between snapshot flushes for the file backend; 0 means every
    /// update writes through synchronously.
    pub store_interval: u64,
    /// Snapshot path for the file backend; empty disables file persistence.
    pub store_file: String,
    /// Load the snapshot on startup.
    pub restore: bool,
    /// SQLite DSN; non-empty selects the SQL backend.
    pub database_dsn: String,
    /// Shared HMAC key; empty disables signing and validation.
    pub key: String,
    /// Audit file observer path; empty disables it.
    pub audit_file: String,
    /// Audit HTTP observer URL; empty disables it.
    pub audit_url: String,
    /// PEM path of the RSA private key; empty disables request decryption.
    pub crypto_key: String,
    /// CIDR of allowed writers; empty admits everyone.
    pub trusted_subnet: String,
    /// gRPC bind address; empty disables the gRPC server.
    pub grpc_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            store_interval: 300,
            store_file: "metrics.json".to_string(),
            restore: false,
            database_dsn: String::new(),
            key: String::new(),
            audit_file: String::new(),
            audit_url: String::new(),
            crypto_key: String::new(),
            trusted_subnet: String::new(),
            grpc_address: String::new(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        apply_string("ADDRESS", &mut self.address);
        apply_parsed("STORE_INTERVAL", &mut self.store_interval);
        apply_string("STORE_FILE", &mut self.store_file);
        apply_parsed("RESTORE", &mut self.restore);
        apply_string("DATABASE_DSN", &mut self.database_dsn);
        apply_string("KEY", &mut self.key);
        apply_string("AUDIT_FILE", &mut self.audit_file);
        apply_string("AUDIT_URL", &mut self.audit_url);
        apply_string("CRYPTO_KEY", &mut self.crypto_key);
        apply_string("TRUSTED_SUBNET", &mut self.trusted_subnet);
        apply_string("GRPC_ADDRESS", &mut self.grpc_address);
    }
}

pub(crate) fn apply_string(name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(name) {
        *target = value;
    }
}

pub(crate) fn apply_parsed<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(value) = std::env::var(name) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var = name, value = %value, "Ignoring unparseable environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_fields() {
        let config: ServerConfig = toml::from_str(r#"address = "0.0.0.0:9000""#).unwrap();
        assert_eq!(config.address, "0.0.0.0:9000");
        assert_eq!(config.store_interval, 300);
        assert_eq!(config.store_file, "metrics.json");
        assert!(!config.restore);
        assert!(config.key.is_empty());
    }

    #[test]
    fn full_file_parses() {
        let config: ServerConfig = toml::from_str(
            r#"
                address = "0.0.0.0:8080"
                store_interval = 0
                store_file = "/tmp/m.json"
                restore = true
                database_dsn = "sqlite:///tmp/m.db"
                key = "secret"
                trusted_subnet = "10.0.0.0/8"
                grpc_address = "0.0.0.0:3200"
            "#,
        )
        .unwrap();
        assert_eq!(config.store_interval, 0);
        assert!(config.restore);
        assert_eq!(config.trusted_subnet, "10.0.0.0/8");
    }
}
