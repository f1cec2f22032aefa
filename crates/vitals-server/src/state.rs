use crate::config::ServerConfig;
use crate::service::MetricsService;
use ipnet::IpNet;
use rsa::RsaPrivateKey;
use std::path::Path;
use std::sync::Arc;
use vitals_audit::Subject;
use vitals_common::crypto;
use vitals_storage::MetricStorage;

/// Shared state handed to every request handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub service: MetricsService,
    /// HMAC key for body validation and response signing.
    pub sign_key: Option<String>,
    /// RSA private key for request decryption, loaded once at startup.
    pub private_key: Option<Arc<RsaPrivateKey>>,
    pub trusted_subnet: Option<IpNet>,
    pub audit: Arc<Subject>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn MetricStorage>,
        config: &ServerConfig,
        audit: Arc<Subject>,
    ) -> anyhow::Result<Self> {
        let sign_key = (!config.key.is_empty()).then(|| config.key.clone());
        let private_key = if config.crypto_key.is_empty() {
            None
        } else {
            Some(Arc::new(crypto::load_private_key(Path::new(
                &config.crypto_key,
            ))?))
        };
        Ok(Self {
            service: MetricsService::new(storage),
            sign_key,
            private_key,
            trusted_subnet: parse_trusted_subnet(&config.trusted_subnet),
            audit,
        })
    }
}

/// Parses the configured CIDR. An invalid value logs a warning and admits
/// all traffic rather than bricking the server on a config typo.
pub fn parse_trusted_subnet(raw: &str) -> Option<IpNet> {
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(net) => Some(net),
        Err(e) => {
            tracing::warn!(
                trusted_subnet = %raw,
                error = %e,
                "Invalid trusted subnet CIDR format, allowing all requests"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_subnet_is_disabled() {
        assert!(parse_trusted_subnet("").is_none());
    }

    #[test]
    fn valid_cidr_parses() {
        let net = parse_trusted_subnet("10.0.0.0/8").unwrap();
        assert!(net.contains(&"10.1.2.3".parse::<std::net::IpAddr>().unwrap()));
        assert!(!net.contains(&"192.168.1.1".parse::<std::net::IpAddr>().unwrap()));
    }

    #[test]
    fn invalid_cidr_admits_everyone() {
        assert!(parse_trusted_subnet("not-a-subnet").is_none());
    }
}
