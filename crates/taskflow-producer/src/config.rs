use serde::{Deserialize, Serialize};
use taskflow_broker::{config::env_or, BrokerConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    pub broker: BrokerConfig,
    pub http_port: u16,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig {
            broker: BrokerConfig::default(),
            http_port: 8000,
        }
    }
}

impl ProducerConfig {
    pub fn from_env() -> Self {
        let defaults = ProducerConfig::default();
        ProducerConfig {
            broker: BrokerConfig::from_env(),
            http_port: env_or("HTTP_PORT", defaults.http_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        assert_eq!(ProducerConfig::default().http_port, 8000);
    }
}
