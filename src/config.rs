use crate::cluster::broker::{Broker, BrokerId};
use crate::cluster::ClusterPaths;
use crate::error::{MilenaError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub id: i32,
    pub host: String,
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            id: 1,
            host: "localhost".to_string(),
            port: 9092,
        }
    }
}

impl BrokerConfig {
    pub fn broker(&self) -> Broker {
        Broker::new(BrokerId(self.id), self.host.clone(), self.port)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MilenaConfig {
    pub brokers: Vec<BrokerConfig>,
    pub paths: ClusterPaths,
}

impl Default for MilenaConfig {
    fn default() -> Self {
        Self {
            brokers: vec![BrokerConfig::default()],
            paths: ClusterPaths::default(),
        }
    }
}

pub fn config<P: AsRef<std::path::Path>>(config_path: P) -> Result<MilenaConfig> {
    let path = config_path.as_ref();
    let as_config_error = |err: config::ConfigError| MilenaError::Config {
        file_path: path.display().to_string(),
        error_msg: err.to_string(),
    };
    config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("MILENA"))
        .build()
        .map_err(as_config_error)?
        .try_deserialize()
        .map_err(as_config_error)
}
