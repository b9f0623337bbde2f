use derive_more::Display;

/// A unique id identifying one broker process in the cluster.
#[derive(
    Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display,
)]
pub struct BrokerId(pub i32);

/// Immutable description of a registered broker. Serialized as the payload of the
/// broker's ephemeral record, so it lives exactly as long as the owning session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Broker {
    pub id: BrokerId,
    pub host: String,
    pub port: u16,
}

impl Broker {
    pub fn new(id: BrokerId, host: impl Into<String>, port: u16) -> Self {
        Broker {
            id,
            host: host.into(),
            port,
        }
    }
}
