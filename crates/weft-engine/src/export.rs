//! Hook for shipping a solved topology somewhere after synthesis.

use weft_net::Network;

/// Receives the topology once extraction has populated it. Export failures
/// are reported by the driver but never change the synthesis outcome.
pub trait NetworkExporter {
    fn export(&self, network: &Network) -> std::io::Result<()>;
}

/// Writes the solved topology to a JSON file.
pub struct JsonFileExporter {
    pub path: std::path::PathBuf,
}

impl NetworkExporter for JsonFileExporter {
    fn export(&self, network: &Network) -> std::io::Result<()> {
        crate::persist::save_network(network, &self.path).map_err(|err| match err {
            crate::persist::PersistError::Io(io) => io,
            other => std::io::Error::other(other.to_string()),
        })
    }
}
