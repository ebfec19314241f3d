use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("The lidar type \"{0}\" is not supported")]
    UnsupportedLidarType(String),
    #[error("Failed to load calibration file {}: {source}", path.display())]
    Calibration {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to read pcap file: {0}")]
    Pcap(String),
    #[error("The driver has not been initialized")]
    NotInitialized,
    #[error("The driver is running")]
    AlreadyRunning,
    #[error(transparent)]
    Io(#[from] io::Error),
}
