use crate::error::{IngestError, Result};
use crate::Core::affinity;
use crate::Core::pool::{DEFAULT_GROWTH_BATCH, MAX_GROWTH_BATCH};
use crate::Ingestion::framer::DELIMITER;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Settings for an [`IngestionEngine`](crate::IngestionEngine).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestionConfig {
    /// IP address of the data source.
    pub ip: String,
    /// TCP port of the data source.
    pub port: u16,
    /// One worker is spawned per entry, pinned to that logical CPU.
    pub affinity_cores: Vec<usize>,
    /// Slots added to the record pool each time it runs dry.
    pub pool_batch_size: usize,
    /// Bytes read per `recv` call.
    pub read_buffer_size: usize,
    /// Requested `SO_RCVBUF` for each worker socket.
    pub recv_buffer_size: usize,
    /// Upper bound on one readiness wait; also bounds stop latency.
    pub poll_timeout: Duration,
    /// Longest frame a worker will buffer before giving up on the connection.
    pub max_frame_len: usize,
    /// Frame content that ends the stream.
    pub sentinel: Vec<u8>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 5555,
            affinity_cores: vec![0],
            pool_batch_size: DEFAULT_GROWTH_BATCH,
            read_buffer_size: 4096,
            recv_buffer_size: 8 * 1024 * 1024, // 8MB
            poll_timeout: Duration::from_secs(1),
            max_frame_len: 1024 * 1024, // 1MB
            sentinel: b"STOP".to_vec(),
        }
    }
}

impl IngestionConfig {
    /// Check every setting and resolve the endpoint address.
    ///
    /// Runs before any thread or socket exists, so a rejected config leaves
    /// nothing behind.
    pub fn validate(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .ip
            .trim()
            .parse()
            .map_err(|_| IngestError::InvalidAddress {
                ip: self.ip.clone(),
                port: self.port,
            })?;
        if self.port == 0 {
            return Err(IngestError::InvalidAddress {
                ip: self.ip.clone(),
                port: self.port,
            });
        }

        if self.affinity_cores.is_empty() {
            return Err(IngestError::NoWorkers);
        }
        let available = affinity::online_cpus();
        if let Some(&core) = self.affinity_cores.iter().find(|&&c| c >= available) {
            return Err(IngestError::InvalidCore { core, available });
        }

        if self.pool_batch_size == 0 || self.pool_batch_size > MAX_GROWTH_BATCH {
            return Err(IngestError::InvalidSetting {
                name: "pool_batch_size",
                reason: "must be between 1 and 2^24",
            });
        }
        if self.read_buffer_size == 0 {
            return Err(IngestError::InvalidSetting {
                name: "read_buffer_size",
                reason: "must be non-zero",
            });
        }
        if self.max_frame_len == 0 {
            return Err(IngestError::InvalidSetting {
                name: "max_frame_len",
                reason: "must be non-zero",
            });
        }
        if self.poll_timeout.is_zero() {
            return Err(IngestError::InvalidSetting {
                name: "poll_timeout",
                reason: "must be non-zero",
            });
        }
        if self.sentinel.is_empty() || self.sentinel.contains(&DELIMITER) {
            return Err(IngestError::InvalidSetting {
                name: "sentinel",
                reason: "must be non-empty and free of the frame delimiter",
            });
        }

        Ok(SocketAddr::new(ip, self.port))
    }
}
