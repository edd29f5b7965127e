use super::{IngestionConfig, IngestionEngine};
use crate::error::Result;
use std::time::Duration;

/// Fluent construction of an [`IngestionEngine`].
pub struct IngestionBuilder {
    config: IngestionConfig,
}

impl Default for IngestionBuilder {
    fn default() -> Self {
        Self {
            config: IngestionConfig::default(),
        }
    }
}

impl IngestionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, ip: impl Into<String>, port: u16) -> Self {
        self.config.ip = ip.into();
        self.config.port = port;
        self
    }

    pub fn with_affinity_cores<I>(mut self, cores: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        self.config.affinity_cores = cores.into_iter().collect();
        self
    }

    pub fn with_pool_batch_size(mut self, size: usize) -> Self {
        self.config.pool_batch_size = size;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.config.recv_buffer_size = size;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.config.max_frame_len = len;
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl AsRef<[u8]>) -> Self {
        self.config.sentinel = sentinel.as_ref().to_vec();
        self
    }

    /// The configuration collected so far.
    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Validate the configuration and create a stopped engine.
    pub fn build(self) -> Result<IngestionEngine> {
        IngestionEngine::new(self.config)
    }
}
