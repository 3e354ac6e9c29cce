use std::time::Duration;
use writer::WriteMethod;

/// Mirrors the configuration key table: every key the agent reads, with the
/// same defaults and range checks. `AgentConfig::validate` is the only way
/// of producing one from deserialized input, so a bad value is a startup
/// failure rather than something that surfaces later as a confusing panic.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default = "default_wise_host")]
    pub wise_host: String,
    #[serde(default = "default_wise_port")]
    pub wise_port: u16,
    #[serde(default = "default_wise_max_conns")]
    pub wise_max_conns: u32,
    #[serde(default = "default_wise_max_requests")]
    pub wise_max_requests: u32,
    #[serde(default = "default_wise_max_cache")]
    pub wise_max_cache: usize,
    #[serde(default = "default_wise_cache_secs")]
    pub wise_cache_secs: u32,
    #[serde(default = "default_pcap_write_method")]
    pub pcap_write_method: String,
    pub pcap_write_size: usize,
    pub max_file_size_bytes: u64,
    pub max_file_time_minutes: Option<u64>,
    pub max_free_output_buffers: usize,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_wise_host() -> String {
    "127.0.0.1".to_string()
}
fn default_wise_port() -> u16 {
    8081
}
fn default_wise_max_conns() -> u32 {
    10
}
fn default_wise_max_requests() -> u32 {
    100
}
fn default_wise_max_cache() -> usize {
    100_000
}
fn default_wise_cache_secs() -> u32 {
    600
}
fn default_pcap_write_method() -> String {
    "thread-direct".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("wise_port must be in 1..=65535, got {0}")]
    WisePort(u16),
    #[error("wise_max_conns must be in 1..=60, got {0}")]
    WiseMaxConns(u32),
    #[error("wise_max_requests must be in 1..=50000, got {0}")]
    WiseMaxRequests(u32),
    #[error("wise_max_cache must be in 1..=500000, got {0}")]
    WiseMaxCache(usize),
    #[error("wise_cache_secs must be in 1..=5000, got {0}")]
    WiseCacheSecs(u32),
    #[error(transparent)]
    WriteMethod(#[from] WriteMethodError),
    #[error(
        "pcap_write_size ({pcap_write_size}) must be a multiple of the system page size \
         ({page_size}) under a direct pcapWriteMethod"
    )]
    UnalignedWriteSize {
        pcap_write_size: usize,
        page_size: usize,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("unknown pcap_write_method '{0}'")]
pub struct WriteMethodError(String);

impl AgentConfig {
    /// Parses and range-checks every field, matching the fatal-at-startup
    /// posture for configuration errors. Returns the parsed write method
    /// alongside, since `clap`/`serde` only carry the raw string.
    pub fn validate(&self) -> Result<WriteMethod, ConfigError> {
        if self.wise_port == 0 {
            return Err(ConfigError::WisePort(self.wise_port));
        }
        if !(1..=60).contains(&self.wise_max_conns) {
            return Err(ConfigError::WiseMaxConns(self.wise_max_conns));
        }
        if !(1..=50_000).contains(&self.wise_max_requests) {
            return Err(ConfigError::WiseMaxRequests(self.wise_max_requests));
        }
        if !(1..=500_000).contains(&self.wise_max_cache) {
            return Err(ConfigError::WiseMaxCache(self.wise_max_cache));
        }
        if !(1..=5_000).contains(&self.wise_cache_secs) {
            return Err(ConfigError::WiseCacheSecs(self.wise_cache_secs));
        }

        let write_method: WriteMethod = self
            .pcap_write_method
            .parse()
            .map_err(|_| WriteMethodError(self.pcap_write_method.clone()))?;

        if write_method.uses_direct() {
            let page_size = page_size();
            if self.pcap_write_size % page_size != 0 {
                return Err(ConfigError::UnalignedWriteSize {
                    pcap_write_size: self.pcap_write_size,
                    page_size,
                });
            }
        }

        Ok(write_method)
    }

    pub fn max_file_time(&self) -> Option<Duration> {
        self.max_file_time_minutes.map(|m| Duration::from_secs(m * 60))
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

impl Default for AgentConfig {
    /// Values for the smoke-test binary to fall back on when run without a
    /// `--config` file: the same defaults as the key table, plus page-sized
    /// picks for the three keys the table leaves without one.
    fn default() -> Self {
        AgentConfig {
            wise_host: default_wise_host(),
            wise_port: default_wise_port(),
            wise_max_conns: default_wise_max_conns(),
            wise_max_requests: default_wise_max_requests(),
            wise_max_cache: default_wise_max_cache(),
            wise_cache_secs: default_wise_cache_secs(),
            pcap_write_method: default_pcap_write_method(),
            pcap_write_size: page_size(),
            max_file_size_bytes: 10 * 1024 * 1024,
            max_file_time_minutes: None,
            max_free_output_buffers: 16,
            dry_run: false,
        }
    }
}
