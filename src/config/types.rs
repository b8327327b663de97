use serde::Deserialize;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub tor: TorConfig,
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    pub output: OutputConfig,
    pub site: SiteConfig,
}

/// Pipeline behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of URLs fetched concurrently per batch
    #[serde(rename = "workers-count")]
    pub workers_count: usize,

    /// How often the lifecycle controller samples the pipeline (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How many writes may accumulate before the storage commits
    #[serde(rename = "transaction-size", default = "default_transaction_size")]
    pub transaction_size: usize,

    /// Failed responses with a status at or above this value are retried
    #[serde(rename = "retry-from-status", default = "default_retry_from_status")]
    pub retry_from_status: u16,

    /// Explicit retry-class status codes; replaces `retry-from-status` when set
    #[serde(rename = "retry-status-codes", default)]
    pub retry_status_codes: Option<Vec<u16>>,

    /// Failed statuses that are retried only after a fresh exit address
    #[serde(rename = "rotate-on-status", default)]
    pub rotate_status_codes: Vec<u16>,

    /// When the producer switches the exit address
    #[serde(default)]
    pub rotation: RotationMode,
}

/// When the producer switches the exit address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationMode {
    /// After every batch
    #[default]
    EveryBatch,

    /// Only after a batch in which the classifier asked for it
    OnDemand,
}

/// Outbound proxy and client identity configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Local HTTP proxy in front of the anonymizing network
    #[serde(rename = "http-proxy", default)]
    pub http_proxy: Option<String>,

    /// User agents picked at random for every request
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

/// Tor control and IP rotation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TorConfig {
    #[serde(rename = "control-host", default = "default_control_host")]
    pub control_host: String,

    #[serde(rename = "control-port", default = "default_control_port")]
    pub control_port: u16,

    #[serde(default)]
    pub password: String,

    /// Service answering with the caller's address as plain text
    #[serde(rename = "ip-check-url", default = "default_ip_check_url")]
    pub ip_check_url: String,

    /// Ceiling on renew/check attempts for a single rotation
    #[serde(rename = "new-ip-max-attempts", default = "default_new_ip_max_attempts")]
    pub new_ip_max_attempts: u32,

    /// How many used addresses are remembered; 0 remembers all of them
    #[serde(rename = "reuse-threshold", default = "default_reuse_threshold")]
    pub reuse_threshold: usize,

    /// Pause after a circuit renewal before the address is checked (milliseconds)
    #[serde(rename = "renew-settle-ms", default = "default_renew_settle_ms")]
    pub renew_settle_ms: u64,

    /// Limit on connecting to the control port and on each reply (seconds)
    #[serde(rename = "control-timeout-secs", default = "default_control_timeout_secs")]
    pub control_timeout_secs: u64,
}

/// Work partitioning configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PartitionConfig {
    /// Number of cooperating workers sharing the index space
    #[serde(rename = "scrapers-count", default = "default_one")]
    pub scrapers_count: u64,

    /// 1-based identity of this worker
    #[serde(rename = "worker-id", default = "default_one")]
    pub worker_id: u64,

    /// Harvest ranges high-to-low
    #[serde(default = "default_true")]
    pub descending: bool,
}

/// Distributed controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Address the controller server binds to
    #[serde(default = "default_controller_bind")]
    pub bind: String,

    /// Base URL of a remote controller; makes this process a distributed worker
    #[serde(default)]
    pub url: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Target site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Registry key selecting the site capability
    pub kind: String,

    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Fragment identifying listing page URLs
    #[serde(rename = "list-url-template")]
    pub list_url_template: String,

    /// Total number of listing pages
    #[serde(rename = "lists-count")]
    pub lists_count: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            http_proxy: None,
            user_agents: default_user_agents(),
        }
    }
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            control_host: default_control_host(),
            control_port: default_control_port(),
            password: String::new(),
            ip_check_url: default_ip_check_url(),
            new_ip_max_attempts: default_new_ip_max_attempts(),
            reuse_threshold: default_reuse_threshold(),
            renew_settle_ms: default_renew_settle_ms(),
            control_timeout_secs: default_control_timeout_secs(),
        }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            scrapers_count: 1,
            worker_id: 1,
            descending: true,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bind: default_controller_bind(),
            url: None,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_transaction_size() -> usize {
    5000
}

fn default_retry_from_status() -> u16 {
    408
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0".to_string(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
    ]
}

fn default_control_host() -> String {
    "127.0.0.1".to_string()
}

fn default_control_port() -> u16 {
    9051
}

fn default_ip_check_url() -> String {
    "http://icanhazip.com/".to_string()
}

fn default_new_ip_max_attempts() -> u32 {
    1000
}

fn default_reuse_threshold() -> usize {
    10
}

fn default_control_timeout_secs() -> u64 {
    10
}

fn default_renew_settle_ms() -> u64 {
    1000
}

fn default_controller_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_one() -> u64 {
    1
}

fn default_true() -> bool {
    true
}
