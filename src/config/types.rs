use serde::Deserialize;

/// Default archive location
pub const DEFAULT_BASE_URL: &str = "https://archiveofourown.org";

/// Main configuration structure for the client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub requests: RequestsConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Where the archive lives
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Root URL every entity path is joined onto
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,
}

/// Request budget and transport timeouts
#[derive(Debug, Clone, Deserialize)]
pub struct RequestsConfig {
    /// Maximum requests per window; absent or 0 disables limiting
    #[serde(rename = "max-per-window", default)]
    pub max_per_window: Option<u32>,

    /// Length of the rolling window (seconds)
    #[serde(rename = "window-secs", default = "default_window_secs")]
    pub window_secs: u64,

    /// Overall request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_agent_version")]
    pub version: String,

    /// URL with information about whoever runs the client
    #[serde(rename = "contact-url", default)]
    pub contact_url: Option<String>,
}

/// Location of the pre-populated reference data
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourcesConfig {
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,
}

/// Bounded worker pool sizing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolConfig {
    /// Maximum concurrent workers; absent means twice the available parallelism
    #[serde(rename = "max-workers", default)]
    pub max_workers: Option<usize>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            max_per_window: None,
            window_secs: default_window_secs(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            version: default_agent_version(),
            contact_url: None,
        }
    }
}

impl UserAgentConfig {
    /// Format: Name/Version (+ContactURL)
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!("{}/{} (+{})", self.name, self.version, contact),
            None => format!("{}/{}", self.name, self.version),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_window_secs() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_agent_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_agent_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
