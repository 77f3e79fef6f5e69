use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Applies to each HEAD/GET against a remote image, not to a whole batch.
    pub media_fetch_timeout_secs: u64,
    pub media_max_bytes: u64,
    pub media_user_agent: String,
    pub storage_dir: PathBuf,
    /// Prefix joined with the object key to form the public image URL.
    pub storage_public_url: String,
    pub lock_ttl_secs: u64,
    pub retry_cron: String,
    pub retry_max_attempts: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("media_fetch_timeout_secs", &self.media_fetch_timeout_secs)
            .field("media_max_bytes", &self.media_max_bytes)
            .field("media_user_agent", &self.media_user_agent)
            .field("storage_dir", &self.storage_dir)
            .field("storage_public_url", &self.storage_public_url)
            .field("lock_ttl_secs", &self.lock_ttl_secs)
            .field("retry_cron", &self.retry_cron)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .finish()
    }
}
