use std::net::SocketAddr;

/// Listener settings for the API server.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// level at which completed requests are traced
    pub log_level: tracing::Level,
}

impl Config {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            log_level: tracing::Level::INFO,
        }
    }
}
