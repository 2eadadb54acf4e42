use std::env;

pub const DEFAULT_PORT: u16 = 3001;

/// Origins permitted to open transport connections.
const ALLOWED_ORIGINS: &[&str] = &["https://audio-calling-client.vercel.app"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origins: ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ServerConfig {
    /// Read the listening port from `PORT`, falling back to the default.
    /// The origin allow-list is static and not runtime-mutable.
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            port,
            ..Self::default()
        }
    }
}
