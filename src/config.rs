// Server endpoint configuration. The original tooling kept host and port
// as ambient globals; here they live in an explicit struct that is read
// once at startup and handed to the API client.

use std::time::Duration;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Where the inference server lives and how long we are willing to wait
/// for a single blocking request (video uploads can take a while).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl ServerConfig {
    /// Read configuration from `DENOISE_SERVER_HOST`, `DENOISE_SERVER_PORT`
    /// and `DENOISE_TIMEOUT_SECS`, falling back to localhost defaults.
    /// Unparsable values fall back too, with a warning, so startup never
    /// fails on a typo in the environment.
    pub fn from_env() -> Self {
        let host =
            std::env::var("DENOISE_SERVER_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = match std::env::var("DENOISE_SERVER_PORT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("invalid DENOISE_SERVER_PORT {:?}, using {}", raw, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            Err(_) => DEFAULT_PORT,
        };
        let timeout_secs = match std::env::var("DENOISE_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!(
                    "invalid DENOISE_TIMEOUT_SECS {:?}, using {}",
                    raw,
                    DEFAULT_TIMEOUT_SECS
                );
                DEFAULT_TIMEOUT_SECS
            }),
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };
        ServerConfig {
            host,
            port,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}
