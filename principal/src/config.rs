use std::net::SocketAddr;

/// Process-wide configuration, read once at startup from the environment
/// (via a `.env` file in development). Unlike the rest of the control
/// plane, config resolution is allowed to fail loudly: a bad bind address
/// or missing store address should stop the process before it ever binds
/// a socket, not surface as a runtime error later.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub store_addr: String,
}

/// Returned by `main` to select the process exit code: `0` for a clean
/// shutdown, `1` for a configuration error, `2` for a store the process
/// could not reach at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    ConfigError = 1,
    StoreUnreachable = 2,
}

impl Config {
    /// Reads `APP_BIND` (default `0.0.0.0:8001`) and `STORE_ADDR` (default
    /// `redis://localhost:6379`) from the environment.
    pub fn from_env() -> Result<Self, String> {
        let bind_raw = std::env::var("APP_BIND").unwrap_or_else(|_| default_bind().to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| format!("invalid APP_BIND {bind_raw:?}: {e}"))?;

        let store_addr =
            std::env::var("STORE_ADDR").unwrap_or_else(|_| default_store_addr().to_string());

        Ok(Config { bind, store_addr })
    }
}

fn default_bind() -> &'static str {
    "0.0.0.0:8001"
}

fn default_store_addr() -> &'static str {
    "redis://127.0.0.1:6379"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_bind_address() {
        std::env::set_var("APP_BIND", "not-an-address");
        let result = Config::from_env();
        std::env::remove_var("APP_BIND");
        assert!(result.is_err());
    }
}
