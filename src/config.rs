use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Fixture state store HTTP service
#[derive(Parser, Debug, Clone)]
#[command(name = "fixture-store", version, about)]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "fixtures.db")]
    pub database_path: String,

    /// Skip loading the default fixtures into an empty store
    #[arg(long, env = "NO_SEED", default_value = "false")]
    pub no_seed: bool,

    /// Longest a store operation may wait before failing as unavailable (ms)
    #[arg(long, env = "OP_TIMEOUT_MS", default_value = "2000")]
    pub op_timeout_ms: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.op_timeout_ms == 0 {
            anyhow::bail!("op_timeout_ms must be greater than zero");
        }
        if self.database_path.trim().is_empty() {
            anyhow::bail!("database_path must not be empty");
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen_addr '{}': {}", self.listen_addr, e))
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("fixture-store").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = parse(&[]);
        config.validate().unwrap();
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
        assert_eq!(config.op_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = parse(&["--op-timeout-ms", "0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_listen_addr_rejected() {
        let config = parse(&["--listen-addr", "localhost"]);
        assert!(config.validate().is_err());
    }
}
