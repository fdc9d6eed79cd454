use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::{DEFAULT_RECV_TIMEOUT, DEFAULT_SEND_TIMEOUT, DEFAULT_SOCKET_PATH};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub socket_path: PathBuf,
    pub send_timeout: Duration,
    pub recv_timeout: Duration,
}

#[derive(Debug, Parser)]
#[command(
    name = "autoroute-relay",
    author,
    version,
    about = "HTTP long-poll relay in front of the autorouter socket"
)]
pub struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "AUTOROUTE_RELAY_LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Unix seqpacket socket of the autorouter.
    #[arg(long, env = "AUTOROUTE_RELAY_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
    pub socket_path: PathBuf,

    /// Send timeout towards the autorouter, in seconds.
    #[arg(
        long,
        env = "AUTOROUTE_RELAY_SEND_TIMEOUT_SECS",
        default_value_t = DEFAULT_SEND_TIMEOUT.as_secs()
    )]
    pub send_timeout_secs: u64,

    /// How long a request waits for the autorouter to answer, in seconds.
    #[arg(
        long,
        env = "AUTOROUTE_RELAY_RECV_TIMEOUT_SECS",
        default_value_t = DEFAULT_RECV_TIMEOUT.as_secs()
    )]
    pub recv_timeout_secs: u64,
}

impl TryFrom<Cli> for RelayConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        anyhow::ensure!(
            cli.send_timeout_secs > 0 && cli.recv_timeout_secs > 0,
            "socket timeouts must be at least one second"
        );
        Ok(RelayConfig {
            listen_addr,
            socket_path: cli.socket_path,
            send_timeout: Duration::from_secs(cli.send_timeout_secs),
            recv_timeout: Duration::from_secs(cli.recv_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_autorouter_deployment() {
        let cli = Cli::try_parse_from(["autoroute-relay"]).unwrap();
        let config = RelayConfig::try_from(cli).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/run/vfrnav/autoroute/socket"));
        assert_eq!(config.send_timeout, Duration::from_secs(5));
        assert_eq!(config.recv_timeout, Duration::from_secs(15));
    }

    #[test]
    fn bad_listen_address_is_rejected() {
        let cli = Cli::try_parse_from(["autoroute-relay", "--listen-addr", "nowhere"]).unwrap();
        let err = RelayConfig::try_from(cli).unwrap_err();
        assert!(err.to_string().contains("invalid listen address"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cli =
            Cli::try_parse_from(["autoroute-relay", "--recv-timeout-secs", "0"]).unwrap();
        assert!(RelayConfig::try_from(cli).is_err());
    }
}
