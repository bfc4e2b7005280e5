use clap::Parser;
use log::{error, info, warn};
use server::auth::{AnonymousAuth, AuthProvider, SessionTable};
use server::config::RelayConfig;
use server::identity::RandomIdentity;
use server::lifecycle::Relay;
use server::network::RelayServer;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8888")]
    port: u16,
    /// Interval between keepalive pings, in milliseconds
    #[clap(long, default_value = "1000")]
    keepalive_ms: u64,
    /// Upper bound on a single frame write, in milliseconds
    #[clap(long, default_value = "2000")]
    send_timeout_ms: u64,
    /// Frames queued per connection before broadcasts to it are dropped
    #[clap(long, default_value = "256")]
    capacity: usize,
    /// Admit any non-empty token without a display name
    #[clap(long)]
    anonymous: bool,
    /// Accepted session, given as NAME=TOKEN. May be repeated.
    #[clap(long = "token", value_parser = parse_session)]
    tokens: Vec<(String, String)>,
}

fn parse_session(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, token)) if !name.is_empty() && !token.is_empty() => {
            Ok((name.to_string(), token.to_string()))
        }
        _ => Err(format!("expected NAME=TOKEN, got {:?}", raw)),
    }
}

fn auth_provider(args: &Args) -> Arc<dyn AuthProvider> {
    if args.anonymous {
        info!("Anonymous mode: any non-empty token is accepted");
        return Arc::new(AnonymousAuth);
    }

    let sessions = SessionTable::default();
    for (name, token) in &args.tokens {
        sessions.insert(token, name, None);
    }
    if sessions.is_empty() {
        warn!("No tokens configured; every connection will be rejected");
    }
    Arc::new(sessions)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = RelayConfig {
        keepalive_interval: Duration::from_millis(args.keepalive_ms.max(1)),
        send_timeout: Duration::from_millis(args.send_timeout_ms),
        outbound_capacity: args.capacity,
    };
    let relay = Relay::new(auth_provider(&args), Arc::new(RandomIdentity), config);

    let address = format!("{}:{}", args.host, args.port);
    let server = RelayServer::bind(&address, relay.clone()).await?;
    let server_handle = tokio::spawn(server.run());

    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Err(e)) => error!("Server stopped: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            relay.shutdown();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session() {
        assert_eq!(
            parse_session("alice=abc=def"),
            Ok(("alice".to_string(), "abc=def".to_string()))
        );
        assert!(parse_session("alice").is_err());
        assert!(parse_session("=abc").is_err());
        assert!(parse_session("alice=").is_err());
    }

    #[test]
    fn test_args_collect_tokens() {
        let args = Args::parse_from([
            "server", "--token", "alice=t1", "--token", "bob=t2", "-p", "9000",
        ]);
        assert_eq!(args.port, 9000);
        assert_eq!(args.tokens.len(), 2);
        assert!(!args.anonymous);
    }
}
