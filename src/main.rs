//! Diagnostic binary for the `netview` connection layer.
//!
//! Connects to a server, sends one request and prints the reply; with
//! `--watch` it keeps printing pushed messages until Ctrl-C.

mod cli;

use std::time::Duration;

use clap::Parser;
use log::info;
use netview::{Client, ClientConfig, ConnectionState, EndpointParseError, ServerEndpoint};
use serde_json::{Map, Value};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    install_metrics_exporter(cli.metrics_addr)?;

    let mut config = ClientConfig::default();
    if let Some(ms) = cli.timeout_ms {
        config = config.request_timeout(Duration::from_millis(ms));
    }
    let client = Client::tcp(config);
    let status = client.on_connection_change(|connected| {
        info!("connection status: connected={connected}");
    });

    let mut states = client.manager().watch_state();
    client.connect(server_endpoint(cli.server, cli.host, cli.port)?);
    wait_until_connected(&mut states).await?;

    let response = client
        .send_request(&cli.action, Value::Object(params_from_pairs(cli.params)))
        .await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if cli.watch {
        let messages = client.on_message(|message| {
            if message.request_id().is_none() {
                println!("{}", Value::Object(message.body().clone()));
            }
        });
        tokio::signal::ctrl_c().await?;
        messages.unsubscribe();
    }

    status.unsubscribe();
    client.shutdown();
    Ok(())
}

async fn wait_until_connected(
    states: &mut watch::Receiver<ConnectionState>,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        match *states.borrow_and_update() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Disconnected => return Err("unable to reach server".into()),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {}
        }
        states.changed().await?;
    }
}

fn server_endpoint(
    server: Option<String>,
    host: String,
    port: u16,
) -> Result<ServerEndpoint, EndpointParseError> {
    match server {
        Some(server) => server.parse(),
        None => Ok(ServerEndpoint::new(host, port)),
    }
}

fn params_from_pairs(pairs: Vec<(String, String)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            (key, value)
        })
        .collect()
}

#[cfg(feature = "metrics")]
fn install_metrics_exporter(
    addr: Option<std::net::SocketAddr>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(addr) = addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!("serving metrics: addr={addr}");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics_exporter(
    addr: Option<std::net::SocketAddr>,
) -> Result<(), Box<dyn std::error::Error>> {
    if addr.is_some() {
        log::warn!("--metrics-addr ignored: built without the metrics feature");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use netview::ServerEndpoint;
    use rstest::rstest;

    use super::server_endpoint;

    #[rstest]
    #[case(Some("monitor.local:9300"), ServerEndpoint::new("monitor.local", 9300))]
    #[case(Some("[::1]:9200"), ServerEndpoint::new("::1", 9200))]
    #[case(None, ServerEndpoint::new("10.0.0.5", 9100))]
    fn server_overrides_host_and_port(
        #[case] server: Option<&str>,
        #[case] expected: ServerEndpoint,
    ) {
        let endpoint = server_endpoint(server.map(str::to_owned), "10.0.0.5".to_owned(), 9100)
            .expect("valid endpoint");
        assert_eq!(endpoint, expected);
    }

    #[test]
    fn malformed_server_is_rejected() {
        assert!(server_endpoint(Some("no-port".to_owned()), String::new(), 0).is_err());
    }
}
