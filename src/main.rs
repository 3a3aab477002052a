use clap::{CommandFactory, Parser};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use streams_store::config::{AppConfig, Args};
use streams_store::engine::{EngineDirectory, EngineStore, TableEngine};
use streams_store::gateway;
use streams_store::remote::HttpFetchClient;
use streams_store::router::KeyRouter;

const STORE_NAME: &str = "key-value-store";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    if std::env::args().len() < 2 {
        Args::command().print_help()?;
        return Ok(());
    }

    let config = match AppConfig::from_args(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Starting {} as {} (topic {})",
        config.application_id,
        config.member,
        config.topic
    );
    for (key, value) in config.properties.iter() {
        tracing::debug!("  {} = {}", key, value);
    }
    if config.engine.seed_nodes.is_empty() {
        tracing::info!("No bootstrap servers, starting as founder");
    } else {
        tracing::info!("Bootstrap servers: {:?}", config.engine.seed_nodes);
    }

    // 1. Table engine (gossip + topic materialization):
    let engine = TableEngine::new(
        &config.application_id,
        config.member.clone(),
        config.engine.clone(),
    )
    .await?;
    engine.build_table(&config.topic, STORE_NAME)?;
    engine.start().await;

    // 2. Lookup path:
    let key_router = Arc::new(KeyRouter::new(
        config.member.clone(),
        Arc::new(EngineDirectory::new(engine.clone(), STORE_NAME)),
        Arc::new(EngineStore::new(engine.clone(), STORE_NAME)),
        Arc::new(HttpFetchClient::new()?),
        config.engine.fetch_timeout,
    ));

    // 3. Spawn stats reporter:
    let stats_engine = engine.clone();
    let stats = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let members = stats_engine.list_all_members(STORE_NAME);
            tracing::info!("Cluster stats: {} member(s) with partitions", members.len());
            for entry in members {
                tracing::info!("  - {} partitions={:?}", entry.member, entry.partitions);
            }
        }
    });

    // 4. Start HTTP server:
    let http_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.member.port));
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!("Press Ctrl+C to shutdown");

    let served = gateway::serve(listener, key_router, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await;

    stats.abort();
    engine.close().await;
    served
}
