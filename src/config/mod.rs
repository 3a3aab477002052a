//! Process Configuration
//!
//! Command-line flags, engine properties and their validation.
//!
//! Engine properties come from an inline list (`--streams-props k=v ...`)
//! and/or a `.properties` file (`--streams.config FILE`). At least one of
//! the two is required; inline values win over the file. Any problem here is
//! a `ConfigError`, which stops the process before anything is started.

pub mod properties;


pub use properties::Properties;

use clap::Parser;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::directory::Member;

pub const DEFAULT_APPLICATION_ID: &str = "streams-processor-default-application-id";
pub const DEFAULT_LOG_DIR: &str = "./topics";
pub const DEFAULT_NUM_PARTITIONS: u32 = 8;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 2000;
/// The gossip port defaults to the HTTP port plus this offset.
pub const GOSSIP_PORT_OFFSET: u16 = 1000;

pub const APPLICATION_ID_CONFIG: &str = "application.id";
pub const APPLICATION_SERVER_CONFIG: &str = "application.server";
pub const BOOTSTRAP_SERVERS_CONFIG: &str = "bootstrap.servers";
pub const GOSSIP_PORT_CONFIG: &str = "gossip.port";
pub const LOG_DIR_CONFIG: &str = "log.dir";
pub const NUM_PARTITIONS_CONFIG: &str = "num.partitions";
pub const POLL_INTERVAL_MS_CONFIG: &str = "poll.interval.ms";
pub const FETCH_TIMEOUT_MS_CONFIG: &str = "fetch.timeout.ms";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("either --streams-props or --streams.config must be specified")]
    MissingProperties,

    #[error("invalid property: {0}")]
    InvalidProperty(String),

    #[error("failed to read properties file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Serves point lookups into a table materialized from a topic.
#[derive(Parser, Debug, Clone)]
#[command(name = "streams-processor")]
#[command(
    about = "This streams application is used to interactively query values from topics"
)]
#[command(version)]
pub struct Args {
    /// Process messages from this topic
    #[arg(long, value_name = "TOPIC")]
    pub topic: String,

    /// Streams related configuration properties like bootstrap.servers etc.
    /// These configs take precedence over those passed via --streams.config.
    #[arg(long = "streams-props", value_name = "PROP-NAME=PROP-VALUE", num_args = 1..)]
    pub streams_props: Option<Vec<String>>,

    /// Streams config properties file
    #[arg(long = "streams.config", value_name = "CONFIG-FILE")]
    pub streams_config: Option<PathBuf>,

    /// The id of the streams application to use; members sharing it form one cluster
    #[arg(long = "application-id", value_name = "APPLICATION-ID", default_value = DEFAULT_APPLICATION_ID)]
    pub application_id: String,

    /// The host name of this machine / pod / container. Used for inter-processor communication.
    #[arg(long, value_name = "HOSTNAME", default_value = "localhost")]
    pub hostname: String,

    /// The TCP port for the HTTP REST service
    #[arg(long, value_name = "PORT", default_value_t = 8080)]
    pub port: u16,
}

/// Settings of the table engine, read from the engine properties.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub gossip_addr: SocketAddr,
    pub seed_nodes: Vec<SocketAddr>,
    pub log_dir: PathBuf,
    pub num_partitions: u32,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
}

impl EngineConfig {
    pub fn from_properties(props: &Properties, member: &Member) -> Result<Self, ConfigError> {
        let default_gossip_port = member.port.checked_add(GOSSIP_PORT_OFFSET).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: GOSSIP_PORT_CONFIG.to_string(),
                value: String::new(),
                reason: format!(
                    "no default above HTTP port {}, set {} explicitly",
                    member.port, GOSSIP_PORT_CONFIG
                ),
            }
        });
        let gossip_port = match props.get(GOSSIP_PORT_CONFIG) {
            Some(_) => parse_number::<u16>(props, GOSSIP_PORT_CONFIG, 0)?,
            None => default_gossip_port?,
        };
        let gossip_addr = resolve(GOSSIP_PORT_CONFIG, &format!("{}:{}", member.host, gossip_port))?;

        let seed_nodes = props
            .get(BOOTSTRAP_SERVERS_CONFIG)
            .map(|servers| {
                servers
                    .split(',')
                    .map(str::trim)
                    .filter(|server| !server.is_empty())
                    .map(|server| resolve(BOOTSTRAP_SERVERS_CONFIG, server))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let log_dir = props
            .get(LOG_DIR_CONFIG)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

        let num_partitions = parse_positive(props, NUM_PARTITIONS_CONFIG, DEFAULT_NUM_PARTITIONS)?;
        let poll_interval_ms = parse_positive(props, POLL_INTERVAL_MS_CONFIG, DEFAULT_POLL_INTERVAL_MS)?;
        let fetch_timeout_ms = parse_positive(props, FETCH_TIMEOUT_MS_CONFIG, DEFAULT_FETCH_TIMEOUT_MS)?;

        Ok(Self {
            gossip_addr,
            seed_nodes,
            log_dir,
            num_partitions,
            poll_interval: Duration::from_millis(poll_interval_ms),
            fetch_timeout: Duration::from_millis(fetch_timeout_ms),
        })
    }
}

/// Everything the process needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub topic: String,
    pub application_id: String,
    pub member: Member,
    pub properties: Properties,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        if args.streams_props.is_none() && args.streams_config.is_none() {
            return Err(ConfigError::MissingProperties);
        }

        let mut properties = Properties::new();
        if let Some(path) = &args.streams_config {
            properties.extend(Properties::load(path)?);
        }
        if let Some(inline) = &args.streams_props {
            properties.extend(Properties::from_pairs(inline)?);
        }

        if args.topic.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "topic".to_string(),
                value: args.topic,
                reason: "must not be empty".to_string(),
            });
        }

        let member = Member::new(args.hostname, args.port);
        properties.insert(APPLICATION_ID_CONFIG, &args.application_id);
        properties.insert(APPLICATION_SERVER_CONFIG, &member.to_string());

        let engine = EngineConfig::from_properties(&properties, &member)?;

        Ok(Self {
            topic: args.topic,
            application_id: args.application_id,
            member,
            properties,
            engine,
        })
    }
}

fn parse_number<T>(props: &Properties, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    match props.get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_positive<T>(props: &Properties, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    let value = parse_number(props, key, default)?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: props.get(key).unwrap_or_default().to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Resolves `host:port`, preferring an IPv4 address.
fn resolve(key: &str, address: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: key.to_string(),
        value: address.to_string(),
        reason,
    };

    let candidates: Vec<SocketAddr> = address
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?
        .collect();

    candidates
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| invalid("address did not resolve".to_string()))
}
