//! Server configuration, the shared node record, and the accept loop.
//!
//! Launch flags arrive as `--name value` pairs. `--port` and `--replicaof`
//! are interpreted; every other pair lands in the config map where
//! `CONFIG GET` can find it.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use regex::Regex;
use thiserror::Error;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::connection::{Connection, ConnectionError, handle_connection};
use crate::replication;
use crate::store::Store;

/// Errors that can occur while parsing the process launch flags.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CliError {
    #[error("expected a --name value pair, got '{0}'")]
    InvalidFlag(String),
    #[error("flag --{0} is missing its value")]
    MissingValue(String),
    #[error("invalid port value")]
    InvalidPort,
    #[error("invalid master address")]
    InvalidMasterAddress,
    #[error("invalid master port")]
    InvalidMasterPort,
}

/// Fatal startup and accept-loop failures; each terminates the process with
/// exit code 1.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind to port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),
    #[error("failed to connect to master at {address}: {source}")]
    MasterDial {
        address: String,
        source: std::io::Error,
    },
    #[error("replication handshake failed: {0}")]
    Handshake(#[from] ConnectionError),
}

#[derive(Debug, PartialEq, Clone)]
pub enum RedisRole {
    Master,
    Replica { host: String, port: u16 },
}

impl RedisRole {
    /// The role name as reported by INFO (Redis calls replicas "slave").
    pub fn as_str(&self) -> &'static str {
        match self {
            RedisRole::Master => "master",
            RedisRole::Replica { .. } => "slave",
        }
    }
}

/// A connected replica: the peer address it registered from and a shared
/// handle to the write half of its socket.
#[derive(Debug)]
pub struct Replica {
    pub address: String,
    pub writer: Arc<Mutex<OwnedWriteHalf>>,
}

/// The process-wide node record, shared behind one `RwLock`.
#[derive(Debug)]
pub struct RedisServer {
    /// TCP port this node listens on.
    pub port: u16,
    pub role: RedisRole,
    /// 40-digit decimal replication id; masters only.
    pub repl_id: Option<String>,
    /// Bytes of replicated command frames observed on the master link.
    pub repl_offset: u64,
    /// Launch flags other than --port/--replicaof, served by CONFIG GET.
    pub config: HashMap<String, String>,
    /// Connected replicas in registration order; masters only append here,
    /// and only once a PSYNC has completed.
    pub replicas: Vec<Replica>,
}

impl RedisServer {
    /// Builds the node record from the process launch flags.
    ///
    /// # Supported flags
    ///
    /// * `--port <n>` — listening port, default 6379
    /// * `--replicaof "<host> <port>"` — run as a replica of that master
    /// * any other `--key value` — stored in the config map
    pub fn new<I: IntoIterator<Item = String>>(args: I) -> Result<Self, CliError> {
        let mut iter = args.into_iter().skip(1);
        let mut port: Option<u16> = None;
        let mut role: Option<RedisRole> = None;
        let mut config = HashMap::new();

        while let Some(arg) = iter.next() {
            let Some(name) = arg.strip_prefix("--") else {
                return Err(CliError::InvalidFlag(arg));
            };
            let Some(value) = iter.next() else {
                return Err(CliError::MissingValue(name.to_string()));
            };

            match name {
                "port" => port = Some(parse_port(&value, CliError::InvalidPort)?),
                "replicaof" => {
                    let (host, master_port) = parse_master_address(&value)?;
                    role = Some(RedisRole::Replica {
                        host,
                        port: master_port,
                    });
                }
                other => {
                    config.insert(other.to_string(), value);
                }
            }
        }

        let role = role.unwrap_or(RedisRole::Master);
        let repl_id = match role {
            RedisRole::Master => Some(generate_replication_id()),
            RedisRole::Replica { .. } => None,
        };

        Ok(RedisServer {
            port: port.unwrap_or(6379),
            role,
            repl_id,
            repl_offset: 0,
            config,
            replicas: Vec::new(),
        })
    }

    /// The `host:port` dial string of this node's master, if it has one.
    pub fn master_address(&self) -> Option<String> {
        match &self.role {
            RedisRole::Master => None,
            RedisRole::Replica { host, port } => Some(format!("{host}:{port}")),
        }
    }

    /// Runs the server until a fatal error.
    ///
    /// A replica first dials its master, performs the handshake, and keeps
    /// applying the replicated stream on that socket; both roles then accept
    /// client connections, one handler task per connection.
    pub async fn run(self) -> Result<(), ServerError> {
        let port = self.port;
        let master_address = self.master_address();
        let store = Arc::new(Store::new());
        let server = Arc::new(RwLock::new(self));

        if let Some(address) = master_address {
            let stream = TcpStream::connect(&address).await.map_err(|source| {
                ServerError::MasterDial {
                    address: address.clone(),
                    source,
                }
            })?;
            let mut connection = Connection::new(stream);
            replication::handshake(&mut connection, port).await?;
            info!(master = %address, "replication handshake sent");

            let server = Arc::clone(&server);
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                handle_connection(connection, server, store, true).await;
            });
        }

        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        info!(port, "listening for connections");

        loop {
            let (stream, address) = listener.accept().await.map_err(ServerError::Accept)?;
            debug!(peer = %address, "accepted connection");

            let server = Arc::clone(&server);
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                handle_connection(Connection::new(stream), server, store, false).await;
            });
        }
    }
}

/// 40 random decimal digits, sampled once per master at startup.
fn generate_replication_id() -> String {
    let mut rng = rand::rng();
    (0..40)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

fn parse_port(port: &str, error: CliError) -> Result<u16, CliError> {
    let port = port.parse::<u16>().map_err(|_| error.clone())?;
    if port == 0 {
        return Err(error);
    }
    Ok(port)
}

/// Parses a `"<host> <port>"` master specification.
fn parse_master_address(value: &str) -> Result<(String, u16), CliError> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(CliError::InvalidMasterAddress);
    }

    let host = parts[0];
    let ipv4 = Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").unwrap();
    let hostname = Regex::new(r"^[a-zA-Z0-9\-\.]+$").unwrap();

    let valid = if let Some(caps) = ipv4.captures(host) {
        caps.iter().skip(1).all(|octet| {
            octet
                .and_then(|m| m.as_str().parse::<u16>().ok())
                .is_some_and(|n| n <= 255)
        })
    } else {
        hostname.is_match(host)
    };
    if !valid {
        return Err(CliError::InvalidMasterAddress);
    }

    let port = parse_port(parts[1], CliError::InvalidMasterPort)?;
    Ok((host.to_string(), port))
}
