use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use crate::commands::CommandError;
use crate::connection::handle_client_connection;
use crate::key_value_store::KeyValueStore;
use crate::replication::ReplicationLog;

const DEFAULT_PORT: u16 = 6379;
const DEFAULT_RDB_DIRECTORY: &str = ".";
const DEFAULT_RDB_FILENAME: &str = "dump.rdb";
const REPL_ID_LENGTH: usize = 40;
const REPL_ID_CHARSET: &[u8] = b"0123456789abcdef";

#[derive(Error, Debug, PartialEq)]
pub enum CliError {
    #[error("invalid command line flag '{0}'")]
    InvalidCommandLineFlag(String),
    #[error("invalid value for command line flag '{0}'")]
    InvalidCommandLineFlagValue(String),
}

/// What the server is in the replication topology.
#[derive(Debug)]
pub enum RedisRole {
    Master {
        repl_id: String,
        replication_log: Arc<ReplicationLog>,
    },
    Replica {
        master_host: String,
        master_port: u16,
        /// `?` until the handshake learns the master's id.
        master_repl_id: RwLock<String>,
        /// Bytes of the replication stream processed so far.
        offset: AtomicU64,
    },
}

impl RedisRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedisRole::Master { .. } => "master",
            RedisRole::Replica { .. } => "slave",
        }
    }
}

/// Server identity, built once from the command line and shared by every connection.
#[derive(Debug)]
pub struct RedisServer {
    pub port: u16,
    pub rdb_directory: String,
    pub rdb_filename: String,
    pub role: RedisRole,
}

impl RedisServer {
    /// Builds the server from process arguments. The first item is the program name.
    pub fn new<I: IntoIterator<Item = String>>(command_line_args: I) -> Result<Self, CliError> {
        let mut iter = command_line_args.into_iter().skip(1);
        let mut port = DEFAULT_PORT;
        let mut rdb_directory = DEFAULT_RDB_DIRECTORY.to_string();
        let mut rdb_filename = DEFAULT_RDB_FILENAME.to_string();
        let mut replica_of: Option<(String, u16)> = None;

        while let Some(arg) = iter.next() {
            let Some(value) = iter.next() else {
                return Err(match arg.as_str() {
                    "--port" | "--dir" | "--dbfilename" | "--replicaof" => {
                        CliError::InvalidCommandLineFlagValue(arg)
                    }
                    _ => CliError::InvalidCommandLineFlag(arg),
                });
            };

            match arg.as_str() {
                "--port" => {
                    port = parse_port(&value).ok_or(CliError::InvalidCommandLineFlagValue(arg))?;
                }
                "--dir" => rdb_directory = value,
                "--dbfilename" => rdb_filename = value,
                "--replicaof" => {
                    let mut parts = value.split_whitespace();
                    let (Some(host), Some(master_port), None) =
                        (parts.next(), parts.next().and_then(parse_port), parts.next())
                    else {
                        return Err(CliError::InvalidCommandLineFlagValue(arg));
                    };

                    replica_of = Some((host.to_string(), master_port));
                }
                _ => return Err(CliError::InvalidCommandLineFlag(arg)),
            }
        }

        let role = match replica_of {
            Some((master_host, master_port)) => RedisRole::Replica {
                master_host,
                master_port,
                master_repl_id: RwLock::new("?".to_string()),
                offset: AtomicU64::new(0),
            },
            None => RedisRole::Master {
                repl_id: generate_repl_id(),
                replication_log: Arc::new(ReplicationLog::new()),
            },
        };

        Ok(RedisServer {
            port,
            rdb_directory,
            rdb_filename,
            role,
        })
    }

    pub fn is_master(&self) -> bool {
        matches!(self.role, RedisRole::Master { .. })
    }

    pub fn replication_log(&self) -> Result<&Arc<ReplicationLog>, CommandError> {
        match &self.role {
            RedisRole::Master {
                replication_log, ..
            } => Ok(replication_log),
            RedisRole::Replica { .. } => Err(CommandError::MasterOnlyCommand),
        }
    }

    /// Replication id of this master, or the one learned from the master on a replica.
    pub async fn repl_id(&self) -> String {
        match &self.role {
            RedisRole::Master { repl_id, .. } => repl_id.clone(),
            RedisRole::Replica { master_repl_id, .. } => master_repl_id.read().await.clone(),
        }
    }

    /// Offset reported by `INFO`: bytes propagated on a master, bytes processed on a replica.
    pub async fn repl_offset(&self) -> u64 {
        match &self.role {
            RedisRole::Master {
                replication_log, ..
            } => replication_log.master_offset().await,
            RedisRole::Replica { offset, .. } => offset.load(Ordering::Acquire),
        }
    }

    pub fn replica_offset(&self) -> Result<u64, CommandError> {
        match &self.role {
            RedisRole::Replica { offset, .. } => Ok(offset.load(Ordering::Acquire)),
            RedisRole::Master { .. } => Err(CommandError::ReplicaOnlyCommand),
        }
    }

    pub fn advance_replica_offset(&self, processed: u64) -> Result<u64, CommandError> {
        match &self.role {
            RedisRole::Replica { offset, .. } => {
                Ok(offset.fetch_add(processed, Ordering::AcqRel) + processed)
            }
            RedisRole::Master { .. } => Err(CommandError::ReplicaOnlyCommand),
        }
    }

    /// Records what the master announced in `FULLRESYNC`.
    pub async fn start_replication(&self, repl_id: String, start_offset: u64) -> Result<(), CommandError> {
        match &self.role {
            RedisRole::Replica {
                master_repl_id,
                offset,
                ..
            } => {
                *master_repl_id.write().await = repl_id;
                offset.store(start_offset, Ordering::Release);
                Ok(())
            }
            RedisRole::Master { .. } => Err(CommandError::ReplicaOnlyCommand),
        }
    }
}

fn parse_port(value: &str) -> Option<u16> {
    value.parse::<u16>().ok().filter(|port| *port >= 1)
}

fn generate_repl_id() -> String {
    let mut rng = rand::thread_rng();

    (0..REPL_ID_LENGTH)
        .map(|_| REPL_ID_CHARSET[rng.gen_range(0..REPL_ID_CHARSET.len())] as char)
        .collect()
}

/// Accepts client connections until the listener fails.
pub async fn run(
    server: Arc<RedisServer>,
    store: Arc<Mutex<KeyValueStore>>,
    listener: TcpListener,
) -> std::io::Result<()> {
    loop {
        let (stream, address) = match listener.accept().await {
            Ok(connection) => connection,
            Err(e) => {
                error!(error = %e, "failed to accept connection");
                return Err(e);
            }
        };

        info!(client = %address, "accepted connection");

        let server = Arc::clone(&server);
        let store = Arc::clone(&store);

        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            handle_client_connection(read_half, write_half, address.to_string(), server, store)
                .await;
        });
    }
}
