use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use redline::connection::handle_master_connection;
use redline::handshake::ReplicationHandshake;
use redline::input::ConnectionReader;
use redline::key_value_store::KeyValueStore;
use redline::rdb::load_rdb_file;
use redline::server::{self, RedisRole, RedisServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = Arc::new(RedisServer::new(std::env::args()).context("invalid command line")?);
    let store = Arc::new(Mutex::new(KeyValueStore::new()));

    if let Some(snapshot) = load_rdb_file(&server.rdb_directory, &server.rdb_filename)
        .await
        .context("failed to load RDB file")?
    {
        store.lock().await.import_snapshot(&snapshot);
    }

    let listener = TcpListener::bind(format!("127.0.0.1:{}", server.port))
        .await
        .with_context(|| format!("failed to bind port {}", server.port))?;
    info!(port = server.port, role = server.role.as_str(), "server listening");

    if let RedisRole::Replica {
        master_host,
        master_port,
        ..
    } = &server.role
    {
        let stream = TcpStream::connect((master_host.as_str(), *master_port))
            .await
            .with_context(|| format!("failed to connect to master {}:{}", master_host, master_port))?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = ConnectionReader::new(read_half);

        let outcome = ReplicationHandshake::new(&mut reader, &mut write_half, server.port)
            .negotiate()
            .await
            .context("replication handshake failed")?;

        store.lock().await.import_snapshot(&outcome.snapshot);
        server
            .start_replication(outcome.master_repl_id, outcome.master_offset)
            .await
            .context("failed to record master replication id")?;

        tokio::spawn(handle_master_connection(
            reader,
            write_half,
            Arc::clone(&server),
            Arc::clone(&store),
        ));
    }

    server::run(server, store, listener).await?;

    Ok(())
}
