use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::commands::{CommandHandler, CommandResult, RequestContext};
use crate::input::{ConnectionReader, ReadError};
use crate::key_value_store::KeyValueStore;
use crate::rdb::RdbTransferCodec;
use crate::replication::ReplicaHandle;
use crate::resp::{RespCodec, RespValue};
use crate::server::RedisServer;

/// Serves one client until it disconnects.
///
/// When the client turns out to be a replica (it sends `PSYNC`), the snapshot
/// is streamed to it and the connection is handed over to the replication log.
pub async fn handle_client_connection<R, W>(
    reader: R,
    mut writer: W,
    client_address: String,
    server: Arc<RedisServer>,
    store: Arc<Mutex<KeyValueStore>>,
) where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let mut reader = ConnectionReader::new(reader);
    let context = RequestContext {
        server,
        store,
        client_address,
    };

    loop {
        let frame = match reader.read_frame(&RespCodec).await {
            Ok(frame) => frame,
            Err(e) => {
                report_read_error(&mut writer, &context.client_address, e).await;
                break;
            }
        };

        let result = match CommandHandler::new(frame) {
            Ok(handler) => {
                debug!(client = %context.client_address, command = %handler.name, "handling command");
                handler.handle_client_command(&context).await
            }
            Err(e) => Err(e),
        };

        let response = match result {
            Ok(CommandResult::NoResponse) => continue,
            Ok(CommandResult::Response(response)) => response,
            Ok(CommandResult::Sync { reply, payload }) => {
                if let Err(e) = write_value(&mut writer, &reply).await {
                    warn!(client = %context.client_address, error = %e, "failed to send FULLRESYNC");
                    break;
                }

                if let Err(e) = write_bytes(&mut writer, &RdbTransferCodec::encode(&payload)).await {
                    warn!(client = %context.client_address, error = %e, "failed to send snapshot");
                    break;
                }

                let Ok(replication_log) = context.server.replication_log() else {
                    break;
                };

                let handle = ReplicaHandle::spawn(context.client_address.clone(), reader.boxed(), writer);
                replication_log.add_replica(handle).await;
                return;
            }
            Err(e) => {
                debug!(client = %context.client_address, error = %e, "command failed");
                e.as_resp()
            }
        };

        if let Err(e) = write_value(&mut writer, &response).await {
            warn!(client = %context.client_address, error = %e, "failed to write response");
            break;
        }
    }

    info!(client = %context.client_address, "connection closed");
}

/// Applies the replication stream a replica receives from its master.
///
/// `reader` is the connection the handshake ran on, so bytes the master sent
/// right after the snapshot are already buffered. Every frame advances the
/// replica offset by its encoded length, after the frame has been handled.
pub async fn handle_master_connection<R, W>(
    mut reader: ConnectionReader<R>,
    mut writer: W,
    server: Arc<RedisServer>,
    store: Arc<Mutex<KeyValueStore>>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let context = RequestContext {
        server,
        store,
        client_address: "master".to_string(),
    };

    loop {
        let frame = match reader.read_frame(&RespCodec).await {
            Ok(frame) => frame,
            Err(e) if e.is_closed() => {
                info!("master closed the replication stream");
                break;
            }
            Err(e) => {
                warn!(error = %e, "replication stream failed");
                break;
            }
        };

        let processed = frame.source.len() as u64;

        let result = match CommandHandler::new(frame) {
            Ok(handler) => handler.handle_master_command(&context).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(CommandResult::Response(response)) => {
                if let Err(e) = write_value(&mut writer, &response).await {
                    warn!(error = %e, "failed to answer master");
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to apply replicated command"),
        }

        match context.server.advance_replica_offset(processed) {
            Ok(offset) => debug!(offset, "replica offset advanced"),
            Err(e) => {
                warn!(error = %e, "server is not a replica");
                break;
            }
        }
    }
}

async fn report_read_error<W>(writer: &mut W, client_address: &str, error: ReadError)
where
    W: AsyncWrite + Unpin,
{
    if error.is_closed() {
        return;
    }

    warn!(client = %client_address, error = %error, "closing connection after read error");

    if let Err(e) = write_value(writer, &error.as_resp()).await {
        debug!(client = %client_address, error = %e, "failed to report read error");
    }
}

async fn write_value<W>(writer: &mut W, value: &RespValue) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_bytes(writer, &value.encode()).await
}

async fn write_bytes<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}
