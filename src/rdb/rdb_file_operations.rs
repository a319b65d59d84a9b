use std::path::Path;

use bytes::Bytes;
use tracing::{debug, info};

use crate::rdb::{EMPTY_RDB, RdbError, RdbSnapshot};

async fn read_rdb_bytes(directory: &str, filename: &str) -> Result<Option<Vec<u8>>, RdbError> {
    let file_path = Path::new(directory).join(filename);

    match tokio::fs::read(&file_path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %file_path.display(), "no RDB file found");
            Ok(None)
        }
        Err(e) => Err(RdbError::IoError(e.to_string())),
    }
}

/// Loads the snapshot stored at `directory/filename`, if there is one.
pub async fn load_rdb_file(directory: &str, filename: &str) -> Result<Option<RdbSnapshot>, RdbError> {
    let Some(bytes) = read_rdb_bytes(directory, filename).await? else {
        return Ok(None);
    };

    let snapshot = RdbSnapshot::decode(&bytes)?;
    info!(
        directory,
        filename,
        keys = snapshot.entries.len(),
        "loaded RDB file"
    );

    Ok(Some(snapshot))
}

/// Snapshot bytes to ship to a new replica: the RDB file on disk or an empty snapshot.
pub async fn rdb_payload(directory: &str, filename: &str) -> Result<Bytes, RdbError> {
    let payload = read_rdb_bytes(directory, filename)
        .await?
        .map(Bytes::from)
        .unwrap_or_else(|| Bytes::from_static(EMPTY_RDB));

    Ok(payload)
}
