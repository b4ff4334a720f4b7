//! Chunked uploads through staged blocks.

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::ObjectStoreError;
use crate::blob::BlobService;
use crate::plugin::ObjectBody;

/// Most blocks a committed blob may reference.
pub const MAX_BLOCKS: usize = 50_000;

/// Block ID for the `index`th block. IDs within a blob must share one
/// length, so the index is zero-padded. The storage SDK base64-encodes
/// the ID on the wire.
#[must_use]
pub fn block_id(index: usize) -> String {
    format!("{index:08}")
}

/// Streams `body` into `blob` in `block_size` chunks and commits them.
///
/// Each block is filled completely before staging, except the last. An
/// empty body commits an empty block list. Nothing is committed when the
/// body fails.
pub(super) async fn upload(
    service: &dyn BlobService,
    container: &str,
    blob: &str,
    body: ObjectBody,
    block_size: u64,
) -> Result<(), ObjectStoreError> {
    let mut reader = StreamReader::new(body);
    let mut block_ids: Vec<String> = Vec::new();

    loop {
        let mut chunk = Vec::new();
        (&mut reader)
            .take(block_size)
            .read_to_end(&mut chunk)
            .await
            .map_err(|err| ObjectStoreError::Read {
                key: blob.to_owned(),
                message: err.to_string(),
            })?;
        if chunk.is_empty() {
            break;
        }
        if block_ids.len() >= MAX_BLOCKS {
            return Err(ObjectStoreError::TooManyBlocks {
                key: blob.to_owned(),
                limit: MAX_BLOCKS,
            });
        }

        let id = block_id(block_ids.len());
        service
            .stage_block(container, blob, &id, Bytes::from(chunk))
            .await?;
        block_ids.push(id);
    }

    debug!(container, blob, blocks = block_ids.len(), "committing upload");
    service
        .commit_block_list(container, blob, &block_ids)
        .await?;
    Ok(())
}
