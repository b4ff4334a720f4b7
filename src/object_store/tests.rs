//! Unit tests for the object-store plugin.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use rstest::{fixture, rstest};
use tokio::io::AsyncReadExt;

use super::*;
use crate::config::CREDENTIALS_FILE_KEY;
use crate::plugin::ObjectBody;
use crate::test_support::{EnvGuard, MemoryBlobService, plugin_config};

const BUCKET: &str = "velero";

#[fixture]
fn memory() -> Arc<MemoryBlobService> {
    Arc::new(MemoryBlobService::new())
}

fn store(memory: &Arc<MemoryBlobService>, block_size: u64) -> AzureObjectStore {
    let service: Arc<dyn BlobService> = memory.clone();
    AzureObjectStore::with_service(service, block_size)
}

fn body(chunks: &[&'static str]) -> ObjectBody {
    stream::iter(
        chunks
            .iter()
            .map(|chunk| Ok::<_, io::Error>(Bytes::from_static(chunk.as_bytes())))
            .collect::<Vec<_>>(),
    )
    .boxed()
}

#[rstest]
#[tokio::test]
async fn uploads_are_split_into_full_blocks(memory: Arc<MemoryBlobService>) {
    let object_store = store(&memory, 4);
    object_store
        .put_object(BUCKET, "backups/b1/b1.tar.gz", body(&["hel", "lo wor", "ld!"]))
        .await
        .unwrap_or_else(|err| panic!("upload should succeed: {err}"));

    let sizes: Vec<usize> = memory.staged().iter().map(|block| block.len).collect();
    assert_eq!(sizes, vec![4, 4, 4]);
    assert_eq!(
        memory.commits(),
        vec![vec![block_id(0), block_id(1), block_id(2)]]
    );
    assert_eq!(
        memory.contents(BUCKET, "backups/b1/b1.tar.gz"),
        Some(b"hello world!".to_vec())
    );
}

#[rstest]
#[tokio::test]
async fn last_block_may_be_short(memory: Arc<MemoryBlobService>) {
    let object_store = store(&memory, 5);
    object_store
        .put_object(BUCKET, "key", body(&["abcdefghijkl"]))
        .await
        .unwrap_or_else(|err| panic!("upload should succeed: {err}"));

    let sizes: Vec<usize> = memory.staged().iter().map(|block| block.len).collect();
    assert_eq!(sizes, vec![5, 5, 2]);
}

#[rstest]
#[tokio::test]
async fn empty_bodies_commit_an_empty_list(memory: Arc<MemoryBlobService>) {
    let object_store = store(&memory, 4);
    object_store
        .put_object(BUCKET, "empty", body(&[]))
        .await
        .unwrap_or_else(|err| panic!("upload should succeed: {err}"));

    assert!(memory.staged().is_empty());
    assert_eq!(memory.commits(), vec![Vec::<String>::new()]);
    assert_eq!(memory.contents(BUCKET, "empty"), Some(Vec::new()));
}

#[rstest]
#[tokio::test]
async fn read_failures_abort_without_commit(memory: Arc<MemoryBlobService>) {
    let object_store = store(&memory, 4);
    let failing = stream::iter(vec![
        Ok(Bytes::from_static(b"abcd")),
        Err(io::Error::other("connection reset")),
    ])
    .boxed();

    let err = object_store
        .put_object(BUCKET, "broken", failing)
        .await
        .expect_err("read failure should abort");

    assert!(matches!(err, ObjectStoreError::Read { ref key, .. } if key == "broken"));
    assert!(memory.commits().is_empty());
    assert_eq!(memory.contents(BUCKET, "broken"), None);
}

#[rstest]
#[tokio::test]
async fn uploads_past_the_block_limit_are_not_committed(memory: Arc<MemoryBlobService>) {
    let object_store = store(&memory, 1);
    let oversized = stream::iter(vec![Ok::<_, io::Error>(Bytes::from(vec![
        b'x';
        MAX_BLOCKS + 1
    ]))])
    .boxed();

    let err = object_store
        .put_object(BUCKET, "huge", oversized)
        .await
        .expect_err("the block limit should stop the upload");

    assert_eq!(
        err,
        ObjectStoreError::TooManyBlocks {
            key: "huge".to_owned(),
            limit: MAX_BLOCKS,
        }
    );
    assert_eq!(memory.staged().len(), MAX_BLOCKS);
    assert!(memory.commits().is_empty());
    assert_eq!(memory.contents(BUCKET, "huge"), None);
}

#[rstest]
fn block_ids_share_one_length() {
    assert_eq!(block_id(0), "00000000");
    assert_eq!(block_id(7).len(), block_id(49_999).len());
}

#[rstest]
#[tokio::test]
async fn downloads_stream_the_blob(memory: Arc<MemoryBlobService>) {
    memory.insert(BUCKET, "backups/b1/velero-backup.json", "{}");
    let object_store = store(&memory, 4);

    let mut reader = object_store
        .get_object(BUCKET, "backups/b1/velero-backup.json")
        .await
        .unwrap_or_else(|err| panic!("download should succeed: {err}"));
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .await
        .unwrap_or_else(|err| panic!("body should read: {err}"));
    assert_eq!(contents, "{}");
}

#[rstest]
#[tokio::test]
async fn existence_and_deletion(memory: Arc<MemoryBlobService>) {
    memory.insert(BUCKET, "key", "value");
    let object_store = store(&memory, 4);

    assert_eq!(object_store.object_exists(BUCKET, "key").await, Ok(true));
    assert_eq!(object_store.object_exists(BUCKET, "other").await, Ok(false));

    object_store
        .delete_object(BUCKET, "key")
        .await
        .unwrap_or_else(|err| panic!("delete should succeed: {err}"));
    assert_eq!(object_store.object_exists(BUCKET, "key").await, Ok(false));

    let err = object_store
        .delete_object(BUCKET, "key")
        .await
        .expect_err("deleting a missing blob should fail");
    assert!(matches!(err, ObjectStoreError::Blob(ref blob) if blob.is_not_found()));
}

#[rstest]
#[tokio::test]
async fn listings_split_names_and_prefixes(memory: Arc<MemoryBlobService>) {
    for key in [
        "backups/b1/b1.tar.gz",
        "backups/b1/velero-backup.json",
        "backups/b2/b2.tar.gz",
        "restores/r1/log.gz",
        "backups-readme",
    ] {
        memory.insert(BUCKET, key, "x");
    }
    let object_store = store(&memory, 4);

    let prefixes = object_store
        .list_common_prefixes(BUCKET, "backups/", "/")
        .await
        .unwrap_or_else(|err| panic!("prefixes should list: {err}"));
    assert_eq!(prefixes, vec!["backups/b1/".to_owned(), "backups/b2/".to_owned()]);

    let names = object_store
        .list_objects(BUCKET, "backups/b1/")
        .await
        .unwrap_or_else(|err| panic!("objects should list: {err}"));
    assert_eq!(
        names,
        vec![
            "backups/b1/b1.tar.gz".to_owned(),
            "backups/b1/velero-backup.json".to_owned(),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn signed_urls_are_delegated(memory: Arc<MemoryBlobService>) {
    let object_store = store(&memory, 4);
    let url = object_store
        .create_signed_url(BUCKET, "key", Duration::from_secs(600))
        .await
        .unwrap_or_else(|err| panic!("url should sign: {err}"));
    assert_eq!(url, "https://memory.blob.invalid/velero/key?se=600");
}

#[rstest]
#[tokio::test]
async fn operations_require_init() {
    let object_store = AzureObjectStore::new();
    assert_eq!(object_store.block_size(), DEFAULT_BLOCK_SIZE);
    assert_eq!(
        object_store.object_exists(BUCKET, "key").await,
        Err(ObjectStoreError::NotInitialised)
    );
    let err = object_store
        .put_object(BUCKET, "key", body(&["data"]))
        .await
        .expect_err("uninitialised put should fail");
    assert_eq!(err, ObjectStoreError::NotInitialised);
}

#[rstest]
#[tokio::test]
async fn init_rejects_unknown_keys() {
    let mut object_store = AzureObjectStore::new();
    let config = plugin_config(&[("storageAccount", "acct"), ("region", "westeurope")]);
    let err = object_store
        .init(&config)
        .await
        .expect_err("unknown keys should fail");
    let ObjectStoreError::InvalidConfig(invalid) = &err else {
        panic!("expected invalid config, got {err:?}");
    };
    assert_eq!(invalid.invalid, vec!["region".to_owned()]);
    assert!(object_store.service().is_none());
}

#[rstest]
#[tokio::test]
async fn init_requires_a_storage_account() {
    let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = dir.path().join("credentials");
    std::fs::write(&path, "AZURE_CLOUD_NAME=AzurePublicCloud\n")
        .unwrap_or_else(|err| panic!("write credentials: {err}"));
    let path_text = path.to_string_lossy().into_owned();

    let _env = EnvGuard::apply(&[], &["AZURE_CREDENTIALS_FILE"]).await;
    let mut object_store = AzureObjectStore::new();
    let config = plugin_config(&[(CREDENTIALS_FILE_KEY, &path_text)]);
    let err = object_store
        .init(&config)
        .await
        .expect_err("missing account should fail");
    assert_eq!(
        err.to_string(),
        "missing configuration field: storageAccount"
    );
}
