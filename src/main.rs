//! Binary entry point for the `velero-plugin-azure` harness.
//!
//! Each subcommand builds a plugin from the registry, initialises it with
//! the `--config` pairs, and runs one operation against it.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use futures::StreamExt;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing_subscriber::EnvFilter;

use velero_plugin_azure::config::parse_duration;
use velero_plugin_azure::server::{DynObjectStore, DynVolumeSnapshotter};
use velero_plugin_azure::{
    ObjectBody, ObjectStoreError, PluginConfig, PluginServer, PluginSettings, ServerError,
    SnapshotterError, default_server,
};

mod cli;

use cli::{
    Cli, DeleteSnapshotCommand, GetCommand, ListCommand, LocationArgs, ObjectCommand,
    PrefixCommand, PutCommand, RestoreCommand, SignCommand, SnapshotCommand, VolumeInfoCommand,
};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),
    #[error("volume snapshotter error: {0}")]
    Snapshotter(#[from] SnapshotterError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let server = default_server();
    let mut stdout = io::stdout();
    let exit_code = match dispatch(cli, &server, &mut stdout).await {
        Ok(code) => code,
        Err(err) => {
            write_error(io::stderr(), &err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let level = PluginSettings::load_without_cli_args()
        .map(|settings| settings.log_level)
        .unwrap_or_else(|_| PluginSettings::default().log_level);
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

async fn dispatch(
    cli: Cli,
    server: &PluginServer,
    out: &mut impl Write,
) -> Result<i32, CliError> {
    match cli {
        Cli::Put(command) => put(server, &command).await,
        Cli::Get(command) => get(server, &command).await,
        Cli::Exists(command) => exists(server, &command, out).await,
        Cli::Delete(command) => delete(server, &command).await,
        Cli::Ls(command) => list(server, &command, out).await,
        Cli::Prefixes(command) => prefixes(server, &command, out).await,
        Cli::Sign(command) => sign(server, &command, out).await,
        Cli::Snapshot(command) => snapshot(server, &command, out).await,
        Cli::DeleteSnapshot(command) => delete_snapshot(server, &command).await,
        Cli::Restore(command) => restore(server, &command, out).await,
        Cli::VolumeInfo(command) => volume_info(server, &command, out).await,
        Cli::Plugins => plugins(server, out),
    }
}

fn location_config(location: &LocationArgs) -> PluginConfig {
    location.config.iter().cloned().collect()
}

async fn object_store(
    server: &PluginServer,
    location: &LocationArgs,
) -> Result<DynObjectStore, CliError> {
    let mut store = server.object_store(&location.plugin)?;
    store.init(&location_config(location)).await?;
    Ok(store)
}

async fn volume_snapshotter(
    server: &PluginServer,
    location: &LocationArgs,
) -> Result<DynVolumeSnapshotter, CliError> {
    let mut snapshotter = server.volume_snapshotter(&location.plugin)?;
    snapshotter.init(&location_config(location)).await?;
    Ok(snapshotter)
}

async fn put(server: &PluginServer, command: &PutCommand) -> Result<i32, CliError> {
    let body: ObjectBody = match command.file.as_deref() {
        Some(path) => ReaderStream::new(tokio::fs::File::open(path).await?).boxed(),
        None => ReaderStream::new(tokio::io::stdin()).boxed(),
    };
    let ObjectCommand {
        location,
        bucket,
        key,
    } = &command.object;
    let store = object_store(server, location).await?;
    store.put_object(bucket, key, body).await?;
    Ok(0)
}

async fn get(server: &PluginServer, command: &GetCommand) -> Result<i32, CliError> {
    let ObjectCommand {
        location,
        bucket,
        key,
    } = &command.object;
    let store = object_store(server, location).await?;
    let mut reader = store.get_object(bucket, key).await?;
    match command.output.as_deref() {
        Some(path) => {
            let mut file = tokio::fs::File::create(path).await?;
            tokio::io::copy(&mut reader, &mut file).await?;
        }
        None => {
            tokio::io::copy(&mut reader, &mut tokio::io::stdout()).await?;
        }
    }
    Ok(0)
}

async fn exists(
    server: &PluginServer,
    command: &ObjectCommand,
    out: &mut impl Write,
) -> Result<i32, CliError> {
    let store = object_store(server, &command.location).await?;
    let found = store.object_exists(&command.bucket, &command.key).await?;
    writeln!(out, "{found}")?;
    Ok(0)
}

async fn delete(server: &PluginServer, command: &ObjectCommand) -> Result<i32, CliError> {
    let store = object_store(server, &command.location).await?;
    store.delete_object(&command.bucket, &command.key).await?;
    Ok(0)
}

async fn list(
    server: &PluginServer,
    command: &ListCommand,
    out: &mut impl Write,
) -> Result<i32, CliError> {
    let store = object_store(server, &command.location).await?;
    for name in store.list_objects(&command.bucket, &command.prefix).await? {
        writeln!(out, "{name}")?;
    }
    Ok(0)
}

async fn prefixes(
    server: &PluginServer,
    command: &PrefixCommand,
    out: &mut impl Write,
) -> Result<i32, CliError> {
    let store = object_store(server, &command.location).await?;
    let found = store
        .list_common_prefixes(&command.bucket, &command.prefix, &command.delimiter)
        .await?;
    for prefix in found {
        writeln!(out, "{prefix}")?;
    }
    Ok(0)
}

async fn sign(
    server: &PluginServer,
    command: &SignCommand,
    out: &mut impl Write,
) -> Result<i32, CliError> {
    let ttl = parse_duration(&command.ttl)
        .ok_or_else(|| CliError::InvalidArgument(format!("invalid ttl {:?}", command.ttl)))?;
    let ObjectCommand {
        location,
        bucket,
        key,
    } = &command.object;
    let store = object_store(server, location).await?;
    let url = store.create_signed_url(bucket, key, ttl).await?;
    writeln!(out, "{url}")?;
    Ok(0)
}

async fn snapshot(
    server: &PluginServer,
    command: &SnapshotCommand,
    out: &mut impl Write,
) -> Result<i32, CliError> {
    let tags: BTreeMap<String, String> = command.tags.iter().cloned().collect();
    let snapshotter = volume_snapshotter(server, &command.location).await?;
    let id = snapshotter
        .create_snapshot(&command.volume_id, &command.volume_az, &tags)
        .await?;
    writeln!(out, "{id}")?;
    Ok(0)
}

async fn delete_snapshot(
    server: &PluginServer,
    command: &DeleteSnapshotCommand,
) -> Result<i32, CliError> {
    let snapshotter = volume_snapshotter(server, &command.location).await?;
    snapshotter.delete_snapshot(&command.snapshot_id).await?;
    Ok(0)
}

async fn restore(
    server: &PluginServer,
    command: &RestoreCommand,
    out: &mut impl Write,
) -> Result<i32, CliError> {
    let snapshotter = volume_snapshotter(server, &command.location).await?;
    let volume_id = snapshotter
        .create_volume_from_snapshot(
            &command.snapshot_id,
            &command.volume_type,
            &command.volume_az,
            command.iops,
        )
        .await?;
    writeln!(out, "{volume_id}")?;
    Ok(0)
}

async fn volume_info(
    server: &PluginServer,
    command: &VolumeInfoCommand,
    out: &mut impl Write,
) -> Result<i32, CliError> {
    let snapshotter = volume_snapshotter(server, &command.location).await?;
    let info = snapshotter
        .get_volume_info(&command.volume_id, &command.volume_az)
        .await?;
    writeln!(out, "type: {}", info.volume_type)?;
    if let Some(iops) = info.iops {
        writeln!(out, "iops: {iops}")?;
    }
    Ok(0)
}

fn plugins(server: &PluginServer, out: &mut impl Write) -> Result<i32, CliError> {
    for (kind, name) in server.plugins() {
        writeln!(out, "{kind}\t{name}")?;
    }
    Ok(0)
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod main_tests;
