//! Command-line interface definitions for the `velero-plugin-azure` binary.
//!
//! This module isolates the clap parser structures so the build script can
//! reuse them when generating the manual page.

use clap::{Args, Parser};

/// Name the Azure plugins are registered under.
pub(crate) const DEFAULT_PLUGIN: &str = "velero.io/azure";

/// Top-level CLI for the `velero-plugin-azure` binary.
#[derive(Debug, Parser)]
#[command(
    name = "velero-plugin-azure",
    about = "Drive the Azure object-store and volume-snapshotter plugins locally",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Upload a file, or standard input, as an object.
    #[command(name = "put", about = "Upload a file, or standard input, as an object")]
    Put(PutCommand),
    /// Write an object to standard output or a file.
    #[command(name = "get", about = "Write an object to standard output or a file")]
    Get(GetCommand),
    /// Report whether an object exists.
    #[command(name = "exists", about = "Report whether an object exists")]
    Exists(ObjectCommand),
    /// Delete an object.
    #[command(name = "delete", about = "Delete an object")]
    Delete(ObjectCommand),
    /// List the objects under a prefix.
    #[command(name = "ls", about = "List the objects under a prefix")]
    Ls(ListCommand),
    /// List the common prefixes under a prefix.
    #[command(name = "prefixes", about = "List the common prefixes under a prefix")]
    Prefixes(PrefixCommand),
    /// Print a time-limited download URL for an object.
    #[command(name = "sign", about = "Print a time-limited download URL for an object")]
    Sign(SignCommand),
    /// Snapshot a managed disk.
    #[command(name = "snapshot", about = "Snapshot a managed disk")]
    Snapshot(SnapshotCommand),
    /// Delete a snapshot.
    #[command(name = "delete-snapshot", about = "Delete a snapshot")]
    DeleteSnapshot(DeleteSnapshotCommand),
    /// Create a managed disk from a snapshot.
    #[command(name = "restore", about = "Create a managed disk from a snapshot")]
    Restore(RestoreCommand),
    /// Print the type and IOPS of a managed disk.
    #[command(name = "volume-info", about = "Print the type and IOPS of a managed disk")]
    VolumeInfo(VolumeInfoCommand),
    /// List the registered plugins.
    #[command(name = "plugins", about = "List the registered plugins")]
    Plugins,
}

/// Location shared by every plugin subcommand.
#[derive(Debug, Args)]
pub(crate) struct LocationArgs {
    /// Location configuration entry; repeat for each key.
    #[arg(
        long = "config",
        short = 'c',
        value_name = "KEY=VALUE",
        value_parser = parse_pair
    )]
    pub(crate) config: Vec<(String, String)>,
    /// Registered plugin name.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_PLUGIN)]
    pub(crate) plugin: String,
}

/// Arguments naming one object.
#[derive(Debug, Args)]
pub(crate) struct ObjectCommand {
    #[command(flatten)]
    pub(crate) location: LocationArgs,
    /// Container holding the object.
    pub(crate) bucket: String,
    /// Object key.
    pub(crate) key: String,
}

/// Arguments for `put`.
#[derive(Debug, Args)]
pub(crate) struct PutCommand {
    #[command(flatten)]
    pub(crate) object: ObjectCommand,
    /// File to upload; standard input is read when omitted.
    #[arg(long, short = 'f', value_name = "PATH")]
    pub(crate) file: Option<String>,
}

/// Arguments for `get`.
#[derive(Debug, Args)]
pub(crate) struct GetCommand {
    #[command(flatten)]
    pub(crate) object: ObjectCommand,
    /// File to write; standard output is used when omitted.
    #[arg(long, short = 'o', value_name = "PATH")]
    pub(crate) output: Option<String>,
}

/// Arguments for `ls`.
#[derive(Debug, Args)]
pub(crate) struct ListCommand {
    #[command(flatten)]
    pub(crate) location: LocationArgs,
    /// Container to list.
    pub(crate) bucket: String,
    /// Only list keys beginning with this prefix.
    #[arg(long, default_value = "")]
    pub(crate) prefix: String,
}

/// Arguments for `prefixes`.
#[derive(Debug, Args)]
pub(crate) struct PrefixCommand {
    #[command(flatten)]
    pub(crate) location: LocationArgs,
    /// Container to list.
    pub(crate) bucket: String,
    /// Only consider keys beginning with this prefix.
    #[arg(long, default_value = "")]
    pub(crate) prefix: String,
    /// Separator collapsing keys into prefixes.
    #[arg(long, default_value = "/")]
    pub(crate) delimiter: String,
}

/// Arguments for `sign`.
#[derive(Debug, Args)]
pub(crate) struct SignCommand {
    #[command(flatten)]
    pub(crate) object: ObjectCommand,
    /// Lifetime of the URL, for example `10m` or `1h30m`.
    #[arg(long, value_name = "DURATION", default_value = "10m")]
    pub(crate) ttl: String,
}

/// Arguments for `snapshot`.
#[derive(Debug, Args)]
pub(crate) struct SnapshotCommand {
    #[command(flatten)]
    pub(crate) location: LocationArgs,
    /// Disk name.
    pub(crate) volume_id: String,
    /// Availability zone of the disk.
    #[arg(long, value_name = "ZONE", default_value = "")]
    pub(crate) volume_az: String,
    /// Tag applied to the snapshot; repeat for each tag.
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub(crate) tags: Vec<(String, String)>,
}

/// Arguments for `delete-snapshot`.
#[derive(Debug, Args)]
pub(crate) struct DeleteSnapshotCommand {
    #[command(flatten)]
    pub(crate) location: LocationArgs,
    /// Fully-qualified snapshot ID.
    pub(crate) snapshot_id: String,
}

/// Arguments for `restore`.
#[derive(Debug, Args)]
pub(crate) struct RestoreCommand {
    #[command(flatten)]
    pub(crate) location: LocationArgs,
    /// Fully-qualified snapshot ID.
    pub(crate) snapshot_id: String,
    /// Storage SKU of the new disk.
    #[arg(long, value_name = "SKU")]
    pub(crate) volume_type: String,
    /// Availability zone of the new disk.
    #[arg(long, value_name = "ZONE", default_value = "")]
    pub(crate) volume_az: String,
    /// Provisioned IOPS of the new disk.
    #[arg(long)]
    pub(crate) iops: Option<i64>,
}

/// Arguments for `volume-info`.
#[derive(Debug, Args)]
pub(crate) struct VolumeInfoCommand {
    #[command(flatten)]
    pub(crate) location: LocationArgs,
    /// Disk name.
    pub(crate) volume_id: String,
    /// Availability zone of the disk.
    #[arg(long, value_name = "ZONE", default_value = "")]
    pub(crate) volume_az: String,
}

/// Splits a `KEY=VALUE` argument at the first `=`.
pub(crate) fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("missing key in {raw:?}"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
