//! Unit tests for the `velero-plugin-azure` binary implementation.

use super::*;
use crate::cli::{PrefixCommand, parse_pair};
use rstest::rstest;

fn location(pairs: &[(&str, &str)], plugin: &str) -> LocationArgs {
    LocationArgs {
        config: pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect(),
        plugin: plugin.to_owned(),
    }
}

fn object(pairs: &[(&str, &str)], plugin: &str) -> ObjectCommand {
    ObjectCommand {
        location: location(pairs, plugin),
        bucket: "velero".to_owned(),
        key: "backups/b1/b1.tar.gz".to_owned(),
    }
}

#[rstest]
#[case("storageAccount=acct", ("storageAccount", "acct"))]
#[case("tags=a=b,c=d", ("tags", "a=b,c=d"))]
#[case("prefix=", ("prefix", ""))]
fn pairs_split_at_the_first_equals(#[case] raw: &str, #[case] expected: (&str, &str)) {
    assert_eq!(
        parse_pair(raw),
        Ok((expected.0.to_owned(), expected.1.to_owned()))
    );
}

#[rstest]
#[case("storageAccount")]
#[case("=acct")]
fn malformed_pairs_are_rejected(#[case] raw: &str) {
    assert!(parse_pair(raw).is_err());
}

#[rstest]
fn config_flags_parse_into_the_location() {
    let parsed = Cli::try_parse_from([
        "velero-plugin-azure",
        "exists",
        "--config",
        "storageAccount=acct",
        "-c",
        "useAAD=true",
        "velero",
        "key",
    ])
    .unwrap_or_else(|err| panic!("arguments should parse: {err}"));
    let Cli::Exists(command) = parsed else {
        panic!("expected the exists subcommand");
    };
    assert_eq!(command.location.plugin, cli::DEFAULT_PLUGIN);
    assert_eq!(
        location_config(&command.location),
        [
            ("storageAccount".to_owned(), "acct".to_owned()),
            ("useAAD".to_owned(), "true".to_owned()),
        ]
        .into_iter()
        .collect::<PluginConfig>()
    );
}

#[rstest]
#[tokio::test]
async fn plugins_lists_the_registry() {
    let mut out = Vec::new();
    let code = dispatch(Cli::Plugins, &default_server(), &mut out)
        .await
        .unwrap_or_else(|err| panic!("plugins should list: {err}"));
    assert_eq!(code, 0);
    assert_eq!(
        String::from_utf8_lossy(&out),
        "ObjectStore\tvelero.io/azure\nVolumeSnapshotter\tvelero.io/azure\n"
    );
}

#[rstest]
#[tokio::test]
async fn unknown_plugins_are_reported() {
    let mut out = Vec::new();
    let err = dispatch(
        Cli::Exists(object(&[], "velero.io/aws")),
        &default_server(),
        &mut out,
    )
    .await
    .expect_err("unknown plugin should fail");
    assert!(matches!(err, CliError::Server(_)), "unexpected error: {err}");
    assert!(out.is_empty());
}

#[rstest]
#[tokio::test]
async fn invalid_location_keys_fail_before_any_request() {
    let mut out = Vec::new();
    let err = dispatch(
        Cli::Prefixes(PrefixCommand {
            location: location(&[("bogus", "1")], cli::DEFAULT_PLUGIN),
            bucket: "velero".to_owned(),
            prefix: String::new(),
            delimiter: "/".to_owned(),
        }),
        &default_server(),
        &mut out,
    )
    .await
    .expect_err("invalid key should fail");
    assert!(
        err.to_string()
            .starts_with("object store error: config has invalid keys [\"bogus\"]"),
        "unexpected error: {err}"
    );
}

#[rstest]
#[tokio::test]
async fn invalid_ttls_are_rejected() {
    let mut out = Vec::new();
    let err = dispatch(
        Cli::Sign(SignCommand {
            object: object(&[], cli::DEFAULT_PLUGIN),
            ttl: "ten minutes".to_owned(),
        }),
        &default_server(),
        &mut out,
    )
    .await
    .expect_err("bad ttl should fail");
    assert_eq!(err.to_string(), "invalid argument: invalid ttl \"ten minutes\"");
}

#[rstest]
fn write_error_writes_cli_error() {
    let mut buf = Vec::new();
    let err = CliError::InvalidArgument("bad".to_owned());
    write_error(&mut buf, &err);
    let rendered = String::from_utf8(buf).unwrap_or_else(|utf8_err| panic!("utf8: {utf8_err}"));
    assert_eq!(rendered, "invalid argument: bad\n");
}
