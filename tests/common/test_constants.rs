//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Subscription holding the disks in test scenarios.
pub const DISK_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000001";

/// Resource group holding the disks in test scenarios.
pub const DISK_RESOURCE_GROUP: &str = "aks-nodes";

/// Resource group receiving snapshots in test scenarios.
pub const SNAPSHOT_RESOURCE_GROUP: &str = "velero-snapshots";

/// Storage account used by object-store tests.
pub const STORAGE_ACCOUNT: &str = "velerobackups";

/// Base64 account key accepted by the shared-key signer.
pub const ACCOUNT_KEY: &str = "dGVzdC1hY2NvdW50LWtleS0wMTIzNDU2Nzg5";
