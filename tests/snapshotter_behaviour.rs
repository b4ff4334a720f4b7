//! Behavioural scenarios for the volume snapshotter.

#[path = "common/test_constants.rs"]
mod test_constants;

mod snapshotter;
