//! General utility code that didn't fit anywhere else
// (c) 2024 Ross Younger

pub mod backoff;
pub mod cli;

mod dns;
pub use dns::{lookup_host_by_family, AddressFamily};

mod humanu64;
pub use humanu64::HumanU64;

pub mod socket;
pub mod stats;

mod tracing;
pub use tracing::setup as setup_tracing;

#[cfg(test)]
pub(crate) use tracing::setup_tracing_for_tests;

#[cfg(test)]
pub(crate) fn make_test_tempfile(
    data: &str,
    filename: &str,
) -> (std::path::PathBuf, tempfile::TempDir) {
    let tempdir = tempfile::tempdir().unwrap();
    let path = tempdir.path().join(filename);
    std::fs::write(&path, data).expect("Unable to write tempfile");
    (path, tempdir)
}
