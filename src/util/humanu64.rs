//! Size/bandwidth quantities which may be written with SI suffixes
// (c) 2024 Ross Younger

use std::{ops::Deref, str::FromStr};

use anyhow::Context as _;
use humanize_rs::bytes::Bytes;
use serde::Serialize;

use super::cli::IntOrString;

/// An integer quantity that may also be expressed using engineering prefixes (k, M, G, etc).
/// For example, `64k` and `64000` are the same.
///
/// This is used for packet sizes on the command line and for bandwidth settings, both on the
/// command line and in configuration files. It always serializes as a plain integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "u64")]
pub struct HumanU64(pub u64);

impl HumanU64 {
    /// standard constructor
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Converts to a `usize`, for use as a buffer length
    pub fn to_usize(self) -> anyhow::Result<usize> {
        usize::try_from(self.0).with_context(|| format!("{} is too large", self.0))
    }
}

impl Deref for HumanU64 {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<HumanU64> for u64 {
    fn from(value: HumanU64) -> Self {
        value.0
    }
}

impl From<u64> for HumanU64 {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl FromStr for HumanU64 {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = Bytes::<u64>::from_str(s.trim())
            .with_context(|| format!("could not parse {s:?} as a quantity"))?;
        Ok(Self::new(bytes.size()))
    }
}

impl<'de> serde::Deserialize<'de> for HumanU64 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(IntOrString::default())
    }
}
