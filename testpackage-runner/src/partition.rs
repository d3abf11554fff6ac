// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for partitioning a test run across several machines.
//!
//! Sharding operates on whole test classes so that intra-class ordering is
//! preserved on every shard. The hash is fixed to xxhash64 with seed 0, which
//! is stable across platforms and processes.

use std::{error, fmt, str::FromStr};
use xxhash_rust::xxh64::xxh64;

/// An assignment of this process to one shard of a partitioned run.
///
/// Parsed from the CLI as `<index>/<total>` with `0 <= index < total`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShardAssignment {
    index: u64,
    total: u64,
}

impl ShardAssignment {
    /// Creates a new assignment. Returns an error unless `index < total`.
    pub fn new(index: u64, total: u64) -> Result<Self, ShardParseError> {
        if total == 0 {
            return Err(ShardParseError::new("total shard count must be non-zero"));
        }
        if index >= total {
            return Err(ShardParseError::new(format!(
                "shard index {index} must be less than total shards {total}"
            )));
        }
        Ok(Self { index, total })
    }

    /// Returns true if the named class belongs to this shard.
    pub fn matches_class(&self, class_name: &str) -> bool {
        xxh64(class_name.as_bytes(), 0) % self.total == self.index
    }

    /// The 0-based shard index.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The total number of shards.
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl fmt::Display for ShardAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

impl FromStr for ShardAssignment {
    type Err = ShardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, total) = s
            .split_once('/')
            .ok_or_else(|| ShardParseError::new(format!("expected '{s}' to be in the format I/N")))?;
        let index: u64 = index
            .parse()
            .map_err(|_| ShardParseError::new(format!("failed to parse shard index '{index}'")))?;
        let total: u64 = total
            .parse()
            .map_err(|_| ShardParseError::new(format!("failed to parse total shards '{total}'")))?;
        Self::new(index, total)
    }
}

/// An error that occurs while parsing a [`ShardAssignment`] input.
#[derive(Clone, Debug)]
pub struct ShardParseError {
    message: String,
}

impl ShardParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ShardParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard must be in the format \"I/N\": {}", self.message)
    }
}

impl error::Error for ShardParseError {}
