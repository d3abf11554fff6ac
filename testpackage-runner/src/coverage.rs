// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The persisted coverage repository.
//!
//! A store directory (`.testpackage/` by default) holds three files:
//!
//! - `probes` — binary: a `u32` probe-point count `N`, then one record per
//!   test of `{u32 id length, id bytes, u32 bitmap length, bitmap bytes}`.
//!   Every bitmap must be exactly `⌈N/8⌉` bytes.
//! - `costs` — lines of `testId=milliseconds`.
//! - `failures` — lines of `testId=runsSinceLastFailure`.
//!
//! Absent files load as empty; malformed content is a fatal
//! [`StoreError::Integrity`]. Bitmaps are written by an external
//! instrumentation agent; this process only folds costs and failure history
//! back in after a run.

use crate::{bitset::BitSet, errors::StoreError};
use camino::{Utf8Path, Utf8PathBuf};
use std::{collections::BTreeMap, fs, io};

/// Default store directory, relative to the working directory.
pub const DEFAULT_STORE_DIR: &str = ".testpackage";

const PROBES_FILE: &str = "probes";
const COSTS_FILE: &str = "costs";
const FAILURES_FILE: &str = "failures";

/// A test's coverage bitmap together with its last observed cost.
///
/// Immutable once assembled; the optimizer clones the bitmap it accumulates
/// into rather than aliasing these.
#[derive(Clone, Debug, PartialEq)]
pub struct TestWithCoverage {
    /// Canonical `method(Class)` id.
    pub id: String,
    /// Bit `i` is set iff the test exercised probe `i` on its last recorded
    /// run.
    pub coverage: BitSet,
    /// Wall-clock cost in milliseconds from the last recorded run.
    pub cost_millis: u64,
}

impl TestWithCoverage {
    /// Creates a new entry.
    pub fn new(id: impl Into<String>, coverage: BitSet, cost_millis: u64) -> Self {
        Self {
            id: id.into(),
            coverage,
            cost_millis,
        }
    }

    /// Fraction of all probe points this test exercises.
    pub fn individual_coverage(&self) -> f64 {
        if self.coverage.is_empty() {
            0.0
        } else {
            self.coverage.cardinality() as f64 / self.coverage.len() as f64
        }
    }

    /// A fixed-width textual bar visualising [`individual_coverage`].
    ///
    /// [`individual_coverage`]: Self::individual_coverage
    pub fn coverage_bar(&self, width: usize) -> String {
        let filled = (self.individual_coverage() * width as f64).round() as usize;
        let mut bar = String::with_capacity(width);
        for i in 0..width {
            bar.push(if i < filled { '#' } else { '.' });
        }
        bar
    }
}

/// The repository of per-test coverage, cost and failure history.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoverageRepository {
    num_probe_points: usize,
    bitmaps: BTreeMap<String, BitSet>,
    costs: BTreeMap<String, u64>,
    runs_since_failure: BTreeMap<String, u64>,
}

impl CoverageRepository {
    /// Creates an empty repository over `num_probe_points` probe points.
    pub fn new(num_probe_points: usize) -> Self {
        Self {
            num_probe_points,
            ..Self::default()
        }
    }

    /// The global probe-point count shared by every bitmap in this store.
    pub fn num_probe_points(&self) -> usize {
        self.num_probe_points
    }

    /// Returns true if no coverage bitmaps are recorded.
    pub fn is_empty(&self) -> bool {
        self.bitmaps.is_empty()
    }

    /// Records a coverage bitmap, replacing any previous bitmap for `id`.
    ///
    /// Bitmap width must equal the repository's probe-point count.
    pub fn record_coverage(&mut self, id: impl Into<String>, coverage: BitSet) {
        assert_eq!(
            coverage.len(),
            self.num_probe_points,
            "bitmap width differs from the repository probe-point count"
        );
        self.bitmaps.insert(id.into(), coverage);
    }

    /// Records an observed cost in milliseconds.
    pub fn record_cost(&mut self, id: impl Into<String>, cost_millis: u64) {
        self.costs.insert(id.into(), cost_millis);
    }

    /// The assembled coverage view for `id`, if a bitmap is recorded.
    ///
    /// A test with a bitmap but no recorded cost is given cost 1 so that
    /// cost-ratio scoring stays well-defined.
    pub fn test_with_coverage(&self, id: &str) -> Option<TestWithCoverage> {
        self.bitmaps.get(id).map(|coverage| {
            TestWithCoverage::new(id, coverage.clone(), self.costs.get(id).copied().unwrap_or(1))
        })
    }

    /// The last observed cost for `id`, if any.
    pub fn cost_millis(&self, id: &str) -> Option<u64> {
        self.costs.get(id).copied()
    }

    /// Runs since `id` last failed; `None` means it has never failed (the
    /// +∞ sentinel, persisted as an absent key).
    pub fn runs_since_failure(&self, id: &str) -> Option<u64> {
        self.runs_since_failure.get(id).copied()
    }

    /// The full failure-history mapping, for sequencer prioritisation.
    pub fn failure_history(&self) -> &BTreeMap<String, u64> {
        &self.runs_since_failure
    }

    /// Folds a completed run into the repository: every existing history
    /// entry ages by one clean run, tests that failed reset to zero, and
    /// every executed test's cost is updated to the latest observation.
    pub fn record_run<'a>(&mut self, results: impl IntoIterator<Item = (&'a str, u64, bool)>) {
        for runs in self.runs_since_failure.values_mut() {
            *runs = runs.saturating_add(1);
        }
        for (id, cost_millis, failed) in results {
            self.costs.insert(id.to_owned(), cost_millis);
            if failed {
                self.runs_since_failure.insert(id.to_owned(), 0);
            }
        }
    }

    /// Loads the repository from `dir`. Absent files yield empty maps; a
    /// malformed file is a fatal integrity error.
    pub fn load(dir: &Utf8Path) -> Result<Self, StoreError> {
        let mut repository = Self::default();

        let probes_path = dir.join(PROBES_FILE);
        if let Some(bytes) = read_optional(&probes_path)? {
            repository.parse_probes(&bytes, &probes_path)?;
        }

        let costs_path = dir.join(COSTS_FILE);
        if let Some(bytes) = read_optional(&costs_path)? {
            repository.costs = parse_line_map(&bytes, &costs_path)?;
        }

        let failures_path = dir.join(FAILURES_FILE);
        if let Some(bytes) = read_optional(&failures_path)? {
            repository.runs_since_failure = parse_line_map(&bytes, &failures_path)?;
        }

        Ok(repository)
    }

    /// Saves the repository to `dir`, creating the directory if needed.
    pub fn save(&self, dir: &Utf8Path) -> Result<(), StoreError> {
        fs::create_dir_all(dir).map_err(|error| StoreError::CreateDir {
            path: dir.to_owned(),
            error,
        })?;

        let mut probes = Vec::new();
        probes.extend_from_slice(&u32::try_from(self.num_probe_points).unwrap_or(u32::MAX).to_le_bytes());
        for (id, bitmap) in &self.bitmaps {
            let bytes = bitmap.to_bytes();
            probes.extend_from_slice(&(id.len() as u32).to_le_bytes());
            probes.extend_from_slice(id.as_bytes());
            probes.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            probes.extend_from_slice(&bytes);
        }
        write_file(&dir.join(PROBES_FILE), &probes)?;

        write_file(&dir.join(COSTS_FILE), render_line_map(&self.costs).as_bytes())?;
        write_file(
            &dir.join(FAILURES_FILE),
            render_line_map(&self.runs_since_failure).as_bytes(),
        )?;
        Ok(())
    }

    fn parse_probes(&mut self, bytes: &[u8], path: &Utf8Path) -> Result<(), StoreError> {
        let integrity = |message: String| StoreError::Integrity {
            path: path.to_owned(),
            message,
        };

        let mut pos = 0;
        let num_probe_points = read_u32(bytes, &mut pos)
            .ok_or_else(|| integrity("truncated probe-point header".to_owned()))?
            as usize;
        self.num_probe_points = num_probe_points;
        let bitmap_len = num_probe_points.div_ceil(8);

        while pos < bytes.len() {
            let id_len = read_u32(bytes, &mut pos)
                .ok_or_else(|| integrity("truncated record header".to_owned()))?
                as usize;
            let id_bytes = read_exact(bytes, &mut pos, id_len)
                .ok_or_else(|| integrity("truncated test id".to_owned()))?;
            let id = std::str::from_utf8(id_bytes)
                .map_err(|_| integrity("test id is not valid UTF-8".to_owned()))?
                .to_owned();

            let record_len = read_u32(bytes, &mut pos)
                .ok_or_else(|| integrity(format!("truncated bitmap header for '{id}'")))?
                as usize;
            if record_len != bitmap_len {
                return Err(integrity(format!(
                    "coverage bitmap for '{id}' is {record_len} bytes, expected {bitmap_len} \
                     for {num_probe_points} probe points"
                )));
            }
            let bitmap_bytes = read_exact(bytes, &mut pos, record_len)
                .ok_or_else(|| integrity(format!("truncated bitmap for '{id}'")))?;
            let bitmap = BitSet::from_bytes(bitmap_bytes, num_probe_points)
                .ok_or_else(|| integrity(format!("unreadable bitmap for '{id}'")))?;

            if self.bitmaps.insert(id.clone(), bitmap).is_some() {
                return Err(integrity(format!("duplicate record for '{id}'")));
            }
        }
        Ok(())
    }
}

fn read_optional(path: &Utf8Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(StoreError::Read {
            path: path.to_owned(),
            error,
        }),
    }
}

fn write_file(path: &Utf8PathBuf, bytes: &[u8]) -> Result<(), StoreError> {
    fs::write(path, bytes).map_err(|error| StoreError::Write {
        path: path.clone(),
        error,
    })
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Option<u32> {
    let slice = read_exact(bytes, pos, 4)?;
    Some(u32::from_le_bytes(slice.try_into().expect("4-byte slice")))
}

fn read_exact<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Option<&'a [u8]> {
    let end = pos.checked_add(len)?;
    if end > bytes.len() {
        return None;
    }
    let slice = &bytes[*pos..end];
    *pos = end;
    Some(slice)
}

fn parse_line_map(bytes: &[u8], path: &Utf8Path) -> Result<BTreeMap<String, u64>, StoreError> {
    let integrity = |message: String| StoreError::Integrity {
        path: path.to_owned(),
        message,
    };

    let text = std::str::from_utf8(bytes)
        .map_err(|_| integrity("file is not valid UTF-8".to_owned()))?;
    let mut map = BTreeMap::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let (id, value) = line
            .rsplit_once('=')
            .ok_or_else(|| integrity(format!("malformed record '{line}'")))?;
        let value: u64 = value
            .parse()
            .map_err(|_| integrity(format!("malformed value in record '{line}'")))?;
        map.insert(id.to_owned(), value);
    }
    Ok(map)
}

fn render_line_map(map: &BTreeMap<String, u64>) -> String {
    let mut out = String::new();
    for (id, value) in map {
        out.push_str(id);
        out.push('=');
        out.push_str(&value.to_string());
        out.push('\n');
    }
    out
}
