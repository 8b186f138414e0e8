// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test fixtures: an input payload, optionally paired with a reference output.
//!
//! Fixtures are usually discovered on disk with [`discover_fixtures`], which follows these
//! conventions:
//!
//! * inputs are extensionless files (`01`, `40`, `100`, ...);
//! * the reference output for `dir/40` is the first file that exists among `dir/A 40`,
//!   `dir/A40`, `dir/40.out`, `dir/40.ans` and `dir/40.a` (the prefixes and extensions are
//!   configurable through [`FixtureNaming`]);
//! * files that look like reference outputs are never treated as inputs.

use crate::errors::FixtureDiscoveryError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, io};
use walkdir::WalkDir;

/// The stable identity of a fixture: its path relative to the fixture base directory, using
/// forward slashes.
///
/// Fixture identities order the rows of every report.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureId(String);

impl FixtureId {
    /// Creates a new fixture identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last path component of the identity.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for FixtureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn lossy(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

/// Where the text of a fixture payload comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FixtureSource {
    /// The payload is held in memory.
    Inline(String),

    /// The payload is read from a file when it is needed.
    File(Utf8PathBuf),
}

impl FixtureSource {
    /// Reads the payload.
    ///
    /// Invalid UTF-8 is replaced rather than rejected: the comparison is token-based and a stray
    /// byte should surface as a wrong answer, not as a harness failure.
    pub fn read(&self) -> io::Result<String> {
        match self {
            Self::Inline(text) => Ok(text.clone()),
            Self::File(path) => Ok(lossy(std::fs::read(path)?)),
        }
    }

    /// Reads the payload without blocking the async runtime, with the same decoding as
    /// [`read`](Self::read).
    pub async fn read_async(&self) -> io::Result<String> {
        match self {
            Self::Inline(text) => Ok(text.clone()),
            Self::File(path) => Ok(lossy(tokio::fs::read(path).await?)),
        }
    }

    /// Returns the path of this payload, if it is file-backed.
    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Inline(_) => None,
            Self::File(path) => Some(path),
        }
    }

    /// Returns a printable description of where this payload lives.
    pub(crate) fn describe(&self) -> Utf8PathBuf {
        match self {
            Self::Inline(_) => Utf8PathBuf::from("<inline>"),
            Self::File(path) => path.clone(),
        }
    }
}

/// One input case, optionally paired with an expected output.
///
/// Fixtures are immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestFixture {
    id: FixtureId,
    input: FixtureSource,
    reference: Option<FixtureSource>,
}

impl TestFixture {
    /// Creates a new fixture.
    pub fn new(id: FixtureId, input: FixtureSource, reference: Option<FixtureSource>) -> Self {
        Self {
            id,
            input,
            reference,
        }
    }

    /// Creates a fixture whose payloads are held in memory.
    pub fn inline(id: impl Into<String>, input: impl Into<String>, reference: Option<&str>) -> Self {
        Self::new(
            FixtureId::new(id),
            FixtureSource::Inline(input.into()),
            reference.map(|text| FixtureSource::Inline(text.to_owned())),
        )
    }

    /// Returns the identity of this fixture.
    pub fn id(&self) -> &FixtureId {
        &self.id
    }

    /// Returns the input payload.
    pub fn input(&self) -> &FixtureSource {
        &self.input
    }

    /// Returns the reference output payload, if any.
    pub fn reference(&self) -> Option<&FixtureSource> {
        self.reference.as_ref()
    }
}

/// Naming conventions that decide which files are inputs and where their reference outputs live.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FixtureNaming {
    /// Prefixes prepended to an input's file name to find its reference output, tried in order.
    pub output_prefixes: Vec<String>,

    /// Extensions appended to an input's file name to find its reference output, tried in order
    /// after the prefixes.
    pub output_extensions: Vec<String>,
}

impl Default for FixtureNaming {
    fn default() -> Self {
        Self {
            output_prefixes: vec!["A ".to_owned(), "A".to_owned()],
            output_extensions: vec![".out".to_owned(), ".ans".to_owned(), ".a".to_owned()],
        }
    }
}

impl FixtureNaming {
    /// Returns true if `file_name` looks like a fixture input.
    ///
    /// Inputs have no extension. Names that look like a reference output (`A 40`, `A40`) are
    /// excluded: a prefix ending in whitespace excludes any name, while other prefixes exclude
    /// names whose remainder is all digits.
    pub fn is_input_name(&self, file_name: &str) -> bool {
        if Utf8Path::new(file_name).extension().is_some() {
            return false;
        }

        !self.output_prefixes.iter().any(|prefix| {
            match file_name.strip_prefix(prefix.as_str()) {
                Some(rest) if !rest.is_empty() => {
                    prefix.ends_with(char::is_whitespace)
                        || rest.chars().all(|c| c.is_ascii_digit())
                }
                _ => false,
            }
        })
    }

    /// Returns the reference output for the given input, if one exists on disk.
    pub fn reference_output_for(&self, input: &Utf8Path) -> Option<Utf8PathBuf> {
        let dir = input.parent()?;
        let name = input.file_name()?;

        let with_prefix = self
            .output_prefixes
            .iter()
            .map(|prefix| dir.join(format!("{prefix}{name}")));
        let with_extension = self
            .output_extensions
            .iter()
            .map(|ext| dir.join(format!("{name}{ext}")));

        with_prefix.chain(with_extension).find(|path| path.is_file())
    }
}

/// Walks `roots` recursively and returns every fixture found, sorted by identity.
///
/// Fixture identities are computed relative to `base`.
pub fn discover_fixtures(
    base: &Utf8Path,
    roots: &[Utf8PathBuf],
    naming: &FixtureNaming,
) -> Result<Vec<TestFixture>, FixtureDiscoveryError> {
    let mut inputs = BTreeSet::new();

    for root in roots {
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|err| FixtureDiscoveryError::Walk {
                root: root.clone(),
                err,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = Utf8PathBuf::from_path_buf(entry.into_path())
                .map_err(|path| FixtureDiscoveryError::NonUtf8Path { path })?;
            let is_input = path
                .file_name()
                .is_some_and(|name| naming.is_input_name(name));
            if is_input {
                inputs.insert(path);
            }
        }
    }

    let mut fixtures: Vec<_> = inputs
        .into_iter()
        .map(|input| {
            let id = fixture_id_for(base, &input);
            let reference = naming.reference_output_for(&input).map(FixtureSource::File);
            TestFixture::new(id, FixtureSource::File(input), reference)
        })
        .collect();

    // Sorting by path and by relative identity can differ if roots lie outside the base.
    fixtures.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(fixtures)
}

/// Returns the sorted list of suites (immediate subdirectories) under `tests_root`.
///
/// A missing root has no suites.
pub fn list_suites(tests_root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FixtureDiscoveryError> {
    if !tests_root.is_dir() {
        return Ok(Vec::new());
    }
    list_subdirs(tests_root)
}

/// Returns the sorted list of groups (immediate subdirectories) in a suite.
///
/// A suite without subdirectories is its own single group.
pub fn list_groups(suite_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FixtureDiscoveryError> {
    let groups = list_subdirs(suite_dir)?;
    if groups.is_empty() {
        return Ok(vec![suite_dir.to_owned()]);
    }
    Ok(groups)
}

fn list_subdirs(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FixtureDiscoveryError> {
    let read_dir_err = |err| FixtureDiscoveryError::ReadDir {
        dir: dir.to_owned(),
        err,
    };

    let mut subdirs = Vec::new();
    for entry in dir.read_dir_utf8().map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        if entry.path().is_dir() {
            subdirs.push(entry.into_path());
        }
    }
    subdirs.sort();
    Ok(subdirs)
}

fn fixture_id_for(base: &Utf8Path, input: &Utf8Path) -> FixtureId {
    let relative = pathdiff::diff_utf8_paths(input, base).unwrap_or_else(|| input.to_owned());
    let id = relative
        .components()
        .map(|component| component.as_str())
        .collect::<Vec<_>>()
        .join("/");
    FixtureId::new(id)
}
