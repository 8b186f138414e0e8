// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A cache of compiled executables, keyed by source fingerprint.
//!
//! Each artifact lives at `<cache-dir>/<file-name>.<fingerprint><EXE_SUFFIX>`. Artifacts are
//! built in a staging directory inside the cache directory and renamed into place once complete,
//! so a reader never observes a partially written executable. Old artifacts are never deleted.

use crate::errors::BuildError;
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    collections::HashMap,
    fmt, io,
    sync::{Arc, Mutex, PoisonError},
    time::UNIX_EPOCH,
};
use tracing::{debug, info};
use xxhash_rust::xxh3::Xxh3;

/// The result of invoking a [`Compiler`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CompileOutcome {
    /// The compiler reported success.
    Success,

    /// The compiler reported failure.
    Failure {
        /// Diagnostic text produced by the compiler.
        diagnostics: String,
    },
}

/// The capability to compile a source file into an executable.
pub trait Compiler: fmt::Debug + Send + Sync {
    /// Returns a string identifying this compiler and its settings.
    ///
    /// The identity is part of the fingerprint, so changing compiler settings invalidates
    /// previously built artifacts.
    fn identity(&self) -> String;

    /// Compiles `source` into an executable at `output`.
    ///
    /// Returns an error only if the compiler could not be run at all.
    fn compile(&self, source: &Utf8Path, output: &Utf8Path) -> io::Result<CompileOutcome>;
}

/// A [`Compiler`] that runs an external program as `<program> <flags...> <source> -o <output>`.
#[derive(Clone, Debug)]
pub struct CommandCompiler {
    program: String,
    flags: Vec<String>,
}

impl CommandCompiler {
    /// Creates a new `CommandCompiler`.
    pub fn new(program: impl Into<String>, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }

    fn to_expression(&self, source: &Utf8Path, output: &Utf8Path) -> duct::Expression {
        let args = self
            .flags
            .iter()
            .map(String::as_str)
            .chain([source.as_str(), "-o", output.as_str()]);
        duct::cmd(self.program.as_str(), args)
    }
}

impl Compiler for CommandCompiler {
    fn identity(&self) -> String {
        let mut identity = self.program.clone();
        for flag in &self.flags {
            identity.push(' ');
            identity.push_str(flag);
        }
        identity
    }

    fn compile(&self, source: &Utf8Path, output: &Utf8Path) -> io::Result<CompileOutcome> {
        let expression = self.to_expression(source, output);
        debug!("executing compiler: {:?}", expression);
        let output = expression
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()?;

        if output.status.success() {
            Ok(CompileOutcome::Success)
        } else {
            let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
            diagnostics.push_str(&String::from_utf8_lossy(&output.stdout));
            Ok(CompileOutcome::Failure { diagnostics })
        }
    }
}

/// A fingerprint of a source file's path, content, modification time and compiler identity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Returns the raw hash value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A compiled executable, valid for the source state it was fingerprinted from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutableHandle {
    source: Utf8PathBuf,
    fingerprint: Fingerprint,
    path: Utf8PathBuf,
}

impl ExecutableHandle {
    /// Returns the source file this executable was built from.
    pub fn source(&self) -> &Utf8Path {
        &self.source
    }

    /// Returns the fingerprint of the source at build time.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Returns the path to the executable.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// Maps source files to compiled executables, compiling only on a cache miss.
///
/// Within one process, concurrent [`acquire`](Self::acquire) calls for the same fingerprint
/// compile once: the first caller compiles and later callers wait for it, then reuse the
/// artifact.
#[derive(Debug)]
pub struct BuildCache {
    cache_dir: Utf8PathBuf,
    compiler: Box<dyn Compiler>,
    in_flight: Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl BuildCache {
    /// Creates a new build cache rooted at `cache_dir`. The directory is created lazily.
    pub fn new(cache_dir: impl Into<Utf8PathBuf>, compiler: Box<dyn Compiler>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            compiler,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cache directory.
    pub fn cache_dir(&self) -> &Utf8Path {
        &self.cache_dir
    }

    /// Computes the fingerprint of the current state of `source`.
    pub fn fingerprint(&self, source: &Utf8Path) -> Result<Fingerprint, BuildError> {
        let read_err = |err| BuildError::ReadSource {
            source_path: source.to_owned(),
            err,
        };
        let contents = std::fs::read(source).map_err(read_err)?;
        let mtime_nanos = std::fs::metadata(source)
            .and_then(|metadata| metadata.modified())
            .ok()
            .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |since_epoch| since_epoch.as_nanos());

        let mut hasher = Xxh3::new();
        hasher.update(source.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(&contents);
        hasher.update(&mtime_nanos.to_le_bytes());
        hasher.update(self.compiler.identity().as_bytes());
        Ok(Fingerprint(hasher.digest()))
    }

    /// Returns the artifact path for a source with the given fingerprint.
    pub fn artifact_path(&self, source: &Utf8Path, fingerprint: Fingerprint) -> Utf8PathBuf {
        let file_name = source.file_name().unwrap_or("program");
        self.cache_dir.join(format!(
            "{file_name}.{fingerprint}{}",
            std::env::consts::EXE_SUFFIX
        ))
    }

    /// Returns the executable for the current state of `source` if it has already been built.
    /// Never compiles.
    pub fn lookup(&self, source: &Utf8Path) -> Result<Option<ExecutableHandle>, BuildError> {
        let fingerprint = self.fingerprint(source)?;
        let path = self.artifact_path(source, fingerprint);
        Ok(path.is_file().then(|| ExecutableHandle {
            source: source.to_owned(),
            fingerprint,
            path,
        }))
    }

    /// Returns an executable for the current state of `source`, compiling it if necessary.
    pub fn acquire(&self, source: &Utf8Path) -> Result<ExecutableHandle, BuildError> {
        let fingerprint = self.fingerprint(source)?;
        let path = self.artifact_path(source, fingerprint);
        let handle = ExecutableHandle {
            source: source.to_owned(),
            fingerprint,
            path,
        };

        if handle.path.is_file() {
            debug!(%fingerprint, "cache hit for `{source}`: {}", handle.path);
            return Ok(handle);
        }

        let lock = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            in_flight.entry(fingerprint).or_default().clone()
        };
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Another caller may have finished compiling while we waited.
        if handle.path.is_file() {
            debug!(%fingerprint, "cache hit for `{source}` after waiting: {}", handle.path);
            return Ok(handle);
        }

        debug!(%fingerprint, "cache miss for `{source}`");
        self.compile_and_publish(&handle)?;
        Ok(handle)
    }

    fn compile_and_publish(&self, handle: &ExecutableHandle) -> Result<(), BuildError> {
        let cache_dir_err = |err| BuildError::CacheDirCreate {
            cache_dir: self.cache_dir.clone(),
            err,
        };
        std::fs::create_dir_all(&self.cache_dir).map_err(cache_dir_err)?;
        let staging_dir = camino_tempfile::Builder::new()
            .prefix(".staging-")
            .rand_bytes(5)
            .tempdir_in(&self.cache_dir)
            .map_err(cache_dir_err)?;

        let file_name = handle.path.file_name().unwrap_or("program");
        let staged = staging_dir.path().join(file_name);

        info!("compiling `{}`", handle.source);
        let outcome = self
            .compiler
            .compile(&handle.source, &staged)
            .map_err(|err| BuildError::CompilerSpawn {
                compiler: self.compiler.identity(),
                err,
            })?;

        match outcome {
            CompileOutcome::Success => {}
            CompileOutcome::Failure { diagnostics } => {
                return Err(BuildError::CompileFailed {
                    source_path: handle.source.clone(),
                    diagnostics,
                });
            }
        }

        if !staged.is_file() {
            return Err(BuildError::MissingArtifact {
                source_path: handle.source.clone(),
            });
        }

        std::fs::rename(&staged, &handle.path).map_err(|err| BuildError::Publish {
            artifact: handle.path.clone(),
            err,
        })?;
        debug!("published artifact {}", handle.path);
        Ok(())
    }
}
