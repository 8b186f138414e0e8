// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use std::{os::unix::fs::PermissionsExt, time::Duration};
use verdict_runner::{
    build_cache::{BuildCache, CommandCompiler},
    config::{TestThreads, VerdictConfig},
    fixture::{TestFixture, discover_fixtures},
    runner::{RunMode, RunSessionBuilder, RunSummary, TokioProcessRunner},
};

pub(crate) fn test_init() {
    // Installing twice fails; the first test to get here wins.
    _ = color_eyre::install();
}

/// A scratch workspace with a copying compiler, a build cache and a fixture directory.
pub(crate) struct TestWorkspace {
    dir: Utf8TempDir,
    compile_log: Utf8PathBuf,
}

impl TestWorkspace {
    pub(crate) fn new() -> Result<Self> {
        test_init();
        let dir = Utf8TempDir::new()?;
        let compile_log = dir.path().join("compile.log");

        // Invoked as `<compiler> <source> -o <output>`.
        write_executable(
            &dir.path().join("fake-cc"),
            &format!(
                "#!/bin/sh\n\
                 echo \"$1\" >> '{compile_log}'\n\
                 cp \"$1\" \"$3\" && chmod +x \"$3\"\n"
            ),
        )?;
        Ok(Self { dir, compile_log })
    }

    pub(crate) fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub(crate) fn compiler(&self) -> CommandCompiler {
        CommandCompiler::new(self.root().join("fake-cc").into_string(), Vec::<String>::new())
    }

    pub(crate) fn cache(&self) -> BuildCache {
        BuildCache::new(self.root().join("cache"), Box::new(self.compiler()))
    }

    /// Returns the number of times the compiler ran.
    pub(crate) fn compile_count(&self) -> Result<usize> {
        match std::fs::read_to_string(&self.compile_log) {
            Ok(log) => Ok(log.lines().count()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes a shell program and returns its path.
    pub(crate) fn program(&self, name: &str, body: &str) -> Result<Utf8PathBuf> {
        let path = self.root().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
        Ok(path)
    }

    /// Writes a fixture file under `tests/`.
    pub(crate) fn fixture_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.tests_dir().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub(crate) fn tests_dir(&self) -> Utf8PathBuf {
        self.root().join("tests")
    }

    pub(crate) fn discover(&self) -> Result<Vec<TestFixture>> {
        let config = VerdictConfig::default_config(self.root());
        Ok(discover_fixtures(
            &self.tests_dir(),
            &[self.tests_dir()],
            config.fixture_naming(),
        )?)
    }

    pub(crate) fn run(
        &self,
        fixtures: &[TestFixture],
        mode: &RunMode,
        timeout: Duration,
    ) -> Result<RunSummary> {
        let config = VerdictConfig::default_config(self.root());
        let profile = config.profile("default")?;
        let cache = self.cache();
        let mut builder = RunSessionBuilder::default();
        builder
            .set_timeout(timeout)
            .set_test_threads(TestThreads::Count(4));
        let runner = TokioProcessRunner::new(Duration::from_millis(100));
        let session = builder.build(&profile, &cache, runner)?;
        Ok(session.execute(fixtures, mode)?)
    }
}

pub(crate) fn write_executable(path: &Utf8Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}
