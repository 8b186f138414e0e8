// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestThreads;
use crate::{
    build_cache::CommandCompiler,
    errors::{ConfigParseError, ProfileNotFound},
    fixture::FixtureNaming,
    runner::RetainOutput,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashMap},
    sync::LazyLock,
    time::Duration,
};
use tracing::warn;

/// Gets the number of available CPUs.
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Overall configuration for verdict.
///
/// Per-run settings live in [profiles](VerdictProfile), obtained through the
/// [`profile`](Self::profile) method.
#[derive(Clone, Debug)]
pub struct VerdictConfig {
    workspace_root: Utf8PathBuf,
    build: BuildConfig,
    fixtures: FixtureNaming,
    report: ReportConfig,
    default_profile: DefaultProfileImpl,
    other_profiles: HashMap<String, CustomProfileImpl>,
}

impl VerdictConfig {
    /// The default location of the config within the workspace root.
    pub const CONFIG_PATH: &'static str = ".config/verdict.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from the given file, or if not specified from `.config/verdict.toml` in
    /// the workspace root.
    ///
    /// If no config file is specified and the workspace doesn't have `.config/verdict.toml`, uses
    /// the default config options.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();
        let (config_file, required) = match config_file {
            Some(file) => (file.to_owned(), true),
            None => (workspace_root.join(Self::CONFIG_PATH), false),
        };

        let builder = Self::make_default_config().add_source(
            File::new(config_file.as_str(), FileFormat::Toml).required(required),
        );
        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|err| ConfigParseError::new(&config_file, err))?;

        if !unknown.is_empty() {
            let unknown_str = unknown.into_iter().collect::<Vec<_>>().join(", ");
            warn!("in config file {config_file}, ignoring unknown configuration keys: {unknown_str}");
        }

        Ok(Self::from_deserialized(workspace_root, deserialized))
    }

    /// Returns the default configuration, without reading any files.
    pub fn default_config(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        let (deserialized, unknown) = Self::build_and_deserialize_config(
            &Self::make_default_config(),
        )
        .expect("default config is always valid");
        debug_assert!(
            unknown.is_empty(),
            "found unknown keys in default config: {unknown:?}"
        );
        Self::from_deserialized(workspace_root.into(), deserialized)
    }

    /// Returns the profile with the given name, or an error if a profile was specified but not
    /// found.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<VerdictProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = match self.other_profiles.get(name) {
            Some(profile) => Some(profile),
            None if name == Self::DEFAULT_PROFILE => None,
            None => {
                return Err(ProfileNotFound::new(
                    name,
                    self.all_profiles().map(str::to_owned),
                ));
            }
        };

        Ok(VerdictProfile {
            name: name.to_owned(),
            default_profile: &self.default_profile,
            custom_profile,
        })
    }

    /// Returns the names of all known profiles.
    pub fn all_profiles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(Self::DEFAULT_PROFILE)
            .chain(self.other_profiles.keys().map(String::as_str))
    }

    /// Returns the workspace root.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Returns the compiler described by the `[build]` section.
    pub fn compiler(&self) -> CommandCompiler {
        CommandCompiler::new(&self.build.compiler, &self.build.flags)
    }

    /// Returns the build cache directory, resolved against the workspace root.
    pub fn cache_dir(&self) -> Utf8PathBuf {
        self.workspace_root.join(&self.build.cache_dir)
    }

    /// Returns the fixture naming conventions.
    pub fn fixture_naming(&self) -> &FixtureNaming {
        &self.fixtures
    }

    /// Returns the directory reports are written to, resolved against the workspace root.
    pub fn report_dir(&self) -> Utf8PathBuf {
        self.workspace_root.join(&self.report.dir)
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(VerdictConfigDeserialize, BTreeSet<String>), config::ConfigError> {
        let config = builder.build_cloned()?;

        let mut ignored = BTreeSet::new();
        let config: VerdictConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                ignored.insert(path.to_string());
            })?;

        Ok((config, ignored))
    }

    fn from_deserialized(workspace_root: Utf8PathBuf, mut de: VerdictConfigDeserialize) -> Self {
        let default_profile = de
            .profiles
            .remove(Self::DEFAULT_PROFILE)
            .map(DefaultProfileImpl::new)
            .expect("default profile is present in the default config");

        Self {
            workspace_root,
            build: de.build,
            fixtures: de.fixtures,
            report: de.report,
            default_profile,
            other_profiles: de.profiles,
        }
    }
}

/// A configuration profile: the settings of a single run.
///
/// Settings missing from a custom profile fall back to the default profile.
#[derive(Clone, Debug)]
pub struct VerdictProfile<'cfg> {
    name: String,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

macro_rules! profile_field {
    ($self:ident.$field:ident) => {
        $self
            .custom_profile
            .and_then(|profile| profile.$field)
            .unwrap_or($self.default_profile.$field)
    };
}

impl VerdictProfile<'_> {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the wall-clock limit for one run of one program.
    pub fn timeout(&self) -> Duration {
        profile_field!(self.timeout)
    }

    /// Returns how long a timed-out program gets between SIGTERM and SIGKILL.
    pub fn grace_period(&self) -> Duration {
        profile_field!(self.grace_period)
    }

    /// Returns the number of fixtures to run concurrently.
    pub fn test_threads(&self) -> TestThreads {
        profile_field!(self.test_threads)
    }

    /// Returns which captured outputs are kept for inspection.
    pub fn retain_output(&self) -> RetainOutput {
        profile_field!(self.retain_output)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct VerdictConfigDeserialize {
    build: BuildConfig,
    fixtures: FixtureNaming,
    report: ReportConfig,
    #[serde(rename = "profile")]
    profiles: HashMap<String, CustomProfileImpl>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct BuildConfig {
    compiler: String,
    flags: Vec<String>,
    cache_dir: Utf8PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ReportConfig {
    dir: Utf8PathBuf,
}

#[derive(Clone, Debug)]
struct DefaultProfileImpl {
    timeout: Duration,
    grace_period: Duration,
    test_threads: TestThreads,
    retain_output: RetainOutput,
}

impl DefaultProfileImpl {
    fn new(p: CustomProfileImpl) -> Self {
        Self {
            timeout: p.timeout.expect("timeout present in default profile"),
            grace_period: p
                .grace_period
                .expect("grace-period present in default profile"),
            test_threads: p
                .test_threads
                .expect("test-threads present in default profile"),
            retain_output: p
                .retain_output
                .expect("retain-output present in default profile"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    grace_period: Option<Duration>,
    #[serde(default)]
    test_threads: Option<TestThreads>,
    #[serde(default)]
    retain_output: Option<RetainOutput>,
}
