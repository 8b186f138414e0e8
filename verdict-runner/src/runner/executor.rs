// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::ProcessRunner;
use crate::{
    build_cache::ExecutableHandle,
    errors::ExecutionSetupError,
    fixture::TestFixture,
    outcome::ExecutionOutcome,
};
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Runs one executable against one fixture with a hard timeout.
///
/// The only errors returned are those unrelated to the program under test, such as an unreadable
/// input. Everything the program does is reported through the returned [`ExecutionOutcome`].
#[derive(Debug)]
pub struct Executor<R> {
    runner: R,
}

impl<R: ProcessRunner> Executor<R> {
    /// Creates a new executor on top of the given process runner.
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Feeds the fixture's input to the executable and captures the outcome.
    ///
    /// A run that exceeds `timeout` is reported with a duration of exactly `timeout`.
    pub async fn run(
        &self,
        handle: &ExecutableHandle,
        fixture: &TestFixture,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, ExecutionSetupError> {
        let input = fixture
            .input()
            .read_async()
            .await
            .map_err(|err| ExecutionSetupError::ReadInput {
                fixture: fixture.id().clone(),
                path: fixture.input().describe(),
                err: Arc::new(err),
            })?;

        debug!(fixture = %fixture.id(), "running `{}`", handle.path());
        let output = self
            .runner
            .run_with_timeout(handle.path(), Bytes::from(input), timeout)
            .await
            .map_err(|err| ExecutionSetupError::Child {
                fixture: fixture.id().clone(),
                executable: handle.path().to_owned(),
                err,
            })?;

        let elapsed = if output.exit.is_timeout() {
            timeout
        } else {
            output.elapsed
        };

        Ok(ExecutionOutcome {
            exit: output.exit,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed,
        })
    }
}
