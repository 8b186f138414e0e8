// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::process::ChildPipes;
use std::time::Duration;
use tokio::process::Child;

// This is a no-op on Windows.
pub(super) fn set_process_group(_cmd: &mut std::process::Command) {}

// Without job objects there is no group to kill; the child itself has already exited.
pub(super) fn kill_process_group(_pid: u32) {}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(super) enum TerminateChildResult {
    /// The child process had already exited.
    Exited,

    /// The child process was killed.
    Killed,
}

// The grace period is ignored: TerminateProcess is called immediately.
pub(super) async fn terminate_child(
    child: &mut Child,
    _pipes: &mut ChildPipes,
    _grace_period: Duration,
) -> TerminateChildResult {
    if child.id().is_none() {
        return TerminateChildResult::Exited;
    }
    // Ignore the error here -- it's likely due to the process exiting.
    let _ = child.start_kill();
    TerminateChildResult::Killed
}
