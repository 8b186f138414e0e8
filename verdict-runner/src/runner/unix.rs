// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::process::ChildPipes;
use libc::{SIGKILL, SIGTERM};
use std::{os::unix::process::CommandExt, time::Duration};
use tokio::process::Child;

/// Pre-execution configuration on Unix.
///
/// This puts the child in a new process group, so that it and anything it spawns can be
/// signalled together.
pub(super) fn set_process_group(cmd: &mut std::process::Command) {
    cmd.process_group(0);
}

/// Sends `SIGKILL` to every process left in the group led by `pid`.
///
/// The group may already be empty, in which case `kill` fails with `ESRCH` and nothing happens.
pub(super) fn kill_process_group(pid: u32) {
    unsafe { libc::kill(-(pid as libc::pid_t), SIGKILL) };
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(super) enum TerminateChildResult {
    /// The child process exited within the grace period.
    Exited,

    /// The child process was killed.
    Killed,
}

pub(super) async fn terminate_child(
    child: &mut Child,
    pipes: &mut ChildPipes,
    grace_period: Duration,
) -> TerminateChildResult {
    let Some(pid) = child.id() else {
        return TerminateChildResult::Exited;
    };
    // Negative PIDs address the whole process group.
    let pgid = -(pid as libc::pid_t);

    if grace_period.is_zero() {
        // SIGKILL guarantees the process group is dead.
        unsafe { libc::kill(pgid, SIGKILL) };
        return TerminateChildResult::Killed;
    }

    unsafe { libc::kill(pgid, SIGTERM) };

    let mut sleep = std::pin::pin!(tokio::time::sleep(grace_period));
    let result = loop {
        tokio::select! {
            // Keep reading so a child blocked on a full pipe can react to SIGTERM.
            () = pipes.fill_buf(), if !pipes.is_done() => {}
            _ = child.wait() => break TerminateChildResult::Exited,
            _ = &mut sleep => {
                // The process didn't exit -- need to do a hard shutdown.
                unsafe { libc::kill(pgid, SIGKILL) };
                break TerminateChildResult::Killed;
            }
        }
    };

    if result == TerminateChildResult::Exited {
        // The leader is gone, but other members of the group may still be running.
        unsafe { libc::kill(pgid, SIGKILL) };
    }
    result
}
