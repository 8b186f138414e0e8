// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;
use verdict_runner::{build_cache::BuildCache, errors::BuildError};

#[test]
fn test_acquire_is_idempotent() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let source = ws.program("prog.sh", "echo hi")?;
    let cache = ws.cache();

    let first = cache.acquire(&source)?;
    let second = cache.acquire(&source)?;
    assert_eq!(first, second);
    assert_eq!(ws.compile_count()?, 1);

    // A new cache over the same directory reuses the artifact.
    let reopened = ws.cache();
    assert_eq!(reopened.lookup(&source)?, Some(first.clone()));
    assert_eq!(reopened.acquire(&source)?, first);
    assert_eq!(ws.compile_count()?, 1);
    Ok(())
}

#[test]
fn test_edit_invalidates() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let source = ws.program("prog.sh", "echo one")?;
    let cache = ws.cache();

    let before = cache.acquire(&source)?;
    ws.program("prog.sh", "echo two")?;
    assert_eq!(cache.lookup(&source)?, None);

    let after = cache.acquire(&source)?;
    assert_ne!(before.fingerprint(), after.fingerprint());
    assert_ne!(before.path(), after.path());
    assert_eq!(std::fs::read_to_string(after.path())?, "#!/bin/sh\necho two\n");
    assert_eq!(ws.compile_count()?, 2);
    Ok(())
}

#[test]
fn test_compile_failure_diagnostics() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let failing_cc = ws.root().join("failing-cc");
    write_executable(&failing_cc, "#!/bin/sh\necho \"$1: error: expected ';'\" >&2\nexit 1\n")?;
    let cache = BuildCache::new(
        ws.root().join("cache"),
        Box::new(verdict_runner::build_cache::CommandCompiler::new(
            failing_cc.into_string(),
            ["-O2"],
        )),
    );
    let source = ws.program("broken.cpp", "int main(")?;

    let err = cache.acquire(&source).unwrap_err();
    assert!(
        matches!(err, BuildError::CompileFailed { .. }),
        "unexpected error: {err:?}"
    );
    let diagnostics = err.diagnostics().expect("compile failures have diagnostics");
    assert!(diagnostics.contains("error: expected ';'"), "{diagnostics}");
    assert_eq!(cache.lookup(&source)?, None);
    Ok(())
}
