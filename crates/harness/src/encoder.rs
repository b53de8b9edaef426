//! Response encoding: one result, one JSON line, one write.

use std::io::{self, Write};

use harness_common::ExecutionResult;

/// Write `result` as a single newline-terminated JSON line and flush.
///
/// The line is fully serialized before anything is written, so a failure
/// never leaves a partial object behind.
pub fn emit(mut out: impl Write, result: &ExecutionResult) -> io::Result<()> {
    let mut line = result.encode().map_err(io::Error::other)?;
    line.push('\n');
    out.write_all(line.as_bytes())?;
    out.flush()
}
