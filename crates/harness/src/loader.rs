//! Request loading: payload file (or stdin) to a validated request.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use harness_common::{InvocationRequest, ProtocolError};

/// Largest payload accepted, in bytes.
pub const MAX_PAYLOAD_BYTES: u64 = 1_000_000;

/// Path that makes the loader read the payload from standard input.
pub const STDIN_PATH: &str = "-";

/// Read and validate the payload at `path`.
pub fn load(path: &Path) -> Result<InvocationRequest, ProtocolError> {
    load_with_limit(path, MAX_PAYLOAD_BYTES)
}

pub fn load_with_limit(path: &Path, limit: u64) -> Result<InvocationRequest, ProtocolError> {
    let read_err = |source| ProtocolError::Read {
        path: path.to_path_buf(),
        source,
    };

    let bytes = if path == Path::new(STDIN_PATH) {
        read_capped(std::io::stdin().lock(), limit).map_err(read_err)?
    } else {
        let file = File::open(path).map_err(read_err)?;
        let size = file.metadata().map_err(read_err)?.len();
        if size > limit {
            return Err(ProtocolError::TooLarge { size, limit });
        }
        read_capped(file, limit).map_err(read_err)?
    };

    let size = bytes.len() as u64;
    if size > limit {
        return Err(ProtocolError::TooLarge { size, limit });
    }
    InvocationRequest::parse(&bytes)
}

/// Read at most `limit + 1` bytes so oversized input is detected without
/// buffering all of it.
fn read_capped(reader: impl Read, limit: u64) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    Ok(bytes)
}
