//! Error kinds per spec.md §7.
//!
//! Fatal protocol violations and transport faults are not meant to survive
//! as `Result` values beyond the call site that detects them — they're
//! reported with `fatal!()`, which aborts the process (see `src/log.rs`)
//! rather than being constructed as `GdbError::Fatal`/`GdbError::Transport`
//! values. Those two variants exist so the enum documents all three kinds
//! of spec.md §7 that are actual errors (the fourth, degraded capability,
//! is a warning, never an error value); only `GdbError::DataPlane` is ever
//! actually returned from a function in this crate.

use std::fmt;

/// A data-plane failure (spec.md §7 kind 4): `m`, `qXfer`, or `vFile`
/// returned `E..`. Carries the errno the stub reported, when it did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DataPlaneError {
    pub errno: i32,
}

impl fmt::Display for DataPlaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote stub returned error {}", self.errno)
    }
}

impl std::error::Error for DataPlaneError {}

pub type DataPlaneResult<T> = Result<T, DataPlaneError>;

/// Mirrors spec.md §7's three error (non-warning) kinds. `Fatal` and
/// `Transport` are detected and handled via `fatal!()` at the point of
/// detection and so never actually reach a caller as a constructed value;
/// they're kept here so the type fully names the error taxonomy.
#[derive(Debug)]
pub enum GdbError {
    /// Kind 1: malformed packet, unknown stop kind, missing capability for
    /// an in-flight operation.
    Fatal(String),
    /// Kind 2: transport read/write error or EOF.
    Transport(String),
    /// Kind 4: `E..` reply on `m`, `qXfer`, `vFile`.
    DataPlane(DataPlaneError),
}

impl fmt::Display for GdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GdbError::Fatal(msg) => write!(f, "fatal protocol violation: {}", msg),
            GdbError::Transport(msg) => write!(f, "transport fault: {}", msg),
            GdbError::DataPlane(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for GdbError {}

impl From<DataPlaneError> for GdbError {
    fn from(e: DataPlaneError) -> GdbError {
        GdbError::DataPlane(e)
    }
}

pub type GdbResult<T> = Result<T, GdbError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn data_plane_error_converts_into_gdb_error() {
        let e: GdbError = DataPlaneError { errno: 2 }.into();
        assert_eq!(e.to_string(), "remote stub returned error 2");
    }
}
