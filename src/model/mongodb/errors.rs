//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps, and sorts write errors into those that
//! definitely did not apply and those whose effect is unknown.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY: i32 = 11000;
pub const MAX_TIME_MS_EXPIRED: i32 = 50;
pub const WRITE_CONCERN_FAILED: i32 = 64;
pub const SHUTDOWN_IN_PROGRESS: i32 = 91;
pub const PRIMARY_STEPPED_DOWN: i32 = 189;
pub const INTERRUPTED_AT_SHUTDOWN: i32 = 11600;
pub const INTERRUPTED_DUE_TO_REPL_STATE_CHANGE: i32 = 11602;

/// Command error codes the server may return after the write was applied.
const AMBIGUOUS_COMMAND_CODES: [i32; 6] = [
    MAX_TIME_MS_EXPIRED,
    WRITE_CONCERN_FAILED,
    SHUTDOWN_IN_PROGRESS,
    PRIMARY_STEPPED_DOWN,
    INTERRUPTED_AT_SHUTDOWN,
    INTERRUPTED_DUE_TO_REPL_STATE_CHANGE,
];

/// Return true if the given error is a duplicate key write error.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(ref e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Return true if a write that failed with this error may nevertheless have
/// been applied by the server.
///
/// Errors raised before anything was sent, or carrying a definite refusal from
/// the server, are unambiguous. A write concern failure means the primary
/// applied the write but could not confirm replication. Everything else
/// (broken connections, garbled responses, unknown kinds) might have happened
/// after the server committed.
pub fn is_ambiguous_write_error(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(_)) => false,
        ErrorKind::Command(ref e) => AMBIGUOUS_COMMAND_CODES.contains(&e.code),
        ErrorKind::ServerSelection { .. }
        | ErrorKind::InvalidArgument { .. }
        | ErrorKind::Authentication { .. }
        | ErrorKind::BsonSerialization(_)
        | ErrorKind::DnsResolve { .. } => false,
        _ => true,
    }
}
