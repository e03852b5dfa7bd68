//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps.

use mongodb::error::{BulkWriteFailure, Error as DbError, ErrorKind, WriteFailure};

use crate::error::Error;

const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given error is a duplicate key write error, either from
/// a single write or from any write within a bulk write.
fn is_duplicate_key_error(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(BulkWriteFailure {
            write_errors: Some(ref errors),
            ..
        }) => errors.iter().any(|e| e.code == DUPLICATE_KEY),
        _ => false,
    }
}

/// Report duplicate key errors as [`Error::Duplicate`], naming `what` clashed.
pub(super) fn duplicate_as(what: impl FnOnce() -> String) -> impl FnOnce(DbError) -> Error {
    move |err| {
        if is_duplicate_key_error(&err) {
            Error::Duplicate(what())
        } else {
            Error::Db(err)
        }
    }
}
