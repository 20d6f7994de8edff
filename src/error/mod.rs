// Error types for chord indexing and search
//
// Indexing and query failures are kept apart so callers can tell a skippable
// per-file problem from a fatal run error, and a rejected request from a
// broken index.

mod index;
mod query;

pub use index::{log_index_error, IndexError, IndexErrorCodes};
pub use query::{log_query_error, QueryError, QueryErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so the CLI and the HTTP layer can report
/// failures consistently.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
