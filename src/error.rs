use thiserror::Error;

/// Failure codes returned by the public interface.
///
/// Internal-invariant violations (a lifecycle CAS observing an impossible
/// state) are deliberately not a variant here: they are not recoverable, and
/// giving them a `Result` arm would invite a caller to treat them as if they
/// were. Those paths log at `error!` and then panic.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Misuse: a bad configuration, an operation attempted in a non-ALIVE
    /// state, a re-entrant call from within a worker, or a passport that is
    /// not bound to the pool it was used with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A blocking producer or consumer observed the pool shutting down.
    #[error("operation cancelled by shutdown")]
    Cancelled,

    /// Allocation failed while constructing the pool or queuing a task.
    #[error("out of memory")]
    OutOfMemory,
}

pub type Result<T> = std::result::Result<T, PoolError>;
