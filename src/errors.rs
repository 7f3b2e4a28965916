use thiserror::Error;

/// Failures the snapshot service needs to tell apart.
///
/// Everything else travels as `anyhow::Error` with context attached at the
/// I/O boundary where it happened.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("Command `{program}` exited with {status}: {output}")]
    Command {
        program: String,
        status: std::process::ExitStatus,
        output: String,
    },

    #[error("Object storage client is not initialized")]
    StorageNotInitialized,

    #[error("Failed to delete {failed} of {requested} objects (first: {first})")]
    PartialDelete {
        requested: usize,
        failed: usize,
        first: String,
    },
}
