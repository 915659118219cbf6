use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{command}: output format {format:?} is not supported")]
    UnsupportedFormat {
        command: &'static str,
        format: crate::output::OutputFormat,
    },
    #[error(transparent)]
    Core(#[from] tsdemux_core::Error),
    #[error(transparent)]
    Tree(#[from] tsdemux_core::TreeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
