use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SeedError {
    #[error("volume id '{id}' must be ASCII, at most 32 characters")]
    VolumeId { id: String },

    #[error("root directory records take {needed} bytes, more than the {capacity}-byte sector")]
    RootDirectoryFull { needed: usize, capacity: usize },
}
