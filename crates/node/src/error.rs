//! A bunch of wrap errors.
use chordring_core::error::Error as CoreError;

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors enum mapping global custom errors.
/// The error type can be expressed in decimal, where the high decs represent
/// the error category and the low decs represent the error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
#[repr(u32)]
pub enum Error {
    #[error("Core error: {0}")]
    CoreError(#[from] CoreError) = 100,
    #[error("Node start error: {0}")]
    StartNode(CoreError) = 101,
    #[error("Join ring through {0} failed")]
    JoinFailed(String) = 102,
    #[error("Invalid address: {0}")]
    InvalidAddress(String) = 200,
    #[error("Invalid logging level: {0}")]
    InvalidLoggingLevel(String) = 201,
    #[error("Stress run failed: {0}")]
    StressFailed(String) = 202,
    #[error("Create File Error: {0}")]
    CreateFileError(String) = 300,
    #[error("Open File Error: {0}")]
    OpenFileError(String) = 301,
    #[error("Cannot find home directory")]
    HomeDirError = 302,
    #[error("Cannot find parent directory")]
    ParentDirError = 303,
    #[error("Serde yaml error: {0}")]
    SerdeYamlError(#[from] serde_yaml::Error) = 400,
}

impl Error {
    fn discriminant(&self) -> u32 {
        // SAFETY: `Self` is `repr(u32)`, so its layout is a `repr(C)` union of `repr(C)`
        // structs each starting with the `u32` discriminant.
        // ref: https://doc.rust-lang.org/std/mem/fn.discriminant.html
        unsafe { *<*const _>::from(self).cast::<u32>() }
    }

    /// Numeric code, category in the high decs.
    pub fn code(&self) -> u32 {
        self.discriminant()
    }
}
