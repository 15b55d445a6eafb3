//! Error taxonomy and the thread-local error slot for the C boundary.
//!
//! Rust callers receive [`ScoreError`] values directly. The `sl_*` C
//! functions instead store the message in thread-local storage and return
//! a sentinel; retrieve it with `sl_last_error()`.
//!
//! **Ownership rules:**
//! - `sl_last_error()` returns a pointer owned by TLS — do NOT free it.

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use thiserror::Error;

/// Every failure this crate can report.
///
/// `Clone` so that a failed provisioning attempt can be cached and handed
/// to every later caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    /// The host architecture has no matching native payload tag.
    #[error("Unsupported process architecture: {0}")]
    UnsupportedArchitecture(String),

    /// No embedded payload carries the expected identifier.
    #[error("Native library payload not found: {0}")]
    MissingNativePayload(String),

    /// Writing the payload to disk failed.
    #[error("Failed to extract native library to {path}: {reason}")]
    PayloadExtraction { path: String, reason: String },

    /// The OS loader rejected the extracted library, or a symbol is missing.
    #[error("Failed to load native library {path}: {reason}")]
    NativeLoadFailure { path: String, reason: String },

    #[error("Invalid provisioning configuration: {0}")]
    InvalidConfig(String),

    #[error("Model file not found: {0}")]
    ModelFileNotFound(String),

    #[error("Range file not found: {0}")]
    RangeFileNotFound(String),

    #[error("Image file not found: {0}")]
    ImageFileNotFound(String),

    /// The native `create` entry point returned a null handle.
    #[error("Native scoring context creation failed")]
    AlgorithmCreationFailure,

    #[error("Score engine has been disposed")]
    ObjectDisposed,
}

/// Coarse grouping of [`ScoreError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Provisioning could not produce a usable native library. Fatal.
    Configuration,
    /// An input path failed validation before any native call.
    FileValidation,
    /// The native collaborator refused to create a context.
    NativeInitialization,
    /// The engine was used after disposal.
    Usage,
}

impl ScoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedArchitecture(_)
            | Self::MissingNativePayload(_)
            | Self::PayloadExtraction { .. }
            | Self::NativeLoadFailure { .. }
            | Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::ModelFileNotFound(_) | Self::RangeFileNotFound(_) | Self::ImageFileNotFound(_) => {
                ErrorKind::FileValidation
            }
            Self::AlgorithmCreationFailure => ErrorKind::NativeInitialization,
            Self::ObjectDisposed => ErrorKind::Usage,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoreError>;

// ==================== C boundary ====================

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Store an error message in thread-local storage.
pub fn set_last_error(msg: impl Into<String>) {
    let msg = msg.into();
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the thread-local error.
pub fn clear_last_error() {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

/// Get a pointer to the last error message, or null if none.
///
/// The returned pointer is valid until the next `sl_*` call on this thread.
/// Do NOT free this pointer.
#[no_mangle]
pub extern "C" fn sl_last_error() -> *const c_char {
    LAST_ERROR.with(|cell| {
        cell.borrow()
            .as_ref()
            .map_or(std::ptr::null(), |s| s.as_ptr())
    })
}

/// Clear the last error message.
#[no_mangle]
pub extern "C" fn sl_last_error_clear() {
    clear_last_error();
}
