//! Path marshaling and the TLS string buffer for FFI returns.
//!
//! String-returning `sl_*` functions hand out a pointer into a
//! thread-local buffer; callers copy it before the next `sl_*` call.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

// ==================== TLS String Buffer ====================

thread_local! {
    /// Reusable buffer for returning C strings from FFI functions.
    /// Valid until the next `set_return_str` call.
    static RETURN_BUF: RefCell<CString> = RefCell::new(CString::default());
}

/// Store a string in the TLS buffer and return a pointer to it.
///
/// Strings with interior NULs are truncated at the first NUL.
pub fn set_return_str(s: &str) -> *const c_char {
    let bytes = s.as_bytes();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let cstr = CString::new(&bytes[..end]).unwrap_or_default();
    RETURN_BUF.with(|cell| {
        *cell.borrow_mut() = cstr;
        cell.borrow().as_ptr()
    })
}

// ==================== C → Rust ====================

/// Safely convert a `*const c_char` to `&str`.
///
/// # Safety
/// The pointer must be null or valid and null-terminated.
pub unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Result<&'a str, String> {
    if ptr.is_null() {
        return Err("Null string pointer".into());
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|e| format!("Invalid UTF-8: {e}"))
}

/// Read a path argument. Null reads as the empty path.
///
/// # Safety
/// `ptr` must be null or valid and null-terminated.
pub unsafe fn arg_path(ptr: *const c_char) -> PathBuf {
    if ptr.is_null() {
        return PathBuf::new();
    }
    let bytes = unsafe { CStr::from_ptr(ptr) }.to_bytes();
    bytes_to_path(bytes)
}

#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

// ==================== Rust → C ====================

/// Marshal a path as platform-native text for the native collaborator.
///
/// Returns `None` if the path cannot be represented as a C string
/// (interior NUL, or non-Unicode outside Unix).
#[cfg(unix)]
pub fn path_to_cstring(path: &Path) -> Option<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes()).ok()
}

/// Marshal a path as platform-native text for the native collaborator.
#[cfg(not(unix))]
pub fn path_to_cstring(path: &Path) -> Option<CString> {
    CString::new(path.to_str()?).ok()
}
