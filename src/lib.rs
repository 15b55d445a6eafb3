//! scorelink: runtime-provisioned binding to a native image scoring engine.
//!
//! The native engine ships inside this crate as architecture-tagged
//! payloads (embedded by `build.rs`). On first use the payload matching the
//! running process is extracted to the temp directory and loaded, once per
//! process. Rust callers use [`ScoreEngine`]; C callers use the `sl_*`
//! exports from the `cdylib`:
//!
//! - Engine lifecycle (new, score, dispose)
//! - Provisioning control (configure, provision, state, platform tag)
//! - Error handling (thread-local last-error pattern)
//!
//! ```no_run
//! use scorelink::ScoreEngine;
//!
//! let mut engine = ScoreEngine::new("model.yml", "range.yml")?;
//! let score = engine.compute_score("photo.jpg")?;
//! engine.dispose();
//! # Ok::<(), scorelink::ScoreError>(())
//! ```

pub mod arch;
pub mod binding;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod provision;
pub mod registry;

#[cfg(test)]
mod testing;

pub use arch::PlatformTag;
pub use binding::{LibraryLoader, NativeBinding, NativeHandle, NATIVE_FAILURE_SENTINEL};
pub use config::ProvisionConfig;
pub use engine::ScoreEngine;
pub use error::{ErrorKind, Result, ScoreError};
pub use provision::{Provisioner, ProvisioningState};
