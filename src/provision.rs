//! One-time extraction and loading of the native library.
//!
//! A [`Provisioner`] moves through [`ProvisioningState`] exactly once:
//! the first caller of [`Provisioner::ensure_loaded`] resolves the platform
//! tag, writes the matching embedded payload to disk and loads it; every
//! concurrent caller blocks until that finishes and then shares the result.
//! A failure is cached and returned to all later callers; there is no
//! retry within one provisioner.
//!
//! Payloads land at
//! `<temp root>/<app dir>/<first 16 hex digits of BLAKE3(payload)>/<library file>`,
//! so processes embedding different payload versions never write to the
//! same file.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use crate::arch::{self, PlatformTag};
use crate::binding::{DynamicLoader, LibraryLoader, NativeBinding};
use crate::config::ProvisionConfig;
use crate::error::{Result, ScoreError};

mod embedded {
    // Generated by build.rs: `pub static EMBEDDED: &[(&str, &[u8])]`.
    include!(concat!(env!("OUT_DIR"), "/native_payloads.rs"));
}

const DIGEST_DIR_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProvisioningState {
    NotStarted = 0,
    InProgress = 1,
    Done = 2,
    /// Terminal; the failure is cached.
    Failed = 3,
}

impl ProvisioningState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::InProgress,
            2 => Self::Done,
            3 => Self::Failed,
            _ => Self::NotStarted,
        }
    }
}

// ==================== Payload sources ====================

/// Lookup of native payload bytes by identifier.
pub trait PayloadSource: Send + Sync {
    fn payload(&self, id: &str) -> Option<&[u8]>;
}

/// Payloads compiled into this crate by `build.rs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedPayloads;

impl EmbeddedPayloads {
    /// Identifiers of every embedded payload.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> {
        embedded::EMBEDDED.iter().map(|(id, _)| *id)
    }
}

impl PayloadSource for EmbeddedPayloads {
    fn payload(&self, id: &str) -> Option<&[u8]> {
        embedded::EMBEDDED
            .iter()
            .find(|(name, _)| *name == id)
            .map(|(_, bytes)| *bytes)
    }
}

impl PayloadSource for HashMap<String, Vec<u8>> {
    fn payload(&self, id: &str) -> Option<&[u8]> {
        self.get(id).map(Vec::as_slice)
    }
}

// ==================== Provisioner ====================

pub struct Provisioner {
    config: ProvisionConfig,
    arch: String,
    payloads: Box<dyn PayloadSource>,
    loader: Box<dyn LibraryLoader>,
    state: AtomicU8,
    outcome: OnceLock<Result<Loaded>>,
}

struct Loaded {
    binding: Arc<dyn NativeBinding>,
    path: PathBuf,
}

impl Provisioner {
    pub fn new(
        config: ProvisionConfig,
        payloads: impl PayloadSource + 'static,
        loader: impl LibraryLoader + 'static,
    ) -> Self {
        Self {
            config,
            arch: arch::host_arch().to_string(),
            payloads: Box::new(payloads),
            loader: Box::new(loader),
            state: AtomicU8::new(ProvisioningState::NotStarted as u8),
            outcome: OnceLock::new(),
        }
    }

    /// Embedded payloads loaded through the OS loader.
    pub fn embedded(config: ProvisionConfig) -> Self {
        Self::new(config, EmbeddedPayloads, DynamicLoader)
    }

    /// Provision for `arch` instead of the host architecture.
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn state(&self) -> ProvisioningState {
        ProvisioningState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Where the library was extracted, once provisioning succeeded.
    pub fn library_path(&self) -> Option<&Path> {
        match self.outcome.get() {
            Some(Ok(loaded)) => Some(&loaded.path),
            _ => None,
        }
    }

    /// Extract and load the native library if that has not happened yet.
    ///
    /// Blocks on filesystem and loader I/O on the first call only.
    pub fn ensure_loaded(&self) -> Result<Arc<dyn NativeBinding>> {
        let outcome = self.outcome.get_or_init(|| {
            self.set_state(ProvisioningState::InProgress);
            let outcome = self.provision();
            self.set_state(match outcome {
                Ok(_) => ProvisioningState::Done,
                Err(_) => ProvisioningState::Failed,
            });
            outcome
        });
        match outcome {
            Ok(loaded) => Ok(Arc::clone(&loaded.binding)),
            Err(e) => Err(e.clone()),
        }
    }

    fn set_state(&self, state: ProvisioningState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn provision(&self) -> Result<Loaded> {
        let tag = PlatformTag::from_arch(&self.arch)?;
        log::debug!("resolved platform tag {tag} for architecture {}", self.arch);

        let id = self.config.payload_id(tag);
        let bytes = self
            .payloads
            .payload(&id)
            .ok_or_else(|| ScoreError::MissingNativePayload(id.clone()))?;

        let path = self.extract(bytes)?;
        log::debug!("extracted {id} ({} bytes) to {}", bytes.len(), path.display());

        let binding = self.loader.load(&path, &self.config.symbols)?;
        log::info!("loaded native scoring library from {}", path.display());
        Ok(Loaded { binding, path })
    }

    /// Write `bytes` to the content-addressed extraction path.
    ///
    /// The payload goes to a sibling temp file first and is renamed over
    /// the target, so a reader never sees a partial library.
    fn extract(&self, bytes: &[u8]) -> Result<PathBuf> {
        let digest = blake3::hash(bytes);
        let hex = digest.to_hex();
        let dir = self
            .config
            .extraction_root()
            .join(&hex.as_str()[..DIGEST_DIR_LEN]);
        let target = dir.join(self.config.library_file_name());

        fs::create_dir_all(&dir).map_err(|e| extraction_error(&dir, e))?;

        let mut staged =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| extraction_error(&dir, e))?;
        staged.write_all(bytes).map_err(|e| extraction_error(staged.path(), e))?;
        staged.as_file().sync_all().map_err(|e| extraction_error(staged.path(), e))?;

        match staged.persist(&target) {
            Ok(_) => Ok(target),
            // The target can be locked by another process that loaded it
            // (Windows). Identical content is as good as our own copy.
            Err(e) if file_digest(&target).is_some_and(|d| d == digest) => {
                log::debug!(
                    "reusing existing payload at {} ({})",
                    target.display(),
                    e.error
                );
                Ok(target)
            }
            Err(e) => Err(extraction_error(&target, e.error)),
        }
    }
}

fn extraction_error(path: &Path, e: io::Error) -> ScoreError {
    ScoreError::PayloadExtraction {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn file_digest(path: &Path) -> Option<blake3::Hash> {
    let file = fs::File::open(path).ok()?;
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(file).ok()?;
    Some(hasher.finalize())
}

// ==================== Process-wide instance ====================

static GLOBAL: OnceLock<Provisioner> = OnceLock::new();

/// The process-wide provisioner used by `ScoreEngine::new`.
///
/// Uses [`ProvisionConfig::default`] unless [`configure_global`] ran first.
pub fn global() -> &'static Provisioner {
    GLOBAL.get_or_init(|| Provisioner::embedded(ProvisionConfig::default()))
}

/// Phase of the process-wide provisioner.
///
/// Reports `NotStarted` without creating it, so querying the state does not
/// block a later [`configure_global`].
pub fn global_state() -> ProvisioningState {
    state_in(&GLOBAL)
}

/// Install the process-wide provisioner with a custom configuration.
///
/// Fails once the global provisioner exists, whether created here or
/// implicitly by [`global`].
pub fn configure_global(config: ProvisionConfig) -> Result<&'static Provisioner> {
    configure_in(&GLOBAL, config)
}

fn state_in(cell: &OnceLock<Provisioner>) -> ProvisioningState {
    cell.get()
        .map_or(ProvisioningState::NotStarted, Provisioner::state)
}

fn configure_in(cell: &OnceLock<Provisioner>, config: ProvisionConfig) -> Result<&Provisioner> {
    config.validate()?;
    let mut installed = false;
    let provisioner = cell.get_or_init(|| {
        installed = true;
        Provisioner::embedded(config)
    });
    if installed {
        Ok(provisioner)
    } else {
        Err(ScoreError::InvalidConfig(
            "the global provisioner is already initialized".into(),
        ))
    }
}
