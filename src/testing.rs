//! Test doubles: a counting fake native binding, a counting loader and
//! on-disk fixtures.

use std::collections::{HashMap, HashSet};
use std::ffi::{c_void, CStr};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::arch::PlatformTag;
use crate::binding::{LibraryLoader, NativeBinding, NativeHandle, NATIVE_FAILURE_SENTINEL};
use crate::config::{ProvisionConfig, SymbolNames};
use crate::error::{Result, ScoreError};
use crate::provision::Provisioner;

/// Stand-in for the native collaborator. Handles are fake non-null
/// pointers that are never dereferenced.
#[derive(Default)]
pub struct FakeBinding {
    next: AtomicUsize,
    creates: AtomicUsize,
    computes: AtomicUsize,
    releases: AtomicUsize,
    live: Mutex<HashSet<usize>>,
    fail_create: bool,
    fail_next_compute: AtomicBool,
}

impl FakeBinding {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn computes(&self) -> usize {
        self.computes.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn is_live(&self, handle: NativeHandle) -> bool {
        self.live.lock().unwrap().contains(&(handle.as_raw() as usize))
    }

    pub fn fail_next_compute(&self) {
        self.fail_next_compute.store(true, Ordering::SeqCst);
    }
}

impl NativeBinding for FakeBinding {
    fn create(&self, model_path: &CStr, range_path: &CStr) -> NativeHandle {
        self.creates.fetch_add(1, Ordering::SeqCst);
        assert!(!model_path.to_bytes().is_empty());
        assert!(!range_path.to_bytes().is_empty());
        if self.fail_create {
            return NativeHandle::NULL;
        }
        let id = (self.next.fetch_add(1, Ordering::SeqCst) + 1) * 16;
        self.live.lock().unwrap().insert(id);
        NativeHandle::from_raw(id as *mut c_void)
    }

    unsafe fn compute(&self, handle: NativeHandle, image_path: &CStr) -> f64 {
        self.computes.fetch_add(1, Ordering::SeqCst);
        assert!(self.is_live(handle), "compute on dead handle {handle:?}");
        if self.fail_next_compute.swap(false, Ordering::SeqCst) {
            return NATIVE_FAILURE_SENTINEL;
        }
        let path = Path::new(image_path.to_str().unwrap());
        fs::metadata(path).map(|m| m.len() as f64 / 4.0).unwrap_or(NATIVE_FAILURE_SENTINEL)
    }

    unsafe fn release(&self, handle: NativeHandle) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        let removed = self.live.lock().unwrap().remove(&(handle.as_raw() as usize));
        assert!(removed, "double release of {handle:?}");
    }
}

/// Loader that counts calls and hands out a shared [`FakeBinding`].
#[derive(Clone, Default)]
pub struct CountingLoader {
    loads: Arc<AtomicUsize>,
    binding: Arc<FakeBinding>,
    fail: bool,
}

impl CountingLoader {
    pub fn with_binding(binding: Arc<FakeBinding>) -> Self {
        Self {
            binding,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl LibraryLoader for CountingLoader {
    fn load(&self, path: &Path, _symbols: &SymbolNames) -> Result<Arc<dyn NativeBinding>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        assert!(path.is_file(), "loader called before extraction");
        if self.fail {
            return Err(ScoreError::NativeLoadFailure {
                path: path.display().to_string(),
                reason: "undefined symbol: score_create".into(),
            });
        }
        Ok(self.binding.clone())
    }
}

/// The same payload under every platform tag's identifier.
pub fn payloads_for(config: &ProvisionConfig, bytes: &[u8]) -> HashMap<String, Vec<u8>> {
    PlatformTag::ALL
        .iter()
        .map(|&tag| (config.payload_id(tag), bytes.to_vec()))
        .collect()
}

/// Scratch directory with a model, a range file and an image.
pub struct Fixture {
    pub model: PathBuf,
    pub range: PathBuf,
    pub image: PathBuf,
    pub binding: Arc<FakeBinding>,
    pub loader: CountingLoader,
    dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_binding(FakeBinding::default())
    }

    pub fn failing_create() -> Self {
        Self::with_binding(FakeBinding {
            fail_create: true,
            ..FakeBinding::default()
        })
    }

    fn with_binding(binding: FakeBinding) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.yml");
        let range = dir.path().join("range.yml");
        let image = dir.path().join("image.png");
        fs::write(&model, "%YAML:1.0\nmodel: {}\n").unwrap();
        fs::write(&range, "%YAML:1.0\nrange: {}\n").unwrap();
        fs::write(&image, [0x89u8, b'P', b'N', b'G', 0, 1, 2, 3]).unwrap();
        let binding = Arc::new(binding);
        Self {
            model,
            range,
            image,
            loader: CountingLoader::with_binding(binding.clone()),
            binding,
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Provisioner extracting into the fixture directory and loading the fake.
pub fn fake_provisioner(fx: &Fixture) -> Provisioner {
    let config = ProvisionConfig {
        temp_root: Some(fx.dir().join("tmp")),
        ..ProvisionConfig::default()
    };
    let payloads = payloads_for(&config, b"fake native library");
    Provisioner::new(config, payloads, fx.loader.clone()).with_arch("x86_64")
}
