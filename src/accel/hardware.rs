// Runtime-loaded hardware backend.
//
// The probe kernel is an externally compiled shared object whose name
// encodes the index geometry and replication factor. It is resolved across
// an ordered list of candidate directories, loaded with `libloading`, and
// bound to a fixed set of C entry points. Resolution failures are fatal
// configuration errors; there is no fallback execution path.

use crate::accel::{AcceleratorBackend, Completion, ExecMode, InFlightBatch};
use crate::batch::SlotBuffers;
use crate::chunk::ResultLayout;
use crate::errors::{Result, SearchError};
use crate::index::IbfIndex;
use crate::thresholds::{MinimizerBounds, ThresholdTable};
use libloading::Library;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr;

/// Required device capability bits reported by `ibf_probe_caps`.
const CAP_DEVICE_ALLOCATIONS: u64 = 1 << 0;
const CAP_HOST_ALLOCATIONS: u64 = 1 << 1;

type CapsFn = unsafe extern "C" fn() -> u64;
type OpenFn = unsafe extern "C" fn(mode: u32) -> *mut c_void;
type TransferFn = unsafe extern "C" fn(queue: *mut c_void, host: *const u64, words: u64) -> *mut c_void;
#[allow(clippy::type_complexity)]
type DispatchFn = unsafe extern "C" fn(
    queue: *mut c_void,
    queries: *const u8,
    sizes: *const u64,
    query_count: u64,
    index_dev: *const c_void,
    bin_size: u64,
    hash_shift: u64,
    minimal_minimizers: u64,
    maximal_minimizers: u64,
    thresholds_dev: *const c_void,
    results: *mut u64,
) -> *mut c_void;
type WaitFn = unsafe extern "C" fn(events: *mut c_void) -> i32;
type FreeFn = unsafe extern "C" fn(queue: *mut c_void, dev: *mut c_void);
type CloseFn = unsafe extern "C" fn(queue: *mut c_void);

/// Identity of one compiled probe artifact.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub window_size: u8,
    pub kmer_size: u8,
    pub technical_bins: u64,
    pub replication: usize,
    pub mode: ExecMode,
}

impl ArtifactSpec {
    /// Artifact file name; the geometry is baked into the compiled kernel,
    /// so every combination is a distinct shared object.
    pub fn file_name(&self) -> String {
        let suffix = match self.mode {
            ExecMode::Hardware => "hw.so",
            ExecMode::Emulated => "emu.so",
        };
        format!(
            "libibf_probe_w{}_k{}_b{}_r{}.{}",
            self.window_size, self.kmer_size, self.technical_bins, self.replication, suffix
        )
    }

    /// Search the ordered candidate directories for the artifact: an
    /// explicitly configured directory first, then `kernels/`, then the
    /// current working directory.
    pub fn resolve(&self, artifact_dir: Option<&Path>) -> Result<PathBuf> {
        let name = self.file_name();
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = artifact_dir {
            candidates.push(dir.join(&name));
        }
        candidates.push(Path::new("kernels").join(&name));
        candidates.push(PathBuf::from(&name));

        for candidate in &candidates {
            if candidate.exists() {
                log::debug!("Resolved probe artifact at {}", candidate.display());
                return Ok(candidate.clone());
            }
        }
        Err(SearchError::MissingArtifact(
            candidates.pop().expect("candidate list is never empty"),
        ))
    }
}

struct EntryPoints {
    transfer: TransferFn,
    dispatch: DispatchFn,
    wait: WaitFn,
    free: FreeFn,
    close: CloseFn,
}

pub struct HardwareBackend {
    // Held for the lifetime of the raw entry points below.
    _library: Library,
    entry: EntryPoints,
    queue: *mut c_void,
    index_dev: *mut c_void,
    thresholds_dev: *mut c_void,
    bin_size: u64,
    hash_shift: u64,
    bounds: MinimizerBounds,
    words_per_query: usize,
}

fn lookup<T: Copy>(library: &Library, name: &str) -> Result<T> {
    unsafe {
        library
            .get::<T>(name.as_bytes())
            .map(|symbol| *symbol)
            .map_err(|e| SearchError::SymbolResolution(format!("{name}: {e}")))
    }
}

impl HardwareBackend {
    /// Resolve, load and open the artifact. Fails fatally when the artifact
    /// or any entry point is missing, or when the device lacks the required
    /// memory-model capabilities.
    pub fn open(spec: &ArtifactSpec, artifact_dir: Option<&Path>) -> Result<Self> {
        let path = spec.resolve(artifact_dir)?;
        let library = unsafe {
            Library::new(&path)
                .map_err(|e| SearchError::SymbolResolution(format!("{}: {e}", path.display())))?
        };

        let caps: CapsFn = lookup(&library, "ibf_probe_caps")?;
        let open: OpenFn = lookup(&library, "ibf_probe_open")?;
        let entry = EntryPoints {
            transfer: lookup(&library, "ibf_probe_transfer")?,
            dispatch: lookup(&library, "ibf_probe_dispatch")?,
            wait: lookup(&library, "ibf_probe_wait")?,
            free: lookup(&library, "ibf_probe_free")?,
            close: lookup(&library, "ibf_probe_close")?,
        };

        let capabilities = unsafe { caps() };
        if capabilities & CAP_DEVICE_ALLOCATIONS == 0 {
            return Err(SearchError::DeviceCapability(
                "device does not support device allocations".into(),
            ));
        }
        if capabilities & CAP_HOST_ALLOCATIONS == 0 {
            return Err(SearchError::DeviceCapability(
                "device does not support host allocations".into(),
            ));
        }

        let mode = match spec.mode {
            ExecMode::Emulated => 0,
            ExecMode::Hardware => 1,
        };
        let queue = unsafe { open(mode) };
        if queue.is_null() {
            return Err(SearchError::DeviceCapability(
                "failed to open a compute queue on the selected device".into(),
            ));
        }

        log::info!("Loaded probe artifact {}", path.display());
        Ok(Self {
            _library: library,
            entry,
            queue,
            index_dev: ptr::null_mut(),
            thresholds_dev: ptr::null_mut(),
            bin_size: 0,
            hash_shift: 0,
            bounds: MinimizerBounds { minimal: 0, maximal: 0 },
            words_per_query: 0,
        })
    }
}

impl AcceleratorBackend for HardwareBackend {
    fn transfer(
        &mut self,
        index: &IbfIndex,
        thresholds: &ThresholdTable,
        bounds: MinimizerBounds,
        layout: ResultLayout,
    ) -> Result<()> {
        self.bin_size = index.bin_size;
        self.hash_shift = index.hash_shift;
        self.bounds = bounds;
        self.words_per_query = layout.words_per_query;

        self.index_dev = unsafe {
            (self.entry.transfer)(self.queue, index.data.as_ptr(), index.data.len() as u64)
        };
        if self.index_dev.is_null() {
            return Err(SearchError::Probe("device transfer of index bits failed".into()));
        }
        self.thresholds_dev = unsafe {
            (self.entry.transfer)(
                self.queue,
                thresholds.values().as_ptr(),
                thresholds.len() as u64,
            )
        };
        if self.thresholds_dev.is_null() {
            return Err(SearchError::Probe(
                "device transfer of threshold table failed".into(),
            ));
        }
        Ok(())
    }

    fn dispatch(&mut self, mut slot: SlotBuffers) -> Result<InFlightBatch> {
        let query_count = slot.query_count();
        slot.results.clear();
        slot.results.resize(query_count * self.words_per_query, 0);

        if query_count == 0 {
            return Ok(InFlightBatch {
                slot,
                completion: Completion::None,
            });
        }

        // The slot moves into the in-flight handle, but the heap allocations
        // behind these pointers stay put until wait returns the buffers.
        let events = unsafe {
            (self.entry.dispatch)(
                self.queue,
                slot.queries.as_ptr(),
                slot.sizes.as_ptr(),
                query_count as u64,
                self.index_dev,
                self.bin_size,
                self.hash_shift,
                self.bounds.minimal,
                self.bounds.maximal,
                self.thresholds_dev,
                slot.results.as_mut_ptr(),
            )
        };
        if events.is_null() {
            return Err(SearchError::Probe("kernel dispatch failed".into()));
        }

        Ok(InFlightBatch {
            slot,
            completion: Completion::Foreign(events),
        })
    }

    fn wait(&mut self, batch: InFlightBatch) -> Result<SlotBuffers> {
        match batch.completion {
            Completion::None => Ok(batch.slot),
            Completion::Foreign(events) => {
                let status = unsafe { (self.entry.wait)(events) };
                if status != 0 {
                    return Err(SearchError::Probe(format!(
                        "kernel completion reported status {status}"
                    )));
                }
                Ok(batch.slot)
            }
            Completion::Workers(_) => Err(SearchError::Probe(
                "worker completion on hardware backend".into(),
            )),
        }
    }

    fn release(&mut self) {
        unsafe {
            if !self.index_dev.is_null() {
                (self.entry.free)(self.queue, self.index_dev);
                self.index_dev = ptr::null_mut();
            }
            if !self.thresholds_dev.is_null() {
                (self.entry.free)(self.queue, self.thresholds_dev);
                self.thresholds_dev = ptr::null_mut();
            }
            if !self.queue.is_null() {
                (self.entry.close)(self.queue);
                self.queue = ptr::null_mut();
            }
        }
    }
}

impl Drop for HardwareBackend {
    fn drop(&mut self) {
        self.release();
    }
}
