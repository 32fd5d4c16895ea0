// Accelerator binding.
//
// The probe computation is an opaque, externally compiled artifact; this
// module defines the fixed call contract against it and two backends
// implementing that contract:
//
// - `SimulatorBackend`: compiled-in software rendition, used for development
//   and testing. Fans a batch out across worker threads the way a replicated
//   hardware kernel fans out across kernel copies.
// - `HardwareBackend`: resolves the artifact by name at runtime and binds
//   its entry points via dynamic loading.
//
// Either way, dispatch is fire-and-forget and returns an in-flight handle;
// wait is the only blocking operation and blocks on the full set of
// completion signals belonging to the batch.

pub mod hardware;
pub mod reference;
pub mod simulator;

use crate::batch::SlotBuffers;
use crate::chunk::ResultLayout;
use crate::errors::Result;
use crate::index::IbfIndex;
use crate::thresholds::{MinimizerBounds, ThresholdTable};
use crossbeam_channel::Receiver;

/// Whether the probe artifact targets real hardware or the emulation runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Emulated,
    Hardware,
}

/// Result of one kernel worker: the word range it covered and its output.
#[derive(Debug)]
pub struct WorkerResult {
    pub word_offset: usize,
    pub outcome: std::result::Result<Vec<u64>, String>,
}

/// Completion signals of one dispatched batch.
///
/// A batch may fan out internally across replicated kernel instances, each
/// producing its own signal; waiting means waiting on the full set.
#[derive(Debug)]
pub enum Completion {
    /// One receiver per simulator kernel worker.
    Workers(Vec<Receiver<WorkerResult>>),
    /// Foreign event-set handle owned by the loaded artifact.
    Foreign(*mut std::ffi::c_void),
    /// Nothing outstanding (empty batch).
    None,
}

/// Opaque token for a dispatched batch.
///
/// Owns the dispatched slot for the whole flight: the result area cannot be
/// read, and the slot cannot be refilled, until `AcceleratorBackend::wait`
/// gives the buffers back.
#[derive(Debug)]
pub struct InFlightBatch {
    pub(crate) slot: SlotBuffers,
    pub(crate) completion: Completion,
}

impl InFlightBatch {
    /// Handle for a batch whose results are already final at dispatch time,
    /// e.g. a synchronous stub backend.
    pub fn completed(slot: SlotBuffers) -> Self {
        Self {
            slot,
            completion: Completion::None,
        }
    }

    pub fn query_count(&self) -> usize {
        self.slot.query_count()
    }

    /// Give the buffers back once every completion signal has fired.
    pub fn into_slot(self) -> SlotBuffers {
        self.slot
    }
}

/// Fixed call contract of the offload target.
pub trait AcceleratorBackend {
    /// One-time transfer of the index bit array and threshold table into
    /// device-resident memory. Must precede the first dispatch.
    fn transfer(
        &mut self,
        index: &IbfIndex,
        thresholds: &ThresholdTable,
        bounds: MinimizerBounds,
        layout: ResultLayout,
    ) -> Result<()>;

    /// Non-blocking submit of a filled slot. The slot's result area is sized
    /// here; its contents are undefined until `wait` returns.
    fn dispatch(&mut self, slot: SlotBuffers) -> Result<InFlightBatch>;

    /// Block until every completion signal of the batch has fired, then
    /// return the buffers with the result area populated.
    fn wait(&mut self, batch: InFlightBatch) -> Result<SlotBuffers>;

    /// Free all device-resident and host-pinned allocations. Called
    /// unconditionally at pipeline teardown, including on the error path.
    fn release(&mut self);
}
