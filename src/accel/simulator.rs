// Compiled-in simulator backend.
//
// Runs the probe in plain Rust, fanning each batch out across `replication`
// worker threads the way a replicated hardware kernel fans out across kernel
// copies. Each worker covers a contiguous run of queries and produces its own
// completion signal; the dispatching thread never blocks.

use crate::accel::{AcceleratorBackend, Completion, InFlightBatch, WorkerResult};
use crate::batch::SlotBuffers;
use crate::chunk::ResultLayout;
use crate::errors::{Result, SearchError};
use crate::index::IbfIndex;
use crate::thresholds::{MinimizerBounds, ThresholdTable};
use crossbeam_channel::bounded;
use std::sync::Arc;
use std::thread;

/// Device-resident state of the simulator: a private copy of the index bits
/// and threshold table plus the geometry the probe needs. Read-only after
/// transfer.
pub struct DeviceContext {
    pub data: Vec<u64>,
    pub thresholds: Vec<u64>,
    pub words_per_row: usize,
    pub technical_bins: u64,
    pub bin_size: u64,
    pub hash_shift: u64,
    pub window_size: u8,
    pub kmer_size: u8,
    pub bounds: MinimizerBounds,
    pub layout: ResultLayout,
}

/// The probe routine proper. Opaque to the pipeline; the default is the
/// reference kernel, tests inject stubs.
pub trait ProbeKernel: Send + Sync + 'static {
    /// Probe one query and set hit bits in `out`, which holds
    /// `layout.words_per_query` words laid out in bus-width chunks.
    fn probe(&self, query: &[u8], ctx: &DeviceContext, out: &mut [u64]);
}

pub struct SimulatorBackend {
    replication: usize,
    kernel: Arc<dyn ProbeKernel>,
    ctx: Option<Arc<DeviceContext>>,
}

impl SimulatorBackend {
    pub fn new(replication: usize, kernel: Arc<dyn ProbeKernel>) -> Self {
        Self {
            replication: replication.max(1),
            kernel,
            ctx: None,
        }
    }
}

impl AcceleratorBackend for SimulatorBackend {
    fn transfer(
        &mut self,
        index: &IbfIndex,
        thresholds: &ThresholdTable,
        bounds: MinimizerBounds,
        layout: ResultLayout,
    ) -> Result<()> {
        self.ctx = Some(Arc::new(DeviceContext {
            data: index.data.clone(),
            thresholds: thresholds.values().to_vec(),
            words_per_row: index.words_per_row(),
            technical_bins: index.technical_bins,
            bin_size: index.bin_size,
            hash_shift: index.hash_shift,
            window_size: index.window_size,
            kmer_size: index.kmer_size,
            bounds,
            layout,
        }));
        log::debug!(
            "Simulator transfer: {} index words, {} thresholds, replication {}",
            index.data.len(),
            thresholds.len(),
            self.replication
        );
        Ok(())
    }

    fn dispatch(&mut self, mut slot: SlotBuffers) -> Result<InFlightBatch> {
        let ctx = self
            .ctx
            .as_ref()
            .ok_or_else(|| SearchError::Config("dispatch before transfer".into()))?
            .clone();

        let query_count = slot.query_count();
        let words_per_query = ctx.layout.words_per_query;
        slot.results.clear();
        slot.results.resize(query_count * words_per_query, 0);

        if query_count == 0 {
            return Ok(InFlightBatch {
                slot,
                completion: Completion::None,
            });
        }

        let workers = self.replication.min(query_count);
        let base = query_count / workers;
        let extra = query_count % workers;

        let mut receivers = Vec::with_capacity(workers);
        let mut next_query = 0usize;
        let mut byte_offsets = Vec::with_capacity(query_count + 1);
        let mut offset = 0usize;
        byte_offsets.push(0usize);
        for size in &slot.sizes {
            offset += *size as usize;
            byte_offsets.push(offset);
        }

        for worker in 0..workers {
            let count = base + usize::from(worker < extra);
            let first = next_query;
            next_query += count;

            // Device transfer of this worker's share of the packed queries.
            let bytes =
                slot.queries[byte_offsets[first]..byte_offsets[first + count]].to_vec();
            let sizes: Vec<u64> = slot.sizes[first..first + count].to_vec();
            let kernel = self.kernel.clone();
            let ctx = ctx.clone();

            let (tx, rx) = bounded(1);
            receivers.push(rx);

            thread::spawn(move || {
                let mut words = vec![0u64; count * words_per_query];
                let mut offset = 0usize;
                for (i, &size) in sizes.iter().enumerate() {
                    let query = &bytes[offset..offset + size as usize];
                    let out = &mut words[i * words_per_query..(i + 1) * words_per_query];
                    kernel.probe(query, &ctx, out);
                    offset += size as usize;
                }
                // The receiver may already be gone on the pipeline error path.
                let _ = tx.send(WorkerResult {
                    word_offset: first * words_per_query,
                    outcome: Ok(words),
                });
            });
        }

        Ok(InFlightBatch {
            slot,
            completion: Completion::Workers(receivers),
        })
    }

    fn wait(&mut self, batch: InFlightBatch) -> Result<SlotBuffers> {
        let mut slot = batch.slot;
        match batch.completion {
            Completion::None => Ok(slot),
            Completion::Workers(receivers) => {
                for rx in receivers {
                    let result = rx
                        .recv()
                        .map_err(|_| SearchError::Probe("kernel worker disconnected".into()))?;
                    let words = result.outcome.map_err(SearchError::Probe)?;
                    let end = result.word_offset + words.len();
                    slot.results[result.word_offset..end].copy_from_slice(&words);
                }
                Ok(slot)
            }
            Completion::Foreign(_) => {
                Err(SearchError::Probe("foreign completion on simulator backend".into()))
            }
        }
    }

    fn release(&mut self) {
        self.ctx = None;
    }
}
