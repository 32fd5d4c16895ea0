// Search run driver.
//
// Wires the components together for one run: load the index and threshold
// table, derive the minimizer bounds and result geometry, bind the
// accelerator backend, perform the one-time device transfer, then hand the
// query stream to the double-buffered pipeline.

use crate::accel::hardware::{ArtifactSpec, HardwareBackend};
use crate::accel::reference::ReferenceKernel;
use crate::accel::simulator::SimulatorBackend;
use crate::accel::{AcceleratorBackend, ExecMode};
use crate::chunk::{ChunkWidth, ResultLayout};
use crate::errors::Result;
use crate::index::IbfIndex;
use crate::pipeline::{Pipeline, RunStats};
use crate::profile::{Instrument, LogInstrument, NoopInstrument, Phase};
use crate::thresholds::{MinimizerBounds, ThresholdTable};
use crate::utils::{cputime, open_text_input, open_text_output, realtime};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

const MIB: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    /// Compiled-in software rendition of the probe kernel.
    Simulator,
    /// Runtime-loaded probe artifact.
    Hardware,
}

pub struct SearchConfig {
    pub index_path: PathBuf,
    pub query_path: PathBuf,
    pub output_path: PathBuf,
    pub thresholds_path: PathBuf,
    pub window_size: u8,
    pub kmer_size: u8,
    /// Length shared by all query patterns; drives the minimizer bounds.
    pub pattern_len: u64,
    /// Byte budget of one buffer slot, in MiB.
    pub buffer_mib: usize,
    /// Number of replicated kernel instances the batch fans out across.
    pub replication: usize,
    pub backend: BackendChoice,
    pub mode: ExecMode,
    pub artifact_dir: Option<PathBuf>,
    /// Report per-phase timings through the instrumentation interface.
    pub profile: bool,
}

pub fn run(config: &SearchConfig) -> Result<RunStats> {
    let start_real = realtime();
    let instrument: Box<dyn Instrument> = if config.profile {
        Box::new(LogInstrument)
    } else {
        Box::new(NoopInstrument)
    };

    let load_start = Instant::now();
    let mut archive = BufReader::new(File::open(&config.index_path)?);
    let index = IbfIndex::load(&mut archive, config.window_size, config.kmer_size)?;
    instrument.phase(Phase::IndexLoad, load_start.elapsed());

    let thresholds = ThresholdTable::load(open_text_input(&config.thresholds_path)?)?;
    let bounds =
        MinimizerBounds::derive(config.window_size, config.kmer_size, config.pattern_len)?;
    thresholds.validate(&bounds)?;

    let width = ChunkWidth::for_bins(index.technical_bins)?;
    let layout = ResultLayout::new(index.technical_bins, width)?;
    log::info!(
        "Index: {} bins ({} technical), bin size {} bits; chunk width {} bits, \
         {} chunk(s) per query",
        index.bins,
        index.technical_bins,
        index.bin_size,
        layout.chunk_bits,
        layout.chunks_per_query
    );

    let mut backend: Box<dyn AcceleratorBackend> = match config.backend {
        BackendChoice::Simulator => Box::new(SimulatorBackend::new(
            config.replication,
            Arc::new(ReferenceKernel),
        )),
        BackendChoice::Hardware => {
            let spec = ArtifactSpec {
                window_size: config.window_size,
                kmer_size: config.kmer_size,
                technical_bins: index.technical_bins,
                replication: config.replication,
                mode: config.mode,
            };
            Box::new(HardwareBackend::open(&spec, config.artifact_dir.as_deref())?)
        }
    };

    let transfer_start = Instant::now();
    backend.transfer(&index, &thresholds, bounds, layout)?;
    instrument.phase(Phase::Transfer, transfer_start.elapsed());

    let reader = open_text_input(&config.query_path)?;
    let mut writer = open_text_output(&config.output_path)?;

    let budget = config.buffer_mib * MIB;
    let mut pipeline = Pipeline::new(backend.as_mut(), layout, budget, instrument.as_ref());
    let stats = pipeline.run(reader, &mut writer)?;

    log::info!(
        "Processed {} queries in {} batches; real {:.3} sec, CPU {:.3} sec",
        stats.queries,
        stats.batches,
        realtime() - start_real,
        cputime()
    );
    Ok(stats)
}
