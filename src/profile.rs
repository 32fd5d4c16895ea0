// Pipeline instrumentation.
//
// Timing hooks are an injectable interface rather than a build-time flag, so
// phase timings can be enabled per run. The default implementation is a
// no-op; `LogInstrument` reports through the standard logger.

use std::time::Duration;

/// Pipeline phases that can be timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Deserializing the index archive.
    IndexLoad,
    /// One-time device transfer of index bits and thresholds.
    Transfer,
    /// Host-side batching of one slot.
    HostFill,
    /// Submitting one batch.
    Dispatch,
    /// Blocking on one batch's completion set.
    Wait,
    /// Decoding and writing one batch.
    Decode,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::IndexLoad => "index load",
            Phase::Transfer => "transfer",
            Phase::HostFill => "host fill",
            Phase::Dispatch => "dispatch",
            Phase::Wait => "wait",
            Phase::Decode => "decode",
        }
    }
}

pub trait Instrument {
    fn phase(&self, phase: Phase, elapsed: Duration);
}

/// Default: records nothing.
pub struct NoopInstrument;

impl Instrument for NoopInstrument {
    fn phase(&self, _phase: Phase, _elapsed: Duration) {}
}

/// Reports each phase duration at info level.
pub struct LogInstrument;

impl Instrument for LogInstrument {
    fn phase(&self, phase: Phase, elapsed: Duration) {
        log::info!("{}:\t{:.3} ms", phase.label(), elapsed.as_secs_f64() * 1e3);
    }
}
