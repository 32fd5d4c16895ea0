// Double-buffered offload pipeline.
//
// The central orchestrator: two buffer slots alternate through the cycle
// fill -> dispatch -> wait -> decode, 180 degrees out of phase, so the host
// fills one slot while the accelerator works on the other. A slot is never
// refilled before the completion of its previous dispatch has been observed;
// the slot buffers move into the in-flight handle at dispatch and only come
// back from wait, so the rotation enforces this structurally rather than by
// locking. Results are emitted in dispatch order (FIFO) with exactly one
// batch of lookahead.

use crate::accel::{AcceleratorBackend, InFlightBatch};
use crate::batch::{FillOutcome, QueryBatcher, SlotBuffers};
use crate::chunk::ResultLayout;
use crate::decode::decode_slot;
use crate::errors::Result;
use crate::profile::{Instrument, Phase};
use std::io::{BufRead, Write};
use std::mem;
use std::time::Instant;

enum SlotState {
    /// Owned by the host, available for filling.
    Idle(SlotBuffers),
    /// Dispatched; owned by the in-flight handle until waited on.
    InFlight(InFlightBatch),
    /// Transient placeholder while a slot changes hands.
    Vacant,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub batches: u64,
    pub queries: u64,
}

pub struct Pipeline<'a> {
    backend: &'a mut dyn AcceleratorBackend,
    layout: ResultLayout,
    budget: usize,
    instrument: &'a dyn Instrument,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        backend: &'a mut dyn AcceleratorBackend,
        layout: ResultLayout,
        budget: usize,
        instrument: &'a dyn Instrument,
    ) -> Self {
        Self {
            backend,
            layout,
            budget,
            instrument,
        }
    }

    /// Drive the full fill/dispatch/wait/decode cycle over the query stream.
    ///
    /// The backend's device-resident allocations are released unconditionally
    /// on exit, on the error path included.
    pub fn run(&mut self, reader: impl BufRead, writer: &mut impl Write) -> Result<RunStats> {
        let result = self.run_inner(reader, writer);
        self.backend.release();
        result
    }

    fn run_inner(&mut self, reader: impl BufRead, writer: &mut impl Write) -> Result<RunStats> {
        let mut batcher = QueryBatcher::new(reader, self.budget);
        let mut slots = [
            SlotState::Idle(SlotBuffers::with_budget(self.budget)),
            SlotState::Idle(SlotBuffers::with_budget(self.budget)),
        ];
        let mut stats = RunStats::default();
        let mut decode_buf = String::new();
        // Number of dispatches so far; slot (n % 2) carries batch n.
        let mut compute_iteration = 0usize;

        loop {
            let current = compute_iteration % 2;

            // Once a second dispatch has occurred, the slot we are about to
            // fill still carries the batch from two dispatches prior: observe
            // its completion and decode it before reuse.
            if compute_iteration >= 2 {
                self.retire(&mut slots[current], &mut decode_buf, writer)?;
            }

            let mut slot = match mem::replace(&mut slots[current], SlotState::Vacant) {
                SlotState::Idle(slot) => slot,
                _ => unreachable!("slot {current} must be idle before filling"),
            };

            let host_start = Instant::now();
            let outcome = batcher.fill(&mut slot)?;
            self.instrument.phase(Phase::HostFill, host_start.elapsed());

            if slot.is_empty() {
                // Stream exhausted with nothing left over.
                slots[current] = SlotState::Idle(slot);
                break;
            }

            stats.queries += slot.query_count() as u64;
            stats.batches += 1;
            log::debug!(
                "Dispatching batch {compute_iteration}: {} queries, {} bytes",
                slot.query_count(),
                slot.queries.len()
            );

            let dispatch_start = Instant::now();
            let batch = self.backend.dispatch(slot)?;
            self.instrument.phase(Phase::Dispatch, dispatch_start.elapsed());

            slots[current] = SlotState::InFlight(batch);
            compute_iteration += 1;

            if outcome == FillOutcome::Exhausted {
                break;
            }
        }

        // Drain the remaining in-flight dispatches (at most 2), oldest first.
        for i in (1..=compute_iteration.min(2)).rev() {
            let index = (compute_iteration + i) % 2;
            self.retire(&mut slots[index], &mut decode_buf, writer)?;
        }

        writer.flush()?;
        Ok(stats)
    }

    /// Wait on a slot's in-flight batch, decode it, and return the slot to
    /// the idle state. No-op for a slot that is not in flight.
    fn retire(
        &mut self,
        state: &mut SlotState,
        decode_buf: &mut String,
        writer: &mut impl Write,
    ) -> Result<()> {
        let batch = match mem::replace(state, SlotState::Vacant) {
            SlotState::InFlight(batch) => batch,
            other => {
                *state = other;
                return Ok(());
            }
        };

        log::debug!("Waiting on in-flight batch: {} queries", batch.query_count());
        let wait_start = Instant::now();
        let mut slot = self.backend.wait(batch)?;
        self.instrument.phase(Phase::Wait, wait_start.elapsed());

        let decode_start = Instant::now();
        decode_buf.clear();
        decode_slot(&mut slot, &self.layout, decode_buf);
        writer.write_all(decode_buf.as_bytes())?;
        self.instrument.phase(Phase::Decode, decode_start.elapsed());

        *state = SlotState::Idle(slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::Completion;
    use crate::chunk::ChunkWidth;
    use crate::index::IbfIndex;
    use crate::errors::SearchError;
    use crate::profile::NoopInstrument;
    use crate::thresholds::{MinimizerBounds, ThresholdTable};
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Synchronous stub: marks bin `query_index % 64` for each query and
    /// records the order of dispatch and wait calls.
    struct RecordingBackend {
        pub events: Vec<String>,
        next_batch: usize,
        in_flight: VecDeque<usize>,
    }

    impl RecordingBackend {
        fn new() -> Self {
            Self {
                events: Vec::new(),
                next_batch: 0,
                in_flight: VecDeque::new(),
            }
        }
    }

    impl AcceleratorBackend for RecordingBackend {
        fn transfer(
            &mut self,
            _index: &IbfIndex,
            _thresholds: &ThresholdTable,
            _bounds: MinimizerBounds,
            _layout: ResultLayout,
        ) -> Result<()> {
            self.events.push("transfer".into());
            Ok(())
        }

        fn dispatch(&mut self, mut slot: SlotBuffers) -> Result<InFlightBatch> {
            self.events.push(format!("dispatch {}", self.next_batch));
            self.in_flight.push_back(self.next_batch);
            self.next_batch += 1;
            slot.results.clear();
            slot.results.resize(slot.query_count(), 0);
            for (i, word) in slot.results.iter_mut().enumerate() {
                *word = 1 << (i % 64);
            }
            Ok(InFlightBatch {
                slot,
                completion: Completion::None,
            })
        }

        fn wait(&mut self, batch: InFlightBatch) -> Result<SlotBuffers> {
            // Batches retire in FIFO order, so the waited batch is always the
            // oldest one still in flight.
            let batch_id = self.in_flight.pop_front().expect("wait without dispatch");
            self.events.push(format!("wait {batch_id}"));
            Ok(batch.slot)
        }

        fn release(&mut self) {
            self.events.push("release".into());
        }
    }

    fn records(ids_and_seqs: &[(&str, &str)]) -> String {
        let mut text = String::new();
        for (id, seq) in ids_and_seqs {
            text.push_str(&format!("@{id}\n{seq}\n+\nqual\n"));
        }
        text
    }

    fn layout64() -> ResultLayout {
        ResultLayout::new(64, ChunkWidth::W64).unwrap()
    }

    #[test]
    fn test_output_preserves_input_order() {
        let input = records(&[("r0", "AAAA"), ("r1", "CCCC"), ("r2", "GGGG"), ("r3", "TTTT")]);
        let mut backend = RecordingBackend::new();
        let instrument = NoopInstrument;
        // Budget of 4 forces one query per batch.
        let mut pipeline = Pipeline::new(&mut backend, layout64(), 4, &instrument);

        let mut out = Vec::new();
        let stats = pipeline.run(Cursor::new(input), &mut out).unwrap();

        assert_eq!(stats.batches, 4);
        assert_eq!(stats.queries, 4);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "r0\t0\nr1\t0\nr2\t0\nr3\t0\n");
        assert_eq!(backend.events.last().unwrap(), "release");
    }

    #[test]
    fn test_config_error_before_any_dispatch() {
        let input = records(&[("r0", "AAAAAAAA")]);
        let mut backend = RecordingBackend::new();
        let instrument = NoopInstrument;
        let mut pipeline = Pipeline::new(&mut backend, layout64(), 4, &instrument);

        let mut out = Vec::new();
        let err = pipeline.run(Cursor::new(input), &mut out).unwrap_err();

        assert!(matches!(err, SearchError::Config(_)));
        assert!(!backend.events.iter().any(|e| e.starts_with("dispatch")));
        // Teardown still runs on the error path.
        assert_eq!(backend.events.last().unwrap(), "release");
        assert!(out.is_empty());
    }

    #[test]
    fn test_empty_input_produces_no_batches() {
        let mut backend = RecordingBackend::new();
        let instrument = NoopInstrument;
        let mut pipeline = Pipeline::new(&mut backend, layout64(), 64, &instrument);

        let mut out = Vec::new();
        let stats = pipeline.run(Cursor::new(String::new()), &mut out).unwrap();

        assert_eq!(stats.batches, 0);
        assert_eq!(stats.queries, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_multiple_queries_per_batch() {
        let input = records(&[("a", "AA"), ("b", "CC"), ("c", "GG")]);
        let mut backend = RecordingBackend::new();
        let instrument = NoopInstrument;
        // Budget of 4 packs two 2-byte queries per batch.
        let mut pipeline = Pipeline::new(&mut backend, layout64(), 4, &instrument);

        let mut out = Vec::new();
        let stats = pipeline.run(Cursor::new(input), &mut out).unwrap();

        assert_eq!(stats.batches, 2);
        assert_eq!(stats.queries, 3);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "a\t0\nb\t1\nc\t0\n");
    }
}
