// tests/pipeline_ordering.rs
// Validate the double-buffer rotation: results come out in dispatch order,
// and no slot is refilled before the wait for its previous dispatch returned.

use seqsift::accel::{AcceleratorBackend, InFlightBatch};
use seqsift::batch::SlotBuffers;
use seqsift::chunk::{ChunkWidth, ResultLayout};
use seqsift::errors::Result;
use seqsift::index::IbfIndex;
use seqsift::pipeline::Pipeline;
use seqsift::profile::NoopInstrument;
use seqsift::thresholds::{MinimizerBounds, ThresholdTable};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Cursor;
use std::rc::Rc;

#[derive(Debug, PartialEq, Eq, Clone)]
enum Event {
    Dispatch(usize),
    Wait(usize),
}

/// Stub binding that records the order of dispatch and wait calls and marks
/// bin 0 for every query.
struct OrderRecordingBackend {
    events: Rc<RefCell<Vec<Event>>>,
    in_flight: VecDeque<usize>,
    next_batch: usize,
}

impl OrderRecordingBackend {
    fn new(events: Rc<RefCell<Vec<Event>>>) -> Self {
        Self {
            events,
            in_flight: VecDeque::new(),
            next_batch: 0,
        }
    }
}

impl AcceleratorBackend for OrderRecordingBackend {
    fn transfer(
        &mut self,
        _index: &IbfIndex,
        _thresholds: &ThresholdTable,
        _bounds: MinimizerBounds,
        _layout: ResultLayout,
    ) -> Result<()> {
        Ok(())
    }

    fn dispatch(&mut self, mut slot: SlotBuffers) -> Result<InFlightBatch> {
        self.events.borrow_mut().push(Event::Dispatch(self.next_batch));
        self.in_flight.push_back(self.next_batch);
        self.next_batch += 1;

        slot.results.clear();
        slot.results.resize(slot.query_count(), 1);
        Ok(InFlightBatch::completed(slot))
    }

    fn wait(&mut self, batch: InFlightBatch) -> Result<SlotBuffers> {
        let batch_id = self.in_flight.pop_front().expect("wait without a dispatch");
        self.events.borrow_mut().push(Event::Wait(batch_id));
        Ok(batch.into_slot())
    }

    fn release(&mut self) {}
}

fn four_line_records(count: usize) -> String {
    let mut text = String::new();
    for i in 0..count {
        text.push_str(&format!("@read{i}\nACGTACGT\n+\nIIIIIIII\n"));
    }
    text
}

#[test]
fn test_no_slot_refilled_before_its_wait_returned() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut backend = OrderRecordingBackend::new(events.clone());
    let layout = ResultLayout::new(64, ChunkWidth::W64).unwrap();
    let instrument = NoopInstrument;

    // One 8-byte query per batch: 7 records make 7 batches.
    let mut pipeline = Pipeline::new(&mut backend, layout, 8, &instrument);
    let mut out = Vec::new();
    let stats = pipeline
        .run(Cursor::new(four_line_records(7)), &mut out)
        .unwrap();
    assert_eq!(stats.batches, 7);

    let events = events.borrow();
    let position = |event: &Event| {
        events
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing event {event:?}"))
    };

    // FIFO: every batch is waited on in dispatch order.
    for batch in 0..7 {
        assert!(position(&Event::Dispatch(batch)) < position(&Event::Wait(batch)));
        if batch > 0 {
            assert!(position(&Event::Wait(batch - 1)) < position(&Event::Wait(batch)));
        }
    }

    // Batch N+2 reuses batch N's slot, so its dispatch must come after
    // batch N's wait returned.
    for batch in 0..5 {
        assert!(
            position(&Event::Wait(batch)) < position(&Event::Dispatch(batch + 2)),
            "slot of batch {batch} was refilled before its wait returned"
        );
    }

    // One batch of lookahead: batch N+1 is dispatched before batch N is
    // waited on once the pipeline is primed.
    for batch in 0..6 {
        assert!(position(&Event::Dispatch(batch + 1)) < position(&Event::Wait(batch)));
    }
}

#[test]
fn test_results_emitted_in_dispatch_order() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut backend = OrderRecordingBackend::new(events);
    let layout = ResultLayout::new(64, ChunkWidth::W64).unwrap();
    let instrument = NoopInstrument;

    let mut pipeline = Pipeline::new(&mut backend, layout, 8, &instrument);
    let mut out = Vec::new();
    pipeline
        .run(Cursor::new(four_line_records(5)), &mut out)
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    let expected: String = (0..5).map(|i| format!("read{i}\t0\n")).collect();
    assert_eq!(text, expected);
}
