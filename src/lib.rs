pub mod accel; // Accelerator binding (simulator + runtime-loaded hardware)
pub mod batch; // Query record reading and slot packing
pub mod chunk; // Result chunk widths and per-query layout
pub mod decode; // Raw hit-bitmap to text decoding
pub mod errors;
pub mod index; // IBF archive loading/saving
pub mod pipeline; // Double-buffered offload pipeline
pub mod profile; // Injectable phase-timing instrumentation
pub mod search; // Run driver wiring the components together
pub mod thresholds; // Precomputed threshold table and minimizer bounds
pub mod utils;
