pub mod fret_trace;
pub mod tools;
pub mod trace_loader;
pub mod trace_set;
pub mod trace_simulator;
