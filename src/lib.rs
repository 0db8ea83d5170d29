pub mod config;
pub mod histogram;
pub mod signal_analysis;
pub mod trace_selection;
