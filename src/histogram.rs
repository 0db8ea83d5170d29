//! Pooled E/S histogram pipeline.
//!
//! ```text
//! TraceSet::checked_traces
//!        │
//!        ▼
//!  intensity_correction   (per trace, alpha/delta)
//!        │
//!        ▼
//!  aggregator::trim_es    → E_un / S_un
//!        │
//!        ▼
//!  ensemble_correction    → beta / gamma (ALEX only)
//!        │
//!        ▼
//!  intensity_correction   (per trace, alpha/delta/beta/gamma) → E / S
//!        │
//!        ├── density::contour_2d
//!        └── signal_analysis::gaussian_mixture
//! ```

pub mod aggregator;
pub mod density;
pub mod ensemble_correction;
pub mod exporter;
pub mod histogram_window;
pub mod inspector;
pub mod intensity_correction;
pub mod plot;
