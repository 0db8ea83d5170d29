pub mod gaussian_component;
pub mod gaussian_mixture;
pub mod kmeans;
pub mod occams_razor;
