pub mod confluence;
pub mod indicators;
pub mod market_data;
pub mod outcomes;
pub mod patterns;
pub mod pipeline;
pub mod regime;
pub mod risk;
pub mod scheduler;
pub mod service;
pub mod weights;
