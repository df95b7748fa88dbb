pub mod indicator;
pub mod market_data;
pub mod pattern;
pub mod regime;
pub mod risk;
pub mod signal;
pub mod timeframe;
pub mod weights;

pub use indicator::*;
pub use market_data::*;
pub use pattern::*;
pub use regime::*;
pub use risk::*;
pub use signal::*;
pub use timeframe::Timeframe;
pub use weights::*;
