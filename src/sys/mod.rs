pub mod shared_region;
pub mod signal;

pub use shared_region::SharedRegion;
pub use signal::{Signal, SignalError};
