//! Signal detection
//! Mission: Turn per-tick prices into classified, append-only detection events

pub mod detector;
pub mod price_buffer;
pub mod storage;

pub use detector::{safe_order_size, SignalDetector};
pub use price_buffer::{PriceBuffer, PRICE_BUFFER_CAPACITY};
pub use storage::DetectionLog;
