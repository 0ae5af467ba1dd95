mod order;
mod timestamp;

pub use order::Order;
pub use timestamp::{Timeframe, Timestamp};
