pub mod http;
pub mod signals;

pub use http::{header_map, read_body_with_limit, MAX_BODY_SIZE};
pub use signals::{setup_signal_handlers, SignalEvent};
