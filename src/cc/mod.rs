//! The control-mode pipeline: Line Source → Decoder → Dispatcher (§4, §5).

pub mod decoder;
pub mod dispatcher;
pub mod line_source;
pub mod pipeline;

pub use decoder::{DecoderEvent, LineFeed};
pub use dispatcher::{Dispatcher, DriverStatus, Handler};
pub use line_source::{LineEvent, LineSource};
pub use pipeline::{Callback, CommandPipeline};
