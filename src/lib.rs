//! A client library driving a terminal multiplexer over its control-mode
//! protocol: line-oriented notification decoding, layout-tree parsing and
//! diffing, and a threaded session driver that exposes a typed command
//! surface to a host application.

pub mod cc;
pub mod collab;
pub mod config;
pub mod driver;
pub mod error;
pub mod ids;
pub mod layout;
pub mod logging;
pub mod notification;

pub use driver::SessionDriver;
pub use error::LayoutParseError;
pub use ids::{PaneId, WindowId};
pub use notification::{CommandResult, Notification};
