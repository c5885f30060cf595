//! Layout grammar and model (§4.C, §4.D).

pub mod grammar;
pub mod model;

pub use model::{LayoutNode, UiNode};
