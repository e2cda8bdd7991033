//! Transport bindings over the dispatcher.

pub mod http;
pub mod line;

pub use http::{ConnectionTable, HttpState, router, serve};
pub use line::{LineChannel, LineStats, stdio};
