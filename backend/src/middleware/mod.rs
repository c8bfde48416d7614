//! Request middleware.
//!
//! Purpose: attach a trace identifier to every request so handler logs,
//! render jobs and error payloads can be correlated.

pub mod trace;

pub use trace::Trace;
