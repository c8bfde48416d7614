//! Map renderer adapters.
//!
//! [`CommandMapRenderer`] drives an external program. The deterministic
//! `FixtureMapRenderer` lives beside the port in `domain::ports`.

mod command;

pub use command::CommandMapRenderer;
