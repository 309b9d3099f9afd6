//! A framework that loops transactions until the max retry times is reached, or a stop signal is received, or a value is returned.

mod state;
mod transaction;

pub use state::*;
pub use transaction::*;
