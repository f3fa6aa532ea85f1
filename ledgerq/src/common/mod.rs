//! Common types, constants and small utilities shared across ledgerq.

mod constants;
mod payload;
mod util;

pub use constants::*;
pub use payload::*;
pub use util::*;
