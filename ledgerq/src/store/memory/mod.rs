mod backend;
mod module;
mod store;

pub use backend::*;
pub use module::*;
pub use store::*;
