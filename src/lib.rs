pub mod agent;
pub mod util;

pub use deskwatch_core as model;
pub use deskwatch_storage as storage;
