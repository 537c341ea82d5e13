// Re-export from common crate to keep crate::util::* paths stable
pub use deskwatch_common::cancel;
pub use deskwatch_common::config;
pub use deskwatch_common::paths;
pub use deskwatch_common::threading;
pub mod logging;
