pub mod cancel;
pub mod config;
pub mod paths;
pub mod threading;
