pub mod config;
pub mod server;
pub mod sync;

pub use config::Config;
