//! labipam store backends and settings

pub mod factory;
pub mod http;
pub mod memory;
pub mod settings;

#[cfg(test)]
mod tests;

pub use factory::StoreFactory;
pub use http::HttpStore;
pub use memory::MemoryStore;
pub use settings::{Settings, SettingsError};
