//! labipam REST API
//!
//! JSON endpoints over the IPAM engines

pub mod context;
pub mod ipam;


pub use context::AppContext;
pub use ipam::{ApiResponse, ErrorResponse, IpamApi};
