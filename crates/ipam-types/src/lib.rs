//! labipam shared types
//!
//! Address-space data model shared by the engines, stores and front ends.

pub mod address;
pub mod error;
pub mod record;
pub mod scheme;
pub mod store;
pub mod subnet;

pub use address::{
    cidr, is_reserved_edge, parse_cidr, parse_ipv4, validate_mask, MAX_MASK, MIN_MASK,
};
pub use error::{ErrorKind, FollowUpStep, IpamError, IpamResult};
pub use record::{AddressStatus, Device, DeviceId, IpAddressRecord, RecordId};
pub use scheme::{RangeScheme, SchemeEntry, SchemeId, SubnetPrefill, SubnetTemplate, TemplateId};
pub use store::{StoreBackend, StoreConfig};
pub use subnet::{IpRange, RangeId, SiteId, Subnet, SubnetId, SubnetStatus};
