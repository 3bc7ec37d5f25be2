//! labipam core
//!
//! Address arithmetic, per-address classification, overlap detection and the
//! engines that keep address records and device bindings consistent.

pub mod allocation;
pub mod arithmetic;
pub mod classifier;
pub mod overlap;
pub mod scheme;
pub mod store;
pub mod subnet;
pub mod template;


pub use allocation::{AllocationEngine, BindingOutcome, BindingRequest, DeviceOnlyBinding};
pub use arithmetic::{
    block_size, int_to_ip, ip_to_int, network_range, subnet_block, suggest_gateway, usable_hosts,
    SubnetBlock, DEFAULT_PAGE_SIZE, MAX_BLOCK_WINDOW,
};
pub use classifier::{range_overlaps, Cell, CellClassifier, CellStatus, RangeOverlap, Utilization};
pub use overlap::{blocks_overlap, detect_overlaps, overlaps_with, OverlapWarning};
pub use scheme::RangeSchemeEngine;
pub use store::IpamStore;
pub use subnet::{CellPage, SubnetChange, SubnetService, SubnetSnapshot};
pub use template::{built_in_templates, SubnetTemplateEngine, TemplateEntry, TemplateRef};

pub use labipam_types::*;
