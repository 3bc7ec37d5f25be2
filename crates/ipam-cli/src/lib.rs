//! labipam CLI
//!
//! Command-line front end for the address manager: subnets and their address
//! grids, ranges, bindings between addresses and devices, range schemes and
//! subnet templates. Every command works against the store named in the
//! settings file, so the CLI and the API server can share one inventory.

pub mod commands;
