use std::net::Ipv4Addr;

use thiserror::Error;

pub type IpamResult<T> = Result<T, IpamError>;

/// Follow-up steps of a binding that run after the address record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpStep {
    /// Clearing the address field of the device that previously held the address.
    VacatePreviousHolder { device_id: u64 },
    /// Deleting the record left behind at the target device's old address.
    RemoveOrphanedRecord { address: Ipv4Addr },
    /// Pointing the target device at the newly bound address.
    PointDeviceAtAddress { device_id: u64 },
}

impl std::fmt::Display for FollowUpStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FollowUpStep::VacatePreviousHolder { device_id } => {
                write!(f, "vacate address of device {device_id}")
            }
            FollowUpStep::RemoveOrphanedRecord { address } => {
                write!(f, "remove orphaned record for {address}")
            }
            FollowUpStep::PointDeviceAtAddress { device_id } => {
                write!(f, "point device {device_id} at new address")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    PartialFailure,
    Store,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PartialFailure => "partial-failure",
            ErrorKind::Store => "store",
        }
    }
}

#[derive(Debug, Error)]
pub enum IpamError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} conflict: {message}")]
    Conflict { entity: &'static str, message: String },

    #[error("address {address} bound as record {record_id}, but failed to {step}: {source}")]
    PartialFailure {
        step: FollowUpStep,
        address: Ipv4Addr,
        record_id: u64,
        #[source]
        source: Box<IpamError>,
    },

    #[error("store error: {message}")]
    Store { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IpamError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        IpamError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        IpamError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(entity: &'static str, message: impl Into<String>) -> Self {
        IpamError::Conflict {
            entity,
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        IpamError::Store {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IpamError::Validation { .. } => ErrorKind::Validation,
            IpamError::NotFound { .. } => ErrorKind::NotFound,
            IpamError::Conflict { .. } => ErrorKind::Conflict,
            IpamError::PartialFailure { .. } => ErrorKind::PartialFailure,
            IpamError::Store { .. } | IpamError::Io(_) | IpamError::Serialization(_) => {
                ErrorKind::Store
            }
        }
    }

    /// The follow-up step that failed, for partial failures.
    pub fn failed_step(&self) -> Option<FollowUpStep> {
        match self {
            IpamError::PartialFailure { step, .. } => Some(*step),
            _ => None,
        }
    }
}
