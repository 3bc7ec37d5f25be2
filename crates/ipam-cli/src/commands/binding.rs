//! Address binding commands

use anyhow::Result;
use labipam_api::AppContext;
use labipam_core::{BindingOutcome, BindingRequest, DeviceOnlyBinding};
use labipam_types::{AddressStatus, DeviceId, RecordId, SiteId, SubnetId};
use std::fmt::Write;
use std::sync::Arc;

use super::emit;

/// Binding command implementation
pub struct BindingCommand {
    context: Arc<AppContext>,
    json: bool,
}

/// Options of `assign`
#[derive(Debug, Clone, Default)]
pub struct AssignOptions {
    pub device: Option<DeviceId>,
    pub status: Option<AddressStatus>,
    pub dns_name: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<String>,
}

impl BindingCommand {
    /// Create new binding command
    pub fn new(context: Arc<AppContext>, json: bool) -> Self {
        Self { context, json }
    }

    pub async fn assign(
        &self,
        subnet: SubnetId,
        address: &str,
        options: AssignOptions,
    ) -> Result<()> {
        let request = BindingRequest {
            address: address.to_string(),
            subnet_id: subnet,
            device_id: options.device,
            status: options.status,
            dns_name: options.dns_name,
            description: options.description,
            assigned_to: options.assigned_to,
        };
        let outcome = self.context.allocation.assign(&request).await?;
        emit(self.json, &outcome, render_outcome)
    }

    pub async fn release(&self, record: RecordId) -> Result<()> {
        let released = self.context.allocation.release(record).await?;
        emit(self.json, &released, |record| {
            format!("Released {} (record {})\n", record.address, record.id)
        })
    }

    pub async fn unbind(&self, device: DeviceId) -> Result<()> {
        let device = self.context.allocation.unbind(device).await?;
        emit(self.json, &device, |device| {
            format!("Cleared address of device {} '{}'\n", device.id, device.name)
        })
    }

    pub async fn promote(&self, device: DeviceId) -> Result<()> {
        let record = self.context.allocation.promote(device).await?;
        emit(self.json, &record, |record| {
            format!(
                "Created record {} for {} in subnet {}\n",
                record.id, record.address, record.subnet_id
            )
        })
    }

    pub async fn device_only(&self, site: SiteId) -> Result<()> {
        let bindings = self.context.allocation.device_only_bindings(site).await?;
        emit(self.json, &bindings, |bindings| render_device_only(bindings))
    }
}

pub fn render_outcome(outcome: &BindingOutcome) -> String {
    let record = &outcome.record;
    let mut out = format!(
        "Bound {}/{} as record {}",
        record.address, record.mask, record.id
    );
    if let Some(device) = &outcome.device {
        let _ = write!(out, " to device {} '{}'", device.id, device.name);
    }
    out.push('\n');
    if let Some(vacated) = outcome.vacated_device {
        let _ = writeln!(out, "  Cleared address of previous holder {vacated}");
    }
    for removed in &outcome.removed_records {
        let _ = writeln!(out, "  Removed orphaned record {removed}");
    }
    out
}

pub fn render_device_only(bindings: &[DeviceOnlyBinding]) -> String {
    if bindings.is_empty() {
        return "Every device address has a record\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:<6} {:<20} {:<16} {}", "ID", "Device", "Address", "Subnet");
    for binding in bindings {
        let _ = writeln!(
            out,
            "{:<6} {:<20} {:<16} {}",
            binding.device,
            binding.name,
            binding.address.to_string(),
            binding
                .subnet
                .map(|subnet| subnet.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    out
}
