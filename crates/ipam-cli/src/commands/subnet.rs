//! Subnet, range and device commands

use anyhow::{bail, Context, Result};
use labipam_api::AppContext;
use labipam_core::{
    CellPage, OverlapWarning, RangeOverlap, SubnetChange, TemplateRef, Utilization,
};
use labipam_types::{parse_cidr, parse_ipv4, Device, IpRange, RangeId, SiteId, Subnet, SubnetId};
use std::fmt::Write;
use std::sync::Arc;

use super::{emit, or_dash};

/// Options of `subnet add`
#[derive(Debug, Clone, Default)]
pub struct NewSubnet {
    /// `a.b.c.d/n`; overrides the template's block when both are given
    pub cidr: Option<String>,
    pub template: Option<String>,
    pub gateway: Option<String>,
    pub role: Option<String>,
    pub description: Option<String>,
    pub vlan: Option<u64>,
}

/// Options of `device add`
#[derive(Debug, Clone, Default)]
pub struct NewDevice {
    pub name: String,
    pub address: Option<String>,
    pub hostname: Option<String>,
    pub mac: Option<String>,
}

/// Subnet command implementation
pub struct SubnetCommand {
    context: Arc<AppContext>,
    json: bool,
}

impl SubnetCommand {
    /// Create new subnet command
    pub fn new(context: Arc<AppContext>, json: bool) -> Self {
        Self { context, json }
    }

    pub async fn list(&self, site: SiteId) -> Result<()> {
        let subnets = self.context.subnets.list_subnets(site).await?;
        emit(self.json, &subnets, |subnets| render_subnets(subnets))
    }

    /// Build the draft for `subnet add` without touching the store
    pub async fn draft(&self, site: SiteId, options: &NewSubnet) -> Result<Subnet> {
        let mut draft = match (&options.template, &options.cidr) {
            (Some(template), _) => {
                let reference: TemplateRef = template.parse()?;
                let prefill = self.context.templates.apply_template(&reference).await?;
                let mut draft = Subnet::new(site, prefill.prefix, prefill.mask);
                draft.gateway = prefill.gateway;
                draft.role = prefill.role;
                draft.description = prefill.description;
                draft
            }
            (None, Some(cidr)) => {
                let (prefix, mask) = parse_cidr(cidr)?;
                Subnet::new(site, prefix, mask)
            }
            (None, None) => bail!("either a CIDR or --template is required"),
        };

        if let (Some(_), Some(cidr)) = (&options.template, &options.cidr) {
            let (prefix, mask) = parse_cidr(cidr)?;
            if (draft.prefix, draft.mask) != (prefix, mask) {
                // Template gateway belongs to the template's block
                draft.gateway = None;
            }
            draft.prefix = prefix;
            draft.mask = mask;
        }
        if let Some(gateway) = &options.gateway {
            draft.gateway = Some(parse_ipv4(gateway)?);
        }
        if let Some(role) = &options.role {
            draft.role = role.clone();
        }
        if let Some(description) = &options.description {
            draft.description = description.clone();
        }
        if options.vlan.is_some() {
            draft.vlan_id = options.vlan;
        }
        Ok(draft)
    }

    pub async fn add(&self, site: SiteId, options: &NewSubnet) -> Result<()> {
        let draft = self.draft(site, options).await?;
        let change = self
            .context
            .subnets
            .create_subnet(draft, self.context.smart_gateway)
            .await?;
        emit(self.json, &change, render_change)
    }

    pub async fn delete(&self, id: SubnetId) -> Result<()> {
        self.context
            .subnets
            .delete_subnet(id)
            .await
            .with_context(|| format!("Failed to delete subnet {id}"))?;
        if !self.json {
            println!("Deleted subnet {id}");
        }
        Ok(())
    }

    pub async fn cells(&self, id: SubnetId, page: u32, page_size: Option<u32>) -> Result<()> {
        let page_size = page_size.unwrap_or(self.context.page_size);
        let cells = self.context.subnets.cells(id, page, page_size).await?;
        emit(self.json, &cells, render_cells)
    }

    pub async fn usage(&self, id: SubnetId) -> Result<()> {
        let subnet = self.context.subnets.get_subnet(id).await?;
        let utilization = self.context.subnets.utilization(id).await?;
        emit(self.json, &utilization, |usage| render_utilization(&subnet, usage))
    }

    pub async fn overlaps(&self, site: SiteId) -> Result<()> {
        let warnings = self.context.subnets.overlaps(site).await?;
        emit(self.json, &warnings, |warnings| render_overlaps(warnings))
    }

    pub async fn next_free(&self, id: SubnetId) -> Result<()> {
        let next = self.context.subnets.next_available(id).await?;
        emit(self.json, &next, |next| match next {
            Some(address) => format!("{address}\n"),
            None => "No free address\n".to_string(),
        })
    }

    pub async fn add_range(
        &self,
        subnet: SubnetId,
        start: &str,
        end: &str,
        role: &str,
        description: Option<&str>,
    ) -> Result<()> {
        let mut range = IpRange::new(subnet, parse_ipv4(start)?, parse_ipv4(end)?, role);
        range.description = description.unwrap_or_default().to_string();
        let range = self.context.subnets.add_range(range).await?;
        emit(self.json, &range, |range| {
            format!(
                "Created range {} {}-{} ({})\n",
                range.id, range.start_addr, range.end_addr, range.role
            )
        })
    }

    pub async fn list_ranges(&self, subnet: SubnetId) -> Result<()> {
        let ranges = self.context.subnets.list_ranges(subnet).await?;
        let overlaps = self.context.subnets.range_overlaps(subnet).await?;
        emit(self.json, &ranges, |ranges| render_ranges(ranges, &overlaps))
    }

    pub async fn delete_range(&self, id: RangeId) -> Result<()> {
        self.context.subnets.delete_range(id).await?;
        if !self.json {
            println!("Deleted range {id}");
        }
        Ok(())
    }

    pub async fn add_device(&self, site: SiteId, options: &NewDevice) -> Result<()> {
        let name = options.name.trim();
        if name.is_empty() {
            bail!("device name cannot be empty");
        }
        let mut device = Device::new(site, name);
        device.ip_address = options.address.as_deref().map(parse_ipv4).transpose()?;
        device.hostname = options.hostname.clone();
        device.mac = options.mac.clone();

        let device = self.context.store.create_device(&device).await?;
        log::info!("Created device '{}' (id {})", device.name, device.id);
        emit(self.json, &device, |device| {
            format!("Created device {} '{}'\n", device.id, device.name)
        })
    }

    pub async fn list_devices(&self, site: SiteId) -> Result<()> {
        let devices = self.context.store.list_devices(site).await?;
        emit(self.json, &devices, |devices| render_devices(devices))
    }
}

pub fn render_subnets(subnets: &[Subnet]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<6} {:<20} {:<16} {:<12} {:<6} {}",
        "ID", "Subnet", "Gateway", "Role", "VLAN", "Description"
    );
    let _ = writeln!(out, "{}", "-".repeat(80));
    for subnet in subnets {
        let _ = writeln!(
            out,
            "{:<6} {:<20} {:<16} {:<12} {:<6} {}",
            subnet.id,
            subnet.to_string(),
            subnet
                .gateway
                .map(|gateway| gateway.to_string())
                .unwrap_or_else(|| "-".to_string()),
            or_dash(&subnet.role),
            subnet
                .vlan_id
                .map(|vlan| vlan.to_string())
                .unwrap_or_else(|| "-".to_string()),
            subnet.description
        );
    }
    out
}

pub fn render_change(change: &SubnetChange) -> String {
    let mut out = format!("Created subnet {} (id {})\n", change.subnet, change.subnet.id);
    if let Some(gateway) = change.subnet.gateway {
        let _ = writeln!(out, "  Gateway: {gateway}");
    }
    for warning in &change.overlaps {
        let _ = writeln!(out, "  Warning: overlaps {} (id {})", warning.cidr_b, warning.subnet_b);
    }
    out
}

pub fn render_cells(page: &CellPage) -> String {
    let mut out = format!(
        "Subnet {} page {}/{}\n",
        page.subnet,
        page.page + 1,
        page.page_count
    );
    for cell in &page.cells {
        let _ = writeln!(
            out,
            "{:<16} {:<10} {}",
            cell.address.to_string(),
            cell.status.as_str(),
            cell.label.as_deref().unwrap_or("")
        );
    }
    out
}

pub fn render_utilization(subnet: &Subnet, usage: &Utilization) -> String {
    format!(
        "{}: {} of {} addresses used ({:.1}%)\n",
        subnet, usage.used, usage.total, usage.percent
    )
}

pub fn render_overlaps(warnings: &[OverlapWarning]) -> String {
    if warnings.is_empty() {
        return "No overlapping subnets\n".to_string();
    }
    warnings
        .iter()
        .map(|warning| {
            format!(
                "{} (id {}) overlaps {} (id {})\n",
                warning.cidr_a, warning.subnet_a, warning.cidr_b, warning.subnet_b
            )
        })
        .collect()
}

pub fn render_ranges(ranges: &[IpRange], overlaps: &[RangeOverlap]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<6} {:<16} {:<16} {:<12} {}",
        "ID", "Start", "End", "Role", "Description"
    );
    for range in ranges {
        let _ = writeln!(
            out,
            "{:<6} {:<16} {:<16} {:<12} {}",
            range.id,
            range.start_addr.to_string(),
            range.end_addr.to_string(),
            range.role,
            range.description
        );
    }
    for overlap in overlaps {
        let _ = writeln!(
            out,
            "Warning: range {} overlaps range {}",
            overlap.first, overlap.second
        );
    }
    out
}

pub fn render_devices(devices: &[Device]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<6} {:<20} {:<16} {}", "ID", "Name", "Address", "Hostname");
    for device in devices {
        let _ = writeln!(
            out,
            "{:<6} {:<20} {:<16} {}",
            device.id,
            device.name,
            device
                .ip_address
                .map(|address| address.to_string())
                .unwrap_or_else(|| "-".to_string()),
            device.hostname.as_deref().unwrap_or("-")
        );
    }
    out
}
