//! Range scheme commands

use anyhow::Result;
use labipam_api::AppContext;
use labipam_types::{IpRange, RangeScheme, SchemeId, SubnetId};
use std::fmt::Write;
use std::sync::Arc;

use super::{emit, or_dash};

/// Scheme command implementation
pub struct SchemeCommand {
    context: Arc<AppContext>,
    json: bool,
}

impl SchemeCommand {
    /// Create new scheme command
    pub fn new(context: Arc<AppContext>, json: bool) -> Self {
        Self { context, json }
    }

    pub async fn save(
        &self,
        subnet: SubnetId,
        name: &str,
        description: Option<&str>,
    ) -> Result<()> {
        let scheme = self
            .context
            .schemes
            .save_scheme(subnet, name, description.unwrap_or_default())
            .await?;
        emit(self.json, &scheme, |scheme| {
            format!(
                "Saved scheme {} '{}' with {} ranges\n",
                scheme.id,
                scheme.name,
                scheme.entries.len()
            )
        })
    }

    pub async fn apply(&self, subnet: SubnetId, scheme: SchemeId, replace: bool) -> Result<()> {
        let created = self
            .context
            .schemes
            .apply_scheme(subnet, scheme, replace)
            .await?;
        emit(self.json, &created, |created| render_applied(created, replace))
    }

    pub async fn list(&self) -> Result<()> {
        let schemes = self.context.schemes.list_schemes().await?;
        emit(self.json, &schemes, |schemes| render_schemes(schemes))
    }

    pub async fn delete(&self, id: SchemeId) -> Result<()> {
        self.context.schemes.delete_scheme(id).await?;
        if !self.json {
            println!("Deleted scheme {id}");
        }
        Ok(())
    }
}

pub fn render_schemes(schemes: &[RangeScheme]) -> String {
    if schemes.is_empty() {
        return "No saved schemes\n".to_string();
    }
    let mut out = String::new();
    for scheme in schemes {
        let _ = writeln!(
            out,
            "{} {} ({})",
            scheme.id,
            scheme.name,
            or_dash(&scheme.description)
        );
        for entry in &scheme.entries {
            let _ = writeln!(
                out,
                "    .{:<3} - .{:<3} {}",
                entry.start_octet, entry.end_octet, entry.role
            );
        }
    }
    out
}

pub fn render_applied(created: &[IpRange], replace: bool) -> String {
    let mut out = format!(
        "{} {} ranges\n",
        if replace { "Replaced with" } else { "Added" },
        created.len()
    );
    for range in created {
        let _ = writeln!(
            out,
            "  {} {}-{} {}",
            range.id, range.start_addr, range.end_addr, range.role
        );
    }
    out
}
