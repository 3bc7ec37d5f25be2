//! Subnet template commands

use anyhow::Result;
use labipam_api::AppContext;
use labipam_core::{TemplateEntry, TemplateRef};
use labipam_types::{SubnetId, SubnetPrefill, TemplateId};
use std::fmt::Write;
use std::sync::Arc;

use super::{emit, or_dash};

/// Template command implementation
pub struct TemplateCommand {
    context: Arc<AppContext>,
    json: bool,
}

impl TemplateCommand {
    /// Create new template command
    pub fn new(context: Arc<AppContext>, json: bool) -> Self {
        Self { context, json }
    }

    pub async fn list(&self) -> Result<()> {
        let templates = self.context.templates.list_templates().await?;
        emit(self.json, &templates, |templates| render_templates(templates))
    }

    /// Show the values a template prefills a new subnet with
    pub async fn show(&self, template: &str) -> Result<()> {
        let reference: TemplateRef = template.parse()?;
        let prefill = self.context.templates.apply_template(&reference).await?;
        emit(self.json, &prefill, |prefill| render_prefill(&reference, prefill))
    }

    pub async fn save(
        &self,
        subnet: SubnetId,
        name: &str,
        description: Option<&str>,
    ) -> Result<()> {
        let template = self
            .context
            .templates
            .save_subnet_as_template(subnet, name, description)
            .await?;
        emit(self.json, &template, |template| {
            format!(
                "Saved template user:{} '{}' ({}/{})\n",
                template.id, template.name, template.prefix, template.mask
            )
        })
    }

    pub async fn delete(&self, id: TemplateId) -> Result<()> {
        self.context.templates.delete_template(id).await?;
        if !self.json {
            println!("Deleted template user:{id}");
        }
        Ok(())
    }
}

pub fn render_templates(templates: &[TemplateEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<20} {:<22} {:<20} {:<16} {}",
        "Reference", "Name", "Block", "Gateway", "Role"
    );
    for entry in templates {
        let template = &entry.template;
        let _ = writeln!(
            out,
            "{:<20} {:<22} {:<20} {:<16} {}",
            entry.reference.to_string(),
            template.name,
            format!("{}/{}", template.prefix, template.mask),
            template
                .gateway
                .map(|gateway| gateway.to_string())
                .unwrap_or_else(|| "-".to_string()),
            or_dash(&template.role)
        );
    }
    out
}

pub fn render_prefill(reference: &TemplateRef, prefill: &SubnetPrefill) -> String {
    let mut out = format!("Template {reference}\n");
    let _ = writeln!(out, "  Block:       {}/{}", prefill.prefix, prefill.mask);
    let _ = writeln!(
        out,
        "  Gateway:     {}",
        prefill
            .gateway
            .map(|gateway| gateway.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    let _ = writeln!(out, "  Role:        {}", or_dash(&prefill.role));
    let _ = writeln!(out, "  Description: {}", or_dash(&prefill.description));
    out
}
