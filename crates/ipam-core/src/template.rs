//! Subnet templates
//!
//! Built-in starting points plus user templates kept in the store.

use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use labipam_types::{
    IpamError, IpamResult, Subnet, SubnetId, SubnetPrefill, SubnetTemplate, TemplateId,
};

use crate::arithmetic::suggest_gateway;
use crate::store::{require_subnet, IpamStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "id", rename_all = "lowercase")]
pub enum TemplateRef {
    BuiltIn(String),
    User(TemplateId),
}

impl std::fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateRef::BuiltIn(key) => write!(f, "builtin:{key}"),
            TemplateRef::User(id) => write!(f, "user:{id}"),
        }
    }
}

impl std::str::FromStr for TemplateRef {
    type Err = IpamError;

    /// `home-lan`, `builtin:home-lan`, `7` and `user:7` are all accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || IpamError::validation("template", format!("invalid template '{s}'"));

        if let Some(id) = s.strip_prefix("user:") {
            return id.parse().map(TemplateRef::User).map_err(|_| invalid());
        }
        if let Some(key) = s.strip_prefix("builtin:") {
            return Ok(TemplateRef::BuiltIn(key.to_string()));
        }
        if let Ok(id) = s.parse() {
            return Ok(TemplateRef::User(id));
        }
        if s.is_empty() {
            return Err(invalid());
        }
        Ok(TemplateRef::BuiltIn(s.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateEntry {
    pub reference: TemplateRef,
    #[serde(flatten)]
    pub template: SubnetTemplate,
}

struct BuiltInTemplate {
    key: &'static str,
    name: &'static str,
    prefix: [u8; 4],
    mask: u8,
    gateway: Option<[u8; 4]>,
    role: &'static str,
    description: &'static str,
}

const BUILT_IN_TEMPLATES: &[BuiltInTemplate] = &[
    BuiltInTemplate {
        key: "home-lan",
        name: "Home LAN",
        prefix: [192, 168, 1, 0],
        mask: 24,
        gateway: Some([192, 168, 1, 1]),
        role: "lan",
        description: "Primary household network",
    },
    BuiltInTemplate {
        key: "iot",
        name: "IoT",
        prefix: [192, 168, 20, 0],
        mask: 24,
        gateway: Some([192, 168, 20, 1]),
        role: "iot",
        description: "Isolated smart-home devices",
    },
    BuiltInTemplate {
        key: "guest",
        name: "Guest",
        prefix: [192, 168, 30, 0],
        mask: 24,
        gateway: None,
        role: "guest",
        description: "Internet-only guest access",
    },
    BuiltInTemplate {
        key: "management",
        name: "Management",
        prefix: [10, 0, 0, 0],
        mask: 24,
        gateway: Some([10, 0, 0, 1]),
        role: "management",
        description: "Switch, AP and hypervisor management interfaces",
    },
    BuiltInTemplate {
        key: "dmz",
        name: "DMZ",
        prefix: [172, 16, 0, 0],
        mask: 24,
        gateway: None,
        role: "dmz",
        description: "Externally reachable services",
    },
    BuiltInTemplate {
        key: "lab-16",
        name: "Lab /16",
        prefix: [10, 10, 0, 0],
        mask: 16,
        gateway: None,
        role: "lab",
        description: "Large address space for lab experiments",
    },
    BuiltInTemplate {
        key: "point-to-point",
        name: "Point-to-point",
        prefix: [10, 255, 255, 0],
        mask: 31,
        gateway: None,
        role: "transit",
        description: "Router-to-router link",
    },
];

impl BuiltInTemplate {
    fn to_template(&self) -> SubnetTemplate {
        SubnetTemplate {
            id: 0,
            name: self.name.to_string(),
            prefix: Ipv4Addr::from(self.prefix),
            mask: self.mask,
            gateway: self.gateway.map(Ipv4Addr::from),
            role: self.role.to_string(),
            description: self.description.to_string(),
        }
    }
}

pub fn built_in_templates() -> Vec<TemplateEntry> {
    BUILT_IN_TEMPLATES
        .iter()
        .map(|builtin| TemplateEntry {
            reference: TemplateRef::BuiltIn(builtin.key.to_string()),
            template: builtin.to_template(),
        })
        .collect()
}

pub struct SubnetTemplateEngine {
    store: Arc<dyn IpamStore>,
    smart_gateway: bool,
}

impl SubnetTemplateEngine {
    pub fn new(store: Arc<dyn IpamStore>, smart_gateway: bool) -> Self {
        Self {
            store,
            smart_gateway,
        }
    }

    pub fn smart_gateway(&self) -> bool {
        self.smart_gateway
    }

    pub async fn list_templates(&self) -> IpamResult<Vec<TemplateEntry>> {
        let mut templates = built_in_templates();
        templates.extend(self.store.list_templates().await?.into_iter().map(|template| {
            TemplateEntry {
                reference: TemplateRef::User(template.id),
                template,
            }
        }));
        Ok(templates)
    }

    pub async fn get_template(&self, reference: &TemplateRef) -> IpamResult<SubnetTemplate> {
        match reference {
            TemplateRef::BuiltIn(key) => BUILT_IN_TEMPLATES
                .iter()
                .find(|builtin| builtin.key == key.as_str())
                .map(BuiltInTemplate::to_template)
                .ok_or_else(|| IpamError::not_found("template", reference)),
            TemplateRef::User(id) => self
                .store
                .get_template(*id)
                .await?
                .ok_or_else(|| IpamError::not_found("template", reference)),
        }
    }

    /// Values to prefill subnet creation with.
    pub async fn apply_template(&self, reference: &TemplateRef) -> IpamResult<SubnetPrefill> {
        let template = self.get_template(reference).await?;
        let gateway = match template.gateway {
            Some(gateway) => Some(gateway),
            None if self.smart_gateway => suggest_gateway(template.prefix, template.mask),
            None => None,
        };

        Ok(SubnetPrefill {
            prefix: template.prefix,
            mask: template.mask,
            gateway,
            role: template.role,
            description: template.description,
        })
    }

    pub async fn create_template(&self, template: &SubnetTemplate) -> IpamResult<SubnetTemplate> {
        let name = template.name.trim();
        if name.is_empty() {
            return Err(IpamError::validation("name", "template name cannot be empty"));
        }

        let mut probe = Subnet::new(0, template.prefix, template.mask);
        probe.gateway = template.gateway;
        probe.validate()?;

        let taken = BUILT_IN_TEMPLATES.iter().any(|builtin| builtin.name == name)
            || self
                .store
                .list_templates()
                .await?
                .iter()
                .any(|existing| existing.name == name);
        if taken {
            return Err(IpamError::conflict(
                "template",
                format!("a template named '{name}' already exists"),
            ));
        }

        let mut template = template.clone();
        template.name = name.to_string();
        let template = self.store.create_template(&template).await?;
        log::info!("Created template '{}' (id {})", template.name, template.id);
        Ok(template)
    }

    /// Save an existing subnet's layout as a new user template.
    pub async fn save_subnet_as_template(
        &self,
        subnet_id: SubnetId,
        name: &str,
        description: Option<&str>,
    ) -> IpamResult<SubnetTemplate> {
        let subnet = require_subnet(self.store.as_ref(), subnet_id).await?;
        let template = SubnetTemplate {
            id: 0,
            name: name.to_string(),
            prefix: subnet.prefix,
            mask: subnet.mask,
            gateway: subnet.gateway,
            role: subnet.role.clone(),
            description: description.unwrap_or(&subnet.description).to_string(),
        };
        self.create_template(&template).await
    }

    pub async fn delete_template(&self, id: TemplateId) -> IpamResult<()> {
        self.store.delete_template(id).await?;
        log::info!("Deleted template {}", id);
        Ok(())
    }
}
