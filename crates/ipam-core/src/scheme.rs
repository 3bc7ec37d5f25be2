//! Range schemes
//!
//! A scheme records a subnet's ranges as last-octet offsets so the same
//! layout can be stamped onto any other subnet.

use std::net::Ipv4Addr;
use std::sync::Arc;

use labipam_types::{
    IpRange, IpamError, IpamResult, RangeScheme, SchemeEntry, SchemeId, SubnetId,
};

use crate::arithmetic::subnet_block;
use crate::store::{require_subnet, IpamStore};

pub struct RangeSchemeEngine {
    store: Arc<dyn IpamStore>,
}

impl RangeSchemeEngine {
    pub fn new(store: Arc<dyn IpamStore>) -> Self {
        Self { store }
    }

    pub async fn list_schemes(&self) -> IpamResult<Vec<RangeScheme>> {
        self.store.list_schemes().await
    }

    pub async fn get_scheme(&self, id: SchemeId) -> IpamResult<RangeScheme> {
        self.store
            .get_scheme(id)
            .await?
            .ok_or_else(|| IpamError::not_found("scheme", id))
    }

    /// Snapshot the current ranges of a subnet under a new scheme name.
    pub async fn save_scheme(
        &self,
        subnet_id: SubnetId,
        name: &str,
        description: &str,
    ) -> IpamResult<RangeScheme> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IpamError::validation("name", "scheme name cannot be empty"));
        }

        let subnet = require_subnet(self.store.as_ref(), subnet_id).await?;

        if self
            .store
            .list_schemes()
            .await?
            .iter()
            .any(|scheme| scheme.name == name)
        {
            return Err(IpamError::conflict(
                "scheme",
                format!("a scheme named '{name}' already exists"),
            ));
        }

        let ranges = self.store.list_ranges(subnet_id).await?;
        if ranges.is_empty() {
            return Err(IpamError::validation(
                "subnet",
                format!("subnet {subnet} has no ranges to save"),
            ));
        }

        let entries = ranges
            .iter()
            .map(scheme_entry)
            .collect::<IpamResult<Vec<_>>>()?;

        let scheme = RangeScheme {
            id: 0,
            name: name.to_string(),
            description: description.to_string(),
            entries,
        };
        let scheme = self.store.create_scheme(&scheme).await?;

        log::info!(
            "Saved scheme '{}' with {} ranges from subnet {}",
            scheme.name,
            scheme.entries.len(),
            subnet
        );
        Ok(scheme)
    }

    /// Materialise a scheme onto a subnet, optionally replacing its ranges.
    ///
    /// Every range is checked against the target block before anything is
    /// deleted or created. Overlaps with ranges kept by an append are not
    /// checked.
    pub async fn apply_scheme(
        &self,
        subnet_id: SubnetId,
        scheme_id: SchemeId,
        replace_existing: bool,
    ) -> IpamResult<Vec<IpRange>> {
        let subnet = require_subnet(self.store.as_ref(), subnet_id).await?;
        let scheme = self.get_scheme(scheme_id).await?;

        let [a, b, c] = subnet_block(subnet.prefix, subnet.mask).base;
        let mut ranges = Vec::with_capacity(scheme.entries.len());
        for entry in &scheme.entries {
            let mut range = IpRange::new(
                subnet.id,
                Ipv4Addr::new(a, b, c, entry.start_octet),
                Ipv4Addr::new(a, b, c, entry.end_octet),
                &entry.role,
            );
            range.description = entry.description.clone();
            range.validate_within(&subnet)?;
            ranges.push(range);
        }

        if replace_existing {
            for existing in self.store.list_ranges(subnet.id).await? {
                self.store.delete_range(existing.id).await?;
            }
        }

        let mut created = Vec::with_capacity(ranges.len());
        for range in &ranges {
            created.push(self.store.create_range(range).await?);
        }

        log::info!(
            "Applied scheme '{}' to subnet {} ({} ranges, {})",
            scheme.name,
            subnet,
            created.len(),
            if replace_existing { "replaced" } else { "appended" }
        );
        Ok(created)
    }

    pub async fn delete_scheme(&self, id: SchemeId) -> IpamResult<()> {
        self.store.delete_scheme(id).await?;
        log::info!("Deleted scheme {}", id);
        Ok(())
    }
}

fn scheme_entry(range: &IpRange) -> IpamResult<SchemeEntry> {
    let start = range.start_addr.octets();
    let end = range.end_addr.octets();
    if start[..3] != end[..3] {
        return Err(IpamError::validation(
            "range",
            format!(
                "range {}-{} crosses a /24 boundary and cannot be saved as octet offsets",
                range.start_addr, range.end_addr
            ),
        ));
    }

    Ok(SchemeEntry {
        start_octet: start[3],
        end_octet: end[3],
        role: range.role.clone(),
        description: range.description.clone(),
    })
}
