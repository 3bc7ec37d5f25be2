//! HTTP inventory store
//!
//! Talks to a JSON REST inventory service. Each entity lives under its own
//! collection path (`/api/subnets`, `/api/addresses`, ...): `GET` on the
//! collection lists, `POST` creates, and `GET`/`PUT`/`DELETE` on
//! `/{collection}/{id}` read, replace and remove single entries.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use labipam_core::IpamStore;
use labipam_types::{
    Device, DeviceId, IpAddressRecord, IpRange, IpamError, IpamResult, RangeId, RangeScheme,
    RecordId, SchemeId, SiteId, StoreBackend, StoreConfig, Subnet, SubnetId, SubnetTemplate,
    TemplateId,
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Remote collection of one entity type
#[derive(Debug, Clone, Copy)]
struct Collection {
    entity: &'static str,
    path: &'static str,
}

const SUBNETS: Collection = Collection {
    entity: "subnet",
    path: "subnets",
};
const ADDRESSES: Collection = Collection {
    entity: "address",
    path: "addresses",
};
const DEVICES: Collection = Collection {
    entity: "device",
    path: "devices",
};
const RANGES: Collection = Collection {
    entity: "range",
    path: "ranges",
};
const SCHEMES: Collection = Collection {
    entity: "scheme",
    path: "schemes",
};
const TEMPLATES: Collection = Collection {
    entity: "template",
    path: "templates",
};

/// Store backed by a remote inventory REST API
pub struct HttpStore {
    name: String,
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStore {
    /// Create new HTTP store client
    pub fn new(config: &StoreConfig) -> IpamResult<Self> {
        let base_url = config
            .url
            .as_ref()
            .ok_or_else(|| IpamError::validation("store.url", "http store requires a base URL"))?
            .trim_end_matches('/')
            .to_string();

        let timeout = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| IpamError::store(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: config.name.clone(),
            client,
            base_url,
            token: config.token.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/api/{}", self.base_url, collection.path)
    }

    fn item_url(&self, collection: Collection, id: u64) -> String {
        format!("{}/{}", self.collection_url(collection), id)
    }

    fn filtered_url(&self, collection: Collection, key: &str, value: u64) -> String {
        format!(
            "{}?{}={}",
            self.collection_url(collection),
            urlencoding::encode(key),
            value
        )
    }

    /// Make authenticated API request
    async fn api_request(
        &self,
        method: Method,
        url: &str,
        body: Option<&impl Serialize>,
        collection: Collection,
        id: Option<u64>,
    ) -> IpamResult<reqwest::Response> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header("Content-Type", "application/json");

        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Token {token}"));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        log::debug!("{} {}", method, url);
        let response = request
            .send()
            .await
            .map_err(|e| IpamError::store(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(match status {
            StatusCode::NOT_FOUND => IpamError::not_found(
                collection.entity,
                id.map(|id| id.to_string()).unwrap_or_default(),
            ),
            StatusCode::CONFLICT => IpamError::conflict(collection.entity, text),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                IpamError::validation(collection.entity, text)
            }
            _ => IpamError::store(format!(
                "{} {} failed: {} - {}",
                method, url, status, text
            )),
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> IpamResult<T> {
        response
            .json()
            .await
            .map_err(|e| IpamError::store(format!("invalid response from {url}: {e}")))
    }

    async fn list<T: DeserializeOwned>(
        &self,
        collection: Collection,
        filter: Option<(&str, u64)>,
    ) -> IpamResult<Vec<T>> {
        let url = match filter {
            Some((key, value)) => self.filtered_url(collection, key, value),
            None => self.collection_url(collection),
        };
        let response = self
            .api_request(Method::GET, &url, None::<&()>, collection, None)
            .await?;
        Self::decode(response, &url).await
    }

    async fn get<T: DeserializeOwned>(&self, collection: Collection, id: u64) -> IpamResult<Option<T>> {
        let url = self.item_url(collection, id);
        match self
            .api_request(Method::GET, &url, None::<&()>, collection, Some(id))
            .await
        {
            Ok(response) => Self::decode(response, &url).await.map(Some),
            Err(IpamError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create<T: Serialize + DeserializeOwned + Sync>(
        &self,
        collection: Collection,
        value: &T,
    ) -> IpamResult<T> {
        let url = self.collection_url(collection);
        let response = self
            .api_request(Method::POST, &url, Some(value), collection, None)
            .await?;
        let created = Self::decode(response, &url).await?;
        log::debug!("Created {} via {}", collection.entity, self.name);
        Ok(created)
    }

    async fn update<T: Serialize + DeserializeOwned + Sync>(
        &self,
        collection: Collection,
        id: u64,
        value: &T,
    ) -> IpamResult<T> {
        let url = self.item_url(collection, id);
        let response = self
            .api_request(Method::PUT, &url, Some(value), collection, Some(id))
            .await?;
        Self::decode(response, &url).await
    }

    async fn delete(&self, collection: Collection, id: u64) -> IpamResult<()> {
        let url = self.item_url(collection, id);
        self.api_request(Method::DELETE, &url, None::<&()>, collection, Some(id))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl IpamStore for HttpStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Http
    }

    async fn list_subnets(&self, site: SiteId) -> IpamResult<Vec<Subnet>> {
        self.list(SUBNETS, Some(("site", site))).await
    }

    async fn list_all_subnets(&self) -> IpamResult<Vec<Subnet>> {
        self.list(SUBNETS, None).await
    }

    async fn get_subnet(&self, id: SubnetId) -> IpamResult<Option<Subnet>> {
        self.get(SUBNETS, id).await
    }

    async fn create_subnet(&self, subnet: &Subnet) -> IpamResult<Subnet> {
        self.create(SUBNETS, subnet).await
    }

    async fn update_subnet(&self, subnet: &Subnet) -> IpamResult<Subnet> {
        self.update(SUBNETS, subnet.id, subnet).await
    }

    async fn delete_subnet(&self, id: SubnetId) -> IpamResult<()> {
        self.delete(SUBNETS, id).await
    }

    async fn list_addresses(&self, subnet: SubnetId) -> IpamResult<Vec<IpAddressRecord>> {
        self.list(ADDRESSES, Some(("subnet", subnet))).await
    }

    async fn get_address(&self, id: RecordId) -> IpamResult<Option<IpAddressRecord>> {
        self.get(ADDRESSES, id).await
    }

    async fn create_address(&self, record: &IpAddressRecord) -> IpamResult<IpAddressRecord> {
        self.create(ADDRESSES, record).await
    }

    async fn update_address(&self, record: &IpAddressRecord) -> IpamResult<IpAddressRecord> {
        self.update(ADDRESSES, record.id, record).await
    }

    async fn delete_address(&self, id: RecordId) -> IpamResult<()> {
        self.delete(ADDRESSES, id).await
    }

    async fn list_devices(&self, site: SiteId) -> IpamResult<Vec<Device>> {
        self.list(DEVICES, Some(("site", site))).await
    }

    async fn get_device(&self, id: DeviceId) -> IpamResult<Option<Device>> {
        self.get(DEVICES, id).await
    }

    async fn create_device(&self, device: &Device) -> IpamResult<Device> {
        self.create(DEVICES, device).await
    }

    async fn update_device(&self, device: &Device) -> IpamResult<Device> {
        self.update(DEVICES, device.id, device).await
    }

    async fn delete_device(&self, id: DeviceId) -> IpamResult<()> {
        self.delete(DEVICES, id).await
    }

    async fn list_ranges(&self, subnet: SubnetId) -> IpamResult<Vec<IpRange>> {
        self.list(RANGES, Some(("subnet", subnet))).await
    }

    async fn get_range(&self, id: RangeId) -> IpamResult<Option<IpRange>> {
        self.get(RANGES, id).await
    }

    async fn create_range(&self, range: &IpRange) -> IpamResult<IpRange> {
        self.create(RANGES, range).await
    }

    async fn update_range(&self, range: &IpRange) -> IpamResult<IpRange> {
        self.update(RANGES, range.id, range).await
    }

    async fn delete_range(&self, id: RangeId) -> IpamResult<()> {
        self.delete(RANGES, id).await
    }

    async fn list_schemes(&self) -> IpamResult<Vec<RangeScheme>> {
        self.list(SCHEMES, None).await
    }

    async fn get_scheme(&self, id: SchemeId) -> IpamResult<Option<RangeScheme>> {
        self.get(SCHEMES, id).await
    }

    async fn create_scheme(&self, scheme: &RangeScheme) -> IpamResult<RangeScheme> {
        self.create(SCHEMES, scheme).await
    }

    async fn delete_scheme(&self, id: SchemeId) -> IpamResult<()> {
        self.delete(SCHEMES, id).await
    }

    async fn list_templates(&self) -> IpamResult<Vec<SubnetTemplate>> {
        self.list(TEMPLATES, None).await
    }

    async fn get_template(&self, id: TemplateId) -> IpamResult<Option<SubnetTemplate>> {
        self.get(TEMPLATES, id).await
    }

    async fn create_template(&self, template: &SubnetTemplate) -> IpamResult<SubnetTemplate> {
        self.create(TEMPLATES, template).await
    }

    async fn delete_template(&self, id: TemplateId) -> IpamResult<()> {
        self.delete(TEMPLATES, id).await
    }
}
