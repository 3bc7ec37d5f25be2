//! IPAM API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::context::AppContext;
use labipam_core::{
    BindingOutcome, BindingRequest, CellPage, DeviceOnlyBinding, OverlapWarning, RangeOverlap,
    SubnetChange, TemplateEntry, TemplateRef, Utilization,
};
use labipam_types::{
    parse_ipv4, Device, DeviceId, IpAddressRecord, IpRange, IpamError, RangeId, RangeScheme,
    RecordId, SchemeId, SiteId, Subnet, SubnetId, SubnetPrefill, SubnetTemplate,
};

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ErrorResponse>)>;

fn status_for(error: &IpamError) -> StatusCode {
    match error {
        IpamError::Validation { .. } => StatusCode::BAD_REQUEST,
        IpamError::NotFound { .. } => StatusCode::NOT_FOUND,
        IpamError::Conflict { .. } => StatusCode::CONFLICT,
        IpamError::PartialFailure { .. }
        | IpamError::Store { .. }
        | IpamError::Io(_)
        | IpamError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: IpamError) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&error);
    if status.is_server_error() {
        log::error!("Request failed: {}", error);
    } else {
        log::debug!("Request rejected: {}", error);
    }

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            kind: error.kind().as_str().to_string(),
            failed_step: error.failed_step().map(|step| step.to_string()),
        }),
    )
}

fn respond<T>(result: Result<T, IpamError>) -> ApiResult<T> {
    result
        .map(|data| Json(ApiResponse { data }))
        .map_err(api_error)
}

fn parse_optional(value: Option<&str>) -> Result<Option<Ipv4Addr>, IpamError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(parse_ipv4)
        .transpose()
}

/// IPAM API handler
pub struct IpamApi;

impl IpamApi {
    /// Get API router
    pub fn router() -> Router<Arc<AppContext>> {
        Router::new()
            // Site views
            .route(
                "/api/sites/:site/subnets",
                get(list_subnets).post(create_subnet),
            )
            .route("/api/sites/:site/overlaps", get(site_overlaps))
            .route(
                "/api/sites/:site/devices",
                get(list_devices).post(create_device),
            )
            .route("/api/sites/:site/device-only", get(device_only_bindings))
            // Subnet endpoints
            .route("/api/subnets/:id", get(get_subnet).delete(delete_subnet))
            .route("/api/subnets/:id/cells", get(subnet_cells))
            .route("/api/subnets/:id/utilization", get(subnet_utilization))
            .route("/api/subnets/:id/next-free", get(next_free))
            .route(
                "/api/subnets/:id/ranges",
                get(list_ranges).post(create_range),
            )
            .route("/api/subnets/:id/range-overlaps", get(range_overlaps))
            .route("/api/ranges/:id", delete(delete_range))
            // Bindings
            .route("/api/subnets/:id/assign", post(assign_address))
            .route("/api/addresses/:id", delete(release_address))
            .route("/api/devices/:id/unbind", post(unbind_device))
            .route("/api/devices/:id/promote", post(promote_device))
            // Schemes
            .route("/api/schemes", get(list_schemes).post(save_scheme))
            .route("/api/schemes/:id", delete(delete_scheme))
            .route("/api/subnets/:id/apply-scheme", post(apply_scheme))
            // Templates
            .route("/api/templates", get(list_templates))
            .route("/api/templates/apply", post(apply_template))
            .route("/api/templates/:id", delete(delete_template))
            .route("/api/subnets/:id/save-template", post(save_template))
            .route("/health", get(health_check))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSubnetRequest {
    pub prefix: String,
    pub mask: u8,
    pub gateway: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub description: String,
    pub vlan: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRangeRequest {
    pub start: String,
    pub end: String,
    pub role: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub name: String,
    pub address: Option<String>,
    pub hostname: Option<String>,
    pub mac: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl CreateSubnetRequest {
    fn into_subnet(self, site: SiteId) -> Result<Subnet, IpamError> {
        let mut draft = Subnet::new(site, parse_ipv4(&self.prefix)?, self.mask);
        draft.gateway = parse_optional(self.gateway.as_deref())?;
        draft.role = self.role;
        draft.description = self.description;
        draft.vlan_id = self.vlan;
        Ok(draft)
    }
}

impl CreateRangeRequest {
    fn into_range(self, subnet: SubnetId) -> Result<IpRange, IpamError> {
        let mut range = IpRange::new(
            subnet,
            parse_ipv4(&self.start)?,
            parse_ipv4(&self.end)?,
            &self.role,
        );
        range.description = self.description;
        Ok(range)
    }
}

impl CreateDeviceRequest {
    fn into_device(self, site: SiteId) -> Result<Device, IpamError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(IpamError::validation("name", "device name cannot be empty"));
        }
        let mut device = Device::new(site, name);
        device.ip_address = parse_optional(self.address.as_deref())?;
        device.hostname = self.hostname;
        device.mac = self.mac;
        device.description = self.description;
        Ok(device)
    }
}

#[derive(Debug, Deserialize)]
pub struct CellsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SaveSchemeRequest {
    pub subnet: SubnetId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ApplySchemeRequest {
    pub scheme: SchemeId,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApplyTemplateRequest {
    /// `home-lan`, `builtin:home-lan`, `7` or `user:7`
    pub template: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveTemplateRequest {
    pub name: String,
    pub description: Option<String>,
}

async fn list_subnets(
    State(context): State<Arc<AppContext>>,
    Path(site): Path<SiteId>,
) -> ApiResult<Vec<Subnet>> {
    respond(context.subnets.list_subnets(site).await)
}

async fn create_subnet(
    State(context): State<Arc<AppContext>>,
    Path(site): Path<SiteId>,
    Json(request): Json<CreateSubnetRequest>,
) -> ApiResult<SubnetChange> {
    let draft = request.into_subnet(site).map_err(api_error)?;
    respond(
        context
            .subnets
            .create_subnet(draft, context.smart_gateway)
            .await,
    )
}

async fn site_overlaps(
    State(context): State<Arc<AppContext>>,
    Path(site): Path<SiteId>,
) -> ApiResult<Vec<OverlapWarning>> {
    respond(context.subnets.overlaps(site).await)
}

async fn list_devices(
    State(context): State<Arc<AppContext>>,
    Path(site): Path<SiteId>,
) -> ApiResult<Vec<Device>> {
    respond(context.store.list_devices(site).await)
}

async fn create_device(
    State(context): State<Arc<AppContext>>,
    Path(site): Path<SiteId>,
    Json(request): Json<CreateDeviceRequest>,
) -> ApiResult<Device> {
    let device = request.into_device(site).map_err(api_error)?;
    let device = context
        .store
        .create_device(&device)
        .await
        .map_err(api_error)?;
    log::info!("Created device '{}' (id {})", device.name, device.id);
    Ok(Json(ApiResponse { data: device }))
}

async fn device_only_bindings(
    State(context): State<Arc<AppContext>>,
    Path(site): Path<SiteId>,
) -> ApiResult<Vec<DeviceOnlyBinding>> {
    respond(context.allocation.device_only_bindings(site).await)
}

async fn get_subnet(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SubnetId>,
) -> ApiResult<Subnet> {
    respond(context.subnets.get_subnet(id).await)
}

async fn delete_subnet(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SubnetId>,
) -> ApiResult<()> {
    respond(context.subnets.delete_subnet(id).await)
}

async fn subnet_cells(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SubnetId>,
    Query(query): Query<CellsQuery>,
) -> ApiResult<CellPage> {
    let page = query.page.unwrap_or(0);
    let page_size = query.page_size.unwrap_or(context.page_size);
    respond(context.subnets.cells(id, page, page_size).await)
}

async fn subnet_utilization(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SubnetId>,
) -> ApiResult<Utilization> {
    respond(context.subnets.utilization(id).await)
}

async fn next_free(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SubnetId>,
) -> ApiResult<Option<Ipv4Addr>> {
    respond(context.subnets.next_available(id).await)
}

async fn list_ranges(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SubnetId>,
) -> ApiResult<Vec<IpRange>> {
    respond(context.subnets.list_ranges(id).await)
}

async fn create_range(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SubnetId>,
    Json(request): Json<CreateRangeRequest>,
) -> ApiResult<IpRange> {
    let range = request.into_range(id).map_err(api_error)?;
    respond(context.subnets.add_range(range).await)
}

async fn range_overlaps(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SubnetId>,
) -> ApiResult<Vec<RangeOverlap>> {
    respond(context.subnets.range_overlaps(id).await)
}

async fn delete_range(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<RangeId>,
) -> ApiResult<()> {
    respond(context.subnets.delete_range(id).await)
}

async fn assign_address(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SubnetId>,
    Json(mut request): Json<BindingRequest>,
) -> ApiResult<BindingOutcome> {
    request.subnet_id = id;
    respond(context.allocation.assign(&request).await)
}

async fn release_address(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<RecordId>,
) -> ApiResult<IpAddressRecord> {
    respond(context.allocation.release(id).await)
}

async fn unbind_device(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<DeviceId>,
) -> ApiResult<Device> {
    respond(context.allocation.unbind(id).await)
}

async fn promote_device(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<DeviceId>,
) -> ApiResult<IpAddressRecord> {
    respond(context.allocation.promote(id).await)
}

async fn list_schemes(State(context): State<Arc<AppContext>>) -> ApiResult<Vec<RangeScheme>> {
    respond(context.schemes.list_schemes().await)
}

async fn save_scheme(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<SaveSchemeRequest>,
) -> ApiResult<RangeScheme> {
    respond(
        context
            .schemes
            .save_scheme(request.subnet, &request.name, &request.description)
            .await,
    )
}

async fn delete_scheme(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SchemeId>,
) -> ApiResult<()> {
    respond(context.schemes.delete_scheme(id).await)
}

async fn apply_scheme(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SubnetId>,
    Json(request): Json<ApplySchemeRequest>,
) -> ApiResult<Vec<IpRange>> {
    respond(
        context
            .schemes
            .apply_scheme(id, request.scheme, request.replace)
            .await,
    )
}

async fn list_templates(State(context): State<Arc<AppContext>>) -> ApiResult<Vec<TemplateEntry>> {
    respond(context.templates.list_templates().await)
}

async fn apply_template(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<ApplyTemplateRequest>,
) -> ApiResult<SubnetPrefill> {
    let reference: TemplateRef = request.template.parse().map_err(api_error)?;
    respond(context.templates.apply_template(&reference).await)
}

async fn delete_template(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<u64>,
) -> ApiResult<()> {
    respond(context.templates.delete_template(id).await)
}

async fn save_template(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<SubnetId>,
    Json(request): Json<SaveTemplateRequest>,
) -> ApiResult<SubnetTemplate> {
    respond(
        context
            .templates
            .save_subnet_as_template(id, &request.name, request.description.as_deref())
            .await,
    )
}

/// Health check endpoint
async fn health_check(State(context): State<Arc<AppContext>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "store": context.store.backend().to_string(),
        "smart_gateway": context.smart_gateway,
    }))
}
