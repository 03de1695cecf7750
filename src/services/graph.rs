//! Microsoft Graph client
//!
//! Read-only access to the Intune and directory endpoints the checker needs.
//! Every request carries a fresh bearer token from the [`TokenProvider`],
//! throttling and server errors are retried with exponential backoff, and
//! collections are followed through `@odata.nextLink`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::Rng;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::config::{AppConfig, CompareConfig, GraphConfig};
use crate::models::{
    ConfigItem, GroupRef, PolicyCategory, RawDirectoryObject, SourceCollection, Subject,
    SubjectType,
};
use crate::services::auth::{provider_from_config, TokenProvider};
use crate::services::policy_config::config_endpoint;
use crate::services::sources::{DirectorySource, PolicyConfigSource, PolicySource};
use crate::utils::{AppError, AppResult};

const EXPAND_ASSIGNMENTS: &[(&str, &str)] = &[("$expand", "assignments")];
const APP_PROTECTION_ENDPOINTS: [&str; 3] = [
    "/deviceAppManagement/androidManagedAppProtections",
    "/deviceAppManagement/iosManagedAppProtections",
    "/deviceAppManagement/windowsManagedAppProtections",
];
const APP_BATCH_PAUSE: Duration = Duration::from_millis(200);
const MAX_JITTER_MS: u64 = 500;
const MIN_SEARCH_LEN: usize = 2;
const SEARCH_RESULT_LIMIT: usize = 10;
const DEVICE_SCAN_PAGE_SIZE: &str = "200";
const USER_FIELDS: &str = "id,displayName,mail,userPrincipalName,jobTitle,department";
const DEVICE_FIELDS: &str =
    "id,deviceName,serialNumber,operatingSystem,osVersion,managedDeviceOwnerType,userPrincipalName";

/// One page of a Graph collection
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    display_name: Option<String>,
    mail: Option<String>,
    user_principal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedDevice {
    id: String,
    device_name: Option<String>,
    serial_number: Option<String>,
    operating_system: Option<String>,
    user_principal_name: Option<String>,
    #[serde(rename = "azureADDeviceId")]
    azure_ad_device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphGroup {
    id: String,
    display_name: Option<String>,
    description: Option<String>,
}

/// A failed request, keeping the HTTP status for callers that treat some
/// statuses as "no data" rather than an error
#[derive(Debug)]
struct RequestFailure {
    status: Option<StatusCode>,
    error: AppError,
}

impl RequestFailure {
    fn other(error: AppError) -> Self {
        Self {
            status: None,
            error,
        }
    }

    fn from_status(status: StatusCode, endpoint: &str, body: &str) -> Self {
        let detail = graph_error_message(body).unwrap_or_else(|| status.to_string());
        let error = match status {
            StatusCode::UNAUTHORIZED => {
                AppError::Auth(format!("Graph rejected the access token: {}", detail))
            }
            StatusCode::FORBIDDEN => {
                AppError::Auth(format!("Access denied to {}: {}", endpoint, detail))
            }
            StatusCode::NOT_FOUND => AppError::NotFound(format!("{}: {}", endpoint, detail)),
            _ => AppError::Network(format!("{} returned {}: {}", endpoint, status, detail)),
        };
        Self {
            status: Some(status),
            error,
        }
    }
}

impl From<RequestFailure> for AppError {
    fn from(failure: RequestFailure) -> Self {
        failure.error
    }
}

/// `error.message` from a Graph error body
fn graph_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, Utc::now()))
}

/// `Retry-After` as delta-seconds or an HTTP-date; dates in the past mean no wait
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// OData string literal escaping
fn escape_odata(value: &str) -> String {
    value.replace('\'', "''")
}

/// Graph API client implementing every data source the core consumes
#[derive(Clone)]
pub struct GraphClient {
    http: Client,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
    max_retries: u32,
    retry_base_delay: Duration,
    max_retry_delay: Duration,
    app_batch_size: usize,
    group_chunk_size: usize,
}

impl GraphClient {
    pub fn new(
        config: &GraphConfig,
        tuning: &CompareConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> AppResult<Self> {
        let http = Self::http_client(config)?;
        Ok(Self::with_http(http, config, tuning, tokens))
    }

    /// Client plus token provider built from the application configuration
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let http = Self::http_client(&config.graph)?;
        let tokens = provider_from_config(&config.graph, http.clone())?;
        info!(base_url = %config.graph.base_url, "Graph client initialized");
        Ok(Self::with_http(http, &config.graph, &config.compare, tokens))
    }

    fn http_client(config: &GraphConfig) -> AppResult<Client> {
        Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("intune-assignment-checker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))
    }

    fn with_http(
        http: Client,
        config: &GraphConfig,
        tuning: &CompareConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            tokens,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_retry_delay: Duration::from_millis(config.max_retry_delay_ms),
            app_batch_size: tuning.app_assignment_batch_size.max(1),
            group_chunk_size: tuning.group_lookup_chunk_size.max(1),
        }
    }

    /// Absolute URL for a Graph path; `@odata.nextLink` values pass through
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// `base * 2^(attempt-1)` plus up to 500 ms of jitter, unless the server
    /// said how long to wait. Never longer than the configured maximum.
    fn retry_delay(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        let delay = match server_hint {
            Some(hint) => hint,
            None => {
                let backoff = self
                    .retry_base_delay
                    .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
                let jitter = rand::thread_rng().gen_range(0..=MAX_JITTER_MS);
                backoff + Duration::from_millis(jitter)
            }
        };
        delay.min(self.max_retry_delay)
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<Response, RequestFailure> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(RequestFailure::other)?;
        let request = request.bearer_auth(token);

        let mut attempt = 0;
        loop {
            let this_try = request.try_clone().ok_or_else(|| {
                RequestFailure::other(AppError::Internal("request body is not cloneable".into()))
            })?;

            match this_try.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if retryable && attempt < self.max_retries {
                        attempt += 1;
                        let delay = self.retry_delay(attempt, retry_after(&response));
                        warn!(
                            endpoint = %endpoint,
                            status = status.as_u16(),
                            attempt,
                            max_retries = self.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Graph request failed, retrying"
                        );
                        sleep(delay).await;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(RequestFailure::from_status(status, endpoint, &body));
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_delay(attempt, None);
                    warn!(endpoint = %endpoint, error = %e, attempt, "Graph request failed, retrying");
                    sleep(delay).await;
                }
                Err(e) => return Err(RequestFailure::other(e.into())),
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RequestFailure> {
        let mut request = self.http.get(self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = self.execute(request, path).await?;
        response.json::<T>().await.map_err(|e| {
            RequestFailure::other(AppError::Network(format!(
                "Invalid response from {}: {}",
                path, e
            )))
        })
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, RequestFailure> {
        let request = self.http.post(self.url(path)).json(body);
        let response = self.execute(request, path).await?;
        response.json::<T>().await.map_err(|e| {
            RequestFailure::other(AppError::Network(format!(
                "Invalid response from {}: {}",
                path, e
            )))
        })
    }

    /// Every page of a collection.
    ///
    /// A failing first page is an error. A failing later page stops
    /// pagination and keeps what was already collected.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, RequestFailure> {
        let first: Page<T> = self.get_json(path, query).await?;
        let mut values = first.value;
        let mut next = first.next_link;

        while let Some(link) = next {
            match self.get_json::<Page<T>>(&link, &[]).await {
                Ok(page) => {
                    values.extend(page.value);
                    next = page.next_link;
                }
                Err(failure) => {
                    warn!(
                        endpoint = %path,
                        error = %failure.error,
                        collected = values.len(),
                        "Pagination failed, keeping records collected so far"
                    );
                    break;
                }
            }
        }

        Ok(values)
    }

    /// Collection with `$expand=assignments`, optionally empty on 403
    async fn fetch_expanded(&self, path: &str, silent_on_forbidden: bool) -> AppResult<Vec<Value>> {
        match self.get_all(path, EXPAND_ASSIGNMENTS).await {
            Ok(values) => Ok(values),
            Err(failure)
                if silent_on_forbidden && failure.status == Some(StatusCode::FORBIDDEN) =>
            {
                debug!(endpoint = %path, "No permission for collection, treating as empty");
                Ok(Vec::new())
            }
            Err(failure) => Err(failure.into()),
        }
    }

    // ==================== Policy Collections ====================

    /// Assigned apps, with assignments fetched per app in small batches
    async fn fetch_mobile_apps(&self) -> AppResult<Vec<Value>> {
        let mut apps: Vec<Value> = self
            .get_all(
                "/deviceAppManagement/mobileApps",
                &[
                    ("$filter", "isAssigned eq true"),
                    (
                        "$select",
                        "id,displayName,description,createdDateTime,lastModifiedDateTime",
                    ),
                ],
            )
            .await?;

        for (batch, chunk) in apps.chunks_mut(self.app_batch_size).enumerate() {
            if batch > 0 {
                sleep(APP_BATCH_PAUSE).await;
            }

            let ids: Vec<String> = chunk
                .iter()
                .map(|app| app.get("id").and_then(Value::as_str).unwrap_or_default().to_string())
                .collect();
            let assignments = join_all(ids.iter().map(|id| self.app_assignments(id))).await;

            for (app, assignments) in chunk.iter_mut().zip(assignments) {
                if let Value::Object(map) = app {
                    map.insert("assignments".to_string(), Value::Array(assignments));
                }
            }
        }

        Ok(apps)
    }

    async fn app_assignments(&self, app_id: &str) -> Vec<Value> {
        let path = format!(
            "/deviceAppManagement/mobileApps('{}')/assignments",
            urlencoding::encode(app_id)
        );
        match self.get_json::<Page<Value>>(&path, &[]).await {
            Ok(page) => page.value,
            Err(failure) => {
                warn!(app_id, error = %failure.error, "Failed to fetch app assignments");
                Vec::new()
            }
        }
    }

    /// Android, iOS and Windows protection policies; a failing platform is skipped
    async fn fetch_app_protection(&self) -> AppResult<Vec<Value>> {
        let mut policies = Vec::new();
        for endpoint in APP_PROTECTION_ENDPOINTS {
            match self.fetch_expanded(endpoint, false).await {
                Ok(values) => policies.extend(values),
                Err(e) => warn!(endpoint, error = %e, "Failed to fetch app protection policies"),
            }
        }
        Ok(policies)
    }

    // ==================== Directory ====================

    async fn group_memberships(&self, path: &str) -> AppResult<Vec<GroupRef>> {
        let objects: Vec<RawDirectoryObject> = self
            .get_all(path, &[("$select", "id,displayName")])
            .await?;
        Ok(objects
            .into_iter()
            .filter(RawDirectoryObject::is_group)
            .map(|g| GroupRef {
                id: g.id,
                display_name: g.display_name,
            })
            .collect())
    }

    async fn describe_user(&self, id: &str) -> AppResult<Subject> {
        let path = format!("/users/{}", urlencoding::encode(id));
        let user: GraphUser = self.get_json(&path, &[("$select", USER_FIELDS)]).await?;
        Ok(user_subject(user))
    }

    async fn describe_device(&self, id: &str) -> AppResult<Subject> {
        let path = format!("/deviceManagement/managedDevices/{}", urlencoding::encode(id));
        let device: ManagedDevice = self.get_json(&path, &[("$select", DEVICE_FIELDS)]).await?;
        Ok(device_subject(device))
    }

    async fn describe_group(&self, id: &str) -> AppResult<Subject> {
        let path = format!("/groups/{}", urlencoding::encode(id));
        let group: GraphGroup = self
            .get_json(&path, &[("$select", "id,displayName,description")])
            .await?;
        Ok(group_subject(group))
    }

    async fn search_users(&self, query: &str) -> AppResult<Vec<Subject>> {
        let q = escape_odata(query);
        let filter = format!(
            "startsWith(displayName,'{q}') or startsWith(mail,'{q}') or startsWith(userPrincipalName,'{q}')"
        );
        let page: Page<GraphUser> = self
            .get_json(
                "/users",
                &[("$filter", filter.as_str()), ("$select", USER_FIELDS), ("$top", "10")],
            )
            .await?;
        Ok(page.value.into_iter().map(user_subject).collect())
    }

    async fn search_groups(&self, query: &str) -> AppResult<Vec<Subject>> {
        let filter = format!("startsWith(displayName,'{}')", escape_odata(query));
        let page: Page<GraphGroup> = self
            .get_json(
                "/groups",
                &[
                    ("$filter", filter.as_str()),
                    ("$select", "id,displayName,description"),
                    ("$top", "10"),
                ],
            )
            .await?;
        Ok(page.value.into_iter().map(group_subject).collect())
    }

    /// Managed devices have no server-side search, so pages are scanned
    /// until enough names or serial numbers match
    async fn search_devices(&self, query: &str) -> AppResult<Vec<Subject>> {
        let needle = query.to_lowercase();
        let matches = |device: &ManagedDevice| {
            [&device.device_name, &device.serial_number]
                .iter()
                .any(|v| v.as_deref().unwrap_or_default().to_lowercase().contains(&needle))
        };

        let mut found = Vec::new();
        let mut page: Page<ManagedDevice> = self
            .get_json(
                "/deviceManagement/managedDevices",
                &[("$select", DEVICE_FIELDS), ("$top", DEVICE_SCAN_PAGE_SIZE)],
            )
            .await?;

        loop {
            for device in page.value {
                if found.len() >= SEARCH_RESULT_LIMIT {
                    break;
                }
                if matches(&device) {
                    found.push(device_subject(device));
                }
            }

            let Some(link) = page.next_link else { break };
            if found.len() >= SEARCH_RESULT_LIMIT {
                break;
            }
            page = match self.get_json(&link, &[]).await {
                Ok(next) => next,
                Err(failure) => {
                    warn!(error = %failure.error, "Device scan stopped early");
                    break;
                }
            };
        }

        Ok(found)
    }
}

fn user_subject(user: GraphUser) -> Subject {
    let label = user
        .display_name
        .clone()
        .or_else(|| user.user_principal_name.clone())
        .unwrap_or_else(|| user.id.clone());
    let subject = Subject::user(user.id, label);
    match user.user_principal_name.or(user.mail) {
        Some(upn) => subject.with_subtitle(upn),
        None => subject,
    }
}

fn device_subject(device: ManagedDevice) -> Subject {
    let label = device.device_name.unwrap_or_else(|| device.id.clone());
    let subtitle: Vec<String> = [
        device.operating_system,
        device.serial_number,
        device.user_principal_name,
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect();

    let subject = Subject::device(device.id, label);
    if subtitle.is_empty() {
        subject
    } else {
        subject.with_subtitle(subtitle.join(" · "))
    }
}

fn group_subject(group: GraphGroup) -> Subject {
    let label = group.display_name.unwrap_or_else(|| group.id.clone());
    let subject = Subject::group(group.id, label);
    match group.description.filter(|d| !d.is_empty()) {
        Some(description) => subject.with_subtitle(description),
        None => subject,
    }
}

#[async_trait]
impl PolicySource for GraphClient {
    #[instrument(skip(self), fields(source = source.label()))]
    async fn fetch_collection(&self, source: SourceCollection) -> AppResult<Vec<Value>> {
        let records = match source {
            SourceCollection::DeviceConfigurations => {
                self.fetch_expanded("/deviceManagement/deviceConfigurations", false)
                    .await?
            }
            SourceCollection::CompliancePolicies => {
                self.fetch_expanded("/deviceManagement/deviceCompliancePolicies", false)
                    .await?
            }
            SourceCollection::MobileApps => self.fetch_mobile_apps().await?,
            SourceCollection::DeviceManagementScripts => {
                self.fetch_expanded("/deviceManagement/deviceManagementScripts", false)
                    .await?
            }
            SourceCollection::ConfigurationPolicies => {
                self.fetch_expanded("/deviceManagement/configurationPolicies", false)
                    .await?
            }
            SourceCollection::GroupPolicyConfigurations => {
                self.fetch_expanded("/deviceManagement/groupPolicyConfigurations", false)
                    .await?
            }
            SourceCollection::AppProtectionPolicies => self.fetch_app_protection().await?,
            SourceCollection::AppConfigurations => {
                self.fetch_expanded("/deviceAppManagement/mobileAppConfigurations", false)
                    .await?
            }
            SourceCollection::DeviceHealthScripts => {
                self.fetch_expanded("/deviceManagement/deviceHealthScripts", false)
                    .await?
            }
            SourceCollection::AutopilotProfiles => {
                self.fetch_expanded("/deviceManagement/windowsAutopilotDeploymentProfiles", false)
                    .await?
            }
            SourceCollection::EnrollmentConfigurations => {
                self.fetch_expanded("/deviceManagement/deviceEnrollmentConfigurations", false)
                    .await?
            }
            SourceCollection::CloudPcProvisioningPolicies => {
                self.fetch_expanded("/deviceManagement/virtualEndpoint/provisioningPolicies", true)
                    .await?
            }
            SourceCollection::CloudPcUserSettings => {
                self.fetch_expanded("/deviceManagement/virtualEndpoint/userSettings", true)
                    .await?
            }
            SourceCollection::Intents => {
                self.fetch_expanded("/deviceManagement/intents", false).await?
            }
        };

        debug!(count = records.len(), "Fetched collection");
        Ok(records)
    }
}

#[async_trait]
impl DirectorySource for GraphClient {
    #[instrument(skip(self))]
    async fn user_groups(&self, user_id: &str) -> AppResult<Vec<GroupRef>> {
        let path = format!("/users/{}/transitiveMemberOf", urlencoding::encode(user_id));
        self.group_memberships(&path).await
    }

    #[instrument(skip(self))]
    async fn device_directory_id(&self, managed_device_id: &str) -> AppResult<Option<String>> {
        let path = format!(
            "/deviceManagement/managedDevices/{}",
            urlencoding::encode(managed_device_id)
        );
        let device: ManagedDevice = self
            .get_json(&path, &[("$select", "id,azureADDeviceId")])
            .await?;
        Ok(device.azure_ad_device_id.filter(|id| !id.trim().is_empty()))
    }

    #[instrument(skip(self))]
    async fn device_groups(&self, directory_device_id: &str) -> AppResult<Vec<GroupRef>> {
        let path = format!(
            "/devices(deviceId='{}')/transitiveMemberOf",
            urlencoding::encode(directory_device_id)
        );
        self.group_memberships(&path).await
    }

    /// Chunks that fail are logged and skipped, so the map may be incomplete
    #[instrument(skip_all, fields(requested = group_ids.len()))]
    async fn resolve_group_names(&self, group_ids: &[String]) -> AppResult<HashMap<String, String>> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = group_ids.iter().filter(|id| seen.insert(*id)).collect();

        let mut names = HashMap::new();
        for chunk in unique.chunks(self.group_chunk_size) {
            let body = json!({ "ids": chunk, "types": ["group"] });
            match self
                .post_json::<Page<RawDirectoryObject>>("/directoryObjects/getByIds", &body)
                .await
            {
                Ok(page) => {
                    for object in page.value {
                        if let Some(name) = object.display_name {
                            names.insert(object.id, name);
                        }
                    }
                }
                Err(failure) => {
                    warn!(chunk_size = chunk.len(), error = %failure.error, "Failed to resolve group names");
                }
            }
        }

        debug!(resolved = names.len(), "Resolved group names");
        Ok(names)
    }

    #[instrument(skip(self))]
    async fn describe_subject(&self, subject_type: SubjectType, id: &str) -> AppResult<Subject> {
        let described = match subject_type {
            SubjectType::User => self.describe_user(id).await,
            SubjectType::Device => self.describe_device(id).await,
            SubjectType::Group => self.describe_group(id).await,
        };
        described.map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound(format!("{} {}", subject_type, id)),
            other => other,
        })
    }

    #[instrument(skip(self))]
    async fn search_subjects(&self, subject_type: SubjectType, query: &str) -> AppResult<Vec<Subject>> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LEN {
            return Ok(Vec::new());
        }
        match subject_type {
            SubjectType::User => self.search_users(query).await,
            SubjectType::Device => self.search_devices(query).await,
            SubjectType::Group => self.search_groups(query).await,
        }
    }
}

#[async_trait]
impl PolicyConfigSource for GraphClient {
    #[instrument(skip(self))]
    async fn fetch_policy_configuration(
        &self,
        policy_id: &str,
        category: PolicyCategory,
        odata_type_hint: Option<&str>,
    ) -> AppResult<Vec<ConfigItem>> {
        let endpoint = config_endpoint(policy_id, category, odata_type_hint);
        let response: Value = self.get_json(&endpoint.path, &[]).await?;
        Ok(endpoint.flattener.apply(&response))
    }
}
