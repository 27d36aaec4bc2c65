// # Cloudflare DNS Provider
//
// Cloudflare implementation of the dnssync provider traits, on top of the
// Cloudflare API v4.
//
// ## Scope
//
// - Public zones only; private zones and VPC association are reported as
//   `Error::NotSupported`
// - Simple routing only (Cloudflare has no per-record traffic policies)
// - One HTTP request per trait call, plus pagination for listings
// - No retries, no caching, no background tasks: failures go back to the
//   zone state machine
//
// ## Account configuration
//
// The cloud account's `config` carries:
//
// - `api_token` (required): token with Zone:Edit and DNS:Edit permissions
// - `account_id` (optional): Cloudflare account id, needed to create zones
//
// ## Record mapping
//
// Cloudflare record names are fully qualified; they are made relative to
// the zone ("@" for the apex). Record types with a priority carry it as the
// first word of the value ("10 mx.example.com." for MX, "10 5 5060
// sip.example.com." for SRV). TTL 1 is Cloudflare's "automatic".
//
// ## API Reference
//
// - List / create zones: GET / POST `/zones`
// - Zone details / delete: GET / DELETE `/zones/:zone_id`
// - Record sets: GET / POST `/zones/:zone_id/dns_records`
// - One record set: PUT / DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use dnssync_core::model::{CloudAccount, DnsRecordSet, DnsType, PolicyParams, PolicyType, VpcRef, ZoneType};
use dnssync_core::traits::{
    CloudDnsRecordSet, CloudDnsZone, DnsCapabilities, DnsProvider, DnsProviderFactory, ZoneCreateOptions,
};
use dnssync_core::{Error, ProviderRegistry, Result};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Registry name of the provider
pub const PROVIDER_NAME: &str = "cloudflare";

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for zone and record listings (API maximum)
const PAGE_SIZE: u32 = 100;

/// Record types Cloudflare can host
const SUPPORTED_TYPES: [DnsType; 9] = [
    DnsType::A,
    DnsType::AAAA,
    DnsType::CAA,
    DnsType::CNAME,
    DnsType::MX,
    DnsType::NS,
    DnsType::PTR,
    DnsType::SRV,
    DnsType::TXT,
];

/// Static capabilities: public zones, simple routing
pub fn capabilities() -> DnsCapabilities {
    let mut caps = DnsCapabilities {
        zone_types: vec![ZoneType::PublicZone],
        ..Default::default()
    };
    caps.dns_types.insert(ZoneType::PublicZone, SUPPORTED_TYPES.to_vec());
    caps.policy_types
        .insert(ZoneType::PublicZone, vec![PolicyType::Simple]);
    caps
}

/// Credentials read from a cloud account's `config`
#[derive(Debug, Clone, Deserialize)]
struct AccountSettings {
    #[serde(default)]
    api_token: String,
    #[serde(default)]
    account_id: Option<String>,
}

/// Authenticated HTTP client shared by a provider and its zone handles
struct CloudflareApi {
    /// ⚠️ NEVER log this value
    api_token: String,
    account_id: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareApi")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ZoneInfo {
    id: String,
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    name_servers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RecordInfo {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    priority: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

impl CloudflareApi {
    fn new(api_token: String, account_id: Option<String>, base_url: impl Into<String>) -> Result<Self> {
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token is required"));
        }

        // Build HTTP client with timeout
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            account_id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Send one request and unwrap the API envelope
    ///
    /// # Returns
    ///
    /// - `Ok(Envelope)`: the call succeeded
    /// - `Err(Error::NotFound)`: HTTP 404
    /// - `Err(Error::Provider)`: any other failure, with the HTTP status
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Envelope<T>> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("Cloudflare {} {}", method, path);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, path, &error_text));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("Failed to parse response: {}", e)))?;
        if !envelope.success {
            return Err(Error::provider(PROVIDER_NAME, format!("{} failed: {}", path, describe(&envelope.errors))));
        }
        Ok(envelope)
    }

    /// [`CloudflareApi::call`] for endpoints that must return a result
    async fn fetch<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<&Value>) -> Result<T> {
        self.call(method, path, &[], body)
            .await?
            .result
            .ok_or_else(|| Error::provider(PROVIDER_NAME, format!("Invalid response format: {} has no result", path)))
    }

    /// Collect every page of a listing
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let query = [("page", page.to_string()), ("per_page", PAGE_SIZE.to_string())];
            let envelope: Envelope<Vec<T>> = self.call(Method::GET, path, &query, None).await?;
            items.extend(envelope.result.unwrap_or_default());

            let total_pages = envelope.result_info.map_or(1, |info| info.total_pages);
            if page >= total_pages {
                return Ok(items);
            }
            page += 1;
        }
    }
}

/// Map an HTTP failure onto the error the engine expects
fn status_error(status: StatusCode, path: &str, error_text: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::provider(
            PROVIDER_NAME,
            format!(
                "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
                status
            ),
        ),
        404 => Error::not_found(format!("Cloudflare object not found: {}", path)),
        409 => Error::provider(
            PROVIDER_NAME,
            format!("Conflict: {} - {}", status, error_text),
        ),
        429 => Error::provider(
            PROVIDER_NAME,
            format!("Rate limit exceeded. Please retry later. Status: {}", status),
        ),
        500..=599 => Error::provider(
            PROVIDER_NAME,
            format!("Cloudflare server error (transient): {} - {}", status, error_text),
        ),
        _ => Error::provider(
            PROVIDER_NAME,
            format!("{} failed: {} - {}", path, status, error_text),
        ),
    }
}

fn describe(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "unknown error".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Record name relative to the zone
fn relative_name(fqdn: &str, zone: &str) -> String {
    let fqdn = fqdn.trim_end_matches('.');
    if fqdn.eq_ignore_ascii_case(zone) {
        return "@".to_string();
    }
    match fqdn.strip_suffix(zone).and_then(|rest| rest.strip_suffix('.')) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => fqdn.to_string(),
    }
}

/// Fully qualified record name
fn absolute_name(name: &str, zone: &str) -> String {
    if name.is_empty() || name == "@" {
        zone.to_string()
    } else {
        format!("{}.{}", name, zone)
    }
}

fn parse_type(record_type: &str) -> Option<DnsType> {
    SUPPORTED_TYPES
        .iter()
        .copied()
        .find(|t| t.as_str().eq_ignore_ascii_case(record_type))
}

/// Split "priority rest" as used for MX and SRV values
fn split_priority(value: &str) -> Result<(u16, &str)> {
    let (priority, rest) = value
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(|| Error::invalid_input(format!("expected \"<priority> <value>\", got {:?}", value)))?;
    let priority = priority
        .parse()
        .map_err(|_| Error::invalid_input(format!("invalid priority in {:?}", value)))?;
    Ok((priority, rest.trim()))
}

/// Split a CAA value into flags, tag and the unquoted value
///
/// Cloudflare reports the value quoted and takes it unquoted; record sets
/// carry it unquoted in both directions.
fn caa_parts(value: &str) -> Result<(u8, &str, &str)> {
    let parts: Vec<&str> = value.trim().splitn(3, ' ').collect();
    let [flags, tag, rest] = parts.as_slice() else {
        return Err(Error::invalid_input(format!("expected \"<flags> <tag> <value>\", got {:?}", value)));
    };
    let flags: u8 = flags
        .parse()
        .map_err(|_| Error::invalid_input(format!("invalid CAA flags in {:?}", value)))?;
    Ok((flags, *tag, rest.trim().trim_matches('"')))
}

/// Request body for creating or overwriting a record
fn record_body(record: &DnsRecordSet, zone: &str) -> Result<Value> {
    if !record.enabled {
        return Err(Error::not_supported("Cloudflare cannot host disabled record sets"));
    }
    if record.policy_type != PolicyType::Simple {
        return Err(Error::not_supported(format!(
            "Cloudflare does not support {} routing",
            record.policy_type
        )));
    }

    let mut body = json!({
        "type": record.dns_type.as_str(),
        "name": absolute_name(&record.name, zone),
        "ttl": record.ttl,
    });

    match record.dns_type {
        DnsType::MX => {
            let (priority, host) = split_priority(&record.value)?;
            body["content"] = json!(host);
            body["priority"] = json!(priority);
        }
        DnsType::SRV => {
            let (priority, rest) = split_priority(&record.value)?;
            let parts: Vec<&str> = rest.split_whitespace().collect();
            let [weight, port, target] = parts.as_slice() else {
                return Err(Error::invalid_input(format!(
                    "expected \"<priority> <weight> <port> <target>\", got {:?}",
                    record.value
                )));
            };
            let weight: u16 = weight
                .parse()
                .map_err(|_| Error::invalid_input(format!("invalid SRV weight in {:?}", record.value)))?;
            let port: u16 = port
                .parse()
                .map_err(|_| Error::invalid_input(format!("invalid SRV port in {:?}", record.value)))?;
            body["data"] = json!({
                "priority": priority,
                "weight": weight,
                "port": port,
                "target": target,
            });
        }
        DnsType::CAA => {
            let (flags, tag, value) = caa_parts(&record.value)?;
            body["data"] = json!({
                "flags": flags,
                "tag": tag,
                "value": value,
            });
        }
        _ => body["content"] = json!(record.value),
    }

    Ok(body)
}

/// A record as Cloudflare reports it
#[derive(Debug, Clone)]
struct CloudflareRecord {
    id: String,
    name: String,
    dns_type: DnsType,
    value: String,
    ttl: u32,
}

impl CloudflareRecord {
    /// Normalize an API record; `None` for types the engine does not sync
    fn from_api(record: RecordInfo, zone: &str) -> Option<Self> {
        let dns_type = parse_type(&record.record_type)?;
        let value = match (dns_type, record.priority) {
            (DnsType::MX | DnsType::SRV, Some(priority)) => format!("{} {}", priority, record.content),
            (DnsType::CAA, _) => caa_parts(&record.content)
                .map(|(flags, tag, value)| format!("{} {} {}", flags, tag, value))
                .unwrap_or(record.content),
            _ => record.content,
        };
        Some(Self {
            id: record.id,
            name: relative_name(&record.name, zone),
            dns_type,
            value,
            ttl: record.ttl,
        })
    }
}

impl CloudDnsRecordSet for CloudflareRecord {
    fn external_id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn dns_type(&self) -> DnsType {
        self.dns_type
    }

    fn value(&self) -> String {
        self.value.clone()
    }

    fn ttl(&self) -> u32 {
        self.ttl
    }

    fn status(&self) -> String {
        "available".to_string()
    }

    fn enabled(&self) -> bool {
        true
    }

    fn policy_type(&self) -> PolicyType {
        PolicyType::Simple
    }

    fn policy_params(&self) -> Option<PolicyParams> {
        None
    }
}

/// One Cloudflare zone
pub struct CloudflareZone {
    api: Arc<CloudflareApi>,
    info: ZoneInfo,
}

impl CloudflareZone {
    fn records_path(&self) -> String {
        format!("/zones/{}/dns_records", self.info.id)
    }

    fn record_path(&self, record: &DnsRecordSet) -> Result<String> {
        let record_id = record
            .external_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::missing_parameter(format!("external id of record set {}", record)))?;
        Ok(format!("{}/{}", self.records_path(), record_id))
    }
}

#[async_trait]
impl CloudDnsZone for CloudflareZone {
    fn external_id(&self) -> String {
        self.info.id.clone()
    }

    fn name(&self) -> String {
        self.info.name.clone()
    }

    fn zone_type(&self) -> ZoneType {
        ZoneType::PublicZone
    }

    fn status(&self) -> String {
        self.info.status.clone()
    }

    fn options(&self) -> Option<Value> {
        (!self.info.name_servers.is_empty()).then(|| json!({ "name_servers": self.info.name_servers }))
    }

    async fn list_vpcs(&self) -> Result<Vec<VpcRef>> {
        Ok(Vec::new())
    }

    async fn list_record_sets(&self) -> Result<Vec<Box<dyn CloudDnsRecordSet>>> {
        let records: Vec<RecordInfo> = self.api.list_all(&self.records_path()).await?;
        let total = records.len();
        let records: Vec<Box<dyn CloudDnsRecordSet>> = records
            .into_iter()
            .filter_map(|r| CloudflareRecord::from_api(r, &self.info.name))
            .map(|r| Box::new(r) as Box<dyn CloudDnsRecordSet>)
            .collect();
        if records.len() != total {
            tracing::debug!(
                "Skipped {} records of unsupported types in zone {}",
                total - records.len(),
                self.info.name
            );
        }
        Ok(records)
    }

    async fn create_record_set(&self, record: &DnsRecordSet) -> Result<String> {
        let body = record_body(record, &self.info.name)?;
        let created: Created = self.api.fetch(Method::POST, &self.records_path(), Some(&body)).await?;
        tracing::info!("Created Cloudflare record {} in {} as {}", record, self.info.name, created.id);
        Ok(created.id)
    }

    async fn update_record_set(&self, record: &DnsRecordSet) -> Result<()> {
        let path = self.record_path(record)?;
        let body = record_body(record, &self.info.name)?;
        let _: Value = self.api.fetch(Method::PUT, &path, Some(&body)).await?;
        tracing::info!("Updated Cloudflare record {} in {}", record, self.info.name);
        Ok(())
    }

    async fn remove_record_set(&self, record: &DnsRecordSet) -> Result<()> {
        let path = self.record_path(record)?;
        let _: Envelope<Value> = self.api.call(Method::DELETE, &path, &[], None).await?;
        tracing::info!("Removed Cloudflare record {} from {}", record, self.info.name);
        Ok(())
    }

    async fn add_vpc(&self, _vpc: &VpcRef) -> Result<()> {
        Err(Error::not_supported("Cloudflare zones cannot be associated with VPCs"))
    }

    async fn remove_vpc(&self, _vpc: &VpcRef) -> Result<()> {
        Err(Error::not_supported("Cloudflare zones cannot be associated with VPCs"))
    }

    async fn delete(&self) -> Result<()> {
        let path = format!("/zones/{}", self.info.id);
        let _: Envelope<Value> = self.api.call(Method::DELETE, &path, &[], None).await?;
        tracing::info!("Deleted Cloudflare zone {} ({})", self.info.name, self.info.id);
        Ok(())
    }
}

/// Cloudflare DNS provider for one account
///
/// Stateless apart from the HTTP client; every call is a single API
/// round trip (listings follow pagination).
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API token.
#[derive(Debug)]
pub struct CloudflareProvider {
    api: Arc<CloudflareApi>,
}

impl CloudflareProvider {
    /// Create a provider talking to the public Cloudflare API
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:Edit and DNS:Edit permissions
    /// - `account_id`: Cloudflare account id, required by `create_zone`
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)` if the token is empty
    pub fn new(api_token: impl Into<String>, account_id: Option<String>) -> Result<Self> {
        Self::with_base_url(api_token, account_id, CLOUDFLARE_API_BASE)
    }

    /// Create a provider talking to another API endpoint (proxies, tests)
    pub fn with_base_url(
        api_token: impl Into<String>,
        account_id: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            api: Arc::new(CloudflareApi::new(api_token.into(), account_id, base_url)?),
        })
    }

    fn zone(&self, info: ZoneInfo) -> Box<dyn CloudDnsZone> {
        Box::new(CloudflareZone {
            api: Arc::clone(&self.api),
            info,
        })
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> DnsCapabilities {
        capabilities()
    }

    async fn list_zones(&self) -> Result<Vec<Box<dyn CloudDnsZone>>> {
        let zones: Vec<ZoneInfo> = self.api.list_all("/zones").await?;
        tracing::debug!("Cloudflare account has {} zones", zones.len());
        Ok(zones.into_iter().map(|info| self.zone(info)).collect())
    }

    async fn get_zone(&self, external_id: &str) -> Result<Box<dyn CloudDnsZone>> {
        let info: ZoneInfo = self
            .api
            .fetch(Method::GET, &format!("/zones/{}", external_id), None)
            .await?;
        Ok(self.zone(info))
    }

    async fn create_zone(&self, opts: &ZoneCreateOptions) -> Result<Box<dyn CloudDnsZone>> {
        if opts.zone_type != ZoneType::PublicZone {
            return Err(Error::not_supported(format!("Cloudflare cannot host a {}", opts.zone_type)));
        }
        let account_id = self
            .api
            .account_id
            .as_deref()
            .ok_or_else(|| Error::config("Cloudflare account_id is required to create zones"))?;

        let body = json!({
            "name": opts.name,
            "account": { "id": account_id },
            "type": "full",
        });
        let info: ZoneInfo = self.api.fetch(Method::POST, "/zones", Some(&body)).await?;
        tracing::info!("Created Cloudflare zone {} ({})", info.name, info.id);
        Ok(self.zone(info))
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, account: &CloudAccount) -> Result<Box<dyn DnsProvider>> {
        let settings: AccountSettings = serde_json::from_value(account.config.clone())
            .map_err(|e| Error::config(format!("Invalid Cloudflare settings for account {}: {}", account.name, e)))?;
        if settings.api_token.is_empty() {
            return Err(Error::config(format!(
                "Cloudflare API token is required for account {}",
                account.name
            )));
        }
        Ok(Box::new(CloudflareProvider::new(settings.api_token, settings.account_id)?))
    }

    fn capabilities(&self) -> DnsCapabilities {
        capabilities()
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use dnssync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// dnssync_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(config: Value) -> CloudAccount {
        CloudAccount {
            id: "acct-1".to_string(),
            name: "cf".to_string(),
            provider: PROVIDER_NAME.to_string(),
            config,
        }
    }

    fn api_record(record_type: &str, name: &str, content: &str, priority: Option<u16>) -> RecordInfo {
        RecordInfo {
            id: "rec-1".to_string(),
            record_type: record_type.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            ttl: 300,
            priority,
        }
    }

    #[test]
    fn test_factory_reads_account_config() {
        let factory = CloudflareFactory;
        let provider = factory.create(&account(json!({
            "type": "cloudflare",
            "api_token": "test_token",
            "account_id": "cf-account"
        })));
        assert!(provider.is_ok());
        assert_eq!(provider.map(|p| p.provider_name()).ok(), Some(PROVIDER_NAME));
    }

    #[test]
    fn test_factory_missing_token() {
        let factory = CloudflareFactory;
        assert!(matches!(factory.create(&account(json!({}))), Err(Error::Config(_))));
        assert!(matches!(
            factory.create(&account(json!({ "api_token": "" }))),
            Err(Error::Config(_))
        ));
        assert!(matches!(CloudflareProvider::new("", None), Err(Error::Config(_))));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = CloudflareProvider::new("secret_token_12345", None).unwrap();
        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("<REDACTED>"));
    }

    #[test]
    fn test_capabilities() {
        let caps = capabilities();
        assert!(caps.supports_zone_type(ZoneType::PublicZone));
        assert!(!caps.supports_zone_type(ZoneType::PrivateZone));
        assert!(caps.supports_dns_type(ZoneType::PublicZone, DnsType::MX));
        assert!(!caps.supports_dns_type(ZoneType::PublicZone, DnsType::SOA));
        assert!(caps.supports_policy_type(ZoneType::PublicZone, PolicyType::Simple));
        assert!(!caps.supports_policy_type(ZoneType::PublicZone, PolicyType::Weighted));
    }

    #[test]
    fn test_record_names() {
        assert_eq!(relative_name("example.com", "example.com"), "@");
        assert_eq!(relative_name("www.example.com.", "example.com"), "www");
        assert_eq!(relative_name("a.b.example.com", "example.com"), "a.b");
        assert_eq!(relative_name("other.org", "example.com"), "other.org");
        assert_eq!(absolute_name("@", "example.com"), "example.com");
        assert_eq!(absolute_name("www", "example.com"), "www.example.com");
    }

    #[test]
    fn test_mx_priority_round_trip() {
        let record = CloudflareRecord::from_api(
            api_record("MX", "example.com", "mx.example.com", Some(10)),
            "example.com",
        )
        .unwrap();
        assert_eq!(record.name, "@");
        assert_eq!(record.value, "10 mx.example.com");

        let normalized = DnsRecordSet::from_cloud(&record);
        let body = record_body(&normalized, "example.com").unwrap();
        assert_eq!(body["priority"], 10);
        assert_eq!(body["content"], "mx.example.com");
        assert_eq!(body["name"], "example.com");
    }

    #[test]
    fn test_structured_record_bodies() {
        let srv = DnsRecordSet::new("_sip._tcp", DnsType::SRV, "10 5 5060 sip.example.com", 300);
        let body = record_body(&srv, "example.com").unwrap();
        assert_eq!(body["data"]["port"], 5060);
        assert_eq!(body["data"]["target"], "sip.example.com");

        let caa = DnsRecordSet::new("@", DnsType::CAA, "0 issue \"letsencrypt.org\"", 300);
        let body = record_body(&caa, "example.com").unwrap();
        assert_eq!(body["data"]["tag"], "issue");
        assert_eq!(body["data"]["value"], "letsencrypt.org");

        let bad = DnsRecordSet::new("@", DnsType::MX, "mx.example.com", 300);
        assert!(matches!(record_body(&bad, "example.com"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_caa_value_reads_back_as_written() {
        let local = DnsRecordSet::new("@", DnsType::CAA, "0 issue letsencrypt.org", 300);
        let body = record_body(&local, "example.com").unwrap();
        assert_eq!(body["data"]["value"], "letsencrypt.org");

        let remote = CloudflareRecord::from_api(
            api_record("CAA", "example.com", "0 issue \"letsencrypt.org\"", None),
            "example.com",
        )
        .unwrap();
        assert_eq!(remote.value(), local.value);
        assert_eq!(remote.name(), local.name);

        let odd = CloudflareRecord::from_api(api_record("CAA", "example.com", "issue", None), "example.com").unwrap();
        assert_eq!(odd.value(), "issue");
    }

    #[test]
    fn test_unhostable_records_rejected() {
        let disabled = DnsRecordSet::new("www", DnsType::A, "1.2.3.4", 300).with_enabled(false);
        assert!(matches!(record_body(&disabled, "example.com"), Err(Error::NotSupported(_))));

        let weighted = DnsRecordSet::new("www", DnsType::A, "1.2.3.4", 300)
            .with_policy(PolicyType::Weighted, Some(PolicyParams::new().with("weight", 10)));
        assert!(matches!(record_body(&weighted, "example.com"), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_unsupported_types_skipped() {
        assert!(CloudflareRecord::from_api(api_record("HTTPS", "example.com", "1 .", None), "example.com").is_none());
        assert!(CloudflareRecord::from_api(api_record("aaaa", "v6.example.com", "::1", None), "example.com").is_some());
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::NOT_FOUND, "/zones/z1", "").is_not_found());
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "/zones", "");
        assert!(err.to_string().contains("Rate limit"));
        let err = status_error(StatusCode::FORBIDDEN, "/zones", "");
        assert!(err.to_string().contains("Authentication failed"));
    }

    #[test]
    fn test_envelope_parsing() {
        let envelope: Envelope<Vec<ZoneInfo>> = serde_json::from_value(json!({
            "success": true,
            "errors": [],
            "result": [{ "id": "z1", "name": "example.com", "status": "active", "name_servers": ["a.ns.cloudflare.com"] }],
            "result_info": { "page": 1, "per_page": 100, "total_pages": 1 }
        }))
        .unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.result.unwrap()[0].name, "example.com");
        assert_eq!(envelope.result_info.unwrap().total_pages, 1);

        let failed: Envelope<Value> = serde_json::from_value(json!({
            "success": false,
            "errors": [{ "code": 1061, "message": "zone already exists" }],
            "result": null
        }))
        .unwrap();
        assert_eq!(describe(&failed.errors), "zone already exists (1061)");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_provider_error() {
        let provider = CloudflareProvider::with_base_url("test_token", None, "http://127.0.0.1:9").unwrap();
        match provider.list_zones().await {
            Err(Error::Provider { provider, message }) => {
                assert_eq!(provider, PROVIDER_NAME);
                assert!(message.contains("HTTP request failed"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("listing zones against a closed port succeeded"),
        }
    }

    #[tokio::test]
    async fn test_create_zone_requirements() {
        let opts = |zone_type| ZoneCreateOptions {
            name: "example.com".to_string(),
            zone_type,
            vpcs: Vec::new(),
            options: None,
        };
        let provider = CloudflareProvider::with_base_url("test_token", None, "http://127.0.0.1:9").unwrap();
        assert!(matches!(
            provider.create_zone(&opts(ZoneType::PrivateZone)).await,
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(
            provider.create_zone(&opts(ZoneType::PublicZone)).await,
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_register() {
        let registry = ProviderRegistry::new();
        register(&registry);
        assert!(registry.has_provider(PROVIDER_NAME));
        assert!(registry.capabilities(PROVIDER_NAME).is_ok());
    }
}
