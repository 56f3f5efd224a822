use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::cache::ListQuery;
use crate::config::{ApiCredentials, Config, ErpConfig};

use super::api_types::{unwrap_envelope, ApiDocResponse, ApiErrorBody, ApiListResponse};
use super::types::Entity;

/// The remote calls the offline layer and the sync engine depend on.
///
/// Every call fails on network errors and non-2xx responses, and resolves
/// with parsed JSON otherwise.
pub trait RemoteClient: Send + Sync {
  /// List documents of `entity` matching `query`.
  fn get_list<'a>(&'a self, entity: Entity, query: &'a ListQuery)
    -> BoxFuture<'a, Result<Vec<Value>>>;

  /// Create one document of `entity` and return it as saved by the server.
  fn create<'a>(&'a self, entity: Entity, data: &'a Value) -> BoxFuture<'a, Result<Value>>;

  /// POST `data` to an arbitrary endpoint (absolute URL or site-relative path).
  fn post<'a>(&'a self, url: &'a str, data: &'a Value) -> BoxFuture<'a, Result<Value>>;

  /// Report a device location.
  fn post_location_data<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<Value>>;
}

/// ERPNext REST client.
#[derive(Clone)]
pub struct ErpClient {
  http: reqwest::Client,
  base: Url,
  page_length: u32,
  location_endpoint: String,
}

impl ErpClient {
  /// Build a client from config, reading credentials from the environment.
  pub fn from_config(config: &Config) -> Result<Self> {
    let credentials = Config::get_api_credentials()?;
    Self::new(&config.erp, credentials.as_ref())
  }

  pub fn new(settings: &ErpConfig, credentials: Option<&ApiCredentials>) -> Result<Self> {
    let mut base = Url::parse(&settings.url)
      .map_err(|e| eyre!("Invalid ERP url {}: {}", settings.url, e))?;
    // Url::join replaces the last segment unless the path ends with '/'
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(creds) = credentials {
      let mut value = HeaderValue::from_str(&format!("token {}:{}", creds.key, creds.secret))
        .map_err(|e| eyre!("Invalid API credentials: {}", e))?;
      value.set_sensitive(true);
      headers.insert(AUTHORIZATION, value);
    }

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .connect_timeout(settings.timeout())
      .timeout(settings.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      page_length: settings.page_length,
      location_endpoint: settings.location_endpoint.clone(),
    })
  }

  /// Resolve an absolute URL or a site-relative path.
  fn resolve(&self, url: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(url) {
      return Ok(absolute);
    }
    self
      .base
      .join(url.trim_start_matches('/'))
      .map_err(|e| eyre!("Invalid endpoint {}: {}", url, e))
  }

  fn resource_url(&self, entity: Entity) -> Result<Url> {
    self.resolve(&format!("api/resource/{}", entity.doctype()))
  }

  /// Check that the site answers. Used as the connectivity probe.
  pub async fn ping(&self) -> Result<()> {
    let url = self.resolve("api/method/ping")?;
    self.send(self.http.get(url)).await?;
    Ok(())
  }

  /// Send a request and parse the JSON body, turning non-2xx into errors.
  async fn send(&self, request: RequestBuilder) -> Result<Value> {
    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Request failed: {}", e))?;

    let status = response.status();
    let url = response.url().clone();
    let body = response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read response from {}: {}", url, e))?;

    if !status.is_success() {
      let detail = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|b| b.summary())
        .unwrap_or(body);
      return Err(eyre!("ERP {} returned {}: {}", url.path(), status, detail));
    }

    debug!(%url, %status, bytes = body.len(), "ERP response");

    if body.trim().is_empty() {
      return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| eyre!("Invalid JSON from {}: {}", url, e))
  }

  async fn fetch_list(&self, entity: Entity, query: &ListQuery) -> Result<Vec<Value>> {
    let url = self.resource_url(entity)?;
    let mut params: Vec<(&str, String)> =
      vec![("limit_page_length", self.page_length.to_string())];
    if !query.filters.is_null() {
      params.push(("filters", query.filters.to_string()));
    }
    if !query.fields.is_empty() {
      params.push(("fields", serde_json::to_string(&query.fields)?));
    }

    let body = self.send(self.http.get(url).query(&params)).await?;
    let list: ApiListResponse = serde_json::from_value(body)
      .map_err(|e| eyre!("Unexpected {} list response: {}", entity, e))?;
    Ok(list.data)
  }

  async fn create_doc(&self, entity: Entity, data: &Value) -> Result<Value> {
    let url = self.resource_url(entity)?;
    let body = self.send(self.http.post(url).json(data)).await?;
    let doc: ApiDocResponse = serde_json::from_value(body)
      .map_err(|e| eyre!("Unexpected {} create response: {}", entity, e))?;
    Ok(doc.data)
  }

  async fn post_json(&self, url: &str, data: &Value) -> Result<Value> {
    let url = self.resolve(url)?;
    let body = self.send(self.http.post(url).json(data)).await?;
    Ok(unwrap_envelope(body))
  }
}

impl RemoteClient for ErpClient {
  fn get_list<'a>(
    &'a self,
    entity: Entity,
    query: &'a ListQuery,
  ) -> BoxFuture<'a, Result<Vec<Value>>> {
    self.fetch_list(entity, query).boxed()
  }

  fn create<'a>(&'a self, entity: Entity, data: &'a Value) -> BoxFuture<'a, Result<Value>> {
    self.create_doc(entity, data).boxed()
  }

  fn post<'a>(&'a self, url: &'a str, data: &'a Value) -> BoxFuture<'a, Result<Value>> {
    self.post_json(url, data).boxed()
  }

  fn post_location_data<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<Value>> {
    self.post_json(&self.location_endpoint, payload).boxed()
  }
}
