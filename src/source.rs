//! Where raw resource records come from.
//!
//! A [`ResourceSource`] is decided once, when the manager is configured:
//! a literal list, an async function, or a remote endpoint. Resolving a
//! source never fails from the caller's point of view; a broken remote
//! source yields an empty list and reports through its error hooks.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ResourceConfig;
use crate::manager::ResourceError;
use crate::model::{DateRange, RawResource};

/// Resources produced by caller code, e.g. a database query.
#[async_trait]
pub trait ResourceFunction: Send + Sync {
    async fn resolve(&self, range: Option<DateRange>, timezone: Option<String>) -> Vec<RawResource>;
}

struct FnSource<F>(F);

#[async_trait]
impl<F> ResourceFunction for FnSource<F>
where
    F: Fn(Option<DateRange>, Option<String>) -> BoxFuture<'static, Vec<RawResource>> + Send + Sync,
{
    async fn resolve(&self, range: Option<DateRange>, timezone: Option<String>) -> Vec<RawResource> {
        (self.0)(range, timezone).await
    }
}

/// Transforms the parsed response body before it is used.
pub type SuccessHook = Arc<dyn Fn(Value) -> Value + Send + Sync>;
/// Told about a failed retrieval, with the raw body when there was one.
pub type ErrorHook = Arc<dyn Fn(&ResourceError, Option<&str>) + Send + Sync>;

struct Failure {
    error: ResourceError,
    body: Option<String>,
}

impl Failure {
    fn new(error: impl Into<ResourceError>, body: Option<String>) -> Self {
        Self {
            error: error.into(),
            body,
        }
    }
}

/// A remote endpoint answering with a JSON array of resources.
#[derive(Clone)]
pub struct RemoteSource {
    pub url: String,
    pub method: Method,
    /// Extra request parameters sent with every retrieval.
    pub params: Map<String, Value>,
    success: Vec<SuccessHook>,
    error: Vec<ErrorHook>,
}

impl fmt::Debug for RemoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSource")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("success_hooks", &self.success.len())
            .field("error_hooks", &self.error.len())
            .finish()
    }
}

impl RemoteSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            params: Map::new(),
            success: Vec::new(),
            error: Vec::new(),
        }
    }

    /// Read a `{ url, method?, data? }` descriptor. `None` without a url.
    pub fn from_descriptor(desc: &Map<String, Value>) -> Option<Self> {
        let url = desc.get("url")?.as_str()?;
        let mut source = Self::new(url);
        if let Some(method) = desc
            .get("method")
            .or_else(|| desc.get("type"))
            .and_then(Value::as_str)
            .and_then(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
        {
            source.method = method;
        }
        if let Some(Value::Object(data)) = desc.get("data") {
            source.params = data.clone();
        }
        Some(source)
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn on_success(mut self, hook: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.success.push(Arc::new(hook));
        self
    }

    pub fn on_error(
        mut self,
        hook: impl Fn(&ResourceError, Option<&str>) + Send + Sync + 'static,
    ) -> Self {
        self.error.push(Arc::new(hook));
        self
    }

    /// Extra params, then the range bounds and timezone when given.
    pub fn request_params(&self, range: Option<&DateRange>, config: &ResourceConfig) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), param_value(v)))
            .collect();
        if let Some(range) = range {
            params.push((config.start_param.clone(), config.format_date(range.start)));
            params.push((config.end_param.clone(), config.format_date(range.end)));
            if let Some(tz) = config.effective_timezone() {
                params.push((config.timezone_param.clone(), tz.to_owned()));
            }
        }
        params
    }

    pub async fn resolve(&self, client: &Client, range: Option<&DateRange>, config: &ResourceConfig) -> Vec<RawResource> {
        match self.retrieve(client, range, config).await {
            Ok(resources) => resources,
            Err(Failure { error, body }) => {
                warn!("resource source {} failed: {error}", self.url);
                metrics::counter!(crate::observability::SOURCE_FAILURES_TOTAL).increment(1);
                for hook in &self.error {
                    hook(&error, body.as_deref());
                }
                Vec::new()
            }
        }
    }

    async fn retrieve(
        &self,
        client: &Client,
        range: Option<&DateRange>,
        config: &ResourceConfig,
    ) -> Result<Vec<RawResource>, Failure> {
        let params = self.request_params(range, config);
        debug!("{} {}", self.method, self.url);

        let request = client.request(self.method.clone(), &self.url);
        let request = if self.method == Method::GET {
            request.query(&params)
        } else {
            request.form(&params)
        };

        let response = request.send().await.map_err(|e| Failure::new(e, None))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| Failure::new(e, None))?;
        if !status.is_success() {
            return Err(Failure::new(ResourceError::Status(status.as_u16()), Some(body)));
        }

        let mut payload: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => return Err(Failure::new(e, Some(body))),
        };
        for hook in &self.success {
            payload = hook(payload);
        }
        match payload {
            Value::Array(items) => Ok(records(items)),
            _ => Err(Failure::new(
                ResourceError::InvalidPayload("expected an array of resources"),
                Some(body),
            )),
        }
    }
}

fn param_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Keep the objects, skip anything else.
fn records(items: Vec<Value>) -> Vec<RawResource> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            other => {
                debug!("skipping non-object resource input: {other}");
                None
            }
        })
        .collect()
}

#[derive(Clone, Default)]
pub enum ResourceSource {
    /// Anything unrecognized. Always resolves to no resources.
    #[default]
    Empty,
    Static(Vec<RawResource>),
    Function(Arc<dyn ResourceFunction>),
    Remote(RemoteSource),
}

impl fmt::Debug for ResourceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceSource::Empty => f.write_str("Empty"),
            ResourceSource::Static(items) => write!(f, "Static({} resources)", items.len()),
            ResourceSource::Function(_) => f.write_str("Function"),
            ResourceSource::Remote(remote) => f.debug_tuple("Remote").field(remote).finish(),
        }
    }
}

impl ResourceSource {
    /// Wrap an async closure as a function source.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Option<DateRange>, Option<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<RawResource>> + Send + 'static,
    {
        let boxed = move |range: Option<DateRange>,
                          timezone: Option<String>|
              -> BoxFuture<'static, Vec<RawResource>> { Box::pin(f(range, timezone)) };
        ResourceSource::Function(Arc::new(FnSource(boxed)))
    }

    /// Pick a source from configuration JSON: an array is a literal list, a
    /// string is a URL, an object with a `url` is a remote descriptor.
    pub fn from_value(v: Value) -> Self {
        match v {
            Value::Array(items) => ResourceSource::Static(records(items)),
            Value::String(url) => ResourceSource::Remote(RemoteSource::new(url)),
            Value::Object(desc) => RemoteSource::from_descriptor(&desc)
                .map_or(ResourceSource::Empty, ResourceSource::Remote),
            _ => ResourceSource::Empty,
        }
    }

    /// True when resolving needs to suspend.
    pub fn is_async(&self) -> bool {
        matches!(self, ResourceSource::Function(_) | ResourceSource::Remote(_))
    }

    /// Resolve without suspending, for sources that allow it.
    pub fn resolve_now(&self) -> Option<Vec<RawResource>> {
        match self {
            ResourceSource::Empty => Some(Vec::new()),
            ResourceSource::Static(items) => Some(items.clone()),
            ResourceSource::Function(_) | ResourceSource::Remote(_) => None,
        }
    }

    pub async fn resolve(
        &self,
        client: &Client,
        range: Option<DateRange>,
        config: &ResourceConfig,
    ) -> Vec<RawResource> {
        match self {
            ResourceSource::Empty => Vec::new(),
            ResourceSource::Static(items) => items.clone(),
            ResourceSource::Function(f) => {
                f.resolve(range, config.effective_timezone().map(str::to_owned))
                    .await
            }
            ResourceSource::Remote(remote) => remote.resolve(client, range.as_ref(), config).await,
        }
    }
}

impl From<Vec<RawResource>> for ResourceSource {
    fn from(items: Vec<RawResource>) -> Self {
        ResourceSource::Static(items)
    }
}

impl From<&str> for ResourceSource {
    fn from(url: &str) -> Self {
        ResourceSource::Remote(RemoteSource::new(url))
    }
}

impl From<String> for ResourceSource {
    fn from(url: String) -> Self {
        ResourceSource::Remote(RemoteSource::new(url))
    }
}

impl From<RemoteSource> for ResourceSource {
    fn from(remote: RemoteSource) -> Self {
        ResourceSource::Remote(remote)
    }
}
