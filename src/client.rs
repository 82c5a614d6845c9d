use crate::response::canonical_header_name;
use crate::{Error, ErrorKind};
use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use http_body_util::Full;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

///
/// An outgoing HTTP request.
///
#[derive(Clone, Debug)]
pub struct Request {
    /// The absolute URL.
    pub url: String,
    /// The method.
    pub method: Method,
    /// The request headers.
    pub headers: HeaderMap,
    /// The request body, if any.
    pub body: Option<Bytes>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

impl Request {
    ///
    /// A `GET` request to `url`.
    ///
    pub fn new(url: impl Into<String>) -> Request {
        Request {
            url: url.into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    ///
    /// Builds the request a bare URL stands for under `options`. Only request-level options are
    /// carried over: `raise_error` is a client option and stays behind.
    ///
    pub fn from_url(url: impl Into<String>, options: &FetchOptions) -> Request {
        Request {
            url: url.into(),
            method: options.method.clone().unwrap_or(Method::GET),
            headers: options.headers.clone(),
            body: options.body.clone(),
            timeout: options.timeout,
        }
    }

    /// Sets the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

///
/// What a fetch is pointed at: either a bare URL or a fully built request.
///
#[derive(Clone, Debug)]
pub enum Target {
    /// A bare URL, turned into a request with the fetch options.
    Url(String),
    /// A complete request. Its own method wins over the fetch options.
    Request(Request),
}

impl Target {
    ///
    /// The request this target stands for under `options`.
    ///
    pub fn to_request(&self, options: &FetchOptions) -> Request {
        match self {
            Target::Url(url) => Request::from_url(url.as_str(), options),
            Target::Request(request) => request.clone(),
        }
    }
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Target::Url(value.to_string())
    }
}

impl From<String> for Target {
    fn from(value: String) -> Self {
        Target::Url(value)
    }
}

impl From<&[u8]> for Target {
    fn from(value: &[u8]) -> Self {
        Target::Url(String::from_utf8_lossy(value).into_owned())
    }
}

impl From<Request> for Target {
    fn from(value: Request) -> Self {
        Target::Request(value)
    }
}

///
/// Options passed along with a fetch.
///
#[derive(Clone, Debug)]
pub struct FetchOptions {
    /// The method used when the target is a bare URL. Defaults to `GET`.
    pub method: Option<Method>,
    /// Headers used when the target is a bare URL.
    pub headers: HeaderMap,
    /// Body used when the target is a bare URL.
    pub body: Option<Bytes>,
    /// Timeout used when the request doesn't set one.
    pub timeout: Option<Duration>,
    /// Whether the real client turns non-2xx responses into errors. Defaults to `true`.
    pub raise_error: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            method: None,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            raise_error: true,
        }
    }
}

impl FetchOptions {
    /// Default options: `GET`, no body, `raise_error` on.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets `raise_error`.
    pub fn raise_error(mut self, raise_error: bool) -> Self {
        self.raise_error = raise_error;
        self
    }
}

///
/// A complete HTTP response, as handed back by a fetch.
///
#[derive(Clone, Debug)]
pub struct HttpResponse {
    request: Request,
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Bytes,
    effective_url: String,
}

impl HttpResponse {
    ///
    /// Assembles a response to `request`. `effective_url` is the URL that was finally served,
    /// after redirects.
    ///
    pub fn new(
        request: Request,
        status: StatusCode,
        headers: Vec<(String, String)>,
        body: impl Into<Bytes>,
        effective_url: impl Into<String>,
    ) -> HttpResponse {
        HttpResponse {
            request,
            status,
            headers,
            body: body.into(),
            effective_url: effective_url.into(),
        }
    }

    /// The request this response answers.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The numeric status code.
    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }

    /// The headers, in the order they were received.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the value of the header `field`, ignoring the letter case of the name.
    pub fn header(&self, field: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, value)| value.as_str())
    }

    /// The raw body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body as text. Invalid UTF-8 sequences are replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserializes the body from JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|err| Error::new_with_context(ErrorKind::NotJson, err))
    }

    /// The body as a byte stream implementing `http_body::Body`.
    pub fn body_stream(&self) -> Full<Bytes> {
        Full::new(self.body.clone())
    }

    /// The URL that was finally served.
    pub fn effective_url(&self) -> &str {
        &self.effective_url
    }

    ///
    /// Returns an error if the status is not a 2xx.
    ///
    pub fn error_for_status(self) -> Result<HttpResponse, Error> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(Error::new_with_context(
                ErrorKind::Fetch,
                format!("HTTP {} for {}", self.status, self.effective_url),
            ))
        }
    }

    ///
    /// Converts into an `http::Response`. Header names are lowercased on the way.
    ///
    pub fn into_http(self) -> Result<http::Response<Full<Bytes>>, Error> {
        let mut builder = http::Response::builder().status(self.status);
        for (field, value) in &self.headers {
            builder = builder.header(field.as_str(), value.as_str());
        }

        builder
            .body(Full::new(self.body))
            .map_err(|err| Error::new_with_context(ErrorKind::ResponseBuild, err))
    }
}

///
/// An asynchronous HTTP fetch operation.
///
/// Implemented by the real client, by the interceptor and by any
/// `Fn(Target, FetchOptions) -> BoxFuture<..>` closure.
///
pub trait Fetch: Send + Sync {
    /// Performs the request pointed at by `target`.
    fn fetch(&self, target: Target, options: FetchOptions)
        -> BoxFuture<'static, Result<HttpResponse, Error>>;
}

impl<F> Fetch for F
where
    F: Fn(Target, FetchOptions) -> BoxFuture<'static, Result<HttpResponse, Error>> + Send + Sync,
{
    fn fetch(
        &self,
        target: Target,
        options: FetchOptions,
    ) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        self(target, options)
    }
}

///
/// A replaceable slot holding the fetch operation clients dispatch to.
///
/// Clones share the same slot: replacing the operation through one clone affects every client
/// built on any of them.
///
#[derive(Clone)]
pub struct FetchBinding {
    slot: Arc<RwLock<Arc<dyn Fetch>>>,
}

impl FetchBinding {
    /// A new slot holding `fetch`.
    pub fn new(fetch: impl Fetch + 'static) -> FetchBinding {
        let fetch: Arc<dyn Fetch> = Arc::new(fetch);
        FetchBinding {
            slot: Arc::new(RwLock::new(fetch)),
        }
    }

    ///
    /// The process-wide slot used by `Client::new` and `Interceptor::new`. It initially holds
    /// the real client.
    ///
    pub fn global() -> FetchBinding {
        static GLOBAL: OnceLock<FetchBinding> = OnceLock::new();
        GLOBAL
            .get_or_init(|| FetchBinding::new(RealFetch::new()))
            .clone()
    }

    /// The operation currently installed.
    pub fn current(&self) -> Arc<dyn Fetch> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `fetch` and returns the operation it replaced.
    pub fn replace(&self, fetch: Arc<dyn Fetch>) -> Arc<dyn Fetch> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, fetch)
    }

    ///
    /// Atomically installs the operation built by `wrap` around the current one. Returns the
    /// operation it replaced and the one it installed.
    ///
    pub(crate) fn wrap<F, W>(&self, wrap: W) -> (Arc<dyn Fetch>, Arc<dyn Fetch>)
    where
        F: Fetch + 'static,
        W: FnOnce(Arc<dyn Fetch>) -> Arc<F>,
    {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        let original = slot.clone();
        let installed: Arc<dyn Fetch> = wrap(original.clone());
        *slot = installed.clone();
        (original, installed)
    }

    ///
    /// Puts `original` back if the binding still holds `installed`. Returns `false`, leaving the
    /// binding untouched, when something else was installed since.
    ///
    pub(crate) fn restore(&self, installed: &Arc<dyn Fetch>, original: Arc<dyn Fetch>) -> bool {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if !Arc::ptr_eq(&*slot, installed) {
            return false;
        }
        *slot = original;
        true
    }

    /// Returns `true` if both bindings share the same slot.
    pub fn same_slot(&self, other: &FetchBinding) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for FetchBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FetchBinding(<fetch>)")
    }
}

///
/// An asynchronous HTTP client dispatching through a `FetchBinding`.
///
/// The binding is read on every call, so an interceptor started after the client was built
/// still takes effect.
///
/// ## Example
///
/// ```no_run
/// # async fn run() -> Result<(), flymock::Error> {
/// let client = flymock::Client::new();
/// let response = client.get("https://example.com/").await?;
/// println!("{}", response.text());
/// # Ok(())
/// # }
/// ```
///
#[derive(Clone, Debug)]
pub struct Client {
    binding: FetchBinding,
}

impl Client {
    /// A client dispatching through the process-wide binding.
    pub fn new() -> Client {
        Client {
            binding: FetchBinding::global(),
        }
    }

    /// A client dispatching through `binding`.
    pub fn with_binding(binding: FetchBinding) -> Client {
        Client { binding }
    }

    /// The binding this client dispatches through.
    pub fn binding(&self) -> &FetchBinding {
        &self.binding
    }

    /// Fetches `target` with `options`.
    pub fn fetch(
        &self,
        target: impl Into<Target>,
        options: FetchOptions,
    ) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        self.binding.current().fetch(target.into(), options)
    }

    /// Fetches `url` with the default options.
    pub fn get(&self, url: impl Into<Target>) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        self.fetch(url, FetchOptions::default())
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

///
/// The real fetch operation, performing network requests through `reqwest`.
///
#[derive(Clone, Debug, Default)]
pub struct RealFetch {
    client: reqwest::Client,
}

impl RealFetch {
    /// A fetch backed by a default `reqwest::Client`.
    pub fn new() -> RealFetch {
        Self::default()
    }

    /// A fetch backed by `client`.
    pub fn with_client(client: reqwest::Client) -> RealFetch {
        RealFetch { client }
    }
}

impl Fetch for RealFetch {
    fn fetch(
        &self,
        target: Target,
        options: FetchOptions,
    ) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        let client = self.client.clone();

        async move {
            let request = target.to_request(&options);
            log::debug!("fetching {} {}", request.method, request.url);

            let mut builder = client
                .request(request.method.clone(), request.url.as_str())
                .headers(request.headers.clone());
            if let Some(ref body) = request.body {
                builder = builder.body(body.clone());
            }
            if let Some(timeout) = request.timeout.or(options.timeout) {
                builder = builder.timeout(timeout);
            }

            let response = builder
                .send()
                .await
                .map_err(|err| {
                    if err.is_builder() {
                        Error::new_with_context(ErrorKind::InvalidUrl, err)
                    } else {
                        Error::new_with_context(ErrorKind::Fetch, err)
                    }
                })?;

            let status = response.status();
            let effective_url = response.url().to_string();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        canonical_header_name(name.as_str()),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|err| Error::new_with_context(ErrorKind::Fetch, err))?;

            let response = HttpResponse::new(request, status, headers, body, effective_url);
            if options.raise_error {
                response.error_for_status()
            } else {
                Ok(response)
            }
        }
        .boxed()
    }
}
