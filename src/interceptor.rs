use crate::client::{Fetch, FetchBinding, FetchOptions, HttpResponse, Target};
use crate::hooks::{HookGuard, HookRegistry};
use crate::loader::FixtureStore;
use crate::response::Response;
use crate::Error;
use futures_util::future::{self, BoxFuture, FutureExt};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

///
/// Serves the requests matching a fixture directory locally and lets every other request
/// through to the fetch operation it replaced.
///
/// An interceptor starts idle. `start` installs it on its `FetchBinding`, `stop` (or dropping
/// it) puts the original operation back. Interceptors sharing a binding may be stopped in any
/// order: one stopped while a later one is still installed stops serving fixtures at once and
/// lets every request through.
///
/// ## Example
///
/// ```no_run
/// use flymock::{Client, Interceptor};
/// use serde_json::json;
///
/// # async fn run() -> Result<(), flymock::Error> {
/// let mut interceptor = Interceptor::new("tests/__mock__")?;
/// interceptor.start();
///
/// let client = Client::new();
/// let response = client.get("http://example.com/json").await?;
/// assert_eq!(br#"{"code": 2}"#, &response.body()[..]);
///
/// {
///     let _patch = interceptor.patch_json(json!({"code": 3}));
///     let response = client.get("http://example.com/json").await?;
///     assert_eq!(br#"{"code": 3}"#, &response.body()[..]);
/// }
///
/// interceptor.stop();
/// # Ok(())
/// # }
/// ```
///
pub struct Interceptor {
    store: Arc<FixtureStore>,
    binding: FetchBinding,
    hooks: HookRegistry,
    installed: Option<Installed>,
}

// What `start` put on the binding, and what it replaced.
struct Installed {
    fetch: Arc<dyn Fetch>,
    original: Arc<dyn Fetch>,
    active: Arc<AtomicBool>,
}

impl Interceptor {
    ///
    /// Loads the fixtures in `dir`, to be served in place of the process-wide fetch operation
    /// (see `FetchBinding::global`).
    ///
    pub fn new(dir: impl AsRef<Path>) -> Result<Interceptor, Error> {
        Self::with_binding(dir, FetchBinding::global())
    }

    ///
    /// Loads the fixtures in `dir`, to be served in place of the operation held by `binding`.
    ///
    pub fn with_binding(dir: impl AsRef<Path>, binding: FetchBinding) -> Result<Interceptor, Error> {
        let store = FixtureStore::new(dir)?;

        Ok(Interceptor {
            store: Arc::new(store),
            binding,
            hooks: HookRegistry::default(),
            installed: None,
        })
    }

    /// The loaded fixtures.
    pub fn store(&self) -> &FixtureStore {
        &self.store
    }

    /// The binding this interceptor installs itself on.
    pub fn binding(&self) -> &FetchBinding {
        &self.binding
    }

    /// Returns `true` between `start` and `stop`.
    pub fn is_active(&self) -> bool {
        self.installed.is_some()
    }

    ///
    /// Installs the interceptor on its binding, capturing the operation it replaces for
    /// fallthrough.
    ///
    pub fn start(&mut self) {
        if self.is_active() {
            log::warn!(
                "Interceptor for {} is already started",
                self.store.dir().display()
            );
            return;
        }

        let store = self.store.clone();
        let hooks = self.hooks.clone();
        let active = Arc::new(AtomicBool::new(true));
        let layer_active = active.clone();
        let (original, fetch) = self.binding.wrap(move |original| {
            Arc::new(InterceptingFetch {
                store,
                hooks,
                original,
                active: layer_active,
            })
        });

        log::debug!("intercepting fetches with {}", self.store.dir().display());
        self.installed = Some(Installed {
            fetch,
            original,
            active,
        });
    }

    ///
    /// Restores the operation captured by `start`. Does nothing when idle.
    ///
    /// When another interceptor was started on the same binding after this one and is still
    /// installed, the binding is left alone and this interceptor's layer only passes requests
    /// through from now on.
    ///
    pub fn stop(&mut self) {
        let Some(installed) = self.installed.take() else {
            return;
        };

        installed.active.store(false, Ordering::SeqCst);
        if self.binding.restore(&installed.fetch, installed.original) {
            log::debug!("stopped intercepting with {}", self.store.dir().display());
        } else {
            log::debug!(
                "stopped intercepting with {}, a later interceptor still wraps it",
                self.store.dir().display()
            );
        }
    }

    ///
    /// Registers `hook` to run on every matched response until the returned guard is dropped.
    /// Hooks run in registration order. An error returned by a hook is returned by the fetch.
    ///
    /// Hooks may be registered while idle: they apply once the interceptor is started.
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # let interceptor = flymock::Interceptor::new("tests/__mock__").unwrap();
    /// let _guard = interceptor.dynamic_hook(|response| {
    ///     response.headers.push(("X-Hooked".into(), "1".into()));
    ///     Ok(())
    /// });
    /// ```
    ///
    pub fn dynamic_hook<F>(&self, hook: F) -> HookGuard
    where
        F: Fn(&mut Response) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.hooks.register(Arc::new(hook))
    }

    ///
    /// Registers a hook merging `data` into the JSON object body of every matched response until
    /// the returned guard is dropped. Matched responses without such a body fail with
    /// `ErrorKind::NotJson`.
    ///
    pub fn patch_json(&self, data: serde_json::Value) -> HookGuard {
        self.dynamic_hook(move |response| response.patch_json(&data))
    }

    /// The number of registered hooks.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    ///
    /// Serves `target` from the fixtures, running the registered hooks. Returns `Ok(None)` when
    /// no fixture matches.
    ///
    pub fn intercept(
        &self,
        target: &Target,
        options: &FetchOptions,
    ) -> Result<Option<HttpResponse>, Error> {
        intercept(&self.store, &self.hooks, target, options)
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        if self.is_active() {
            log::warn!(
                "Interceptor for {} dropped while started, restoring the original fetch",
                self.store.dir().display()
            );
            self.stop();
        }
    }
}

struct InterceptingFetch {
    store: Arc<FixtureStore>,
    hooks: HookRegistry,
    original: Arc<dyn Fetch>,
    active: Arc<AtomicBool>,
}

impl Fetch for InterceptingFetch {
    fn fetch(
        &self,
        target: Target,
        options: FetchOptions,
    ) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        if !self.active.load(Ordering::SeqCst) {
            return self.original.fetch(target, options);
        }

        match intercept(&self.store, &self.hooks, &target, &options) {
            Ok(Some(response)) => future::ready(Ok(response)).boxed(),
            Ok(None) => self.original.fetch(target, options),
            Err(err) => future::ready(Err(err)).boxed(),
        }
    }
}

fn intercept(
    store: &FixtureStore,
    hooks: &HookRegistry,
    target: &Target,
    options: &FetchOptions,
) -> Result<Option<HttpResponse>, Error> {
    let request = target.to_request(options);

    let Some(mut response) = store.find(&request.url, request.method.as_str())? else {
        log::debug!("no fixture for {} {}, falling through", request.method, request.url);
        return Ok(None);
    };

    log::debug!("serving {} {} from fixtures", request.method, request.url);
    hooks.apply(&mut response)?;

    let Response {
        url,
        code,
        body,
        headers,
        ..
    } = response;

    Ok(Some(HttpResponse::new(request, code, headers, body, url)))
}
