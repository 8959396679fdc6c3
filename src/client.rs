use std::sync::Arc;

use http::Method;

use crate::FetchResult;
use crate::config::Config;
use crate::defaults::{Defaults, DefaultsStore, DefaultsUpdate, Subscription};
use crate::error::BoxError;
use crate::execution::execute;
use crate::hooks::{Hook, HookKind, HookRemover, Hooks};
use crate::request::{RequestOptions, RequestUrl, build_request};
use crate::response::Response;
use crate::transport::Transport;

#[derive(Default)]
pub struct ClientBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("transport", &self.transport.as_ref().map(|_| ".."))
            .finish()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial configuration, applied over the built-in defaults.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn transport(self, transport: impl Transport + 'static) -> Self {
        self.transport_arc(Arc::new(transport))
    }

    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn try_build(self) -> FetchResult<Client> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };
        let defaults = DefaultsStore::new(Defaults::builtin());
        defaults.set(&self.config);

        Ok(Client {
            inner: Arc::new(ClientInner {
                defaults,
                hooks: Arc::new(Hooks::default()),
                transport,
            }),
        })
    }

    pub fn build(self) -> Client {
        self.try_build().unwrap_or_else(|error| {
            panic!("failed to build fetchx client: {error}; use try_build() to handle configuration errors")
        })
    }
}

#[cfg(feature = "tls-rustls-ring")]
fn default_transport() -> FetchResult<Arc<dyn Transport>> {
    Ok(Arc::new(crate::hyper_transport::HyperTransport::try_new()?))
}

#[cfg(not(feature = "tls-rustls-ring"))]
fn default_transport() -> FetchResult<Arc<dyn Transport>> {
    Err(crate::error::Error::MissingTransport)
}

struct ClientInner {
    defaults: DefaultsStore,
    hooks: Arc<Hooks>,
    transport: Arc<dyn Transport>,
}

/// Request orchestrator: layered defaults, hooks, timeout and retry around a [`Transport`].
///
/// Cloning is cheap and clones share configuration and hooks.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("defaults", &self.inner.defaults.get())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The current configuration snapshot.
    pub fn defaults(&self) -> Arc<Defaults> {
        self.inner.defaults.get()
    }

    pub fn set_defaults(&self, config: Config) -> Arc<Defaults> {
        self.inner.defaults.set(&config)
    }

    /// Derives an update from the current snapshot. Returning that same snapshot leaves
    /// the configuration untouched and notifies nobody.
    pub fn update_defaults<F, U>(&self, derive: F) -> Arc<Defaults>
    where
        F: FnOnce(&Arc<Defaults>) -> U,
        U: Into<DefaultsUpdate>,
    {
        self.inner.defaults.update(|current| derive(current).into())
    }

    /// Registers a listener called synchronously with every newly published snapshot.
    /// A failing listener is logged and does not stop the remaining ones.
    pub fn on_defaults_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<Defaults>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.inner.defaults.subscribe(listener)
    }

    pub fn add_hook(&self, hook: Hook) -> HookRemover {
        self.inner.hooks.add(&hook);
        HookRemover::new(&self.inner.hooks, hook)
    }

    pub fn remove_hook(&self, hook: &Hook) {
        self.inner.hooks.remove(hook);
    }

    /// Clears one hook list, or every list when `kind` is `None`.
    pub fn clear_hooks(&self, kind: Option<HookKind>) {
        self.inner.hooks.clear(kind);
    }

    pub fn hook_count(&self, kind: HookKind) -> usize {
        self.inner.hooks.len(kind)
    }

    pub async fn fetch(
        &self,
        url: impl Into<RequestUrl>,
        options: RequestOptions,
    ) -> FetchResult<Response> {
        self.send(options.url(url)).await
    }

    /// Issues a call described entirely by `options`, URL included.
    pub async fn send(&self, mut options: RequestOptions) -> FetchResult<Response> {
        let transport = options
            .take_transport()
            .unwrap_or_else(|| Arc::clone(&self.inner.transport));
        let defaults = self.inner.defaults.get();
        let request = build_request(&defaults, options)?;
        let request = Arc::new(self.inner.hooks.run_before_request(request));
        execute(transport.as_ref(), &self.inner.hooks, request).await
    }

    pub async fn get(
        &self,
        url: impl Into<RequestUrl>,
        options: RequestOptions,
    ) -> FetchResult<Response> {
        self.fetch(url, options.method(Method::GET)).await
    }

    pub async fn post(
        &self,
        url: impl Into<RequestUrl>,
        options: RequestOptions,
    ) -> FetchResult<Response> {
        self.fetch(url, options.method(Method::POST)).await
    }

    pub async fn put(
        &self,
        url: impl Into<RequestUrl>,
        options: RequestOptions,
    ) -> FetchResult<Response> {
        self.fetch(url, options.method(Method::PUT)).await
    }

    pub async fn patch(
        &self,
        url: impl Into<RequestUrl>,
        options: RequestOptions,
    ) -> FetchResult<Response> {
        self.fetch(url, options.method(Method::PATCH)).await
    }

    pub async fn delete(
        &self,
        url: impl Into<RequestUrl>,
        options: RequestOptions,
    ) -> FetchResult<Response> {
        self.fetch(url, options.method(Method::DELETE)).await
    }

    pub async fn head(
        &self,
        url: impl Into<RequestUrl>,
        options: RequestOptions,
    ) -> FetchResult<Response> {
        self.fetch(url, options.method(Method::HEAD)).await
    }

    pub async fn options(
        &self,
        url: impl Into<RequestUrl>,
        options: RequestOptions,
    ) -> FetchResult<Response> {
        self.fetch(url, options.method(Method::OPTIONS)).await
    }
}
