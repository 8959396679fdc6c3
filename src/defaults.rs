use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use http::HeaderMap;
use tracing::{debug, warn};
use url::Url;

use crate::config::{Config, ResponseErrorPredicate, Timeout};
use crate::error::BoxError;
use crate::merge::{
    HeaderMergeFn, SearchParamsMergeFn, Strategy, UrlResolverFn, builtin_header_merge,
    builtin_search_params_merge, builtin_url_resolver, select_strategy,
};
use crate::response::Response;
use crate::retry::RetryPolicy;
use crate::search_params::SearchParams;
use crate::util::lock_unpoisoned;

pub(crate) type DefaultsListener = Arc<dyn Fn(&Arc<Defaults>) -> Result<(), BoxError> + Send + Sync>;

/// Immutable configuration snapshot. Updates never touch a published snapshot; they
/// publish a new one.
#[derive(Clone)]
pub struct Defaults {
    base_url: Option<Url>,
    headers: HeaderMap,
    search_params: SearchParams,
    timeout: Timeout,
    retry: Option<RetryPolicy>,
    is_response_error: ResponseErrorPredicate,
    merge_headers: HeaderMergeFn,
    merge_search_params: SearchParamsMergeFn,
    resolve_url: UrlResolverFn,
}

impl fmt::Debug for Defaults {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Defaults")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("search_params", &self.search_params)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Defaults {
    pub fn builtin() -> Self {
        Self {
            base_url: None,
            headers: HeaderMap::new(),
            search_params: SearchParams::new(),
            timeout: Timeout::Disabled,
            retry: None,
            is_response_error: Arc::new(default_is_response_error),
            merge_headers: builtin_header_merge(),
            merge_search_params: builtin_search_params_merge(),
            resolve_url: builtin_url_resolver(),
        }
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn search_params(&self) -> &SearchParams {
        &self.search_params
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    pub fn retry(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    pub fn is_response_error(&self, response: &Response) -> bool {
        (self.is_response_error)(response)
    }

    pub fn response_error_predicate(&self) -> &ResponseErrorPredicate {
        &self.is_response_error
    }

    pub fn merge_headers(&self) -> &HeaderMergeFn {
        &self.merge_headers
    }

    pub fn merge_search_params(&self) -> &SearchParamsMergeFn {
        &self.merge_search_params
    }

    pub fn resolve_url(&self) -> &UrlResolverFn {
        &self.resolve_url
    }

    fn merged_with(&self, update: &Config) -> Self {
        let merge_headers = select_strategy(
            update.merge_headers.as_ref(),
            &self.merge_headers,
            builtin_header_merge,
        );
        let merge_search_params = select_strategy(
            update.merge_search_params.as_ref(),
            &self.merge_search_params,
            builtin_search_params_merge,
        );
        let resolve_url = select_strategy(
            update.resolve_url.as_ref(),
            &self.resolve_url,
            builtin_url_resolver,
        );

        Self {
            base_url: match &update.base_url {
                Some(base_url) => base_url.clone(),
                None => self.base_url.clone(),
            },
            headers: merge_headers(&self.headers, &update.headers),
            search_params: merge_search_params(&self.search_params, &update.search_params),
            timeout: update.timeout.unwrap_or(self.timeout),
            retry: match &update.retry {
                Some(retry) => retry.clone(),
                None => self.retry.clone(),
            },
            is_response_error: update
                .is_response_error
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.is_response_error)),
            merge_headers,
            merge_search_params,
            resolve_url,
        }
    }
}

impl From<&Defaults> for Config {
    fn from(defaults: &Defaults) -> Self {
        Self {
            base_url: Some(defaults.base_url.clone()),
            headers: defaults.headers.clone(),
            search_params: defaults.search_params.clone(),
            timeout: Some(defaults.timeout),
            retry: Some(defaults.retry.clone()),
            is_response_error: Some(Arc::clone(&defaults.is_response_error)),
            merge_headers: Some(Strategy::Custom(Arc::clone(&defaults.merge_headers))),
            merge_search_params: Some(Strategy::Custom(Arc::clone(
                &defaults.merge_search_params,
            ))),
            resolve_url: Some(Strategy::Custom(Arc::clone(&defaults.resolve_url))),
        }
    }
}

fn default_is_response_error(response: &Response) -> bool {
    let status = response.status();
    !(status.is_success() || status.is_redirection())
}

/// Result of a derived configuration update.
pub enum DefaultsUpdate {
    /// Returning the snapshot that was passed in leaves the store untouched.
    Snapshot(Arc<Defaults>),
    Config(Config),
}

impl From<Arc<Defaults>> for DefaultsUpdate {
    fn from(snapshot: Arc<Defaults>) -> Self {
        Self::Snapshot(snapshot)
    }
}

impl From<Config> for DefaultsUpdate {
    fn from(config: Config) -> Self {
        Self::Config(config)
    }
}

struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, DefaultsListener)>>,
}

pub(crate) struct DefaultsStore {
    current: Mutex<Arc<Defaults>>,
    /// Serializes read-merge-store so concurrent updates each build on the latest snapshot.
    updating: Mutex<()>,
    listeners: Arc<Listeners>,
}

impl DefaultsStore {
    pub(crate) fn new(initial: Defaults) -> Self {
        Self {
            current: Mutex::new(Arc::new(initial)),
            updating: Mutex::new(()),
            listeners: Arc::new(Listeners {
                next_id: AtomicU64::new(0),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn get(&self) -> Arc<Defaults> {
        Arc::clone(&lock_unpoisoned(&self.current))
    }

    pub(crate) fn set(&self, config: &Config) -> Arc<Defaults> {
        let next = {
            let _updating = lock_unpoisoned(&self.updating);
            let next = Arc::new(self.get().merged_with(config));
            self.store(&next);
            next
        };
        self.notify(&next);
        next
    }

    /// `derive` runs while updates are serialized and must not update this store itself.
    pub(crate) fn update<F>(&self, derive: F) -> Arc<Defaults>
    where
        F: FnOnce(&Arc<Defaults>) -> DefaultsUpdate,
    {
        let next = {
            let _updating = lock_unpoisoned(&self.updating);
            let current = self.get();
            let config = match derive(&current) {
                DefaultsUpdate::Snapshot(snapshot) if Arc::ptr_eq(&snapshot, &current) => {
                    debug!("configuration update returned the current snapshot; skipping");
                    return current;
                }
                DefaultsUpdate::Snapshot(snapshot) => Config::from(snapshot.as_ref()),
                DefaultsUpdate::Config(config) => config,
            };
            let next = Arc::new(current.merged_with(&config));
            self.store(&next);
            next
        };
        self.notify(&next);
        next
    }

    pub(crate) fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<Defaults>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let listener: DefaultsListener = Arc::new(listener);
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        lock_unpoisoned(&self.listeners.entries).push((id, listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    fn store(&self, next: &Arc<Defaults>) {
        *lock_unpoisoned(&self.current) = Arc::clone(next);
    }

    fn notify(&self, next: &Arc<Defaults>) {
        let listeners: Vec<DefaultsListener> = lock_unpoisoned(&self.listeners.entries)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            if let Err(error) = listener(next) {
                warn!(error = %error, "configuration change listener failed");
            }
        }
    }
}

/// Handle returned when registering a configuration change listener.
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Subscription")
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock_unpoisoned(&listeners.entries).retain(|(id, _)| *id != self.id);
        }
    }
}
