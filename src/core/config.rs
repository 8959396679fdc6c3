use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use url::Url;

use crate::FetchResult;
use crate::error::Error;
use crate::merge::{
    HeaderMergeFn, SearchParamsMergeFn, Strategy, UrlResolverFn, merge_headers,
};
use crate::response::Response;
use crate::retry::RetryPolicy;
use crate::search_params::SearchParams;
use crate::util::{parse_header_name, parse_header_value};

pub type ResponseErrorPredicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Timeout {
    #[default]
    Disabled,
    After(Duration),
}

impl Timeout {
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::After(duration) => Some(duration),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Self::After(duration)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Self::Disabled, Self::After)
    }
}

/// A configuration update. Unset fields leave the current defaults untouched.
#[derive(Clone, Default)]
pub struct Config {
    pub(crate) base_url: Option<Option<Url>>,
    pub(crate) headers: HeaderMap,
    pub(crate) search_params: SearchParams,
    pub(crate) timeout: Option<Timeout>,
    pub(crate) retry: Option<Option<RetryPolicy>>,
    pub(crate) is_response_error: Option<ResponseErrorPredicate>,
    pub(crate) merge_headers: Option<Strategy<HeaderMergeFn>>,
    pub(crate) merge_search_params: Option<Strategy<SearchParamsMergeFn>>,
    pub(crate) resolve_url: Option<Strategy<UrlResolverFn>>,
}

impl fmt::Debug for Config {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("search_params", &self.search_params)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field(
                "is_response_error",
                &self.is_response_error.as_ref().map(|_| ".."),
            )
            .field("merge_headers", &self.merge_headers)
            .field("merge_search_params", &self.merge_search_params)
            .field("resolve_url", &self.resolve_url)
            .finish()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(Some(base_url));
        self
    }

    pub fn try_base_url(self, base_url: &str) -> FetchResult<Self> {
        let parsed = Url::parse(base_url).map_err(|source| Error::InvalidUrl {
            url: base_url.to_owned(),
            source,
        })?;
        Ok(self.with_base_url(parsed))
    }

    pub fn without_base_url(mut self) -> Self {
        self.base_url = Some(None);
        self
    }

    /// Later values for the same (case-insensitive) name replace earlier ones.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> FetchResult<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.with_header(name, value))
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = merge_headers(&self.headers, &headers);
        self
    }

    /// Appends an entry; repeating a name keeps every value supplied in this update.
    pub fn with_search_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.search_params.append(name, value);
        self
    }

    pub fn with_search_params(mut self, search_params: SearchParams) -> Self {
        self.search_params
            .extend(search_params.iter().map(|(name, value)| (name.to_owned(), value.to_owned())));
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = Some(Timeout::Disabled);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(Some(retry));
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry = Some(None);
        self
    }

    pub fn with_response_error<F>(mut self, is_response_error: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.is_response_error = Some(Arc::new(is_response_error));
        self
    }

    pub fn with_merge_headers(mut self, strategy: Strategy<HeaderMergeFn>) -> Self {
        self.merge_headers = Some(strategy);
        self
    }

    pub fn with_merge_search_params(mut self, strategy: Strategy<SearchParamsMergeFn>) -> Self {
        self.merge_search_params = Some(strategy);
        self
    }

    pub fn with_resolve_url(mut self, strategy: Strategy<UrlResolverFn>) -> Self {
        self.resolve_url = Some(strategy);
        self
    }
}

#[cfg(test)]
mod tests {
    use http::header::CONTENT_TYPE;

    use super::{Config, Timeout};

    #[test]
    fn try_header_normalizes_case_variants_to_one_entry() {
        let config = Config::new()
            .try_header("Content-Type", "text/plain")
            .expect("header should parse")
            .try_header("content-type", "application/json")
            .expect("header should parse");
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn try_base_url_rejects_relative_text() {
        assert!(Config::new().try_base_url("/v1").is_err());
    }

    #[test]
    fn timeout_converts_from_optional_duration() {
        assert_eq!(Timeout::from(None), Timeout::Disabled);
        assert_eq!(
            Timeout::from(Some(std::time::Duration::from_secs(1))),
            Timeout::After(std::time::Duration::from_secs(1))
        );
    }
}
