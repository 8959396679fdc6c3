//! Pure merge operations applied when layering configuration: header overlay, query
//! parameter override and URL resolution. Each one can be swapped for a custom
//! implementation through [`Strategy`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use http::HeaderMap;
use url::Url;

use crate::error::Error;
use crate::request::RequestUrl;
use crate::search_params::SearchParams;

pub type HeaderMergeFn = Arc<dyn Fn(&HeaderMap, &HeaderMap) -> HeaderMap + Send + Sync>;
pub type SearchParamsMergeFn =
    Arc<dyn Fn(&SearchParams, &SearchParams) -> SearchParams + Send + Sync>;
pub type UrlResolverFn =
    Arc<dyn Fn(Option<&RequestUrl>, Option<&Url>) -> Result<Url, Error> + Send + Sync>;

/// A strategy override carried by a configuration update.
///
/// `Revert` reinstalls the built-in implementation; leaving the field unset keeps
/// whatever strategy is currently active.
#[derive(Clone)]
pub enum Strategy<F> {
    Custom(F),
    Revert,
}

impl<F> fmt::Debug for Strategy<F> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(_) => formatter.write_str("Custom(..)"),
            Self::Revert => formatter.write_str("Revert"),
        }
    }
}

pub(crate) fn select_strategy<F: Clone>(
    update: Option<&Strategy<F>>,
    current: &F,
    builtin: impl FnOnce() -> F,
) -> F {
    match update {
        Some(Strategy::Custom(strategy)) => strategy.clone(),
        Some(Strategy::Revert) => builtin(),
        None => current.clone(),
    }
}

pub fn merge_headers(base: &HeaderMap, incoming: &HeaderMap) -> HeaderMap {
    let mut merged = base.clone();
    for name in incoming.keys() {
        merged.remove(name);
        for value in incoming.get_all(name) {
            merged.append(name.clone(), value.clone());
        }
    }
    merged
}

/// Overlays `incoming` on `base`: the first time a key shows up in `incoming` every
/// existing entry for it is dropped, later entries with the same key are appended.
pub fn merge_search_params(base: &SearchParams, incoming: &SearchParams) -> SearchParams {
    let mut merged = base.clone();
    let mut stripped = HashSet::new();
    for (name, value) in incoming.iter() {
        if stripped.insert(name) {
            merged.delete(name);
        }
        merged.append(name, value);
    }
    merged
}

pub fn resolve_url(url: Option<&RequestUrl>, base_url: Option<&Url>) -> Result<Url, Error> {
    let text = match url {
        Some(RequestUrl::Absolute(url)) => return Ok(url.clone()),
        Some(RequestUrl::Text(text)) if !text.is_empty() => text,
        _ => return base_url.cloned().ok_or(Error::NoUrl),
    };

    match Url::parse(text) {
        Ok(absolute) => Ok(absolute),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let Some(base_url) = base_url else {
                return Err(Error::NoUrl);
            };
            base_url.join(text).map_err(|source| Error::InvalidUrl {
                url: text.clone(),
                source,
            })
        }
        Err(source) => Err(Error::InvalidUrl {
            url: text.clone(),
            source,
        }),
    }
}

pub(crate) fn builtin_header_merge() -> HeaderMergeFn {
    Arc::new(merge_headers)
}

pub(crate) fn builtin_search_params_merge() -> SearchParamsMergeFn {
    Arc::new(merge_search_params)
}

pub(crate) fn builtin_url_resolver() -> UrlResolverFn {
    Arc::new(resolve_url)
}

#[cfg(test)]
mod tests {
    use http::HeaderMap;
    use http::header::{ACCEPT, CONTENT_TYPE, HeaderName, HeaderValue};
    use url::Url;

    use super::{merge_headers, merge_search_params, resolve_url};
    use crate::error::Error;
    use crate::request::RequestUrl;
    use crate::search_params::SearchParams;

    fn base() -> Url {
        Url::parse("https://api.example.com/v1/").expect("base url should parse")
    }

    #[test]
    fn merge_headers_overlays_incoming_values() {
        let mut defaults = HeaderMap::new();
        defaults.insert(ACCEPT, HeaderValue::from_static("text/plain"));
        defaults.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let mut incoming = HeaderMap::new();
        incoming.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let merged = merge_headers(&defaults, &incoming);
        assert_eq!(merged.get(ACCEPT).unwrap(), "application/json");
        assert_eq!(merged.get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_headers_replaces_every_base_value_for_overlapping_key() {
        let mut defaults = HeaderMap::new();
        defaults.append("x-tag", HeaderValue::from_static("a"));
        defaults.append("x-tag", HeaderValue::from_static("b"));
        let mut incoming = HeaderMap::new();
        let name: HeaderName = "X-Tag".parse().expect("header name should parse");
        incoming.insert(name, HeaderValue::from_static("c"));

        let merged = merge_headers(&defaults, &incoming);
        let values: Vec<_> = merged.get_all("x-tag").iter().collect();
        assert_eq!(values, vec![&HeaderValue::from_static("c")]);
    }

    #[test]
    fn merge_search_params_replaces_prior_and_keeps_new_duplicates() {
        let current = SearchParams::from([("a", "1"), ("b", "x")]);
        let incoming = SearchParams::from([("a", "2"), ("a", "3")]);

        let merged = merge_search_params(&current, &incoming);
        assert_eq!(merged.get_all("a").collect::<Vec<_>>(), vec!["2", "3"]);
        assert_eq!(merged.get("b"), Some("x"));
    }

    #[test]
    fn merge_search_params_leaves_absent_keys_untouched() {
        let current = SearchParams::from([("keep", "1")]);
        let merged = merge_search_params(&current, &SearchParams::new());
        assert_eq!(merged, current);
    }

    #[test]
    fn resolve_url_returns_absolute_value_unchanged() {
        let absolute = Url::parse("https://other.test/a?b=1").expect("url should parse");
        let resolved = resolve_url(Some(&RequestUrl::Absolute(absolute.clone())), Some(&base()))
            .expect("absolute url should resolve");
        assert_eq!(resolved, absolute);
    }

    #[test]
    fn resolve_url_ignores_base_for_absolute_text() {
        let resolved = resolve_url(Some(&RequestUrl::from("https://other.test/a")), Some(&base()))
            .expect("absolute text should resolve");
        assert_eq!(resolved.as_str(), "https://other.test/a");
    }

    #[test]
    fn resolve_url_joins_relative_text_against_base() {
        let resolved = resolve_url(Some(&RequestUrl::from("users?page=2")), Some(&base()))
            .expect("relative url should resolve");
        assert_eq!(resolved.as_str(), "https://api.example.com/v1/users?page=2");
    }

    #[test]
    fn resolve_url_returns_base_when_url_is_missing() {
        let resolved = resolve_url(None, Some(&base())).expect("base should resolve");
        assert_eq!(resolved, base());
        let resolved =
            resolve_url(Some(&RequestUrl::from("")), Some(&base())).expect("base should resolve");
        assert_eq!(resolved, base());
    }

    #[test]
    fn resolve_url_without_any_base_is_no_url() {
        assert!(matches!(resolve_url(None, None), Err(Error::NoUrl)));
        assert!(matches!(
            resolve_url(Some(&RequestUrl::from("")), None),
            Err(Error::NoUrl)
        ));
        assert!(matches!(
            resolve_url(Some(&RequestUrl::from("/users")), None),
            Err(Error::NoUrl)
        ));
    }
}
