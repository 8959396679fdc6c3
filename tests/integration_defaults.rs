use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fetchx::prelude::{
    AbortSignal, Client, Config, Defaults, RequestOptions, Request, Response, RetryPolicy,
    SearchParams, Strategy, Timeout, TransportError,
};
use fetchx::{HeaderMergeFn, RequestUrl, SearchParamsMergeFn, UrlResolverFn};
use http::header::{ACCEPT, HeaderMap, HeaderValue};
use http::StatusCode;
use url::Url;

type Seen = Arc<Mutex<Vec<Arc<Request>>>>;

fn recording_client(config: Config) -> (Client, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    let client = Client::builder()
        .config(config)
        .transport(move |request: Arc<Request>, _signal: AbortSignal| {
            recorded.lock().expect("lock requests").push(request);
            async { Ok::<_, TransportError>(Response::new(StatusCode::OK)) }
        })
        .build();
    (client, seen)
}

fn last_request(seen: &Seen) -> Arc<Request> {
    seen.lock()
        .expect("lock requests")
        .last()
        .cloned()
        .expect("a request was sent")
}

#[test]
fn built_in_defaults_are_conservative() {
    let defaults = Defaults::builtin();
    assert!(defaults.base_url().is_none());
    assert!(defaults.headers().is_empty());
    assert!(defaults.search_params().is_empty());
    assert_eq!(defaults.timeout(), Timeout::Disabled);
    assert!(defaults.retry().is_none());
    assert!(!defaults.is_response_error(&Response::new(StatusCode::MOVED_PERMANENTLY)));
    assert!(defaults.is_response_error(&Response::new(StatusCode::BAD_REQUEST)));
}

#[test]
fn snapshot_held_by_caller_never_changes() {
    let (client, _seen) = recording_client(Config::new().with_search_param("a", "1"));
    let before = client.defaults();

    let after = client.set_defaults(
        Config::new()
            .with_search_param("a", "2")
            .with_timeout(Duration::from_secs(1)),
    );

    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.search_params().get("a"), Some("1"));
    assert_eq!(before.timeout(), Timeout::Disabled);
    assert_eq!(after.search_params().get("a"), Some("2"));
    assert!(Arc::ptr_eq(&after, &client.defaults()));
}

#[test]
fn header_updates_are_case_insensitive() {
    let (client, _seen) = recording_client(
        Config::new()
            .try_header("Content-Type", "text/plain")
            .expect("header should parse"),
    );

    let defaults = client.set_defaults(
        Config::new()
            .try_header("content-type", "application/json")
            .expect("header should parse"),
    );

    assert_eq!(defaults.headers().len(), 1);
    assert_eq!(
        defaults.headers().get("CONTENT-TYPE").expect("header present"),
        "application/json"
    );
}

#[test]
fn query_update_with_duplicates_replaces_earlier_value() {
    let (client, _seen) = recording_client(Config::new().with_search_param("a", "1"));

    let defaults = client.set_defaults(
        Config::new()
            .with_search_param("a", "2")
            .with_search_param("a", "3"),
    );

    assert_eq!(
        defaults.search_params().get_all("a").collect::<Vec<_>>(),
        vec!["2", "3"]
    );
}

#[test]
fn derived_update_returning_current_snapshot_notifies_nobody() {
    let (client, _seen) = recording_client(Config::new());
    let notifications = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&notifications);
    let _subscription = client.on_defaults_changed(move |_defaults| {
        counted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let before = client.defaults();

    let after = client.update_defaults(|current| Arc::clone(current));

    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(notifications.load(Ordering::SeqCst), 0);

    client.update_defaults(|current| {
        Config::new().with_retry(RetryPolicy::new(current.retry().map_or(1, |retry| retry.limit() + 1)))
    });
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert_eq!(client.defaults().retry().map(RetryPolicy::limit), Some(1));
}

#[test]
fn failing_observer_does_not_block_later_observers() {
    let (client, _seen) = recording_client(Config::new());
    let _failing = client.on_defaults_changed(|_defaults| Err("observer failed".into()));
    let received = Arc::new(Mutex::new(Vec::<Arc<Defaults>>::new()));
    let recorded = Arc::clone(&received);
    let _recording = client.on_defaults_changed(move |defaults| {
        recorded
            .lock()
            .expect("lock snapshots")
            .push(Arc::clone(defaults));
        Ok(())
    });

    let published = client.set_defaults(Config::new().with_timeout(Duration::from_secs(3)));

    let received = received.lock().expect("lock snapshots");
    assert_eq!(received.len(), 1);
    assert!(Arc::ptr_eq(&received[0], &published));
}

#[test]
fn unsubscribed_observer_stops_receiving() {
    let (client, _seen) = recording_client(Config::new());
    let notifications = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&notifications);
    let subscription = client.on_defaults_changed(move |_defaults| {
        counted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    client.set_defaults(Config::new().without_timeout());
    subscription.unsubscribe();
    client.set_defaults(Config::new().without_timeout());

    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[test]
fn search_params_strategy_persists_until_reverted() {
    let (client, _seen) = recording_client(Config::new().with_search_param("a", "1"));
    let append_only: SearchParamsMergeFn = Arc::new(|base: &SearchParams, incoming: &SearchParams| {
        let mut merged = base.clone();
        merged.extend(
            incoming
                .iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned())),
        );
        merged
    });

    client.set_defaults(
        Config::new()
            .with_search_param("a", "2")
            .with_merge_search_params(Strategy::Custom(append_only)),
    );
    let defaults = client.set_defaults(Config::new().with_search_param("a", "3"));
    assert_eq!(
        defaults.search_params().get_all("a").collect::<Vec<_>>(),
        vec!["1", "2", "3"]
    );

    let defaults = client.set_defaults(
        Config::new()
            .with_search_param("a", "4")
            .with_merge_search_params(Strategy::Revert),
    );
    assert_eq!(
        defaults.search_params().get_all("a").collect::<Vec<_>>(),
        vec!["4"]
    );
}

#[tokio::test]
async fn custom_header_strategy_also_applies_to_calls() {
    let keep_first: HeaderMergeFn = Arc::new(|base: &HeaderMap, incoming: &HeaderMap| {
        let mut merged = base.clone();
        for (name, value) in incoming {
            if !merged.contains_key(name) {
                merged.insert(name.clone(), value.clone());
            }
        }
        merged
    });
    let (client, seen) = recording_client(
        Config::new()
            .try_base_url("https://api.test/")
            .expect("base url should parse")
            .with_header(ACCEPT, HeaderValue::from_static("text/plain"))
            .with_merge_headers(Strategy::Custom(keep_first)),
    );

    client
        .get(
            "items",
            RequestOptions::new().header(ACCEPT, HeaderValue::from_static("application/json")),
        )
        .await
        .expect("request should succeed");

    assert_eq!(
        last_request(&seen).headers().get(ACCEPT).expect("accept header"),
        "text/plain"
    );
}

#[tokio::test]
async fn custom_url_resolver_is_used_for_calls() {
    let versioned: UrlResolverFn = Arc::new(
        |url: Option<&RequestUrl>, base: Option<&Url>| -> Result<Url, fetchx::Error> {
            let path = match url {
                Some(RequestUrl::Text(text)) => text.trim_start_matches('/').to_owned(),
                Some(RequestUrl::Absolute(url)) => return Ok(url.clone()),
                None => String::new(),
            };
            let base = base.ok_or(fetchx::Error::NoUrl)?;
            base.join(&format!("v2/{path}"))
                .map_err(|source| fetchx::Error::InvalidUrl { url: path, source })
        },
    );
    let (client, seen) = recording_client(
        Config::new()
            .try_base_url("https://api.test/")
            .expect("base url should parse")
            .with_resolve_url(Strategy::Custom(versioned)),
    );

    client
        .get("/users", RequestOptions::new())
        .await
        .expect("request should succeed");
    assert_eq!(
        last_request(&seen).url().as_str(),
        "https://api.test/v2/users"
    );

    client.set_defaults(Config::new().with_resolve_url(Strategy::Revert));
    client
        .get("/users", RequestOptions::new())
        .await
        .expect("request should succeed");
    assert_eq!(last_request(&seen).url().as_str(), "https://api.test/users");
}

#[tokio::test]
async fn calls_read_the_snapshot_current_when_first_polled() {
    let (client, seen) = recording_client(
        Config::new()
            .try_base_url("https://api.test/")
            .expect("base url should parse")
            .try_header("x-version", "1")
            .expect("header should parse"),
    );

    let pending = client.get("items", RequestOptions::new());
    client.set_defaults(
        Config::new()
            .try_header("x-version", "2")
            .expect("header should parse"),
    );
    pending.await.expect("request should succeed");

    client
        .get("items", RequestOptions::new())
        .await
        .expect("request should succeed");

    let seen = seen.lock().expect("lock requests");
    assert_eq!(seen[0].headers().get("x-version").expect("header"), "2");
    assert_eq!(seen[1].headers().get("x-version").expect("header"), "2");
}
