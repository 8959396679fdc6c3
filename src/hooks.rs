use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::request::Request;
use crate::response::Response;
use crate::util::lock_unpoisoned;

pub type BeforeRequestFn = Arc<dyn Fn(&Request) -> Option<Request> + Send + Sync>;
pub type AfterResponseFn = Arc<dyn Fn(&Request, &Response) -> Option<Response> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    BeforeRequest,
    AfterResponse,
}

/// Interceptor registered on a client.
///
/// A `BeforeRequest` hook may return a replacement request, an `AfterResponse` hook a
/// replacement response; returning `None` keeps the current value. Identity is the
/// underlying `Arc`, so registering a clone of the same hook twice has no effect.
#[derive(Clone)]
pub enum Hook {
    BeforeRequest(BeforeRequestFn),
    AfterResponse(AfterResponseFn),
}

impl fmt::Debug for Hook {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeRequest(_) => formatter.write_str("Hook::BeforeRequest(..)"),
            Self::AfterResponse(_) => formatter.write_str("Hook::AfterResponse(..)"),
        }
    }
}

impl Hook {
    pub fn before_request<F>(hook: F) -> Self
    where
        F: Fn(&Request) -> Option<Request> + Send + Sync + 'static,
    {
        Self::BeforeRequest(Arc::new(hook))
    }

    pub fn after_response<F>(hook: F) -> Self
    where
        F: Fn(&Request, &Response) -> Option<Response> + Send + Sync + 'static,
    {
        Self::AfterResponse(Arc::new(hook))
    }

    pub fn kind(&self) -> HookKind {
        match self {
            Self::BeforeRequest(_) => HookKind::BeforeRequest,
            Self::AfterResponse(_) => HookKind::AfterResponse,
        }
    }
}

#[derive(Default)]
struct HookLists {
    before_request: Vec<BeforeRequestFn>,
    after_response: Vec<AfterResponseFn>,
}

/// Per-client hook registry. Lists keep insertion order and hold each hook at most once.
#[derive(Default)]
pub(crate) struct Hooks {
    lists: Mutex<HookLists>,
}

impl Hooks {
    pub(crate) fn add(&self, hook: &Hook) {
        let mut lists = lock_unpoisoned(&self.lists);
        match hook {
            Hook::BeforeRequest(hook) => {
                if !lists.before_request.iter().any(|known| Arc::ptr_eq(known, hook)) {
                    lists.before_request.push(Arc::clone(hook));
                }
            }
            Hook::AfterResponse(hook) => {
                if !lists.after_response.iter().any(|known| Arc::ptr_eq(known, hook)) {
                    lists.after_response.push(Arc::clone(hook));
                }
            }
        }
    }

    pub(crate) fn remove(&self, hook: &Hook) {
        let mut lists = lock_unpoisoned(&self.lists);
        match hook {
            Hook::BeforeRequest(hook) => lists
                .before_request
                .retain(|known| !Arc::ptr_eq(known, hook)),
            Hook::AfterResponse(hook) => lists
                .after_response
                .retain(|known| !Arc::ptr_eq(known, hook)),
        }
    }

    pub(crate) fn clear(&self, kind: Option<HookKind>) {
        let mut lists = lock_unpoisoned(&self.lists);
        match kind {
            Some(HookKind::BeforeRequest) => lists.before_request.clear(),
            Some(HookKind::AfterResponse) => lists.after_response.clear(),
            None => *lists = HookLists::default(),
        }
    }

    pub(crate) fn len(&self, kind: HookKind) -> usize {
        let lists = lock_unpoisoned(&self.lists);
        match kind {
            HookKind::BeforeRequest => lists.before_request.len(),
            HookKind::AfterResponse => lists.after_response.len(),
        }
    }

    /// Runs before-request hooks in order, each one seeing the previous hook's output.
    pub(crate) fn run_before_request(&self, mut request: Request) -> Request {
        let hooks = lock_unpoisoned(&self.lists).before_request.clone();
        for hook in hooks {
            if let Some(replacement) = hook(&request) {
                request = replacement;
            }
        }
        request
    }

    pub(crate) fn run_after_response(&self, request: &Request, mut response: Response) -> Response {
        let hooks = lock_unpoisoned(&self.lists).after_response.clone();
        for hook in hooks {
            if let Some(replacement) = hook(request, &response) {
                response = replacement;
            }
        }
        response
    }
}

/// Handle returned by [`Client::add_hook`](crate::Client::add_hook).
pub struct HookRemover {
    hooks: Weak<Hooks>,
    hook: Hook,
}

impl fmt::Debug for HookRemover {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HookRemover")
            .field("hook", &self.hook)
            .finish()
    }
}

impl HookRemover {
    pub(crate) fn new(hooks: &Arc<Hooks>, hook: Hook) -> Self {
        Self {
            hooks: Arc::downgrade(hooks),
            hook,
        }
    }

    pub fn hook(&self) -> &Hook {
        &self.hook
    }

    /// Removes the hook; a no-op once it is gone or the client was dropped.
    pub fn remove(self) {
        if let Some(hooks) = self.hooks.upgrade() {
            hooks.remove(&self.hook);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::StatusCode;

    use super::{Hook, HookKind, HookRemover, Hooks};
    use crate::response::Response;

    #[test]
    fn registering_same_hook_twice_keeps_one_entry() {
        let hooks = Hooks::default();
        let hook = Hook::after_response(|_request, _response| None);
        hooks.add(&hook);
        hooks.add(&hook.clone());
        assert_eq!(hooks.len(HookKind::AfterResponse), 1);

        hooks.add(&Hook::after_response(|_request, _response| None));
        assert_eq!(hooks.len(HookKind::AfterResponse), 2);
    }

    #[test]
    fn clear_by_kind_leaves_other_list() {
        let hooks = Hooks::default();
        hooks.add(&Hook::before_request(|_request| None));
        hooks.add(&Hook::after_response(|_request, _response| None));

        hooks.clear(Some(HookKind::BeforeRequest));
        assert_eq!(hooks.len(HookKind::BeforeRequest), 0);
        assert_eq!(hooks.len(HookKind::AfterResponse), 1);

        hooks.clear(None);
        assert_eq!(hooks.len(HookKind::AfterResponse), 0);
    }

    #[test]
    fn remover_deregisters_its_hook() {
        let hooks = Arc::new(Hooks::default());
        let hook = Hook::before_request(|_request| None);
        hooks.add(&hook);
        let remover = HookRemover::new(&hooks, hook);
        assert_eq!(remover.hook().kind(), HookKind::BeforeRequest);

        remover.remove();
        assert_eq!(hooks.len(HookKind::BeforeRequest), 0);
    }

    #[test]
    fn after_response_hooks_chain_replacements() {
        let hooks = Hooks::default();
        hooks.add(&Hook::after_response(|_request, response| {
            Some(response.clone().with_status_text("first"))
        }));
        hooks.add(&Hook::after_response(|_request, response| {
            (response.status_text() == "first").then(|| response.clone().with_body("second"))
        }));

        let request = crate::tests::request_for("https://example.test/");
        let response = hooks.run_after_response(&request, Response::new(StatusCode::OK));
        assert_eq!(response.status_text(), "first");
        assert_eq!(response.body().as_ref(), b"second");
    }
}
