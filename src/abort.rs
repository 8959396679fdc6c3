use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AbortReason {
    Caller,
    Timeout,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Caller => "caller",
            Self::Timeout => "timeout",
        };
        formatter.write_str(text)
    }
}

/// Cancellation signal handed to transports.
///
/// A signal derived from a parent fires when the parent fires or when it is aborted
/// itself, and remembers which source fired first.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<AbortReason>>,
    parent: Option<Arc<AbortSignal>>,
}

impl AbortSignal {
    pub(crate) fn derive(parent: Option<&AbortSignal>) -> Self {
        match parent {
            Some(parent) => Self {
                token: parent.token.child_token(),
                reason: Arc::default(),
                parent: Some(Arc::new(parent.clone())),
            },
            None => Self::default(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.reason.get().copied().or_else(|| {
            self.parent
                .as_ref()
                .filter(|parent| parent.is_aborted())
                .and_then(|parent| parent.reason())
        })
    }

    pub async fn aborted(&self) {
        self.token.cancelled().await;
    }

    pub(crate) fn abort_with(&self, reason: AbortReason) {
        if self.token.is_cancelled() {
            return;
        }
        let _ = self.reason.set(reason);
        self.token.cancel();
    }
}

/// Caller-side handle for cancelling in-flight requests.
#[derive(Clone, Debug, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    pub fn abort(&self) {
        self.signal.abort_with(AbortReason::Caller);
    }
}
