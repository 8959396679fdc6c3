pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod merge;
pub(crate) mod retry;
pub(crate) mod util;
