//! Live reload core.
//!
//! The [`LiveRegistry`] owns the asset views and error records for one web
//! root and fans changes out to browsers over server-sent event channels.

mod handler;
mod paths;
mod registry;
mod stream;

pub(crate) use handler::live_handler;
pub(crate) use paths::request_path;
pub use registry::{
    ENV_VAR, ERROR_PATTERN, LINK_PATTERN, LiveOptions, LivePayload, LiveRegistry, Mode,
    PRODUCTION_GRACE, Targets,
};
pub use stream::{LiveSender, LiveStream, SubscriberSet, open_channel};
