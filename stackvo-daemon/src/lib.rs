//! Stackvo daemon: hosts one orchestrator behind a Unix socket.

mod error;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request, request_status, request_stop, send_request, subscribe, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, EVENT_CAPACITY};
