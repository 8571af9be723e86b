//! Flightdeck daemon: hosts the sync engine and serves a JSON-lines
//! control protocol over a unix socket under `~/.flightdeck/`.

mod error;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_conflicts, request_log, request_resolve, request_status, request_stop, request_write,
    send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking};
