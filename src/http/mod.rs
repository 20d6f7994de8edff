//! HTTP front end for chord search.
//!
//! Exposes search, source file download, excerpt and health endpoints over a
//! shared, read-only [`AppContext`](crate::context::AppContext).

mod routes;

pub use routes::{build_router, run_http_server, HealthResponse, HttpServerError, HttpState};
