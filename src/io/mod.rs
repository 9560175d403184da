//! I/O at the edges of a run: HTTP transport, JSON export and terminal
//! rendering of the daily summary.

pub mod export;
pub mod http;
pub mod summary_table;

pub use export::{export_all, JsonExporter};
pub use http::{get_with_backoff, Clock, HttpClient, HttpRequest, HttpResponse, ReqwestClient, SystemClock};
pub use summary_table::render_summary;
