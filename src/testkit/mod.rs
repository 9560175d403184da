//! Testing infrastructure: fixture builders and in-memory collaborators.
//!
//! Everything here is deterministic and performs no I/O, so derivation and
//! ingestion can be tested end to end without network access.
//!
//! ```rust,ignore
//! use dora_metrics::testkit::{deployment, StaticRangeOracle};
//!
//! let oracle = StaticRangeOracle::new().with_range("a1", "b2", ["c3"]);
//! let d = deployment(1, "a1", Some("2024-01-01T00:00:00Z"), "success");
//! ```

mod fixtures;
mod mock_http;
mod mock_sources;

pub use fixtures::{change, deployment, incident, ts};
pub use mock_http::{FakeClock, FakeHttp};
pub use mock_sources::{StaticChangeSource, StaticIncidentSource, StaticRangeOracle, StaticSignalSource};
