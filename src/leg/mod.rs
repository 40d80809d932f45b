//! Call-leg model, cache, and builder.
//!
//! A leg is the in-progress representation of one half-call fragment. Legs
//! accumulate in the [`LegCache`] under their group key (thread-id when
//! present, else GID) until the group is assembled into a call.

mod builder;
mod cache;
mod types;

pub use builder::{Ingest, LegBuilder};
pub use cache::{gid_hex, LegCache};
pub use types::{parse_cdr_time, ring_time_secs, CallDirection, Leg};
