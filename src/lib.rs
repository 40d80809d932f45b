//! cdrflow - CDR correlation and normalization engine for OpenScape Voice.
//!
//! OpenScape Voice exports one logical call as several CDR fragments: a full
//! CDR per call leg, hunt-group supplements, and call-forward activations,
//! related by identifiers that arrive out of order. cdrflow groups those
//! fragments, classifies each leg's direction, resolves transfer chains,
//! suppresses pure routing legs, and emits a deterministic per-leg CSV
//! stream.
//!
//! ```text
//! record-source → Parser → (FullCdr | HuntGroup | CallForward)
//!                           └── LegBuilder ──→ LegCache
//!                                               │
//!                                               ├─ streaming: early-emit / evict
//!                                               ↓
//!                           (end of input) → Merger → TransferChain
//!                                               → Suppressor → Finalizer → Sink
//! ```

pub mod assemble;
pub mod call;
pub mod classify;
pub mod config;
pub mod engine;
pub mod leg;
pub mod record;
pub mod sink;
pub mod source;
pub mod telemetry;
