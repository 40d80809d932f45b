//! CDR record parsing.
//!
//! OpenScape Voice CDR files are comma-delimited ASCII with no quoting.
//! Two file variants exist: *plain* (record type in column 0) and
//! *sequence-prefixed* (an integer line sequence in column 0, record type in
//! column 1). Header and footer lines carry `KEY:` prefixes and are skipped.

mod decode;
mod parser;
mod types;

pub use decode::{
    attempt_indicator_text, call_event_indicator_text, cause_text, party_id_text,
    per_call_feature_ext_text, per_call_feature_text, CEI_CALL_PICKED_UP, PCFX_CALL_TO_MLHG,
    PCFX_CF_TO_VOICEMAIL, PCFX_SILENT_MONITOR, PCF_CF_UNCONDITIONAL,
};
pub use parser::{parse_line, ParseError};
pub use types::{CallForward, FullCdr, HuntGroup, RawRecord, RecordType};
