//! Typed CDR record variants.

/// Record type token in the CDR dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// `00000000` - one full CDR per call leg.
    FullCdr,
    /// `00000004` - hunt-group supplement.
    HuntGroup,
    /// `00000005` - supplementary feature record, recognized and skipped.
    SupplementaryFeature,
    /// `10000100` - call-forward activation.
    CallForward,
}

impl RecordType {
    /// Map a record-type token to its variant. Unknown tokens return `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "00000000" => Some(RecordType::FullCdr),
            "00000004" => Some(RecordType::HuntGroup),
            "00000005" => Some(RecordType::SupplementaryFeature),
            "10000100" => Some(RecordType::CallForward),
            _ => None,
        }
    }
}

/// One parsed CDR line. Immutable once parsed.
#[derive(Debug, Clone)]
pub enum RawRecord {
    FullCdr(FullCdr),
    HuntGroup(HuntGroup),
    CallForward(CallForward),
}

impl RawRecord {
    pub fn global_call_id(&self) -> Option<&str> {
        match self {
            RawRecord::FullCdr(r) => r.global_call_id.as_deref(),
            RawRecord::HuntGroup(r) => r.global_call_id.as_deref(),
            RawRecord::CallForward(r) => r.global_call_id.as_deref(),
        }
    }

    pub fn source_file(&self) -> &str {
        match self {
            RawRecord::FullCdr(r) => &r.source_file,
            RawRecord::HuntGroup(r) => &r.source_file,
            RawRecord::CallForward(r) => &r.source_file,
        }
    }

    pub fn source_line(&self) -> u64 {
        match self {
            RawRecord::FullCdr(r) => r.source_line,
            RawRecord::HuntGroup(r) => r.source_line,
            RawRecord::CallForward(r) => r.source_line,
        }
    }
}

/// Full CDR record (`00000000`), the superset of leg fields.
///
/// String fields are `None` when the column is absent or empty after
/// stripping whitespace and surrounding double quotes. Numeric fields parse
/// as 0 on malformed input.
#[derive(Debug, Clone, Default)]
pub struct FullCdr {
    pub timestamp: Option<String>,
    pub duration: u64,
    pub global_call_id: Option<String>,
    pub called_party: Option<String>,
    pub calling_number: Option<String>,
    pub attempt_indicator: i64,
    pub cause_code: i64,
    pub orig_party_id: i64,
    pub term_party_id: i64,
    pub call_answer_time: Option<String>,
    pub call_release_time: Option<String>,
    pub in_leg_connect_time: Option<String>,
    pub out_leg_connect_time: Option<String>,
    pub out_leg_release_time: Option<String>,
    pub per_call_feature: u64,
    pub forwarding_party: Option<String>,
    pub dialed_number: Option<String>,
    pub media_type: i64,
    pub per_call_feature_ext: u64,
    pub call_event_indicator: u64,
    pub gid_sequence: Option<String>,
    pub thread_id_node: Option<String>,
    pub thread_id_sequence: Option<String>,
    pub ingress_endpoint: Option<String>,
    pub egress_endpoint: Option<String>,
    pub destination_ext: Option<String>,
    pub source_file: String,
    pub source_line: u64,
}

impl FullCdr {
    /// The grouping key for the leg cache: thread-id sequence, then
    /// thread-id node, then the GID.
    pub fn group_key(&self) -> Option<&str> {
        self.thread_id_sequence
            .as_deref()
            .or(self.thread_id_node.as_deref())
            .or(self.global_call_id.as_deref())
    }
}

/// Hunt-group supplement record (`00000004`).
#[derive(Debug, Clone, Default)]
pub struct HuntGroup {
    pub timestamp: Option<String>,
    pub global_call_id: Option<String>,
    pub hunt_group_number: Option<String>,
    pub hg_start_time: Option<String>,
    pub hg_end_time: Option<String>,
    pub hg_status1: Option<String>,
    pub hg_status2: Option<String>,
    pub routed_to_extension: Option<String>,
    pub source_file: String,
    pub source_line: u64,
}

/// Call-forward activation record (`10000100`).
#[derive(Debug, Clone, Default)]
pub struct CallForward {
    pub timestamp: Option<String>,
    pub global_call_id: Option<String>,
    pub forward_type: Option<String>,
    pub originating_extension: Option<String>,
    pub forward_destination: Option<String>,
    pub source_file: String,
    pub source_line: u64,
}
