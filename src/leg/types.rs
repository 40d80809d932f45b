//! Leg and direction types.

use chrono::NaiveDateTime;

/// Direction of a leg or call.
///
/// `T2TIn`/`T2TOut` only exist after trunk-to-trunk splitting; the cache
/// never holds them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallDirection {
    #[default]
    Unknown,
    Incoming,
    Outgoing,
    Internal,
    TrunkToTrunk,
    T2TIn,
    T2TOut,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Unknown => "Unknown",
            CallDirection::Incoming => "Incoming",
            CallDirection::Outgoing => "Outgoing",
            CallDirection::Internal => "Internal",
            CallDirection::TrunkToTrunk => "TrunkToTrunk",
            CallDirection::T2TIn => "T2TIn",
            CallDirection::T2TOut => "T2TOut",
        }
    }

    /// Externality rank: TrunkToTrunk > Outgoing > Incoming > Internal >
    /// Unknown. Every direction comparison in the pipeline goes through
    /// this table.
    pub fn rank(&self) -> u8 {
        match self {
            CallDirection::Unknown => 0,
            CallDirection::Internal => 1,
            CallDirection::Incoming => 2,
            CallDirection::Outgoing => 3,
            CallDirection::TrunkToTrunk | CallDirection::T2TIn | CallDirection::T2TOut => 4,
        }
    }

    /// The more external of two directions.
    pub fn more_external(self, other: CallDirection) -> CallDirection {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for CallDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-progress representation of one half-call fragment.
///
/// Timestamps are kept as the verbatim CDR strings so ordering and output
/// stay byte-deterministic; they are only parsed where arithmetic is needed
/// (ring time).
#[derive(Debug, Clone, Default)]
pub struct Leg {
    // Identification
    pub global_call_id: String,
    pub thread_id: Option<String>,
    pub gid_sequence: Option<String>,
    pub leg_index: usize,

    // Raw parties
    pub calling_number: Option<String>,
    pub called_party: Option<String>,
    pub destination_ext: Option<String>,
    pub dialed_number: Option<String>,
    pub forwarding_party: Option<String>,

    // Derived parties
    pub caller_extension: Option<String>,
    pub caller_external: Option<String>,
    pub called_extension: Option<String>,
    pub called_external: Option<String>,
    pub extension: Option<String>,
    pub dialed_ani: Option<String>,

    // Endpoints
    pub ingress_endpoint: Option<String>,
    pub egress_endpoint: Option<String>,

    // Routing
    pub hunt_group_number: Option<String>,
    pub transfer_from: Option<String>,
    pub transfer_to: Option<String>,
    pub forward_from_ext: Option<String>,
    pub forward_to_ext: Option<String>,

    // State bits
    pub is_answered: bool,
    pub is_forwarded: bool,
    pub is_pickup: bool,
    pub is_voicemail: bool,
    pub is_hg_only: bool,

    // Quantities
    pub duration: u64,
    pub ring_time: Option<i64>,

    // Timing (verbatim CDR strings)
    pub call_answer_time: Option<String>,
    pub in_leg_connect_time: Option<String>,
    pub out_leg_connect_time: Option<String>,
    pub out_leg_release_time: Option<String>,
    pub call_release_time: Option<String>,

    pub call_direction: CallDirection,

    // Decoded companions
    pub cause_code: i64,
    pub cause_code_text: String,
    pub attempt_indicator: i64,
    pub attempt_indicator_text: String,
    pub per_call_feature: u64,
    pub per_call_feature_text: String,
    pub per_call_feature_ext: u64,
    pub per_call_feature_ext_text: String,
    pub call_event_indicator: u64,
    pub call_event_indicator_text: String,
    pub orig_party_id: i64,
    pub orig_party_id_text: String,
    pub term_party_id: i64,
    pub term_party_id_text: String,

    // Provenance
    pub source_file: String,
    pub source_line: u64,
}

impl Leg {
    /// Stable in-group ordering key: connect time ascending, then source
    /// line. Legs without a connect time sort first.
    pub fn sort_key(&self) -> (&str, u64) {
        (self.in_leg_connect_time.as_deref().unwrap_or(""), self.source_line)
    }

    /// The destination used for attempt/answer pairing.
    pub fn merge_destination(&self) -> Option<&str> {
        self.destination_ext
            .as_deref()
            .or(self.called_extension.as_deref())
    }
}

/// Parse a CDR timestamp. The export writes local ISO-8601 without a zone;
/// fractional seconds occur on sibling records. Unparseable strings yield
/// `None`.
pub fn parse_cdr_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// Ring time in whole seconds: answer minus connect, when both parse and
/// the difference is non-negative.
pub fn ring_time_secs(connect: Option<&str>, answer: Option<&str>) -> Option<i64> {
    let connect = parse_cdr_time(connect?)?;
    let answer = parse_cdr_time(answer?)?;
    let secs = (answer - connect).num_seconds();
    if secs >= 0 {
        Some(secs)
    } else {
        None
    }
}
