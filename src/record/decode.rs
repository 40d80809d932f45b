//! Text decodings for CDR numeric codes and bitmasks.
//!
//! The tables mirror the OpenScape Voice CDR interface description. Codes
//! outside the tables render an empty text; the numeric column is always
//! emitted alongside, so nothing is lost.

/// PerCallFeature bit: CF-Unconditional (answered-by-forward marker).
pub const PCF_CF_UNCONDITIONAL: u64 = 8;

/// PerCallFeatureExt bit: call forwarded to voicemail.
pub const PCFX_CF_TO_VOICEMAIL: u64 = 64;

/// PerCallFeatureExt bit: call to a multi-line hunt group.
pub const PCFX_CALL_TO_MLHG: u64 = 1024;

/// PerCallFeatureExt bit: silent monitor session.
pub const PCFX_SILENT_MONITOR: u64 = 16384;

/// CallEventIndicator bit: call was picked up.
pub const CEI_CALL_PICKED_UP: u64 = 8192;

const PER_CALL_FEATURE_BITS: &[(u64, &str)] = &[
    (2, "CF-Busy"),
    (4, "CF-NoAnswer"),
    (8, "CF-Unconditional"),
    (16, "CLIR"),
    (128, "CLIP"),
    (1_048_576, "MaliciousCallTrace"),
];

const PER_CALL_FEATURE_EXT_BITS: &[(u64, &str)] = &[
    (64, "CF-to-Voicemail"),
    (1024, "Call-to-MLHG"),
    (2048, "CallPickup"),
    (4096, "DirectedCallPickup"),
    (8192, "E911"),
    (16384, "SilentMonitor"),
    (1_048_576, "PrivateCall"),
    (2_097_152, "BusinessCall"),
];

const CALL_EVENT_INDICATOR_BITS: &[(u64, &str)] = &[
    (128, "MLHG-AdvanceNoAnswer"),
    (256, "MLHG-Overflow"),
    (512, "MLHG-NightService"),
    (1024, "ForwardedFromMLHG"),
    (2048, "HeldPartyHungUp"),
    (4096, "HoldingPartyHungUp"),
    (8192, "CallPickedUp"),
    (65536, "CSTA-Deflect"),
    (1_048_576, "FeatureActivation"),
];

fn decode_bits(mask: u64, table: &[(u64, &str)]) -> String {
    let mut parts = Vec::new();
    for (bit, name) in table {
        if mask & bit != 0 {
            parts.push(*name);
        }
    }
    parts.join("+")
}

/// Human-readable decoding of the PerCallFeature bitmask.
pub fn per_call_feature_text(mask: u64) -> String {
    decode_bits(mask, PER_CALL_FEATURE_BITS)
}

/// Human-readable decoding of the PerCallFeatureExt bitmask.
pub fn per_call_feature_ext_text(mask: u64) -> String {
    decode_bits(mask, PER_CALL_FEATURE_EXT_BITS)
}

/// Human-readable decoding of the CallEventIndicator bitmask.
pub fn call_event_indicator_text(mask: u64) -> String {
    decode_bits(mask, CALL_EVENT_INDICATOR_BITS)
}

/// Release cause text.
pub fn cause_text(code: i64) -> &'static str {
    match code {
        0 => "NotSet",
        1 => "UnassignedNumber",
        16 => "NormalClearing",
        17 => "UserBusy",
        18 => "NoUserResponding",
        19 => "NoAnswer",
        20 => "SubscriberAbsent",
        21 => "CallRejected",
        23 => "Redirect",
        25 => "RoutingError",
        27 => "DestinationOutOfOrder",
        28 => "InvalidFormat",
        31 => "NormalUnspecified",
        34 => "NoCircuit",
        41 => "TemporaryFailure",
        79 => "NotImplemented",
        86 => "CallCleared",
        102 => "TimerExpiry",
        128 => "SessionTimerExpired",
        _ => "",
    }
}

/// Originating/terminating party id text.
pub fn party_id_text(code: i64) -> &'static str {
    match code {
        900 | 902 => "On OpenScape",
        901 => "Not on OpenScape",
        903 => "Outbound on OpenScape",
        999 => "Unknown",
        _ => "",
    }
}

/// Attempt indicator text. Only the plain attempt marker is documented.
pub fn attempt_indicator_text(code: i64) -> &'static str {
    match code {
        1 => "CallAttempt",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_table() {
        assert_eq!(cause_text(16), "NormalClearing");
        assert_eq!(cause_text(17), "UserBusy");
        assert_eq!(cause_text(128), "SessionTimerExpired");
        assert_eq!(cause_text(4711), "");
    }

    #[test]
    fn test_party_id() {
        assert_eq!(party_id_text(900), "On OpenScape");
        assert_eq!(party_id_text(902), "On OpenScape");
        assert_eq!(party_id_text(901), "Not on OpenScape");
        assert_eq!(party_id_text(999), "Unknown");
        assert_eq!(party_id_text(0), "");
    }

    #[test]
    fn test_bitmask_decode() {
        assert_eq!(per_call_feature_text(0), "");
        assert_eq!(per_call_feature_text(8), "CF-Unconditional");
        assert_eq!(per_call_feature_text(2 | 128), "CF-Busy+CLIP");
        assert_eq!(per_call_feature_ext_text(64 | 16384), "CF-to-Voicemail+SilentMonitor");
        assert_eq!(call_event_indicator_text(8192), "CallPickedUp");
    }

    #[test]
    fn test_unknown_bits_ignored() {
        // bit 1 has no documented meaning in PerCallFeature
        assert_eq!(per_call_feature_text(1), "");
        assert_eq!(per_call_feature_text(1 | 16), "CLIR");
    }
}
