//! Line-level CDR parser.

use thiserror::Error;

use crate::source::SourceLine;

use super::types::{CallForward, FullCdr, HuntGroup, RawRecord, RecordType};

/// Parse failure for a single recognized CDR line.
///
/// Unrecognized lines are not errors; they are skipped. A parse error never
/// aborts the batch, it is reported on the run result and processing
/// continues with the next line.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{record:?} line truncated: {fields} fields")]
    Truncated { record: RecordType, fields: usize },
}

/// Header/footer prefixes in CDR files, matched case-insensitively.
const HEADER_PREFIXES: &[&str] = &[
    "FILENAME:", "DEVICE:", "HOSTNAME:", "FILETYPE:", "VERSION:", "CREATE:", "CLOSE:",
];

/// Parse one line into a typed record.
///
/// Returns `Ok(None)` for header lines, empty lines, unrecognized record
/// types, and the recognized-but-unused supplementary feature record.
pub fn parse_line(line: &SourceLine) -> Result<Option<RawRecord>, ParseError> {
    let text = line.text.trim();
    if text.is_empty() || is_header(text) {
        return Ok(None);
    }

    let fields: Vec<&str> = text.split(',').collect();

    // Plain variant: record type in column 0. Sequence-prefixed variant:
    // integer line sequence in column 0, record type in column 1.
    let (record_type, offset) = match RecordType::from_token(fields[0].trim()) {
        Some(rt) => (rt, 0usize),
        None => {
            let prefixed_type = fields
                .get(1)
                .and_then(|t| RecordType::from_token(t.trim()))
                .filter(|_| fields[0].trim().parse::<u64>().is_ok());
            match prefixed_type {
                Some(rt) => (rt, 1),
                None => return Ok(None),
            }
        }
    };

    match record_type {
        RecordType::FullCdr => parse_full_cdr(line, &fields, offset).map(Some),
        RecordType::HuntGroup => parse_hunt_group(line, &fields, offset).map(Some),
        RecordType::CallForward => parse_call_forward(line, &fields, offset).map(Some),
        RecordType::SupplementaryFeature => Ok(None),
    }
}

fn is_header(line: &str) -> bool {
    let upper = line.to_ascii_uppercase();
    HEADER_PREFIXES.iter().any(|p| upper.starts_with(p))
}

/// Column `col` (1-based in the plain variant) as a cleaned string.
/// Surrounding whitespace and double quotes are stripped; empty is `None`.
fn text_field(fields: &[&str], offset: usize, col: usize) -> Option<String> {
    fields.get(offset + col - 1).and_then(|raw| {
        let cleaned = raw.trim().trim_matches('"').trim();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned.to_string())
        }
    })
}

/// Numeric column; malformed input parses as 0.
fn int_field(fields: &[&str], offset: usize, col: usize) -> i64 {
    text_field(fields, offset, col)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn uint_field(fields: &[&str], offset: usize, col: usize) -> u64 {
    text_field(fields, offset, col)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn parse_full_cdr(
    line: &SourceLine,
    fields: &[&str],
    offset: usize,
) -> Result<RawRecord, ParseError> {
    // The mandatory head of a full CDR runs through the calling number.
    if fields.len() < offset + 12 {
        return Err(ParseError::Truncated {
            record: RecordType::FullCdr,
            fields: fields.len(),
        });
    }

    Ok(RawRecord::FullCdr(FullCdr {
        timestamp: text_field(fields, offset, 2),
        duration: uint_field(fields, offset, 3),
        global_call_id: text_field(fields, offset, 5),
        called_party: text_field(fields, offset, 11),
        calling_number: text_field(fields, offset, 12),
        attempt_indicator: int_field(fields, offset, 18),
        cause_code: int_field(fields, offset, 19),
        orig_party_id: int_field(fields, offset, 40),
        term_party_id: int_field(fields, offset, 41),
        call_answer_time: text_field(fields, offset, 48),
        call_release_time: text_field(fields, offset, 49),
        in_leg_connect_time: text_field(fields, offset, 50),
        out_leg_connect_time: text_field(fields, offset, 52),
        out_leg_release_time: text_field(fields, offset, 53),
        per_call_feature: uint_field(fields, offset, 64),
        forwarding_party: text_field(fields, offset, 65),
        dialed_number: text_field(fields, offset, 101),
        media_type: int_field(fields, offset, 104),
        per_call_feature_ext: uint_field(fields, offset, 106),
        call_event_indicator: uint_field(fields, offset, 107),
        gid_sequence: text_field(fields, offset, 122),
        thread_id_node: text_field(fields, offset, 124),
        thread_id_sequence: text_field(fields, offset, 125),
        ingress_endpoint: text_field(fields, offset, 126),
        egress_endpoint: text_field(fields, offset, 127),
        destination_ext: text_field(fields, offset, 128),
        source_file: line.file.clone(),
        source_line: line.line_no,
    }))
}

fn parse_hunt_group(
    line: &SourceLine,
    fields: &[&str],
    offset: usize,
) -> Result<RawRecord, ParseError> {
    if fields.len() < offset + 6 {
        return Err(ParseError::Truncated {
            record: RecordType::HuntGroup,
            fields: fields.len(),
        });
    }

    Ok(RawRecord::HuntGroup(HuntGroup {
        timestamp: text_field(fields, offset, 2),
        global_call_id: text_field(fields, offset, 5),
        hunt_group_number: text_field(fields, offset, 6),
        hg_start_time: text_field(fields, offset, 7),
        hg_end_time: text_field(fields, offset, 8),
        hg_status1: text_field(fields, offset, 9),
        hg_status2: text_field(fields, offset, 10),
        routed_to_extension: text_field(fields, offset, 11),
        source_file: line.file.clone(),
        source_line: line.line_no,
    }))
}

fn parse_call_forward(
    line: &SourceLine,
    fields: &[&str],
    offset: usize,
) -> Result<RawRecord, ParseError> {
    if fields.len() < offset + 6 {
        return Err(ParseError::Truncated {
            record: RecordType::CallForward,
            fields: fields.len(),
        });
    }

    // Call-forward records do not share the full-CDR head: columns 4..6 are
    // the forward description and the GID sits in column 3. The GID may be
    // absent, in which case the record is not cacheable.
    Ok(RawRecord::CallForward(CallForward {
        timestamp: text_field(fields, offset, 2),
        global_call_id: text_field(fields, offset, 3),
        forward_type: text_field(fields, offset, 4),
        originating_extension: text_field(fields, offset, 5),
        forward_destination: text_field(fields, offset, 6),
        source_file: line.file.clone(),
        source_line: line.line_no,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> SourceLine {
        SourceLine {
            file: "test.csv".to_string(),
            line_no: 1,
            text: text.to_string(),
        }
    }

    fn full_cdr_fields() -> Vec<String> {
        let mut f = vec![String::new(); 128];
        f[0] = "00000000".to_string();
        f
    }

    #[test]
    fn test_header_lines_skipped() {
        for header in [
            "FILENAME:cdr0001.csv",
            "filename:cdr0001.csv",
            "DEVICE:osv1",
            "CLOSE:2024-01-01",
        ] {
            assert!(parse_line(&line(header)).unwrap().is_none());
        }
    }

    #[test]
    fn test_unrecognized_line_skipped() {
        assert!(parse_line(&line("garbage,stuff")).unwrap().is_none());
        assert!(parse_line(&line("")).unwrap().is_none());
        // integer prefix but no recognized type token
        assert!(parse_line(&line("17,99999999,x")).unwrap().is_none());
    }

    #[test]
    fn test_supplementary_feature_skipped() {
        let mut f = vec![String::new(); 20];
        f[0] = "00000005".to_string();
        assert!(parse_line(&line(&f.join(","))).unwrap().is_none());
    }

    #[test]
    fn test_plain_full_cdr() {
        let mut f = full_cdr_fields();
        f[1] = "2024-03-01T10:00:00".to_string();
        f[2] = "42".to_string();
        f[4] = "1709287200:00af".to_string();
        f[10] = "5002".to_string();
        f[11] = "5001".to_string();
        f[18] = "16".to_string();
        f[127] = "5002".to_string();
        let record = parse_line(&line(&f.join(","))).unwrap().unwrap();
        let RawRecord::FullCdr(cdr) = record else {
            panic!("expected full CDR");
        };
        assert_eq!(cdr.duration, 42);
        assert_eq!(cdr.global_call_id.as_deref(), Some("1709287200:00af"));
        assert_eq!(cdr.called_party.as_deref(), Some("5002"));
        assert_eq!(cdr.calling_number.as_deref(), Some("5001"));
        assert_eq!(cdr.cause_code, 16);
        assert_eq!(cdr.destination_ext.as_deref(), Some("5002"));
    }

    #[test]
    fn test_sequence_prefixed_full_cdr() {
        let mut f = full_cdr_fields();
        f.insert(0, "000123".to_string());
        f[2] = "2024-03-01T10:00:00".to_string();
        f[3] = "60".to_string();
        f[5] = "1709287200:00b0".to_string();
        let record = parse_line(&line(&f.join(","))).unwrap().unwrap();
        let RawRecord::FullCdr(cdr) = record else {
            panic!("expected full CDR");
        };
        assert_eq!(cdr.duration, 60);
        assert_eq!(cdr.global_call_id.as_deref(), Some("1709287200:00b0"));
    }

    #[test]
    fn test_quoted_and_padded_fields() {
        let mut f = full_cdr_fields();
        f[10] = " \"5002\" ".to_string();
        f[11] = "  5001".to_string();
        let record = parse_line(&line(&f.join(","))).unwrap().unwrap();
        let RawRecord::FullCdr(cdr) = record else {
            panic!("expected full CDR");
        };
        assert_eq!(cdr.called_party.as_deref(), Some("5002"));
        assert_eq!(cdr.calling_number.as_deref(), Some("5001"));
    }

    #[test]
    fn test_malformed_numeric_parses_as_zero() {
        let mut f = full_cdr_fields();
        f[2] = "abc".to_string();
        f[18] = "not-a-number".to_string();
        let record = parse_line(&line(&f.join(","))).unwrap().unwrap();
        let RawRecord::FullCdr(cdr) = record else {
            panic!("expected full CDR");
        };
        assert_eq!(cdr.duration, 0);
        assert_eq!(cdr.cause_code, 0);
    }

    #[test]
    fn test_truncated_full_cdr_is_error() {
        let result = parse_line(&line("00000000,2024-03-01T10:00:00,42"));
        assert!(result.is_err());
    }

    #[test]
    fn test_hunt_group_record() {
        let mut f = vec![String::new(); 11];
        f[0] = "00000004".to_string();
        f[4] = "1709287200:00af".to_string();
        f[5] = "4800".to_string();
        f[10] = "5010".to_string();
        let record = parse_line(&line(&f.join(","))).unwrap().unwrap();
        let RawRecord::HuntGroup(hg) = record else {
            panic!("expected hunt group");
        };
        assert_eq!(hg.hunt_group_number.as_deref(), Some("4800"));
        assert_eq!(hg.routed_to_extension.as_deref(), Some("5010"));
    }

    #[test]
    fn test_call_forward_record() {
        let mut f = vec![String::new(); 6];
        f[0] = "10000100".to_string();
        f[2] = "1709287200:00af".to_string();
        f[3] = "1".to_string();
        f[4] = "5001".to_string();
        f[5] = "5002".to_string();
        let record = parse_line(&line(&f.join(","))).unwrap().unwrap();
        let RawRecord::CallForward(cf) = record else {
            panic!("expected call forward");
        };
        assert_eq!(cf.global_call_id.as_deref(), Some("1709287200:00af"));
        assert_eq!(cf.originating_extension.as_deref(), Some("5001"));
        assert_eq!(cf.forward_destination.as_deref(), Some("5002"));
    }
}
