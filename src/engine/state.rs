//! Per-run mutable state shared across pipeline stages.
//!
//! One engine instance owns one `RunState`; the single-threaded pipeline
//! contract makes plain fields sufficient, no atomics. Detected state
//! (voicemail pilot, routing numbers) only ever grows during a run.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, warn};

/// One failed input line.
#[derive(Debug, Clone)]
pub struct LineError {
    pub file: String,
    pub line: u64,
    pub message: String,
}

/// A number observed as a likely extension while running without configured
/// ranges (discovery mode).
#[derive(Debug, Clone)]
pub struct CandidateExtension {
    pub number: String,
    pub occurrences: u64,
    pub reasons: Vec<String>,
}

/// Summary of one engine run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub lines_seen: u64,
    pub records_parsed: u64,
    pub legs_built: u64,
    pub calls_emitted: u64,
    pub records_suppressed: u64,
    pub parse_errors: Vec<LineError>,
    pub unknown_endpoints: Vec<String>,
    pub candidate_extensions: Vec<CandidateExtension>,
    pub aborted: bool,
}

/// Mutable run state: detection scalars, reporting sets, counters.
#[derive(Debug, Default)]
pub struct RunState {
    configured_voicemail: Option<String>,
    detected_voicemail: Option<String>,
    routing_numbers: HashSet<String>,
    unknown_endpoints: BTreeSet<String>,
    candidates: BTreeMap<String, (u64, BTreeSet<String>)>,

    /// Group keys already emitted by streaming hooks. Guards against
    /// repeated early emission; late legs on these keys still drain at end
    /// of input as a supplementary call.
    pub emitted: HashSet<String>,
    pub line_errors: Vec<LineError>,

    pub lines_seen: u64,
    pub records_parsed: u64,
    pub legs_built: u64,
    pub calls_emitted: u64,
    pub records_suppressed: u64,
}

impl RunState {
    pub fn new(configured_voicemail: Option<String>, routing_numbers: &[String]) -> Self {
        RunState {
            configured_voicemail,
            routing_numbers: routing_numbers.iter().cloned().collect(),
            ..RunState::default()
        }
    }

    /// The effective voicemail pilot: configured number if present, else the
    /// first auto-detected pilot of this run.
    pub fn effective_voicemail(&self) -> Option<&str> {
        self.configured_voicemail
            .as_deref()
            .or(self.detected_voicemail.as_deref())
    }

    /// Remember an auto-detected voicemail pilot. The first detection wins
    /// for the remainder of the run.
    pub fn remember_voicemail(&mut self, number: &str) {
        if self.detected_voicemail.is_none() {
            debug!(number, "auto-detected voicemail pilot");
            self.detected_voicemail = Some(number.to_string());
        }
    }

    /// Add a number to the routing set (configured ∪ auto-detected).
    pub fn register_routing(&mut self, number: &str) {
        if self.routing_numbers.insert(number.to_string()) {
            debug!(number, "registered routing number");
        }
    }

    pub fn is_routing(&self, number: &str) -> bool {
        self.routing_numbers.contains(number)
    }

    /// Record an endpoint missing from the directory. Logged once per run.
    pub fn note_unknown_endpoint(&mut self, endpoint: &str) {
        if self.unknown_endpoints.insert(endpoint.to_string()) {
            warn!(endpoint, "endpoint not in SIP directory");
        }
    }

    /// Record a discovery-mode extension candidate.
    pub fn note_candidate(&mut self, number: &str, reason: &str) {
        let entry = self
            .candidates
            .entry(number.to_string())
            .or_insert_with(|| (0, BTreeSet::new()));
        entry.0 += 1;
        entry.1.insert(reason.to_string());
    }

    pub fn unknown_endpoint_count(&self) -> usize {
        self.unknown_endpoints.len()
    }

    /// Fold the state into the run report.
    pub fn into_report(self, aborted: bool) -> RunReport {
        RunReport {
            lines_seen: self.lines_seen,
            records_parsed: self.records_parsed,
            legs_built: self.legs_built,
            calls_emitted: self.calls_emitted,
            records_suppressed: self.records_suppressed,
            parse_errors: self.line_errors,
            unknown_endpoints: self.unknown_endpoints.into_iter().collect(),
            candidate_extensions: self
                .candidates
                .into_iter()
                .map(|(number, (occurrences, reasons))| CandidateExtension {
                    number,
                    occurrences,
                    reasons: reasons.into_iter().collect(),
                })
                .collect(),
            aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_voicemail_detection_wins() {
        let mut state = RunState::new(None, &[]);
        assert_eq!(state.effective_voicemail(), None);
        state.remember_voicemail("5999");
        state.remember_voicemail("6000");
        assert_eq!(state.effective_voicemail(), Some("5999"));
    }

    #[test]
    fn test_configured_voicemail_shadows_detected() {
        let mut state = RunState::new(Some("5900".to_string()), &[]);
        state.remember_voicemail("5999");
        assert_eq!(state.effective_voicemail(), Some("5900"));
    }

    #[test]
    fn test_routing_union() {
        let mut state = RunState::new(None, &["4999".to_string()]);
        assert!(state.is_routing("4999"));
        assert!(!state.is_routing("4800"));
        state.register_routing("4800");
        assert!(state.is_routing("4800"));
    }

    #[test]
    fn test_unknown_endpoints_dedupe() {
        let mut state = RunState::new(None, &[]);
        state.note_unknown_endpoint("10.0.0.9");
        state.note_unknown_endpoint("10.0.0.9");
        state.note_unknown_endpoint("10.0.0.8");
        assert_eq!(state.unknown_endpoint_count(), 2);
        let report = state.into_report(false);
        assert_eq!(report.unknown_endpoints, vec!["10.0.0.8", "10.0.0.9"]);
    }

    #[test]
    fn test_candidates() {
        let mut state = RunState::new(None, &[]);
        state.note_candidate("5001", "orig_party_id=900");
        state.note_candidate("5001", "orig_party_id=900");
        state.note_candidate("5001", "term_party_id=902");
        let report = state.into_report(false);
        assert_eq!(report.candidate_extensions.len(), 1);
        assert_eq!(report.candidate_extensions[0].occurrences, 3);
        assert_eq!(report.candidate_extensions[0].reasons.len(), 2);
    }
}
