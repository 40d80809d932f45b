//! Turns parsed records into cached legs.

use std::sync::Arc;

use tracing::debug;

use crate::assemble::DirectionResolver;
use crate::classify::{EndpointDirectory, ExtensionPlan};
use crate::engine::RunState;
use crate::record::{
    attempt_indicator_text, call_event_indicator_text, cause_text, party_id_text,
    per_call_feature_ext_text, per_call_feature_text, CallForward, FullCdr, HuntGroup, RawRecord,
    CEI_CALL_PICKED_UP, PCFX_CF_TO_VOICEMAIL, PCF_CF_UNCONDITIONAL,
};

use super::cache::{gid_hex, LegCache};
use super::types::{ring_time_secs, CallDirection, Leg};

/// Outcome of ingesting one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    /// A new leg was cached under this group key.
    Stored { group_key: String },
    /// Existing legs were updated in place (HG fill-in).
    Updated,
    /// The record produced nothing.
    Skipped(&'static str),
}

/// Builds legs from parsed records and reconciles hunt-group supplements.
pub struct LegBuilder {
    extensions: ExtensionPlan,
    resolver: DirectionResolver,
    discovery: bool,
}

impl LegBuilder {
    pub fn new(extensions: ExtensionPlan, endpoints: Arc<dyn EndpointDirectory>) -> Self {
        let discovery = extensions.is_empty();
        let resolver = DirectionResolver::new(extensions.clone(), endpoints);
        LegBuilder {
            extensions,
            resolver,
            discovery,
        }
    }

    pub fn ingest(&self, record: &RawRecord, cache: &LegCache, state: &mut RunState) -> Ingest {
        match record {
            RawRecord::FullCdr(cdr) => self.ingest_full_cdr(cdr, cache, state),
            RawRecord::HuntGroup(hg) => self.ingest_hunt_group(hg, cache, state),
            RawRecord::CallForward(cf) => self.ingest_call_forward(cf, cache, state),
        }
    }

    fn ingest_full_cdr(&self, cdr: &FullCdr, cache: &LegCache, state: &mut RunState) -> Ingest {
        // Feature-code dialing (*44/#44) never becomes a leg.
        if let Some(dialed) = cdr.dialed_number.as_deref() {
            if dialed.contains("*44") || dialed.contains("#44") {
                state.records_suppressed += 1;
                debug!(
                    dialed,
                    file = %cdr.source_file,
                    line = cdr.source_line,
                    "dropped feature-code record"
                );
                return Ingest::Skipped("feature-code dialed number");
            }
        }

        let Some(group_key) = cdr.group_key().map(str::to_string) else {
            return Ingest::Skipped("no grouping identifier");
        };

        // Voicemail pilot auto-detection: the first CF-to-Voicemail record
        // names the pilot for the rest of the run.
        if cdr.per_call_feature_ext & PCFX_CF_TO_VOICEMAIL != 0 {
            if let Some(called) = cdr.called_party.as_deref() {
                state.remember_voicemail(called);
            }
        }

        let mut leg = self.leg_from_cdr(cdr, state);
        self.resolver
            .resolve(&mut leg, cdr, cache, &group_key, state);

        if self.discovery {
            if cdr.orig_party_id == 900 {
                if let Some(n) = cdr.calling_number.as_deref() {
                    state.note_candidate(n, "orig_party_id=900");
                }
            }
            if cdr.term_party_id == 902 {
                if let Some(n) = cdr
                    .destination_ext
                    .as_deref()
                    .or(cdr.called_party.as_deref())
                {
                    state.note_candidate(n, "term_party_id=902");
                }
            }
        }

        // Consume any HG-only placeholders reachable from this record: the
        // group key itself, the record's GID, and the GID first seen for
        // the same hex suffix.
        if let Some(gid) = cdr.global_call_id.as_deref() {
            let hex = gid_hex(gid);
            let mut keys = vec![group_key.clone()];
            if !keys.iter().any(|k| k == gid) {
                keys.push(gid.to_string());
            }
            if let Some(mapped) = cache.gid_for_hex(hex) {
                if !keys.contains(&mapped) {
                    keys.push(mapped);
                }
            }
            for key in &keys {
                for placeholder in cache.take_hg_only(key) {
                    if leg.hunt_group_number.is_none() {
                        leg.hunt_group_number = placeholder.hunt_group_number.clone();
                    }
                }
            }
            cache.map_hex_to_thread(hex, &group_key);
        }

        cache.store(&group_key, leg);
        Ingest::Stored { group_key }
    }

    fn ingest_hunt_group(&self, hg: &HuntGroup, cache: &LegCache, state: &mut RunState) -> Ingest {
        let Some(hg_number) = hg.hunt_group_number.as_deref() else {
            return Ingest::Skipped("hunt group without pilot number");
        };

        // HG pilots are routing numbers by definition.
        state.register_routing(hg_number);

        let Some(gid) = hg.global_call_id.as_deref() else {
            return Ingest::Skipped("hunt group without GID");
        };
        let hex = gid_hex(gid);

        let fill = |leg: &mut Leg| {
            if leg.hunt_group_number.is_none() {
                leg.hunt_group_number = Some(hg_number.to_string());
            }
        };

        if cache.contains(gid) {
            cache.update_group(gid, fill);
            return Ingest::Updated;
        }
        if let Some(thread) = cache.thread_for_hex(hex) {
            if cache.contains(&thread) {
                cache.update_group(&thread, fill);
                return Ingest::Updated;
            }
        }

        // No CDR yet: park a placeholder until one arrives.
        cache.map_hex_to_gid(hex, gid);
        let placeholder = Leg {
            global_call_id: gid.to_string(),
            hunt_group_number: Some(hg_number.to_string()),
            is_hg_only: true,
            in_leg_connect_time: hg.hg_start_time.clone().or_else(|| hg.timestamp.clone()),
            source_file: hg.source_file.clone(),
            source_line: hg.source_line,
            ..Leg::default()
        };
        cache.store(gid, placeholder);
        Ingest::Stored {
            group_key: gid.to_string(),
        }
    }

    fn ingest_call_forward(
        &self,
        cf: &CallForward,
        cache: &LegCache,
        _state: &mut RunState,
    ) -> Ingest {
        let Some(gid) = cf.global_call_id.as_deref() else {
            return Ingest::Skipped("call forward without GID");
        };

        let dest_internal = cf
            .forward_destination
            .as_deref()
            .map(|d| self.extensions.is_extension(d))
            .unwrap_or(false);

        let leg = Leg {
            global_call_id: gid.to_string(),
            calling_number: cf.originating_extension.clone(),
            caller_extension: cf.originating_extension.clone(),
            forward_from_ext: cf.originating_extension.clone(),
            forward_to_ext: cf.forward_destination.clone(),
            is_forwarded: true,
            in_leg_connect_time: cf.timestamp.clone(),
            call_direction: if dest_internal {
                CallDirection::Internal
            } else {
                CallDirection::TrunkToTrunk
            },
            source_file: cf.source_file.clone(),
            source_line: cf.source_line,
            ..Leg::default()
        };
        cache.store(gid, leg);
        Ingest::Stored {
            group_key: gid.to_string(),
        }
    }

    fn leg_from_cdr(&self, cdr: &FullCdr, state: &RunState) -> Leg {
        let answered = (cdr.duration > 0 && cdr.cause_code == 16)
            || cdr.per_call_feature & PCF_CF_UNCONDITIONAL != 0
            || (cdr.media_type == 1 && cdr.cause_code == 16);

        let voicemail = state.effective_voicemail();
        let is_voicemail = cdr.per_call_feature_ext & PCFX_CF_TO_VOICEMAIL != 0
            || (voicemail.is_some() && cdr.called_party.as_deref() == voicemail);

        Leg {
            global_call_id: cdr.global_call_id.clone().unwrap_or_default(),
            thread_id: cdr
                .thread_id_sequence
                .clone()
                .or_else(|| cdr.thread_id_node.clone()),
            gid_sequence: cdr.gid_sequence.clone(),
            calling_number: cdr.calling_number.clone(),
            called_party: cdr.called_party.clone(),
            destination_ext: cdr.destination_ext.clone(),
            dialed_number: cdr.dialed_number.clone(),
            forwarding_party: cdr.forwarding_party.clone(),
            ingress_endpoint: cdr.ingress_endpoint.clone(),
            egress_endpoint: cdr.egress_endpoint.clone(),
            is_answered: answered,
            is_forwarded: cdr.forwarding_party.is_some(),
            is_pickup: cdr.call_event_indicator & CEI_CALL_PICKED_UP != 0,
            is_voicemail,
            duration: cdr.duration,
            ring_time: ring_time_secs(
                cdr.in_leg_connect_time.as_deref(),
                cdr.call_answer_time.as_deref(),
            ),
            call_answer_time: cdr.call_answer_time.clone(),
            in_leg_connect_time: cdr.in_leg_connect_time.clone(),
            out_leg_connect_time: cdr.out_leg_connect_time.clone(),
            out_leg_release_time: cdr.out_leg_release_time.clone(),
            call_release_time: cdr.call_release_time.clone(),
            cause_code: cdr.cause_code,
            cause_code_text: cause_text(cdr.cause_code).to_string(),
            attempt_indicator: cdr.attempt_indicator,
            attempt_indicator_text: attempt_indicator_text(cdr.attempt_indicator).to_string(),
            per_call_feature: cdr.per_call_feature,
            per_call_feature_text: per_call_feature_text(cdr.per_call_feature),
            per_call_feature_ext: cdr.per_call_feature_ext,
            per_call_feature_ext_text: per_call_feature_ext_text(cdr.per_call_feature_ext),
            call_event_indicator: cdr.call_event_indicator,
            call_event_indicator_text: call_event_indicator_text(cdr.call_event_indicator),
            orig_party_id: cdr.orig_party_id,
            orig_party_id_text: party_id_text(cdr.orig_party_id).to_string(),
            term_party_id: cdr.term_party_id,
            term_party_id_text: party_id_text(cdr.term_party_id).to_string(),
            source_file: cdr.source_file.clone(),
            source_line: cdr.source_line,
            ..Leg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::SipEndpointDirectory;

    fn builder(patterns: &[&str]) -> LegBuilder {
        let extensions = ExtensionPlan::from_patterns(patterns).unwrap();
        LegBuilder::new(extensions, Arc::new(SipEndpointDirectory::empty()))
    }

    fn full_cdr(thread: &str, gid: &str) -> FullCdr {
        FullCdr {
            global_call_id: Some(gid.to_string()),
            thread_id_sequence: Some(thread.to_string()),
            calling_number: Some("5001".to_string()),
            destination_ext: Some("5002".to_string()),
            in_leg_connect_time: Some("2024-03-01T10:00:00".to_string()),
            duration: 30,
            cause_code: 16,
            source_file: "a.csv".to_string(),
            source_line: 10,
            ..FullCdr::default()
        }
    }

    #[test]
    fn test_full_cdr_stored_under_thread() {
        let b = builder(&["5000-5099"]);
        let cache = LegCache::new();
        let mut state = RunState::new(None, &[]);

        let outcome = b.ingest(
            &RawRecord::FullCdr(full_cdr("t1", "100:00af")),
            &cache,
            &mut state,
        );
        assert_eq!(
            outcome,
            Ingest::Stored {
                group_key: "t1".to_string()
            }
        );
        let legs = cache.get("t1");
        assert_eq!(legs.len(), 1);
        assert!(legs[0].is_answered);
        assert_eq!(legs[0].call_direction, CallDirection::Internal);
    }

    #[test]
    fn test_feature_code_record_dropped() {
        let b = builder(&["5000-5099"]);
        let cache = LegCache::new();
        let mut state = RunState::new(None, &[]);

        let mut cdr = full_cdr("t1", "100:00af");
        cdr.dialed_number = Some("*441234".to_string());
        let outcome = b.ingest(&RawRecord::FullCdr(cdr), &cache, &mut state);
        assert!(matches!(outcome, Ingest::Skipped(_)));
        assert_eq!(cache.count(), 0);
        assert_eq!(state.records_suppressed, 1);
    }

    #[test]
    fn test_hg_before_cdr_placeholder_consumed() {
        let b = builder(&["5000-5099"]);
        let cache = LegCache::new();
        let mut state = RunState::new(None, &[]);

        let hg = HuntGroup {
            global_call_id: Some("099:00af".to_string()),
            hunt_group_number: Some("4800".to_string()),
            hg_start_time: Some("2024-03-01T09:59:59".to_string()),
            source_file: "a.csv".to_string(),
            source_line: 1,
            ..HuntGroup::default()
        };
        b.ingest(&RawRecord::HuntGroup(hg), &cache, &mut state);
        assert_eq!(cache.count(), 1);
        assert!(state.is_routing("4800"));

        // the full CDR shares the hex suffix but not the GID prefix
        b.ingest(
            &RawRecord::FullCdr(full_cdr("t1", "100:00af")),
            &cache,
            &mut state,
        );

        let legs = cache.get("t1");
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].hunt_group_number.as_deref(), Some("4800"));
        assert!(!legs[0].is_hg_only);
        // placeholder is gone
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn test_hg_after_cdr_fills_in_place() {
        let b = builder(&["5000-5099"]);
        let cache = LegCache::new();
        let mut state = RunState::new(None, &[]);

        b.ingest(
            &RawRecord::FullCdr(full_cdr("t1", "100:00af")),
            &cache,
            &mut state,
        );
        let hg = HuntGroup {
            global_call_id: Some("100:00af".to_string()),
            hunt_group_number: Some("4800".to_string()),
            source_file: "a.csv".to_string(),
            source_line: 2,
            ..HuntGroup::default()
        };
        let outcome = b.ingest(&RawRecord::HuntGroup(hg), &cache, &mut state);
        assert_eq!(outcome, Ingest::Updated);

        let legs = cache.get("t1");
        assert_eq!(legs[0].hunt_group_number.as_deref(), Some("4800"));
    }

    #[test]
    fn test_hg_does_not_overwrite() {
        let b = builder(&["5000-5099"]);
        let cache = LegCache::new();
        let mut state = RunState::new(None, &[]);

        let mut leg = Leg::default();
        leg.hunt_group_number = Some("4700".to_string());
        cache.store("100:00af", leg);

        let hg = HuntGroup {
            global_call_id: Some("100:00af".to_string()),
            hunt_group_number: Some("4800".to_string()),
            ..HuntGroup::default()
        };
        b.ingest(&RawRecord::HuntGroup(hg), &cache, &mut state);
        assert_eq!(
            cache.get("100:00af")[0].hunt_group_number.as_deref(),
            Some("4700")
        );
    }

    #[test]
    fn test_voicemail_autodetect_first_wins() {
        let b = builder(&["5000-5099"]);
        let cache = LegCache::new();
        let mut state = RunState::new(None, &[]);

        let mut cdr = full_cdr("t1", "100:00af");
        cdr.per_call_feature_ext = PCFX_CF_TO_VOICEMAIL;
        cdr.called_party = Some("8999".to_string());
        b.ingest(&RawRecord::FullCdr(cdr), &cache, &mut state);
        assert_eq!(state.effective_voicemail(), Some("8999"));

        let mut cdr2 = full_cdr("t2", "101:00b0");
        cdr2.per_call_feature_ext = PCFX_CF_TO_VOICEMAIL;
        cdr2.called_party = Some("7000".to_string());
        b.ingest(&RawRecord::FullCdr(cdr2), &cache, &mut state);
        assert_eq!(state.effective_voicemail(), Some("8999"));

        assert!(cache.get("t1")[0].is_voicemail);
    }

    #[test]
    fn test_call_forward_needs_gid() {
        let b = builder(&["5000-5099"]);
        let cache = LegCache::new();
        let mut state = RunState::new(None, &[]);

        let cf = CallForward {
            originating_extension: Some("5001".to_string()),
            forward_destination: Some("5002".to_string()),
            ..CallForward::default()
        };
        let outcome = b.ingest(&RawRecord::CallForward(cf), &cache, &mut state);
        assert!(matches!(outcome, Ingest::Skipped(_)));

        let cf = CallForward {
            global_call_id: Some("100:00af".to_string()),
            originating_extension: Some("5001".to_string()),
            forward_destination: Some("13055551234".to_string()),
            ..CallForward::default()
        };
        b.ingest(&RawRecord::CallForward(cf), &cache, &mut state);
        let legs = cache.get("100:00af");
        assert_eq!(legs.len(), 1);
        assert!(legs[0].is_forwarded);
        assert_eq!(legs[0].call_direction, CallDirection::TrunkToTrunk);
        assert_eq!(legs[0].forward_to_ext.as_deref(), Some("13055551234"));
    }

    #[test]
    fn test_discovery_mode_candidates() {
        let b = builder(&[]);
        let cache = LegCache::new();
        let mut state = RunState::new(None, &[]);

        let mut cdr = full_cdr("t1", "100:00af");
        cdr.orig_party_id = 900;
        cdr.term_party_id = 902;
        b.ingest(&RawRecord::FullCdr(cdr), &cache, &mut state);

        let report = state.into_report(false);
        let numbers: Vec<&str> = report
            .candidate_extensions
            .iter()
            .map(|c| c.number.as_str())
            .collect();
        assert!(numbers.contains(&"5001"));
        assert!(numbers.contains(&"5002"));
    }
}
