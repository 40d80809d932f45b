//! Leg direction resolution.
//!
//! Two strategies exist, chosen once at construction: with configured
//! extension ranges the parties themselves decide, without them the SIP
//! endpoints (and party-id markers) do. Both feed the same direction table
//! and salvage rules.

use std::sync::Arc;

use crate::classify::{EndpointClass, EndpointDirectory, ExtensionPlan};
use crate::engine::RunState;
use crate::leg::{CallDirection, Leg, LegCache};
use crate::record::{FullCdr, PCFX_CF_TO_VOICEMAIL, PCFX_SILENT_MONITOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionStrategy {
    ExtensionRange,
    SipEndpoint,
}

pub struct DirectionResolver {
    strategy: DirectionStrategy,
    extensions: ExtensionPlan,
    endpoints: Arc<dyn EndpointDirectory>,
}

impl DirectionResolver {
    pub fn new(extensions: ExtensionPlan, endpoints: Arc<dyn EndpointDirectory>) -> Self {
        let strategy = if extensions.is_empty() {
            DirectionStrategy::SipEndpoint
        } else {
            DirectionStrategy::ExtensionRange
        };
        DirectionResolver {
            strategy,
            extensions,
            endpoints,
        }
    }

    pub fn strategy(&self) -> DirectionStrategy {
        self.strategy
    }

    /// Resolve the leg's direction and assign the derived caller/called
    /// fields.
    pub fn resolve(
        &self,
        leg: &mut Leg,
        cdr: &FullCdr,
        cache: &LegCache,
        group_key: &str,
        state: &mut RunState,
    ) {
        let (caller_internal, mut dest_internal) = match self.strategy {
            DirectionStrategy::ExtensionRange => self.by_extension_ranges(cdr),
            DirectionStrategy::SipEndpoint => self.by_sip_endpoints(cdr, cache, group_key, state),
        };

        // A voicemail destination is internal no matter what the endpoint
        // or party id claims.
        let voicemail = state.effective_voicemail();
        let to_voicemail = cdr.per_call_feature_ext & PCFX_CF_TO_VOICEMAIL != 0
            || (voicemail.is_some()
                && (cdr.called_party.as_deref() == voicemail
                    || cdr.destination_ext.as_deref() == voicemail));
        if to_voicemail {
            dest_internal = true;
        }

        // Silent monitor sessions have no dialed destination; the monitor
        // leg is treated as incoming.
        if caller_internal
            && cdr.destination_ext.is_none()
            && cdr.per_call_feature_ext & PCFX_SILENT_MONITOR != 0
            && cdr.in_leg_connect_time.is_some()
        {
            leg.call_direction = CallDirection::Incoming;
            self.assign_parties(leg, cdr, caller_internal, dest_internal, false);
            return;
        }

        let mut direction = match (caller_internal, dest_internal) {
            (true, true) => CallDirection::Internal,
            (true, false) => CallDirection::Outgoing,
            (false, true) => CallDirection::Incoming,
            (false, false) => CallDirection::TrunkToTrunk,
        };

        // Party-id salvage: an external origin that was forwarded by one of
        // our extensions is an incoming call, not a trunk bridge.
        let forward_internal = cdr
            .forwarding_party
            .as_deref()
            .map(|f| self.extensions.is_extension(f))
            .unwrap_or(false);
        let mut forward_salvage = false;
        if direction == CallDirection::TrunkToTrunk && cdr.orig_party_id == 901 && forward_internal
        {
            direction = CallDirection::Incoming;
            forward_salvage = true;
        } else if direction == CallDirection::Unknown && cdr.orig_party_id == 901 && !caller_internal
        {
            direction = CallDirection::Incoming;
        } else if direction == CallDirection::Unknown && cdr.orig_party_id == 900 {
            direction = CallDirection::Internal;
        }

        leg.call_direction = direction;
        self.assign_parties(leg, cdr, caller_internal, dest_internal, forward_salvage);
    }

    fn assign_parties(
        &self,
        leg: &mut Leg,
        cdr: &FullCdr,
        caller_internal: bool,
        dest_internal: bool,
        forward_salvage: bool,
    ) {
        if caller_internal {
            leg.caller_extension = cdr.calling_number.clone();
        } else {
            leg.caller_external = cdr.calling_number.clone();
            if forward_salvage {
                leg.caller_extension = cdr.forwarding_party.clone();
            }
        }
        if dest_internal {
            leg.called_extension = cdr.destination_ext.clone();
        } else {
            leg.called_external = cdr
                .destination_ext
                .clone()
                .or_else(|| cdr.called_party.clone());
        }
    }

    fn by_extension_ranges(&self, cdr: &FullCdr) -> (bool, bool) {
        let caller = cdr
            .calling_number
            .as_deref()
            .map(|n| self.extensions.is_extension(n))
            .unwrap_or(false);
        let dest = [&cdr.destination_ext, &cdr.dialed_number, &cdr.called_party]
            .into_iter()
            .flatten()
            .any(|n| self.extensions.is_extension(n));
        (caller, dest)
    }

    fn by_sip_endpoints(
        &self,
        cdr: &FullCdr,
        cache: &LegCache,
        group_key: &str,
        state: &mut RunState,
    ) -> (bool, bool) {
        let caller_endpoint = self.endpoint_side(cdr.ingress_endpoint.as_deref(), state);
        let dest_endpoint = self.endpoint_side(cdr.egress_endpoint.as_deref(), state);

        // Endpoint knowledge first, then the party-id markers.
        let caller = caller_endpoint.or(match cdr.orig_party_id {
            900 => Some(true),
            901 => Some(false),
            _ => None,
        });
        let dest = dest_endpoint.or(match cdr.term_party_id {
            902 => Some(true),
            901 => Some(false),
            _ => None,
        });

        if caller.is_none() && dest.is_none() {
            // Nothing known about this leg; adopt the polarity of the most
            // recent prior leg in the group.
            for prior in cache.get(group_key).iter().rev() {
                match prior.call_direction {
                    CallDirection::Incoming => return (false, true),
                    CallDirection::Outgoing => return (true, false),
                    CallDirection::Internal => return (true, true),
                    CallDirection::TrunkToTrunk => return (false, false),
                    _ => continue,
                }
            }
            return (true, true);
        }

        (caller.unwrap_or(true), dest.unwrap_or(true))
    }

    /// `Some(internal)` when the directory knows the endpoint, else `None`.
    /// Unknown non-empty endpoints go on the run's report set.
    fn endpoint_side(&self, endpoint: Option<&str>, state: &mut RunState) -> Option<bool> {
        let endpoint = endpoint?;
        match self.endpoints.classify(endpoint) {
            EndpointClass::Pstn => Some(false),
            EndpointClass::Internal => Some(true),
            EndpointClass::Unknown => {
                state.note_unknown_endpoint(crate::classify::normalize_endpoint(endpoint));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::SipEndpointDirectory;

    const EXPORT: &str = r#"<SipEndpoints>
  <SipEndpoint><Name>gw</Name><Type>NNITypePSTNGateway</Type><IpFqdn>10.0.0.1</IpFqdn></SipEndpoint>
  <SipEndpoint><Name>core</Name><Type>NNITypeServer</Type><IpFqdn>10.0.0.2</IpFqdn></SipEndpoint>
</SipEndpoints>"#;

    fn resolver(patterns: &[&str], xml: Option<&str>) -> DirectionResolver {
        let extensions = ExtensionPlan::from_patterns(patterns).unwrap();
        let endpoints: Arc<dyn EndpointDirectory> = match xml {
            Some(xml) => Arc::new(SipEndpointDirectory::from_xml(xml).unwrap()),
            None => Arc::new(SipEndpointDirectory::empty()),
        };
        DirectionResolver::new(extensions, endpoints)
    }

    fn resolve(resolver: &DirectionResolver, cdr: &FullCdr) -> Leg {
        let mut leg = Leg::default();
        let cache = LegCache::new();
        let mut state = RunState::new(None, &[]);
        resolver.resolve(&mut leg, cdr, &cache, "t1", &mut state);
        leg
    }

    #[test]
    fn test_extension_range_internal() {
        let r = resolver(&["5000-5099"], None);
        let cdr = FullCdr {
            calling_number: Some("5001".to_string()),
            destination_ext: Some("5002".to_string()),
            ..FullCdr::default()
        };
        let leg = resolve(&r, &cdr);
        assert_eq!(leg.call_direction, CallDirection::Internal);
        assert_eq!(leg.caller_extension.as_deref(), Some("5001"));
        assert_eq!(leg.called_extension.as_deref(), Some("5002"));
    }

    #[test]
    fn test_extension_range_outgoing() {
        let r = resolver(&["5000-5099"], None);
        let cdr = FullCdr {
            calling_number: Some("5001".to_string()),
            destination_ext: Some("13055551234".to_string()),
            ..FullCdr::default()
        };
        let leg = resolve(&r, &cdr);
        assert_eq!(leg.call_direction, CallDirection::Outgoing);
        assert_eq!(leg.called_external.as_deref(), Some("13055551234"));
        assert!(leg.called_extension.is_none());
    }

    #[test]
    fn test_extension_range_incoming() {
        let r = resolver(&["5000-5099"], None);
        let cdr = FullCdr {
            calling_number: Some("13055551234".to_string()),
            destination_ext: Some("5002".to_string()),
            ..FullCdr::default()
        };
        let leg = resolve(&r, &cdr);
        assert_eq!(leg.call_direction, CallDirection::Incoming);
        assert_eq!(leg.caller_external.as_deref(), Some("13055551234"));
    }

    #[test]
    fn test_sip_endpoint_strategy() {
        let r = resolver(&[], Some(EXPORT));
        assert_eq!(r.strategy(), DirectionStrategy::SipEndpoint);
        let cdr = FullCdr {
            calling_number: Some("13055551234".to_string()),
            destination_ext: Some("5002".to_string()),
            ingress_endpoint: Some("10.0.0.1:5060".to_string()),
            egress_endpoint: Some("10.0.0.2".to_string()),
            ..FullCdr::default()
        };
        let leg = resolve(&r, &cdr);
        assert_eq!(leg.call_direction, CallDirection::Incoming);
    }

    #[test]
    fn test_sip_endpoint_party_id_fallback() {
        let r = resolver(&[], Some(EXPORT));
        let cdr = FullCdr {
            calling_number: Some("5001".to_string()),
            destination_ext: Some("13055551234".to_string()),
            orig_party_id: 900,
            term_party_id: 901,
            ..FullCdr::default()
        };
        let leg = resolve(&r, &cdr);
        assert_eq!(leg.call_direction, CallDirection::Outgoing);
    }

    #[test]
    fn test_unknown_endpoints_recorded() {
        let r = resolver(&[], Some(EXPORT));
        let cdr = FullCdr {
            ingress_endpoint: Some("10.9.9.9:5060".to_string()),
            egress_endpoint: Some("10.0.0.2".to_string()),
            ..FullCdr::default()
        };
        let mut leg = Leg::default();
        let cache = LegCache::new();
        let mut state = RunState::new(None, &[]);
        r.resolve(&mut leg, &cdr, &cache, "t1", &mut state);
        assert_eq!(state.unknown_endpoint_count(), 1);
    }

    #[test]
    fn test_prior_leg_polarity() {
        let r = resolver(&[], Some(EXPORT));
        let cache = LegCache::new();
        let mut prior = Leg::default();
        prior.call_direction = CallDirection::Incoming;
        cache.store("t1", prior);

        let cdr = FullCdr {
            calling_number: Some("13055551234".to_string()),
            destination_ext: Some("5002".to_string()),
            ..FullCdr::default()
        };
        let mut leg = Leg::default();
        let mut state = RunState::new(None, &[]);
        r.resolve(&mut leg, &cdr, &cache, "t1", &mut state);
        assert_eq!(leg.call_direction, CallDirection::Incoming);
    }

    #[test]
    fn test_voicemail_destination_forced_internal() {
        let r = resolver(&["5000-5099"], None);
        let cdr = FullCdr {
            calling_number: Some("13055551234".to_string()),
            destination_ext: Some("8999".to_string()),
            called_party: Some("8999".to_string()),
            per_call_feature_ext: PCFX_CF_TO_VOICEMAIL,
            ..FullCdr::default()
        };
        let leg = resolve(&r, &cdr);
        assert_eq!(leg.call_direction, CallDirection::Incoming);
    }

    #[test]
    fn test_silent_monitor_is_incoming() {
        let r = resolver(&["5000-5099"], None);
        let cdr = FullCdr {
            calling_number: Some("5001".to_string()),
            per_call_feature_ext: PCFX_SILENT_MONITOR,
            in_leg_connect_time: Some("2024-03-01T10:00:00".to_string()),
            ..FullCdr::default()
        };
        let leg = resolve(&r, &cdr);
        assert_eq!(leg.call_direction, CallDirection::Incoming);
    }

    #[test]
    fn test_forwarded_trunk_salvaged_to_incoming() {
        let r = resolver(&["5000-5099"], None);
        let cdr = FullCdr {
            calling_number: Some("13055551234".to_string()),
            destination_ext: Some("17865550000".to_string()),
            forwarding_party: Some("5001".to_string()),
            orig_party_id: 901,
            ..FullCdr::default()
        };
        let leg = resolve(&r, &cdr);
        assert_eq!(leg.call_direction, CallDirection::Incoming);
        assert_eq!(leg.caller_extension.as_deref(), Some("5001"));
        assert_eq!(leg.caller_external.as_deref(), Some("13055551234"));
    }
}
