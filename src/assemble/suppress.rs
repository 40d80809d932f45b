//! Routing-leg suppression.
//!
//! CMS and pilot numbers show up as 0-duration pass-through legs. They are
//! infrastructure, not calls: each one is removed and its information is
//! bridged into the neighboring legs so the transfer chain stays closed.

use std::collections::HashSet;

use tracing::debug;

use crate::classify::ExtensionPlan;
use crate::engine::RunState;
use crate::leg::{CallDirection, Leg};

use super::reindex;

/// Remove routing-only legs from an ordered group, bridging their transfer
/// and dialed information into the adjacent legs.
pub fn suppress_routing_legs(legs: &mut Vec<Leg>, extensions: &ExtensionPlan, state: &mut RunState) {
    if legs.is_empty() {
        return;
    }

    // A number appearing as both a destination and a caller within the same
    // call is a pass-through intermediary; remember it for the whole run.
    let destinations: HashSet<&str> = legs
        .iter()
        .filter_map(|l| l.destination_ext.as_deref())
        .collect();
    let callers: HashSet<&str> = legs
        .iter()
        .filter_map(|l| l.calling_number.as_deref())
        .collect();
    let through: Vec<String> = destinations
        .intersection(&callers)
        .map(|s| s.to_string())
        .collect();
    for number in through {
        state.register_routing(&number);
    }

    let routing_only: Vec<bool> = legs.iter().map(|l| is_routing_only(l, state)).collect();
    if !routing_only.contains(&true) {
        return;
    }

    // Pre-suppression first caller, the last resort when every remaining
    // caller is a routing number.
    let fallback_caller = legs
        .first()
        .and_then(|l| l.caller_extension.clone())
        .filter(|c| !state.is_routing(c));

    let mut suppressed_direction = CallDirection::Unknown;
    for i in 0..legs.len() {
        if !routing_only[i] {
            continue;
        }
        suppressed_direction = suppressed_direction.more_external(legs[i].call_direction);

        let cms_number = legs[i]
            .destination_ext
            .clone()
            .or_else(|| legs[i].calling_number.clone());
        let cms_target = legs[i]
            .called_party
            .clone()
            .filter(|cp| !state.is_routing(cp))
            .or_else(|| legs[i].destination_ext.clone());

        debug!(
            gid = %legs[i].global_call_id,
            cms = cms_number.as_deref().unwrap_or(""),
            target = cms_target.as_deref().unwrap_or(""),
            "suppressing routing leg"
        );

        if let Some(prev) = (0..i).rev().find(|&p| !routing_only[p]) {
            if cms_target.is_some() {
                legs[prev].transfer_to = cms_target.clone();
            }
        }
        if let Some(next) = (i + 1..legs.len()).find(|&n| !routing_only[n]) {
            if legs[next].transfer_from.is_none() {
                legs[next].transfer_from = cms_number.clone();
            }
            if legs[next].dialed_number.is_none() {
                legs[next].dialed_number = cms_target.clone();
            }
            if legs[next].call_direction == CallDirection::Internal
                && legs[next].called_extension.is_none()
            {
                if let Some(target) = cms_target.as_deref() {
                    if extensions.is_extension(target) {
                        legs[next].called_extension = Some(target.to_string());
                    }
                }
            }
        }
    }

    let mut idx = 0;
    legs.retain(|_| {
        let keep = !routing_only[idx];
        idx += 1;
        keep
    });

    // The suppressed legs may have carried the only external evidence.
    for leg in legs.iter_mut() {
        if suppressed_direction.rank() > leg.call_direction.rank() {
            leg.call_direction = suppressed_direction;
        }
    }

    // Repair callers that still point at a routing number.
    let replacement = legs
        .iter()
        .find_map(|l| {
            l.caller_extension
                .clone()
                .filter(|c| !state.is_routing(c))
        })
        .or(fallback_caller);
    if let Some(replacement) = replacement {
        let is_routing = |v: &Option<String>, state: &RunState| {
            v.as_deref().map(|c| state.is_routing(c)).unwrap_or(false)
        };
        for leg in legs.iter_mut() {
            if is_routing(&leg.calling_number, state) {
                leg.calling_number = Some(replacement.clone());
            }
            if is_routing(&leg.caller_extension, state) {
                leg.caller_extension = Some(replacement.clone());
            }
            // a pass-through classified as external leaves the routing
            // number in caller_external; the real caller is internal
            if is_routing(&leg.caller_external, state) {
                leg.caller_external = None;
                leg.caller_extension = Some(replacement.clone());
            }
        }
    }

    reindex(legs);
}

/// Whether a leg exists only to route: either its destination is a routing
/// number, or its caller is one and the leg carries nothing real of its
/// own. Answered legs with duration are real calls regardless.
fn is_routing_only(leg: &Leg, state: &RunState) -> bool {
    if leg.duration != 0 {
        return false;
    }
    if let Some(dest) = leg.destination_ext.as_deref() {
        if state.is_routing(dest) {
            return true;
        }
    }
    if let Some(caller) = leg.calling_number.as_deref() {
        if state.is_routing(caller) && !leg.is_answered && leg.forwarding_party.is_none() {
            return leg
                .destination_ext
                .as_deref()
                .map(|d| state.is_routing(d))
                .unwrap_or(true);
        }
    }
    false
}
