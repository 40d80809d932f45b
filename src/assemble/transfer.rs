//! Transfer-chain resolution.
//!
//! Within an ordered group, each leg learns where its call came from
//! (`transfer_from`) and where it went next (`transfer_to`). The origin
//! rules run first, in order, because the destination of leg N is derived
//! from the computed origin of leg N+1.

use crate::leg::Leg;

/// Compute `transfer_from`/`transfer_to` for every leg of a group.
pub fn resolve_transfer_chain(legs: &mut [Leg]) {
    if legs.is_empty() {
        return;
    }
    let original_caller = legs[0].calling_number.clone();

    let mut prev_from: Option<String> = None;
    for leg in legs.iter_mut() {
        let from = transfer_from(leg, original_caller.as_deref(), prev_from.as_deref());
        leg.transfer_from = from.clone();
        prev_from = from;
    }

    for i in 0..legs.len() {
        let to = transfer_to(&legs[i], legs.get(i + 1));
        legs[i].transfer_to = to;
    }
}

fn transfer_from(leg: &Leg, original_caller: Option<&str>, prev: Option<&str>) -> Option<String> {
    // 1. called_party acting as a routing intermediary
    if let (Some(cp), Some(de)) = (leg.called_party.as_deref(), leg.destination_ext.as_deref()) {
        if !leg.is_voicemail && Some(cp) != leg.calling_number.as_deref() && cp != de {
            return Some(cp.to_string());
        }
    }
    // 2. explicit forwarding, unless this is a dead voicemail attempt
    if let Some(fp) = leg.forwarding_party.as_deref() {
        let dead_voicemail = leg.is_voicemail && !leg.is_answered && leg.duration == 0;
        if !dead_voicemail {
            return Some(fp.to_string());
        }
    }
    // 3. the caller changed along the chain
    if let Some(cn) = leg.calling_number.as_deref() {
        if Some(cn) != original_caller {
            return Some(cn.to_string());
        }
    }
    // 4. called_party deviating from the destination
    if let Some(cp) = leg.called_party.as_deref() {
        if !leg.is_voicemail && Some(cp) != leg.destination_ext.as_deref() {
            return Some(cp.to_string());
        }
    }
    // 5. inherit
    prev.map(str::to_string)
}

fn transfer_to(cur: &Leg, next: Option<&Leg>) -> Option<String> {
    if cur.is_voicemail && cur.is_answered {
        return None;
    }
    let next = next?;
    if next.is_voicemail {
        // covers both the VM-chain case and a plain handoff into voicemail
        return next.called_party.clone();
    }

    let mut candidate = next
        .transfer_from
        .clone()
        .or_else(|| next.destination_ext.clone())
        .or_else(|| next.called_party.clone());

    if candidate.is_some()
        && (candidate == cur.transfer_from
            || candidate.as_deref() == cur.destination_ext.as_deref())
    {
        candidate = next
            .destination_ext
            .clone()
            .or_else(|| next.called_party.clone());
    }
    // never report a hop onto itself
    if candidate.is_some() && candidate == cur.transfer_from {
        return None;
    }
    candidate
}
