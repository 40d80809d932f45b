//! Call finalization and trunk-to-trunk splitting.

use tracing::debug;

use crate::call::Call;
use crate::classify::ExtensionPlan;
use crate::engine::RunState;
use crate::leg::{CallDirection, Leg};
use crate::record::PCFX_CALL_TO_MLHG;

/// Fields captured after merging but before suppression: the finalizer
/// reports the call as dialed, not as routed.
#[derive(Debug, Clone, Default)]
pub struct PreSuppression {
    pub first_destination_ext: Option<String>,
    pub answered_destination_ext: Option<String>,
    pub last_destination_ext: Option<String>,
    pub first_dialed_number: Option<String>,
}

impl PreSuppression {
    pub fn capture(legs: &[Leg]) -> Self {
        PreSuppression {
            first_destination_ext: legs.first().and_then(|l| l.destination_ext.clone()),
            answered_destination_ext: legs
                .iter()
                .find(|l| l.is_answered)
                .and_then(|l| l.destination_ext.clone()),
            last_destination_ext: legs.last().and_then(|l| l.destination_ext.clone()),
            first_dialed_number: legs.iter().find_map(|l| l.dialed_number.clone()),
        }
    }
}

/// Promote per-leg fields to call level and emit the finalized call, split
/// in two when a trunk-to-trunk bridge crosses an internal extension.
pub fn finalize_group(
    group_key: &str,
    mut legs: Vec<Leg>,
    pre: &PreSuppression,
    extensions: &ExtensionPlan,
    state: &mut RunState,
) -> Vec<Call> {
    // 1. Call direction is the most external any leg reached.
    let mut call_direction = legs
        .iter()
        .fold(CallDirection::Unknown, |acc, l| {
            acc.more_external(l.call_direction)
        });

    let caller_extension = legs[0].caller_extension.clone();
    let caller_external = legs[0].caller_external.clone();

    // 2. An external caller that never reached an internal destination is a
    // trunk bridge, whatever the per-leg table said.
    if caller_external.is_some()
        && caller_extension.is_none()
        && !legs.iter().any(|l| l.called_extension.is_some())
    {
        call_direction = CallDirection::TrunkToTrunk;
    }

    // 3. Voicemail legs report the extension that rang last, or the pilot.
    let voicemail = state.effective_voicemail().map(str::to_string);
    for leg in legs.iter_mut().filter(|l| l.is_voicemail) {
        if !leg.is_answered && leg.duration == 0 && leg.forwarding_party.is_some() {
            leg.destination_ext = leg.forwarding_party.clone();
            leg.called_extension = leg.forwarding_party.clone();
        } else if let Some(vm) = voicemail.as_deref() {
            leg.destination_ext = Some(vm.to_string());
            leg.called_extension = Some(vm.to_string());
        }
    }

    // 4. Internal legs dial what they reach.
    for leg in legs.iter_mut() {
        if leg.call_direction == CallDirection::Internal {
            leg.dialed_number = leg.destination_ext.clone();
        }
    }

    // 5. Hunt-group propagation.
    propagate_hunt_group(&mut legs);

    // 6. Call-level quantities.
    let total_duration = legs
        .iter()
        .filter(|l| l.is_answered)
        .map(|l| l.duration)
        .max()
        .unwrap_or(0);
    let is_answered = legs.iter().any(|l| l.is_answered);
    let dialed_number = legs.iter().find_map(|l| l.dialed_number.clone());
    let original_dialed_digits = pre
        .first_dialed_number
        .clone()
        .or_else(|| dialed_number.clone());
    let hunt_group_number = legs.iter().find_map(|l| l.hunt_group_number.clone());

    // 7. Call-level extension by direction.
    let extension = match call_direction {
        CallDirection::Incoming => pre
            .first_destination_ext
            .clone()
            .or_else(|| pre.answered_destination_ext.clone())
            .or_else(|| pre.last_destination_ext.clone()),
        CallDirection::TrunkToTrunk => legs
            .iter()
            .find_map(|l| l.forwarding_party.clone())
            .or_else(|| caller_extension.clone()),
        _ => caller_extension.clone(),
    };

    // 8. DialedAni.
    let external_caller = legs.iter().find_map(|l| {
        if l.orig_party_id == 901 {
            l.caller_external.clone().filter(|c| !state.is_routing(c))
        } else {
            None
        }
    });
    let external_destination = legs.iter().find_map(|l| l.called_external.clone());
    for leg in legs.iter_mut() {
        leg.dialed_ani = match leg.call_direction {
            CallDirection::Incoming => external_caller.clone(),
            CallDirection::Outgoing | CallDirection::TrunkToTrunk => external_destination
                .clone()
                .or_else(|| leg.dialed_number.clone()),
            _ => leg.dialed_number.clone(),
        };
    }

    let mut call = Call {
        global_call_id: legs[0].global_call_id.clone(),
        thread_id: legs[0].thread_id.clone(),
        call_direction,
        total_legs: legs.len(),
        is_answered,
        total_duration,
        caller_extension,
        caller_external,
        dialed_number,
        original_dialed_digits,
        hunt_group_number,
        extension,
        legs: Vec::new(),
    };
    if call.global_call_id.is_empty() {
        call.global_call_id = group_key.to_string();
    }

    // Trunk-to-trunk bridges that cross one of our extensions become two
    // synthetic calls: the inbound half and the outbound half.
    if call_direction == CallDirection::TrunkToTrunk {
        if let Some(internal) = internal_party(&legs, extensions) {
            debug!(gid = %call.global_call_id, internal = %internal, "splitting trunk-to-trunk call");
            let base = legs.swap_remove(0);
            return split_trunk_to_trunk(call, base, &internal, external_destination);
        }
    }

    // 9. Extension/destination swap for the emitted layout.
    for leg in legs.iter_mut() {
        swap_extension_fields(leg, &call);
    }

    // 10. A picked-up call was never transferred.
    for leg in legs.iter_mut() {
        if leg.is_pickup && leg.transfer_from.is_some() {
            leg.transfer_from = None;
        }
    }

    call.legs = legs;
    vec![call]
}

/// Forward-propagate the first hunt-group number; fall back to bit-1024
/// MLHG markers when nothing propagated.
fn propagate_hunt_group(legs: &mut [Leg]) {
    let first_hg = legs
        .iter()
        .position(|l| l.hunt_group_number.is_some());
    let mut propagated = false;
    if let Some(start) = first_hg {
        let hg = legs[start].hunt_group_number.clone();
        for leg in legs.iter_mut().skip(start + 1) {
            if !leg.is_voicemail && leg.hunt_group_number.is_none() {
                leg.hunt_group_number = hg.clone();
                propagated = true;
            }
        }
    }
    if !propagated {
        let mlhg = legs
            .iter()
            .find(|l| l.per_call_feature_ext & PCFX_CALL_TO_MLHG != 0)
            .and_then(|l| l.called_party.clone());
        if let Some(mlhg) = mlhg {
            for leg in legs.iter_mut() {
                if leg.hunt_group_number.is_none() {
                    leg.hunt_group_number = Some(mlhg.clone());
                }
            }
        }
    }
}

/// The internal extension a trunk bridge crossed, when there is one.
fn internal_party(legs: &[Leg], extensions: &ExtensionPlan) -> Option<String> {
    if !extensions.is_empty() {
        legs.iter().find_map(|l| {
            l.forwarding_party
                .clone()
                .filter(|f| extensions.is_extension(f))
        })
    } else {
        // Discovery mode: trust the party-id markers.
        legs.iter().find_map(|l| {
            if l.orig_party_id == 900 {
                l.calling_number.clone()
            } else if l.term_party_id == 902 {
                l.destination_ext.clone().or_else(|| l.called_party.clone())
            } else {
                None
            }
        })
    }
}

fn swap_extension_fields(leg: &mut Leg, call: &Call) {
    match leg.call_direction {
        CallDirection::Internal => {
            leg.extension = call.caller_extension.clone();
            if leg.destination_ext.is_none() {
                leg.destination_ext = leg.called_party.clone();
            }
        }
        CallDirection::Outgoing => {
            leg.extension = leg.caller_extension.clone();
            leg.destination_ext = None;
        }
        _ => {
            leg.extension = leg
                .destination_ext
                .take()
                .or_else(|| leg.called_party.clone());
        }
    }
}

fn split_trunk_to_trunk(
    call: Call,
    base: Leg,
    internal: &str,
    external_destination: Option<String>,
) -> Vec<Call> {
    let external_caller = call.caller_external.clone();
    let external_destination = external_destination
        .or_else(|| base.called_external.clone())
        .or_else(|| base.dialed_number.clone());

    let mut in_leg = base.clone();
    in_leg.call_direction = CallDirection::T2TIn;
    in_leg.leg_index = 1;
    in_leg.caller_extension = None;
    in_leg.caller_external = external_caller.clone();
    in_leg.called_extension = Some(internal.to_string());
    in_leg.called_external = None;
    in_leg.destination_ext = None;
    in_leg.extension = Some(internal.to_string());
    in_leg.dialed_number = Some(internal.to_string());
    in_leg.dialed_ani = external_caller.clone();
    in_leg.transfer_from = None;
    in_leg.transfer_to = None;

    let inbound = Call {
        global_call_id: call.global_call_id.clone(),
        thread_id: call.thread_id.clone(),
        call_direction: CallDirection::T2TIn,
        total_legs: 1,
        is_answered: call.is_answered,
        total_duration: call.total_duration,
        caller_extension: None,
        caller_external: external_caller,
        dialed_number: Some(internal.to_string()),
        original_dialed_digits: call.original_dialed_digits.clone(),
        hunt_group_number: call.hunt_group_number.clone(),
        extension: Some(internal.to_string()),
        legs: vec![in_leg],
    };

    let mut out_leg = base;
    out_leg.global_call_id = format!("{}_out", call.global_call_id);
    out_leg.call_direction = CallDirection::T2TOut;
    out_leg.leg_index = 1;
    out_leg.calling_number = Some(internal.to_string());
    out_leg.caller_extension = Some(internal.to_string());
    out_leg.caller_external = None;
    out_leg.called_extension = None;
    out_leg.called_external = external_destination.clone();
    out_leg.destination_ext = None;
    out_leg.extension = Some(internal.to_string());
    out_leg.dialed_number = external_destination.clone();
    out_leg.dialed_ani = external_destination.clone();
    out_leg.transfer_from = Some(internal.to_string());
    out_leg.transfer_to = None;

    let outbound = Call {
        global_call_id: format!("{}_out", call.global_call_id),
        thread_id: call.thread_id,
        call_direction: CallDirection::T2TOut,
        total_legs: 1,
        is_answered: call.is_answered,
        total_duration: call.total_duration,
        caller_extension: Some(internal.to_string()),
        caller_external: None,
        dialed_number: external_destination,
        original_dialed_digits: call.original_dialed_digits,
        hunt_group_number: call.hunt_group_number,
        extension: Some(internal.to_string()),
        legs: vec![out_leg],
    };

    vec![inbound, outbound]
}
