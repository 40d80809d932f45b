//! Group assembly: from cached legs to finalized calls.
//!
//! Runs once per group, after the last record of the group is known (end of
//! input, early emission, or eviction):
//!
//! ```text
//! legs (sorted) → Merger → TransferChain → Suppressor → Finalizer → Call(s)
//! ```
//!
//! The pre-suppression snapshot feeds finalizer fields that must reflect the
//! call as dialed, not as routed.

mod direction;
mod finalize;
mod merge;
mod suppress;
mod transfer;

pub use direction::{DirectionResolver, DirectionStrategy};
pub use finalize::PreSuppression;

use crate::call::Call;
use crate::classify::ExtensionPlan;
use crate::engine::RunState;
use crate::leg::Leg;

/// Borrowed context the assembly stages share.
pub struct AssembleContext<'a> {
    pub extensions: &'a ExtensionPlan,
    pub state: &'a mut RunState,
}

/// Assemble one group into zero, one, or two calls (two on trunk-to-trunk
/// splits). HG-only placeholders are never emitted; a group consisting only
/// of placeholders produces nothing.
pub fn assemble_group(group_key: &str, mut legs: Vec<Leg>, ctx: &mut AssembleContext) -> Vec<Call> {
    legs.retain(|l| !l.is_hg_only);
    if legs.is_empty() {
        return Vec::new();
    }

    merge::merge_attempt_pairs(&mut legs, ctx.state);
    let pre = PreSuppression::capture(&legs);
    transfer::resolve_transfer_chain(&mut legs);
    suppress::suppress_routing_legs(&mut legs, ctx.extensions, ctx.state);
    if legs.is_empty() {
        return Vec::new();
    }

    finalize::finalize_group(group_key, legs, &pre, ctx.extensions, ctx.state)
}

/// Reassign 1-based contiguous leg indices.
pub(crate) fn reindex(legs: &mut [Leg]) {
    for (i, leg) in legs.iter_mut().enumerate() {
        leg.leg_index = i + 1;
    }
}
