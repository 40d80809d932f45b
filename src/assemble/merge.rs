//! Attempt/answer merging.
//!
//! The switch writes an unanswered 0-duration attempt record and a separate
//! answered record for the same destination when a call completes after
//! redirection. Downstream they are one leg.

use crate::engine::RunState;
use crate::leg::{ring_time_secs, Leg};

use super::reindex;

/// Collapse adjacent attempt(0s) + answer(dur>0) pairs in an ordered group.
pub fn merge_attempt_pairs(legs: &mut Vec<Leg>, state: &RunState) {
    let mut i = 0;
    while i + 1 < legs.len() {
        if can_merge(&legs[i], &legs[i + 1], state) {
            let next = legs.remove(i + 1);
            merge_into(&mut legs[i], next);
        } else {
            i += 1;
        }
    }
    reindex(legs);
}

fn can_merge(cur: &Leg, next: &Leg, state: &RunState) -> bool {
    if cur.duration != 0 || cur.is_answered {
        return false;
    }
    if !next.is_answered || next.duration == 0 || next.is_voicemail {
        return false;
    }
    let same_destination = match (cur.merge_destination(), next.merge_destination()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    if !same_destination {
        return false;
    }
    // A hunt-group advance shows up as forwarding on the answer record;
    // that is routing, not a real forward, and does not block the merge.
    match next.forwarding_party.as_deref() {
        None => true,
        Some(fp) => {
            state.is_routing(fp)
                || next.hunt_group_number.as_deref() == Some(fp)
                || cur.hunt_group_number.as_deref() == Some(fp)
        }
    }
}

fn merge_into(cur: &mut Leg, next: Leg) {
    cur.duration = next.duration;
    cur.is_answered = next.is_answered;
    cur.cause_code = next.cause_code;
    cur.cause_code_text = next.cause_code_text;
    cur.call_answer_time = next.call_answer_time;
    cur.call_release_time = next.call_release_time;
    cur.out_leg_connect_time = next.out_leg_connect_time;
    cur.out_leg_release_time = next.out_leg_release_time;
    cur.ring_time = ring_time_secs(
        cur.in_leg_connect_time.as_deref(),
        cur.call_answer_time.as_deref(),
    )
    .or(cur.ring_time);
    cur.is_forwarded |= next.is_forwarded;
    cur.is_pickup |= next.is_pickup;
    cur.call_direction = cur.call_direction.more_external(next.call_direction);
    if cur.hunt_group_number.is_none() {
        cur.hunt_group_number = next.hunt_group_number;
    }
    if next.source_file != cur.source_file {
        cur.source_file = format!("{}+{}", cur.source_file, next.source_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leg::CallDirection;

    fn attempt(dest: &str, line: u64) -> Leg {
        Leg {
            destination_ext: Some(dest.to_string()),
            duration: 0,
            cause_code: 23,
            cause_code_text: "Redirect".to_string(),
            in_leg_connect_time: Some("2024-03-01T10:00:00".to_string()),
            source_file: "a.csv".to_string(),
            source_line: line,
            ..Leg::default()
        }
    }

    fn answer(dest: &str, duration: u64, line: u64) -> Leg {
        Leg {
            destination_ext: Some(dest.to_string()),
            duration,
            is_answered: true,
            cause_code: 16,
            cause_code_text: "NormalClearing".to_string(),
            in_leg_connect_time: Some("2024-03-01T10:00:02".to_string()),
            call_answer_time: Some("2024-03-01T10:00:05".to_string()),
            call_release_time: Some("2024-03-01T10:00:30".to_string()),
            source_file: "a.csv".to_string(),
            source_line: line,
            ..Leg::default()
        }
    }

    #[test]
    fn test_attempt_answer_merged() {
        let state = RunState::new(None, &[]);
        let mut legs = vec![attempt("5002", 1), answer("5002", 25, 2)];
        merge_attempt_pairs(&mut legs, &state);

        assert_eq!(legs.len(), 1);
        let leg = &legs[0];
        assert_eq!(leg.duration, 25);
        assert!(leg.is_answered);
        assert_eq!(leg.cause_code, 16);
        // setup timestamps stay with the attempt
        assert_eq!(leg.in_leg_connect_time.as_deref(), Some("2024-03-01T10:00:00"));
        assert_eq!(leg.call_answer_time.as_deref(), Some("2024-03-01T10:00:05"));
        assert_eq!(leg.ring_time, Some(5));
        assert_eq!(leg.leg_index, 1);
        // same file, no join marker
        assert_eq!(leg.source_file, "a.csv");
    }

    #[test]
    fn test_cross_file_merge_joins_source() {
        let state = RunState::new(None, &[]);
        let mut second = answer("5002", 25, 2);
        second.source_file = "b.csv".to_string();
        let mut legs = vec![attempt("5002", 1), second];
        merge_attempt_pairs(&mut legs, &state);
        assert_eq!(legs[0].source_file, "a.csv+b.csv");
    }

    #[test]
    fn test_different_destination_not_merged() {
        let state = RunState::new(None, &[]);
        let mut legs = vec![attempt("5002", 1), answer("5003", 25, 2)];
        merge_attempt_pairs(&mut legs, &state);
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].leg_index, 1);
        assert_eq!(legs[1].leg_index, 2);
    }

    #[test]
    fn test_voicemail_answer_not_merged() {
        let state = RunState::new(None, &[]);
        let mut vm = answer("5002", 25, 2);
        vm.is_voicemail = true;
        let mut legs = vec![attempt("5002", 1), vm];
        merge_attempt_pairs(&mut legs, &state);
        assert_eq!(legs.len(), 2);
    }

    #[test]
    fn test_real_forward_blocks_merge() {
        let state = RunState::new(None, &[]);
        let mut fwd = answer("5002", 25, 2);
        fwd.forwarding_party = Some("5050".to_string());
        let mut legs = vec![attempt("5002", 1), fwd];
        merge_attempt_pairs(&mut legs, &state);
        assert_eq!(legs.len(), 2);
    }

    #[test]
    fn test_hg_forward_does_not_block_merge() {
        let state = RunState::new(None, &["4800".to_string()]);
        let mut fwd = answer("5002", 25, 2);
        fwd.forwarding_party = Some("4800".to_string());
        let mut legs = vec![attempt("5002", 1), fwd];
        merge_attempt_pairs(&mut legs, &state);
        assert_eq!(legs.len(), 1);
    }

    #[test]
    fn test_direction_promoted_to_more_external() {
        let state = RunState::new(None, &[]);
        let mut cur = attempt("5002", 1);
        cur.call_direction = CallDirection::Internal;
        let mut next = answer("5002", 25, 2);
        next.call_direction = CallDirection::Incoming;
        let mut legs = vec![cur, next];
        merge_attempt_pairs(&mut legs, &state);
        assert_eq!(legs[0].call_direction, CallDirection::Incoming);
    }
}
