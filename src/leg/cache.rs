//! In-memory leg cache.
//!
//! Groups legs under their key (thread-id when present, else GID) in
//! insertion order, and keeps two auxiliary indices for late hunt-group
//! reconciliation: HG supplements and full CDRs sometimes disagree on the
//! timestamp prefix of the GID while the hex suffix matches, so the suffix
//! is the durable join key.
//!
//! Thread-safe behind a coarse lock so a host may multiplex independent
//! engine instances; within one instance operations never interleave.

use std::collections::HashMap;
use std::sync::RwLock;

use super::types::Leg;

/// The substring after the final `:` of a GID. HG/CDR siblings agree on it
/// even when their GID timestamp prefixes drift.
pub fn gid_hex(gid: &str) -> &str {
    match gid.rsplit_once(':') {
        Some((_, hex)) => hex,
        None => gid,
    }
}

/// Associative store of in-progress legs.
#[derive(Debug, Default)]
pub struct LegCache {
    groups: RwLock<HashMap<String, Vec<Leg>>>,
    hex_to_thread: RwLock<HashMap<String, String>>,
    hex_to_gid: RwLock<HashMap<String, String>>,
}

impl LegCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a leg to its group.
    pub fn store(&self, key: &str, leg: Leg) {
        self.groups
            .write()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(leg);
    }

    /// The group's legs, sorted by (connect time, source line).
    pub fn get(&self, key: &str) -> Vec<Leg> {
        let groups = self.groups.read().unwrap();
        let mut legs = groups.get(key).cloned().unwrap_or_default();
        sort_group(&mut legs);
        legs
    }

    pub fn contains(&self, key: &str) -> bool {
        self.groups.read().unwrap().contains_key(key)
    }

    /// Apply `f` to every leg in the group. Returns how many legs were
    /// visited (0 when the group does not exist).
    pub fn update_group<F: FnMut(&mut Leg)>(&self, key: &str, mut f: F) -> usize {
        let mut groups = self.groups.write().unwrap();
        match groups.get_mut(key) {
            Some(legs) => {
                for leg in legs.iter_mut() {
                    f(leg);
                }
                legs.len()
            }
            None => 0,
        }
    }

    /// Delete legs in the group whose connect time matches; the key is
    /// dropped when the group empties.
    pub fn remove_one(&self, key: &str, in_leg_connect_time: Option<&str>) {
        let mut groups = self.groups.write().unwrap();
        if let Some(legs) = groups.get_mut(key) {
            legs.retain(|l| l.in_leg_connect_time.as_deref() != in_leg_connect_time);
            if legs.is_empty() {
                groups.remove(key);
            }
        }
    }

    /// Remove and return a whole group, sorted.
    pub fn remove_group(&self, key: &str) -> Option<Vec<Leg>> {
        let mut legs = self.groups.write().unwrap().remove(key)?;
        sort_group(&mut legs);
        Some(legs)
    }

    /// Extract the HG-only placeholders of a group, leaving real legs in
    /// place. The key is dropped when the group empties.
    pub fn take_hg_only(&self, key: &str) -> Vec<Leg> {
        let mut groups = self.groups.write().unwrap();
        let Some(legs) = groups.get_mut(key) else {
            return Vec::new();
        };
        let mut placeholders = Vec::new();
        legs.retain(|l| {
            if l.is_hg_only {
                placeholders.push(l.clone());
                false
            } else {
                true
            }
        });
        if legs.is_empty() {
            groups.remove(key);
        }
        placeholders
    }

    /// Snapshot of all group keys.
    pub fn keys(&self) -> Vec<String> {
        self.groups.read().unwrap().keys().cloned().collect()
    }

    /// Total legs across all groups.
    pub fn count(&self) -> usize {
        self.groups.read().unwrap().values().map(Vec::len).sum()
    }

    /// Record the thread-id owning a gid-hex. First seen wins.
    pub fn map_hex_to_thread(&self, hex: &str, thread: &str) {
        self.hex_to_thread
            .write()
            .unwrap()
            .entry(hex.to_string())
            .or_insert_with(|| thread.to_string());
    }

    pub fn thread_for_hex(&self, hex: &str) -> Option<String> {
        self.hex_to_thread.read().unwrap().get(hex).cloned()
    }

    /// Record the full GID first seen for a gid-hex. First seen wins.
    pub fn map_hex_to_gid(&self, hex: &str, gid: &str) {
        self.hex_to_gid
            .write()
            .unwrap()
            .entry(hex.to_string())
            .or_insert_with(|| gid.to_string());
    }

    pub fn gid_for_hex(&self, hex: &str) -> Option<String> {
        self.hex_to_gid.read().unwrap().get(hex).cloned()
    }
}

fn sort_group(legs: &mut [Leg]) {
    legs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}
