//! Pairwise table of link pairs exempt from distance checks

use std::collections::HashMap;

use crate::robot::RobotModel;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllowedCollisionMatrix {
    entries: HashMap<(String, String), bool>,
    default_entries: HashMap<String, bool>,
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl AllowedCollisionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matrix allowing every pair of links connected by a joint
    pub fn from_adjacent_links(model: &RobotModel) -> Self {
        let mut acm = Self::new();
        for (parent, child) in model.adjacent_link_pairs() {
            acm.set_entry(parent, child, true);
        }
        acm
    }

    pub fn set_entry(&mut self, a: &str, b: &str, allowed: bool) {
        self.entries.insert(pair_key(a, b), allowed);
    }

    pub fn remove_entry(&mut self, a: &str, b: &str) {
        self.entries.remove(&pair_key(a, b));
    }

    pub fn entry(&self, a: &str, b: &str) -> Option<bool> {
        self.entries.get(&pair_key(a, b)).copied()
    }

    /// Fallback used for any pair involving `name` without an explicit entry
    pub fn set_default_entry(&mut self, name: &str, allowed: bool) {
        self.default_entries.insert(name.to_string(), allowed);
    }

    /// Explicit entries win; otherwise a pair is allowed if either side defaults to allowed
    pub fn is_allowed(&self, a: &str, b: &str) -> bool {
        if let Some(allowed) = self.entry(a, b) {
            return allowed;
        }
        let default = |n: &str| self.default_entries.get(n).copied().unwrap_or(false);
        default(a) || default(b)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
