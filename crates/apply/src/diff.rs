//! Minimal structural diffs between a sent apply body and the server's answer.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.adds == 0 && self.updates == 0 && self.removes == 0
    }
}

/// Drop server bookkeeping that never belongs to a desired state.
pub fn strip_noisy(mut v: Json) -> Json {
    if let Some(meta) = v.get_mut("metadata").and_then(Json::as_object_mut) {
        for k in ["managedFields", "resourceVersion", "generation", "creationTimestamp", "uid", "selfLink"] {
            meta.remove(k);
        }
    }
    // Status is server-populated; ignore it during diffs
    if let Some(obj) = v.as_object_mut() {
        obj.remove("status");
    }
    v
}

/// Count keys `target` has that `base` lacks (adds), differing values (updates)
/// and keys only in `base` (removes).
pub fn diff_summary(target: &Json, base: &Json) -> DiffSummary {
    fn walk(a: &Json, b: &Json, out: &mut DiffSummary) {
        match (a, b) {
            (Json::Object(ao), Json::Object(bo)) => {
                for (k, av) in ao.iter() {
                    match bo.get(k) {
                        Some(bv) if av == bv => {}
                        Some(bv) => walk(av, bv, out),
                        None => out.adds += 1,
                    }
                }
                out.removes += bo.keys().filter(|k| !ao.contains_key(*k)).count();
            }
            (Json::Array(aa), Json::Array(bb)) => {
                out.updates += aa.iter().zip(bb.iter()).filter(|(x, y)| x != y).count();
                if aa.len() > bb.len() {
                    out.adds += aa.len() - bb.len();
                }
                if bb.len() > aa.len() {
                    out.removes += bb.len() - aa.len();
                }
            }
            (av, bv) => {
                if av != bv {
                    out.updates += 1;
                }
            }
        }
    }
    let mut out = DiffSummary::default();
    walk(target, base, &mut out);
    out
}
