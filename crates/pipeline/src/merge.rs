//! Fan-in merge policy.
//!
//! Branch deltas are applied to the pre-fan-out store in the order the
//! branches were declared, not the order they finished. A name written by more
//! than one branch is kept from the later branch and reported as a collision.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{DocumentStore, StoreDelta};

/// One branch's contribution to a fan-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchDelta {
    /// Stage name of the branch.
    pub branch: String,
    /// Documents the branch wrote.
    pub delta: StoreDelta,
}

/// A document written by more than one branch of the same fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCollision {
    /// The contested document name.
    pub name: String,
    /// Branches that wrote it, in merge order. The last one won.
    pub branches: Vec<String>,
}

/// Summary of a fan-in merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Number of document writes applied.
    pub applied: usize,
    /// Names written by more than one branch.
    pub collisions: Vec<MergeCollision>,
}

/// Applies `deltas` to `base` in iteration order, last write wins.
pub fn merge_in_order(
    base: &mut DocumentStore,
    deltas: impl IntoIterator<Item = BranchDelta>,
) -> MergeReport {
    let mut writers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut applied = 0;

    for BranchDelta { branch, delta } in deltas {
        for name in delta.names() {
            writers
                .entry(name.to_string())
                .or_default()
                .push(branch.clone());
        }
        applied += delta.len();
        base.apply(delta);
    }

    let collisions = writers
        .into_iter()
        .filter(|(_, branches)| branches.len() > 1)
        .map(|(name, branches)| MergeCollision { name, branches })
        .collect();

    MergeReport {
        applied,
        collisions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_writing(base: &DocumentStore, writes: &[(&str, &str)]) -> StoreDelta {
        let mut work = base.clone();
        for (name, content) in writes {
            work.write(*name, *content);
        }
        work.diff(base)
    }

    #[test]
    fn disjoint_branches_merge_without_collisions() {
        let mut base = DocumentStore::new();
        base.write("draft.md", "body");
        let deltas = vec![
            BranchDelta {
                branch: "faq".into(),
                delta: delta_writing(&base, &[("faq_section.md", "faq")]),
            },
            BranchDelta {
                branch: "keyword".into(),
                delta: delta_writing(&base, &[("keyword_report.md", "kw")]),
            },
        ];
        let report = merge_in_order(&mut base, deltas);
        assert_eq!(report.applied, 2);
        assert!(report.collisions.is_empty());
        assert_eq!(base.len(), 3);
    }

    #[test]
    fn later_branch_wins_and_collision_is_reported() {
        let mut base = DocumentStore::new();
        let deltas = vec![
            BranchDelta {
                branch: "first".into(),
                delta: delta_writing(&base, &[("shared.md", "one")]),
            },
            BranchDelta {
                branch: "second".into(),
                delta: delta_writing(&base, &[("shared.md", "two")]),
            },
        ];
        let report = merge_in_order(&mut base, deltas);
        assert_eq!(base.read("shared.md").unwrap(), "two");
        assert_eq!(
            report.collisions,
            vec![MergeCollision {
                name: "shared.md".into(),
                branches: vec!["first".into(), "second".into()],
            }]
        );
    }
}
