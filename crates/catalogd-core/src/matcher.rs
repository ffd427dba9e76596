//! Jaccard-distance superset matching.
//!
//! When a new spec could be built from scratch, it's often cheaper to
//! reuse a container that already installs everything requested plus a
//! bit more. A candidate only qualifies if its feature set is a superset
//! of the target's, and among qualifying candidates the closest (smallest
//! Jaccard distance) wins.

use std::collections::BTreeSet;

use crate::catalog::Container;
use crate::spec::ContainerSpec;

/// Jaccard distance `1 - |A∩B|/|A∪B|` between two feature sets.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    1.0 - (intersection as f64) / (union as f64)
}

/// A spec's feature set: each package name prefixed by its channel so
/// identically named packages from different channels never collide
/// (`a` apt, `c` conda, `p` pip).
pub fn feature_set(spec: &ContainerSpec) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    out.extend(spec.apt.iter().map(|p| format!("a{p}")));
    out.extend(spec.conda.iter().map(|p| format!("c{p}")));
    out.extend(spec.pip.iter().map(|p| format!("p{p}")));
    out
}

/// Find the best superset match for `target` among `candidates`, subject
/// to `alpha` (the maximum acceptable Jaccard distance).
///
/// A candidate qualifies only if its feature set is a strict superset-or-equal
/// of the target's and its distance is `<= alpha`. Ties are broken first by
/// smallest distance, then by most recent `last_used`, then lexicographically
/// by container id, so the result is deterministic even when two candidates
/// tie exactly.
pub fn find_match<'a>(target: &ContainerSpec, candidates: &'a [Container], alpha: f64) -> Option<&'a Container> {
    let target_set = feature_set(target);

    let mut best: Option<(&Container, f64)> = None;
    for candidate in candidates {
        let Some(spec) = &candidate.specification else {
            continue;
        };
        let other_set = feature_set(spec);
        if !target_set.is_subset(&other_set) {
            continue;
        }
        let distance = jaccard(&target_set, &other_set);
        if distance > alpha {
            continue;
        }
        best = Some(match best {
            None => (candidate, distance),
            Some((current_best, current_distance)) => {
                if distance < current_distance {
                    (candidate, distance)
                } else if distance == current_distance {
                    if candidate.last_used > current_best.last_used {
                        (candidate, distance)
                    } else if candidate.last_used == current_best.last_used && candidate.id < current_best.id {
                        (candidate, distance)
                    } else {
                        (current_best, current_distance)
                    }
                } else {
                    (current_best, current_distance)
                }
            }
        });
    }

    best.map(|(container, _)| container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn container(id: &str, spec: ContainerSpec, last_used_secs: i64) -> Container {
        let mut c = Container::new(id.to_string(), Utc.timestamp_opt(last_used_secs, 0).unwrap());
        c.specification = Some(spec);
        c.docker_size = Some(1);
        c
    }

    #[test]
    fn jaccard_identical_sets_is_zero() {
        let a: BTreeSet<String> = ["a1".to_string(), "a2".to_string()].into_iter().collect();
        assert_eq!(jaccard(&a, &a), 0.0);
    }

    #[test]
    fn jaccard_disjoint_sets_is_one() {
        let a: BTreeSet<String> = ["a1".to_string()].into_iter().collect();
        let b: BTreeSet<String> = ["a2".to_string()].into_iter().collect();
        assert_eq!(jaccard(&a, &b), 1.0);
    }

    #[test]
    fn rejects_non_superset_candidates() {
        let target = ContainerSpec {
            apt: vec!["curl".into(), "zlib".into()],
            conda: vec![],
            pip: vec![],
        };
        let candidate = container(
            "c1",
            ContainerSpec {
                apt: vec!["curl".into()],
                conda: vec![],
                pip: vec![],
            },
            0,
        );
        assert!(find_match(&target, &[candidate], 0.5).is_none());
    }

    #[test]
    fn accepts_superset_within_alpha() {
        let target = ContainerSpec {
            apt: vec!["curl".into()],
            conda: vec![],
            pip: vec![],
        };
        let candidate = container(
            "c1",
            ContainerSpec {
                apt: vec!["curl".into(), "zlib".into()],
                conda: vec![],
                pip: vec![],
            },
            0,
        );
        let result = find_match(&target, &[candidate], 0.5).unwrap();
        assert_eq!(result.id, "c1");
    }

    #[test]
    fn rejects_superset_beyond_alpha() {
        let target = ContainerSpec {
            apt: vec!["curl".into()],
            conda: vec![],
            pip: vec![],
        };
        // distance = 1 - 1/5 = 0.8, above default alpha of 0.5
        let candidate = container(
            "c1",
            ContainerSpec {
                apt: vec!["curl".into(), "a".into(), "b".into(), "c".into(), "d".into()],
                conda: vec![],
                pip: vec![],
            },
            0,
        );
        assert!(find_match(&target, &[candidate], 0.5).is_none());
    }

    #[test]
    fn picks_closest_then_most_recent() {
        let target = ContainerSpec {
            apt: vec!["curl".into()],
            conda: vec![],
            pip: vec![],
        };
        let closer = container(
            "closer",
            ContainerSpec {
                apt: vec!["curl".into(), "zlib".into()],
                conda: vec![],
                pip: vec![],
            },
            0,
        );
        let farther = container(
            "farther",
            ContainerSpec {
                apt: vec!["curl".into(), "zlib".into(), "openssl".into()],
                conda: vec![],
                pip: vec![],
            },
            100,
        );
        let result = find_match(&target, &[farther, closer], 0.5).unwrap();
        assert_eq!(result.id, "closer");
    }

    #[test]
    fn ties_broken_by_most_recent_last_used() {
        let target = ContainerSpec {
            apt: vec!["curl".into()],
            conda: vec![],
            pip: vec![],
        };
        let spec = ContainerSpec {
            apt: vec!["curl".into(), "zlib".into()],
            conda: vec![],
            pip: vec![],
        };
        let older = container("a", spec.clone(), 0);
        let newer = container("b", spec, 100);
        let result = find_match(&target, &[older, newer], 0.5).unwrap();
        assert_eq!(result.id, "b");
    }
}
