//! Identity matcher — nearest reference descriptor within a distance threshold.

use crate::types::Descriptor;

/// One enrolled identity's reference descriptor.
#[derive(Debug, Clone)]
pub struct Reference {
    pub key: String,
    pub descriptor: Descriptor,
}

/// Per-flow mapping of identity key → descriptor.
///
/// Built once per authentication context and dropped with it; never persisted.
/// Holds at most one descriptor per identity: inserting an existing key
/// replaces its descriptor.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    entries: Vec<Reference>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-identity set, as used by exit verification.
    pub fn single(key: impl Into<String>, descriptor: Descriptor) -> Self {
        let mut set = Self::new();
        set.insert(key, descriptor);
        set
    }

    pub fn insert(&mut self, key: impl Into<String>, descriptor: Descriptor) {
        let key = key.into();
        match self.entries.iter_mut().find(|r| r.key == key) {
            Some(existing) => existing.descriptor = descriptor,
            None => self.entries.push(Reference { key, descriptor }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|r| r.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.entries.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Descriptor)> for ReferenceSet {
    fn from_iter<T: IntoIterator<Item = (K, Descriptor)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (key, descriptor) in iter {
            set.insert(key, descriptor);
        }
        set
    }
}

/// What to do when the reference set is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptySetPolicy {
    /// Return no match.
    #[default]
    Reject,
    /// Accept any probe without comparison. Only for local kiosk demos.
    AcceptAny,
}

/// Outcome of matching one probe descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Match { key: String, distance: f32 },
    /// Nothing within the threshold. `best_distance` is `None` for an empty set.
    NoMatch { best_distance: Option<f32> },
    /// Accepted under [`EmptySetPolicy::AcceptAny`]; no identity was compared.
    Unverified,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match { .. })
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            MatchResult::Match { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn distance(&self) -> Option<f32> {
        match self {
            MatchResult::Match { distance, .. } => Some(*distance),
            MatchResult::NoMatch { best_distance } => *best_distance,
            MatchResult::Unverified => None,
        }
    }
}

/// Strategy for comparing a probe descriptor against a reference set.
pub trait Matcher {
    fn find(&self, probe: &Descriptor, references: &ReferenceSet, threshold: f32) -> MatchResult;
}

/// Euclidean-distance matcher with full gallery traversal.
///
/// Always compares against every reference so timing does not leak the
/// gallery size or the position of the match.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher {
    pub empty_policy: EmptySetPolicy,
}

impl EuclideanMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matcher that accepts any face when there is nothing to compare against.
    pub fn accept_any_when_empty() -> Self {
        Self {
            empty_policy: EmptySetPolicy::AcceptAny,
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn find(&self, probe: &Descriptor, references: &ReferenceSet, threshold: f32) -> MatchResult {
        if references.is_empty() {
            return match self.empty_policy {
                EmptySetPolicy::Reject => MatchResult::NoMatch {
                    best_distance: None,
                },
                EmptySetPolicy::AcceptAny => {
                    tracing::warn!("empty reference set; accepting probe without comparison");
                    MatchResult::Unverified
                }
            };
        }

        let mut best: Option<(&Reference, f32)> = None;
        for reference in references.iter() {
            let distance = probe.distance(&reference.descriptor);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((reference, distance));
            }
        }

        match best {
            Some((reference, distance)) if distance <= threshold => MatchResult::Match {
                key: reference.key.clone(),
                distance,
            },
            Some((_, distance)) => MatchResult::NoMatch {
                best_distance: Some(distance),
            },
            None => MatchResult::NoMatch {
                best_distance: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(values: &[f32]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    #[test]
    fn test_best_match_is_last_entry() {
        let refs: ReferenceSet = vec![
            ("decoy1", d(&[0.0, 1.0, 0.0])),
            ("decoy2", d(&[0.0, 0.0, 1.0])),
            ("CS-001", d(&[1.0, 0.0, 0.0])),
        ]
        .into_iter()
        .collect();

        let result = EuclideanMatcher::new().find(&d(&[0.9, 0.1, 0.0]), &refs, 0.5);
        assert_eq!(result.key(), Some("CS-001"));
        assert!(result.distance().unwrap() < 0.2);
    }

    #[test]
    fn test_no_match_outside_threshold() {
        let refs = ReferenceSet::single("KA", d(&[1.0, 0.0]));
        let result = EuclideanMatcher::new().find(&d(&[0.0, 1.0]), &refs, 0.6);
        assert!(!result.is_match());
        let best = result.distance().unwrap();
        assert!((best - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let refs = ReferenceSet::single("KA", d(&[0.0, 0.0]));
        let probe = d(&[0.5, 0.0]);
        assert!(EuclideanMatcher::new().find(&probe, &refs, 0.5).is_match());
    }

    #[test]
    fn test_empty_set_rejects_by_default() {
        let result = EuclideanMatcher::new().find(&d(&[1.0]), &ReferenceSet::new(), 10.0);
        assert_eq!(result, MatchResult::NoMatch { best_distance: None });
    }

    #[test]
    fn test_empty_set_accept_any_is_explicit() {
        let result =
            EuclideanMatcher::accept_any_when_empty().find(&d(&[1.0]), &ReferenceSet::new(), 0.1);
        assert_eq!(result, MatchResult::Unverified);
        assert!(!result.is_match());

        // Non-empty sets still compare normally under the permissive policy.
        let refs = ReferenceSet::single("KA", d(&[0.0]));
        let result = EuclideanMatcher::accept_any_when_empty().find(&d(&[1.0]), &refs, 0.1);
        assert!(matches!(result, MatchResult::NoMatch { .. }));
    }

    #[test]
    fn test_lowering_threshold_never_creates_a_match() {
        let refs: ReferenceSet = vec![("a", d(&[0.0, 0.0])), ("b", d(&[1.0, 1.0]))]
            .into_iter()
            .collect();
        let probe = d(&[0.3, 0.2]);
        let matcher = EuclideanMatcher::new();

        let mut previously_matched = true;
        for step in (0..=20).rev() {
            let threshold = step as f32 * 0.05;
            let matched = matcher.find(&probe, &refs, threshold).is_match();
            assert!(
                previously_matched || !matched,
                "threshold {threshold} matched after a larger threshold did not"
            );
            previously_matched = matched;
        }
        assert!(!previously_matched);
    }

    #[test]
    fn test_insert_replaces_existing_identity() {
        let mut refs = ReferenceSet::new();
        refs.insert("CS-001", d(&[0.0]));
        refs.insert("CS-001", d(&[5.0]));
        assert_eq!(refs.len(), 1);

        let result = EuclideanMatcher::new().find(&d(&[5.0]), &refs, 0.1);
        assert_eq!(result.key(), Some("CS-001"));
    }
}
