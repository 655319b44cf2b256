//! Capability dependency validation.
//!
//! [`validate`] walks a stage list in declared order with a running
//! *established* set. Each stage's requirements are checked against the set
//! before its own provides are added, so a stage never satisfies itself and
//! a dependency on a later stage is always reported.

use ctxware_core::{CapabilitySet, Tag};
use thiserror::Error;

use crate::stage::BoxedStage;

/// A stage requires a capability that nothing before it establishes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "stage #{stage_index} ('{stage_name}') requires capability '{missing}', \
     which no earlier stage provides"
)]
pub struct DependencyError {
    /// The first unmet tag, in tag order.
    pub missing: Tag,
    /// Position of the offending stage in the declared list.
    pub stage_index: usize,
    /// Name of the offending stage.
    pub stage_name: String,
}

/// Checks that every stage's requirements are met by `base` plus the
/// provides of the stages before it.
///
/// Returns the final established set: `base` plus everything provided.
pub fn validate(stages: &[BoxedStage], base: &CapabilitySet) -> Result<CapabilitySet, DependencyError> {
    let mut established = base.clone();

    for (stage_index, stage) in stages.iter().enumerate() {
        let requires = stage.requires();
        if let Some(missing) = requires.iter().find(|tag| !established.contains(tag)) {
            tracing::debug!(
                stage = stage.name(),
                stage_index,
                missing = %missing,
                established = %established,
                "pipeline dependency unmet"
            );
            return Err(DependencyError {
                missing: missing.clone(),
                stage_index,
                stage_name: stage.name().to_string(),
            });
        }
        established.extend_from(&stage.provides());
    }

    tracing::trace!(
        stages = stages.len(),
        established = %established,
        "pipeline dependencies validated"
    );
    Ok(established)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Next, Stage};
    use crate::types::{BoxFuture, Request};
    use crate::ResponseSink;
    use ctxware_core::{Carrier, StageResult};
    use proptest::prelude::*;
    use std::sync::Arc;

    struct Declared {
        name: String,
        provides: CapabilitySet,
        requires: CapabilitySet,
    }

    impl Stage for Declared {
        fn name(&self) -> &str {
            &self.name
        }

        fn provides(&self) -> CapabilitySet {
            self.provides.clone()
        }

        fn requires(&self) -> CapabilitySet {
            self.requires.clone()
        }

        fn handle<'a>(
            &'a self,
            carrier: Carrier,
            request: &'a Request,
            sink: &'a mut ResponseSink,
            next: Next<'a>,
        ) -> BoxFuture<'a, StageResult> {
            next.run(carrier, request, sink)
        }
    }

    fn declared(name: &str, provides: &[&'static str], requires: &[&'static str]) -> BoxedStage {
        Arc::new(Declared {
            name: name.to_string(),
            provides: provides.iter().copied().collect(),
            requires: requires.iter().copied().collect(),
        })
    }

    #[test]
    fn test_empty_list_is_valid() {
        let established = validate(&[], &CapabilitySet::new()).unwrap();
        assert!(established.is_empty());
    }

    #[test]
    fn test_provider_before_consumer() {
        let stages = [declared("x", &["X"], &[]), declared("y", &["Y"], &["X"])];
        let established = validate(&stages, &CapabilitySet::new()).unwrap();
        assert_eq!(established, CapabilitySet::from_iter(["X", "Y"]));
    }

    #[test]
    fn test_consumer_before_provider_fails() {
        let stages = [declared("y", &["Y"], &["X"]), declared("x", &["X"], &[])];
        let err = validate(&stages, &CapabilitySet::new()).unwrap_err();

        assert_eq!(err.missing, Tag::from("X"));
        assert_eq!(err.stage_index, 0);
        assert_eq!(err.stage_name, "y");
        assert!(err.to_string().contains("'X'"));
    }

    #[test]
    fn test_stage_cannot_satisfy_itself() {
        let stages = [declared("loop", &["X"], &["X"])];
        let err = validate(&stages, &CapabilitySet::new()).unwrap_err();
        assert_eq!(err.missing, Tag::from("X"));
        assert_eq!(err.stage_index, 0);
    }

    #[test]
    fn test_base_set_satisfies_requirements() {
        let stages = [declared("limit", &[], &["transport.remote_addr"])];
        let base = CapabilitySet::from_iter(["transport.remote_addr"]);

        assert!(validate(&stages, &CapabilitySet::new()).is_err());
        let established = validate(&stages, &base).unwrap();
        assert!(established.contains_name("transport.remote_addr"));
    }

    #[test]
    fn test_first_missing_tag_is_reported() {
        let stages = [
            declared("a", &["A"], &[]),
            declared("b", &[], &["A", "C", "B"]),
        ];
        let err = validate(&stages, &CapabilitySet::new()).unwrap_err();
        assert_eq!(err.missing, Tag::from("B"));
        assert_eq!(err.stage_index, 1);
    }

    const TAGS: [&str; 5] = ["a", "b", "c", "d", "e"];

    fn tag_subset() -> impl Strategy<Value = CapabilitySet> {
        proptest::sample::subsequence(TAGS.to_vec(), 0..=2)
            .prop_map(|tags| tags.into_iter().collect::<CapabilitySet>())
    }

    fn stage_specs() -> impl Strategy<Value = Vec<(CapabilitySet, CapabilitySet)>> {
        proptest::collection::vec((tag_subset(), tag_subset()), 0..6)
    }

    fn build(specs: Vec<(CapabilitySet, CapabilitySet)>) -> Vec<BoxedStage> {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (provides, requires))| {
                Arc::new(Declared {
                    name: format!("s{i}"),
                    provides,
                    requires,
                }) as BoxedStage
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_accepted_lists_meet_every_requirement(specs in stage_specs()) {
            let stages = build(specs);
            if let Ok(established) = validate(&stages, &CapabilitySet::new()) {
                let mut seen = CapabilitySet::new();
                for stage in &stages {
                    prop_assert!(stage.requires().is_subset(&seen));
                    seen.extend_from(&stage.provides());
                }
                prop_assert_eq!(established, seen);
            }
        }

        #[test]
        fn prop_rejected_lists_name_a_real_gap(specs in stage_specs()) {
            let stages = build(specs);
            if let Err(err) = validate(&stages, &CapabilitySet::new()) {
                let earlier = stages[..err.stage_index]
                    .iter()
                    .fold(CapabilitySet::new(), |acc, s| acc.union(&s.provides()));
                prop_assert!(stages[err.stage_index].requires().contains(&err.missing));
                prop_assert!(!earlier.contains(&err.missing));
            }
        }
    }
}
