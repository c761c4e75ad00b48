//! Workflow steps and their fixed ordering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// A stage in the refinement-to-deployment pipeline.
///
/// Variants are declared in pipeline order, so the derived `Ord` matches
/// the order a workflow walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    TopicsConfig,
    Categorize,
    CoverageGeneration,
    GraderConfig,
    DryRun,
    Training,
    Deployment,
    Completed,
}

impl Step {
    /// All steps in pipeline order.
    pub const ALL: [Step; 8] = [
        Step::TopicsConfig,
        Step::Categorize,
        Step::CoverageGeneration,
        Step::GraderConfig,
        Step::DryRun,
        Step::Training,
        Step::Deployment,
        Step::Completed,
    ];

    /// Position of this step in the pipeline, starting at zero.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The step immediately following this one.
    pub fn next(self) -> Option<Step> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// The step immediately preceding this one.
    pub fn previous(self) -> Option<Step> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn is_terminal(self) -> bool {
        self == Step::Completed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::TopicsConfig => "topics_config",
            Step::Categorize => "categorize",
            Step::CoverageGeneration => "coverage_generation",
            Step::GraderConfig => "grader_config",
            Step::DryRun => "dry_run",
            Step::Training => "training",
            Step::Deployment => "deployment",
            Step::Completed => "completed",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == needle)
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "Unknown step '{}'; expected one of: {}",
                    s,
                    Self::ALL.map(|s| s.as_str()).join(", ")
                ))
            })
    }
}

/// Progress of a single step, derived from the workflow's current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_walks_pipeline_order() {
        let mut step = Step::TopicsConfig;
        let mut visited = vec![step];
        while let Some(next) = step.next() {
            assert_eq!(next.index(), step.index() + 1);
            visited.push(next);
            step = next;
        }
        assert_eq!(visited, Step::ALL.to_vec());
        assert!(Step::Completed.next().is_none());
    }

    #[test]
    fn test_previous() {
        assert_eq!(Step::TopicsConfig.previous(), None);
        assert_eq!(Step::DryRun.previous(), Some(Step::GraderConfig));
    }

    #[test]
    fn test_parse_and_display() {
        for step in Step::ALL {
            let parsed: Step = step.as_str().parse().expect("should parse");
            assert_eq!(parsed, step);
            assert_eq!(step.to_string(), step.as_str());
        }
        assert!("Dry_Run".parse::<Step>().is_ok());
        assert!("unknown".parse::<Step>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&Step::CoverageGeneration).expect("serialize");
        assert_eq!(json, "\"coverage_generation\"");
        let status = serde_json::to_string(&StepStatus::InProgress).expect("serialize");
        assert_eq!(status, "\"in_progress\"");
    }

    #[test]
    fn test_ordering_matches_pipeline() {
        assert!(Step::TopicsConfig < Step::Categorize);
        assert!(Step::Deployment < Step::Completed);
        assert!(Step::Completed.is_terminal());
        assert!(!Step::Training.is_terminal());
    }
}
