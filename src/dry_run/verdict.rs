//! GO / WARNING / NO-GO readiness verdict.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Below this pass rate the dataset is not ready for training.
pub const NO_GO_PASS_RATE: f64 = 0.5;
/// Below this pass rate training is allowed with a warning.
pub const WARNING_PASS_RATE: f64 = 0.7;
/// Below this average score training is allowed with a warning.
pub const WARNING_AVG_SCORE: f64 = 0.6;

/// Readiness signal computed from a dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "GO")]
    Go,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "NO-GO")]
    NoGo,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Go => "GO",
            Self::Warning => "WARNING",
            Self::NoGo => "NO-GO",
        }
    }

    pub fn allows_training(self) -> bool {
        self != Self::NoGo
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verdict with every reason that contributed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictAssessment {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
}

impl VerdictAssessment {
    /// Derive the verdict from pass rate and average score alone.
    ///
    /// A NO-GO from the pass rate dominates; the average-score reason is
    /// still recorded when it fires.
    pub fn assess(pass_rate: f64, avg_score: f64) -> Self {
        let mut verdict = Verdict::Go;
        let mut reasons = Vec::new();

        if pass_rate < NO_GO_PASS_RATE {
            verdict = Verdict::NoGo;
            reasons.push(format!(
                "pass rate too low: {:.1}% (minimum {:.0}%)",
                pass_rate * 100.0,
                NO_GO_PASS_RATE * 100.0
            ));
        } else if pass_rate < WARNING_PASS_RATE {
            verdict = Verdict::Warning;
            reasons.push(format!(
                "pass rate {:.1}% is below the recommended {:.0}%",
                pass_rate * 100.0,
                WARNING_PASS_RATE * 100.0
            ));
        }

        if avg_score < WARNING_AVG_SCORE {
            if verdict != Verdict::NoGo {
                verdict = Verdict::Warning;
            }
            reasons.push(format!(
                "average score {:.2} is below the recommended {:.2}",
                avg_score, WARNING_AVG_SCORE
            ));
        }

        Self { verdict, reasons }
    }

    pub fn ready_for_training(&self) -> bool {
        self.verdict.allows_training()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_pass_rate_is_no_go() {
        let assessment = VerdictAssessment::assess(0.45, 0.9);
        assert_eq!(assessment.verdict, Verdict::NoGo);
        assert_eq!(assessment.reasons.len(), 1);
        assert!(assessment.reasons[0].starts_with("pass rate too low"));
        assert!(!assessment.ready_for_training());
    }

    #[test]
    fn test_both_warnings_are_recorded() {
        let assessment = VerdictAssessment::assess(0.65, 0.55);
        assert_eq!(assessment.verdict, Verdict::Warning);
        assert_eq!(assessment.reasons.len(), 2);
        assert!(assessment.reasons[0].contains("65.0%"));
        assert!(assessment.reasons[1].contains("0.55"));
        assert!(assessment.ready_for_training());
    }

    #[test]
    fn test_healthy_run_is_go() {
        let assessment = VerdictAssessment::assess(0.85, 0.9);
        assert_eq!(assessment.verdict, Verdict::Go);
        assert!(assessment.reasons.is_empty());
    }

    #[test]
    fn test_low_average_alone_warns() {
        let assessment = VerdictAssessment::assess(0.9, 0.5);
        assert_eq!(assessment.verdict, Verdict::Warning);
        assert_eq!(assessment.reasons.len(), 1);
    }

    #[test]
    fn test_no_go_keeps_average_reason() {
        let assessment = VerdictAssessment::assess(0.2, 0.3);
        assert_eq!(assessment.verdict, Verdict::NoGo);
        assert_eq!(assessment.reasons.len(), 2);
    }

    #[test]
    fn test_verdict_is_pure() {
        for (rate, avg) in [(0.0, 0.0), (0.5, 0.6), (0.7, 0.59), (1.0, 1.0)] {
            assert_eq!(
                VerdictAssessment::assess(rate, avg),
                VerdictAssessment::assess(rate, avg)
            );
        }
        assert_eq!(VerdictAssessment::assess(0.5, 0.6).verdict, Verdict::Warning);
        assert_eq!(VerdictAssessment::assess(0.7, 0.6).verdict, Verdict::Go);
    }

    #[test]
    fn test_serialized_names() {
        let json = serde_json::to_string(&Verdict::NoGo).expect("serialize");
        assert_eq!(json, "\"NO-GO\"");
    }
}
