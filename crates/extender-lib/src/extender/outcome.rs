use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one scheduling decision, used as a metric label value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    SuccessAlreadyBound,
    SuccessRescheduled,
    SuccessScheduledExtraExecutor,
    FailureUnbound,
    FailureInternal,
    FailureFit,
    FailureFitExtraExecutor,
    FailureEarlierDriver,
    FailureNonSparkPod,
}

impl Outcome {
    pub const ALL: [Outcome; 10] = [
        Outcome::Success,
        Outcome::SuccessAlreadyBound,
        Outcome::SuccessRescheduled,
        Outcome::SuccessScheduledExtraExecutor,
        Outcome::FailureUnbound,
        Outcome::FailureInternal,
        Outcome::FailureFit,
        Outcome::FailureFitExtraExecutor,
        Outcome::FailureEarlierDriver,
        Outcome::FailureNonSparkPod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::SuccessAlreadyBound => "success-already-bound",
            Outcome::SuccessRescheduled => "success-rescheduled",
            Outcome::SuccessScheduledExtraExecutor => "success-scheduled-extra-executor",
            Outcome::FailureUnbound => "failure-unbound",
            Outcome::FailureInternal => "failure-internal",
            Outcome::FailureFit => "failure-fit",
            Outcome::FailureFitExtraExecutor => "failure-fit-extra-executor",
            Outcome::FailureEarlierDriver => "failure-earlier-driver",
            Outcome::FailureNonSparkPod => "failure-non-spark-pod",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
