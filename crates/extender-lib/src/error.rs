//! Errors of a single scheduling decision

use crate::cluster::ClusterError;
use crate::extender::Outcome;
use crate::podspec::PodSpecError;
use crate::store::StoreError;
use thiserror::Error;

/// Why a pod could not be placed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtenderError {
    #[error("pod is not a spark driver or executor")]
    NonSparkPod,

    #[error("earlier drivers do not fit to the cluster")]
    EarlierDriversDoNotFit,

    #[error("application does not fit to the cluster")]
    ApplicationDoesNotFit,

    #[error("application has no free executor capacity on the candidate nodes")]
    NoExecutorCapacity,

    #[error("application reached its maximum executor count")]
    ExecutorLimitReached,

    #[error("executor is already bound to node {node}, which is not a candidate")]
    BoundNodeNotCandidate { node: String },

    #[error("failed to reconcile: {0}")]
    Reconcile(StoreError),

    #[error("no reservation found for application {0}")]
    ReservationNotFound(String),

    #[error(transparent)]
    PodSpec(#[from] PodSpecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl ExtenderError {
    pub fn outcome(&self) -> Outcome {
        match self {
            ExtenderError::NonSparkPod => Outcome::FailureNonSparkPod,
            ExtenderError::EarlierDriversDoNotFit => Outcome::FailureEarlierDriver,
            ExtenderError::ApplicationDoesNotFit => Outcome::FailureFit,
            ExtenderError::NoExecutorCapacity
            | ExtenderError::ExecutorLimitReached
            | ExtenderError::BoundNodeNotCandidate { .. } => Outcome::FailureUnbound,
            ExtenderError::Reconcile(_)
            | ExtenderError::ReservationNotFound(_)
            | ExtenderError::PodSpec(_)
            | ExtenderError::Store(_)
            | ExtenderError::Cluster(_) => Outcome::FailureInternal,
        }
    }

    /// Errors that point at a fault rather than a lack of capacity
    pub fn is_internal(&self) -> bool {
        self.outcome() == Outcome::FailureInternal
    }
}

pub type ExtenderResult<T> = Result<T, ExtenderError>;
