use crate::bath::BathConstructionError;
use crate::driver::ConvergenceFailure;
use crate::fragmentation::PartitionError;
use crate::hamiltonian::ProjectionError;
use crate::solver::SolverError;
use crate::system::SystemError;
use std::fmt;

/// Any failure of an embedding run.
#[derive(Debug, Clone)]
pub enum BeError {
    System(SystemError),
    Partition(PartitionError),
    Bath(BathConstructionError),
    Projection(ProjectionError),
    Solver(SolverError),
    Convergence(ConvergenceFailure),
    Setup(String),
}

impl BeError {
    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            BeError::System(_) => "system",
            BeError::Partition(_) => "partition",
            BeError::Bath(_) => "bath",
            BeError::Projection(_) => "projection",
            BeError::Solver(_) => "solver",
            BeError::Convergence(_) => "convergence",
            BeError::Setup(_) => "setup",
        }
    }

    /// The fragment the error belongs to, if it is specific to one fragment.
    pub fn fragment(&self) -> Option<usize> {
        match self {
            BeError::Partition(err) => err.fragment(),
            BeError::Bath(err) => Some(err.fragment),
            BeError::Projection(err) => Some(err.fragment),
            BeError::Solver(err) => Some(err.fragment),
            _ => None,
        }
    }
}

impl fmt::Display for BeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BeError::System(err) => write!(f, "{}", err),
            BeError::Partition(err) => write!(f, "invalid partition: {}", err),
            BeError::Bath(err) => write!(f, "{}", err),
            BeError::Projection(err) => write!(f, "{}", err),
            BeError::Solver(err) => write!(f, "{}", err),
            BeError::Convergence(err) => write!(f, "{}", err),
            BeError::Setup(msg) => write!(f, "invalid setup: {}", msg),
        }
    }
}

impl std::error::Error for BeError {}

impl From<SystemError> for BeError {
    fn from(err: SystemError) -> Self {
        BeError::System(err)
    }
}

impl From<PartitionError> for BeError {
    fn from(err: PartitionError) -> Self {
        BeError::Partition(err)
    }
}

impl From<BathConstructionError> for BeError {
    fn from(err: BathConstructionError) -> Self {
        BeError::Bath(err)
    }
}

impl From<ProjectionError> for BeError {
    fn from(err: ProjectionError) -> Self {
        BeError::Projection(err)
    }
}

impl From<SolverError> for BeError {
    fn from(err: SolverError) -> Self {
        BeError::Solver(err)
    }
}

impl From<ConvergenceFailure> for BeError {
    fn from(err: ConvergenceFailure) -> Self {
        BeError::Convergence(err)
    }
}
