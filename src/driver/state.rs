use crate::driver::energy::FragmentEnergy;
use crate::matching::ChemicalPotentials;
use std::fmt;

/// Position of the driver in the bootstrap loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Initializing,
    Iterating,
    Converged,
    Failed,
}

impl DriverState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DriverState::Converged | DriverState::Failed)
    }
}

/// Everything the driver carries from one iteration to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceState {
    /// number of completed fragment passes
    pub iteration: usize,
    pub potentials: ChemicalPotentials,
    /// norm of the driven residual of the last pass
    pub mismatch: Option<f64>,
    /// Frobenius norm of all edge residuals of the last pass
    pub edge_mismatch: Option<f64>,
    /// electron count residual of the last pass
    pub electron_residual: Option<f64>,
    /// driven residual norm of every pass
    pub history: Vec<f64>,
    pub converged: bool,
}

impl ConvergenceState {
    pub fn new(potentials: ChemicalPotentials) -> Self {
        ConvergenceState {
            iteration: 0,
            potentials,
            mismatch: None,
            edge_mismatch: None,
            electron_residual: None,
            history: Vec::new(),
            converged: false,
        }
    }

    /// True if the residual history does not increase from iteration `n` on.
    pub fn is_monotone_after(&self, n: usize) -> bool {
        if self.history.len() <= n {
            return true;
        }
        self.history[n..].windows(2).all(|w| w[1] <= w[0])
    }
}

/// The bootstrap loop stopped before the residual dropped below the tolerance. Only
/// the energies of the last fragment pass are reported, a total energy is never formed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceFailure {
    pub iterations: usize,
    pub mismatch: Option<f64>,
    pub edge_mismatch: Option<f64>,
    pub fragment_energies: Vec<FragmentEnergy>,
    pub potentials: ChemicalPotentials,
}

impl fmt::Display for ConvergenceFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "bootstrap embedding did not converge in {} iterations",
            self.iterations
        )?;
        if let Some(mismatch) = self.mismatch {
            write!(f, " (last mismatch {:.3e})", mismatch)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConvergenceFailure {}
