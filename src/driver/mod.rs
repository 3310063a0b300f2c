mod energy;
mod logging;
mod pipeline;
mod state;

pub use energy::{fragment_energy, EnergyReport, FragmentEnergy};
pub use pipeline::{ErrorPolicy, FragmentPipeline};
pub use state::{ConvergenceFailure, ConvergenceState, DriverState};

use crate::bath::BathOptions;
use crate::error::BeError;
use crate::fragmentation::{partition, Partition};
use crate::hamiltonian::EmbeddingHamiltonian;
use crate::io::Configuration;
use crate::matching::{
    compute_residuals, ChemicalPotentials, MatchingLayout, MatchingScheme, Mixer, Residuals,
    UpdateRule,
};
use crate::solver::{FragmentResult, SolverKind};
use crate::system::System;
use crate::utils::Timer;
use log::{info, warn};
use ndarray::prelude::*;

/// Outcome of a converged bootstrap embedding calculation.
#[derive(Debug, Clone)]
pub struct BootstrapResult {
    pub energy: EnergyReport,
    pub potentials: ChemicalPotentials,
    pub iterations: usize,
    pub state: DriverState,
    /// driven residual norm of every iteration
    pub history: Vec<f64>,
    /// edge mismatch of the final iteration
    pub edge_mismatch: f64,
    pub fragment_results: Vec<FragmentResult>,
}

impl BootstrapResult {
    pub fn total_energy(&self) -> f64 {
        self.energy.total
    }

    pub fn correlation_energy(&self) -> f64 {
        self.energy.correlation
    }
}

/// A single fragment pass at zero matching potentials. The energy is the sum of the
/// center contributions without any self-consistency between the fragments.
#[derive(Debug, Clone)]
pub struct OneShotResult {
    pub fragment_energies: Vec<FragmentEnergy>,
    pub energy: f64,
    pub residuals: Residuals,
    pub fragment_results: Vec<FragmentResult>,
}

/// Self-consistency driver of bootstrap embedding.
///
/// The partition is built on construction, the baths and bare embedding Hamiltonians of all
/// fragments with the first call of [BootstrapEmbedding::step]. Every further step solves all
/// fragments at the current potentials, evaluates the residuals and updates the potentials
/// until the driven residual drops below the tolerance or the iteration limit is reached.
pub struct BootstrapEmbedding<'a> {
    system: &'a System,
    partition: Partition,
    layout: MatchingLayout,
    scheme: MatchingScheme,
    rule: UpdateRule,
    mixer: Box<dyn Mixer>,
    bath_options: BathOptions,
    solver: SolverKind,
    pipeline: FragmentPipeline,
    tolerance: f64,
    max_iterations: usize,
    monotone_after: usize,
    hamiltonians: Option<Vec<EmbeddingHamiltonian>>,
    state: DriverState,
    convergence: ConvergenceState,
    results: Vec<FragmentResult>,
    fragment_energies: Vec<FragmentEnergy>,
    energy: Option<EnergyReport>,
    failure: Option<BeError>,
}

impl<'a> BootstrapEmbedding<'a> {
    pub fn new(system: &'a System, config: &Configuration) -> Result<Self, BeError> {
        let partition: Partition = partition(
            &system.graph,
            &system.site_orbitals,
            &config.fragmentation_scheme(),
        )?;
        let pipeline: FragmentPipeline = FragmentPipeline::new(
            config.parallelism,
            config.error_policy(),
            config.convergence.projection_tolerance,
        )?;
        let scheme: MatchingScheme = config.matching.scheme;
        let rule: UpdateRule = config.update_rule();
        let layout: MatchingLayout = MatchingLayout::new(&partition, config.matching.metric);
        let mixer: Box<dyn Mixer> = rule.build(layout.n_driven(scheme));

        Ok(BootstrapEmbedding {
            system,
            convergence: ConvergenceState::new(ChemicalPotentials::zeros(&layout)),
            partition,
            layout,
            scheme,
            rule,
            mixer,
            bath_options: config.bath_options(),
            solver: config.solver_kind(),
            pipeline,
            tolerance: config.convergence.tolerance,
            max_iterations: config.convergence.max_iterations,
            monotone_after: config.convergence.monotone_after,
            hamiltonians: None,
            state: DriverState::Initializing,
            results: Vec::new(),
            fragment_energies: Vec::new(),
            energy: None,
            failure: None,
        })
    }

    /// Replace the fragment solver, e.g. by an external backend.
    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }

    /// Replace the partition built from the configuration. Only possible before the
    /// first step.
    pub fn with_partition(mut self, partition: Partition) -> Result<Self, BeError> {
        if self.state != DriverState::Initializing {
            return Err(BeError::Setup(String::from(
                "the partition cannot be changed after the first iteration",
            )));
        }
        if partition.n_sites != self.system.n_sites() {
            return Err(BeError::Setup(format!(
                "the partition covers {} sites, the system has {}",
                partition.n_sites,
                self.system.n_sites()
            )));
        }
        partition.validate()?;
        self.layout = MatchingLayout::new(&partition, self.layout.metric);
        self.mixer = self.rule.build(self.layout.n_driven(self.scheme));
        self.convergence = ConvergenceState::new(ChemicalPotentials::zeros(&self.layout));
        self.partition = partition;
        self.hamiltonians = None;
        Ok(self)
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn convergence(&self) -> &ConvergenceState {
        &self.convergence
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn layout(&self) -> &MatchingLayout {
        &self.layout
    }

    /// Fragment results of the last pass.
    pub fn results(&self) -> &[FragmentResult] {
        &self.results
    }

    /// The total energy, only available after convergence.
    pub fn total_energy(&self) -> Option<f64> {
        match self.state {
            DriverState::Converged => self.energy.as_ref().map(|e| e.total),
            _ => None,
        }
    }

    pub fn energy_report(&self) -> Option<&EnergyReport> {
        match self.state {
            DriverState::Converged => self.energy.as_ref(),
            _ => None,
        }
    }

    /// The error that moved the driver into the failed state.
    pub fn failure(&self) -> Option<&BeError> {
        self.failure.as_ref()
    }

    fn fail(&mut self, err: BeError) -> BeError {
        self.state = DriverState::Failed;
        self.failure = Some(err.clone());
        err
    }

    fn convergence_failure(&self) -> ConvergenceFailure {
        ConvergenceFailure {
            iterations: self.convergence.iteration,
            mismatch: self.convergence.mismatch,
            edge_mismatch: self.convergence.edge_mismatch,
            fragment_energies: self.fragment_energies.clone(),
            potentials: self.convergence.potentials.clone(),
        }
    }

    fn prepare(&mut self) -> Result<(), BeError> {
        if self.hamiltonians.is_none() {
            let hamiltonians: Vec<EmbeddingHamiltonian> =
                self.pipeline
                    .prepare(self.system, &self.partition, &self.bath_options)?;
            self.hamiltonians = Some(hamiltonians);
        }
        Ok(())
    }

    fn solve_fragments(
        &self,
        potentials: &ChemicalPotentials,
    ) -> Result<(Vec<FragmentResult>, Vec<FragmentEnergy>), BeError> {
        let hamiltonians: &[EmbeddingHamiltonian] = match self.hamiltonians.as_ref() {
            Some(h) => h,
            None => return Err(BeError::Setup(String::from("fragments are not prepared"))),
        };
        let results: Vec<FragmentResult> =
            self.pipeline
                .run(hamiltonians, potentials, &self.layout, &self.solver)?;
        let energies: Vec<FragmentEnergy> = hamiltonians
            .iter()
            .zip(results.iter())
            .map(|(ham, res)| fragment_energy(ham, res))
            .collect();
        Ok((results, energies))
    }

    /// One outer iteration of the bootstrap loop. Terminal states are returned unchanged,
    /// in the failed state the stored error is returned again.
    pub fn step(&mut self) -> Result<DriverState, BeError> {
        match self.state {
            DriverState::Converged => return Ok(DriverState::Converged),
            DriverState::Failed => {
                return Err(self.failure.clone().unwrap_or_else(|| {
                    BeError::Setup(String::from("driver failed without error"))
                }))
            }
            DriverState::Initializing | DriverState::Iterating => {}
        }

        if self.convergence.iteration >= self.max_iterations {
            let failure: ConvergenceFailure = self.convergence_failure();
            return Err(self.fail(BeError::Convergence(failure)));
        }
        if self.state == DriverState::Initializing {
            if let Err(err) = self.prepare() {
                return Err(self.fail(err));
            }
            self.state = DriverState::Iterating;
        }

        let (results, energies) = match self.solve_fragments(&self.convergence.potentials) {
            Ok(out) => out,
            Err(err) => return Err(self.fail(err)),
        };
        self.convergence.iteration += 1;

        let residuals: Residuals =
            compute_residuals(&self.partition, &self.layout, &results, self.system.n_elec);
        let mismatch: f64 = residuals.norm(self.scheme);
        self.convergence.mismatch = Some(mismatch);
        self.convergence.edge_mismatch = Some(residuals.edge_norm);
        self.convergence.electron_residual = Some(residuals.electron);
        self.convergence.history.push(mismatch);
        self.results = results;
        self.fragment_energies = energies;
        logging::iteration(
            self.convergence.iteration,
            mismatch,
            residuals.edge_norm,
            residuals.electron,
            self.convergence.potentials.mu,
        );

        if mismatch < self.tolerance {
            self.convergence.converged = true;
            self.energy = Some(EnergyReport::new(
                self.fragment_energies.clone(),
                self.system.e_nuc,
                self.system.e_ref,
            ));
            self.state = DriverState::Converged;
            return Ok(DriverState::Converged);
        }

        let x: Array1<f64> = self.convergence.potentials.to_vector(self.scheme);
        let x_new: Array1<f64> = self.mixer.next(x, residuals.driven(self.scheme));
        if x_new.iter().any(|v| !v.is_finite()) {
            warn!("the potential update produced non-finite values");
            let failure: ConvergenceFailure = self.convergence_failure();
            return Err(self.fail(BeError::Convergence(failure)));
        }
        self.convergence.potentials.update(self.scheme, x_new.view());
        Ok(DriverState::Iterating)
    }

    /// Iterate until convergence or failure.
    pub fn run(&mut self) -> Result<BootstrapResult, BeError> {
        let timer: Timer = Timer::start("BE wall time:");
        logging::be_init(
            &self.partition,
            self.solver.name(),
            match self.scheme {
                MatchingScheme::GlobalScalar => "global chemical potential",
                MatchingScheme::PerFragment => "edge densities",
            },
            self.mixer.name(),
            self.max_iterations,
            self.tolerance,
        );
        logging::iteration_header();
        loop {
            match self.step() {
                Ok(DriverState::Converged) => break,
                Ok(_) => continue,
                Err(err) => {
                    logging::be_failed(&timer, &err.to_string());
                    return Err(err);
                }
            }
        }
        if !self.convergence.is_monotone_after(self.monotone_after) {
            warn!(
                "the mismatch did not decrease monotonically after iteration {}",
                self.monotone_after
            );
        }
        let energy: EnergyReport = match self.energy.clone() {
            Some(e) => e,
            None => return Err(BeError::Setup(String::from("converged without energy"))),
        };
        logging::be_end(&timer, &energy, self.convergence.iteration);

        Ok(BootstrapResult {
            energy,
            potentials: self.convergence.potentials.clone(),
            iterations: self.convergence.iteration,
            state: self.state,
            history: self.convergence.history.clone(),
            edge_mismatch: self.convergence.edge_mismatch.unwrap_or(0.0),
            fragment_results: self.results.clone(),
        })
    }

    /// A single pass over all fragments at zero potentials. The iteration state of the
    /// driver is not changed.
    pub fn oneshot(&mut self) -> Result<OneShotResult, BeError> {
        self.prepare()?;
        let zero: ChemicalPotentials = ChemicalPotentials::zeros(&self.layout);
        let (results, energies) = self.solve_fragments(&zero)?;
        let residuals: Residuals =
            compute_residuals(&self.partition, &self.layout, &results, self.system.n_elec);
        let energy: f64 =
            energies.iter().map(|e| e.total()).sum::<f64>() + self.system.e_nuc;
        info!("{:<26} {:>24.14} Hartree", "one-shot energy:", energy);
        info!("{:<26} {:>24.6e}", "edge mismatch:", residuals.edge_norm);
        Ok(OneShotResult {
            fragment_energies: energies,
            energy,
            residuals,
            fragment_results: results,
        })
    }
}
