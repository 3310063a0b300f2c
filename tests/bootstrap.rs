use approx::assert_abs_diff_eq;
use bemb::fragmentation::FragmentSpec;
use bemb::hamiltonian::EmbeddingHamiltonian;
use bemb::io::{BathKind, FragmentationKind, PolicyKind, SolverName};
use bemb::matching::MatchingScheme;
use bemb::solver::{
    CiOptions, CiSolver, FragmentResult, FragmentSolver, SolverError, SolverErrorKind,
    SolverGuess, SolverKind,
};
use bemb::{
    BeError, BootstrapEmbedding, BootstrapResult, Configuration, DriverState, LatticeModel,
    System,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn hubbard_chain(n: usize, u: f64) -> System {
    let model = LatticeModel::chain(n, 1.0, u).build().unwrap();
    System::from_provider(&model).unwrap()
}

fn ionic_chain(n: usize) -> System {
    let model = LatticeModel::chain(n, 1.0, 2.0)
        .with_site_energies(vec![0.5, -0.5])
        .build()
        .unwrap();
    System::from_provider(&model).unwrap()
}

fn mean_field_config() -> Configuration {
    let mut config: Configuration = Configuration::default();
    config.solver.kind = SolverName::MeanField;
    config
}

#[test]
fn hf_in_hf_reproduces_the_reference_energy() {
    init_logger();
    let system: System = hubbard_chain(8, 2.0);
    let config: Configuration = mean_field_config();
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config).unwrap();
    assert!(driver.partition().n_fragments() > 1);
    let result: BootstrapResult = driver.run().unwrap();
    assert_eq!(result.state, DriverState::Converged);
    assert_eq!(result.iterations, 1);
    assert_abs_diff_eq!(result.total_energy(), system.e_ref, epsilon = 1e-8);
    assert_abs_diff_eq!(result.correlation_energy(), 0.0, epsilon = 1e-8);
    assert_eq!(driver.total_energy(), Some(result.total_energy()));
}

#[test]
fn hf_in_hf_with_extended_bath_and_full_blocks() {
    init_logger();
    let system: System = ionic_chain(8);
    let mut config: Configuration = mean_field_config();
    config.bath.policy = BathKind::Extended;
    config.bath.n_bath = 4;
    config.matching.metric = bemb::matching::MatchingMetric::FullBlock;
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config).unwrap();
    let result: BootstrapResult = driver.run().unwrap();
    assert_eq!(result.iterations, 1);
    assert!(result.edge_mismatch < 1e-6);
    assert_abs_diff_eq!(result.total_energy(), system.e_ref, epsilon = 1e-8);
}

#[test]
fn trivial_partition_gives_the_solver_energy() {
    init_logger();
    let system: System = hubbard_chain(4, 2.0);
    let mut config: Configuration = Configuration::default();
    config.fragmentation.n_be = 10;
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config).unwrap();
    assert!(driver.partition().is_trivial());
    let result: BootstrapResult = driver.run().unwrap();

    let ham: EmbeddingHamiltonian =
        EmbeddingHamiltonian::from_integrals(0, system.h.clone(), system.eri.clone(), 4);
    let fci: FragmentResult = CiSolver::fci(CiOptions::default())
        .solve(&ham, &SolverGuess::new(system.density.clone()))
        .unwrap();
    assert_eq!(result.iterations, 1);
    assert_abs_diff_eq!(result.total_energy(), fci.energy + system.e_nuc, epsilon = 1e-8);
    assert!(result.correlation_energy() < 0.0);
}

#[test]
fn two_site_fragments_agree_on_their_edges() {
    init_logger();
    let (t, u): (f64, f64) = (1.0, 4.0);
    let system: System = hubbard_chain(2, u);
    let mut config: Configuration = Configuration::default();
    config.fragmentation.scheme = FragmentationKind::User;
    config.fragmentation.fragments = vec![
        FragmentSpec {
            sites: vec![0, 1],
            center: vec![0],
        },
        FragmentSpec {
            sites: vec![0, 1],
            center: vec![1],
        },
    ];
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config).unwrap();
    let result: BootstrapResult = driver.run().unwrap();
    assert!(result.edge_mismatch < 1e-6);
    let first: &FragmentResult = &result.fragment_results[0];
    let second: &FragmentResult = &result.fragment_results[1];
    assert_abs_diff_eq!(first.rdm1[[1, 1]], second.rdm1[[1, 1]], epsilon = 1e-6);
    assert_abs_diff_eq!(first.rdm1[[0, 0]], second.rdm1[[0, 0]], epsilon = 1e-6);
    let exact: f64 = 0.5 * u - (0.25 * u * u + 4.0 * t * t).sqrt();
    assert_abs_diff_eq!(result.total_energy(), exact, epsilon = 1e-8);
}

#[test]
fn zero_iterations_fail_without_a_pass() {
    init_logger();
    let system: System = hubbard_chain(6, 2.0);
    let mut config: Configuration = mean_field_config();
    config.convergence.max_iterations = 0;
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config).unwrap();
    match driver.step() {
        Err(BeError::Convergence(failure)) => {
            assert_eq!(failure.iterations, 0);
            assert_eq!(failure.mismatch, None);
            assert!(failure.fragment_energies.is_empty());
        }
        other => panic!("unexpected outcome {:?}", other.map(|_| ())),
    }
    assert_eq!(driver.state(), DriverState::Failed);
    assert_eq!(driver.total_energy(), None);
    // the failed state is terminal
    assert!(driver.step().is_err());
    assert!(driver.run().is_err());
}

#[test]
fn iteration_limit_is_checked_before_the_baths_are_built() {
    init_logger();
    let system: System = hubbard_chain(6, 2.0);
    let mut config: Configuration = mean_field_config();
    config.bath.policy = BathKind::Extended;
    config.bath.n_bath = 100;
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config).unwrap();
    assert_eq!(driver.run().unwrap_err().stage(), "bath");

    config.convergence.max_iterations = 0;
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config).unwrap();
    let err: BeError = driver.step().unwrap_err();
    assert_eq!(err.stage(), "convergence");
    assert_eq!(driver.state(), DriverState::Failed);
}

struct FailingSolver {
    calls: AtomicUsize,
}

impl FragmentSolver for FailingSolver {
    fn name(&self) -> &str {
        "failing"
    }

    fn solve(
        &self,
        ham: &EmbeddingHamiltonian,
        _guess: &SolverGuess,
    ) -> Result<FragmentResult, SolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SolverError::new(
            ham.fragment,
            SolverErrorKind::Backend(String::from("backend unavailable")),
        ))
    }
}

#[test]
fn solver_failure_stops_the_run() {
    init_logger();
    let system: System = hubbard_chain(8, 2.0);
    let mut config: Configuration = Configuration::default();
    config.parallelism = 1;
    let solver: Arc<FailingSolver> = Arc::new(FailingSolver {
        calls: AtomicUsize::new(0),
    });
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config)
        .unwrap()
        .with_solver(SolverKind::External(solver.clone()));
    let err: BeError = driver.run().unwrap_err();
    assert_eq!(err.stage(), "solver");
    assert_eq!(err.fragment(), Some(0));
    assert_eq!(driver.state(), DriverState::Failed);
    assert_eq!(driver.total_energy(), None);
    // the remaining fragments are skipped after the first failure
    assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
}

// fails on the first attempt of every fragment and uses full CI afterwards
struct FlakySolver {
    fci: CiSolver,
}

impl FragmentSolver for FlakySolver {
    fn name(&self) -> &str {
        "flaky"
    }

    fn solve(
        &self,
        ham: &EmbeddingHamiltonian,
        guess: &SolverGuess,
    ) -> Result<FragmentResult, SolverError> {
        if guess.attempt == 0 {
            return Err(SolverError::new(
                ham.fragment,
                SolverErrorKind::NotConverged {
                    iterations: 1,
                    residual: 1.0,
                },
            ));
        }
        self.fci.solve(ham, guess)
    }
}

#[test]
fn retry_policy_recovers_from_solver_failures() {
    init_logger();
    let system: System = hubbard_chain(4, 2.0);
    let mut config: Configuration = Configuration::default();
    config.solver.error_policy = PolicyKind::Retry;
    config.solver.max_retries = 1;
    let solver: SolverKind = SolverKind::External(Arc::new(FlakySolver {
        fci: CiSolver::fci(CiOptions::default()),
    }));
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config)
        .unwrap()
        .with_solver(solver.clone());
    let result: BootstrapResult = driver.run().unwrap();
    assert_eq!(result.state, DriverState::Converged);

    config.solver.error_policy = PolicyKind::FailFast;
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config)
        .unwrap()
        .with_solver(solver);
    assert!(driver.run().is_err());
}

#[test]
fn chemical_potential_matching_converges() {
    init_logger();
    let system: System = ionic_chain(8);
    let mut config: Configuration = Configuration::default();
    config.matching.scheme = MatchingScheme::GlobalScalar;
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config).unwrap();
    let result: BootstrapResult = driver.run().unwrap();
    let state = driver.convergence();
    assert!(state.converged);
    assert!(state.electron_residual.unwrap().abs() < 1e-6);
    assert_eq!(state.history.len(), result.iterations);
    assert!(result.correlation_energy() < 0.0);
    assert!(result.correlation_energy() > -0.5 * system.n_sites() as f64);

    // identical input gives identical results
    let mut again: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config).unwrap();
    let repeated: BootstrapResult = again.run().unwrap();
    assert_eq!(repeated.total_energy(), result.total_energy());
    assert_eq!(repeated.iterations, result.iterations);
}

#[test]
fn default_matching_converges_on_the_ionic_chain() {
    init_logger();
    let system: System = ionic_chain(8);
    let config: Configuration = Configuration::default();
    assert_eq!(config.matching.scheme, MatchingScheme::PerFragment);
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config).unwrap();
    assert!(driver.partition().n_fragments() > 1);
    let result: BootstrapResult = driver.run().unwrap();
    assert_eq!(result.state, DriverState::Converged);
    assert!(result.iterations > 1);
    assert!(result.edge_mismatch < 1e-6);
    let history: &[f64] = &driver.convergence().history;
    assert_eq!(history.len(), result.iterations);
    assert!(history[history.len() - 1] < history[0]);
    assert!(result.correlation_energy() < 0.0);
    assert!(result.correlation_energy() > -0.5 * system.n_sites() as f64);
}

#[test]
fn oneshot_leaves_the_driver_untouched() {
    init_logger();
    let system: System = hubbard_chain(8, 2.0);
    let config: Configuration = mean_field_config();
    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config).unwrap();
    let oneshot = driver.oneshot().unwrap();
    assert_eq!(driver.state(), DriverState::Initializing);
    assert_eq!(driver.convergence().iteration, 0);
    assert_abs_diff_eq!(oneshot.energy, system.e_ref, epsilon = 1e-8);
    assert!(oneshot.residuals.edge_norm < 1e-6);
    assert_eq!(
        oneshot.fragment_energies.len(),
        driver.partition().n_fragments()
    );
}

#[test]
fn invalid_user_partition_is_rejected() {
    init_logger();
    let system: System = hubbard_chain(4, 2.0);
    let mut config: Configuration = Configuration::default();
    config.fragmentation.scheme = FragmentationKind::User;
    config.fragmentation.fragments = vec![FragmentSpec {
        sites: vec![0, 1, 2],
        center: vec![0, 1],
    }];
    match BootstrapEmbedding::new(&system, &config) {
        Err(err) => assert_eq!(err.stage(), "partition"),
        Ok(_) => panic!("a partition without center for site 3 was accepted"),
    }
}
