// CONFIGURATION
// config file
pub const CONFIG_FILE_NAME: &str = "bemb.toml";
// number of threads for the fragment pipelines, 0 lets rayon decide
pub const PARALLELISM: usize = 0;
// keep all orbitals in the embedding problem unless core orbitals are frozen explicitly
pub const FROZEN_CORE: bool = false;

// FRAGMENTATION
// order of the BE-n center-radius scheme: all sites within n_be - 1 bonds
// of a center site belong to its fragment
pub const N_BE: usize = 2;

// BATH CONSTRUCTION
// environment orbitals with an entanglement weight n(1-n) above this value are bath candidates
pub const BATH_THRESHOLD: f64 = 1.0e-10;
// entanglement weights closer than this value are treated as degenerate
pub const DEGENERACY_THRESHOLD: f64 = 1.0e-10;
// number of embedded electrons must be this close to an even integer
pub const ELECTRON_TOLERANCE: f64 = 1.0e-6;

// EMBEDDING HAMILTONIAN
// allowed deviation from orthonormality and from the integral symmetries
pub const PROJECTION_TOLERANCE: f64 = 1.0e-8;
// smallest eigenvalue of the overlap matrix that is accepted for the orthogonalisation
pub const OVERLAP_THRESHOLD: f64 = 1.0e-10;

// MATCHING
// stop the bootstrap loop after max_iter iterations
pub const MAX_ITER: usize = 50;
// convergence threshold for the norm of the matching residual
pub const CONV_TOL: f64 = 1.0e-6;
// step length of the linear update and of the first secant step
pub const MATCHING_STEP: f64 = 0.5;
// largest change of a potential in a single secant step
pub const MAX_STEP: f64 = 1.0;
// the residual history is expected to decrease after this many iterations
pub const MONOTONE_AFTER: usize = 3;

// Broyden Mixer
pub const BROYDEN_OMEGA0: f64 = 0.01;
pub const BROYDEN_MIN_WEIGHT: f64 = 1.0;
pub const BROYDEN_MAX_WEIGHT: f64 = 1.0e5;
pub const BROYDEN_WEIGHT_FACTOR: f64 = 1.0e-2;
pub const BROYDEN_MIXING_PARAMETER: f64 = 0.5;
pub const BROYDEN_HISTORY: usize = 20;

// Trust region of the quasi-Newton update
// initial trust radius, the largest radius is MAX_STEP
pub const TRUST_RADIUS: f64 = 0.5;
// the radius never drops below this fraction of its initial value
pub const TRUST_MIN_FACTOR: f64 = 1.0e-3;
pub const TRUST_EXPAND: f64 = 2.0;
pub const TRUST_SHRINK: f64 = 0.5;

// FRAGMENT SOLVERS
// stop the SCF calculation of a fragment after max_iter iterations
pub const SOLVER_MAX_CYCLES: usize = 250;
// convergence threshold for the density matrix and the energy in the SCF
pub const SOLVER_CONV_TOL: f64 = 1.0e-10;
pub const DIIS_LIMIT: usize = 8;
// largest determinant space for which the dense CI matrix is diagonalized. Eight embedding
// orbitals at half filling (4900 determinants) fit, ten (63504, e.g. BE3 on a chain) need
// about 32 GB for the CI matrix and have to be raised explicitly or solved externally
pub const MAX_DETERMINANTS: usize = 5000;
// number of repeated solver calls on failure if the retry policy is active
pub const MAX_RETRIES: usize = 2;
// magnitude of the random perturbation of the solver guess on a retry
pub const GUESS_PERTURBATION: f64 = 1.0e-3;
