use crate::bath::{BathOptions, BathPolicy};
use crate::defaults::*;
use crate::driver::ErrorPolicy;
use crate::fragmentation::{FragmentSpec, FragmentationScheme};
use crate::matching::{MatchingMetric, MatchingScheme, UpdateRule};
use crate::solver::{CiOptions, MeanFieldOptions, SolverKind};
use serde::{Deserialize, Serialize};

fn default_parallelism() -> usize {
    PARALLELISM
}
fn default_frozen_core() -> bool {
    FROZEN_CORE
}
fn default_scheme() -> FragmentationKind {
    FragmentationKind::CenterRadius
}
fn default_n_be() -> usize {
    N_BE
}
fn default_fragments() -> Vec<FragmentSpec> {
    Vec::new()
}
fn default_bath_policy() -> BathKind {
    BathKind::Minimal
}
fn default_n_bath() -> usize {
    0
}
fn default_bath_threshold() -> f64 {
    BATH_THRESHOLD
}
fn default_degeneracy_threshold() -> f64 {
    DEGENERACY_THRESHOLD
}
fn default_electron_tolerance() -> f64 {
    ELECTRON_TOLERANCE
}
fn default_matching_scheme() -> MatchingScheme {
    MatchingScheme::PerFragment
}
fn default_matching_metric() -> MatchingMetric {
    MatchingMetric::Diagonal
}
fn default_update_rule() -> RuleKind {
    RuleKind::Auto
}
fn default_step() -> f64 {
    MATCHING_STEP
}
fn default_max_step() -> f64 {
    MAX_STEP
}
fn default_broyden_alpha() -> f64 {
    BROYDEN_MIXING_PARAMETER
}
fn default_broyden_history() -> usize {
    BROYDEN_HISTORY
}
fn default_trust_radius() -> f64 {
    TRUST_RADIUS
}
fn default_tolerance() -> f64 {
    CONV_TOL
}
fn default_max_iterations() -> usize {
    MAX_ITER
}
fn default_monotone_after() -> usize {
    MONOTONE_AFTER
}
fn default_projection_tolerance() -> f64 {
    PROJECTION_TOLERANCE
}
fn default_solver() -> SolverName {
    SolverName::Fci
}
fn default_max_cycles() -> usize {
    SOLVER_MAX_CYCLES
}
fn default_solver_conv_tol() -> f64 {
    SOLVER_CONV_TOL
}
fn default_diis_space() -> usize {
    DIIS_LIMIT
}
fn default_max_determinants() -> usize {
    MAX_DETERMINANTS
}
fn default_error_policy() -> PolicyKind {
    PolicyKind::FailFast
}
fn default_max_retries() -> usize {
    MAX_RETRIES
}
fn default_fragmentation_config() -> FragmentationConfig {
    let config: FragmentationConfig = toml::from_str("").unwrap();
    config
}
fn default_bath_config() -> BathConfig {
    let config: BathConfig = toml::from_str("").unwrap();
    config
}
fn default_matching_config() -> MatchingConfig {
    let config: MatchingConfig = toml::from_str("").unwrap();
    config
}
fn default_convergence_config() -> ConvergenceConfig {
    let config: ConvergenceConfig = toml::from_str("").unwrap();
    config
}
fn default_solver_config() -> SolverConfig {
    let config: SolverConfig = toml::from_str("").unwrap();
    config
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Configuration {
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// remove the core orbitals named by the provider from the embedding problem
    #[serde(default = "default_frozen_core")]
    pub frozen_core: bool,
    #[serde(default = "default_fragmentation_config")]
    pub fragmentation: FragmentationConfig,
    #[serde(default = "default_bath_config")]
    pub bath: BathConfig,
    #[serde(default = "default_matching_config")]
    pub matching: MatchingConfig,
    #[serde(default = "default_convergence_config")]
    pub convergence: ConvergenceConfig,
    #[serde(default = "default_solver_config")]
    pub solver: SolverConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        let config: Configuration = toml::from_str("").unwrap();
        config
    }
}

impl Configuration {
    pub fn fragmentation_scheme(&self) -> FragmentationScheme {
        match self.fragmentation.scheme {
            FragmentationKind::CenterRadius => FragmentationScheme::CenterRadius {
                n_be: self.fragmentation.n_be,
            },
            FragmentationKind::User => {
                FragmentationScheme::UserSpecified(self.fragmentation.fragments.clone())
            }
        }
    }

    pub fn bath_options(&self) -> BathOptions {
        BathOptions {
            policy: match self.bath.policy {
                BathKind::Minimal => BathPolicy::Minimal,
                BathKind::Extended => BathPolicy::Extended {
                    n_bath: self.bath.n_bath,
                },
            },
            threshold: self.bath.threshold,
            degeneracy_threshold: self.bath.degeneracy_threshold,
            electron_tolerance: self.bath.electron_tolerance,
        }
    }

    /// The configured update rule, the secant rule for a scalar chemical potential and the
    /// Broyden mixer for edge potentials if none is given.
    pub fn update_rule(&self) -> UpdateRule {
        let m: &MatchingConfig = &self.matching;
        match m.update_rule {
            RuleKind::Linear => UpdateRule::Linear { step: m.step },
            RuleKind::Secant => UpdateRule::Secant {
                step: m.step,
                max_step: m.max_step,
            },
            RuleKind::Broyden => UpdateRule::Broyden {
                alpha: m.broyden_alpha,
                history: m.broyden_history,
            },
            RuleKind::TrustRegion => UpdateRule::TrustRegion {
                alpha: m.broyden_alpha,
                history: m.broyden_history,
                radius: m.trust_radius,
                max_radius: m.max_step,
            },
            RuleKind::Auto => match m.scheme {
                MatchingScheme::GlobalScalar => UpdateRule::Secant {
                    step: m.step,
                    max_step: m.max_step,
                },
                MatchingScheme::PerFragment => UpdateRule::Broyden {
                    alpha: m.broyden_alpha,
                    history: m.broyden_history,
                },
            },
        }
    }

    pub fn solver_kind(&self) -> SolverKind {
        let mean_field: MeanFieldOptions = MeanFieldOptions {
            max_cycles: self.solver.max_cycles,
            conv_tol: self.solver.conv_tol,
            diis_space: self.solver.diis_space,
        };
        let ci: CiOptions = CiOptions {
            max_determinants: self.solver.max_determinants,
            mean_field: mean_field.clone(),
        };
        match self.solver.kind {
            SolverName::MeanField => SolverKind::MeanField(mean_field),
            SolverName::Fci => SolverKind::Fci(ci),
            SolverName::Cisd => SolverKind::Cisd(ci),
        }
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        match self.solver.error_policy {
            PolicyKind::FailFast => ErrorPolicy::FailFast,
            PolicyKind::Retry => ErrorPolicy::Retry {
                max_retries: self.solver.max_retries,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FragmentationKind {
    CenterRadius,
    User,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BathKind {
    Minimal,
    Extended,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Auto,
    Linear,
    Secant,
    Broyden,
    TrustRegion,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SolverName {
    MeanField,
    Fci,
    Cisd,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    FailFast,
    Retry,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FragmentationConfig {
    #[serde(default = "default_scheme")]
    pub scheme: FragmentationKind,
    #[serde(default = "default_n_be")]
    pub n_be: usize,
    // arrays of tables have to be serialized after the plain values
    #[serde(default = "default_fragments")]
    pub fragments: Vec<FragmentSpec>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BathConfig {
    #[serde(default = "default_bath_policy")]
    pub policy: BathKind,
    #[serde(default = "default_n_bath")]
    pub n_bath: usize,
    #[serde(default = "default_bath_threshold")]
    pub threshold: f64,
    #[serde(default = "default_degeneracy_threshold")]
    pub degeneracy_threshold: f64,
    #[serde(default = "default_electron_tolerance")]
    pub electron_tolerance: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MatchingConfig {
    #[serde(default = "default_matching_scheme")]
    pub scheme: MatchingScheme,
    #[serde(default = "default_matching_metric")]
    pub metric: MatchingMetric,
    #[serde(default = "default_update_rule")]
    pub update_rule: RuleKind,
    #[serde(default = "default_step")]
    pub step: f64,
    #[serde(default = "default_max_step")]
    pub max_step: f64,
    #[serde(default = "default_broyden_alpha")]
    pub broyden_alpha: f64,
    #[serde(default = "default_broyden_history")]
    pub broyden_history: usize,
    #[serde(default = "default_trust_radius")]
    pub trust_radius: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceConfig {
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_monotone_after")]
    pub monotone_after: usize,
    #[serde(default = "default_projection_tolerance")]
    pub projection_tolerance: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    #[serde(default = "default_solver")]
    pub kind: SolverName,
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,
    #[serde(default = "default_solver_conv_tol")]
    pub conv_tol: f64,
    #[serde(default = "default_diis_space")]
    pub diis_space: usize,
    #[serde(default = "default_max_determinants")]
    pub max_determinants: usize,
    #[serde(default = "default_error_policy")]
    pub error_policy: PolicyKind,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Configuration = toml::from_str("").unwrap();
        assert_eq!(config.parallelism, PARALLELISM);
        assert_eq!(
            config.fragmentation_scheme(),
            FragmentationScheme::CenterRadius { n_be: N_BE }
        );
        assert_eq!(config.bath_options(), BathOptions::default());
        assert_eq!(config.error_policy(), ErrorPolicy::FailFast);
        assert_eq!(config.update_rule(), UpdateRule::broyden());
        assert_eq!(config.solver_kind().name(), "FCI");
    }

    #[test]
    fn written_defaults_can_be_read_again() {
        let config: Configuration = Configuration::default();
        let text: String = toml::to_string(&config).unwrap();
        let again: Configuration = toml::from_str(&text).unwrap();
        assert_eq!(config, again);
    }

    #[test]
    fn user_fragments_and_options() {
        let text: &str = r#"
            parallelism = 2
            [matching]
            scheme = "global_scalar"
            [solver]
            kind = "mean_field"
            error_policy = "retry"
            max_retries = 4
            [bath]
            policy = "extended"
            n_bath = 3
            [fragmentation]
            scheme = "user"
            [[fragmentation.fragments]]
            sites = [0, 1]
            center = [0]
            [[fragmentation.fragments]]
            sites = [0, 1]
            center = [1]
        "#;
        let config: Configuration = toml::from_str(text).unwrap();
        assert_eq!(config.parallelism, 2);
        assert!(!config.frozen_core);
        assert_eq!(config.update_rule(), UpdateRule::secant());
        assert_eq!(config.error_policy(), ErrorPolicy::Retry { max_retries: 4 });
        assert_eq!(config.bath_options().policy, BathPolicy::Extended { n_bath: 3 });
        assert_eq!(config.solver_kind().name(), "RHF");
        match config.fragmentation_scheme() {
            FragmentationScheme::UserSpecified(specs) => {
                assert_eq!(specs.len(), 2);
                assert_eq!(specs[1].center, vec![1]);
            }
            other => panic!("unexpected scheme {:?}", other),
        }
        let text: String = toml::to_string(&config).unwrap();
        let again: Configuration = toml::from_str(&text).unwrap();
        assert_eq!(config, again);
    }

    #[test]
    fn trust_region_rule() {
        let text: &str = r#"
            frozen_core = true
            [matching]
            update_rule = "trust_region"
            trust_radius = 0.2
            max_step = 0.8
        "#;
        let config: Configuration = toml::from_str(text).unwrap();
        assert!(config.frozen_core);
        assert_eq!(
            config.update_rule(),
            UpdateRule::TrustRegion {
                alpha: BROYDEN_MIXING_PARAMETER,
                history: BROYDEN_HISTORY,
                radius: 0.2,
                max_radius: 0.8,
            }
        );
        assert_eq!(config.update_rule().build(3).name(), "trust-region Broyden");
    }
}
