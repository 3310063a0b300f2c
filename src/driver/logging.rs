use crate::driver::energy::EnergyReport;
use crate::fragmentation::Partition;
use crate::utils::Timer;
use itertools::Itertools;
use log::{debug, info, log_enabled, Level};

pub fn be_init(partition: &Partition, solver: &str, scheme: &str, rule: &str, max_iter: usize, tol: f64) {
    info!("{:^80}", "");
    info!("{: ^80}", "Bootstrap Embedding");
    info!("{:-^80}", "");
    info!("{: <25} {}", "number of fragments:", partition.n_fragments());
    info!("{: <25} {}", "fragment solver:", solver);
    info!("{: <25} {}", "matching scheme:", scheme);
    info!("{: <25} {}", "potential update:", rule);
    info!("{: <25} {}", "max. iterations:", max_iter);
    info!("{: <25} {:.2e}", "convergence criterium:", tol);
    info!("{:^80}", "");
    if log_enabled!(Level::Debug) {
        info!("{: <8} {: <30} {: <30}", "Frag.", "center sites", "edge sites");
        info!("{:-^75} ", "");
        for frag in partition.fragments.iter() {
            info!(
                "{: <8} {: <30} {: <30}",
                frag.index,
                frag.center.iter().join(","),
                frag.edge.iter().join(",")
            );
        }
        info!("{:-^75} ", "");
    }
}

pub fn bath_header() {
    debug!(
        "{: <5} {: >12} {: >12} {: >12}",
        "Frag.", "#frag. orbs", "#bath orbs", "#electrons"
    );
}

pub fn bath_summary(fragment: usize, n_frag: usize, n_bath: usize, n_elec: usize) {
    debug!(
        "{: >5} {:>12} {:>12} {:>12}",
        fragment, n_frag, n_bath, n_elec
    );
}

pub fn iteration_header() {
    info!(
        "{: <5} {: >18} {: >18} {: >18} {: >12}",
        "Iter.", "mismatch", "edge mismatch", "electron res.", "mu"
    );
    info!("{:-^75} ", "");
}

pub fn iteration(iter: usize, mismatch: f64, edge_mismatch: f64, electron: f64, mu: f64) {
    info!(
        "{: >5} {:>18.8e} {:>18.8e} {:>18.8e} {:>12.6}",
        iter, mismatch, edge_mismatch, electron, mu
    );
}

pub fn be_end(timer: &Timer, report: &EnergyReport, iterations: usize) {
    info!("{:-^75} ", "");
    info!("{: ^75}", format!("BE converged in {} iterations", iterations));
    info!("{:^80} ", "");
    if log_enabled!(Level::Debug) {
        info!("{: <5} {:>18} {:>18} {:>18}", "Frag.", "one-body", "core", "two-body");
        for frag in report.fragments.iter() {
            info!(
                "{: >5} {:>18.10} {:>18.10} {:>18.10}",
                frag.fragment, frag.one_body, frag.core, frag.two_body
            );
        }
        info!("{:^80} ", "");
    }
    info!("{:<26} {:>24.14} Hartree", "one-body energy:", report.one_body);
    info!("{:<26} {:>24.14} Hartree", "core energy:", report.core);
    info!("{:<26} {:>24.14} Hartree", "two-body energy:", report.two_body);
    info!("{:<26} {:>24.14} Hartree", "constant energy:", report.e_nuc);
    info!("{:<26} {:>24.14} Hartree", "total energy:", report.total);
    info!("{:<26} {:>24.14} Hartree", "reference energy:", report.reference);
    info!("{:<26} {:>24.14} Hartree", "correlation energy:", report.correlation);
    info!("{:-<80} ", "");
    info!("{}", timer);
}

pub fn be_failed(timer: &Timer, message: &str) {
    info!("{:-^75} ", "");
    info!("{: ^75}", "BE failed");
    info!("{: ^75}", message);
    info!("{:-<80} ", "");
    info!("{}", timer);
}
