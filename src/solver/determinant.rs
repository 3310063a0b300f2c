use itertools::Itertools;

/// A Slater determinant as occupation bit string over spin orbitals. Bit `p` is the alpha
/// spin orbital p, bit `n + p` the beta spin orbital p, with n the number of spatial orbitals.
pub type Determinant = u128;

/// Largest number of spatial orbitals that fits into a [Determinant].
pub const MAX_ORBITALS: usize = 64;

/// Apply the annihilator a_so. Returns the new string and the fermionic sign.
#[inline]
pub fn annihilate(det: Determinant, so: usize) -> Option<(Determinant, f64)> {
    let bit: Determinant = 1 << so;
    if det & bit == 0 {
        return None;
    }
    Some((det ^ bit, parity(det, so)))
}

/// Apply the creator a+_so. Returns the new string and the fermionic sign.
#[inline]
pub fn create(det: Determinant, so: usize) -> Option<(Determinant, f64)> {
    let bit: Determinant = 1 << so;
    if det & bit != 0 {
        return None;
    }
    Some((det | bit, parity(det, so)))
}

// (-1)^(number of occupied spin orbitals below so)
#[inline]
fn parity(det: Determinant, so: usize) -> f64 {
    let below: Determinant = det & ((1 << so) - 1);
    if below.count_ones() % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// Occupied spin orbitals of a determinant, ascending.
pub fn occupied(det: Determinant, n_spin_orbs: usize) -> Vec<usize> {
    (0..n_spin_orbs).filter(|&so| det >> so & 1 == 1).collect()
}

/// Number of spatial orbitals occupied in `det` but not in `reference`, summed over both spins.
pub fn excitation_level(det: Determinant, reference: Determinant) -> usize {
    (det & !reference).count_ones() as usize
}

/// All determinants with `n_alpha` and `n_beta` electrons in `n_orbs` spatial orbitals, in
/// lexicographic order of the (alpha, beta) strings.
pub fn determinant_space(n_orbs: usize, n_alpha: usize, n_beta: usize) -> Vec<Determinant> {
    let strings = |n_el: usize| -> Vec<Determinant> {
        if n_el == 0 {
            return vec![0];
        }
        (0..n_orbs)
            .combinations(n_el)
            .map(|occ| occ.iter().fold(0, |acc: Determinant, &p| acc | (1 << p)))
            .collect()
    };
    let alpha: Vec<Determinant> = strings(n_alpha);
    let beta: Vec<Determinant> = strings(n_beta);
    alpha
        .iter()
        .cartesian_product(beta.iter())
        .map(|(a, b)| a | (b << n_orbs))
        .collect()
}

/// Number of determinants with `n_alpha` and `n_beta` electrons in `n_orbs` orbitals.
pub fn space_size(n_orbs: usize, n_alpha: usize, n_beta: usize) -> usize {
    binomial(n_orbs, n_alpha).saturating_mul(binomial(n_orbs, n_beta))
}

/// Strings of `n_el` electrons in `n_orbs` orbitals with exactly `level` electrons moved
/// from the lowest `n_el` orbitals into the remaining ones.
fn excited_strings(n_orbs: usize, n_el: usize, level: usize) -> Vec<Determinant> {
    let reference: Determinant = (0..n_el).fold(0, |acc: Determinant, p| acc | (1 << p));
    if level == 0 {
        return vec![reference];
    }
    if level > n_el || level > n_orbs.saturating_sub(n_el) {
        return Vec::new();
    }
    let holes: Vec<Vec<usize>> = (0..n_el).combinations(level).collect();
    let particles: Vec<Vec<usize>> = (n_el..n_orbs).combinations(level).collect();
    holes
        .iter()
        .cartesian_product(particles.iter())
        .map(|(h, p)| {
            let removed: Determinant = h
                .iter()
                .fold(reference, |acc: Determinant, &i| acc & !(1 << i));
            p.iter().fold(removed, |acc: Determinant, &a| acc | (1 << a))
        })
        .collect()
}

/// Determinants that differ from the aufbau reference (lowest `n_alpha` and `n_beta`
/// orbitals occupied) by at most `max_level` electrons, ordered by excitation level of the
/// alpha and then of the beta string. The full space is never enumerated.
pub fn truncated_space(
    n_orbs: usize,
    n_alpha: usize,
    n_beta: usize,
    max_level: usize,
) -> Vec<Determinant> {
    let mut dets: Vec<Determinant> = Vec::with_capacity(truncated_space_size(
        n_orbs, n_alpha, n_beta, max_level,
    ));
    for level_a in 0..=max_level {
        let alpha: Vec<Determinant> = excited_strings(n_orbs, n_alpha, level_a);
        for level_b in 0..=(max_level - level_a) {
            let beta: Vec<Determinant> = excited_strings(n_orbs, n_beta, level_b);
            for a in alpha.iter() {
                for b in beta.iter() {
                    dets.push(a | (b << n_orbs));
                }
            }
        }
    }
    dets
}

/// Number of determinants in [truncated_space].
pub fn truncated_space_size(n_orbs: usize, n_alpha: usize, n_beta: usize, max_level: usize) -> usize {
    let strings = |n_el: usize, level: usize| -> usize {
        if n_el > n_orbs {
            return 0;
        }
        binomial(n_el, level).saturating_mul(binomial(n_orbs - n_el, level))
    };
    let mut size: usize = 0;
    for level_a in 0..=max_level {
        for level_b in 0..=(max_level - level_a) {
            size = size.saturating_add(
                strings(n_alpha, level_a).saturating_mul(strings(n_beta, level_b)),
            );
        }
    }
    size
}

fn binomial(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    let k: usize = k.min(n - k);
    (0..k).fold(1usize, |acc, i| acc.saturating_mul(n - i) / (i + 1))
}
