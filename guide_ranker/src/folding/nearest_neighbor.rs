//! Native folding backend.
//!
//! Structures are scored with a reduced nearest-neighbour model: every base
//! pair pays for the loop it closes, which is either a hairpin (size-dependent
//! initiation), a stack on the next pair in (Turner stacking energy) or any
//! other loop (flat [`LOOP_PENALTY`]). The exterior loop is free.
//!
//! The grammar used by the recursions is unambiguous, so the same tables give
//! both the MFE (integer energies, deterministic traceback) and the McCaskill
//! partition function. Base-pair probabilities come from an explicit outside
//! pass; it is quartic in length, which is fine for guide-sized inputs.

use ndarray::Array2;
use tracing::debug;

use super::energy_params::{
    hairpin_energy, pair_type, stack_energy, thermal_energy, DEFAULT_TEMPERATURE, LOOP_PENALTY,
    MIN_HAIRPIN,
};
use super::{mean_bp_distance_from, FoldAnalysis, FoldingOracle};
use crate::errors::FoldError;
use crate::models::SecondaryStructure;

const INF: i32 = 10_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct NearestNeighborFolder {
    temperature: f64,
}

impl Default for NearestNeighborFolder {
    fn default() -> Self {
        NearestNeighborFolder {
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Square table indexed 1-based, with room for the empty intervals
/// `(i, i - 1)` at both ends.
struct Grid<T> {
    stride: usize,
    cells: Vec<T>,
}

impl<T: Copy> Grid<T> {
    fn new(n: usize, fill: T) -> Self {
        let stride = n + 2;
        Grid {
            stride,
            cells: vec![fill; stride * stride],
        }
    }

    fn get(&self, i: usize, j: usize) -> T {
        self.cells[i * self.stride + j]
    }

    fn set(&mut self, i: usize, j: usize, value: T) {
        self.cells[i * self.stride + j] = value;
    }
}

/// Padded sequence plus the loop energies of the model.
struct Strand {
    /// `bases[0]` is padding; the sequence lives in `1..=n`.
    bases: Vec<u8>,
    n: usize,
}

impl Strand {
    fn encode(rna: &str) -> Result<Self, FoldError> {
        if rna.is_empty() {
            return Err(FoldError::new(rna, "empty sequence"));
        }
        let mut bases = Vec::with_capacity(rna.len() + 1);
        bases.push(0);
        for c in rna.bytes() {
            let b = match c.to_ascii_uppercase() {
                b'T' => b'U',
                b @ (b'A' | b'C' | b'G' | b'U') => b,
                other => {
                    return Err(FoldError::new(
                        rna,
                        format!("unsupported base '{}'", other as char),
                    ))
                }
            };
            bases.push(b);
        }
        Ok(Strand {
            n: rna.len(),
            bases,
        })
    }

    fn can_pair(&self, i: usize, j: usize) -> bool {
        i >= 1 && j <= self.n && j > i + MIN_HAIRPIN && pair_type(self.bases[i], self.bases[j]).is_some()
    }

    fn hairpin(&self, i: usize, j: usize) -> i32 {
        hairpin_energy(j - i - 1).unwrap_or(INF)
    }

    /// (i, j) stacked on (i + 1, j - 1). Both pairs must be allowed.
    fn stack(&self, i: usize, j: usize) -> i32 {
        match (
            pair_type(self.bases[i], self.bases[j]),
            pair_type(self.bases[j - 1], self.bases[i + 1]),
        ) {
            (Some(outer), Some(inner)) => stack_energy(outer, inner),
            _ => INF,
        }
    }
}

/// Minimum-energy tables.
///
/// * `v(i, j)`: best substructure closed by pair (i, j)
/// * `x(i, j)`: at least one pair, but not (i, j) itself
/// * `w1(i, j)`: at least one pair
/// * `w(i, j)`: anything, open chain included
struct EnergyTables {
    v: Grid<i32>,
    x: Grid<i32>,
    w1: Grid<i32>,
    w: Grid<i32>,
}

/// Partition-function counterparts of [`EnergyTables`].
struct PartitionTables {
    zb: Grid<f64>,
    zx: Grid<f64>,
    z1: Grid<f64>,
    z: Grid<f64>,
}

enum Trace {
    W(usize, usize),
    W1(usize, usize),
    X(usize, usize),
    V(usize, usize),
}

impl NearestNeighborFolder {
    pub fn new(temperature: f64) -> Self {
        NearestNeighborFolder { temperature }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    fn boltzmann(&self, energy_dcal: i32) -> f64 {
        (-(energy_dcal as f64 / 100.0) / thermal_energy(self.temperature)).exp()
    }

    fn fill_energies(&self, s: &Strand) -> EnergyTables {
        let n = s.n;
        let mut t = EnergyTables {
            v: Grid::new(n, INF),
            x: Grid::new(n, INF),
            w1: Grid::new(n, INF),
            w: Grid::new(n, 0),
        };

        for d in 0..n {
            for i in 1..=(n - d) {
                let j = i + d;

                let v = if s.can_pair(i, j) {
                    let mut best = s.hairpin(i, j);
                    if s.can_pair(i + 1, j - 1) {
                        let e = s.stack(i, j) + t.v.get(i + 1, j - 1);
                        if e < best {
                            best = e;
                        }
                    }
                    let inner = t.x.get(i + 1, j - 1);
                    if inner < INF && LOOP_PENALTY + inner < best {
                        best = LOOP_PENALTY + inner;
                    }
                    best
                } else {
                    INF
                };
                t.v.set(i, j, v);

                let mut x = t.w1.get(i, j - 1);
                for k in (i + 1)..=j {
                    let vk = t.v.get(k, j);
                    if vk < INF {
                        let e = t.w.get(i, k - 1) + vk;
                        if e < x {
                            x = e;
                        }
                    }
                }
                t.x.set(i, j, x);

                let w1 = if v < x { v } else { x };
                t.w1.set(i, j, w1);
                t.w.set(i, j, w1.min(0));
            }
        }
        t
    }

    fn traceback(&self, s: &Strand, t: &EnergyTables) -> String {
        let mut structure = vec![b'.'; s.n];
        let mut todo = vec![Trace::W(1, s.n)];

        while let Some(task) = todo.pop() {
            match task {
                Trace::W(i, j) => {
                    if j >= i && t.w1.get(i, j) < 0 {
                        todo.push(Trace::W1(i, j));
                    }
                }
                Trace::W1(i, j) => {
                    if t.x.get(i, j) == t.w1.get(i, j) {
                        todo.push(Trace::X(i, j));
                    } else {
                        todo.push(Trace::V(i, j));
                    }
                }
                Trace::X(i, j) => {
                    let target = t.x.get(i, j);
                    if t.w1.get(i, j - 1) == target {
                        todo.push(Trace::W1(i, j - 1));
                        continue;
                    }
                    if let Some(k) = ((i + 1)..=j).find(|&k| {
                        let vk = t.v.get(k, j);
                        vk < INF && t.w.get(i, k - 1) + vk == target
                    }) {
                        todo.push(Trace::W(i, k - 1));
                        todo.push(Trace::V(k, j));
                    }
                }
                Trace::V(i, j) => {
                    structure[i - 1] = b'(';
                    structure[j - 1] = b')';
                    let target = t.v.get(i, j);
                    if s.hairpin(i, j) == target {
                        continue;
                    }
                    if s.can_pair(i + 1, j - 1) && s.stack(i, j) + t.v.get(i + 1, j - 1) == target {
                        todo.push(Trace::V(i + 1, j - 1));
                    } else {
                        todo.push(Trace::X(i + 1, j - 1));
                    }
                }
            }
        }

        String::from_utf8_lossy(&structure).into_owned()
    }

    fn fill_partition(&self, s: &Strand) -> PartitionTables {
        let n = s.n;
        let mut t = PartitionTables {
            zb: Grid::new(n, 0.0),
            zx: Grid::new(n, 0.0),
            z1: Grid::new(n, 0.0),
            z: Grid::new(n, 1.0),
        };
        let loop_factor = self.boltzmann(LOOP_PENALTY);

        for d in 0..n {
            for i in 1..=(n - d) {
                let j = i + d;

                let zb = if s.can_pair(i, j) {
                    let mut q = self.boltzmann(s.hairpin(i, j));
                    if s.can_pair(i + 1, j - 1) {
                        q += self.boltzmann(s.stack(i, j)) * t.zb.get(i + 1, j - 1);
                    }
                    q + loop_factor * t.zx.get(i + 1, j - 1)
                } else {
                    0.0
                };
                t.zb.set(i, j, zb);

                let mut zx = t.z1.get(i, j - 1);
                for k in (i + 1)..=j {
                    zx += t.z.get(i, k - 1) * t.zb.get(k, j);
                }
                t.zx.set(i, j, zx);

                let z1 = zx + zb;
                t.z1.set(i, j, z1);
                t.z.set(i, j, 1.0 + z1);
            }
        }
        t
    }

    /// Pair probabilities from the outside recursion, 0-based and symmetric.
    fn pair_probabilities(&self, s: &Strand, t: &PartitionTables) -> Array2<f64> {
        let n = s.n;
        let total = t.z.get(1, n);
        let loop_factor = self.boltzmann(LOOP_PENALTY);
        let mut outside: Grid<f64> = Grid::new(n, 0.0);
        let mut bpp = Array2::<f64>::zeros((n, n));

        for d in ((MIN_HAIRPIN + 1)..n).rev() {
            for i in 1..=(n - d) {
                let j = i + d;
                if !s.can_pair(i, j) {
                    continue;
                }

                // (i, j) in the exterior loop
                let mut out = t.z.get(1, i - 1) * t.z.get(j + 1, n);

                // stacked inside (i - 1, j + 1)
                if i > 1 && j < n && s.can_pair(i - 1, j + 1) {
                    out += outside.get(i - 1, j + 1) * self.boltzmann(s.stack(i - 1, j + 1));
                }

                // any other loop closed by (k, l)
                for k in 1..i {
                    for l in (j + 1)..=n {
                        if (k + 1 == i && l == j + 1) || !s.can_pair(k, l) {
                            continue;
                        }
                        let o = outside.get(k, l);
                        if o == 0.0 {
                            continue;
                        }
                        out += o * loop_factor * t.z.get(k + 1, i - 1) * t.z.get(j + 1, l - 1);
                    }
                }

                outside.set(i, j, out);
                let p = t.zb.get(i, j) * out / total;
                bpp[[i - 1, j - 1]] = p;
                bpp[[j - 1, i - 1]] = p;
            }
        }
        bpp
    }

    /// Ensemble free energy `-kT·ln Z` in kcal/mol.
    pub fn ensemble_free_energy(&self, rna: &str) -> Result<f64, FoldError> {
        let s = Strand::encode(rna)?;
        let t = self.fill_partition(&s);
        Ok(-thermal_energy(self.temperature) * t.z.get(1, s.n).ln())
    }

    /// Free energy (kcal/mol) of a given dot-bracket structure under this model.
    pub fn eval_structure(&self, rna: &str, dot_bracket: &str) -> Result<f64, FoldError> {
        let s = Strand::encode(rna)?;
        if dot_bracket.len() != s.n {
            return Err(FoldError::new(
                rna,
                format!("structure length {} differs from sequence length {}", dot_bracket.len(), s.n),
            ));
        }

        // 1-based partner table
        let mut partner = vec![0usize; s.n + 1];
        let mut open = Vec::new();
        for (idx, c) in dot_bracket.bytes().enumerate() {
            let pos = idx + 1;
            match c {
                b'(' => open.push(pos),
                b')' => {
                    let i = open
                        .pop()
                        .ok_or_else(|| FoldError::new(rna, "unbalanced ')' in structure"))?;
                    partner[i] = pos;
                    partner[pos] = i;
                }
                b'.' => {}
                other => {
                    return Err(FoldError::new(
                        rna,
                        format!("unexpected '{}' in structure", other as char),
                    ))
                }
            }
        }
        if !open.is_empty() {
            return Err(FoldError::new(rna, "unbalanced '(' in structure"));
        }

        let mut energy = 0;
        for i in 1..=s.n {
            let j = partner[i];
            if j <= i {
                continue;
            }
            if !s.can_pair(i, j) {
                return Err(FoldError::new(rna, format!("pair ({}, {}) is not allowed", i, j)));
            }

            let mut enclosed = Vec::new();
            let mut k = i + 1;
            while k < j {
                if partner[k] > k {
                    enclosed.push((k, partner[k]));
                    k = partner[k] + 1;
                } else {
                    k += 1;
                }
            }

            energy += match enclosed.as_slice() {
                [] => s.hairpin(i, j),
                [(k, l)] if *k == i + 1 && *l == j - 1 => s.stack(i, j),
                _ => LOOP_PENALTY,
            };
        }
        Ok(energy as f64 / 100.0)
    }
}

impl FoldingOracle for NearestNeighborFolder {
    fn name(&self) -> &str {
        "nearest_neighbor"
    }

    fn fold(&self, rna: &str) -> Result<SecondaryStructure, FoldError> {
        let s = Strand::encode(rna)?;
        let tables = self.fill_energies(&s);
        let dot_bracket = self.traceback(&s, &tables);
        let mfe = tables.w.get(1, s.n) as f64 / 100.0;
        debug!("Folded {} -> {} ({:.2})", rna, dot_bracket, mfe);
        Ok(SecondaryStructure { dot_bracket, mfe })
    }

    fn base_pair_probabilities(&self, rna: &str) -> Result<Array2<f64>, FoldError> {
        let s = Strand::encode(rna)?;
        let tables = self.fill_partition(&s);
        Ok(self.pair_probabilities(&s, &tables))
    }

    fn mean_base_pair_distance(&self, rna: &str) -> Result<f64, FoldError> {
        Ok(mean_bp_distance_from(&self.base_pair_probabilities(rna)?))
    }

    fn analyze(&self, rna: &str) -> Result<FoldAnalysis, FoldError> {
        let structure = self.fold(rna)?;
        let bpp = self.base_pair_probabilities(rna)?;
        let mean_bp_distance = mean_bp_distance_from(&bpp);
        Ok(FoldAnalysis {
            structure,
            bpp,
            mean_bp_distance,
        })
    }
}
