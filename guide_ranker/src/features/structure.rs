//! Descriptors derived from a fold: helix statistics, mean pair probability
//! and the per-position one-hot block.

use ndarray::Array2;

use super::assembler::ONE_HOT_ALPHABET;

#[derive(Debug, Clone, PartialEq)]
pub struct StructureSummary {
    pub helices: usize,
    pub paired_bases: usize,
    pub helix_lengths: Vec<usize>,
    pub avg_helix_length: f64,
    pub fraction_paired: f64,
}

/// Scan a dot-bracket string for helix runs.
///
/// A run opens on a `(` when none is open and closes on the next unpaired
/// base. `)` only lengthens the current run: it never opens one, and its
/// count carries into the next run if nothing is open. The closing side of a
/// stem is thus added to the length of the following helix, and the closing
/// side of the last stem never reaches `helix_lengths`. The trained model was
/// fit on features computed this way, so keep it.
///
/// `fraction_paired` divides by `sequence_length`.
pub fn summarize_structure(dot_bracket: &str, sequence_length: usize) -> StructureSummary {
    let mut helices = 0;
    let mut paired_bases = 0;
    let mut helix_lengths = Vec::new();
    let mut in_helix = false;
    let mut current = 0;

    for c in dot_bracket.chars() {
        match c {
            '(' => {
                paired_bases += 1;
                if !in_helix {
                    helices += 1;
                    in_helix = true;
                }
                current += 1;
            }
            ')' => {
                paired_bases += 1;
                current += 1;
            }
            _ => {
                if in_helix {
                    helix_lengths.push(current);
                    current = 0;
                    in_helix = false;
                }
            }
        }
    }
    if in_helix {
        helix_lengths.push(current);
    }

    let avg_helix_length = if helix_lengths.is_empty() {
        0.0
    } else {
        helix_lengths.iter().sum::<usize>() as f64 / helix_lengths.len() as f64
    };
    let fraction_paired = if sequence_length == 0 {
        0.0
    } else {
        paired_bases as f64 / sequence_length as f64
    };

    StructureSummary {
        helices,
        paired_bases,
        helix_lengths,
        avg_helix_length,
        fraction_paired,
    }
}

/// Mean of the strict upper triangle (`i < j`), `n(n-1)/2` entries.
pub fn mean_pair_probability(bpp: &Array2<f64>) -> f64 {
    let n = bpp.nrows();
    if n < 2 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            sum += bpp[[i, j]];
        }
    }
    sum / (n * (n - 1) / 2) as f64
}

/// Position-major one-hot over `A, U, C, G`. Other symbols give an all-zero
/// group.
pub fn one_hot(rna: &str) -> Vec<f64> {
    rna.bytes()
        .flat_map(|b| {
            let b = b.to_ascii_uppercase();
            ONE_HOT_ALPHABET.map(|letter| if letter == b { 1.0 } else { 0.0 })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_hairpin() {
        // `((((` opens one helix, `....` closes it at 4, `))))` adds 4 that
        // are never flushed because no run is open at the end.
        let s = summarize_structure("((((....))))", 12);
        assert_eq!(s.helices, 1);
        assert_eq!(s.helix_lengths, vec![4]);
        assert_eq!(s.avg_helix_length, 4.0);
        assert_eq!(s.paired_bases, 8);
        assert!((s.fraction_paired - 8.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn closing_brackets_carry_into_next_run() {
        let s = summarize_structure("((..))..((..))", 14);
        assert_eq!(s.helices, 2);
        assert_eq!(s.helix_lengths, vec![2, 4]);
        assert_eq!(s.avg_helix_length, 3.0);
        assert_eq!(s.paired_bases, 8);
    }

    #[test]
    fn abutting_stems_share_a_run_length() {
        // No unpaired base between the stems: the first stem's `)))` is
        // counted into the second helix.
        let s = summarize_structure("(((...)))(((...)))", 18);
        assert_eq!(s.helices, 2);
        assert_eq!(s.helix_lengths, vec![3, 6]);
        assert_eq!(s.avg_helix_length, 4.5);
    }

    #[test]
    fn open_structure_has_no_helices() {
        let s = summarize_structure(".......", 7);
        assert_eq!(s.helices, 0);
        assert_eq!(s.avg_helix_length, 0.0);
        assert_eq!(s.fraction_paired, 0.0);
    }

    #[test]
    fn helix_stats_are_consistent() {
        for db in ["(((...)))", "..((...))..((....)).", "((((((((((...))))))))))", "......."] {
            let s = summarize_structure(db, db.len());
            assert!((0.0..=1.0).contains(&s.fraction_paired));
            assert_eq!(s.helices == 0, s.avg_helix_length == 0.0, "{}", db);
        }
    }

    #[test]
    fn mean_over_upper_triangle() {
        let mut bpp = Array2::<f64>::zeros((4, 4));
        bpp[[0, 3]] = 0.6;
        bpp[[3, 0]] = 0.6;
        bpp[[1, 2]] = 0.3;
        bpp[[2, 1]] = 0.3;
        assert!((mean_pair_probability(&bpp) - 0.9 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn one_hot_groups() {
        let v = one_hot("AUCG");
        assert_eq!(
            v,
            vec![
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ]
        );
    }
}
