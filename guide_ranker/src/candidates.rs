use tracing::debug;

use crate::models::{Candidate, Sequence, DEFAULT_PAM_SUFFIXES};

/// All `k`-length windows of `sequence` ending in AG, GG or GA, left to right.
///
/// Returns an empty list when the sequence is shorter than `k`.
pub fn generate_candidates(sequence: &Sequence, k: usize) -> Vec<Candidate> {
    generate_candidates_with(sequence, k, &DEFAULT_PAM_SUFFIXES)
}

/// Same as [`generate_candidates`] with a caller-chosen suffix set.
pub fn generate_candidates_with<S: AsRef<str>>(
    sequence: &Sequence,
    k: usize,
    suffixes: &[S],
) -> Vec<Candidate> {
    let bases = sequence.as_str().as_bytes();
    if k == 0 || bases.len() < k {
        return Vec::new();
    }

    let candidates: Vec<Candidate> = bases
        .windows(k)
        .enumerate()
        .filter(|(_, window)| {
            suffixes
                .iter()
                .any(|suffix| window.ends_with(suffix.as_ref().as_bytes()))
        })
        .map(|(position, window)| {
            // Sequence is validated ASCII, so every window is valid UTF-8.
            Candidate::new(position, String::from_utf8_lossy(window).into_owned())
        })
        .collect();

    debug!(
        "{} of {} windows kept after suffix filter",
        candidates.len(),
        bases.len() - k + 1
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = "ATGCGATCGATCGTAGCTAGCTAGGATCGATCG";

    fn seq(text: &str) -> Sequence {
        Sequence::parse(text).unwrap()
    }

    #[test]
    fn short_sequence_has_no_candidates() {
        assert!(generate_candidates(&seq("ACGTAGG"), 23).is_empty());
        assert!(generate_candidates(&seq(&"A".repeat(22)), 23).is_empty());
    }

    #[test]
    fn example_sequence_windows() {
        let found = generate_candidates(&seq(EXAMPLE), 23);
        let expected = vec![
            Candidate::new(1, "TGCGATCGATCGTAGCTAGCTAG"),
            Candidate::new(2, "GCGATCGATCGTAGCTAGCTAGG"),
            Candidate::new(3, "CGATCGATCGTAGCTAGCTAGGA"),
            Candidate::new(7, "CGATCGTAGCTAGCTAGGATCGA"),
        ];
        assert_eq!(found, expected);
    }

    #[test]
    fn every_candidate_has_length_k_and_allowed_suffix() {
        let input = "GGAGGAGAGGTTTCCCAAAGGGAGAGATATAGGCCGAGGAGTTAGAAG";
        for candidate in generate_candidates(&seq(input), 23) {
            assert_eq!(candidate.len(), 23);
            let tail = &candidate.kmer[21..];
            assert!(["AG", "GG", "GA"].contains(&tail), "bad suffix {}", tail);
            assert_eq!(&input[candidate.position..candidate.position + 23], candidate.kmer);
        }
    }

    #[test]
    fn generation_is_ordered_and_repeatable() {
        let s = seq(EXAMPLE);
        let first = generate_candidates(&s, 23);
        let second = generate_candidates(&s, 23);
        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0].position < w[1].position));
    }

    #[test]
    fn exact_length_sequence_yields_single_window() {
        let input = format!("{}GG", "C".repeat(21));
        let found = generate_candidates(&seq(&input), 23);
        assert_eq!(found, vec![Candidate::new(0, input)]);
    }

    #[test]
    fn custom_suffixes() {
        let found = generate_candidates_with(&seq("AAACCAAATT"), 3, &["TT"]);
        assert_eq!(found, vec![Candidate::new(7, "ATT")]);
    }
}
