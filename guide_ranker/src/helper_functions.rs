use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;

use tracing::debug;

use crate::errors::InputError;
use crate::models::Sequence;

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

/// Parse user input into a [`Sequence`].
///
/// Accepts either bare nucleotides or a FASTA text holding exactly one record.
/// Whitespace (including line breaks) is dropped, lower case is folded to
/// upper case and `U` is read as `T`.
pub fn parse_sequence(text: &str) -> Result<Sequence, InputError> {
    let trimmed = text.trim();

    let body: String = if trimmed.starts_with('>') {
        let headers = trimmed.lines().filter(|l| l.trim_start().starts_with('>')).count();
        if headers > 1 {
            return Err(InputError::MultipleRecords(headers));
        }
        trimmed.lines().skip(1).collect()
    } else {
        trimmed.to_string()
    };

    let bases: String = body
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c.to_ascii_uppercase() {
            'U' => 'T',
            other => other,
        })
        .collect();

    if bases.is_empty() {
        return Err(InputError::Empty);
    }

    let unknown: BTreeSet<char> = bases
        .chars()
        .filter(|c| !matches!(c, 'A' | 'C' | 'G' | 'T'))
        .collect();
    if !unknown.is_empty() {
        let listed: Vec<String> = unknown.iter().map(|c| c.to_string()).collect();
        return Err(InputError::InvalidCharacters(listed.join(",")));
    }

    debug!("Parsed sequence of {} nt", bases.len());
    Ok(Sequence::from_validated(bases))
}

/// DNA → RNA alphabet.
pub fn to_rna(dna: &str) -> String {
    dna.chars()
        .map(|c| match c {
            'T' => 'U',
            't' => 'u',
            other => other,
        })
        .collect()
}
