//! ViennaRNA backend driven through the `RNAfold` executable.
//!
//! One `RNAfold -p` run yields the MFE structure and energy on stdout, the
//! ensemble diversity (mean base-pair distance) on the last stdout line and
//! the pair probabilities in the `dot.ps` dot plot, which is written to the
//! working directory.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use ndarray::Array2;
use regex::Regex;
use tracing::{debug, error};

use super::energy_params::DEFAULT_TEMPERATURE;
use super::{FoldAnalysis, FoldingOracle};
use crate::errors::{FoldError, GuideError};
use crate::models::SecondaryStructure;

const DOT_PLOT: &str = "dot.ps";

#[derive(Debug, Clone)]
pub struct RnaFoldCli {
    executable: PathBuf,
    temperature: f64,
}

fn mfe_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([.()]+)\s+\(\s*(-?\d+(?:\.\d+)?)\s*\)\s*$").expect("static regex")
    })
}

fn diversity_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ensemble diversity\s+(-?\d+(?:\.\d+)?)").expect("static regex"))
}

impl RnaFoldCli {
    /// Uses the given executable, or looks `RNAfold` up on `PATH`.
    pub fn new(executable: Option<PathBuf>, temperature: f64) -> Result<Self, GuideError> {
        let executable = match executable {
            Some(path) => path,
            None => which::which("RNAfold")
                .map_err(|e| GuideError::Config(format!("RNAfold not found on PATH: {}", e)))?,
        };
        Ok(RnaFoldCli {
            executable,
            temperature,
        })
    }

    pub fn with_default_temperature(executable: Option<PathBuf>) -> Result<Self, GuideError> {
        Self::new(executable, DEFAULT_TEMPERATURE)
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn run(&self, rna: &str) -> Result<FoldAnalysis, FoldError> {
        let workdir = tempfile::tempdir()
            .map_err(|e| FoldError::new(rna, format!("cannot create scratch dir: {}", e)))?;

        debug!(
            "Running {} -p --temp={} in {}",
            self.executable.display(),
            self.temperature,
            workdir.path().display()
        );

        let mut child = Command::new(&self.executable)
            .arg("-p")
            .arg("--noPS")
            .arg(format!("--temp={}", self.temperature))
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FoldError::new(rna, format!("could not spawn RNAfold: {}", e)))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| FoldError::new(rna, "failed to open RNAfold stdin"))?;
            writeln!(stdin, "{}", rna)
                .map_err(|e| FoldError::new(rna, format!("error writing to RNAfold: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| FoldError::new(rna, format!("error waiting for RNAfold: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("RNAfold failed: {}", stderr);
            return Err(FoldError::new(
                rna,
                format!("RNAfold exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (structure, mean_bp_distance) =
            parse_stdout(&stdout).map_err(|reason| FoldError::new(rna, reason))?;

        let dot_plot = std::fs::read_to_string(workdir.path().join(DOT_PLOT))
            .map_err(|e| FoldError::new(rna, format!("missing {}: {}", DOT_PLOT, e)))?;
        let bpp = parse_dot_plot(&dot_plot, rna.len()).map_err(|reason| FoldError::new(rna, reason))?;

        if structure.dot_bracket.len() != rna.len() {
            return Err(FoldError::new(
                rna,
                format!(
                    "RNAfold returned a structure of length {} for {} nt",
                    structure.dot_bracket.len(),
                    rna.len()
                ),
            ));
        }

        Ok(FoldAnalysis {
            structure,
            bpp,
            mean_bp_distance,
        })
    }
}

/// MFE structure plus ensemble diversity from `RNAfold -p` stdout.
pub fn parse_stdout(stdout: &str) -> Result<(SecondaryStructure, f64), String> {
    let structure = stdout
        .lines()
        .find_map(|line| {
            let caps = mfe_line().captures(line.trim())?;
            let mfe = caps[2].parse::<f64>().ok()?;
            Some(SecondaryStructure {
                dot_bracket: caps[1].to_string(),
                mfe,
            })
        })
        .ok_or_else(|| format!("no MFE structure in RNAfold output:\n{}", stdout))?;

    let diversity = stdout
        .lines()
        .find_map(|line| diversity_line().captures(line)?[1].parse::<f64>().ok())
        .ok_or_else(|| format!("no ensemble diversity in RNAfold output:\n{}", stdout))?;

    Ok((structure, diversity))
}

/// Pair probabilities from a ViennaRNA dot plot.
///
/// Only `i j sqrt(p) ubox` lines carry ensemble probabilities; `lbox` lines
/// mark the MFE structure and are skipped.
pub fn parse_dot_plot(postscript: &str, n: usize) -> Result<Array2<f64>, String> {
    let mut bpp = Array2::<f64>::zeros((n, n));
    for line in postscript.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 || fields[3] != "ubox" {
            continue;
        }
        let (Ok(i), Ok(j), Ok(sqrt_p)) = (
            fields[0].parse::<usize>(),
            fields[1].parse::<usize>(),
            fields[2].parse::<f64>(),
        ) else {
            continue;
        };
        if i == 0 || j == 0 || i > n || j > n || i == j {
            return Err(format!("pair ({}, {}) out of range for {} nt", i, j, n));
        }
        let p = sqrt_p * sqrt_p;
        bpp[[i - 1, j - 1]] = p;
        bpp[[j - 1, i - 1]] = p;
    }
    Ok(bpp)
}

impl FoldingOracle for RnaFoldCli {
    fn name(&self) -> &str {
        "rnafold"
    }

    fn fold(&self, rna: &str) -> Result<SecondaryStructure, FoldError> {
        Ok(self.run(rna)?.structure)
    }

    fn base_pair_probabilities(&self, rna: &str) -> Result<Array2<f64>, FoldError> {
        Ok(self.run(rna)?.bpp)
    }

    fn mean_base_pair_distance(&self, rna: &str) -> Result<f64, FoldError> {
        Ok(self.run(rna)?.mean_bp_distance)
    }

    fn analyze(&self, rna: &str) -> Result<FoldAnalysis, FoldError> {
        self.run(rna)
    }
}
