//! Driver configuration.
//!
//! A config file is sectioned key/value text:
//!
//! ```text
//! [data]
//! filename = experiments.txt
//! discretize = 3
//!
//! [learner]
//! type = greedy
//! numtasks = 4
//! ```
//!
//! Parsing builds one explicit [Config] value which is then passed into
//! constructors; unknown keys, failed coercions, and failed validators
//! are all invalid-config errors.

use banyan_core::{MissingMethod, StoppingCriteria};
use banyan_error::{BanyanResult, banyan_bail, banyan_err, ensure};
use banyan_learners::{GreedyConfig, SimAnnealConfig};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LearnerKind {
    Greedy,
    SimAnneal,
    Exhaustive,
}

#[derive(Clone, Debug)]
pub struct DataSection {
    pub filename: Option<PathBuf>,
    /// Inline dataset text; takes precedence over `filename`.
    pub text: Option<String>,
    /// Bin count for continuous columns; 0 leaves them untouched.
    pub discretize: usize,
}

#[derive(Clone, Debug)]
pub struct LearnerSection {
    pub kind: LearnerKind,
    pub numtasks: usize,
    /// Base RNG seed; task `i` runs with `seed + i`.
    pub seed: u64,
}

#[derive(Clone, Debug)]
pub struct GibbsSection {
    pub burnin: usize,
    pub stopping: StoppingCriteria,
}

#[derive(Clone, Debug)]
pub struct ResultSection {
    pub filename: PathBuf,
    /// Top-k networks the posterior retains; 0 keeps all.
    pub size: usize,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub data: DataSection,
    pub learner: LearnerSection,
    pub greedy: GreedyConfig,
    pub simanneal: SimAnnealConfig,
    pub gibbs: GibbsSection,
    pub missing_method: MissingMethod,
    pub result: ResultSection,
    /// Networks for the exhaustive learner, one edge string per entry.
    pub networks: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data: DataSection {
                filename: None,
                text: None,
                discretize: 0,
            },
            learner: LearnerSection {
                kind: LearnerKind::Greedy,
                numtasks: 1,
                seed: 0,
            },
            greedy: GreedyConfig::default(),
            simanneal: SimAnnealConfig::default(),
            gibbs: GibbsSection {
                burnin: 10,
                stopping: StoppingCriteria::default(),
            },
            missing_method: MissingMethod::Gibbs,
            result: ResultSection {
                filename: PathBuf::from("result.json"),
                size: 0,
            },
            networks: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> BanyanResult<Config> {
        let text = std::fs::read_to_string(path)?;
        Config::from_text(&text)
    }

    pub fn from_text(text: &str) -> BanyanResult<Config> {
        let mut config = Config::default();
        for (key, value) in parse_pairs(text)? {
            config.apply(&key, &value)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> BanyanResult<()> {
        match key {
            "data.filename" => self.data.filename = Some(PathBuf::from(value)),
            "data.text" => self.data.text = Some(value.to_string()),
            "data.discretize" => self.data.discretize = parse_int(key, value)?,
            "learner.type" => {
                self.learner.kind = match value {
                    "greedy" => LearnerKind::Greedy,
                    "simanneal" => LearnerKind::SimAnneal,
                    "exhaustive" => LearnerKind::Exhaustive,
                    other if other.contains(':') => banyan_bail!(
                        InvalidConfig: "custom learner '{}' is not supported; implement the Learner trait instead",
                        other
                    ),
                    other => banyan_bail!(
                        InvalidConfig: "unknown learner type '{}', expected greedy | simanneal | exhaustive",
                        other
                    ),
                }
            }
            "learner.numtasks" => self.learner.numtasks = parse_int(key, value)?,
            "learner.seed" => self.learner.seed = parse_int(key, value)? as u64,
            "greedy.max_iterations" => self.greedy.max_iterations = parse_int(key, value)? as u64,
            "greedy.max_time" => self.greedy.max_seconds = parse_float(key, value)?,
            "greedy.max_unimproved_iterations" => {
                self.greedy.max_unimproved = parse_int(key, value)? as u64
            }
            "greedy.seed" => self.greedy.seed_network = value.to_string(),
            "simanneal.start_temp" => self.simanneal.start_temp = parse_float(key, value)?,
            "simanneal.delta_temp" => self.simanneal.delta_temp = parse_float(key, value)?,
            "simanneal.max_iters_at_temp" => {
                self.simanneal.max_iters_at_temp = parse_int(key, value)? as u64
            }
            "simanneal.seed" => self.simanneal.seed_network = value.to_string(),
            "gibbs.burnin" => self.gibbs.burnin = parse_int(key, value)?,
            "gibbs.stopping_criteria" => self.gibbs.stopping = StoppingCriteria::parse(value)?,
            "evaluator.missingdata_evaluator" => self.missing_method = value.parse()?,
            "result.filename" => self.result.filename = PathBuf::from(value),
            "result.size" => self.result.size = parse_int(key, value)?,
            "listlearner.networks" => {
                self.networks = value
                    .split_whitespace()
                    .map(str::to_string)
                    .collect()
            }
            unknown => banyan_bail!(InvalidConfig: "unknown parameter '{}'", unknown),
        }
        Ok(())
    }

    fn validate(&self) -> BanyanResult<()> {
        ensure!(
            self.simanneal.start_temp > 0.0,
            InvalidConfig: "simanneal.start_temp must be positive"
        );
        ensure!(
            self.simanneal.delta_temp > 0.0 && self.simanneal.delta_temp < 1.0,
            InvalidConfig: "simanneal.delta_temp must lie in (0, 1)"
        );
        ensure!(
            self.simanneal.max_iters_at_temp > 0,
            InvalidConfig: "simanneal.max_iters_at_temp must be positive"
        );
        ensure!(
            self.greedy.max_seconds >= 0.0,
            InvalidConfig: "greedy.max_time cannot be negative"
        );
        if self.learner.kind == LearnerKind::Exhaustive {
            ensure!(
                !self.networks.is_empty(),
                InvalidConfig: "exhaustive learner needs listlearner.networks"
            );
        }
        Ok(())
    }
}

/// Splits sectioned key/value text into dotted `(key, value)` pairs.
/// Lines starting with `#` or `;` are comments; indented lines continue
/// the previous value (how inline datasets are embedded).
fn parse_pairs(text: &str) -> BanyanResult<Vec<(String, String)>> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut section = String::new();

    for (number, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if raw.starts_with(|c: char| c == ' ' || c == '\t') {
            match pairs.last_mut() {
                Some((_, value)) => {
                    value.push('\n');
                    value.push_str(trimmed);
                    continue;
                }
                None => banyan_bail!(
                    InvalidConfig: "line {}: continuation with no preceding key", number + 1
                ),
            }
        }

        if let Some(name) = trimmed.strip_prefix('[') {
            let name = name
                .strip_suffix(']')
                .ok_or_else(|| banyan_err!(InvalidConfig: "line {}: malformed section header", number + 1))?;
            section = name.trim().to_lowercase();
            continue;
        }

        let (key, value) = trimmed
            .split_once('=')
            .ok_or_else(|| banyan_err!(InvalidConfig: "line {}: expected 'key = value'", number + 1))?;
        let key = key.trim().to_lowercase();
        let full = if section.is_empty() || section == "default" {
            key
        } else {
            format!("{}.{}", section, key)
        };
        pairs.push((full, value.trim().to_string()));
    }

    Ok(pairs)
}

fn parse_int(key: &str, value: &str) -> BanyanResult<usize> {
    value
        .parse::<usize>()
        .map_err(|_| banyan_err!(InvalidConfig: "{} must be a non-negative integer, got '{}'", key, value))
}

fn parse_float(key: &str, value: &str) -> BanyanResult<f64> {
    value
        .parse::<f64>()
        .map_err(|_| banyan_err!(InvalidConfig: "{} must be a number, got '{}'", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_values() {
        let text = "\
# experiment settings
[data]
filename = data.txt
discretize = 3

[learner]
type = simanneal
numtasks = 4
seed = 9

[simanneal]
start_temp = 50
delta_temp = 0.8
max_iters_at_temp = 10

[result]
filename = out.json
size = 5
";
        let config = Config::from_text(text).unwrap();
        assert_eq!(config.data.filename.as_deref(), Some(Path::new("data.txt")));
        assert_eq!(config.data.discretize, 3);
        assert_eq!(config.learner.kind, LearnerKind::SimAnneal);
        assert_eq!(config.learner.numtasks, 4);
        assert_eq!(config.learner.seed, 9);
        assert_eq!(config.simanneal.start_temp, 50.0);
        assert_eq!(config.simanneal.delta_temp, 0.8);
        assert_eq!(config.result.size, 5);
        assert_eq!(config.result.filename, PathBuf::from("out.json"));
    }

    #[test]
    fn inline_dataset_uses_continuation_lines() {
        let text = "[data]\ntext = a\tb\n 0\t1\n 1\t0\n";
        let config = Config::from_text(text).unwrap();
        assert_eq!(config.data.text.as_deref(), Some("a\tb\n0\t1\n1\t0"));
    }

    #[test]
    fn unknown_key_is_invalid() {
        let err = Config::from_text("[data]\nbogus = 1\n").unwrap_err();
        assert_eq!(err.code(), banyan_error::ErrorCode::InvalidConfig);
    }

    #[test]
    fn bad_coercion_is_invalid() {
        let err = Config::from_text("[learner]\nnumtasks = many\n").unwrap_err();
        assert_eq!(err.code(), banyan_error::ErrorCode::InvalidConfig);
    }

    #[test]
    fn validators_reject_bad_annealing_schedule() {
        let err = Config::from_text("[simanneal]\ndelta_temp = 1.5\n").unwrap_err();
        assert_eq!(err.code(), banyan_error::ErrorCode::InvalidConfig);
    }

    #[test]
    fn custom_learner_path_is_rejected() {
        let err = Config::from_text("[learner]\ntype = my_mod:MyLearner\n").unwrap_err();
        assert_eq!(err.code(), banyan_error::ErrorCode::InvalidConfig);
    }

    #[test]
    fn exhaustive_requires_networks() {
        let err = Config::from_text("[learner]\ntype = exhaustive\n").unwrap_err();
        assert_eq!(err.code(), banyan_error::ErrorCode::InvalidConfig);

        let config = Config::from_text(
            "[learner]\ntype = exhaustive\n[listlearner]\nnetworks = 0,1;1,2 0,2\n",
        )
        .unwrap();
        assert_eq!(config.networks, vec!["0,1;1,2", "0,2"]);
    }

    #[test]
    fn gibbs_section_round_trips() {
        let config = Config::from_text(
            "[gibbs]\nburnin = 5\nstopping_criteria = iters > 10*n**2\n[evaluator]\nmissingdata_evaluator = exact\n",
        )
        .unwrap();
        assert_eq!(config.gibbs.burnin, 5);
        assert!(config.gibbs.stopping.should_stop(1000, 5));
        assert_eq!(config.missing_method, MissingMethod::Exact);
    }
}
