//! Datasets of discrete observations with missing and intervention masks.
//!
//! Parsing happens in two stages. [DataTable] holds the raw parsed cells as
//! floats so that continuous columns can be discretized; [DataTable::finish]
//! validates arities and produces the integer [Dataset] the scoring engine
//! works on. A [Dataset] never changes shape after construction.

use crate::matrix::Matrix;
use banyan_error::{BanyanResult, banyan_bail, banyan_err, ensure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VarKind {
    Discrete { arity: usize },
    Class { labels: Vec<String> },
    Continuous,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
}

impl Variable {
    pub fn discrete(name: impl Into<String>, arity: usize) -> Self {
        Variable {
            name: name.into(),
            kind: VarKind::Discrete { arity },
        }
    }

    pub fn class(name: impl Into<String>, labels: Vec<String>) -> Self {
        Variable {
            name: name.into(),
            kind: VarKind::Class { labels },
        }
    }

    pub fn continuous(name: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            kind: VarKind::Continuous,
        }
    }

    /// Number of admissible values; zero for continuous variables.
    pub fn arity(&self) -> usize {
        match &self.kind {
            VarKind::Discrete { arity } => *arity,
            VarKind::Class { labels } => labels.len(),
            VarKind::Continuous => 0,
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self.kind, VarKind::Continuous)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
}

impl Sample {
    pub fn new(name: impl Into<String>) -> Self {
        Sample { name: name.into() }
    }
}

/// Immutable-shape dataset: observation matrix plus missing and
/// intervention masks and per-column annotations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    observations: Matrix<i32>,
    missing: Matrix<bool>,
    interventions: Matrix<bool>,
    variables: Vec<Variable>,
    samples: Vec<Sample>,
    arities: Vec<usize>,
    has_missing: bool,
    has_interventions: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeAxis {
    Samples,
    Variables,
}

impl Dataset {
    /// Builds a dataset from a bare observation matrix, guessing each
    /// column's arity from its observed values. No missing cells, no
    /// interventions.
    pub fn new(observations: Matrix<i32>) -> Self {
        let rows = observations.rows();
        let cols = observations.cols();
        let variables = (0..cols)
            .map(|c| {
                let max = observations.column(c).into_iter().max().unwrap_or(0);
                Variable::discrete(c.to_string(), ((max + 1).max(2)) as usize)
            })
            .collect();
        let samples = (0..rows).map(|s| Sample::new(s.to_string())).collect();
        Self::assemble(
            observations,
            Matrix::filled(rows, cols, false),
            Matrix::filled(rows, cols, false),
            variables,
            samples,
        )
    }

    /// Builds a dataset from explicit parts, validating shapes and the
    /// arity invariant: every non-missing observation of a discrete
    /// variable lies in `[0, arity)`.
    pub fn with_parts(
        observations: Matrix<i32>,
        missing: Matrix<bool>,
        interventions: Matrix<bool>,
        variables: Vec<Variable>,
        samples: Vec<Sample>,
    ) -> BanyanResult<Self> {
        let rows = observations.rows();
        let cols = observations.cols();
        ensure!(
            missing.rows() == rows && missing.cols() == cols,
            Parse: "missing mask shape does not match observations"
        );
        ensure!(
            interventions.rows() == rows && interventions.cols() == cols,
            Parse: "intervention mask shape does not match observations"
        );
        ensure!(
            variables.len() == cols,
            Parse: "expected {} variable annotations, found {}", cols, variables.len()
        );
        ensure!(
            samples.len() == rows,
            Parse: "expected {} sample annotations, found {}", rows, samples.len()
        );

        for (c, var) in variables.iter().enumerate() {
            ensure!(
                !var.is_continuous(),
                InvalidConfig: "continuous variable '{}' must be discretized before use", var.name
            );
            let arity = var.arity();
            ensure!(
                arity >= 2,
                Arity: "variable '{}' has arity {}, need at least 2", var.name, arity
            );
            let mut distinct = BTreeSet::new();
            for r in 0..rows {
                if missing.at(r, c) {
                    continue;
                }
                distinct.insert(observations.at(r, c));
            }
            ensure!(
                distinct.len() <= arity,
                Arity: "variable '{}' has arity {} but {} distinct values",
                var.name, arity, distinct.len()
            );
            for r in 0..rows {
                if missing.at(r, c) {
                    continue;
                }
                let value = observations.at(r, c);
                ensure!(
                    value >= 0 && (value as usize) < arity,
                    Arity: "variable '{}' has arity {} but observed value {}",
                    var.name, arity, value
                );
            }
        }

        Ok(Self::assemble(
            observations,
            missing,
            interventions,
            variables,
            samples,
        ))
    }

    fn assemble(
        observations: Matrix<i32>,
        missing: Matrix<bool>,
        interventions: Matrix<bool>,
        variables: Vec<Variable>,
        samples: Vec<Sample>,
    ) -> Self {
        let arities = variables.iter().map(Variable::arity).collect();
        let has_missing = missing.data().iter().any(|&m| m);
        let has_interventions = interventions.data().iter().any(|&i| i);
        Dataset {
            observations,
            missing,
            interventions,
            variables,
            samples,
            arities,
            has_missing,
            has_interventions,
        }
    }

    pub fn observations(&self) -> &Matrix<i32> {
        &self.observations
    }

    pub fn missing(&self) -> &Matrix<bool> {
        &self.missing
    }

    pub fn interventions(&self) -> &Matrix<bool> {
        &self.interventions
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn arities(&self) -> &[usize] {
        &self.arities
    }

    pub fn num_samples(&self) -> usize {
        self.observations.rows()
    }

    pub fn num_variables(&self) -> usize {
        self.observations.cols()
    }

    pub fn has_missing(&self) -> bool {
        self.has_missing
    }

    pub fn has_interventions(&self) -> bool {
        self.has_interventions
    }

    /// Missing cells in row-major order, the order the samplers sweep.
    pub fn missing_cells(&self) -> Vec<(usize, usize)> {
        let mut cells = Vec::new();
        for s in 0..self.num_samples() {
            for v in 0..self.num_variables() {
                if self.missing.at(s, v) {
                    cells.push((s, v));
                }
            }
        }
        cells
    }

    /// Serializes back to the tab-separated text format. Missing cells are
    /// written as `X`, interventions get a `!` suffix, class observations
    /// are written as their labels.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.num_samples() + 1);

        let header = self
            .variables
            .iter()
            .map(|v| match &v.kind {
                VarKind::Discrete { arity } => format!("{},discrete({})", v.name, arity),
                VarKind::Class { labels } => format!("{},class({})", v.name, labels.join(",")),
                VarKind::Continuous => format!("{},continuous", v.name),
            })
            .collect::<Vec<_>>()
            .join("\t");
        lines.push(header);

        for s in 0..self.num_samples() {
            let mut cells = Vec::with_capacity(self.num_variables() + 1);
            cells.push(self.samples[s].name.clone());
            for v in 0..self.num_variables() {
                let mut cell = if self.missing.at(s, v) {
                    "X".to_string()
                } else {
                    match &self.variables[v].kind {
                        VarKind::Class { labels } => {
                            labels[self.observations.at(s, v) as usize].clone()
                        }
                        _ => self.observations.at(s, v).to_string(),
                    }
                };
                if self.interventions.at(s, v) {
                    cell.push('!');
                }
                cells.push(cell);
            }
            lines.push(cells.join("\t"));
        }

        lines.join("\n")
    }

    /// Merges datasets by stacking samples (variables must agree) or by
    /// stacking variables (sample count must agree; the first dataset's
    /// sample annotations win).
    pub fn merge(parts: &[Dataset], axis: MergeAxis) -> BanyanResult<Dataset> {
        ensure!(!parts.is_empty(), InvalidConfig: "cannot merge zero datasets");
        let first = &parts[0];

        match axis {
            MergeAxis::Samples => {
                let mut obs_rows = Vec::new();
                let mut miss_rows = Vec::new();
                let mut intr_rows = Vec::new();
                let mut samples = Vec::new();
                for part in parts {
                    ensure!(
                        part.variables == first.variables,
                        InvalidConfig: "cannot merge datasets with different variables"
                    );
                    for s in 0..part.num_samples() {
                        obs_rows.push(part.observations.row(s).to_vec());
                        miss_rows.push(part.missing.row(s).to_vec());
                        intr_rows.push(part.interventions.row(s).to_vec());
                    }
                    samples.extend(part.samples.iter().cloned());
                }
                Dataset::with_parts(
                    Matrix::from_rows(obs_rows)?,
                    Matrix::from_rows(miss_rows)?,
                    Matrix::from_rows(intr_rows)?,
                    first.variables.clone(),
                    samples,
                )
            }
            MergeAxis::Variables => {
                let rows = first.num_samples();
                let mut variables = Vec::new();
                let mut obs_rows = vec![Vec::new(); rows];
                let mut miss_rows = vec![Vec::new(); rows];
                let mut intr_rows = vec![Vec::new(); rows];
                for part in parts {
                    ensure!(
                        part.num_samples() == rows,
                        InvalidConfig: "cannot merge datasets with different sample counts"
                    );
                    variables.extend(part.variables.iter().cloned());
                    for s in 0..rows {
                        obs_rows[s].extend_from_slice(part.observations.row(s));
                        miss_rows[s].extend_from_slice(part.missing.row(s));
                        intr_rows[s].extend_from_slice(part.interventions.row(s));
                    }
                }
                Dataset::with_parts(
                    Matrix::from_rows(obs_rows)?,
                    Matrix::from_rows(miss_rows)?,
                    Matrix::from_rows(intr_rows)?,
                    variables,
                    first.samples.clone(),
                )
            }
        }
    }
}

/// Per-column parse state: the declared kind from the header, or evidence
/// gathered from the cells when the header gave none.
#[derive(Clone, Debug)]
pub(crate) struct ColumnSpec {
    pub(crate) name: String,
    pub(crate) declared: Option<VarKind>,
    pub(crate) saw_float: bool,
}

/// Parsed but not yet validated data. Cell values are floats so that
/// continuous columns survive until discretization.
#[derive(Clone, Debug)]
pub struct DataTable {
    pub(crate) values: Matrix<f64>,
    pub(crate) missing: Matrix<bool>,
    pub(crate) interventions: Matrix<bool>,
    pub(crate) columns: Vec<ColumnSpec>,
    pub(crate) samples: Option<Vec<Sample>>,
}

impl DataTable {
    pub fn from_file(path: impl AsRef<Path>) -> BanyanResult<DataTable> {
        let text = std::fs::read_to_string(path)?;
        DataTable::parse(&text)
    }

    /// Parses the tab-separated text format: `#` comment lines, a header
    /// of `name` or `name,kind(param)` entries, then data rows. A leading
    /// cell per row is taken as the sample name when every row has one
    /// more cell than the header.
    pub fn parse(text: &str) -> BanyanResult<DataTable> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
            .collect();
        ensure!(!lines.is_empty(), Parse: "dataset is empty");

        let mut columns = Vec::new();
        for entry in lines[0].split('\t') {
            columns.push(parse_header_entry(entry)?);
        }
        let ncols = columns.len();

        let rows: Vec<Vec<&str>> = lines[1..]
            .iter()
            .map(|l| l.split('\t').collect())
            .collect();
        ensure!(!rows.is_empty(), Parse: "dataset has no data rows");

        let named = rows.iter().all(|r| r.len() == ncols + 1);
        let mut samples = None;
        if named {
            samples = Some(
                rows.iter()
                    .map(|r| Sample::new(r[0].trim()))
                    .collect::<Vec<_>>(),
            );
        }

        let mut values = Matrix::<f64>::new(rows.len(), ncols);
        let mut missing = Matrix::<bool>::new(rows.len(), ncols);
        let mut interventions = Matrix::<bool>::new(rows.len(), ncols);

        for (r, row) in rows.iter().enumerate() {
            let cells = if named { &row[1..] } else { &row[..] };
            ensure!(
                cells.len() == ncols,
                Parse: "row {} has {} cells, expected {}", r + 1, cells.len(), ncols
            );
            for (c, cell) in cells.iter().enumerate() {
                let parsed = parse_cell(cell, &mut columns[c])?;
                values.set(r, c, parsed.value);
                missing.set(r, c, parsed.missing);
                interventions.set(r, c, parsed.intervention);
            }
        }

        Ok(DataTable {
            values,
            missing,
            interventions,
            columns,
            samples,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.values.rows()
    }

    pub fn num_variables(&self) -> usize {
        self.columns.len()
    }

    /// Columns that are continuous, either declared or inferred from the
    /// presence of fractional values.
    pub fn continuous_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, col)| match &col.declared {
                Some(kind) => matches!(kind, VarKind::Continuous),
                None => col.saw_float,
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Validates arities and produces the integer dataset. Continuous
    /// columns must have been discretized by now.
    pub fn finish(self) -> BanyanResult<Dataset> {
        let rows = self.values.rows();
        let cols = self.values.cols();

        let mut variables = Vec::with_capacity(cols);
        for (c, col) in self.columns.iter().enumerate() {
            let kind = match &col.declared {
                Some(kind) => kind.clone(),
                None if col.saw_float => VarKind::Continuous,
                None => {
                    let mut max = 0i64;
                    for r in 0..rows {
                        if !self.missing.at(r, c) {
                            max = max.max(self.values.at(r, c) as i64);
                        }
                    }
                    VarKind::Discrete {
                        arity: ((max + 1).max(2)) as usize,
                    }
                }
            };
            variables.push(Variable {
                name: col.name.clone(),
                kind,
            });
        }

        let mut observations = Matrix::<i32>::new(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                let value = self.values.at(r, c);
                if value.fract() != 0.0 {
                    banyan_bail!(
                        Parse: "non-integer value {} for discrete variable '{}'",
                        value, self.columns[c].name
                    );
                }
                observations.set(r, c, value as i32);
            }
        }

        let samples = self
            .samples
            .unwrap_or_else(|| (0..rows).map(|s| Sample::new(s.to_string())).collect());

        Dataset::with_parts(observations, self.missing, self.interventions, variables, samples)
    }
}

fn parse_header_entry(entry: &str) -> BanyanResult<ColumnSpec> {
    // Excel wraps cells containing punctuation in double quotes
    let entry = entry.trim().trim_matches('"');
    let (name, kind) = match entry.split_once(',') {
        None => (entry, None),
        Some((name, dtype)) => {
            let dtype = dtype.trim();
            let (kind_name, param) = match dtype.split_once('(') {
                None => (dtype, ""),
                Some((kind_name, rest)) => (kind_name, rest.trim_end_matches(')')),
            };
            let kind = match kind_name.trim().to_ascii_lowercase().as_str() {
                "continuous" => VarKind::Continuous,
                "discrete" => {
                    let arity = param.trim().parse::<usize>().map_err(|_| {
                        banyan_err!(Parse: "invalid arity '{}' for variable '{}'", param, name)
                    })?;
                    VarKind::Discrete { arity }
                }
                "class" => {
                    let labels: Vec<String> = param
                        .split(',')
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect();
                    ensure!(
                        !labels.is_empty(),
                        Parse: "class variable '{}' declares no labels", name
                    );
                    VarKind::Class { labels }
                }
                other => banyan_bail!(Parse: "unknown variable kind '{}'", other),
            };
            (name, Some(kind))
        }
    };

    Ok(ColumnSpec {
        name: name.trim().to_string(),
        declared: kind,
        saw_float: false,
    })
}

struct ParsedCell {
    value: f64,
    missing: bool,
    intervention: bool,
}

fn parse_cell(cell: &str, col: &mut ColumnSpec) -> BanyanResult<ParsedCell> {
    let mut item = cell.trim();
    ensure!(!item.is_empty(), Parse: "empty cell for variable '{}'", col.name);

    let mut intervention = false;
    if let Some(rest) = item.strip_prefix('!') {
        intervention = true;
        item = rest;
    } else if let Some(rest) = item.strip_suffix('!') {
        intervention = true;
        item = rest;
    }

    if item.eq_ignore_ascii_case("x") {
        // the placeholder value is 0 (the first class label)
        return Ok(ParsedCell {
            value: 0.0,
            missing: true,
            intervention,
        });
    }

    let value = match &col.declared {
        Some(VarKind::Class { labels }) => {
            match labels.iter().position(|l| l == item) {
                Some(index) => index as f64,
                None => banyan_bail!(
                    Parse: "'{}' is not a label of class variable '{}'", item, col.name
                ),
            }
        }
        Some(VarKind::Discrete { .. }) => item.parse::<i64>().map_err(|_| {
            banyan_err!(Parse: "invalid value for discrete variable '{}': {}", col.name, item)
        })? as f64,
        Some(VarKind::Continuous) => item.parse::<f64>().map_err(|_| {
            banyan_err!(Parse: "invalid value for continuous variable '{}': {}", col.name, item)
        })?,
        None => {
            if let Ok(int) = item.parse::<i64>() {
                int as f64
            } else if let Ok(float) = item.parse::<f64>() {
                col.saw_float = true;
                float
            } else {
                banyan_bail!(Parse: "cannot parse value '{}' for variable '{}'", item, col.name)
            }
        }
    };

    Ok(ParsedCell {
        value,
        missing: false,
        intervention,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = "\
# a comment
a,discrete(2)\tb,discrete(2)\tc,discrete(2)\td,discrete(2)
0\t1\t1\t0
1\t0\t0\t1
1\t1\t1\t0
1\t1\t1\t0
0\t0\t1\t1
";

    #[test]
    fn parses_basic_file() {
        let data = DataTable::parse(BASIC).unwrap().finish().unwrap();
        assert_eq!(data.num_samples(), 5);
        assert_eq!(data.num_variables(), 4);
        assert_eq!(data.arities(), &[2, 2, 2, 2]);
        assert!(!data.has_missing());
        assert!(!data.has_interventions());
        assert_eq!(data.observations().at(0, 1), 1);
        assert_eq!(data.variables()[0].name, "a");
    }

    #[test]
    fn parses_decorations() {
        let text = "a,discrete(2)\tb,discrete(3)\n!0\t2\nX\t1!\n1\tx\n";
        let data = DataTable::parse(text).unwrap().finish().unwrap();
        assert!(data.interventions().at(0, 0));
        assert!(data.interventions().at(1, 1));
        assert!(data.missing().at(1, 0));
        assert!(data.missing().at(2, 1));
        // missing cells are stored as the placeholder value 0
        assert_eq!(data.observations().at(1, 0), 0);
        assert_eq!(data.missing_cells(), vec![(1, 0), (2, 1)]);
    }

    #[test]
    fn parses_sample_names() {
        let text = "a,discrete(2)\tb,discrete(2)\ns1\t0\t1\ns2\t1\t0\n";
        let data = DataTable::parse(text).unwrap().finish().unwrap();
        assert_eq!(data.samples()[0].name, "s1");
        assert_eq!(data.samples()[1].name, "s2");
        assert_eq!(data.observations().at(0, 1), 1);
    }

    #[test]
    fn parses_class_variables() {
        let text = "tissue,class(normal,cancer)\tg,discrete(2)\nnormal\t0\ncancer\t1\nX\t0\n";
        let data = DataTable::parse(text).unwrap().finish().unwrap();
        assert_eq!(data.arities()[0], 2);
        assert_eq!(data.observations().at(0, 0), 0);
        assert_eq!(data.observations().at(1, 0), 1);
        assert!(data.missing().at(2, 0));
    }

    #[test]
    fn rejects_unknown_class_label() {
        let text = "tissue,class(normal,cancer)\nweird\n";
        let err = DataTable::parse(text).unwrap_err();
        assert_eq!(err.code(), banyan_error::ErrorCode::Parse);
    }

    #[test]
    fn guesses_arity_for_untyped_columns() {
        let text = "a\tb\n0\t2\n1\t0\n1\t1\n";
        let data = DataTable::parse(text).unwrap().finish().unwrap();
        assert_eq!(data.arities(), &[2, 3]);
    }

    #[test]
    fn arity_error_when_declared_too_small() {
        let text = "a,discrete(2)\n0\n1\n2\n";
        let err = DataTable::parse(text).unwrap().finish().unwrap_err();
        assert_eq!(err.code(), banyan_error::ErrorCode::Arity);
    }

    #[test]
    fn continuous_requires_discretization() {
        let text = "a,continuous\n0.5\n1.5\n";
        let err = DataTable::parse(text).unwrap().finish().unwrap_err();
        assert_eq!(err.code(), banyan_error::ErrorCode::InvalidConfig);
    }

    #[test]
    fn text_round_trip() {
        let text = "a,discrete(2)\tb,class(lo,hi)\ns1\t0\thi\ns2\tX\tlo!\n";
        let data = DataTable::parse(text).unwrap().finish().unwrap();
        let again = DataTable::parse(&data.to_text()).unwrap().finish().unwrap();
        assert_eq!(data, again);
    }

    #[test]
    fn merge_by_samples() {
        let a = DataTable::parse("a,discrete(2)\n0\n1\n").unwrap().finish().unwrap();
        let b = DataTable::parse("a,discrete(2)\n1\n1\n").unwrap().finish().unwrap();
        let merged = Dataset::merge(&[a, b], MergeAxis::Samples).unwrap();
        assert_eq!(merged.num_samples(), 4);
        assert_eq!(merged.observations().column(0), vec![0, 1, 1, 1]);
    }

    #[test]
    fn merge_by_variables() {
        let a = DataTable::parse("a,discrete(2)\n0\n1\n").unwrap().finish().unwrap();
        let b = DataTable::parse("b,discrete(2)\n1\n0\n").unwrap().finish().unwrap();
        let merged = Dataset::merge(&[a, b], MergeAxis::Variables).unwrap();
        assert_eq!(merged.num_variables(), 2);
        assert_eq!(merged.variable_names(), vec!["a", "b"]);
        assert_eq!(merged.observations().row(0), &[0, 1]);
    }

    #[test]
    fn dataset_serde_round_trip() {
        let data = DataTable::parse(BASIC).unwrap().finish().unwrap();
        let json = serde_json::to_string(&data).unwrap();
        let back: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(data, back);
    }
}
