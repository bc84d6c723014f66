//! Maximum-entropy discretization.
//!
//! Bins are chosen so that occupancy is as even as the data allows, with
//! one rule taking precedence: identical inputs always land in identical
//! bins, even when that leaves the bins uneven. Bin edges sit at the
//! `(i * N/k - 1)`-th sorted non-missing value; missing cells go to bin 0.

use crate::dataset::{DataTable, VarKind};
use banyan_error::{BanyanResult, ensure};

/// Discretizes the selected columns of `table` in place into `numbins`
/// equal-occupancy bins. `include` defaults to every column; `exclude`
/// is subtracted from it. Discretized columns become
/// `VarKind::Discrete { arity: numbins }`.
pub fn maximum_entropy_discretize(
    table: &mut DataTable,
    include: Option<&[usize]>,
    exclude: &[usize],
    numbins: usize,
) -> BanyanResult<()> {
    ensure!(numbins >= 2, InvalidConfig: "discretization needs at least 2 bins, got {}", numbins);

    let all: Vec<usize> = (0..table.num_variables()).collect();
    let selected: Vec<usize> = include
        .unwrap_or(&all)
        .iter()
        .copied()
        .filter(|v| !exclude.contains(v))
        .collect();

    for &var in &selected {
        let mut observed: Vec<f64> = (0..table.num_samples())
            .filter(|&s| !table.missing.at(s, var))
            .map(|s| table.values.at(s, var))
            .collect();
        ensure!(
            observed.len() >= numbins,
            InvalidConfig: "column {} has {} observed values, need at least {} to discretize",
            var, observed.len(), numbins
        );
        observed.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let binsize = observed.len() / numbins;
        let edges: Vec<f64> = (1..numbins).map(|b| observed[binsize * b - 1]).collect();

        for s in 0..table.num_samples() {
            let bin = if table.missing.at(s, var) {
                0
            } else {
                let value = table.values.at(s, var);
                edges.partition_point(|&edge| edge < value)
            };
            table.values.set(s, var, bin as f64);
        }

        table.columns[var].declared = Some(VarKind::Discrete { arity: numbins });
        table.columns[var].saw_float = false;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DataTable;

    fn column(table: &DataTable, var: usize) -> Vec<i32> {
        (0..table.num_samples())
            .map(|s| table.values.at(s, var) as i32)
            .collect()
    }

    #[test]
    fn equal_values_share_a_bin() {
        // all the 4s discretize together even though it skews bin sizes
        let text = "a,continuous\n3\n7\n4\n4\n4\n5\n";
        let mut table = DataTable::parse(text).unwrap();
        maximum_entropy_discretize(&mut table, None, &[], 2).unwrap();
        assert_eq!(column(&table, 0), vec![0, 1, 0, 0, 0, 1]);
    }

    #[test]
    fn missing_cells_go_to_bin_zero() {
        let text = "a,continuous\n1\n2\n3\n4\n2\n1\n2\n3\n1\nX\nX\nX\n";
        let mut table = DataTable::parse(text).unwrap();
        maximum_entropy_discretize(&mut table, None, &[], 3).unwrap();
        assert_eq!(column(&table, 0), vec![0, 1, 2, 2, 1, 0, 1, 2, 0, 0, 0, 0]);
    }

    #[test]
    fn idempotent_on_already_discrete_data() {
        let text = "a\n0\n1\n2\n0\n1\n2\n";
        let mut table = DataTable::parse(text).unwrap();
        let before = column(&table, 0);
        maximum_entropy_discretize(&mut table, None, &[], 3).unwrap();
        assert_eq!(column(&table, 0), before);
        maximum_entropy_discretize(&mut table, None, &[], 3).unwrap();
        assert_eq!(column(&table, 0), before);
    }

    #[test]
    fn exclude_list_is_honored() {
        let text = "a,continuous\tb\n1.5\t0\n2.5\t1\n3.5\t0\n4.5\t1\n";
        let mut table = DataTable::parse(text).unwrap();
        maximum_entropy_discretize(&mut table, None, &[1], 2).unwrap();
        assert_eq!(column(&table, 0), vec![0, 0, 1, 1]);
        assert_eq!(column(&table, 1), vec![0, 1, 0, 1]);
        let data = table.finish().unwrap();
        assert_eq!(data.arities(), &[2, 2]);
    }

    #[test]
    fn rejects_too_few_observed_values() {
        let text = "a,continuous\n1.0\n2.0\n";
        let mut table = DataTable::parse(text).unwrap();
        let err = maximum_entropy_discretize(&mut table, None, &[], 3).unwrap_err();
        assert_eq!(err.code(), banyan_error::ErrorCode::InvalidConfig);
    }
}
