//! Ties the pieces together: dataset, prior, learners, controller,
//! result artifact.

use crate::config::{Config, LearnerKind};
use banyan_core::{DataTable, Dataset, Prior, SamplerConfig, maximum_entropy_discretize};
use banyan_error::{BanyanResult, banyan_bail, ensure};
use banyan_learners::{
    GreedyLearner, Learner, LearnerResult, ListLearner, SimAnnealLearner, TaskController,
};
use std::sync::Arc;
use tracing::{info, warn};

pub fn load_dataset(config: &Config) -> BanyanResult<Arc<Dataset>> {
    let mut table = if let Some(text) = &config.data.text {
        DataTable::parse(text)?
    } else if let Some(filename) = &config.data.filename {
        DataTable::from_file(filename)?
    } else {
        banyan_bail!(InvalidConfig: "no dataset given; set data.filename or data.text");
    };

    if config.data.discretize > 0 {
        let continuous = table.continuous_columns();
        if !continuous.is_empty() {
            maximum_entropy_discretize(&mut table, Some(&continuous), &[], config.data.discretize)?;
        }
    }

    Ok(Arc::new(table.finish()?))
}

fn sampler_config(config: &Config, seed: u64) -> SamplerConfig {
    SamplerConfig {
        method: config.missing_method,
        burnin: config.gibbs.burnin,
        stopping: config.gibbs.stopping.clone(),
        seed,
    }
}

pub fn build_learners(
    config: &Config,
    data: Arc<Dataset>,
    prior: Prior,
) -> BanyanResult<Vec<Box<dyn Learner + Send>>> {
    let numtasks = config.learner.numtasks.max(1);
    let base_seed = config.learner.seed;
    let size = config.result.size;

    let tasks: Vec<Box<dyn Learner + Send>> = match config.learner.kind {
        LearnerKind::Greedy => (0..numtasks)
            .map(|task| {
                let seed = base_seed.wrapping_add(task as u64);
                Box::new(
                    GreedyLearner::new(
                        data.clone(),
                        prior.clone(),
                        config.greedy.clone(),
                        sampler_config(config, seed),
                        seed,
                    )
                    .with_result_size(size),
                ) as Box<dyn Learner + Send>
            })
            .collect(),
        LearnerKind::SimAnneal => (0..numtasks)
            .map(|task| {
                let seed = base_seed.wrapping_add(task as u64);
                Box::new(
                    SimAnnealLearner::new(
                        data.clone(),
                        prior.clone(),
                        config.simanneal.clone(),
                        sampler_config(config, seed),
                        seed,
                    )
                    .with_result_size(size),
                ) as Box<dyn Learner + Send>
            })
            .collect(),
        LearnerKind::Exhaustive => {
            let learner = ListLearner::from_strings(
                data,
                prior,
                sampler_config(config, base_seed),
                config.networks.iter(),
            )?
            .with_result_size(size);
            learner
                .split(numtasks)
                .into_iter()
                .map(|part| Box::new(part) as Box<dyn Learner + Send>)
                .collect()
        }
    };

    Ok(tasks)
}

/// Runs the configured learners and merges their results. Failed tasks
/// are logged and skipped; the run fails only when nothing succeeded.
pub fn run(config: &Config) -> BanyanResult<LearnerResult> {
    let data = load_dataset(config)?;
    info!(
        samples = data.num_samples(),
        variables = data.num_variables(),
        missing = data.has_missing(),
        "dataset loaded"
    );

    let tasks = build_learners(config, data, Prior::null())?;
    let task_count = tasks.len();
    let controller = if task_count > 1 {
        TaskController::threaded(task_count)
    } else {
        TaskController::serial()
    };

    let mut merged: Option<LearnerResult> = None;
    let mut first_error = None;
    for outcome in controller.run(tasks) {
        match outcome {
            Ok(result) => match merged.as_mut() {
                Some(base) => base.merge(result),
                None => merged = Some(result),
            },
            Err(err) => {
                warn!(error = %err, "learner task failed");
                first_error.get_or_insert(err);
            }
        }
    }

    match merged {
        Some(result) => Ok(result),
        None => match first_error {
            Some(err) => Err(err),
            None => banyan_bail!(InvalidConfig: "no learner tasks were configured"),
        },
    }
}

/// Full driver: run and persist the result artifact.
pub fn run_to_file(config: &Config) -> BanyanResult<()> {
    let result = run(config)?;
    ensure!(
        !config.result.filename.as_os_str().is_empty(),
        InvalidConfig: "result.filename is empty"
    );
    result.write_json(&config.result.filename)?;
    info!(
        networks = result.num_networks(),
        file = %config.result.filename.display(),
        "result written"
    );
    Ok(())
}
