#[cfg(test)]
mod driver_tests {
    use banyan::config::{Config, LearnerKind};
    use banyan::{ResultArtifact, run, run_to_file};

    fn inline_dataset() -> String {
        let mut rows = String::new();
        for _ in 0..8 {
            rows.push_str(" 0\t0\t0\n");
            rows.push_str(" 1\t1\t1\n");
        }
        format!(
            "[data]\ntext = a,discrete(2)\tb,discrete(2)\tc,discrete(2)\n{}",
            rows
        )
    }

    #[test]
    fn greedy_end_to_end() {
        let config_text = format!(
            "{}\n[learner]\ntype = greedy\nnumtasks = 2\nseed = 4\n\n[greedy]\nmax_iterations = 60\n",
            inline_dataset()
        );
        let config = Config::from_text(&config_text).unwrap();
        assert_eq!(config.learner.kind, LearnerKind::Greedy);

        let result = run(&config).unwrap();
        assert_eq!(result.runs.len(), 2);
        assert!(result.posterior().len() > 0);
        assert_eq!(result.variables(), vec!["a", "b", "c"]);
    }

    #[test]
    fn exhaustive_end_to_end() {
        let config_text = format!(
            "{}\n[learner]\ntype = exhaustive\n\n[listlearner]\nnetworks = 0,1;1,2 0,2 \n\n[result]\nsize = 2\n",
            inline_dataset()
        );
        let config = Config::from_text(&config_text).unwrap();

        let result = run(&config).unwrap();
        assert_eq!(result.num_networks(), 2);
        let posterior = result.posterior();
        assert_eq!(posterior.len(), 2);
        // ascending by score
        assert!(posterior.get(0).unwrap().1 <= posterior.best().unwrap().1);
    }

    #[test]
    fn discretization_applies_to_continuous_columns() {
        let config_text = "[data]\ntext = x,continuous\ty\n 0.1\t0\n 0.9\t1\n 0.2\t0\n 0.8\t1\n\ndiscretize = 2\n\n[greedy]\nmax_iterations = 10\n";
        let config = Config::from_text(config_text).unwrap();
        let data = banyan::load_dataset(&config).unwrap();
        assert_eq!(data.arities(), &[2, 2]);
        assert_eq!(data.observations().column(0), vec![0, 1, 0, 1]);
    }

    #[test]
    fn result_file_round_trips() {
        let dir = std::env::temp_dir().join("banyan-driver-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("result_round_trip.json");

        let config_text = format!(
            "{}\n[greedy]\nmax_iterations = 30\n\n[result]\nfilename = {}\nsize = 3\n",
            inline_dataset(),
            path.display()
        );
        let config = Config::from_text(&config_text).unwrap();
        run_to_file(&config).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let artifact: ResultArtifact = serde_json::from_str(&written).unwrap();
        assert_eq!(artifact.dataset.variable_names(), vec!["a", "b", "c"]);
        assert!(!artifact.networks.is_empty());
        assert!(artifact.networks.len() <= 3);
        assert!(artifact.runs[0].end_time.is_some());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_dataset_is_invalid_config() {
        let config = Config::from_text("[greedy]\nmax_iterations = 5\n").unwrap();
        let err = run(&config).unwrap_err();
        assert_eq!(err.code(), banyan::ErrorCode::InvalidConfig);
    }

    #[test]
    fn gibbs_driver_run_with_missing_cells() {
        let config_text = "[data]\ntext = a,discrete(2)\tb,discrete(2)\n 0\t0\n 1\t1\n X\t1\n 0\t0\n\n[greedy]\nmax_iterations = 4\n\n[gibbs]\nstopping_criteria = iters > n\n";
        let config = Config::from_text(config_text).unwrap();
        let result = run(&config).unwrap();
        assert!(result.num_networks() > 0);
    }
}
