#[cfg(test)]
mod evaluator_tests {
    use banyan_core::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::sync::Arc;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    // 5 samples x 4 binary variables: 0110, 1001, 1110, 1110, 0011
    fn data10() -> Arc<Dataset> {
        Arc::new(Dataset::new(
            Matrix::from_rows(vec![
                vec![0, 1, 1, 0],
                vec![1, 0, 0, 1],
                vec![1, 1, 1, 0],
                vec![1, 1, 1, 0],
                vec![0, 0, 1, 1],
            ])
            .unwrap(),
        ))
    }

    fn evaluator() -> NetworkEvaluator {
        NetworkEvaluator::from_dataset(data10(), Prior::null()).unwrap()
    }

    #[test]
    fn empty_network_score() {
        let mut ev = evaluator();
        assert!(close(ev.score_network().unwrap(), -15.6842310683));
    }

    #[test]
    fn three_parent_network_score() {
        let mut ev = evaluator();
        let score = ev.alter_network(&[(1, 0), (2, 0), (3, 0)], &[]).unwrap();
        assert!(close(score, -15.461087517));
    }

    #[test]
    fn uniform_prior_shifts_score() {
        let mut ev = NetworkEvaluator::new(
            data10(),
            Network::with_edges(4, [(1, 0), (2, 0), (3, 0)]),
            Prior::uniform(4),
        )
        .unwrap();
        assert!(close(ev.score_network().unwrap(), -16.961087517));
    }

    #[test]
    fn cache_counters_track_dirty_scoring() {
        let mut ev = evaluator();
        ev.alter_network(&[(1, 0), (2, 0), (3, 0)], &[]).unwrap();
        assert_eq!((ev.cache().hits(), ev.cache().misses()), (0, 4));

        // nodes 0, 1 and 3 did not change; only node 2's family is rescored
        ev.alter_network(&[(1, 2)], &[]).unwrap();
        assert_eq!((ev.cache().hits(), ev.cache().misses()), (0, 5));
        assert!(close(ev.score_network().unwrap(), -15.2379439657));
    }

    #[test]
    fn cyclic_edit_is_rejected_and_state_kept() {
        let mut ev = evaluator();
        let score = ev.alter_network(&[(1, 0), (2, 0), (3, 0)], &[]).unwrap();

        let err = ev.alter_network(&[(0, 1)], &[]).unwrap_err();
        assert!(err.is_cyclic());

        let edges: Vec<Edge> = ev.network().edges().collect();
        assert_eq!(edges, vec![(1, 0), (2, 0), (3, 0)]);
        assert!(close(ev.score_network().unwrap(), score));
    }

    #[test]
    fn incremental_edits_match_reference_scores() {
        let mut ev = evaluator();
        assert!(close(
            ev.alter_network(&[(1, 0), (2, 0), (3, 0)], &[]).unwrap(),
            -15.461087517
        ));
        assert!(close(ev.alter_network(&[(2, 3)], &[]).unwrap(), -15.0556224089));
        assert!(close(
            ev.alter_network(&[(1, 2)], &[(1, 0)]).unwrap(),
            -14.8324788576
        ));
        assert!(close(ev.restore_network().unwrap(), -15.0556224089));

        let edges: Vec<Edge> = ev.network().edges().collect();
        assert_eq!(edges, vec![(1, 0), (2, 0), (2, 3), (3, 0)]);
    }

    #[test]
    fn incremental_matches_scratch_evaluation() {
        let mut ev = evaluator();
        ev.alter_network(&[(1, 0), (2, 0), (3, 0)], &[]).unwrap();
        let incremental = ev.alter_network(&[(2, 3)], &[]).unwrap();

        let mut scratch = NetworkEvaluator::new(
            data10(),
            Network::from_edge_string(4, "1,0;2,0;3,0;2,3").unwrap(),
            Prior::null(),
        )
        .unwrap();
        assert!(close(incremental, scratch.score_network().unwrap()));
    }

    #[test]
    fn multi_edge_edit_and_restore() {
        let mut ev = evaluator();
        ev.alter_network(&[(1, 0), (2, 0), (3, 0)], &[]).unwrap();
        ev.alter_network(&[(2, 3)], &[]).unwrap();
        ev.alter_network(&[(1, 2)], &[(1, 0)]).unwrap();
        ev.restore_network().unwrap();

        let score = ev
            .alter_network(&[(1, 2), (1, 3)], &[(1, 0), (3, 0)])
            .unwrap();
        assert!(close(score, -14.139331677));
        let edges: Vec<Edge> = ev.network().edges().collect();
        assert_eq!(edges, vec![(1, 2), (1, 3), (2, 0), (2, 3)]);

        assert!(close(ev.restore_network().unwrap(), -15.0556224089));
        let edges: Vec<Edge> = ev.network().edges().collect();
        assert_eq!(edges, vec![(1, 0), (2, 0), (2, 3), (3, 0)]);
    }

    #[test]
    fn restore_leaves_evaluator_identical() {
        let mut ev = evaluator();
        ev.alter_network(&[(1, 0), (2, 0), (3, 0)], &[]).unwrap();
        let score_before = ev.score_network().unwrap();
        let net_before = ev.network().clone();
        let locals_before = ev.localscores().to_vec();

        ev.alter_network(&[(1, 2)], &[(2, 0)]).unwrap();
        ev.restore_network().unwrap();

        assert_eq!(ev.network(), &net_before);
        assert_eq!(ev.localscores(), &locals_before[..]);
        assert_eq!(ev.score_network().unwrap(), score_before);
    }

    #[test]
    fn restore_twice_is_a_noop() {
        let mut ev = evaluator();
        ev.alter_network(&[(1, 0)], &[]).unwrap();
        let score = ev.alter_network(&[(2, 0)], &[]).unwrap();
        let undone = ev.restore_network().unwrap();
        assert!(!close(score, undone));
        assert_eq!(ev.restore_network().unwrap(), undone);
        assert_eq!(ev.restore_network().unwrap(), undone);
    }

    #[test]
    fn add_and_remove_of_same_edge_cancel() {
        let mut ev = evaluator();
        let base = ev.alter_network(&[(1, 0)], &[]).unwrap();
        // (1,0) appears in both lists: removal runs first, the add puts it back
        let score = ev.alter_network(&[(1, 0)], &[(1, 0)]).unwrap();
        assert!(close(score, base));
        assert!(ev.network().contains_edge((1, 0)));
    }

    #[test]
    fn set_network_reduces_to_symmetric_difference() {
        let mut ev = evaluator();
        ev.alter_network(&[(1, 0), (2, 0), (3, 0)], &[]).unwrap();
        ev.alter_network(&[(1, 2)], &[]).unwrap();

        let target = Network::from_edge_string(4, "1,0;2,0;3,0").unwrap();
        assert!(close(ev.set_network(&target).unwrap(), -15.461087517));
        assert_eq!(ev.network(), &target);
    }

    #[test]
    fn clear_network_scores_empty() {
        let mut ev = evaluator();
        ev.alter_network(&[(1, 0), (2, 0), (3, 0)], &[]).unwrap();
        assert!(close(ev.clear_network().unwrap(), -15.6842310683));
        assert_eq!(ev.network().num_edges(), 0);
    }

    #[test]
    fn randomize_network_is_acyclic_and_scored() {
        let mut ev = evaluator();
        let mut rng = SmallRng::seed_from_u64(17);
        let mut checker = CycleChecker::new(4);
        for _ in 0..20 {
            let score = ev.randomize_network(&mut rng).unwrap();
            assert!(score.is_finite());
            assert!(checker.is_acyclic(ev.network()));
        }
    }

    #[test]
    fn evaluator_refuses_missing_data() {
        let text = "a,discrete(2)\tb,discrete(2)\n0\t1\nX\t0\n";
        let data = Arc::new(DataTable::parse(text).unwrap().finish().unwrap());
        let err = NetworkEvaluator::from_dataset(data, Prior::null()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
    }

    #[test]
    fn build_evaluator_selects_by_missingness() {
        let complete = data10();
        let ev = build_evaluator(
            complete,
            Network::new(4),
            Prior::null(),
            &SamplerConfig::default(),
        )
        .unwrap();
        assert_eq!(ev.network().num_nodes(), 4);

        let text = "a,discrete(2)\tb,discrete(2)\n0\t1\nX\t0\n";
        let data = Arc::new(DataTable::parse(text).unwrap().finish().unwrap());
        let mut ev = build_evaluator(
            data,
            Network::new(2),
            Prior::null(),
            &SamplerConfig {
                stopping: StoppingCriteria::iterations(4),
                ..SamplerConfig::default()
            },
        )
        .unwrap();
        assert!(ev.score_network().unwrap().is_finite());
    }

    #[test]
    fn intervened_sample_does_not_inform_family() {
        // sample 1 has variable 0 forced; dropping that sample entirely
        // must give the same local score for node 0
        let obs = Matrix::from_rows(vec![
            vec![0, 1],
            vec![1, 0],
            vec![1, 1],
            vec![0, 0],
        ])
        .unwrap();
        let mut interventions = Matrix::filled(4, 2, false);
        interventions.set(1, 0, true);
        let with_intervention = Arc::new(
            Dataset::with_parts(
                obs,
                Matrix::filled(4, 2, false),
                interventions,
                vec![Variable::discrete("a", 2), Variable::discrete("b", 2)],
                (0..4).map(|s| Sample::new(s.to_string())).collect(),
            )
            .unwrap(),
        );

        let dropped = Arc::new(Dataset::new(
            Matrix::from_rows(vec![vec![0, 1], vec![1, 1], vec![0, 0]]).unwrap(),
        ));

        let a = family_score(DataView::from_dataset(&with_intervention), 0, &[1]);
        let b = family_score(DataView::from_dataset(&dropped), 0, &[1]);
        assert_eq!(a, b);
    }

    #[test]
    fn prior_gates_full_network_score() {
        let prior = Prior::null().with_prohibited(vec![(3, 0)]);
        let mut ev = NetworkEvaluator::new(data10(), Network::new(4), prior).unwrap();
        let score = ev.alter_network(&[(3, 0)], &[]).unwrap();
        assert_eq!(score, f64::NEG_INFINITY);
        let score = ev.restore_network().unwrap();
        assert!(score.is_nan() || score.is_finite());
    }
}
