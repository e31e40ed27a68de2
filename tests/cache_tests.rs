//! Exact and pruned polynomial caches driven through a mock calculator.


use mock_calc::{circ, outcomes, MockCalc};
use termeval_core::circuit::{Circuit, Label};
use termeval_core::comm::LocalContext;
use termeval_core::config::{CachePolicy, FailurePolicy, PruningConfig};
use termeval_core::error::Error;
use termeval_tree::EvalTree;

fn sample_circuits() -> Vec<(Circuit, Vec<Label>)> {
    vec![
        (circ(&["rho0"]), outcomes(2)),
        (circ(&["rho0", "Gx"]), outcomes(3)),
        (circ(&["rho0", "Gx", "Gy"]), outcomes(2)),
        (circ(&["rho1", "Gy", "Gy", "Gx"]), outcomes(1)),
    ]
}

fn pruning(max_paths: usize) -> PruningConfig {
    PruningConfig {
        max_paths,
        pathmagnitude_gap: 0.05,
        ..PruningConfig::default()
    }
}

#[test]
fn test_exact_buffer_has_one_poly_per_element() {
    let mut tree = EvalTree::from_circuits(sample_circuits()).unwrap();
    let calc = MockCalc::new();
    tree.cache_p_polys(&calc, None).unwrap();

    let merged = tree.merged_polys().unwrap();
    assert_eq!(merged.num_polys(), tree.num_final_els());
    assert_eq!(merged.num_polys(), 8);
    // One vtape terminator per element.
    let terminators = merged.vtape().iter().filter(|&&v| v <= -2).count();
    assert_eq!(terminators, tree.num_final_els());
    assert_eq!(calc.exact_calls.get(), 4);

    let (v, _) = merged.poly(2).unwrap();
    assert_eq!(v, &MockCalc::expected_for(&circ(&["rho0", "Gx"]), 0).vtape[..]);
}

#[test]
fn test_exact_cache_skips_calculator_on_second_pass() {
    let mut tree = EvalTree::from_circuits(sample_circuits()).unwrap();
    let calc = MockCalc::new();
    let ctx = LocalContext::new();
    tree.cache_p_polys(&calc, Some(&ctx)).unwrap();
    let first = tree.merged_polys().cloned();
    tree.cache_p_polys(&calc, Some(&ctx)).unwrap();
    assert_eq!(calc.exact_calls.get(), 4);
    assert_eq!(tree.merged_polys().cloned(), first);

    tree.clear_caches();
    assert!(tree.merged_polys().is_none());
    tree.cache_p_polys(&calc, None).unwrap();
    assert_eq!(calc.exact_calls.get(), 8);
}

#[test]
fn test_pruned_buffer_shape_matches_exact() {
    let mut tree = EvalTree::from_circuits(sample_circuits()).unwrap();
    let report = tree
        .cache_p_pruned_polys(&MockCalc::new(), None, &pruning(100), CachePolicy::default())
        .unwrap();
    assert_eq!(report.num_failed, 0);
    assert!(!report.aborted);
    assert_eq!(report.num_circuits, 4);
    assert_eq!(tree.merged_polys().unwrap().num_polys(), tree.num_final_els());
    // 2 * (ops + 1) paths per circuit, all kept.
    assert_eq!(report.total_paths, 2 + 4 + 6 + 8);
}

#[test]
fn test_pruning_is_monotone_in_path_budget() {
    let calc = MockCalc::new();
    let mut last = 0.0;
    for max_paths in 1..=8 {
        let mut tree = EvalTree::from_circuits(sample_circuits()).unwrap();
        let report = tree
            .cache_p_pruned_polys(&calc, None, &pruning(max_paths), CachePolicy::default())
            .unwrap();
        assert!(
            report.total_achieved_sopm >= last,
            "achieved sopm dropped at max_paths={max_paths}"
        );
        last = report.total_achieved_sopm;

        for (c, _) in sample_circuits() {
            let entry = tree.cached_polys(&c).unwrap();
            assert!(entry.threshold.is_some());
        }
    }
}

#[test]
fn test_soft_failures_are_counted_not_raised() {
    let mut tree = EvalTree::from_circuits(sample_circuits()).unwrap();
    let report = tree
        .cache_p_pruned_polys(&MockCalc::new(), None, &pruning(2), CachePolicy::default())
        .unwrap();
    // Only the prep-only circuit fits in two paths.
    assert_eq!(report.num_failed, 3);
    assert_eq!(report.failed.len(), 3);
    assert!(report.failed.iter().all(|f| f.achieved_sopm < f.target_sopm));
    assert!(tree.merged_polys().is_some());
}

#[test]
fn test_stop_on_first_failure_aborts_pass() {
    let mut tree = EvalTree::from_circuits(sample_circuits()).unwrap();
    let calc = MockCalc::new();
    let policy = CachePolicy {
        failure_policy: FailurePolicy::StopOnFirstFailure,
        ..CachePolicy::default()
    };
    let report = tree.cache_p_pruned_polys(&calc, None, &pruning(2), policy).unwrap();
    assert!(report.aborted);
    assert_eq!(report.num_failed, 1);
    assert_eq!(report.failed[0].circuit, circ(&["rho0", "Gx"]));
    assert_eq!(calc.pruned_calls.get(), 2);
    assert!(tree.merged_polys().is_none());
}

#[test]
fn test_reuse_flag_skips_recompute() {
    let mut tree = EvalTree::from_circuits(sample_circuits()).unwrap();
    let calc = MockCalc::new();
    tree.cache_p_pruned_polys(&calc, None, &pruning(3), CachePolicy::default())
        .unwrap();
    assert_eq!(calc.pruned_calls.get(), 4);

    let reuse = CachePolicy {
        reuse_cached_thresholds: true,
        ..CachePolicy::default()
    };
    let report = tree.cache_p_pruned_polys(&calc, None, &pruning(50), reuse).unwrap();
    assert_eq!(calc.pruned_calls.get(), 4);
    assert_eq!(report.total_paths, 0);
    assert_eq!(report.num_failed, 0);
    assert!(!tree.op_cache().is_empty());

    let report = tree
        .cache_p_pruned_polys(&calc, None, &pruning(50), CachePolicy::default())
        .unwrap();
    assert_eq!(calc.pruned_calls.get(), 8);
    assert_eq!(report.num_failed, 0);
}

#[test]
fn test_sopm_sweep_reports_stale_circuits() {
    let mut tree = EvalTree::from_circuits(sample_circuits()).unwrap();
    let calc = MockCalc::new();

    let sweep = tree.num_circuit_sopm_failures(&calc, 0.05).unwrap();
    assert_eq!(sweep.tested, 0);
    assert_eq!(sweep.failed_circuits, 0);

    tree.cache_p_pruned_polys(&calc, None, &pruning(2), CachePolicy::default())
        .unwrap();
    let sweep = tree.num_circuit_sopm_failures(&calc, 0.05).unwrap();
    assert_eq!(sweep.tested, 4);
    assert_eq!(sweep.failed_circuits, 3);
    // 3 + 2 + 1 outcome labels on the failing circuits
    assert_eq!(sweep.failed_elements, 6);
    assert!(!sweep.failing.contains(&circ(&["rho0"])));

    // Exact entries carry no threshold and are not tested.
    let mut exact = EvalTree::from_circuits(sample_circuits()).unwrap();
    exact.cache_p_polys(&calc, None).unwrap();
    assert_eq!(exact.num_circuit_sopm_failures(&calc, 0.05).unwrap().tested, 0);
}

#[test]
fn test_calculator_errors_propagate() {
    let mut tree = EvalTree::from_circuits(sample_circuits()).unwrap();
    let err = tree
        .cache_p_pruned_polys(&MockCalc::new(), None, &pruning(0), CachePolicy::default())
        .unwrap_err();
    assert!(matches!(err, Error::Calculator(_)));
    assert!(tree.merged_polys().is_none());
}

#[test]
fn test_exact_pass_recomputes_pruned_entries() {
    let mut tree = EvalTree::from_circuits(sample_circuits()).unwrap();
    let calc = MockCalc::new();
    tree.cache_p_pruned_polys(&calc, None, &pruning(1), CachePolicy::default())
        .unwrap();
    assert_eq!(calc.exact_calls.get(), 0);

    tree.cache_p_polys(&calc, None).unwrap();
    assert_eq!(calc.exact_calls.get(), 4);

    let merged = tree.merged_polys().unwrap();
    let mut e = 0;
    for (c, labels) in sample_circuits() {
        assert!(tree.cached_polys(&c).unwrap().threshold.is_none());
        for o in 0..labels.len() {
            let expected = MockCalc::expected_for(&c, o);
            let (v, ct) = merged.poly(e).unwrap();
            assert_eq!(v, &expected.vtape[..], "{c} outcome {o}");
            assert_eq!(ct, &expected.ctape[..]);
            e += 1;
        }
    }
}

#[test]
fn test_failed_pass_leaves_no_merged_buffer() {
    let mut tree = EvalTree::from_circuits(sample_circuits()).unwrap();
    let calc = MockCalc::new();
    tree.cache_p_pruned_polys(&calc, None, &pruning(100), CachePolicy::default())
        .unwrap();
    assert!(tree.merged_polys().is_some());

    let err = tree
        .cache_p_pruned_polys(&calc, None, &pruning(0), CachePolicy::default())
        .unwrap_err();
    assert!(matches!(err, Error::Calculator(_)));
    assert!(tree.merged_polys().is_none());

    // Same after an exact pass.
    tree.cache_p_polys(&calc, None).unwrap();
    assert!(tree.merged_polys().is_some());
    let bad_gap = PruningConfig {
        pathmagnitude_gap: -1.0,
        ..pruning(10)
    };
    assert!(tree
        .cache_p_pruned_polys(&calc, None, &bad_gap, CachePolicy::default())
        .is_err());
    assert!(tree.merged_polys().is_none());
}
