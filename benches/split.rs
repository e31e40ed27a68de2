use criterion::{criterion_group, criterion_main, Criterion};
use termeval_core::circuit::{Circuit, ElIndices, Entry, IndexMap, Label};
use termeval_core::config::{CostBudget, CostMetric};
use termeval_tree::EvalTree;

const OPS: [&str; 3] = ["Gx", "Gy", "Gi"];

/// Every op string up to `depth` labels, each extending its cached parent.
fn make_tree(depth: usize) -> EvalTree {
    let mut circuits: Vec<(Circuit, Vec<Label>)> = Vec::new();
    let mut entries = Vec::new();
    let mut frontier = vec![(Circuit::new(vec![Label::from("rho0")]), None::<usize>)];
    while let Some((c, start)) = frontier.pop() {
        let slot = entries.len();
        let remainder = match start {
            None => c.labels().to_vec(),
            Some(_) => c.labels()[c.len() - 1..].to_vec(),
        };
        let extendable = c.len() <= depth;
        entries.push(Entry {
            start,
            remainder,
            cache_slot: extendable.then_some(slot),
        });
        circuits.push((c.clone(), vec![Label::from("0"), Label::from("1")]));
        if extendable {
            for op in OPS {
                frontier.push((c.extended(&[Label::from(op)]), Some(slot)));
            }
        }
    }
    let order = (0..entries.len()).collect();
    match EvalTree::from_entries(circuits, entries, order) {
        Ok(t) => t,
        Err(e) => panic!("bench tree is malformed: {e}"),
    }
}

fn el_indices(tree: &EvalTree) -> ElIndices {
    let offsets = tree.element_offsets();
    tree.num_outcomes()
        .into_iter()
        .enumerate()
        .map(|(i, n)| (i, IndexMap::Slice(offsets[i]..offsets[i] + n)))
        .collect()
}

fn bench_split(c: &mut Criterion) {
    let base = make_tree(6);
    let el = el_indices(&base);

    c.bench_function("split_by_count", |b| {
        b.iter(|| {
            let mut t = base.copy();
            let _ = t.split(&el, None, Some(16)).unwrap();
        })
    });

    let budget = CostBudget {
        max_cost: base.cost(CostMetric::Applys) / 16.0,
        max_cost_rate: 0.0,
        metric: CostMetric::Applys,
    };
    c.bench_function("split_by_cost", |b| {
        b.iter(|| {
            let mut t = base.copy();
            let _ = t.split_by_cost(&el, budget).unwrap();
        })
    });
}

criterion_group!(splits, bench_split);
criterion_main!(splits);
