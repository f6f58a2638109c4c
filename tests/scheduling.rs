use anyhow::Result;
use steelflume::testing::{assert_multiset_equal, pack, unpack};
use steelflume::{combine_per_key_fn, map_fn, pair_grouper, Graph, Interpreter, Optimizer, TypeTag};

#[test]
fn dependent_mscrs_schedule_into_ordered_stages() -> Result<()> {
    let mut g = Graph::new();
    let pair_ty = TypeTag::of::<(String, i64)>();
    let grouped_ty = TypeTag::of::<(String, Vec<i64>)>();
    let x = g.input(pair_ty);
    let s1 = g.group_by_key(x, pair_grouper::<String, i64>(), grouped_ty)?;
    // re-key each group by its total, then shuffle again
    let y = g.parallel_do(
        s1,
        map_fn(|kv: &(String, Vec<i64>)| {
            (kv.1.iter().sum::<i64>().to_string(), kv.1.len() as i64)
        }),
        pair_ty,
    )?;
    let s2 = g.group_by_key(y, pair_grouper::<String, i64>(), grouped_ty)?;
    let z = g.parallel_do(
        s2,
        map_fn(|kv: &(String, Vec<i64>)| kv.1.iter().sum::<i64>()),
        TypeTag::of::<i64>(),
    )?;

    let mut opt = Optimizer::new();
    let plan = opt.optimize(&mut g, &[x], &[z])?;
    assert_eq!(opt.stats().mscr_count, 2);
    assert_eq!(plan.len(), 2);

    let stage0 = &plan;
    assert_eq!(stage0.mscr_steps.len(), 1);
    assert!(stage0.mscr_steps[0].has_input(x));

    let stage1 = stage0.next_step.as_deref().unwrap();
    assert_eq!(stage1.mscr_steps.len(), 1);
    assert!(stage1.next_step.is_none());

    // the stage-1 unit consumes a boundary collection stage 0 produces
    let produced: Vec<_> = stage0.mscr_steps[0]
        .output_channels
        .keys()
        .copied()
        .collect();
    assert!(produced.iter().any(|&c| stage1.mscr_steps[0].has_input(c)));
    Ok(())
}

#[test]
fn independent_mscrs_share_one_stage() -> Result<()> {
    let mut g = Graph::new();
    let pair_ty = TypeTag::of::<(String, i64)>();
    let grouped_ty = TypeTag::of::<(String, Vec<i64>)>();
    let a = g.input(pair_ty);
    let b = g.input(pair_ty);
    let ga = g.group_by_key(a, pair_grouper::<String, i64>(), grouped_ty)?;
    let gb = g.group_by_key(b, pair_grouper::<String, i64>(), grouped_ty)?;
    let out_a = g.parallel_do(
        ga,
        map_fn(|kv: &(String, Vec<i64>)| kv.1.len() as i64),
        TypeTag::of::<i64>(),
    )?;
    let out_b = g.parallel_do(
        gb,
        map_fn(|kv: &(String, Vec<i64>)| kv.1.len() as i64),
        TypeTag::of::<i64>(),
    )?;

    let mut opt = Optimizer::new();
    let plan = opt.optimize(&mut g, &[a, b], &[out_a, out_b])?;
    assert_eq!(opt.stats().mscr_count, 2);
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.mscr_steps.len(), 2);
    assert!(plan.next_step.is_none());
    Ok(())
}

#[test]
fn shuffles_sharing_a_source_form_one_mscr() -> Result<()> {
    let mut g = Graph::new();
    let pair_ty = TypeTag::of::<(String, i64)>();
    let grouped_ty = TypeTag::of::<(String, Vec<i64>)>();
    let a = g.input(pair_ty);
    // two shuffles over mapper chains rooted at the same source
    let left = g.parallel_do(a, map_fn(|kv: &(String, i64)| (kv.0.clone(), kv.1 + 1)), pair_ty)?;
    let right = g.parallel_do(a, map_fn(|kv: &(String, i64)| (kv.0.clone(), kv.1 * 2)), pair_ty)?;
    let gl = g.group_by_key(left, pair_grouper::<String, i64>(), grouped_ty)?;
    let gr = g.group_by_key(right, pair_grouper::<String, i64>(), grouped_ty)?;
    let out_l = g.parallel_do(
        gl,
        map_fn(|kv: &(String, Vec<i64>)| kv.1.len() as i64),
        TypeTag::of::<i64>(),
    )?;
    let out_r = g.parallel_do(
        gr,
        map_fn(|kv: &(String, Vec<i64>)| kv.1.len() as i64),
        TypeTag::of::<i64>(),
    )?;

    let mut opt = Optimizer::new();
    let plan = opt.optimize(&mut g, &[a], &[out_l, out_r])?;
    assert_eq!(opt.stats().mscr_count, 1);
    assert_eq!(plan.len(), 1);
    let mscr = &plan.mscr_steps[0];
    assert_eq!(mscr.group_by_keys.len(), 2);
    assert!(mscr.has_input(a));
    assert!(mscr.output_channels.contains_key(&out_l));
    assert!(mscr.output_channels.contains_key(&out_r));
    Ok(())
}

#[test]
fn grouped_result_with_fan_out_keeps_every_channel() -> Result<()> {
    let mut g = Graph::new();
    let pair_ty = TypeTag::of::<(String, i64)>();
    let grouped_ty = TypeTag::of::<(String, Vec<i64>)>();
    let a = g.input(pair_ty);
    let d0 = g.group_by_key(a, pair_grouper::<String, i64>(), grouped_ty)?;
    // a real reducer output off the grouped result...
    let out1 = g.parallel_do(
        d0,
        map_fn(|kv: &(String, Vec<i64>)| (kv.0.clone(), kv.1.len() as i64)),
        pair_ty,
    )?;
    // ...and a second shuffle chained directly off the same collection
    let s2 = g.group_by_key(
        d0,
        pair_grouper::<String, Vec<i64>>(),
        TypeTag::of::<(String, Vec<Vec<i64>>)>(),
    )?;
    let out2 = g.parallel_do(
        s2,
        map_fn(|kv: &(String, Vec<Vec<i64>>)| kv.1.len() as i64),
        TypeTag::of::<i64>(),
    )?;

    let mut opt = Optimizer::new();
    let plan = opt.optimize(&mut g, &[a], &[out1, out2])?;
    assert_eq!(opt.stats().mscr_count, 2);
    assert_eq!(plan.len(), 2);

    // the first unit records the listed output and the boundary the chained
    // shuffle reads
    let stage0 = &plan.mscr_steps[0];
    assert!(stage0.has_input(a));
    assert!(stage0.output_channels.contains_key(&out1));
    assert!(stage0.output_channels.contains_key(&d0));
    let reducer_channel = &stage0.output_channels[&out1];
    assert_eq!(reducer_channel.reducer, Some(g.producer(out1).unwrap()));

    let stage1 = plan.next_step.as_deref().unwrap();
    assert!(stage1.mscr_steps[0].has_input(d0));
    assert!(stage1.mscr_steps[0].output_channels.contains_key(&out2));

    let mut it = Interpreter::new(&g);
    it.feed(
        a,
        pack(vec![
            ("a".to_string(), 1i64),
            ("a".to_string(), 2),
            ("b".to_string(), 5),
        ]),
    );
    assert_multiset_equal(
        &unpack::<(String, i64)>(&it.evaluate(out1)?),
        &[("a".to_string(), 2), ("b".to_string(), 1)],
    );
    assert_multiset_equal(&unpack::<i64>(&it.evaluate(out2)?), &[1, 1]);
    Ok(())
}

#[test]
fn grouped_result_listed_as_output_keeps_its_channel() -> Result<()> {
    let mut g = Graph::new();
    let pair_ty = TypeTag::of::<(String, i64)>();
    let grouped_ty = TypeTag::of::<(String, Vec<i64>)>();
    let a = g.input(pair_ty);
    let d0 = g.group_by_key(a, pair_grouper::<String, i64>(), grouped_ty)?;
    let combined = g.combine_values(
        d0,
        combine_per_key_fn(|_k: &String, vs: &[i64]| vs.iter().sum::<i64>()),
        pair_ty,
    )?;

    // the caller wants the raw grouped result as well as the combined one
    let mut opt = Optimizer::new();
    let plan = opt.optimize(&mut g, &[a], &[d0, combined])?;
    assert_eq!(plan.len(), 1);
    let mscr = &plan.mscr_steps[0];
    assert!(mscr.output_channels.contains_key(&d0));
    assert!(mscr.output_channels.contains_key(&combined));

    // the raw channel has no combiner on its path; the combined one does
    let raw = &mscr.output_channels[&d0];
    assert_eq!(raw.combiner, None);
    assert_eq!(raw.reducer, None);
    let reduced = &mscr.output_channels[&combined];
    assert_eq!(reduced.combiner, Some(g.producer(combined).unwrap()));

    let mut it = Interpreter::new(&g);
    it.feed(
        a,
        pack(vec![
            ("a".to_string(), 1i64),
            ("a".to_string(), 2),
            ("b".to_string(), 5),
        ]),
    );
    assert_multiset_equal(
        &unpack::<(String, Vec<i64>)>(&it.evaluate(d0)?),
        &[("a".to_string(), vec![1, 2]), ("b".to_string(), vec![5])],
    );
    assert_multiset_equal(
        &unpack::<(String, i64)>(&it.evaluate(combined)?),
        &[("a".to_string(), 3), ("b".to_string(), 5)],
    );
    Ok(())
}

#[test]
fn optimize_twice_yields_an_isomorphic_plan() -> Result<()> {
    let mut g = Graph::new();
    let pair_ty = TypeTag::of::<(String, i64)>();
    let grouped_ty = TypeTag::of::<(String, Vec<i64>)>();
    let a = g.input(pair_ty);
    let keyed = g.parallel_do(a, map_fn(|kv: &(String, i64)| (kv.0.clone(), kv.1 + 1)), pair_ty)?;
    let s = g.group_by_key(keyed, pair_grouper::<String, i64>(), grouped_ty)?;
    let out = g.parallel_do(
        s,
        map_fn(|kv: &(String, Vec<i64>)| kv.1.iter().sum::<i64>()),
        TypeTag::of::<i64>(),
    )?;

    let mut first = Optimizer::new();
    let plan1 = first.optimize(&mut g, &[a], &[out])?;

    let mut second = Optimizer::new();
    let plan2 = second.optimize(&mut g, &[a], &[out])?;

    // nothing left to rewrite, and the plan shape is unchanged
    assert_eq!(second.stats().flattens_sunk, 0);
    assert_eq!(second.stats().producer_fusions, 0);
    assert_eq!(second.stats().sibling_fusions, 0);
    assert_eq!(plan2.len(), plan1.len());
    for (s1, s2) in plan1.stages().zip(plan2.stages()) {
        assert_eq!(s1.mscr_steps.len(), s2.mscr_steps.len());
        for (m1, m2) in s1.mscr_steps.iter().zip(s2.mscr_steps.iter()) {
            assert_eq!(m1.inputs, m2.inputs);
            let mut k1: Vec<_> = m1.output_channels.keys().copied().collect();
            let mut k2: Vec<_> = m2.output_channels.keys().copied().collect();
            k1.sort_by_key(|c| c.raw());
            k2.sort_by_key(|c| c.raw());
            assert_eq!(k1, k2);
        }
    }

    let mut it = Interpreter::new(&g);
    it.feed(
        a,
        pack(vec![("k".to_string(), 1i64), ("k".to_string(), 2)]),
    );
    assert_multiset_equal(&unpack::<i64>(&it.evaluate(out)?), &[5]);
    Ok(())
}
