use anyhow::Result;
use steelflume::{map_fn, DeferredOp, Error, Graph, TypeTag};

#[test]
fn builder_wires_symmetric_edges() -> Result<()> {
    let mut g = Graph::new();
    let ty = TypeTag::of::<i64>();
    let a = g.input(ty);
    let b = g.parallel_do(a, map_fn(|v: &i64| v + 1), ty)?;

    let p = g.producer(b).unwrap();
    assert_eq!(g.consumers(a), &[p]);
    assert_eq!(g.op(p).origins(), vec![a]);
    assert_eq!(g.op(p).dests(), vec![b]);
    assert!(g.is_materialized(a));
    assert!(!g.is_materialized(b));
    assert_eq!(g.element_type(b), ty);
    Ok(())
}

#[test]
fn second_producer_is_rejected() -> Result<()> {
    let mut g = Graph::new();
    let ty = TypeTag::of::<i64>();
    let a = g.input(ty);
    let b = g.parallel_do(a, map_fn(|v: &i64| v + 1), ty)?;
    let c = g.parallel_do(a, map_fn(|v: &i64| v * 2), ty)?;

    let p_c = g.producer(c).unwrap();
    let err = g.set_producer(b, p_c).unwrap_err();
    assert!(matches!(err, Error::GraphInvariant { collection, .. } if collection == b));
    Ok(())
}

#[test]
fn duplicate_consumer_is_rejected() -> Result<()> {
    let mut g = Graph::new();
    let ty = TypeTag::of::<i64>();
    let a = g.input(ty);
    let b = g.parallel_do(a, map_fn(|v: &i64| v + 1), ty)?;

    let p = g.producer(b).unwrap();
    let err = g.add_consumer(a, p).unwrap_err();
    assert!(matches!(err, Error::GraphInvariant { collection, .. } if collection == a));
    Ok(())
}

#[test]
fn removing_absent_consumer_is_rejected() -> Result<()> {
    let mut g = Graph::new();
    let ty = TypeTag::of::<i64>();
    let a = g.input(ty);
    let b = g.parallel_do(a, map_fn(|v: &i64| v + 1), ty)?;

    let p = g.producer(b).unwrap();
    let err = g.remove_consumer(b, p).unwrap_err();
    assert!(matches!(err, Error::GraphInvariant { collection, .. } if collection == b));
    Ok(())
}

#[test]
fn replace_origin_updates_both_endpoints() -> Result<()> {
    let mut g = Graph::new();
    let ty = TypeTag::of::<i64>();
    let a = g.input(ty);
    let a2 = g.input(ty);
    let b = g.parallel_do(a, map_fn(|v: &i64| v + 1), ty)?;

    let p = g.producer(b).unwrap();
    g.replace_origin(p, a, a2)?;
    assert!(g.consumers(a).is_empty());
    assert_eq!(g.consumers(a2), &[p]);
    assert_eq!(g.op(p).origins(), vec![a2]);
    Ok(())
}

#[test]
fn replace_dest_updates_both_endpoints() -> Result<()> {
    let mut g = Graph::new();
    let ty = TypeTag::of::<i64>();
    let a = g.input(ty);
    let b = g.parallel_do(a, map_fn(|v: &i64| v + 1), ty)?;
    let b2 = g.collection(ty);

    let p = g.producer(b).unwrap();
    g.replace_dest(p, b, b2)?;
    assert!(g.producer(b).is_none());
    assert_eq!(g.producer(b2), Some(p));
    assert_eq!(g.op(p).dests(), vec![b2]);
    Ok(())
}

#[test]
fn flatten_requires_uniform_element_type() {
    let mut g = Graph::new();
    let a = g.input(TypeTag::of::<i64>());
    let b = g.input(TypeTag::of::<String>());

    let err = g.flatten(&[a, b]).unwrap_err();
    assert!(matches!(err, Error::GraphInvariant { collection, .. } if collection == b));
}

#[test]
fn flatten_requires_at_least_one_origin() {
    let mut g = Graph::new();
    let err = g.flatten(&[]).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn one_to_one_preserves_element_type() -> Result<()> {
    let mut g = Graph::new();
    let ty = TypeTag::of::<String>();
    let a = g.input(ty);
    let b = g.one_to_one(a)?;

    assert_eq!(g.element_type(b), ty);
    let p = g.producer(b).unwrap();
    assert!(matches!(g.op(p), DeferredOp::OneToOneOp { .. }));
    Ok(())
}
