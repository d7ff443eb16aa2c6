use cthyb_core::{SolverError, C64};
use cthyb_driver::sample::collapse_replicates;
use cthyb_driver::{DistributedSample, ProcessGroup, ReplicaGroup, SingleProcess};
use ndarray::{ArrayD, IxDyn};
use proptest::prelude::*;

fn filled(shape: &[usize], value: C64) -> ArrayD<C64> {
    ArrayD::from_elem(IxDyn(shape), value)
}

fn is_zero(array: &ArrayD<C64>) -> bool {
    array.iter().all(|value| *value == C64::new(0.0, 0.0))
}

#[test]
fn single_process_has_zero_error() {
    let local = filled(&[2, 3], C64::new(1.5, -0.5));
    let sample = DistributedSample::new(local.clone(), &SingleProcess);
    assert_eq!(sample.ntotal(), 1);
    assert_eq!(sample.mean().unwrap(), local);
    assert!(is_zero(&sample.stderr().unwrap()));
}

proptest! {
    #[test]
    fn identical_peers_average_to_the_value(
        re in -10.0f64..10.0,
        im in -10.0f64..10.0,
        size in 2usize..9,
        rank in 0usize..8,
    ) {
        let value = C64::new(re, im);
        let group = ReplicaGroup::mirrored(rank.min(size - 1), size);
        let sample = DistributedSample::new(filled(&[3], value), &group);
        let estimate = sample.estimate().unwrap();
        prop_assert!(estimate.mean.iter().all(|mean| (mean - value).norm() < 1e-9));
        prop_assert!(estimate.error.iter().all(|error| error.norm() < 1e-9));
    }
}

#[test]
fn spread_peers_give_the_standard_error() {
    let peers = vec![filled(&[1], C64::new(3.0, 10.0))];
    let group = ReplicaGroup::with_peers(0, peers);
    assert_eq!(group.size(), 2);
    let sample = DistributedSample::new(filled(&[1], C64::new(1.0, 10.0)), &group);

    let mean = sample.mean().unwrap();
    assert_eq!(mean[[0]], C64::new(2.0, 10.0));
    // Sample standard deviation sqrt(2) over sqrt(2) processes.
    let error = sample.stderr().unwrap();
    assert!((error[[0]].re - 1.0).abs() < 1e-12);
    assert_eq!(error[[0]].im, 0.0);
}

#[test]
fn peers_are_ordered_by_rank() {
    let peers = vec![filled(&[1], C64::new(0.0, 0.0)), filled(&[1], C64::new(2.0, 0.0))];
    let group = ReplicaGroup::with_peers(1, peers);
    let gathered = group.all_gather(&filled(&[1], C64::new(1.0, 0.0))).unwrap();
    let order: Vec<f64> = gathered.iter().map(|array| array[[0]].re).collect();
    assert_eq!(order, vec![0.0, 1.0, 2.0]);
}

#[test]
fn mismatched_peer_shapes_are_rejected() {
    let group = ReplicaGroup::with_peers(0, vec![filled(&[2], C64::new(0.0, 0.0))]);
    let sample = DistributedSample::new(filled(&[3], C64::new(0.0, 0.0)), &group);
    assert!(matches!(sample.mean(), Err(SolverError::Consistency(_))));
}

#[test]
fn replicates_are_averaged_before_aggregation() {
    let replicates = ArrayD::from_shape_vec(
        IxDyn(&[2, 2]),
        vec![
            C64::new(1.0, 0.0),
            C64::new(2.0, 0.0),
            C64::new(3.0, 0.0),
            C64::new(4.0, 0.0),
        ],
    )
    .unwrap();
    let sample = DistributedSample::from_replicates(&replicates, &SingleProcess).unwrap();
    assert_eq!(sample.local().shape(), &[2]);
    assert_eq!(sample.local()[[0]], C64::new(2.0, 0.0));

    let doubled = sample.apply(|local| local.mapv(|value| value * 2.0));
    assert_eq!(doubled.mean().unwrap()[[1]], C64::new(6.0, 0.0));

    let empty = ArrayD::<C64>::zeros(IxDyn(&[0, 2]));
    assert!(matches!(
        collapse_replicates(&empty),
        Err(SolverError::Engine(_))
    ));
}
