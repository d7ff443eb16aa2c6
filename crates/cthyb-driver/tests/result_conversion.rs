use std::cell::RefCell;

use cthyb_core::{FourierTransform, GfStruct, Mesh, SolverError, C64};
use cthyb_driver::compound::flavours_to_index;
use cthyb_driver::convert::{
    component_result, diagonal_collapse, diagonal_fill, g4_to_block2gf, known_moments,
    pair_average_bins, tau_result, tau_to_block_gf, tau_to_iw,
};
use cthyb_driver::Estimate;
use ndarray::{Array3, ArrayD, ArrayView3, IxDyn};
use proptest::prelude::*;

fn encoded(shape: &[usize]) -> ArrayD<C64> {
    let mut counter = 0.0;
    ArrayD::from_shape_simple_fn(IxDyn(shape), || {
        counter += 1.0;
        C64::new(counter, -counter)
    })
}

proptest! {
    #[test]
    fn diagonal_fill_then_collapse_is_identity(
        n_orb in 1usize..4,
        bins in 1usize..6,
    ) {
        let diagonal = encoded(&[n_orb, 2, bins]);
        let full = diagonal_fill(&diagonal).unwrap();
        prop_assert_eq!(full.shape(), &[n_orb, 2, n_orb, 2, bins][..]);
        prop_assert_eq!(diagonal_collapse(&full).unwrap(), diagonal);
    }
}

#[test]
fn diagonal_fill_leaves_off_diagonal_entries_zero() {
    let full = diagonal_fill(&encoded(&[2, 2, 3])).unwrap();
    let zero = C64::new(0.0, 0.0);
    assert_eq!(full[[0, 0, 1, 0, 2]], zero);
    assert_eq!(full[[1, 1, 1, 0, 0]], zero);
    assert_ne!(full[[1, 1, 1, 1, 0]], zero);
    assert!(diagonal_collapse(&encoded(&[2, 2, 3, 2, 1])).is_err());
    assert!(diagonal_fill(&encoded(&[4])).is_err());
}

#[test]
fn engine_bins_are_averaged_pairwise() {
    let binned = ArrayD::from_shape_vec(
        IxDyn(&[1, 4]),
        vec![
            C64::new(1.0, 0.0),
            C64::new(3.0, 0.0),
            C64::new(5.0, 2.0),
            C64::new(7.0, 4.0),
        ],
    )
    .unwrap();
    let averaged = pair_average_bins(binned);
    assert_eq!(averaged.shape(), &[1, 2]);
    assert_eq!(averaged[[0, 0]], C64::new(2.0, 0.0));
    assert_eq!(averaged[[0, 1]], C64::new(6.0, 3.0));
}

#[test]
fn tau_data_is_split_over_spin_major_blocks() {
    let structure = GfStruct::new(vec![("up", 2), ("down", 2)]);
    let mesh = Mesh::fermionic_tau(4.0, 3);
    let full = encoded(&[2, 2, 2, 2, 3]);

    let gf = tau_to_block_gf(&full, &structure, mesh).unwrap();
    let down = gf.block("down").unwrap();
    // Row 1 of `down` is flavour 3 = (orbital 1, spin 1); column 0 is flavour 2 = (orbital 0, spin 1).
    assert_eq!(down[[2, 1, 0]], full[[1, 1, 0, 1, 2]]);
    let up = gf.block("up").unwrap();
    assert_eq!(up[[0, 0, 1]], full[[0, 0, 1, 0, 0]]);

    let wrong = GfStruct::new(vec![("up", 3)]);
    assert!(matches!(
        tau_to_block_gf(&full, &wrong, mesh),
        Err(SolverError::Consistency(_))
    ));
    assert!(tau_to_block_gf(&full, &structure, Mesh::fermionic_tau(4.0, 5)).is_err());
}

#[test]
fn tau_result_carries_error_blocks() {
    let structure = GfStruct::new(vec![("up", 1), ("down", 1)]);
    let mesh = Mesh::fermionic_tau(4.0, 2);
    let estimate = Estimate {
        mean: encoded(&[1, 2, 1, 2, 2]),
        error: ArrayD::from_elem(IxDyn(&[1, 2, 1, 2, 2]), C64::new(0.5, 0.0)),
    };
    let result = tau_result(&estimate, &structure, mesh).unwrap();
    assert!(result.g_iw.is_none());
    assert_eq!(result.g_tau_error.block("down").unwrap()[[1, 0, 0]], C64::new(0.5, 0.0));
}

#[derive(Default)]
struct RecordingTransform {
    moments: RefCell<Vec<Array3<C64>>>,
}

impl FourierTransform for RecordingTransform {
    fn tau_to_iw(
        &self,
        g_tau: ArrayView3<'_, C64>,
        _tau_mesh: &Mesh,
        iw_mesh: &Mesh,
        known_moments: ArrayView3<'_, C64>,
    ) -> Result<Array3<C64>, SolverError> {
        self.moments.borrow_mut().push(known_moments.to_owned());
        let size = g_tau.shape()[1];
        Ok(Array3::from_elem((iw_mesh.len(), size, size), C64::new(0.0, -1.0)))
    }
}

#[test]
fn fourier_transform_receives_unit_first_moment() {
    let structure = GfStruct::new(vec![("up", 2), ("down", 2)]);
    let full = encoded(&[2, 2, 2, 2, 3]);
    let g_tau = tau_to_block_gf(&full, &structure, Mesh::fermionic_tau(4.0, 3)).unwrap();
    let transform = RecordingTransform::default();

    let g_iw = tau_to_iw(&g_tau, Mesh::fermionic_iw(4.0, 5), &transform).unwrap();
    assert_eq!(g_iw.block("up").unwrap().dim(), (10, 2, 2));
    let recorded = transform.moments.borrow();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0], known_moments(2));
    assert_eq!(recorded[0][[1, 1, 1]], C64::new(1.0, 0.0));
    assert_eq!(recorded[0][[0, 1, 1]], C64::new(0.0, 0.0));
}

#[test]
fn two_particle_components_land_in_block_pairs() {
    let n_orb = 1;
    let structure = GfStruct::new(vec![("up", 1), ("down", 1)]);
    let fmesh = Mesh::fermionic_iw(4.0, 1);
    let bmesh = Mesh::bosonic_iw(4.0, 1);
    let within = flavours_to_index(n_orb, &[0, 0, 1, 1]).unwrap();
    let straddling = flavours_to_index(n_orb, &[0, 1, 0, 1]).unwrap();
    let make = |component| {
        let estimate = Estimate {
            mean: encoded(&[2, 2, 1]),
            error: ArrayD::from_elem(IxDyn(&[2, 2, 1]), C64::new(0.1, 0.0)),
        };
        component_result(component, vec![fmesh, fmesh, bmesh], estimate).unwrap()
    };
    let components = vec![make(within), make(straddling)];

    let (mean, error) =
        g4_to_block2gf(&components, n_orb, &structure, [bmesh, fmesh, fmesh]).unwrap();
    let up_down = mean.get("up", "down").unwrap();
    assert_eq!(up_down.shape(), &[1, 2, 2, 1, 1, 1, 1]);
    assert_eq!(
        up_down[&[0usize, 1, 0, 0, 0, 0, 0][..]],
        components[0].mean.data[&[1usize, 0, 0][..]]
    );
    assert_eq!(
        error.get("up", "down").unwrap()[&[0usize, 0, 1, 0, 0, 0, 0][..]],
        C64::new(0.1, 0.0)
    );
    let untouched = mean.get("down", "up").unwrap();
    assert!(untouched.iter().all(|value| *value == C64::new(0.0, 0.0)));
}

#[test]
fn component_meshes_must_match_data() {
    let estimate = Estimate {
        mean: encoded(&[3]),
        error: encoded(&[3]),
    };
    let result = component_result(1, vec![Mesh::bosonic_iw(2.0, 3)], estimate);
    assert!(matches!(result, Err(SolverError::Consistency(_))));
}
