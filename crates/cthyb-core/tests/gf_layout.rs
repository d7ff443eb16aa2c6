use cthyb_core::gf::{Block2Gf, BlockGf, GfStruct, Mesh, ScalarGf};
use cthyb_core::C64;
use ndarray::{Array3, ArrayD, IxDyn};

#[test]
fn mesh_lengths_follow_statistics() {
    assert_eq!(Mesh::fermionic_iw(10.0, 30).len(), 60);
    assert_eq!(Mesh::bosonic_iw(10.0, 30).len(), 59);
    assert_eq!(Mesh::fermionic_tau(10.0, 101).len(), 101);
    assert!(Mesh::bosonic_iw(10.0, 0).is_empty());
}

#[test]
fn block_offsets_and_locate() {
    let structure = GfStruct::new(vec![("up", 2), ("down", 2)]);
    assert_eq!(structure.offsets(), vec![0, 2]);
    assert_eq!(structure.total_size(), 4);
    assert_eq!(structure.max_block_size(), 2);
    assert_eq!(structure.locate(3), Some((1, 1)));
    assert_eq!(structure.locate(4), None);
}

#[test]
fn block_gf_checks_shapes() {
    let structure = GfStruct::new(vec![("up", 1), ("down", 1)]);
    let mesh = Mesh::fermionic_tau(5.0, 4);
    let good = vec![Array3::<C64>::zeros((4, 1, 1)), Array3::zeros((4, 1, 1))];
    let gf = BlockGf::from_blocks(mesh, &structure, good).unwrap();
    assert_eq!(gf.len(), 2);
    assert!(gf.block("down").is_some());

    let bad = vec![Array3::<C64>::zeros((3, 1, 1)), Array3::zeros((4, 1, 1))];
    assert!(BlockGf::from_blocks(mesh, &structure, bad).is_err());
}

#[test]
fn deserialized_block_gf_is_shape_checked() {
    let structure = GfStruct::new(vec![("up", 1), ("down", 1)]);
    let gf = BlockGf::zeros(Mesh::fermionic_tau(5.0, 4), &structure);
    let mut value = serde_json::to_value(&gf).unwrap();
    let decoded: BlockGf = serde_json::from_value(value.clone()).unwrap();
    assert_eq!(decoded, gf);

    value["structure"] =
        serde_json::to_value(GfStruct::new(vec![("up", 2), ("down", 2)])).unwrap();
    let err = serde_json::from_value::<BlockGf>(value).unwrap_err();
    assert!(err.to_string().contains("unexpected shape"), "{err}");
}

#[test]
fn block2_gf_allocates_every_pair() {
    let structure = GfStruct::new(vec![("up", 1), ("down", 2)]);
    let meshes = [
        Mesh::bosonic_iw(5.0, 2),
        Mesh::fermionic_iw(5.0, 2),
        Mesh::fermionic_iw(5.0, 2),
    ];
    let g2 = Block2Gf::zeros(meshes, &structure);
    assert_eq!(g2.blocks.len(), 4);
    assert_eq!(g2.get("up", "down").unwrap().shape(), &[3, 4, 4, 1, 1, 2, 2]);
}

#[test]
fn scalar_gf_rejects_wrong_shape() {
    let mut gf = ScalarGf::zeros(vec![Mesh::bosonic_iw(5.0, 3)]);
    assert!(gf.set_data(ArrayD::zeros(IxDyn(&[4]))).is_err());
    assert!(gf.set_data(ArrayD::zeros(IxDyn(&[5]))).is_ok());
}
