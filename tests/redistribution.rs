//! Integration tests for the redistribution engine
//!
//! Tests verify value preservation through every legal distribution pair,
//! replication consistency, alignment independence, the documented 2x2-grid
//! ownership pattern, root gather/scatter, and the view and error paths.

mod common;

use std::sync::Arc;

use common::{check_local, entry, fill, on_grid, reference_column_major};
use gridmat::dist::{Dist, DistDesc};
use gridmat::error::Error;
use gridmat::matrix::DistMatrix;

const PAIRS: [(Dist, Dist); 14] = [
    (Dist::GridRow, Dist::GridCol),
    (Dist::GridCol, Dist::GridRow),
    (Dist::GridRow, Dist::Repl),
    (Dist::Repl, Dist::GridRow),
    (Dist::GridCol, Dist::Repl),
    (Dist::Repl, Dist::GridCol),
    (Dist::Diag, Dist::Repl),
    (Dist::Repl, Dist::Diag),
    (Dist::VecCm, Dist::Repl),
    (Dist::Repl, Dist::VecCm),
    (Dist::VecRm, Dist::Repl),
    (Dist::Repl, Dist::VecRm),
    (Dist::Repl, Dist::Repl),
    (Dist::Single, Dist::Single),
];

#[test]
fn test_round_trip_through_every_pair() {
    for (p, r, c) in [(4, 2, 2), (6, 2, 3)] {
        for (h, w) in [(4, 4), (5, 3)] {
            on_grid(p, r, c, |grid| {
                let mut a = DistMatrix::<f64>::with_size(
                    Arc::clone(&grid),
                    h,
                    w,
                    Dist::GridRow,
                    Dist::GridCol,
                )
                .unwrap();
                fill(&mut a);
                for (col, row) in PAIRS {
                    let b = a.redistribute(col, row).unwrap();
                    assert_eq!((b.height(), b.width()), (h, w));
                    check_local(&b);
                    let back = b.redistribute(Dist::GridRow, Dist::GridCol).unwrap();
                    check_local(&back);
                }
            });
        }
    }
}

#[test]
fn test_every_pair_to_every_pair() {
    // The full conversion graph on a small matrix, including the multi-hop
    // routes between vector, grid, and diagonal kinds.
    on_grid(4, 2, 2, |grid| {
        for (sc, sr) in PAIRS {
            let mut a =
                DistMatrix::<f64>::with_size(Arc::clone(&grid), 4, 3, sc, sr).unwrap();
            fill(&mut a);
            for (dc, dr) in PAIRS {
                let b = a.redistribute(dc, dr).unwrap();
                check_local(&b);
            }
        }
    });
}

#[test]
fn test_replicas_are_identical_everywhere() {
    on_grid(6, 2, 3, |grid| {
        let mut a =
            DistMatrix::<f64>::with_size(Arc::clone(&grid), 5, 4, Dist::VecCm, Dist::Repl)
                .unwrap();
        fill(&mut a);
        let b = a.redistribute(Dist::Repl, Dist::Repl).unwrap();
        assert_eq!(b.local_buffer(), reference_column_major(5, 4).as_slice());
        // Bit-for-bit agreement across the whole grid.
        let copies = grid.all_comm().all_gather(b.local_buffer());
        for copy in &copies {
            assert_eq!(copy.as_slice(), b.local_buffer());
        }
    });
}

#[test]
fn test_alignment_independence() {
    on_grid(4, 2, 2, |grid| {
        let src_desc = DistDesc::with_aligns(Dist::GridRow, Dist::GridCol, 1, 0, &grid).unwrap();
        let mut a = DistMatrix::<f64>::with_desc(Arc::clone(&grid), src_desc).unwrap();
        a.resize(6, 6).unwrap();
        fill(&mut a);
        // Misaligned source into a caller-aligned destination, and back.
        let dst_desc = DistDesc::with_aligns(Dist::GridRow, Dist::GridCol, 0, 1, &grid).unwrap();
        let mut b = DistMatrix::<f64>::with_desc(Arc::clone(&grid), dst_desc).unwrap();
        b.redist_from(&a).unwrap();
        assert_eq!(b.desc().col_align, 0);
        assert_eq!(b.desc().row_align, 1);
        check_local(&b);
        // An unconstrained destination adopts the source placement and the
        // conversion degenerates into a local copy.
        let mut c = DistMatrix::<f64>::new(Arc::clone(&grid), Dist::GridRow, Dist::GridCol)
            .unwrap();
        c.redist_from(&a).unwrap();
        assert_eq!(c.desc().col_align, 1);
        check_local(&c);
    });
}

#[test]
fn test_two_by_two_grid_ownership_pattern() {
    // The canonical example: a 4x4 matrix over a 2x2 grid with the grid-row /
    // grid-column pair. Process (r, c) holds entries (i, j) with i = r mod 2
    // and j = c mod 2 at local position (i / 2, j / 2).
    on_grid(4, 2, 2, |grid| {
        let mut a =
            DistMatrix::<f64>::with_size(Arc::clone(&grid), 4, 4, Dist::GridRow, Dist::GridCol)
                .unwrap();
        fill(&mut a);
        assert_eq!((a.local_height(), a.local_width()), (2, 2));
        let (r, c) = (grid.row(), grid.col());
        for lj in 0..2 {
            for li in 0..2 {
                let (i, j) = (r + 2 * li, c + 2 * lj);
                assert_eq!(a.get_local(li, lj), entry(i, j, 4));
            }
        }
    });
}

#[test]
fn test_gather_to_root_and_scatter_back() {
    on_grid(6, 2, 3, |grid| {
        let mut a =
            DistMatrix::<f64>::with_size(Arc::clone(&grid), 5, 3, Dist::GridRow, Dist::GridCol)
                .unwrap();
        fill(&mut a);
        let rooted = a.redistribute(Dist::Single, Dist::Single).unwrap();
        if grid.vc_rank() == rooted.desc().root {
            assert_eq!((rooted.local_height(), rooted.local_width()), (5, 3));
            assert_eq!(
                rooted.local_buffer(),
                reference_column_major(5, 3).as_slice()
            );
        } else {
            assert_eq!(rooted.local_height() * rooted.local_width(), 0);
        }
        let spread = rooted.redistribute(Dist::VecCm, Dist::Repl).unwrap();
        check_local(&spread);
    });
}

#[test]
fn test_diagonal_round_trip() {
    on_grid(4, 2, 2, |grid| {
        let mut a =
            DistMatrix::<f64>::with_size(Arc::clone(&grid), 6, 4, Dist::GridRow, Dist::GridCol)
                .unwrap();
        fill(&mut a);
        let d = a.redistribute(Dist::Diag, Dist::Repl).unwrap();
        check_local(&d);
        // Off-diagonal processes hold nothing under a diagonal axis.
        if grid.diag_rank().is_none() {
            assert_eq!(d.local_height(), 0);
        }
        let back = d.redistribute(Dist::GridRow, Dist::GridCol).unwrap();
        check_local(&back);
    });
}

#[test]
fn test_transpose_pair_on_square_and_rectangular_grids() {
    for (p, r, c) in [(4, 2, 2), (6, 2, 3)] {
        on_grid(p, r, c, |grid| {
            let mut a = DistMatrix::<f64>::with_size(
                Arc::clone(&grid),
                5,
                5,
                Dist::GridRow,
                Dist::GridCol,
            )
            .unwrap();
            fill(&mut a);
            let t = a.redistribute(Dist::GridCol, Dist::GridRow).unwrap();
            check_local(&t);
            let back = t.redistribute(Dist::GridRow, Dist::GridCol).unwrap();
            check_local(&back);
        });
    }
}

#[test]
fn test_misaligned_vector_coarsens_correctly() {
    on_grid(6, 2, 3, |grid| {
        let desc = DistDesc::with_aligns(Dist::VecCm, Dist::Repl, 3, 0, &grid).unwrap();
        let mut a = DistMatrix::<f64>::with_desc(Arc::clone(&grid), desc).unwrap();
        a.resize(7, 4).unwrap();
        fill(&mut a);
        let b = a.redistribute(Dist::GridRow, Dist::GridCol).unwrap();
        // Vector alignment 3 reduces to 1 modulo the two grid rows.
        assert_eq!(b.desc().col_align, 1);
        check_local(&b);
    });
}

#[test]
fn test_attached_view_as_destination() {
    on_grid(4, 2, 2, |grid| {
        let mut a =
            DistMatrix::<f64>::with_size(Arc::clone(&grid), 4, 4, Dist::GridRow, Dist::GridCol)
                .unwrap();
        fill(&mut a);
        let desc = DistDesc::new(Dist::Repl, Dist::Repl).unwrap();
        let mut view =
            DistMatrix::attach(Arc::clone(&grid), desc, 4, 4, vec![0.0; 16], 4).unwrap();
        view.redist_from(&a).unwrap();
        let buffer = view.detach();
        assert_eq!(buffer, reference_column_major(4, 4));
    });
}

#[test]
fn test_locked_view_rejects_redistribution() {
    on_grid(4, 2, 2, |grid| {
        let mut a =
            DistMatrix::<f64>::with_size(Arc::clone(&grid), 4, 4, Dist::GridRow, Dist::GridCol)
                .unwrap();
        fill(&mut a);
        let desc = DistDesc::new(Dist::Repl, Dist::Repl).unwrap();
        let mut view =
            DistMatrix::locked_attach(Arc::clone(&grid), desc, 4, 4, vec![0.0; 16], 4).unwrap();
        assert!(matches!(view.redist_from(&a), Err(Error::LockedView)));
    });
}

#[test]
fn test_padded_attached_view_keeps_its_ldim() {
    // A buffer attached with ldim 5 for a 4-row local block stays laid out
    // at the caller's leading dimension through a redistribution.
    on_grid(1, 1, 1, |grid| {
        let mut a =
            DistMatrix::<f64>::with_size(Arc::clone(&grid), 4, 4, Dist::GridRow, Dist::GridCol)
                .unwrap();
        fill(&mut a);
        let desc = DistDesc::new(Dist::Repl, Dist::Repl).unwrap();
        let mut view =
            DistMatrix::attach(Arc::clone(&grid), desc, 4, 4, vec![0.0; 20], 5).unwrap();
        view.redist_from(&a).unwrap();
        assert_eq!(view.ldim(), 5);
        let buf = view.detach();
        for j in 0..4 {
            for i in 0..4 {
                assert_eq!(buf[i + j * 5], entry(i, j, 4));
            }
        }
    });
    // Same contract when the padded view is distributed.
    on_grid(4, 2, 2, |grid| {
        let mut a =
            DistMatrix::<f64>::with_size(Arc::clone(&grid), 4, 4, Dist::Repl, Dist::Repl).unwrap();
        fill(&mut a);
        let desc = DistDesc::new(Dist::GridRow, Dist::GridCol).unwrap();
        let mut view =
            DistMatrix::attach(Arc::clone(&grid), desc, 4, 4, vec![0.0; 6], 3).unwrap();
        view.redist_from(&a).unwrap();
        assert_eq!(view.ldim(), 3);
        check_local(&view);
        let (cm, rm) = (view.col_map(), view.row_map());
        let buf = view.detach();
        for lj in 0..2 {
            for li in 0..2 {
                let (Some(i), Some(j)) = (cm.global_index(li), rm.global_index(lj)) else {
                    continue;
                };
                assert_eq!(buf[li + lj * 3], entry(i, j, 4));
            }
        }
    });
}

#[test]
fn test_view_with_wrong_extents_is_rejected() {
    on_grid(4, 2, 2, |grid| {
        let mut a =
            DistMatrix::<f64>::with_size(Arc::clone(&grid), 4, 4, Dist::GridRow, Dist::GridCol)
                .unwrap();
        fill(&mut a);
        let desc = DistDesc::new(Dist::Repl, Dist::Repl).unwrap();
        let mut view =
            DistMatrix::attach(Arc::clone(&grid), desc, 3, 3, vec![0.0; 9], 3).unwrap();
        assert!(matches!(
            view.redist_from(&a),
            Err(Error::DimensionMismatch { .. })
        ));
    });
}

#[test]
fn test_row_all_gather_moves_only_peer_blocks() {
    on_grid(4, 2, 2, |grid| {
        let mut a =
            DistMatrix::<f64>::with_size(Arc::clone(&grid), 4, 4, Dist::GridRow, Dist::Repl)
                .unwrap();
        fill(&mut a);
        let comm = grid.all_comm();

        let base = comm.sent_bytes();
        let b = a.redistribute(Dist::GridRow, Dist::GridCol).unwrap();
        assert_eq!(
            comm.sent_bytes(),
            base,
            "narrowing a replicated axis is a local selection"
        );

        let c = b.redistribute(Dist::GridRow, Dist::Repl).unwrap();
        let moved = (comm.sent_bytes() - base) as usize / std::mem::size_of::<f64>();
        // Each process holds half of its 2x4 target slab and needs the
        // other half from its row peer: 4 elements, nothing more.
        assert_eq!(moved, 4);
        check_local(&c);
    });
}

#[test]
fn test_random_data_survives_a_redistribution_chain() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    // The same seed on every rank produces the same global matrix, so a
    // fully replicated start needs no broadcast.
    let (h, w) = (7, 5);
    on_grid(6, 2, 3, |grid| {
        let mut rng = StdRng::seed_from_u64(0x67726d74);
        let data: Vec<f64> = (0..h * w).map(|_| rng.random()).collect();

        let mut a =
            DistMatrix::<f64>::with_size(Arc::clone(&grid), h, w, Dist::Repl, Dist::Repl).unwrap();
        for j in 0..w {
            for i in 0..h {
                a.set_local(i, j, data[i + j * h]).unwrap();
            }
        }

        let chain = [
            (Dist::VecCm, Dist::Repl),
            (Dist::GridRow, Dist::GridCol),
            (Dist::Repl, Dist::Diag),
            (Dist::Single, Dist::Single),
            (Dist::Repl, Dist::Repl),
        ];
        let mut m = a;
        for (col, row) in chain {
            m = m.redistribute(col, row).unwrap();
        }
        for j in 0..w {
            for i in 0..h {
                assert_eq!(m.get_local(i, j), data[i + j * h]);
            }
        }
    });
}

#[test]
fn test_empty_matrix_redistributes() {
    on_grid(4, 2, 2, |grid| {
        let a = DistMatrix::<f64>::with_size(Arc::clone(&grid), 0, 5, Dist::GridRow, Dist::Repl)
            .unwrap();
        let b = a.redistribute(Dist::VecCm, Dist::Repl).unwrap();
        assert_eq!((b.height(), b.width()), (0, 5));
        assert_eq!(b.local_height(), 0);
    });
}
