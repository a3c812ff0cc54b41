//! Testable properties not already pinned down by a unit test or an
//! end-to-end scenario: P3 (packet linearity), P4 (buffer span
//! preservation), P5 (GF-table init concurrency), P6 (checkpoint
//! fidelity, exercised here against a dense-decoder variant the
//! module-level checkpoint tests don't already cover).

use rlnc::{create_buffer, create_decoder, create_encoder, gf, CodeType, DecoderKind, Params, Schedule};

fn params(seed: u64, code_type: CodeType) -> Params {
    Params {
        datasize: 24 * 64,
        size_p: 64,
        size_b: 6,
        size_g: 12,
        size_c: 0,
        bpc: false,
        gfpower: 8,
        sys: false,
        code_type,
        seed,
    }
    .validate()
    .unwrap()
}

#[test]
fn p3_coded_packet_matches_its_declared_linear_combination() {
    let p = params(1, CodeType::Band);
    let data: Vec<u8> = (0..p.datasize as u32).map(|i| (i * 5 % 211) as u8).collect();
    let mut enc = create_encoder(&data, p).unwrap();

    for _ in 0..20 {
        let pkt = enc.generate_packet();
        let gid = pkt.gid as usize;
        let sg = &enc.plan().gene[gid].pktid;
        let q = enc.params().gfpower;
        let nsym = gf::elements_per_region(p.size_p, q);
        let mut expected = vec![0u8; p.size_p];
        for (idx, &pktid) in sg.iter().enumerate() {
            let c = gf::read_element(&pkt.coes, q, idx);
            gf::mul_add_region(&mut expected, &enc.source_packets()[pktid], c, q, nsym);
        }
        assert_eq!(pkt.syms, expected, "packet for gid {gid} is not the combination its coes describe");
    }
}

#[test]
fn p4_folding_into_a_full_buffer_never_loses_a_dof_a_decoder_needs() {
    // A buffer too small to hold every packet for a subgen forces the
    // Lun2006 accumulator-update rule to fold new packets in rather than
    // append them (SPEC_FULL §4.5). The decoder must still reach every
    // degree of freedom it needs from the folded stream.
    let p = params(2, CodeType::Band);
    let data: Vec<u8> = (0..p.datasize as u32).map(|i| (i * 11 % 229) as u8).collect();
    let mut enc = create_encoder(&data, p).unwrap();
    let mut buf = create_buffer(p, 3);
    let mut dec = create_decoder(p, DecoderKind::Bd).unwrap();

    for _ in 0..p.numpp() * 6 {
        buf.buffer_packet(enc.generate_packet());
    }
    let mut produced = 0usize;
    while !dec.finished() && produced < p.numpp() * 20 {
        let Some(pkt) = buf.recode_packet(Schedule::Rand) else {
            break;
        };
        dec.process_packet(pkt).unwrap();
        produced += 1;
    }
    assert!(dec.finished(), "folded buffer stream must still carry enough independent packets to decode");
    assert_eq!(dec.recover_data().unwrap(), data);
}

#[test]
fn p5_concurrent_gf_table_init_is_consistent() {
    // Every thread hits the lazily-initialized tables (OnceLock) for the
    // first time simultaneously; all must observe the same values, and
    // none may panic or deadlock.
    let results: Vec<(u8, u8, u8, u8)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..32)
            .map(|t| {
                scope.spawn(move || {
                    let q = ((t % 8) + 1) as u8;
                    let a = (t * 7 % 256) as u8;
                    let b = (t * 13 % 256) as u8;
                    (q, a, b, gf::mul(a, b, q))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (q, a, b, concurrent_product) in results {
        assert_eq!(concurrent_product, gf::mul(a, b, q), "GF({q}) table disagreed after concurrent init");
    }
}

#[test]
fn p6_checkpoint_restores_an_oa_decoder_mid_stream() {
    let p = params(3, CodeType::Band);
    let data: Vec<u8> = (0..p.datasize as u32).map(|i| (i * 17 % 239) as u8).collect();
    let mut enc = create_encoder(&data, p).unwrap();
    let mut dec = create_decoder(p, DecoderKind::Oa).unwrap();

    for _ in 0..(p.numpp() / 2) {
        dec.process_packet(enc.generate_packet()).unwrap();
    }
    let checkpoint = dec.save();
    let mut restored = rlnc::restore_decoder(&checkpoint).unwrap();
    assert_eq!(restored.dof(), dec.dof());
    assert_eq!(restored.kind(), dec.kind());

    while !dec.finished() {
        let pkt = enc.generate_packet();
        dec.process_packet(pkt.clone()).unwrap();
        restored.process_packet(pkt).unwrap();
    }
    assert!(restored.finished());
    assert_eq!(restored.recover_data().unwrap(), dec.recover_data().unwrap());
    assert_eq!(restored.recover_data().unwrap(), data);
}
