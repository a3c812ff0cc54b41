//! End-to-end scenarios, fixed seed 12345 throughout.

use rlnc::{
    create_bats_buffer, create_buffer, create_decoder, create_encoder, CodeType, DecoderKind,
    Packet, Params, Schedule,
};

const SEED: u64 = 12345;

fn band(snum_hint_datasize: usize, size_p: usize, size_g: usize, size_b: usize, q: u8, sys: bool) -> Params {
    Params {
        datasize: snum_hint_datasize,
        size_p,
        size_b,
        size_g,
        size_c: 0,
        bpc: false,
        gfpower: q,
        sys,
        code_type: CodeType::Band,
        seed: SEED,
    }
    .validate()
    .unwrap()
}

#[test]
fn scenario_1_band_cbd_decodes_within_35_packets() {
    let p = band(32 * 200, 200, 16, 16, 8, false);
    assert_eq!(p.snum(), 32);
    let data: Vec<u8> = (0..p.datasize as u32).map(|i| (i * 13 % 251) as u8).collect();
    let mut enc = create_encoder(&data, p).unwrap();
    let mut dec = create_decoder(p, DecoderKind::Cbd).unwrap();

    let mut sent = 0usize;
    while !dec.finished() {
        dec.process_packet(enc.generate_packet()).unwrap();
        sent += 1;
        assert!(sent <= 35, "did not converge within the packet budget");
    }
    assert_eq!(dec.recover_data().unwrap(), data);
}

#[test]
fn scenario_2_binary_systematic_prefix_then_coded() {
    let p = band(16 * 40, 40, 16, 16, 1, true);
    let data: Vec<u8> = (0..p.datasize as u32).map(|i| (i % 2) as u8).collect();
    let mut enc = create_encoder(&data, p).unwrap();

    let mut packets = Vec::new();
    for _ in 0..17 {
        packets.push(enc.generate_packet());
    }
    for (i, pkt) in packets.iter().take(16).enumerate() {
        assert!(pkt.is_systematic());
        assert_eq!(pkt.ucid, i as i32);
    }
    assert!(!packets[16].is_systematic());
}

#[test]
fn scenario_3_three_hop_mlpi_chain_at_low_loss() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let p = band(32 * 150, 150, 32, 32, 8, false);
    let data: Vec<u8> = (0..p.datasize as u32).map(|i| (i * 7 % 241) as u8).collect();
    let mut enc = create_encoder(&data, p).unwrap();
    let mut hop1 = create_buffer(p, 8);
    let mut hop2 = create_buffer(p, 8);
    let mut dec = create_decoder(p, DecoderKind::Cbd).unwrap();
    let mut loss_rng = StdRng::seed_from_u64(SEED);

    let drop_1pct = |rng: &mut StdRng| rng.gen_range(0..100) == 0;

    let budget = p.numpp() * 4;
    for _ in 0..budget {
        if dec.finished() {
            break;
        }
        let pkt = enc.generate_packet();
        if drop_1pct(&mut loss_rng) {
            continue;
        }
        hop1.buffer_packet(pkt);
        let Some(pkt) = hop1.recode_packet(Schedule::Mlpi) else {
            continue;
        };
        if drop_1pct(&mut loss_rng) {
            continue;
        }
        hop2.buffer_packet(pkt);
        let Some(pkt) = hop2.recode_packet(Schedule::Mlpi) else {
            continue;
        };
        if drop_1pct(&mut loss_rng) {
            continue;
        }
        dec.process_packet(pkt).unwrap();
    }

    assert!(dec.finished(), "decoder must finish under 1% per-hop loss");
    assert_eq!(dec.recover_data().unwrap(), data);
    assert!(dec.overhead() <= 1.5, "overhead {} exceeded budget", dec.overhead());
}

#[test]
fn scenario_4_precode_recovers_an_unreachable_source() {
    let p = Params {
        datasize: 24 * 80,
        size_p: 80,
        size_b: 4,
        size_g: 8,
        size_c: 4,
        bpc: true,
        gfpower: 8,
        sys: false,
        code_type: CodeType::Band,
        seed: SEED,
    }
    .validate()
    .unwrap();
    let data: Vec<u8> = (0..p.datasize as u32).map(|i| (i * 3 % 199) as u8).collect();
    let mut enc = create_encoder(&data, p).unwrap();
    let mut dec = create_decoder(p, DecoderKind::Gg).unwrap();

    for _ in 0..p.numpp() * 3 {
        if dec.finished() {
            break;
        }
        dec.process_packet(enc.generate_packet()).unwrap();
    }

    assert!(dec.finished());
    assert!(dec.dof() >= p.snum());
    assert_eq!(dec.recover_data().unwrap(), data);
}

#[test]
fn scenario_5_bats_sending_batch_advances_on_eviction() {
    let p = Params {
        datasize: 1000 * 50,
        size_p: 50,
        size_b: 1000,
        size_g: 160,
        size_c: 0,
        bpc: false,
        gfpower: 8,
        sys: false,
        code_type: CodeType::Bats,
        seed: SEED,
    }
    .validate()
    .unwrap();

    let mut buf = create_bats_buffer(p, 10);
    let mkpkt = |gid: i32| Packet {
        gid,
        ucid: -1,
        coes: vec![0u8; rlnc::gf::packed_len(p.size_g, p.gfpower)],
        syms: vec![1u8; p.size_p],
    };

    for _ in 0..9 {
        buf.buffer_packet(mkpkt(0));
    }
    // One more batch-0 packet straddles the ring with a batch-1 packet,
    // forcing eviction of the oldest batch-0 slot on the next insert.
    buf.buffer_packet(mkpkt(0));
    buf.buffer_packet(mkpkt(1));

    let before = buf.recode_packet();
    assert!(before.is_some());
    assert_eq!(before.unwrap().gid, 0);

    for _ in 0..20 {
        buf.buffer_packet(mkpkt(1));
    }
    let mut saw_batch_1 = false;
    for _ in 0..2000 {
        match buf.recode_packet() {
            Some(pkt) if pkt.gid == 1 => {
                saw_batch_1 = true;
                break;
            }
            Some(_) => continue,
            None => break,
        }
    }
    assert!(saw_batch_1, "sending batch never advanced past the evicted batch");
}

#[test]
fn scenario_6_packet_roundtrips_byte_equal_across_gf_sizes() {
    for &q in &[1u8, 3, 8] {
        let size_g = 8usize;
        let size_p = 37usize;
        let coes = vec![0xABu8 & ((1u16 << q) - 1) as u8; rlnc::gf::packed_len(size_g, q)];
        let syms: Vec<u8> = (0..size_p as u32).map(|i| (i % 256) as u8).collect();
        let pkt = Packet {
            gid: 3,
            ucid: -1,
            coes,
            syms,
        };
        let bytes = pkt.serialize();
        let back = Packet::deserialize(&bytes, size_g, size_p, q).unwrap();
        assert_eq!(pkt, back);
    }
}
