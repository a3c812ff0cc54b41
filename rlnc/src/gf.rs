//! GF(2^q) arithmetic, 1 <= q <= 8.
//!
//! Elements for q < 8 are densely bit-packed into byte arrays (q bits per
//! element, element `i` occupying bits `[i*q, i*q+q)` counting from bit 0
//! of byte 0, low-to-high across byte boundaries). For q = 8 an element is
//! simply one byte, which is the common case and gets a SIMD fast path.

use std::sync::OnceLock;

/// Primitive polynomial low-order bits (degree < q) for each field size,
/// indexed by `q - 1`. The full modulus used during table construction is
/// `(1 << q) | PRIMITIVE_LOW[q - 1]`. q = 8 uses 0x1d, the same modulus
/// (0x11d) used throughout the Reed-Solomon / erasure-coding ecosystem.
const PRIMITIVE_LOW: [u32; 8] = [0x1, 0x3, 0x3, 0x3, 0x5, 0x3, 0x3, 0x1d];

struct GfTables {
    exp: Vec<u8>,
    log: Vec<u8>,
}

fn build_tables(q: u32) -> GfTables {
    let size = 1usize << q;
    let poly = (1u32 << q) | PRIMITIVE_LOW[(q - 1) as usize];
    let mut exp = vec![0u8; size];
    let mut log = vec![0u8; size];
    let mut x: u32 = 1;
    for i in 0..size - 1 {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & size as u32 != 0 {
            x ^= poly;
        }
    }
    exp[size - 1] = exp[0];
    GfTables { exp, log }
}

static TABLES: OnceLock<[GfTables; 8]> = OnceLock::new();

fn tables(q: u8) -> &'static GfTables {
    debug_assert!((1..=8).contains(&q), "gfpower out of range: {q}");
    let all = TABLES.get_or_init(|| std::array::from_fn(|i| build_tables((i + 1) as u32)));
    &all[(q - 1) as usize]
}

/// Reports which multiply-add-region backend is active, for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Avx2,
    Neon,
    Scalar,
}

pub fn detected_backend() -> Backend {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if std::is_x86_feature_detected!("avx2") {
            return Backend::Avx2;
        }
    }
    #[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
    {
        return Backend::Neon;
    }
    Backend::Scalar
}

/// a + b over GF(2^q) (q irrelevant: field addition is always XOR).
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// a * b over GF(2^q).
pub fn mul(a: u8, b: u8, q: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = tables(q);
    let m = (1usize << q) - 1;
    t.exp[(t.log[a as usize] as usize + t.log[b as usize] as usize) % m]
}

/// a / b over GF(2^q). `b == 0` is a precondition violation, not a
/// recoverable error: dividing by zero can only happen from a caller bug
/// (an un-pivoted zero column reaching division), so this asserts.
pub fn div(a: u8, b: u8, q: u8) -> u8 {
    assert!(b != 0, "division by zero in GF(2^{q})");
    if a == 0 {
        return 0;
    }
    let t = tables(q);
    let m = (1usize << q) - 1;
    t.exp[(t.log[a as usize] as usize + m - t.log[b as usize] as usize) % m]
}

/// Multiplicative inverse of `a` over GF(2^q). `a == 0` is a precondition
/// violation.
pub fn inverse(a: u8, q: u8) -> u8 {
    assert!(a != 0, "zero has no inverse in GF(2^{q})");
    let t = tables(q);
    let m = (1usize << q) - 1;
    t.exp[m - t.log[a as usize] as usize]
}

/// Number of bytes needed to pack `n` elements of `q` bits each.
#[inline]
pub fn packed_len(n: usize, q: u8) -> usize {
    (n * q as usize + 7) / 8
}

/// Number of whole `q`-bit elements that fit a region of `nbytes` bytes
/// (`floor(nbytes*8/q)`). Used to combine raw payload bytes as a
/// sequence of GF(2^q) symbols for q < 8. Must be `floor`, not `ceil`:
/// the payload buffer is exactly `nbytes` bytes, and a `ceil`'d count
/// addresses a final element whose bits spill past the last byte,
/// reading/writing out of bounds. `packed_len(floor(nbytes*8/q), q) <=
/// nbytes` always holds, so every element this returns is fully inside
/// the buffer.
#[inline]
pub fn elements_per_region(nbytes: usize, q: u8) -> usize {
    (nbytes * 8) / q as usize
}

/// Read the `i`-th packed element (0-indexed) from `buf`.
#[inline]
pub fn read_element(buf: &[u8], q: u8, i: usize) -> u8 {
    if q == 8 {
        return buf[i];
    }
    let start = i * q as usize;
    let mut val: u16 = 0;
    for b in 0..q as usize {
        let bit_pos = start + b;
        let bit = (buf[bit_pos / 8] >> (bit_pos % 8)) & 1;
        val |= (bit as u16) << b;
    }
    val as u8
}

/// Write `value` (only the low `q` bits are meaningful) as the `i`-th
/// packed element in `buf`.
#[inline]
pub fn write_element(buf: &mut [u8], q: u8, i: usize, value: u8) {
    if q == 8 {
        buf[i] = value;
        return;
    }
    let start = i * q as usize;
    for b in 0..q as usize {
        let bit_pos = start + b;
        let mask = 1u8 << (bit_pos % 8);
        if (value >> b) & 1 != 0 {
            buf[bit_pos / 8] |= mask;
        } else {
            buf[bit_pos / 8] &= !mask;
        }
    }
}

/// `dst[0..n] ^= scalar * src[0..n]`, elementwise over GF(2^q), where `dst`
/// and `src` are byte arrays packing `n` q-bit elements each
/// (`packed_len(n, q)` bytes). Mirrors the fast-path structure of
/// `galois2n_multiply_add_region`: a no-op when the scalar is zero, a
/// plain XOR of the whole region when the scalar is one (valid regardless
/// of `q`, since XOR is bitwise and commutes with any fixed bit-packing),
/// and a packed elementwise multiply-add otherwise.
pub fn mul_add_region(dst: &mut [u8], src: &[u8], scalar: u8, q: u8, n: usize) {
    if scalar == 0 {
        return;
    }
    let nbytes = packed_len(n, q);
    if scalar == 1 {
        for i in 0..nbytes {
            dst[i] ^= src[i];
        }
        return;
    }
    if q == 8 {
        mul_add_region_bytes(&mut dst[..n], &src[..n], scalar);
        return;
    }
    for i in 0..n {
        let d = read_element(dst, q, i);
        let s = read_element(src, q, i);
        let new = add(d, mul(s, scalar, q));
        write_element(dst, q, i, new);
    }
}

/// `dst ^= scalar * src` for byte-per-element (q = 8) regions, with a SIMD
/// fast path mirroring `GaloisField::multiply_vector_scalar`'s dispatch,
/// adapted to accumulate via XOR instead of overwriting.
fn mul_add_region_bytes(dst: &mut [u8], src: &[u8], scalar: u8) {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    unsafe {
        if std::is_x86_feature_detected!("avx2") {
            return mul_add_region_avx2(dst, src, scalar);
        }
    }
    #[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
    unsafe {
        return mul_add_region_neon(dst, src, scalar);
    }
    #[allow(unreachable_code)]
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= mul(*s, scalar, 8);
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "avx2")]
unsafe fn mul_add_region_avx2(dst: &mut [u8], src: &[u8], scalar: u8) {
    use std::arch::x86_64::*;
    let len = dst.len();
    let mut i = 0;
    while i + 32 <= len {
        let mut buf = [0u8; 32];
        for j in 0..32 {
            buf[j] = mul(src[i + j], scalar, 8);
        }
        let a = _mm256_loadu_si256(buf.as_ptr() as *const __m256i);
        let b = _mm256_loadu_si256(dst.as_ptr().add(i) as *const __m256i);
        let r = _mm256_xor_si256(a, b);
        _mm256_storeu_si256(dst.as_mut_ptr().add(i) as *mut __m256i, r);
        i += 32;
    }
    for j in i..len {
        dst[j] ^= mul(src[j], scalar, 8);
    }
}

#[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
unsafe fn mul_add_region_neon(dst: &mut [u8], src: &[u8], scalar: u8) {
    use std::arch::aarch64::*;
    let len = dst.len();
    let mut i = 0;
    while i + 16 <= len {
        let mut buf = [0u8; 16];
        for j in 0..16 {
            buf[j] = mul(src[i + j], scalar, 8);
        }
        let a = vld1q_u8(buf.as_ptr());
        let b = vld1q_u8(dst.as_ptr().add(i));
        let r = veorq_u8(a, b);
        vst1q_u8(dst.as_mut_ptr().add(i), r);
        i += 16;
    }
    for j in i..len {
        dst[j] ^= mul(src[j], scalar, 8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gf8_mul_inverse_roundtrip() {
        for a in 1u8..=255 {
            let inv = inverse(a, 8);
            assert_eq!(mul(a, inv, 8), 1, "a={a} inv={inv}");
        }
    }

    #[test]
    fn gf8_div_is_mul_inverse() {
        for a in 1u8..=255 {
            for b in 1u8..=255 {
                assert_eq!(div(a, b, 8), mul(a, inverse(b, 8), 8));
            }
        }
    }

    #[test]
    fn elements_per_region_never_overflows_the_byte_region() {
        // size_p=200, q=3: 1600 bits / 3 does not divide evenly, so a
        // `ceil` count would address a final element spilling past byte
        // 200 (the spec-named boundary case).
        for size_p in [1usize, 37, 200, 1400] {
            for q in 1u8..=8 {
                let n = elements_per_region(size_p, q);
                assert!(
                    packed_len(n, q) <= size_p,
                    "size_p={size_p} q={q} n={n} packed_len={}",
                    packed_len(n, q)
                );
            }
        }
        assert_eq!(elements_per_region(200, 3), 533);
    }

    #[test]
    fn mul_add_region_on_a_partial_element_boundary_stays_in_bounds() {
        let size_p = 200usize;
        let q = 3u8;
        let n = elements_per_region(size_p, q);
        let mut dst = vec![0u8; size_p];
        let src = vec![0x7fu8; size_p];
        mul_add_region(&mut dst, &src, 5, q, n);
    }

    #[test]
    fn bit_pack_roundtrip_all_q() {
        for q in 1u8..=8 {
            let n = 37usize;
            let mut buf = vec![0u8; packed_len(n, q)];
            let mask = if q == 8 { 0xff } else { (1u16 << q) as u8 - 1 };
            for i in 0..n {
                let v = ((i as u32).wrapping_mul(2654435761) as u8) & mask;
                write_element(&mut buf, q, i, v);
            }
            for i in 0..n {
                let v = ((i as u32).wrapping_mul(2654435761) as u8) & mask;
                assert_eq!(read_element(&buf, q, i), v, "q={q} i={i}");
            }
        }
    }

    #[test]
    fn mul_add_region_scalar_one_is_xor() {
        let q = 4u8;
        let n = 10usize;
        let mut dst = vec![0xABu8; packed_len(n, q)];
        let src = vec![0x3Cu8; packed_len(n, q)];
        let before = dst.clone();
        mul_add_region(&mut dst, &src, 1, q, n);
        for (d, (b, s)) in dst.iter().zip(before.iter().zip(src.iter())) {
            assert_eq!(*d, b ^ s);
        }
    }

    #[test]
    fn mul_add_region_scalar_zero_is_noop() {
        let q = 5u8;
        let n = 9usize;
        let mut dst = vec![0x11u8; packed_len(n, q)];
        let src = vec![0x22u8; packed_len(n, q)];
        let before = dst.clone();
        mul_add_region(&mut dst, &src, 0, q, n);
        assert_eq!(dst, before);
    }

    #[test]
    fn mul_add_region_matches_elementwise_q8() {
        let q = 8u8;
        let n = 64usize;
        let mut dst: Vec<u8> = (0..n as u8).collect();
        let src: Vec<u8> = (0..n as u8).map(|x| x.wrapping_mul(7)).collect();
        let scalar = 0x53;
        let expected: Vec<u8> = dst
            .iter()
            .zip(src.iter())
            .map(|(d, s)| d ^ mul(*s, scalar, q))
            .collect();
        mul_add_region(&mut dst, &src, scalar, q, n);
        assert_eq!(dst, expected);
    }

    #[test]
    fn mul_add_region_matches_elementwise_q3() {
        let q = 3u8;
        let n = 20usize;
        let mask = (1u16 << q) as u8 - 1;
        let mut dst = vec![0u8; packed_len(n, q)];
        let mut src = vec![0u8; packed_len(n, q)];
        for i in 0..n {
            write_element(&mut dst, q, i, (i as u8 * 3) & mask);
            write_element(&mut src, q, i, (i as u8 * 5 + 1) & mask);
        }
        let scalar = 5u8;
        let expected: Vec<u8> = (0..n)
            .map(|i| add(read_element(&dst, q, i), mul(read_element(&src, q, i), scalar, q)))
            .collect();
        mul_add_region(&mut dst, &src, scalar, q, n);
        for i in 0..n {
            assert_eq!(read_element(&dst, q, i), expected[i], "i={i}");
        }
    }
}
