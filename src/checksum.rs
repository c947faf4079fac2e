//! Frame integrity checksum.
//!
//! ClickHouse checksums every compression frame with CityHash-128 **v1.0.2**
//! exactly as shipped in the server tree; later CityHash revisions changed
//! the mixing constants and are not interchangeable. The unseeded hash
//! delegates to the `cityhash-rs` crate (the same pin the server's other
//! native clients use); the seeded variant, which the crate does not cover,
//! is ported below from the v1.0.2 sources.
//!
//! Wire representation: the hash is a `(u64, u64)` pair written as two
//! little-endian words, first word first. The crate packs that pair into a
//! `u128` with the first word in the high half; [`hash128`] undoes the
//! packing so nothing outside this module needs to know.

use cityhash_rs::cityhash_102_128;

/// CityHash-128 of `bytes`, as the `(first, second)` word pair ClickHouse
/// writes to the wire.
pub fn hash128(bytes: &[u8]) -> (u64, u64) {
    split(cityhash_102_128(bytes))
}

/// CityHash-128 of `bytes` as a single `u128`, first wire word in the high
/// half. Convenient for equality checks in the frame reader.
pub fn hash128_u128(bytes: &[u8]) -> u128 {
    cityhash_102_128(bytes)
}

fn split(h: u128) -> (u64, u64) {
    ((h >> 64) as u64, h as u64)
}

// --- seeded CityHash-128, v1.0.2 ---

const K0: u64 = 0xc3a5_c85c_97cb_3127;
const K1: u64 = 0xb492_b66f_be98_f273;
const K2: u64 = 0x9ae1_6a3b_2f90_404f;
const K3: u64 = 0xc949_d7c7_509e_6557;
const K_MUL: u64 = 0x9ddf_ea08_eb38_2d69;

/// Seeded CityHash-128 of `bytes`, seed and result both as `(first,
/// second)` word pairs.
pub fn hash128_with_seed(bytes: &[u8], seed: (u64, u64)) -> (u64, u64) {
    if bytes.len() < 128 {
        city_murmur(bytes, seed)
    } else {
        city_long(bytes, seed)
    }
}

fn fetch64(s: &[u8]) -> u64 {
    u64::from_le_bytes(s[..8].try_into().unwrap())
}

fn fetch32(s: &[u8]) -> u32 {
    u32::from_le_bytes(s[..4].try_into().unwrap())
}

fn rotate(val: u64, shift: u32) -> u64 {
    if shift == 0 {
        val
    } else {
        (val >> shift) | (val << (64 - shift))
    }
}

fn rotate_by_at_least_1(val: u64, shift: u32) -> u64 {
    (val >> shift) | (val << (64 - shift))
}

fn shift_mix(val: u64) -> u64 {
    val ^ (val >> 47)
}

fn hash_len_16(u: u64, v: u64) -> u64 {
    let mut a = (u ^ v).wrapping_mul(K_MUL);
    a ^= a >> 47;
    let mut b = (v ^ a).wrapping_mul(K_MUL);
    b ^= b >> 47;
    b.wrapping_mul(K_MUL)
}

fn hash_len_0_to_16(s: &[u8]) -> u64 {
    let len = s.len();
    if len > 8 {
        let a = fetch64(s);
        let b = fetch64(&s[len - 8..]);
        hash_len_16(
            a,
            rotate_by_at_least_1(b.wrapping_add(len as u64), len as u32),
        ) ^ b
    } else if len >= 4 {
        let a = fetch32(s) as u64;
        hash_len_16(
            (len as u64).wrapping_add(a << 3),
            fetch32(&s[len - 4..]) as u64,
        )
    } else if len > 0 {
        let a = s[0] as u32;
        let b = s[len >> 1] as u32;
        let c = s[len - 1] as u32;
        let y = a.wrapping_add(b << 8) as u64;
        let z = (len as u32).wrapping_add(c << 2) as u64;
        shift_mix(y.wrapping_mul(K2) ^ z.wrapping_mul(K3)).wrapping_mul(K2)
    } else {
        K2
    }
}

fn weak_hash_len_32_with_seeds(
    w: u64,
    x: u64,
    y: u64,
    z: u64,
    mut a: u64,
    mut b: u64,
) -> (u64, u64) {
    a = a.wrapping_add(w);
    b = rotate(b.wrapping_add(a).wrapping_add(z), 21);
    let c = a;
    a = a.wrapping_add(x);
    a = a.wrapping_add(y);
    b = b.wrapping_add(rotate(a, 44));
    (a.wrapping_add(z), b.wrapping_add(c))
}

fn weak_hash_slice(s: &[u8], a: u64, b: u64) -> (u64, u64) {
    weak_hash_len_32_with_seeds(
        fetch64(s),
        fetch64(&s[8..]),
        fetch64(&s[16..]),
        fetch64(&s[24..]),
        a,
        b,
    )
}

fn city_murmur(s: &[u8], seed: (u64, u64)) -> (u64, u64) {
    let len = s.len();
    let mut a = seed.0;
    let mut b = seed.1;
    let mut c;
    let mut d;

    if len <= 16 {
        c = b.wrapping_mul(K1).wrapping_add(hash_len_0_to_16(s));
        let tail = if len >= 8 { fetch64(s) } else { c };
        d = rotate(b.wrapping_add(tail), 32);
    } else {
        c = hash_len_16(fetch64(&s[len - 8..]).wrapping_add(K1), a);
        d = hash_len_16(
            b.wrapping_add(len as u64),
            c.wrapping_add(fetch64(&s[len - 16..])),
        );
        a = a.wrapping_add(d);
        let mut rest = s;
        loop {
            a ^= shift_mix(fetch64(rest).wrapping_mul(K1)).wrapping_mul(K1);
            a = a.wrapping_mul(K1);
            b ^= a;
            c ^= shift_mix(fetch64(&rest[8..]).wrapping_mul(K1))
                .wrapping_mul(K1);
            c = c.wrapping_mul(K1);
            d ^= c;
            rest = &rest[16..];
            if rest.len() <= 16 {
                break;
            }
        }
    }
    a = hash_len_16(a, c);
    b = hash_len_16(d, b);
    (a ^ b, hash_len_16(b, a))
}

fn city_long(s: &[u8], seed: (u64, u64)) -> (u64, u64) {
    // The tail step below reaches back into bytes the main loop already
    // consumed, so everything indexes the original slice through `pos`
    // rather than re-slicing.
    let mut len = s.len();
    let mut pos = 0usize;
    let mut x = seed.0;
    let mut y = seed.1;
    let mut z = (len as u64).wrapping_mul(K1);
    let mut v = (0u64, 0u64);
    let mut w = (0u64, 0u64);
    v.0 = rotate(y ^ K1, 49).wrapping_mul(K1).wrapping_add(fetch64(s));
    v.1 = rotate(v.0, 42).wrapping_mul(K1).wrapping_add(fetch64(&s[8..]));
    w.0 = rotate(y.wrapping_add(z), 35).wrapping_mul(K1).wrapping_add(x);
    w.1 = rotate(x.wrapping_add(fetch64(&s[88..])), 53).wrapping_mul(K1);

    loop {
        for _ in 0..2 {
            let chunk = &s[pos..];
            x = rotate(
                x.wrapping_add(y)
                    .wrapping_add(v.0)
                    .wrapping_add(fetch64(&chunk[16..])),
                37,
            )
            .wrapping_mul(K1);
            y = rotate(
                y.wrapping_add(v.1).wrapping_add(fetch64(&chunk[48..])),
                42,
            )
            .wrapping_mul(K1);
            x ^= w.1;
            y ^= v.0;
            z = rotate(z ^ w.0, 33);
            v = weak_hash_slice(
                chunk,
                v.1.wrapping_mul(K1),
                x.wrapping_add(w.0),
            );
            w = weak_hash_slice(&chunk[32..], z.wrapping_add(w.1), y);
            std::mem::swap(&mut z, &mut x);
            pos += 64;
        }
        len -= 128;
        if len < 128 {
            break;
        }
    }
    y = y
        .wrapping_add(rotate(w.0, 37).wrapping_mul(K0))
        .wrapping_add(z);
    x = x.wrapping_add(rotate(v.0.wrapping_add(z), 49).wrapping_mul(K0));

    // Hash up to four 32-byte chunks from the tail; chunks may overlap
    // bytes the main loop already used.
    let mut tail_done = 0usize;
    while tail_done < len {
        tail_done += 32;
        y = rotate(y.wrapping_sub(x), 42)
            .wrapping_mul(K0)
            .wrapping_add(v.1);
        let at = pos + len - tail_done;
        w.0 = w.0.wrapping_add(fetch64(&s[at + 16..]));
        x = rotate(x, 49).wrapping_mul(K0).wrapping_add(w.0);
        w.0 = w.0.wrapping_add(v.0);
        v = weak_hash_slice(&s[at..], v.0, w.1);
    }

    x = hash_len_16(x, v.0);
    y = hash_len_16(y, w.0);
    (
        hash_len_16(x.wrapping_add(v.1), w.1).wrapping_add(y),
        hash_len_16(x.wrapping_add(w.1), y.wrapping_add(v.1)),
    )
}
