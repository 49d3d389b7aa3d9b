//! Jenkins lookup3 (`hashlittle`), the checksum HDF5 puts on superblocks,
//! object headers and other v2 metadata.

use byteorder::{ByteOrder, LittleEndian};

/// Checksum `data` the way `H5_checksum_lookup3` does (initial value 0).
pub fn jenkins_lookup3(data: &[u8]) -> u32 {
    let seed = 0xdead_beefu32.wrapping_add(data.len() as u32);
    let (mut a, mut b, mut c) = (seed, seed, seed);

    if data.is_empty() {
        return c;
    }

    // Every full 12-byte block except the last one goes through mix().
    let full_blocks = (data.len() - 1) / 12;
    for block in data[..full_blocks * 12].chunks_exact(12) {
        a = a.wrapping_add(LittleEndian::read_u32(&block[0..4]));
        b = b.wrapping_add(LittleEndian::read_u32(&block[4..8]));
        c = c.wrapping_add(LittleEndian::read_u32(&block[8..12]));
        mix(&mut a, &mut b, &mut c);
    }

    // The 1..=12 trailing bytes are added as zero-extended little-endian words.
    let mut tail = [0u8; 12];
    let rest = &data[full_blocks * 12..];
    tail[..rest.len()].copy_from_slice(rest);
    a = a.wrapping_add(LittleEndian::read_u32(&tail[0..4]));
    b = b.wrapping_add(LittleEndian::read_u32(&tail[4..8]));
    c = c.wrapping_add(LittleEndian::read_u32(&tail[8..12]));

    final_mix(&mut a, &mut b, &mut c);
    c
}

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}
