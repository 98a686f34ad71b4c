// src/miner/algorithm/siphash.rs
//! SipHash-2-4 as used by Cuckatoo graph generation
//!
//! Cuckatoo hashes a single 64-bit word (`2 * edge + side`) under a 256-bit
//! key taken directly from the seed, with a final rotation of 21 instead of
//! the reference 16.

/// The four 64-bit words a graph is keyed with
pub type SipKeys = [u64; 4];

const ROTATION: u32 = 21;

struct SipState {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
}

impl SipState {
    #[inline(always)]
    fn round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v1 = self.v1.rotate_left(13);
        self.v3 = self.v3.rotate_left(16);
        self.v1 ^= self.v0;
        self.v3 ^= self.v2;
        self.v0 = self.v0.rotate_left(32);
        self.v2 = self.v2.wrapping_add(self.v1);
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v1 = self.v1.rotate_left(17);
        self.v3 = self.v3.rotate_left(ROTATION);
        self.v1 ^= self.v2;
        self.v3 ^= self.v0;
        self.v2 = self.v2.rotate_left(32);
    }
}

/// Hashes `nonce` under `keys`
#[inline]
pub fn siphash24(keys: &SipKeys, nonce: u64) -> u64 {
    let mut s = SipState {
        v0: keys[0],
        v1: keys[1],
        v2: keys[2],
        v3: keys[3] ^ nonce,
    };
    s.round();
    s.round();
    s.v0 ^= nonce;
    s.v2 ^= 0xff;
    for _ in 0..4 {
        s.round();
    }
    s.v0 ^ s.v1 ^ s.v2 ^ s.v3
}

/// Endpoint of `edge` on `side` (0 = U, 1 = V), masked to the node space
#[inline]
pub fn sipnode(keys: &SipKeys, edge: u64, side: u64, node_mask: u64) -> u64 {
    siphash24(keys, 2 * edge + side) & node_mask
}
