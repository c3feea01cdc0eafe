use std::f64::consts::LN_2;

use xxhash_rust::xxh64::xxh64;

use crate::config::FilterConfig;
use crate::error::{FilterError, Result};

const SEED_A: u64 = 0x9747_b28c_9747_b28c;
const SEED_B: u64 = 0x85eb_ca6b_85eb_ca6b;

/// Upper bound on persisted layers; a snapshot claiming more is corrupt.
const MAX_LAYERS: u32 = 64;

fn hash_pair(key: &[u8]) -> (u64, u64) {
    let h1 = xxh64(key, SEED_A);
    // Forcing h2 odd keeps the probe sequence a full cycle modulo any m.
    let h2 = xxh64(key, SEED_B) | 1;
    (h1, h2)
}

/// One classic bloom filter: a fixed bit array probed at `num_hashes`
/// positions derived by double hashing.
pub(crate) struct BloomLayer {
    bits: Vec<u64>,
    bit_count: u64,
    num_hashes: u32,
    capacity: u64,
    size: u64,
}

impl BloomLayer {
    /// Sizes a layer for `capacity` keys at the given false-positive rate
    /// (`m = -n ln p / ln^2 2`, `k = (m/n) ln 2`).
    fn with_params(capacity: u64, fp_rate: f64) -> Self {
        let capacity = capacity.max(1);
        let fp_rate = fp_rate.clamp(1e-12, 0.5);
        let bit_count = (((capacity as f64) * -fp_rate.ln()) / (LN_2 * LN_2)).ceil() as u64;
        let bit_count = bit_count.max(64);
        let num_hashes = (((bit_count as f64) / (capacity as f64)) * LN_2).round() as u32;
        let num_hashes = num_hashes.max(1);
        let words = ((bit_count + 63) / 64) as usize;
        Self {
            bits: vec![0; words],
            bit_count,
            num_hashes,
            capacity,
            size: 0,
        }
    }

    fn probe(&self, h1: u64, h2: u64) -> bool {
        (0..self.num_hashes as u64).all(|i| {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.bit_count;
            self.bits[(bit / 64) as usize] >> (bit % 64) & 1 == 1
        })
    }

    /// Sets all probe positions; returns `true` when at least one bit was
    /// previously clear.
    fn set(&mut self, h1: u64, h2: u64) -> bool {
        let mut newly = false;
        for i in 0..self.num_hashes as u64 {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.bit_count;
            let word = &mut self.bits[(bit / 64) as usize];
            let mask = 1u64 << (bit % 64);
            if *word & mask == 0 {
                *word |= mask;
                newly = true;
            }
        }
        if newly {
            self.size += 1;
        }
        newly
    }

    fn is_full(&self) -> bool {
        self.size >= self.capacity
    }

    fn byte_size(&self) -> u64 {
        self.bits.len() as u64 * 8
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.capacity.to_be_bytes());
        out.extend_from_slice(&self.size.to_be_bytes());
        out.extend_from_slice(&self.num_hashes.to_be_bytes());
        out.extend_from_slice(&self.bit_count.to_be_bytes());
        for word in &self.bits {
            out.extend_from_slice(&word.to_be_bytes());
        }
    }

    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        let capacity = cursor.read_u64()?;
        let size = cursor.read_u64()?;
        let num_hashes = cursor.read_u32()?;
        let bit_count = cursor.read_u64()?;
        if capacity == 0 || bit_count == 0 || num_hashes == 0 {
            return Err(FilterError::Corruption("bloom layer header invalid"));
        }
        let words = ((bit_count + 63) / 64) as usize;
        let raw = cursor.read_bytes(words * 8)?;
        let mut bits = Vec::with_capacity(words);
        for chunk in raw.chunks_exact(8) {
            bits.push(u64::from_be_bytes(chunk.try_into().unwrap()));
        }
        Ok(Self {
            bits,
            bit_count,
            num_hashes,
            capacity,
            size,
        })
    }
}

/// A scalable bloom filter: a chain of [`BloomLayer`]s where each new layer
/// is `scale_size` times larger and holds a tighter false-positive target
/// than the one before it.
pub(crate) struct ScalableBloom {
    layers: Vec<BloomLayer>,
    initial_capacity: u64,
    base_fp_rate: f64,
    scale_size: u32,
    probability_reduction: f64,
}

impl ScalableBloom {
    pub(crate) fn new(config: &FilterConfig) -> Self {
        let mut sbf = Self {
            layers: Vec::new(),
            initial_capacity: config.initial_capacity.max(1),
            base_fp_rate: config.false_positive_rate,
            scale_size: config.scale_size.max(2),
            probability_reduction: config.probability_reduction.clamp(0.1, 0.99),
        };
        let (capacity, fp_rate) = sbf.layer_params(0);
        sbf.layers.push(BloomLayer::with_params(capacity, fp_rate));
        sbf
    }

    fn layer_params(&self, index: usize) -> (u64, f64) {
        let capacity = self
            .initial_capacity
            .saturating_mul((self.scale_size as u64).saturating_pow(index as u32));
        let fp_rate = self.base_fp_rate
            * (1.0 - self.probability_reduction)
            * self.probability_reduction.powi(index as i32);
        (capacity, fp_rate)
    }

    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        self.layers.iter().any(|layer| layer.probe(h1, h2))
    }

    /// Returns `true` when the key was newly added, `false` when any layer
    /// already reports it present.
    pub(crate) fn add(&mut self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        if self.layers.iter().any(|layer| layer.probe(h1, h2)) {
            return false;
        }
        if self.layers.last().map(BloomLayer::is_full).unwrap_or(true) {
            let (capacity, fp_rate) = self.layer_params(self.layers.len());
            self.layers.push(BloomLayer::with_params(capacity, fp_rate));
        }
        self.layers
            .last_mut()
            .expect("layer pushed above")
            .set(h1, h2)
    }

    pub(crate) fn size(&self) -> u64 {
        self.layers.iter().map(|layer| layer.size).sum()
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.layers.iter().map(|layer| layer.capacity).sum()
    }

    pub(crate) fn byte_size(&self) -> u64 {
        self.layers.iter().map(BloomLayer::byte_size).sum()
    }

    #[cfg(test)]
    pub(crate) fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.layers.len() as u32).to_be_bytes());
        for layer in &self.layers {
            layer.encode_into(out);
        }
    }

    pub(crate) fn decode(src: &[u8], config: &FilterConfig) -> Result<Self> {
        let mut cursor = Cursor::new(src);
        let count = cursor.read_u32()?;
        if count == 0 || count > MAX_LAYERS {
            return Err(FilterError::Corruption("bloom layer count out of range"));
        }
        let mut layers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            layers.push(BloomLayer::decode(&mut cursor)?);
        }
        if !cursor.is_empty() {
            return Err(FilterError::Corruption("trailing bytes after bloom layers"));
        }
        Ok(Self {
            layers,
            initial_capacity: config.initial_capacity.max(1),
            base_fp_rate: config.false_positive_rate,
            scale_size: config.scale_size.max(2),
            probability_reduction: config.probability_reduction.clamp(0.1, 0.99),
        })
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.buf.len() < len {
            return Err(FilterError::Corruption("bloom snapshot truncated"));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_bytes(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_bytes(8)?.try_into().unwrap()))
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
