//! Probabilistic membership filters: `bloom` for a single set, `dual_bloom`
//! for disambiguating membership in one of two sets.

use std::future::Future;

use cashier_backend::Backend;
use cashier_core::Key;
use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::facade::Facade;

/// Bit array size `m` and hash count `k` for a filter sized to hold `n`
/// entries at a false-positive rate of `p`.
fn dimensions(capacity: u64, false_positive_rate: f64) -> (u64, u32) {
    let n = capacity.max(1) as f64;
    let p = false_positive_rate.clamp(f64::MIN_POSITIVE, 0.5);
    let m = (-n * p.ln() / (std::f64::consts::LN_2 * std::f64::consts::LN_2)).ceil() as u64;
    let m = m.max(1);
    let k = ((m as f64 / n) * std::f64::consts::LN_2).round().max(1.0) as u32;
    (m, k)
}

/// Double-hashes `value` into `k` bit positions within an `m`-bit array, in
/// the standard `h1 + i*h2 mod m` style.
fn indices(value: &str, m: u64, k: u32) -> Vec<u32> {
    let digest = Sha256::digest(value.as_bytes());
    let h1 = u64::from_be_bytes(digest[0..8].try_into().unwrap());
    let h2 = u64::from_be_bytes(digest[8..16].try_into().unwrap());
    (0..k).map(|i| (h1.wrapping_add((i as u64).wrapping_mul(h2)) % m) as u32).collect()
}

/// Records `value` as present in the filter at `key`, sized for `capacity`
/// entries at `false_positive_rate`.
pub async fn bloom_add(facade: &Facade, key: &Key, capacity: u64, false_positive_rate: f64, value: &str) -> Result<(), CacheError> {
    let backend = facade.backend_for(key)?;
    let (m, k) = dimensions(capacity, false_positive_rate);
    let idxs = indices(value, m, k);
    let increments = vec![1i64; idxs.len()];
    backend.incr_bits(key, &idxs, 1, &increments).await?;
    Ok(())
}

/// Queries the filter at `key` for `value`. A negative is certain. A
/// positive is probabilistic unless `check_false_positive` is set, in which
/// case `verify` is called to confirm true membership before reporting one.
pub async fn bloom<F, Fut>(facade: &Facade, key: &Key, capacity: u64, false_positive_rate: f64, value: &str, check_false_positive: bool, verify: F) -> Result<bool, CacheError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<bool, CacheError>>,
{
    let backend = facade.backend_for(key)?;
    let (m, k) = dimensions(capacity, false_positive_rate);
    let idxs = indices(value, m, k);
    let bits = backend.get_bits(key, &idxs, 1).await?;
    let present = bits.iter().all(|&bit| bit == 1);

    if present && check_false_positive {
        return verify().await;
    }
    Ok(present)
}

/// Two filters — one recording known-true members, one known-false — so a
/// query that hits both (a hash collision) or neither (never seen) can fall
/// through to `resolve` instead of guessing.
pub struct DualBloom {
    true_key: Key,
    false_key: Key,
    capacity: u64,
    false_positive_rate: f64,
}

impl DualBloom {
    pub fn new(key: &Key, capacity: u64, false_positive_rate: f64) -> Self {
        Self {
            true_key: Key::new(format!("{}:true", key.as_str())),
            false_key: Key::new(format!("{}:false", key.as_str())),
            capacity,
            false_positive_rate,
        }
    }

    /// Records `value` as a known-true or known-false member.
    pub async fn record(&self, facade: &Facade, value: &str, is_true: bool) -> Result<(), CacheError> {
        let key = if is_true { &self.true_key } else { &self.false_key };
        bloom_add(facade, key, self.capacity, self.false_positive_rate, value).await
    }

    /// Queries both filters for `value`. If exactly one reports membership,
    /// that's the answer; if both or neither do, falls through to `resolve`.
    pub async fn query<F, Fut>(&self, facade: &Facade, value: &str, resolve: F) -> Result<bool, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool, CacheError>>,
    {
        let in_true = bloom(facade, &self.true_key, self.capacity, self.false_positive_rate, value, false, || async { Ok(false) }).await?;
        let in_false = bloom(facade, &self.false_key, self.capacity, self.false_positive_rate, value, false, || async { Ok(false) }).await?;

        match (in_true, in_false) {
            (true, false) => Ok(true),
            (false, true) => Ok(false),
            _ => resolve().await,
        }
    }
}
