use std::{fmt, hash::Hasher, io::Cursor};

use murmur3::murmur3_x64_128;
use siphasher::sip::SipHasher13;
use xxhash_rust::xxh64::xxh64;

use crate::error::{EngineError, EngineResult};

/// 64-битная хеш-функция с явным зерном.
///
/// Фильтры хранят только зёрна, поэтому та же функция с теми же зёрнами
/// после восстановления даёт те же индексы.
pub trait SeededHasher: Default + Clone + fmt::Debug + PartialEq {
    fn hash_with_seed(
        &self,
        bytes: &[u8],
        seed: u64,
    ) -> EngineResult<u64>;

    fn name(&self) -> &'static str;
}

/// xxHash64; зерно используется целиком.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XxHasher;

/// MurmurHash3 x64/128, младшие 64 бита; от зерна берутся младшие 32 бита.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MurmurHasher;

/// SipHash-1-3 с ключом, развёрнутым из зерна.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SipHasher;

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для XxHasher, MurmurHasher, SipHasher
////////////////////////////////////////////////////////////////////////////////

impl SeededHasher for XxHasher {
    fn hash_with_seed(
        &self,
        bytes: &[u8],
        seed: u64,
    ) -> EngineResult<u64> {
        Ok(xxh64(bytes, seed))
    }

    fn name(&self) -> &'static str {
        "xxh64"
    }
}

impl SeededHasher for MurmurHasher {
    fn hash_with_seed(
        &self,
        bytes: &[u8],
        seed: u64,
    ) -> EngineResult<u64> {
        let mut cursor = Cursor::new(bytes);
        murmur3_x64_128(&mut cursor, seed as u32)
            .map(|h| h as u64)
            .map_err(|e| EngineError::HashError(format!("murmur3: {e}")))
    }

    fn name(&self) -> &'static str {
        "murmur3"
    }
}

impl SeededHasher for SipHasher {
    fn hash_with_seed(
        &self,
        bytes: &[u8],
        seed: u64,
    ) -> EngineResult<u64> {
        let mut hasher = SipHasher13::new_with_keys(seed, seed.rotate_left(32) ^ 0x9E37_79B9_7F4A_7C15);
        hasher.write(bytes);
        Ok(hasher.finish())
    }

    fn name(&self) -> &'static str {
        "siphash13"
    }
}
