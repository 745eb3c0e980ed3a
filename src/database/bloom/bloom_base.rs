use std::{
    f64::consts::LN_2,
    io::{Read, Write},
};

use byteorder::{BigEndian, WriteBytesExt};
use rand::{thread_rng, RngCore};

use super::{BloomInfo, BloomOptions};
use crate::{
    database::{
        binary,
        hashing::{SeededHasher, XxHasher},
    },
    error::{EngineError, EngineResult},
};

/// Наибольший размер битового массива (512 МиБ).
pub const MAX_BITS: u64 = 1 << 32;

/// Наибольшее количество хеш-функций при восстановлении.
const MAX_HASH_FUNCTIONS: u64 = 1024;

/// Коэффициент роста, о котором сообщает `BF.INFO`.
const EXPANSION_RATE: u32 = 2;

/// Bloom-фильтр над общим битовым массивом.
///
/// Каждая из `k` хеш-функций задаётся своим случайным 64-битным зерном;
/// зёрна сохраняются при сериализации, так что восстановленный фильтр
/// отвечает так же, как исходный.
#[derive(Debug, Clone, PartialEq)]
pub struct BloomFilter<H: SeededHasher = XxHasher> {
    error_rate: f64,
    capacity: u64,
    /// Биты на элемент
    bpe: f64,
    bits: u64,
    seeds: Vec<u64>,
    bitset: Vec<u8>,
    /// Сколько добавлений выставили хотя бы один новый бит
    count: u64,
    hasher: H,
}

/// Параметры, выведенные из `(error_rate, capacity)`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Layout {
    bpe: f64,
    hash_functions: usize,
    bits: u64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Layout {
    fn compute(opts: &BloomOptions) -> EngineResult<Self> {
        opts.validate()?;
        let bpe = -opts.error_rate.ln() / (LN_2 * LN_2);
        let hash_functions = (LN_2 * bpe).ceil().max(1.0);
        let raw_bits = (hash_functions * opts.capacity as f64 / LN_2).ceil();
        if !raw_bits.is_finite() || raw_bits > MAX_BITS as f64 {
            return Err(EngineError::invalid(format!(
                "bloom filter for capacity {} at error rate {} needs more than {MAX_BITS} bits",
                opts.capacity, opts.error_rate
            )));
        }
        let bits = (raw_bits as u64).div_ceil(8) * 8;
        Ok(Self {
            bpe,
            hash_functions: hash_functions as usize,
            bits,
        })
    }
}

impl BloomFilter<XxHasher> {
    /// Создаёт фильтр со случайными зёрнами из потокового генератора.
    pub fn new(opts: BloomOptions) -> EngineResult<Self> {
        Self::with_rng(opts, &mut thread_rng())
    }

    /// Создаёт фильтр, беря зёрна из переданного генератора.
    pub fn with_rng<R: RngCore + ?Sized>(
        opts: BloomOptions,
        rng: &mut R,
    ) -> EngineResult<Self> {
        Self::with_hasher(opts, XxHasher, rng)
    }
}

impl<H: SeededHasher> BloomFilter<H> {
    pub fn with_hasher<R: RngCore + ?Sized>(
        opts: BloomOptions,
        hasher: H,
        rng: &mut R,
    ) -> EngineResult<Self> {
        let layout = Layout::compute(&opts)?;
        let seeds = (0..layout.hash_functions).map(|_| rng.next_u64()).collect();
        Ok(Self {
            error_rate: opts.error_rate,
            capacity: opts.capacity,
            bpe: layout.bpe,
            bits: layout.bits,
            seeds,
            bitset: vec![0u8; (layout.bits / 8) as usize],
            count: 0,
            hasher,
        })
    }

    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn bits_per_element(&self) -> f64 {
        self.bpe
    }

    pub fn bit_count(&self) -> u64 {
        self.bits
    }

    pub fn hash_count(&self) -> usize {
        self.seeds.len()
    }

    /// Количество добавленных элементов (по сигналу «новый бит»).
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Индексы битов для значения; ничего не меняет, поэтому ошибка хеша не
    /// оставляет фильтр в промежуточном состоянии.
    fn indexes(
        &self,
        value: &[u8],
    ) -> EngineResult<Vec<u64>> {
        if value.is_empty() {
            return Err(EngineError::invalid("bloom filter value must not be empty"));
        }
        self.seeds
            .iter()
            .map(|&seed| Ok(self.hasher.hash_with_seed(value, seed)? % self.bits))
            .collect()
    }

    #[inline]
    fn bit_is_set(
        &self,
        idx: u64,
    ) -> bool {
        self.bitset[(idx / 8) as usize] & (1 << (idx % 8)) != 0
    }

    /// Добавляет значение (`BF.ADD`).
    ///
    /// Возвращает `true`, если был выставлен хотя бы один новый бит, и
    /// `false`, если все биты уже стояли (значение, вероятно, уже было).
    pub fn add(
        &mut self,
        value: &[u8],
    ) -> EngineResult<bool> {
        let indexes = self.indexes(value)?;
        let mut changed = false;
        for idx in indexes {
            let byte = &mut self.bitset[(idx / 8) as usize];
            let mask = 1u8 << (idx % 8);
            changed |= *byte & mask == 0;
            *byte |= mask;
        }
        if changed {
            self.count += 1;
        }
        Ok(changed)
    }

    /// Проверяет значение (`BF.EXISTS`).
    ///
    /// `false` означает «точно нет», `true` означает «возможно есть».
    pub fn exists(
        &self,
        value: &[u8],
    ) -> EngineResult<bool> {
        Ok(self
            .indexes(value)?
            .into_iter()
            .all(|idx| self.bit_is_set(idx)))
    }

    pub fn info(&self) -> BloomInfo {
        BloomInfo {
            capacity: self.capacity,
            size: self.bits,
            hash_functions: self.seeds.len(),
            items_inserted: self.count,
            expansion_rate: EXPANSION_RATE,
        }
    }

    /// Сериализует фильтр.
    ///
    /// Формат (big-endian): `count u64`, `error_rate f64`, `capacity u64`,
    /// `bits u64`, `seed_count u32`, зёрна `u64`, затем `bits / 8` байт
    /// битового массива.
    pub fn write_to<W: Write>(
        &self,
        w: &mut W,
    ) -> std::io::Result<()> {
        w.write_u64::<BigEndian>(self.count)?;
        w.write_f64::<BigEndian>(self.error_rate)?;
        w.write_u64::<BigEndian>(self.capacity)?;
        w.write_u64::<BigEndian>(self.bits)?;
        w.write_u32::<BigEndian>(self.seeds.len() as u32)?;
        for &seed in &self.seeds {
            w.write_u64::<BigEndian>(seed)?;
        }
        w.write_all(&self.bitset)
    }

    /// Восстанавливает фильтр, проверяя параметры и размер битового массива.
    pub fn read_from<R: Read>(r: &mut R) -> EngineResult<Self> {
        let count = binary::read_u64(r, "bloom count")?;
        let error_rate = binary::read_f64(r, "bloom error rate")?;
        let capacity = binary::read_u64(r, "bloom capacity")?;
        let bits = binary::read_u64(r, "bloom bit count")?;
        let seed_count = binary::read_u32(r, "bloom seed count")? as u64;

        let opts = BloomOptions {
            error_rate,
            capacity,
        };
        opts.validate()
            .map_err(|e| EngineError::corrupted(e.to_string()))?;
        if bits == 0 || bits % 8 != 0 || bits > MAX_BITS {
            return Err(EngineError::corrupted(format!("invalid bloom bit count {bits}")));
        }
        if seed_count == 0 {
            return Err(EngineError::corrupted("bloom filter has no hash functions"));
        }
        let seed_count = binary::checked_len(seed_count, MAX_HASH_FUNCTIONS, "bloom seed count")?;
        let seeds = (0..seed_count)
            .map(|_| binary::read_u64(r, "bloom seed"))
            .collect::<EngineResult<Vec<_>>>()?;
        let bitset = binary::read_bytes(r, bits / 8, "bloom bitset")?;

        Ok(Self {
            error_rate,
            capacity,
            bpe: -error_rate.ln() / (LN_2 * LN_2),
            bits,
            seeds,
            bitset,
            count,
            hasher: H::default(),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::database::hashing::MurmurHasher;

    fn seeded(opts: BloomOptions) -> BloomFilter {
        BloomFilter::with_rng(opts, &mut StdRng::seed_from_u64(7)).unwrap()
    }

    /// Тест проверяет расчёт параметров для значений по умолчанию.
    #[test]
    fn test_default_layout() {
        let bf = seeded(BloomOptions::default());
        assert_eq!(bf.hash_count(), 7);
        assert_eq!(bf.bit_count() % 8, 0);
        assert_eq!(bf.bit_count(), 10_344);
        assert!((bf.bits_per_element() - 9.585).abs() < 1e-3);
    }

    #[test]
    fn test_add_signals_new_bits() {
        let mut bf = seeded(BloomOptions::default());
        assert!(bf.add(b"apple").unwrap());
        assert!(!bf.add(b"apple").unwrap());
        assert_eq!(bf.count(), 1);
        assert!(bf.exists(b"apple").unwrap());
    }

    #[test]
    fn test_empty_value_rejected() {
        let mut bf = seeded(BloomOptions::default());
        assert!(matches!(bf.add(b""), Err(EngineError::InvalidArgument(_))));
        assert!(matches!(bf.exists(b""), Err(EngineError::InvalidArgument(_))));
    }

    /// Тест проверяет отсутствие ложноотрицательных ответов и долю
    /// ложноположительных около заданной.
    #[test]
    fn test_false_positive_rate() {
        let mut bf = seeded(BloomOptions::new(0.01, 2_000).unwrap());
        for i in 0..2_000 {
            bf.add(format!("member-{i}").as_bytes()).unwrap();
        }
        for i in 0..2_000 {
            assert!(bf.exists(format!("member-{i}").as_bytes()).unwrap());
        }
        let trials = 20_000;
        let false_positives = (0..trials)
            .filter(|i| bf.exists(format!("stranger-{i}").as_bytes()).unwrap())
            .count();
        let rate = false_positives as f64 / trials as f64;
        assert!(rate < 0.03, "false positive rate {rate}");
    }

    #[test]
    fn test_same_seeds_same_filter() {
        let a = seeded(BloomOptions::default());
        let b = seeded(BloomOptions::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_oversized_filter_rejected() {
        let opts = BloomOptions::new(1e-10, u64::MAX / 4).unwrap();
        assert!(matches!(
            BloomFilter::with_rng(opts, &mut StdRng::seed_from_u64(1)),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut bf = seeded(BloomOptions::new(0.05, 100).unwrap());
        for word in ["a", "bb", "ccc"] {
            bf.add(word.as_bytes()).unwrap();
        }
        let mut bytes = Vec::new();
        bf.write_to(&mut bytes).unwrap();
        let restored: BloomFilter = BloomFilter::read_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(restored, bf);
        assert!(restored.exists(b"bb").unwrap());
        assert_eq!(restored.info(), bf.info());
    }

    #[test]
    fn test_restore_rejects_bad_header() {
        let bf = seeded(BloomOptions::default());
        let mut bytes = Vec::new();
        bf.write_to(&mut bytes).unwrap();

        // error_rate = 2.0
        let mut bad_rate = bytes.clone();
        bad_rate[8..16].copy_from_slice(&2.0f64.to_be_bytes());
        assert!(matches!(
            BloomFilter::<XxHasher>::read_from(&mut Cursor::new(&bad_rate)),
            Err(EngineError::CorruptedObject(_))
        ));

        let short = &bytes[..bytes.len() - 10];
        assert!(BloomFilter::<XxHasher>::read_from(&mut Cursor::new(short)).is_err());
    }

    #[test]
    fn test_murmur_backed_filter() {
        let mut bf = BloomFilter::with_hasher(
            BloomOptions::default(),
            MurmurHasher,
            &mut StdRng::seed_from_u64(3),
        )
        .unwrap();
        bf.add(b"x").unwrap();
        assert!(bf.exists(b"x").unwrap());
    }
}
