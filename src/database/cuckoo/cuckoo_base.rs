use std::{
    io::{Read, Write},
    mem,
};

use byteorder::{BigEndian, WriteBytesExt};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use super::{CuckooInfo, CuckooOptions};
use crate::{
    database::{
        binary,
        hashing::{MurmurHasher, SeededHasher},
    },
    error::{EngineError, EngineResult},
};

/// Зерно хеша для индексов и отпечатков.
pub const HASH_SEED: u64 = 1069;

/// Предел шагов случайного блуждания при вытеснении.
pub const MAX_DISPLACEMENTS: usize = 500;

/// Наибольшее количество ячеек таблицы.
pub const MAX_SLOTS: u64 = 1 << 30;

/// Отпечаток `0` означает пустую ячейку.
const EMPTY: u16 = 0;

/// Допустимые отпечатки: `1..=FINGERPRINT_MAX`.
const FINGERPRINT_MAX: u64 = u16::MAX as u64 - 1;

/// Порог заполнения, выше которого количество корзин удваивается.
const MAX_LOAD: f64 = 0.95;

/// Результат вставки в фильтр.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Отпечаток уже есть в одной из двух корзин (`CF.ADDNX`)
    Exists,
    /// Вытеснение не нашло места за [`MAX_DISPLACEMENTS`] шагов
    Full,
}

/// Cuckoo-фильтр с 16-битными отпечатками.
///
/// Таблица хранится одним плоским вектором: корзина `i` занимает ячейки
/// `i * bucket_size .. (i + 1) * bucket_size`. Количество корзин всегда
/// степень двойки, что позволяет брать индекс маской.
#[derive(Debug, Clone)]
pub struct CuckooFilter<H: SeededHasher = MurmurHasher> {
    opts: CuckooOptions,
    num_buckets: u64,
    mask: u64,
    slots: Vec<u16>,
    count: u64,
    deleted: u64,
    hasher: H,
    rng: StdRng,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

/// Количество корзин для заданных параметров.
fn bucket_count(opts: &CuckooOptions) -> EngineResult<u64> {
    let bucket_size = opts.bucket_size as u64;
    let mut buckets = (opts.capacity / bucket_size)
        .max(1)
        .checked_next_power_of_two()
        .ok_or_else(|| EngineError::invalid("cuckoo capacity is too large"))?;
    if opts.capacity as f64 / (buckets * bucket_size) as f64 > MAX_LOAD {
        buckets <<= 1;
    }
    match buckets.checked_mul(bucket_size) {
        Some(total) if total <= MAX_SLOTS => Ok(buckets),
        _ => Err(EngineError::invalid(format!(
            "cuckoo filter for capacity {} needs more than {MAX_SLOTS} slots",
            opts.capacity
        ))),
    }
}

impl CuckooFilter<MurmurHasher> {
    pub fn new(opts: CuckooOptions) -> EngineResult<Self> {
        Self::with_rng(opts, StdRng::from_entropy())
    }

    /// Создаёт фильтр с заданным генератором случайных чисел для вытеснения.
    pub fn with_rng(
        opts: CuckooOptions,
        rng: StdRng,
    ) -> EngineResult<Self> {
        Self::with_hasher(opts, MurmurHasher, rng)
    }
}

impl<H: SeededHasher> CuckooFilter<H> {
    pub fn with_hasher(
        opts: CuckooOptions,
        hasher: H,
        rng: StdRng,
    ) -> EngineResult<Self> {
        opts.validate()?;
        let num_buckets = bucket_count(&opts)?;
        Ok(Self {
            opts,
            num_buckets,
            mask: num_buckets - 1,
            slots: vec![EMPTY; (num_buckets * opts.bucket_size as u64) as usize],
            count: 0,
            deleted: 0,
            hasher,
            rng,
        })
    }

    pub fn options(&self) -> &CuckooOptions {
        &self.opts
    }

    pub fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    /// Количество занятых ячеек.
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Первичный индекс и ненулевой отпечаток из одного хеша.
    fn locate(
        &self,
        item: &[u8],
    ) -> EngineResult<(u64, u16)> {
        let h = self.hasher.hash_with_seed(item, HASH_SEED)?;
        let fp = ((h >> 48) % FINGERPRINT_MAX + 1) as u16;
        Ok((h & self.mask, fp))
    }

    /// Альтернативная корзина; симметрична: `alt(alt(i)) == i`.
    fn alt_index(
        &self,
        fp: u16,
        index: u64,
    ) -> EngineResult<u64> {
        let h = self.hasher.hash_with_seed(&fp.to_le_bytes(), HASH_SEED)?;
        Ok((index ^ h) & self.mask)
    }

    fn bucket(
        &self,
        index: u64,
    ) -> &[u16] {
        let size = self.opts.bucket_size as usize;
        let start = index as usize * size;
        &self.slots[start..start + size]
    }

    fn bucket_mut(
        &mut self,
        index: u64,
    ) -> &mut [u16] {
        let size = self.opts.bucket_size as usize;
        let start = index as usize * size;
        &mut self.slots[start..start + size]
    }

    fn try_place(
        &mut self,
        fp: u16,
        index: u64,
    ) -> bool {
        match self.bucket_mut(index).iter_mut().find(|s| **s == EMPTY) {
            Some(slot) => {
                *slot = fp;
                true
            }
            None => false,
        }
    }

    fn try_clear(
        &mut self,
        fp: u16,
        index: u64,
    ) -> bool {
        match self.bucket_mut(index).iter_mut().find(|s| **s == fp) {
            Some(slot) => {
                *slot = EMPTY;
                true
            }
            None => false,
        }
    }

    /// Случайное блуждание: кладёт `fp` в случайную ячейку, выселенный
    /// отпечаток переносит в его альтернативную корзину, и так далее.
    /// Каждая замена записывается в `swaps`.
    fn walk(
        &mut self,
        mut fp: u16,
        mut index: u64,
        swaps: &mut Vec<(usize, u16)>,
    ) -> EngineResult<bool> {
        let size = self.opts.bucket_size as usize;
        for _ in 0..MAX_DISPLACEMENTS {
            let pos = index as usize * size + self.rng.gen_range(0..size);
            let evicted = mem::replace(&mut self.slots[pos], fp);
            swaps.push((pos, evicted));
            fp = evicted;
            index = self.alt_index(fp, index)?;
            if self.try_place(fp, index) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn insert(
        &mut self,
        fp: u16,
        primary: u64,
    ) -> EngineResult<InsertOutcome> {
        if self.try_place(fp, primary) {
            self.count += 1;
            return Ok(InsertOutcome::Inserted);
        }
        let secondary = self.alt_index(fp, primary)?;
        if self.try_place(fp, secondary) {
            self.count += 1;
            return Ok(InsertOutcome::Inserted);
        }

        let start = if self.rng.gen::<bool>() { primary } else { secondary };
        let mut swaps = Vec::new();
        let walked = self.walk(fp, start, &mut swaps);
        if let Ok(true) = walked {
            self.count += 1;
            return Ok(InsertOutcome::Inserted);
        }
        for (pos, old) in swaps.into_iter().rev() {
            self.slots[pos] = old;
        }
        walked?;
        debug!(
            count = self.count,
            buckets = self.num_buckets,
            "cuckoo filter is full"
        );
        Ok(InsertOutcome::Full)
    }

    /// Добавляет элемент (`CF.ADD`); повторное добавление хранит ещё одну
    /// копию отпечатка.
    ///
    /// При [`InsertOutcome::Full`] фильтр остаётся в прежнем состоянии.
    pub fn add(
        &mut self,
        item: &[u8],
    ) -> EngineResult<InsertOutcome> {
        let (primary, fp) = self.locate(item)?;
        self.insert(fp, primary)
    }

    /// Добавляет элемент, только если его отпечатка ещё нет (`CF.ADDNX`).
    pub fn add_nx(
        &mut self,
        item: &[u8],
    ) -> EngineResult<InsertOutcome> {
        let (primary, fp) = self.locate(item)?;
        let secondary = self.alt_index(fp, primary)?;
        if self.bucket(primary).contains(&fp) || self.bucket(secondary).contains(&fp) {
            return Ok(InsertOutcome::Exists);
        }
        self.insert(fp, primary)
    }

    /// `CF.EXISTS`: ложноотрицательных ответов не бывает.
    pub fn contains(
        &self,
        item: &[u8],
    ) -> EngineResult<bool> {
        let (primary, fp) = self.locate(item)?;
        if self.bucket(primary).contains(&fp) {
            return Ok(true);
        }
        let secondary = self.alt_index(fp, primary)?;
        Ok(self.bucket(secondary).contains(&fp))
    }

    /// `CF.COUNT`: сколько копий отпечатка лежит в двух корзинах элемента.
    pub fn count(
        &self,
        item: &[u8],
    ) -> EngineResult<u64> {
        let (primary, fp) = self.locate(item)?;
        let secondary = self.alt_index(fp, primary)?;
        let occurrences = |index| self.bucket(index).iter().filter(|&&s| s == fp).count() as u64;
        let mut total = occurrences(primary);
        if secondary != primary {
            total += occurrences(secondary);
        }
        Ok(total)
    }

    /// `CF.DEL`: убирает одну копию отпечатка; `false`, если её нет.
    pub fn remove(
        &mut self,
        item: &[u8],
    ) -> EngineResult<bool> {
        let (primary, fp) = self.locate(item)?;
        let secondary = self.alt_index(fp, primary)?;
        let removed = self.try_clear(fp, primary) || self.try_clear(fp, secondary);
        if removed {
            self.count -= 1;
            self.deleted += 1;
        }
        Ok(removed)
    }

    pub fn info(&self) -> CuckooInfo {
        CuckooInfo {
            size: self.slots.len() as u64 * 2,
            number_of_buckets: self.num_buckets,
            number_of_filters: 1,
            items_inserted: self.count,
            items_deleted: self.deleted,
            bucket_size: self.opts.bucket_size,
            expansion_rate: self.opts.expansion,
            max_iterations: self.opts.max_iterations,
        }
    }

    /// Сериализует фильтр.
    ///
    /// Формат (big-endian): `count u64`, `deleted u64`, `capacity u64`,
    /// `bucket_size u8`, `max_iterations u16`, `expansion u16`,
    /// `num_buckets u64`, затем все ячейки как `u16`.
    pub fn write_to<W: Write>(
        &self,
        w: &mut W,
    ) -> std::io::Result<()> {
        w.write_u64::<BigEndian>(self.count)?;
        w.write_u64::<BigEndian>(self.deleted)?;
        w.write_u64::<BigEndian>(self.opts.capacity)?;
        w.write_u8(self.opts.bucket_size)?;
        w.write_u16::<BigEndian>(self.opts.max_iterations)?;
        w.write_u16::<BigEndian>(self.opts.expansion)?;
        w.write_u64::<BigEndian>(self.num_buckets)?;
        for &slot in &self.slots {
            w.write_u16::<BigEndian>(slot)?;
        }
        Ok(())
    }

    /// Восстанавливает фильтр, проверяя параметры, геометрию таблицы и
    /// совпадение счётчика с числом занятых ячеек.
    pub fn read_from<R: Read>(r: &mut R) -> EngineResult<Self> {
        let count = binary::read_u64(r, "cuckoo count")?;
        let deleted = binary::read_u64(r, "cuckoo deleted count")?;
        let capacity = binary::read_u64(r, "cuckoo capacity")?;
        let bucket_size = binary::read_u8(r, "cuckoo bucket size")?;
        let max_iterations = binary::read_u16(r, "cuckoo max iterations")?;
        let expansion = binary::read_u16(r, "cuckoo expansion")?;
        let num_buckets = binary::read_u64(r, "cuckoo bucket count")?;

        let opts = CuckooOptions {
            capacity,
            bucket_size,
            max_iterations,
            expansion,
        };
        opts.validate()
            .map_err(|e| EngineError::corrupted(e.to_string()))?;
        if !num_buckets.is_power_of_two() {
            return Err(EngineError::corrupted(format!(
                "cuckoo bucket count {num_buckets} is not a power of two"
            )));
        }
        let expected = bucket_count(&opts).map_err(|e| EngineError::corrupted(e.to_string()))?;
        if num_buckets != expected {
            return Err(EngineError::corrupted(format!(
                "cuckoo bucket count {num_buckets} does not match capacity {capacity} (expected {expected})"
            )));
        }

        let total = (num_buckets * bucket_size as u64) as usize;
        let raw = binary::read_bytes(r, total as u64 * 2, "cuckoo slots")?;
        let slots: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        let occupied = slots.iter().filter(|&&s| s != EMPTY).count() as u64;
        if occupied != count {
            return Err(EngineError::corrupted(format!(
                "cuckoo filter declares {count} items, found {occupied} occupied slots"
            )));
        }

        Ok(Self {
            opts,
            num_buckets,
            mask: num_buckets - 1,
            slots,
            count,
            deleted,
            hasher: H::default(),
            rng: StdRng::from_entropy(),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для CuckooFilter
////////////////////////////////////////////////////////////////////////////////

impl<H: SeededHasher> PartialEq for CuckooFilter<H> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.opts == other.opts
            && self.num_buckets == other.num_buckets
            && self.count == other.count
            && self.deleted == other.deleted
            && self.slots == other.slots
            && self.hasher == other.hasher
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
