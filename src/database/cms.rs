use std::{
    f64::consts::E,
    io::{Read, Write},
};

use byteorder::{BigEndian, WriteBytesExt};
use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

use super::binary;
use crate::error::{EngineError, EngineResult};

/// Наибольшее количество счётчиков в матрице (1 ГиБ).
pub const MAX_CELLS: u64 = 1 << 27;

/// Count-Min Sketch: матрица `depth x width` счётчиков `u64`.
///
/// Позиция в строке `row` вычисляется двойным хешированием
/// `(h1 + h2 * row) % width`, где `h1` и `h2` берутся из одного 64-битного
/// хеша элемента. Оценка частоты никогда не меньше настоящей.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMinSketch {
    depth: u64,
    width: u64,
    /// Построчно, `depth * width` ячеек
    counters: Vec<u64>,
    /// Сумма всех приращений
    count: u64,
}

/// Сводка `CMS.INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CmsInfo {
    pub width: u64,
    pub depth: u64,
    pub count: u64,
}

impl CountMinSketch {
    /// `CMS.INITBYDIM`.
    pub fn new(
        depth: u64,
        width: u64,
    ) -> EngineResult<Self> {
        if depth == 0 || width == 0 {
            return Err(EngineError::invalid(format!(
                "count-min sketch dimensions must be positive, got {depth}x{width}"
            )));
        }
        let cells = Self::cells(depth, width)
            .ok_or_else(|| EngineError::invalid(format!("count-min sketch {depth}x{width} is too large")))?;
        Ok(Self {
            depth,
            width,
            counters: vec![0; cells],
            count: 0,
        })
    }

    /// `CMS.INITBYPROB`: `width = ceil(e / error_rate)`,
    /// `depth = ceil(ln(1 / probability))`.
    pub fn from_error_rate(
        error_rate: f64,
        probability: f64,
    ) -> EngineResult<Self> {
        if !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(EngineError::invalid(format!(
                "count-min sketch error rate must be in (0, 1), got {error_rate}"
            )));
        }
        if !(probability > 0.0 && probability < 1.0) {
            return Err(EngineError::invalid(format!(
                "count-min sketch probability must be in (0, 1), got {probability}"
            )));
        }
        let width = (E / error_rate).ceil();
        let depth = (1.0 / probability).ln().ceil();
        if width > MAX_CELLS as f64 || depth > MAX_CELLS as f64 {
            return Err(EngineError::invalid("count-min sketch is too large"));
        }
        Self::new(depth as u64, width as u64)
    }

    fn cells(
        depth: u64,
        width: u64,
    ) -> Option<usize> {
        depth
            .checked_mul(width)
            .filter(|&cells| cells <= MAX_CELLS)
            .map(|cells| cells as usize)
    }

    pub fn depth(&self) -> u64 {
        self.depth
    }

    pub fn width(&self) -> u64 {
        self.width
    }

    pub fn total_count(&self) -> u64 {
        self.count
    }

    /// Индексы ячеек элемента, по одному на строку.
    fn positions<'a>(
        &'a self,
        item: &[u8],
    ) -> impl Iterator<Item = usize> + 'a {
        let h = xxh64(item, 0);
        let (h1, h2) = (h >> 32, h & 0xFFFF_FFFF);
        (0..self.depth).map(move |row| {
            let col = h1.wrapping_add(h2.wrapping_mul(row)) % self.width;
            (row * self.width + col) as usize
        })
    }

    /// `CMS.INCRBY`: прибавляет `by` во все строки и возвращает новую оценку.
    /// Счётчики насыщаются на `u64::MAX`.
    pub fn incr_by(
        &mut self,
        item: &[u8],
        by: u64,
    ) -> u64 {
        let cells: Vec<usize> = self.positions(item).collect();
        let mut estimate = u64::MAX;
        for cell in cells {
            let counter = &mut self.counters[cell];
            *counter = counter.saturating_add(by);
            estimate = estimate.min(*counter);
        }
        self.count = self.count.saturating_add(by);
        estimate
    }

    /// `CMS.QUERY`: минимум по строкам.
    pub fn query(
        &self,
        item: &[u8],
    ) -> u64 {
        self.positions(item)
            .map(|cell| self.counters[cell])
            .min()
            .unwrap_or(0)
    }

    /// `CMS.MERGE`: заменяет содержимое взвешенной суммой источников.
    ///
    /// Пустой `weights` означает вес 1 для каждого источника. Прежние
    /// счётчики приёмника не участвуют; если приёмник сам входит в список
    /// источников, вызывающий передаёт его копию. При ошибке приёмник не
    /// меняется.
    pub fn merge(
        &mut self,
        sources: &[&CountMinSketch],
        weights: &[u64],
    ) -> EngineResult<()> {
        if sources.is_empty() {
            return Err(EngineError::invalid("count-min sketch merge needs at least one source"));
        }
        if !weights.is_empty() && weights.len() != sources.len() {
            return Err(EngineError::invalid(format!(
                "count-min sketch merge got {} weights for {} sources",
                weights.len(),
                sources.len()
            )));
        }
        if let Some(bad) = sources
            .iter()
            .find(|s| s.depth != self.depth || s.width != self.width)
        {
            return Err(EngineError::invalid(format!(
                "count-min sketch dimensions differ: {}x{} vs {}x{}",
                self.depth, self.width, bad.depth, bad.width
            )));
        }

        let weight = |i: usize| weights.get(i).copied().unwrap_or(1);
        let mut counters = vec![0u64; self.counters.len()];
        let mut count = 0u64;
        for (i, source) in sources.iter().enumerate() {
            let w = weight(i);
            for (dst, &src) in counters.iter_mut().zip(&source.counters) {
                *dst = dst.saturating_add(src.saturating_mul(w));
            }
            count = count.saturating_add(source.count.saturating_mul(w));
        }
        self.counters = counters;
        self.count = count;
        Ok(())
    }

    pub fn info(&self) -> CmsInfo {
        CmsInfo {
            width: self.width,
            depth: self.depth,
            count: self.count,
        }
    }

    /// Формат (big-endian): `depth u64`, `width u64`, `count u64`, затем
    /// счётчики построчно.
    pub fn write_to<W: Write>(
        &self,
        w: &mut W,
    ) -> std::io::Result<()> {
        w.write_u64::<BigEndian>(self.depth)?;
        w.write_u64::<BigEndian>(self.width)?;
        w.write_u64::<BigEndian>(self.count)?;
        for &counter in &self.counters {
            w.write_u64::<BigEndian>(counter)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> EngineResult<Self> {
        let depth = binary::read_u64(r, "cms depth")?;
        let width = binary::read_u64(r, "cms width")?;
        let count = binary::read_u64(r, "cms count")?;
        if depth == 0 || width == 0 {
            return Err(EngineError::corrupted(format!("cms dimensions {depth}x{width}")));
        }
        let cells = Self::cells(depth, width)
            .ok_or_else(|| EngineError::corrupted(format!("cms dimensions {depth}x{width} exceed limit")))?;
        let raw = binary::read_bytes(r, cells as u64 * 8, "cms counters")?;
        let counters = raw
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                u64::from_be_bytes(word)
            })
            .collect();
        Ok(Self {
            depth,
            width,
            counters,
            count,
        })
    }
}
