use std::io::{Read, Write};

use byteorder::{BigEndian, WriteBytesExt};

use super::{normalize_range, DequeOps, InsertPosition};
use crate::{
    database::{
        binary,
        list_entry::{decode, decode_last, ListEntry, PreparedEntry},
    },
    error::{EngineError, EngineResult},
};

/// Верхняя граница размера буфера при восстановлении.
const MAX_BUFFER_LEN: u64 = u32::MAX as u64;

/// Очередь в одном непрерывном буфере записей.
///
/// Вставка в начало сдвигает весь буфер, поэтому подходит только для
/// маленьких списков и как эталон при тестировании [`SegmentedDeque`].
///
/// [`SegmentedDeque`]: super::SegmentedDeque
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicDeque {
    buf: Vec<u8>,
    len: usize,
}

/// Итератор по записям непрерывного буфера.
pub struct BasicIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl BasicDeque {
    pub fn new() -> Self {
        Self::default()
    }

    /// Размер закодированных данных в байтах.
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    pub fn iter(&self) -> BasicIter<'_> {
        BasicIter {
            buf: &self.buf,
            pos: 0,
        }
    }

    /// Сериализует очередь: `len u64`, `byte_len u32`, затем сами записи.
    pub fn write_to<W: Write>(
        &self,
        w: &mut W,
    ) -> std::io::Result<()> {
        w.write_u64::<BigEndian>(self.len as u64)?;
        w.write_u32::<BigEndian>(self.buf.len() as u32)?;
        w.write_all(&self.buf)
    }

    /// Восстанавливает очередь и проверяет каждую запись.
    pub fn read_from<R: Read>(r: &mut R) -> EngineResult<Self> {
        let len = binary::read_u64(r, "basic deque length")?;
        let byte_len = binary::read_u32(r, "basic deque byte length")?;
        let buf = binary::read_bytes(r, byte_len as u64, "basic deque entries")?;
        let deque = Self {
            buf,
            len: binary::checked_len(len, MAX_BUFFER_LEN, "basic deque length")?,
        };
        let mut counted = 0usize;
        for entry in deque.iter() {
            entry?.to_owned_string()?;
            counted += 1;
        }
        if counted != deque.len {
            return Err(EngineError::corrupted(format!(
                "basic deque declares {} entries, found {counted}",
                deque.len
            )));
        }
        Ok(deque)
    }
}

impl DequeOps for BasicDeque {
    fn len(&self) -> usize {
        self.len
    }

    fn lpush(
        &mut self,
        value: &str,
    ) -> EngineResult<usize> {
        let bytes = PreparedEntry::new(value)?.to_vec()?;
        self.buf.splice(0..0, bytes);
        self.len += 1;
        Ok(self.len)
    }

    fn rpush(
        &mut self,
        value: &str,
    ) -> EngineResult<usize> {
        let bytes = PreparedEntry::new(value)?.to_vec()?;
        self.buf.extend_from_slice(&bytes);
        self.len += 1;
        Ok(self.len)
    }

    fn lpop(&mut self) -> EngineResult<String> {
        if self.len == 0 {
            return Err(EngineError::DequeEmpty);
        }
        let (entry, total) = decode(&self.buf)?;
        let value = entry.to_owned_string()?;
        self.buf.drain(..total);
        self.len -= 1;
        Ok(value)
    }

    fn rpop(&mut self) -> EngineResult<String> {
        if self.len == 0 {
            return Err(EngineError::DequeEmpty);
        }
        let (entry, start) = decode_last(&self.buf)?;
        let value = entry.to_owned_string()?;
        self.buf.truncate(start);
        self.len -= 1;
        Ok(value)
    }

    fn linsert(
        &mut self,
        pivot: &str,
        element: &str,
        position: InsertPosition,
    ) -> EngineResult<Option<usize>> {
        let target = PreparedEntry::new(pivot)?.as_entry();
        let bytes = PreparedEntry::new(element)?.to_vec()?;

        let mut pos = 0;
        while pos < self.buf.len() {
            let (entry, total) = decode(&self.buf[pos..])?;
            if entry == target {
                let at = match position {
                    InsertPosition::Before => pos,
                    InsertPosition::After => pos + total,
                };
                self.buf.splice(at..at, bytes);
                self.len += 1;
                return Ok(Some(self.len));
            }
            pos += total;
        }
        Ok(None)
    }

    fn lrange(
        &self,
        start: i64,
        stop: i64,
    ) -> EngineResult<Vec<String>> {
        let Some((from, to)) = normalize_range(start, stop, self.len) else {
            return Ok(Vec::new());
        };
        self.iter()
            .skip(from)
            .take(to - from)
            .map(|entry| entry.and_then(|e| e.to_owned_string()))
            .collect()
    }
}

impl<'a> Iterator for BasicIter<'a> {
    type Item = EngineResult<ListEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        match decode(&self.buf[self.pos..]) {
            Ok((entry, total)) => {
                self.pos += total;
                Some(Ok(entry))
            }
            Err(e) => {
                self.pos = self.buf.len();
                Some(Err(e))
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
