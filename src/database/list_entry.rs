//! Самоописывающиеся записи списка в стиле listpack.
//!
//! Запись имеет вид `[enc][data][backlen]`:
//!
//! | Ведущий байт | Значение                         |
//! |--------------|----------------------------------|
//! | `0xxxxxxx`   | 7-битное беззнаковое целое       |
//! | `110xxxxx`   | 13-битное знаковое целое         |
//! | `11110001`   | 16-битное знаковое целое         |
//! | `11110010`   | 24-битное знаковое целое         |
//! | `11110011`   | 32-битное знаковое целое         |
//! | `11110100`   | 64-битное знаковое целое         |
//! | `10xxxxxx`   | строка с 6-битной длиной         |
//! | `1110xxxx`   | строка с 12-битной длиной        |
//! | `11110000`   | строка с 32-битной длиной        |
//!
//! `backlen` хранит длину `enc+data` в обратной varint-форме, поэтому по
//! записи можно шагать и вперёд, и назад. Целые числа пишутся little-endian.

use std::fmt;

use super::varint::{
    decode_uint_rev, encode_uint_rev_in_place, encoded_uint_size, rev_uint_start, MAX_VARINT_LEN,
};
use crate::error::{EngineError, EngineResult};

const INT_7BIT_MASK: u8 = 0x80;
const INT_13BIT: u8 = 0xC0;
const INT_13BIT_MASK: u8 = 0xE0;
const INT_16BIT: u8 = 0xF1;
const INT_24BIT: u8 = 0xF2;
const INT_32BIT: u8 = 0xF3;
const INT_64BIT: u8 = 0xF4;
const STR_6BIT: u8 = 0x80;
const STR_6BIT_MASK: u8 = 0xC0;
const STR_12BIT: u8 = 0xE0;
const STR_12BIT_MASK: u8 = 0xF0;
const STR_32BIT: u8 = 0xF0;

const STR_6BIT_MAX: usize = 63;
const STR_12BIT_MAX: usize = 4095;

/// Самая длинная десятичная запись i64 (`-9223372036854775808`).
const MAX_INT_DIGITS: usize = 20;

/// Декодированная запись, заимствующая байты строки из буфера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEntry<'a> {
    Int(i64),
    Str(&'a [u8]),
}

/// Класс кодировки записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryClass {
    UInt7,
    Int13,
    Int16,
    Int24,
    Int32,
    Int64,
    Str6,
    Str12,
    Str32,
}

/// Значение, для которого уже выбрана кодировка и посчитан размер.
///
/// Позволяет один раз разобрать строку, узнать точный размер записи и затем
/// записать её прямо в заранее выделенный участок буфера узла.
#[derive(Debug, Clone, Copy)]
pub struct PreparedEntry<'a> {
    class: EntryClass,
    int: i64,
    bytes: &'a [u8],
    /// Длина `enc+data`
    body_len: usize,
    backlen_len: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<'a> ListEntry<'a> {
    /// Переводит запись в строку; строковые данные обязаны быть UTF-8.
    pub fn to_owned_string(&self) -> EngineResult<String> {
        match self {
            ListEntry::Int(v) => Ok(v.to_string()),
            ListEntry::Str(bytes) => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| EngineError::corrupted(format!("list entry is not UTF-8: {e}"))),
        }
    }
}

impl<'a> PreparedEntry<'a> {
    /// Выбирает самую компактную кодировку для `value`.
    ///
    /// Целочисленная кодировка применяется только к канонической десятичной
    /// записи, так что декодирование возвращает исходную строку байт-в-байт.
    pub fn new(value: &'a str) -> EngineResult<Self> {
        let bytes = value.as_bytes();
        let (class, int, body_len) = match parse_canonical_int(value) {
            Some(v) => {
                let class = int_class(v);
                (class, v, int_body_len(class))
            }
            None => {
                let len = bytes.len();
                let (class, header) = if len <= STR_6BIT_MAX {
                    (EntryClass::Str6, 1)
                } else if len <= STR_12BIT_MAX {
                    (EntryClass::Str12, 2)
                } else if u32::try_from(len).is_ok() {
                    (EntryClass::Str32, 5)
                } else {
                    return Err(EngineError::invalid(format!(
                        "list element of {len} bytes exceeds the 32-bit length limit"
                    )));
                };
                (class, 0, header + len)
            }
        };
        Ok(Self {
            class,
            int,
            bytes,
            body_len,
            backlen_len: encoded_uint_size(body_len as u64),
        })
    }

    /// Полный размер записи, включая backlen.
    #[inline]
    pub fn len(&self) -> usize {
        self.body_len + self.backlen_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Запись в виде, в котором её вернёт декодер.
    pub fn as_entry(&self) -> ListEntry<'a> {
        if self.is_int() {
            ListEntry::Int(self.int)
        } else {
            ListEntry::Str(self.bytes)
        }
    }

    fn is_int(&self) -> bool {
        !matches!(
            self.class,
            EntryClass::Str6 | EntryClass::Str12 | EntryClass::Str32
        )
    }

    /// Пишет запись в `buf`, длина которого должна быть ровно [`Self::len`].
    pub fn write_into(
        &self,
        buf: &mut [u8],
    ) -> EngineResult<()> {
        if buf.len() != self.len() {
            return Err(EngineError::invalid(format!(
                "list entry needs {} bytes, got a {} byte slot",
                self.len(),
                buf.len()
            )));
        }
        let (body, backlen) = buf.split_at_mut(self.body_len);
        let v = self.int;
        match self.class {
            EntryClass::UInt7 => body[0] = v as u8,
            EntryClass::Int13 => {
                body[0] = INT_13BIT | ((v >> 8) as u8 & 0x1F);
                body[1] = v as u8;
            }
            EntryClass::Int16 => {
                body[0] = INT_16BIT;
                body[1..3].copy_from_slice(&(v as i16).to_le_bytes());
            }
            EntryClass::Int24 => {
                body[0] = INT_24BIT;
                body[1..4].copy_from_slice(&(v as i32).to_le_bytes()[..3]);
            }
            EntryClass::Int32 => {
                body[0] = INT_32BIT;
                body[1..5].copy_from_slice(&(v as i32).to_le_bytes());
            }
            EntryClass::Int64 => {
                body[0] = INT_64BIT;
                body[1..9].copy_from_slice(&v.to_le_bytes());
            }
            EntryClass::Str6 => {
                body[0] = STR_6BIT | self.bytes.len() as u8;
                body[1..].copy_from_slice(self.bytes);
            }
            EntryClass::Str12 => {
                let len = self.bytes.len();
                body[0] = STR_12BIT | (len >> 8) as u8;
                body[1] = len as u8;
                body[2..].copy_from_slice(self.bytes);
            }
            EntryClass::Str32 => {
                body[0] = STR_32BIT;
                body[1..5].copy_from_slice(&(self.bytes.len() as u32).to_le_bytes());
                body[5..].copy_from_slice(self.bytes);
            }
        }
        encode_uint_rev_in_place(self.body_len as u64, backlen)
    }

    pub fn to_vec(&self) -> EngineResult<Vec<u8>> {
        let mut out = vec![0u8; self.len()];
        self.write_into(&mut out)?;
        Ok(out)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Свободные функции кодека
////////////////////////////////////////////////////////////////////////////////

/// Кодирует строку в новую запись.
pub fn encode(value: &str) -> EngineResult<Vec<u8>> {
    PreparedEntry::new(value)?.to_vec()
}

/// Размер записи для `value` без кодирования.
pub fn entry_size(value: &str) -> EngineResult<usize> {
    Ok(PreparedEntry::new(value)?.len())
}

/// Декодирует запись, начинающуюся в `buf[0]`.
///
/// Возвращает значение и полное число занятых байт (`enc+data+backlen`).
pub fn decode(buf: &[u8]) -> EngineResult<(ListEntry<'_>, usize)> {
    let lead = *buf
        .first()
        .ok_or_else(|| EngineError::corrupted("empty list entry"))?;

    let (entry, body_len) = if lead & INT_7BIT_MASK == 0 {
        (ListEntry::Int(lead as i64), 1)
    } else if lead & STR_6BIT_MASK == STR_6BIT {
        let len = (lead & 0x3F) as usize;
        (ListEntry::Str(take(buf, 1, len)?), 1 + len)
    } else if lead & INT_13BIT_MASK == INT_13BIT {
        let b = take(buf, 1, 1)?;
        let raw = (((lead & 0x1F) as u64) << 8) | b[0] as u64;
        (ListEntry::Int(sign_extend(raw, 13)), 2)
    } else if lead & STR_12BIT_MASK == STR_12BIT {
        let b = take(buf, 1, 1)?;
        let len = (((lead & 0x0F) as usize) << 8) | b[0] as usize;
        (ListEntry::Str(take(buf, 2, len)?), 2 + len)
    } else {
        match lead {
            STR_32BIT => {
                let b = take(buf, 1, 4)?;
                let len = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize;
                (ListEntry::Str(take(buf, 5, len)?), 5 + len)
            }
            INT_16BIT => {
                let b = take(buf, 1, 2)?;
                (ListEntry::Int(i16::from_le_bytes([b[0], b[1]]) as i64), 3)
            }
            INT_24BIT => {
                let b = take(buf, 1, 3)?;
                let raw = b[0] as u64 | (b[1] as u64) << 8 | (b[2] as u64) << 16;
                (ListEntry::Int(sign_extend(raw, 24)), 4)
            }
            INT_32BIT => {
                let b = take(buf, 1, 4)?;
                (
                    ListEntry::Int(i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64),
                    5,
                )
            }
            INT_64BIT => {
                let b = take(buf, 1, 8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                (ListEntry::Int(i64::from_le_bytes(raw)), 9)
            }
            other => {
                return Err(EngineError::corrupted(format!(
                    "unknown list entry encoding {other:#04x}"
                )))
            }
        }
    };

    let backlen_len = encoded_uint_size(body_len as u64);
    let backlen = take(buf, body_len, backlen_len)?;
    let mut expected = [0u8; MAX_VARINT_LEN];
    encode_uint_rev_in_place(body_len as u64, &mut expected[..backlen_len])?;
    if backlen != &expected[..backlen_len] {
        return Err(EngineError::corrupted("list entry backlen mismatch"));
    }
    Ok((entry, body_len + backlen_len))
}

/// Декодирует запись, которая заканчивается ровно в конце `buf`.
///
/// Возвращает значение и смещение начала записи внутри `buf`.
pub fn decode_last(buf: &[u8]) -> EngineResult<(ListEntry<'_>, usize)> {
    let backlen_start =
        rev_uint_start(buf).ok_or_else(|| EngineError::corrupted("list entry backlen not found"))?;
    let body_len = decode_uint_rev(&buf[backlen_start..]) as usize;
    let start = backlen_start
        .checked_sub(body_len)
        .ok_or_else(|| EngineError::corrupted("list entry backlen points before buffer"))?;
    let (entry, total) = decode(&buf[start..])?;
    if start + total != buf.len() {
        return Err(EngineError::corrupted("list entry length disagrees with backlen"));
    }
    Ok((entry, start))
}

/// Разбирает строку как i64, только если она записана канонически.
///
/// `"12"` и `"-7"` подходят, `"+1"`, `"007"`, `"-0"` и `" 1"` нет.
pub fn parse_canonical_int(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_INT_DIGITS {
        return None;
    }
    let digits = match bytes[0] {
        b'-' => &bytes[1..],
        _ => bytes,
    };
    let canonical = match digits {
        [] => false,
        [b'0'] => digits.len() == bytes.len(),
        [first, ..] => *first != b'0' && digits.iter().all(u8::is_ascii_digit),
    };
    if !canonical {
        return None;
    }
    s.parse().ok()
}

fn int_class(v: i64) -> EntryClass {
    match v {
        0..=127 => EntryClass::UInt7,
        -4096..=4095 => EntryClass::Int13,
        -32_768..=32_767 => EntryClass::Int16,
        -8_388_608..=8_388_607 => EntryClass::Int24,
        -2_147_483_648..=2_147_483_647 => EntryClass::Int32,
        _ => EntryClass::Int64,
    }
}

fn int_body_len(class: EntryClass) -> usize {
    match class {
        EntryClass::UInt7 => 1,
        EntryClass::Int13 => 2,
        EntryClass::Int16 => 3,
        EntryClass::Int24 => 4,
        EntryClass::Int32 => 5,
        _ => 9,
    }
}

#[inline]
fn sign_extend(
    raw: u64,
    bits: u32,
) -> i64 {
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}

#[inline]
fn take(
    buf: &[u8],
    offset: usize,
    len: usize,
) -> EngineResult<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or_else(|| EngineError::corrupted("list entry is truncated"))
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for ListEntry<'_> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ListEntry::Int(v) => write!(f, "{v}"),
            ListEntry::Str(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
