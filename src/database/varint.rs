//! Variable-length integer encoding (LEB128, little-endian group order).
//!
//! Экономит место для маленьких чисел:
//! - 0-127: 1 байт
//! - 128-16383: 2 байта
//! - 16384-2097151: 3 байта
//! - до u64::MAX: 10 байт максимум
//!
//! Прямая форма пишет группы по 7 бит от младшей к старшей и ставит бит
//! продолжения (MSB) у всех байтов, кроме последнего. Обратная форма хранит ту
//! же последовательность групп, но развёрнутой и прижатой к концу буфера:
//! читатель, стоящий на хвосте, идёт назад, пока у байта выставлен MSB, и так
//! находит начало числа. На этом построены backlength записей `list_entry`.

use std::io::{Read, Write};

use zkv_error::{bail, CodecError, ResultExt, ZkvResult};

use crate::error::{EngineError, EngineResult};

/// Максимальное кол-во байт для u64 в varint encoding.
pub const MAX_VARINT_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;
const PAYLOAD: u8 = 0x7F;

/// Вычисляет размер varint для числа без записи.
pub fn encoded_uint_size(mut value: u64) -> usize {
    let mut size = 1;
    while value > PAYLOAD as u64 {
        value >>= 7;
        size += 1;
    }
    size
}

/// Размер zigzag-varint для знакового числа.
pub fn encoded_int_size(value: i64) -> usize {
    encoded_uint_size(zigzag_encode(value))
}

#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Кодирует `value` в прямой форме.
///
/// # Examples
/// ```
/// use zkv::database::varint::encode_uint;
///
/// assert_eq!(encode_uint(127), vec![0x7F]);
/// assert_eq!(encode_uint(128), vec![0x80, 0x01]);
/// ```
pub fn encode_uint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_uint_size(value));
    loop {
        let byte = (value as u8) & PAYLOAD;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | CONTINUATION);
    }
}

/// Собирает число из всех переданных байт, OR-я `(byte & 0x7F) << 7*i`.
///
/// Байты сверх [`MAX_VARINT_LEN`] игнорируются.
pub fn decode_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(MAX_VARINT_LEN)
        .enumerate()
        .fold(0u64, |acc, (i, b)| acc | (((b & PAYLOAD) as u64) << (7 * i)))
}

pub fn encode_int(value: i64) -> Vec<u8> {
    encode_uint(zigzag_encode(value))
}

pub fn decode_int(bytes: &[u8]) -> i64 {
    zigzag_decode(decode_uint(bytes))
}

/// Пишет `value` в обратной форме ровно в `buf`.
///
/// Длина `buf` обязана совпадать с [`encoded_uint_size`]: первый байт
/// получает сброшенный MSB, остальные выставленный.
pub fn encode_uint_rev_in_place(
    mut value: u64,
    buf: &mut [u8],
) -> EngineResult<()> {
    let size = encoded_uint_size(value);
    if buf.len() != size {
        return Err(EngineError::invalid(format!(
            "reverse varint needs {size} bytes, got a {} byte slot",
            buf.len()
        )));
    }
    for slot in buf.iter_mut().rev() {
        *slot = ((value as u8) & PAYLOAD) | CONTINUATION;
        value >>= 7;
    }
    buf[0] &= PAYLOAD;
    Ok(())
}

/// Читает обратную форму: последний байт `bytes` несёт младшую группу.
pub fn decode_uint_rev(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .take(MAX_VARINT_LEN)
        .enumerate()
        .fold(0u64, |acc, (i, b)| acc | (((b & PAYLOAD) as u64) << (7 * i)))
}

/// Находит начало обратного varint, который заканчивается в конце `buf`.
///
/// Возвращает `None`, если буфер пуст или число длиннее [`MAX_VARINT_LEN`].
pub fn rev_uint_start(buf: &[u8]) -> Option<usize> {
    let mut pos = buf.len().checked_sub(1)?;
    let floor = buf.len().saturating_sub(MAX_VARINT_LEN);
    while buf[pos] & CONTINUATION != 0 {
        if pos == floor {
            return None;
        }
        pos -= 1;
    }
    Some(pos)
}

/// Записывает u64 в прямой форме в поток.
pub fn write_uint<W: Write>(
    w: &mut W,
    value: u64,
) -> ZkvResult<usize> {
    let bytes = encode_uint(value);
    w.write_all(&bytes)
        .context("Failed to write varint bytes")?;
    Ok(bytes.len())
}

/// Читает u64 в прямой форме из потока.
///
/// # Errors
/// - `UnexpectedEof`, если поток кончился раньше последнего байта
/// - `VarintOverflow`, если число длиннее 10 байт
pub fn read_uint<R: Read>(r: &mut R) -> ZkvResult<u64> {
    let mut result = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)
            .context("Failed to read varint byte")?;
        result |= ((byte[0] & PAYLOAD) as u64) << (7 * i);
        if byte[0] & CONTINUATION == 0 {
            return Ok(result);
        }
    }
    bail!(CodecError::VarintOverflow)
}
