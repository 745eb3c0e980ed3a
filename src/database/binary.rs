//! Вспомогательные функции для бинарных форм структур.
//!
//! Все числа во внешних формах пишутся big-endian через `byteorder`; ошибки
//! чтения превращаются в `CorruptedObject`, потому что источник этих байт
//! всегда DUMP-полезная нагрузка.

use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{EngineError, EngineResult};

/// Оборачивает ошибку чтения в `CorruptedObject` с указанием поля.
pub(crate) fn truncated(what: &'static str) -> impl Fn(io::Error) -> EngineError {
    move |e| EngineError::corrupted(format!("{what}: {e}"))
}

pub(crate) fn read_u8<R: Read>(
    r: &mut R,
    what: &'static str,
) -> EngineResult<u8> {
    r.read_u8().map_err(truncated(what))
}

pub(crate) fn read_u16<R: Read>(
    r: &mut R,
    what: &'static str,
) -> EngineResult<u16> {
    r.read_u16::<BigEndian>().map_err(truncated(what))
}

pub(crate) fn read_u32<R: Read>(
    r: &mut R,
    what: &'static str,
) -> EngineResult<u32> {
    r.read_u32::<BigEndian>().map_err(truncated(what))
}

pub(crate) fn read_u64<R: Read>(
    r: &mut R,
    what: &'static str,
) -> EngineResult<u64> {
    r.read_u64::<BigEndian>().map_err(truncated(what))
}

pub(crate) fn read_f64<R: Read>(
    r: &mut R,
    what: &'static str,
) -> EngineResult<f64> {
    r.read_f64::<BigEndian>().map_err(truncated(what))
}

/// Читает ровно `len` байт, не выделяя память под заявленную длину заранее.
pub(crate) fn read_bytes<R: Read>(
    r: &mut R,
    len: u64,
    what: &'static str,
) -> EngineResult<Vec<u8>> {
    let mut out = Vec::new();
    r.by_ref()
        .take(len)
        .read_to_end(&mut out)
        .map_err(truncated(what))?;
    if out.len() as u64 != len {
        return Err(EngineError::corrupted(format!(
            "{what}: expected {len} bytes, found {}",
            out.len()
        )));
    }
    Ok(out)
}

/// Размер, прочитанный из потока, в `usize`, с проверкой верхней границы.
pub(crate) fn checked_len(
    value: u64,
    limit: u64,
    what: &'static str,
) -> EngineResult<usize> {
    if value > limit {
        return Err(EngineError::corrupted(format!(
            "{what}: {value} exceeds limit {limit}"
        )));
    }
    usize::try_from(value).map_err(|_| EngineError::corrupted(format!("{what}: {value} overflows usize")))
}

/// Проверяет, что после разбора в потоке не осталось байт.
pub(crate) fn expect_end<R: Read>(
    r: &mut R,
    what: &'static str,
) -> EngineResult<()> {
    let mut extra = [0u8; 1];
    match r.read(&mut extra).map_err(truncated(what))? {
        0 => Ok(()),
        _ => Err(EngineError::corrupted(format!("{what}: trailing bytes"))),
    }
}
