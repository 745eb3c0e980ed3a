//! Бинарная форма `DUMP`/`RESTORE` одиночного объекта.
//!
//! Формат:
//!
//! ```text
//! [0x09 версия][тип|кодировка][полезная нагрузка][0xFF][crc32: u32 BE]
//! ```
//!
//! CRC считается по всем байтам до него. Полезная нагрузка структур
//! пишется их собственными `write_to`; строки и множества используют
//! varint-длины.

use std::{collections::HashSet, io::Read};

use byteorder::{BigEndian, WriteBytesExt};
use crc32fast::Hasher;
use tracing::warn;
use zkv_error::{bail, context, ensure, CodecError, ResultExt, ZkvResult};

use crate::database::{
    binary,
    varint::{read_uint, write_uint},
    BasicDeque, BloomFilter, CountMinSketch, CuckooFilter, ExpiringFieldMap, Object,
    ObjectEncoding, SegmentedDeque, TypeTag, Value,
};
use crate::error::EngineError;

/// Версия формата.
pub const DUMP_VERSION: u8 = 0x09;
/// Маркер конца полезной нагрузки.
pub const END_MARKER: u8 = 0xFF;

/// Версия, тег, маркер и CRC.
const FRAME_LEN: usize = 1 + 1 + 1 + 4;

/// Наибольшая длина строки в полезной нагрузке.
const MAX_STRING_LEN: u64 = 512 * 1024 * 1024;

/// Наибольшее число элементов множества.
const MAX_SET_LEN: u64 = u32::MAX as u64;

fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

fn write_string(
    out: &mut Vec<u8>,
    s: &str,
) -> ZkvResult<()> {
    write_uint(out, s.len() as u64)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_string<R: Read>(r: &mut R) -> ZkvResult<String> {
    let len = context!(read_uint(r), "reading string length")?;
    let len = binary::checked_len(len, MAX_STRING_LEN, "string length")?;
    let bytes = binary::read_bytes(r, len as u64, "string payload")?;
    Ok(String::from_utf8(bytes)?)
}

fn write_payload(
    out: &mut Vec<u8>,
    value: &Value,
) -> ZkvResult<()> {
    match value {
        Value::Str(s) => write_string(out, s)?,
        Value::Int(n) => out.write_i64::<BigEndian>(*n)?,
        Value::Deque(d) => d.write_to(out)?,
        Value::BasicDeque(d) => d.write_to(out)?,
        Value::Bloom(b) => b.write_to(out)?,
        Value::Cuckoo(c) => c.write_to(out)?,
        Value::Cms(c) => c.write_to(out)?,
        Value::FieldMap(m) => m.write_to(out)?,
        Value::Set(members) => {
            let mut sorted: Vec<&String> = members.iter().collect();
            sorted.sort_unstable();
            write_uint(out, sorted.len() as u64)?;
            for member in sorted {
                write_string(out, member)?;
            }
        }
    }
    Ok(())
}

fn read_payload<R: Read>(
    r: &mut R,
    tag: TypeTag,
) -> ZkvResult<Value> {
    let value = match tag.enc {
        ObjectEncoding::Raw => Value::Str(read_string(r)?),
        ObjectEncoding::Int => Value::Int(binary::read_u64(r, "integer")? as i64),
        ObjectEncoding::Deque => Value::Deque(SegmentedDeque::read_from(r)?),
        ObjectEncoding::BasicDeque => Value::BasicDeque(BasicDeque::read_from(r)?),
        ObjectEncoding::Bloom => Value::Bloom(BloomFilter::read_from(r)?),
        ObjectEncoding::Cuckoo => Value::Cuckoo(CuckooFilter::read_from(r)?),
        ObjectEncoding::Cms => Value::Cms(CountMinSketch::read_from(r)?),
        ObjectEncoding::ExpiringHash => Value::FieldMap(ExpiringFieldMap::read_from(r)?),
        ObjectEncoding::HashSet => {
            let count = context!(read_uint(r), "reading {} size", tag)?;
            let count = binary::checked_len(count, MAX_SET_LEN, "set size")?;
            let mut members = HashSet::new();
            for _ in 0..count {
                members.insert(read_string(r)?);
            }
            ensure!(
                members.len() == count,
                EngineError::corrupted("set contains duplicate members")
            );
            Value::Set(members)
        }
    };
    if value.tag() != tag {
        return Err(CodecError::UnknownTag(tag.pack())).context("type does not match encoding");
    }
    Ok(value)
}

/// `DUMP`: сериализует объект.
pub fn dump(obj: &Object) -> ZkvResult<Vec<u8>> {
    let mut out = vec![DUMP_VERSION, obj.tag().pack()];
    write_payload(&mut out, obj.value()).with_context(|| format!("dumping {}", obj.tag()))?;
    out.push(END_MARKER);
    let crc = crc32(&out);
    out.write_u32::<BigEndian>(crc)?;
    Ok(out)
}

/// `RESTORE`: проверяет конверт и восстанавливает объект.
pub fn restore(bytes: &[u8]) -> ZkvResult<Object> {
    if bytes.len() < FRAME_LEN {
        bail!(CodecError::UnexpectedEof {
            needed: FRAME_LEN - bytes.len(),
        });
    }
    let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
    let expected = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let actual = crc32(body);
    if expected != actual {
        warn!(expected, actual, len = bytes.len(), "dump checksum mismatch");
        bail!(CodecError::ChecksumMismatch { expected, actual });
    }
    if body[0] != DUMP_VERSION {
        bail!(CodecError::UnsupportedVersion(body[0]));
    }
    if body[body.len() - 1] != END_MARKER {
        bail!(CodecError::MissingEndMarker);
    }
    let tag = TypeTag::unpack(body[1]).map_err(|_| CodecError::UnknownTag(body[1]))?;

    let mut payload = &body[2..body.len() - 1];
    let value = read_payload(&mut payload, tag).with_context(|| format!("restoring {tag}"))?;
    binary::expect_end(&mut payload, "dump payload")?;
    Ok(Object::from_value(value))
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};
    use zkv_error::{StatusCode, StackError};

    use super::*;
    use crate::database::{BloomOptions, CuckooOptions, DequeOps, FieldMap};

    fn roundtrip(value: Value) {
        let obj = Object::from_value(value);
        let bytes = dump(&obj).unwrap();
        assert_eq!(bytes[0], DUMP_VERSION);
        assert_eq!(bytes[1], obj.tag().pack());
        assert_eq!(bytes[bytes.len() - 5], END_MARKER);
        let restored = restore(&bytes).unwrap();
        assert_eq!(restored.value(), obj.value());
        assert_eq!(restored.tag(), obj.tag());
    }

    #[test]
    fn test_roundtrip_every_kind() {
        roundtrip(Value::Str("hello".into()));
        roundtrip(Value::Int(-42));

        let mut deque = SegmentedDeque::with_min_node_size(16).unwrap();
        let mut basic = BasicDeque::new();
        for v in ["a", "12345", "long value that spans nodes"] {
            deque.rpush(v).unwrap();
            basic.rpush(v).unwrap();
        }
        roundtrip(Value::Deque(deque));
        roundtrip(Value::BasicDeque(basic));

        let mut bloom =
            BloomFilter::with_rng(BloomOptions::new(0.1, 50).unwrap(), &mut StdRng::seed_from_u64(1))
                .unwrap();
        bloom.add(b"x").unwrap();
        roundtrip(Value::Bloom(bloom));

        let mut cuckoo = CuckooFilter::with_rng(CuckooOptions::default(), StdRng::seed_from_u64(2)).unwrap();
        cuckoo.add(b"y").unwrap();
        roundtrip(Value::Cuckoo(cuckoo));

        let mut cms = CountMinSketch::new(2, 16).unwrap();
        cms.incr_by(b"z", 3);
        roundtrip(Value::Cms(cms));

        let mut fields = ExpiringFieldMap::new();
        fields.set_at("f", "v", 0);
        fields.set_with_expiry_at("g", "w", 1_000, 0);
        roundtrip(Value::FieldMap(fields));

        roundtrip(Value::Set(["a", "b"].into_iter().map(String::from).collect()));
    }

    #[test]
    fn test_string_layout() {
        let bytes = dump(&Object::from_value(Value::Str("ab".into()))).unwrap();
        assert_eq!(&bytes[..6], &[0x09, 0x00, 0x02, b'a', b'b', 0xFF]);
        assert_eq!(bytes.len(), 10);
    }

    fn codec_error(err: &StackError) -> &CodecError {
        err.downcast_ref::<CodecError>().unwrap()
    }

    /// Тест проверяет отказ при повреждённой контрольной сумме.
    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = dump(&Object::from_value(Value::Int(7))).unwrap();
        bytes[3] ^= 0x01;
        let err = restore(&bytes).unwrap_err();
        assert!(matches!(codec_error(&err), CodecError::ChecksumMismatch { .. }));
        assert_eq!(err.status_code(), StatusCode::ChecksumMismatch);
    }

    fn reseal(mut body: Vec<u8>) -> Vec<u8> {
        let crc = crc32(&body);
        body.extend_from_slice(&crc.to_be_bytes());
        body
    }

    #[test]
    fn test_envelope_validation() {
        assert!(matches!(
            codec_error(&restore(&[0x09, 0x00]).unwrap_err()),
            CodecError::UnexpectedEof { .. }
        ));

        let bad_version = reseal(vec![0x08, 0x00, 0x00, END_MARKER]);
        assert_eq!(
            codec_error(&restore(&bad_version).unwrap_err()),
            &CodecError::UnsupportedVersion(0x08)
        );

        let no_marker = reseal(vec![DUMP_VERSION, 0x00, 0x00, 0x00]);
        assert_eq!(
            codec_error(&restore(&no_marker).unwrap_err()),
            &CodecError::MissingEndMarker
        );

        let bad_tag = reseal(vec![DUMP_VERSION, 0xEE, END_MARKER]);
        assert_eq!(
            codec_error(&restore(&bad_tag).unwrap_err()),
            &CodecError::UnknownTag(0xEE)
        );

        // тип строки с кодировкой фильтра
        let mismatched = reseal(vec![DUMP_VERSION, 0x04, 0x00, END_MARKER]);
        assert!(restore(&mismatched).is_err());
    }

    #[test]
    fn test_payload_bounds() {
        // заявлено 5 байт строки, есть 1
        let short = reseal(vec![DUMP_VERSION, 0x00, 0x05, b'a', END_MARKER]);
        let err = restore(&short).unwrap_err();
        assert!(err.downcast_ref::<EngineError>().is_some());

        // лишний байт после целого
        let mut trailing = vec![DUMP_VERSION, 0x01];
        trailing.extend_from_slice(&7i64.to_be_bytes());
        trailing.push(0x00);
        trailing.push(END_MARKER);
        let err = restore(&reseal(trailing)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::CorruptedObject(_))
        ));
    }

    /// Тест проверяет, что ошибка чтения длины несёт контекст поля и объекта.
    #[test]
    fn test_truncated_length_carries_context() {
        let tag = TypeTag::new(crate::database::ObjectType::Set, ObjectEncoding::HashSet);
        let cut = reseal(vec![DUMP_VERSION, tag.pack(), 0x80, END_MARKER]);
        let err = restore(&cut).unwrap_err();
        let messages: Vec<&str> = err.contexts().iter().map(|c| c.message.as_str()).collect();
        assert!(messages.contains(&"reading set/hashset size"), "{messages:?}");
        assert!(messages.contains(&"restoring set/hashset"), "{messages:?}");
    }
}
