use std::{collections::HashSet, fmt};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{
    list_entry::parse_canonical_int, BasicDeque, BloomFilter, CountMinSketch, CuckooFilter,
    ExpiringFieldMap, SegmentedDeque,
};
use crate::error::{EngineError, EngineResult};

/// Логический тип значения; старший полубайт упакованного тега.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ObjectType {
    String = 0,
    ByteList = 1,
    BitSet = 2,
    Hash = 3,
    CountMinSketch = 4,
    Set = 5,
}

/// Физическое представление значения; младший полубайт упакованного тега.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ObjectEncoding {
    Raw = 0,
    Int = 1,
    Deque = 2,
    BasicDeque = 3,
    Bloom = 4,
    Cuckoo = 5,
    Cms = 6,
    ExpiringHash = 7,
    HashSet = 8,
}

/// Пара «тип, кодировка», однозначно определяющая конкретную структуру.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
    pub ty: ObjectType,
    pub enc: ObjectEncoding,
}

/// Значение, хранимое под ключом.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    /// Строка, являющаяся каноническим десятичным `i64`
    Int(i64),
    Deque(SegmentedDeque),
    BasicDeque(BasicDeque),
    Bloom(BloomFilter),
    Cuckoo(CuckooFilter),
    Cms(CountMinSketch),
    FieldMap(ExpiringFieldMap),
    Set(HashSet<String>),
}

/// Объект хранилища: значение, его тег и время последнего обращения.
///
/// Тег всегда соответствует варианту `value`; типизированные методы
/// доступа проверяют это и возвращают `WrongTypeOperation`.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    tag: TypeTag,
    value: Value,
    /// Секунды Unix-эпохи по модулю 2^32
    last_accessed: u32,
    /// Срок, выставленный `ObjectStore::new_obj`; забирается при `put`
    pub(crate) expires_at: Option<u64>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl TypeTag {
    pub const fn new(
        ty: ObjectType,
        enc: ObjectEncoding,
    ) -> Self {
        Self { ty, enc }
    }

    /// Тип в старшем полубайте, кодировка в младшем.
    pub fn pack(self) -> u8 {
        (u8::from(self.ty) << 4) | u8::from(self.enc)
    }

    pub fn unpack(byte: u8) -> EngineResult<Self> {
        let ty = ObjectType::try_from(byte >> 4)
            .map_err(|_| EngineError::corrupted(format!("unknown object type in tag {byte:#04x}")))?;
        let enc = ObjectEncoding::try_from(byte & 0x0F)
            .map_err(|_| EngineError::corrupted(format!("unknown object encoding in tag {byte:#04x}")))?;
        Ok(Self { ty, enc })
    }
}

impl Value {
    /// Строковое значение; канонические целые хранятся как `Int`.
    pub fn from_string(s: impl Into<String>) -> Self {
        let s = s.into();
        match parse_canonical_int(&s) {
            Some(n) => Self::Int(n),
            None => Self::Str(s),
        }
    }

    pub fn tag(&self) -> TypeTag {
        use ObjectEncoding as E;
        use ObjectType as T;
        let (ty, enc) = match self {
            Self::Str(_) => (T::String, E::Raw),
            Self::Int(_) => (T::String, E::Int),
            Self::Deque(_) => (T::ByteList, E::Deque),
            Self::BasicDeque(_) => (T::ByteList, E::BasicDeque),
            Self::Bloom(_) => (T::BitSet, E::Bloom),
            Self::Cuckoo(_) => (T::BitSet, E::Cuckoo),
            Self::Cms(_) => (T::CountMinSketch, E::Cms),
            Self::FieldMap(_) => (T::Hash, E::ExpiringHash),
            Self::Set(_) => (T::Set, E::HashSet),
        };
        TypeTag::new(ty, enc)
    }
}

/// Типизированные методы доступа к значению объекта.
///
/// Сначала проверяется тег, и только потом вариант значения.
macro_rules! typed_accessors {
    ($($name:ident, $name_mut:ident => $variant:ident($ty:ty), $ot:ident / $enc:ident;)*) => {
        $(
            pub fn $name(&self) -> EngineResult<&$ty> {
                self.assert_tag(ObjectType::$ot, ObjectEncoding::$enc)?;
                match &self.value {
                    Value::$variant(v) => Ok(v),
                    other => Err(EngineError::corrupted(format!(
                        "object tagged {} holds a {} value",
                        self.tag,
                        other.tag()
                    ))),
                }
            }

            pub fn $name_mut(&mut self) -> EngineResult<&mut $ty> {
                self.assert_tag(ObjectType::$ot, ObjectEncoding::$enc)?;
                let tag = self.tag;
                match &mut self.value {
                    Value::$variant(v) => Ok(v),
                    other => Err(EngineError::corrupted(format!(
                        "object tagged {tag} holds a {} value",
                        other.tag()
                    ))),
                }
            }
        )*
    };
}

impl Object {
    /// Создаёт объект с явным тегом; тег должен совпадать со значением.
    pub fn new(
        value: Value,
        ty: ObjectType,
        enc: ObjectEncoding,
    ) -> EngineResult<Self> {
        let tag = TypeTag::new(ty, enc);
        if value.tag() != tag {
            return Err(EngineError::invalid(format!(
                "value of kind {} cannot be tagged {tag}",
                value.tag()
            )));
        }
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        Self {
            tag: value.tag(),
            value,
            last_accessed: 0,
            expires_at: None,
        }
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn object_type(&self) -> ObjectType {
        self.tag.ty
    }

    pub fn encoding(&self) -> ObjectEncoding {
        self.tag.enc
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Заменяет значение; тег выводится заново из нового значения.
    pub fn set_value(
        &mut self,
        value: Value,
    ) {
        self.tag = value.tag();
        self.value = value;
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn last_accessed(&self) -> u32 {
        self.last_accessed
    }

    /// Запоминает время обращения (`now_ms` в миллисекундах).
    pub fn touch(
        &mut self,
        now_ms: u64,
    ) {
        self.last_accessed = (now_ms / 1000) as u32;
    }

    /// Сколько секунд прошло с последнего обращения (`OBJECT IDLETIME`).
    pub fn idle_seconds(
        &self,
        now_ms: u64,
    ) -> u32 {
        ((now_ms / 1000) as u32).wrapping_sub(self.last_accessed)
    }

    fn mismatch(
        &self,
        expected: TypeTag,
    ) -> EngineError {
        EngineError::WrongTypeOperation {
            expected,
            actual: self.tag,
        }
    }

    pub fn assert_type(
        &self,
        ty: ObjectType,
    ) -> EngineResult<()> {
        if self.tag.ty == ty {
            Ok(())
        } else {
            // кодировка ожидаемого тега совпадает с фактической: важен тип
            Err(self.mismatch(TypeTag::new(ty, self.tag.enc)))
        }
    }

    pub fn assert_encoding(
        &self,
        enc: ObjectEncoding,
    ) -> EngineResult<()> {
        if self.tag.enc == enc {
            Ok(())
        } else {
            Err(self.mismatch(TypeTag::new(self.tag.ty, enc)))
        }
    }

    pub fn assert_tag(
        &self,
        ty: ObjectType,
        enc: ObjectEncoding,
    ) -> EngineResult<()> {
        let expected = TypeTag::new(ty, enc);
        if self.tag == expected {
            Ok(())
        } else {
            Err(self.mismatch(expected))
        }
    }

    typed_accessors! {
        as_str, as_str_mut => Str(String), String / Raw;
        as_int, as_int_mut => Int(i64), String / Int;
        as_deque, as_deque_mut => Deque(SegmentedDeque), ByteList / Deque;
        as_basic_deque, as_basic_deque_mut => BasicDeque(BasicDeque), ByteList / BasicDeque;
        as_bloom, as_bloom_mut => Bloom(BloomFilter), BitSet / Bloom;
        as_cuckoo, as_cuckoo_mut => Cuckoo(CuckooFilter), BitSet / Cuckoo;
        as_cms, as_cms_mut => Cms(CountMinSketch), CountMinSketch / Cms;
        as_field_map, as_field_map_mut => FieldMap(ExpiringFieldMap), Hash / ExpiringHash;
        as_set, as_set_mut => Set(HashSet<String>), Set / HashSet;
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для ObjectType, ObjectEncoding, TypeTag
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for ObjectType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::ByteList => "bytelist",
            Self::BitSet => "bitset",
            Self::Hash => "hash",
            Self::CountMinSketch => "countminsketch",
            Self::Set => "set",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ObjectEncoding {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Self::Raw => "raw",
            Self::Int => "int",
            Self::Deque => "deque",
            Self::BasicDeque => "basicdeque",
            Self::Bloom => "bloom",
            Self::Cuckoo => "cuckoo",
            Self::Cms => "cms",
            Self::ExpiringHash => "expiringhash",
            Self::HashSet => "hashset",
        };
        f.write_str(name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.ty, self.enc)
    }
}

impl From<Value> for Object {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
