use std::{
    collections::HashMap,
    io::{Read, Write},
};

use byteorder::{BigEndian, WriteBytesExt};

use super::{deadline, FieldItem, FieldMap};
use crate::{
    database::binary,
    error::{EngineError, EngineResult},
};

/// Старший бит срока означает «поле вечное».
pub const PERSIST_FLAG: u64 = 1 << 63;

/// Наибольший абсолютный срок, помещающийся рядом с флагом.
pub const MAX_EXPIRY_MS: u64 = PERSIST_FLAG - 1;

/// Наибольшая длина поля или значения при восстановлении.
const MAX_STRING_LEN: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    value: String,
    /// `PERSIST_FLAG` либо абсолютный срок в мс
    expiry: u64,
}

/// Хеш с TTL на уровне полей.
///
/// Срок хранится в том же элементе, что и значение, одним `u64`: без флага
/// младшие 63 бита содержат момент истечения.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiringFieldMap {
    data: HashMap<String, Entry>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Entry {
    fn persistent(value: &str) -> Self {
        Self {
            value: value.to_owned(),
            expiry: PERSIST_FLAG,
        }
    }

    fn expiring(
        value: String,
        at_ms: u64,
    ) -> Self {
        Self {
            value,
            expiry: at_ms.min(MAX_EXPIRY_MS),
        }
    }

    fn expires_at(&self) -> Option<u64> {
        (self.expiry & PERSIST_FLAG == 0).then_some(self.expiry)
    }

    fn is_live(
        &self,
        now_ms: u64,
    ) -> bool {
        self.expires_at().is_none_or(|at| at > now_ms)
    }
}

impl ExpiringFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Размер хранилища вместе с ещё не вычищенными истёкшими полями.
    pub fn raw_len(&self) -> usize {
        self.data.len()
    }

    /// Удаляет поле, если оно истекло; `true`, если живое поле есть.
    fn check_live(
        &mut self,
        field: &str,
        now_ms: u64,
    ) -> bool {
        match self.data.get(field) {
            Some(entry) if entry.is_live(now_ms) => true,
            Some(_) => {
                self.data.remove(field);
                false
            }
            None => false,
        }
    }

    fn sorted_entries(&self) -> Vec<(&String, &Entry)> {
        let mut entries: Vec<_> = self.data.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Сериализует карту, включая истёкшие, но ещё не удалённые поля.
    ///
    /// Формат (big-endian): `count u32`, затем для каждого поля по порядку
    /// `field_len u32`, `field`, `value_len u32`, `value`, `expiry u64`.
    pub fn write_to<W: Write>(
        &self,
        w: &mut W,
    ) -> std::io::Result<()> {
        w.write_u32::<BigEndian>(self.data.len() as u32)?;
        for (field, entry) in self.sorted_entries() {
            w.write_u32::<BigEndian>(field.len() as u32)?;
            w.write_all(field.as_bytes())?;
            w.write_u32::<BigEndian>(entry.value.len() as u32)?;
            w.write_all(entry.value.as_bytes())?;
            w.write_u64::<BigEndian>(entry.expiry)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> EngineResult<Self> {
        let count = binary::read_u32(r, "field map size")?;
        let mut data = HashMap::new();
        for _ in 0..count {
            let field = read_string(r, "field name")?;
            let value = read_string(r, "field value")?;
            let expiry = binary::read_u64(r, "field expiry")?;
            if expiry != PERSIST_FLAG && expiry & PERSIST_FLAG != 0 {
                return Err(EngineError::corrupted(format!(
                    "field {field:?} has invalid expiry word {expiry:#x}"
                )));
            }
            if data.insert(field.clone(), Entry { value, expiry }).is_some() {
                return Err(EngineError::corrupted(format!("duplicate field {field:?}")));
            }
        }
        Ok(Self { data })
    }
}

fn read_string<R: Read>(
    r: &mut R,
    what: &'static str,
) -> EngineResult<String> {
    let len = binary::read_u32(r, what)? as u64;
    if len > MAX_STRING_LEN {
        return Err(EngineError::corrupted(format!("{what}: length {len} exceeds limit")));
    }
    let bytes = binary::read_bytes(r, len, what)?;
    String::from_utf8(bytes).map_err(|e| EngineError::corrupted(format!("{what}: {e}")))
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для ExpiringFieldMap
////////////////////////////////////////////////////////////////////////////////

impl FieldMap for ExpiringFieldMap {
    fn set_at(
        &mut self,
        field: &str,
        value: &str,
        now_ms: u64,
    ) -> bool {
        let existed = self.check_live(field, now_ms);
        self.data.insert(field.to_owned(), Entry::persistent(value));
        existed
    }

    fn set_with_expiry_at(
        &mut self,
        field: &str,
        value: &str,
        ttl_ms: i64,
        now_ms: u64,
    ) -> bool {
        let existed = self.check_live(field, now_ms);
        match deadline(now_ms, ttl_ms) {
            Some(at) => {
                self.data
                    .insert(field.to_owned(), Entry::expiring(value.to_owned(), at));
            }
            None => {
                self.data.remove(field);
            }
        }
        existed
    }

    fn get_with_expiry_at(
        &mut self,
        field: &str,
        now_ms: u64,
    ) -> Option<FieldItem> {
        if !self.check_live(field, now_ms) {
            return None;
        }
        self.data.get(field).map(|entry| FieldItem {
            value: entry.value.clone(),
            expires_at: entry.expires_at(),
        })
    }

    fn delete_at(
        &mut self,
        field: &str,
        now_ms: u64,
    ) -> bool {
        self.data
            .remove(field)
            .is_some_and(|entry| entry.is_live(now_ms))
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn set_expiry_at(
        &mut self,
        field: &str,
        ttl_ms: i64,
        now_ms: u64,
    ) -> bool {
        if !self.check_live(field, now_ms) {
            return false;
        }
        match deadline(now_ms, ttl_ms) {
            Some(at) => {
                if let Some(entry) = self.data.get_mut(field) {
                    entry.expiry = at.min(MAX_EXPIRY_MS);
                }
            }
            None => {
                self.data.remove(field);
            }
        }
        true
    }

    fn len_at(
        &self,
        now_ms: u64,
    ) -> usize {
        self.data.values().filter(|e| e.is_live(now_ms)).count()
    }

    fn items_at(
        &self,
        now_ms: u64,
    ) -> Vec<(String, String)> {
        self.sorted_entries()
            .into_iter()
            .filter(|(_, e)| e.is_live(now_ms))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    fn purge_expired_at(
        &mut self,
        now_ms: u64,
    ) -> usize {
        let before = self.data.len();
        self.data.retain(|_, e| e.is_live(now_ms));
        before - self.data.len()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
