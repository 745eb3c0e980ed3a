use std::collections::HashMap;

use super::{deadline, FieldItem, FieldMap};

/// Эталонная карта полей: значения и сроки лежат в двух отдельных картах.
///
/// Медленнее [`ExpiringFieldMap`] на записи, зато устроена иначе, поэтому
/// годится для дифференциальных тестов.
///
/// [`ExpiringFieldMap`]: super::ExpiringFieldMap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleFieldMap {
    values: HashMap<String, String>,
    expires: HashMap<String, u64>,
}

impl SimpleFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_expired(
        &self,
        field: &str,
        now_ms: u64,
    ) -> bool {
        self.expires.get(field).is_some_and(|&at| at <= now_ms)
    }

    fn remove(
        &mut self,
        field: &str,
    ) -> Option<String> {
        self.expires.remove(field);
        self.values.remove(field)
    }

    fn has_live(
        &mut self,
        field: &str,
        now_ms: u64,
    ) -> bool {
        if self.is_expired(field, now_ms) {
            self.remove(field);
            return false;
        }
        self.values.contains_key(field)
    }
}

impl FieldMap for SimpleFieldMap {
    fn set_at(
        &mut self,
        field: &str,
        value: &str,
        now_ms: u64,
    ) -> bool {
        let existed = self.has_live(field, now_ms);
        self.values.insert(field.to_owned(), value.to_owned());
        self.expires.remove(field);
        existed
    }

    fn set_with_expiry_at(
        &mut self,
        field: &str,
        value: &str,
        ttl_ms: i64,
        now_ms: u64,
    ) -> bool {
        let existed = self.has_live(field, now_ms);
        match deadline(now_ms, ttl_ms) {
            Some(at) => {
                self.values.insert(field.to_owned(), value.to_owned());
                self.expires
                    .insert(field.to_owned(), at.min(super::MAX_EXPIRY_MS));
            }
            None => {
                self.remove(field);
            }
        }
        existed
    }

    fn get_with_expiry_at(
        &mut self,
        field: &str,
        now_ms: u64,
    ) -> Option<FieldItem> {
        if !self.has_live(field, now_ms) {
            return None;
        }
        Some(FieldItem {
            value: self.values.get(field)?.clone(),
            expires_at: self.expires.get(field).copied(),
        })
    }

    fn delete_at(
        &mut self,
        field: &str,
        now_ms: u64,
    ) -> bool {
        let live = !self.is_expired(field, now_ms);
        self.remove(field).is_some() && live
    }

    fn clear(&mut self) {
        self.values.clear();
        self.expires.clear();
    }

    fn set_expiry_at(
        &mut self,
        field: &str,
        ttl_ms: i64,
        now_ms: u64,
    ) -> bool {
        if !self.has_live(field, now_ms) {
            return false;
        }
        match deadline(now_ms, ttl_ms) {
            Some(at) => {
                self.expires
                    .insert(field.to_owned(), at.min(super::MAX_EXPIRY_MS));
            }
            None => {
                self.remove(field);
            }
        }
        true
    }

    fn len_at(
        &self,
        now_ms: u64,
    ) -> usize {
        self.values
            .keys()
            .filter(|k| !self.is_expired(k, now_ms))
            .count()
    }

    fn items_at(
        &self,
        now_ms: u64,
    ) -> Vec<(String, String)> {
        let mut items: Vec<_> = self
            .values
            .iter()
            .filter(|(k, _)| !self.is_expired(k, now_ms))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        items.sort_unstable();
        items
    }

    fn purge_expired_at(
        &mut self,
        now_ms: u64,
    ) -> usize {
        let expired: Vec<String> = self
            .expires
            .iter()
            .filter(|&(_, &at)| at <= now_ms)
            .map(|(k, _)| k.clone())
            .collect();
        for field in &expired {
            self.remove(field);
        }
        expired.len()
    }
}
