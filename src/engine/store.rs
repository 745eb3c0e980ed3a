use std::{collections::HashMap, sync::Arc};

use globset::Glob;
use rand::{seq::IteratorRandom, thread_rng};
use tracing::{debug, trace};

use crate::{
    engine::clock::{Clock, SystemClock},
    config::EngineSettings,
    database::{
        BloomFilter, CountMinSketch, CuckooFilter, Object, ObjectEncoding, ObjectType,
        SegmentedDeque, Value,
    },
    error::{EngineError, EngineResult},
};

/// Параметры [`ObjectStore::put`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Сохранить TTL существующего ключа (`SET ... KEEPTTL`)
    pub keep_ttl: bool,
}

/// Условия `EXPIRE ... NX | XX | GT | LT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryFlags {
    pub nx: bool,
    pub xx: bool,
    pub gt: bool,
    pub lt: bool,
}

/// Хранилище ключей: объекты и их абсолютные сроки жизни.
///
/// Истёкший ключ удаляется при первом обращении к нему; активная чистка
/// ([`ObjectStore::sweep_expired`], [`ObjectStore::delete_expired_keys`])
/// нужна только для освобождения памяти.
#[derive(Debug)]
pub struct ObjectStore {
    objects: HashMap<String, Object>,
    /// Абсолютные сроки в мс Unix-эпохи
    expires: HashMap<String, u64>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ExpiryFlags {
    /// Разбирает опции команды (без учёта регистра) и проверяет их сочетание.
    pub fn parse<S: AsRef<str>>(options: &[S]) -> EngineResult<Self> {
        let mut flags = Self::default();
        for option in options {
            let option = option.as_ref();
            match option.to_ascii_uppercase().as_str() {
                "NX" => flags.nx = true,
                "XX" => flags.xx = true,
                "GT" => flags.gt = true,
                "LT" => flags.lt = true,
                _ => return Err(EngineError::invalid(format!("unsupported option {option}"))),
            }
        }
        flags.validate()?;
        Ok(flags)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.nx && (self.xx || self.gt || self.lt) {
            return Err(EngineError::invalid(
                "NX and XX, GT or LT options at the same time are not compatible",
            ));
        }
        if self.gt && self.lt {
            return Err(EngineError::invalid(
                "GT and LT options at the same time are not compatible",
            ));
        }
        Ok(())
    }

    /// Разрешают ли условия заменить срок `current` на `new_at`.
    ///
    /// Ключ без срока считается вечным: `GT` для него не срабатывает,
    /// `LT` срабатывает.
    pub fn allows(
        &self,
        current: Option<u64>,
        new_at: u64,
    ) -> bool {
        if self.nx && current.is_some() {
            return false;
        }
        if self.xx && current.is_none() {
            return false;
        }
        if self.gt && current.is_none_or(|at| new_at <= at) {
            return false;
        }
        if self.lt && current.is_some_and(|at| new_at >= at) {
            return false;
        }
        true
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            objects: HashMap::new(),
            expires: HashMap::new(),
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn is_expired(
        &self,
        key: &str,
        now_ms: u64,
    ) -> bool {
        self.expires.get(key).is_some_and(|&at| at <= now_ms)
    }

    /// Удаляет ключ, если он истёк; `true`, если живой ключ есть.
    fn check_live(
        &mut self,
        key: &str,
    ) -> bool {
        let now = self.now_ms();
        if self.is_expired(key, now) {
            self.objects.remove(key);
            self.expires.remove(key);
            trace!(key, "lazily evicted expired key");
            return false;
        }
        self.objects.contains_key(key)
    }

    /// Объект под ключом (`None`, если ключа нет или он истёк); отмечает
    /// обращение.
    pub fn get(
        &mut self,
        key: &str,
    ) -> Option<&mut Object> {
        if !self.check_live(key) {
            return None;
        }
        let now = self.now_ms();
        let obj = self.objects.get_mut(key)?;
        obj.touch(now);
        Some(obj)
    }

    /// Как [`get`](Self::get), но без отметки обращения (`OBJECT IDLETIME`).
    pub fn get_no_touch(
        &mut self,
        key: &str,
    ) -> Option<&Object> {
        if !self.check_live(key) {
            return None;
        }
        self.objects.get(key)
    }

    /// Объект с проверкой тега; `Ok(None)`, если ключа нет.
    pub fn get_typed(
        &mut self,
        key: &str,
        ty: ObjectType,
        enc: ObjectEncoding,
    ) -> EngineResult<Option<&mut Object>> {
        match self.get(key) {
            Some(obj) => {
                obj.assert_tag(ty, enc)?;
                Ok(Some(obj))
            }
            None => Ok(None),
        }
    }

    pub fn contains_key(
        &mut self,
        key: &str,
    ) -> bool {
        self.check_live(key)
    }

    /// Создаёт объект с проверкой тега. `ttl_ms` применяется при `put`.
    pub fn new_obj(
        &self,
        value: Value,
        ttl_ms: Option<u64>,
        ty: ObjectType,
        enc: ObjectEncoding,
    ) -> EngineResult<Object> {
        let mut obj = Object::new(value, ty, enc)?;
        obj.expires_at = ttl_ms.map(|ttl| self.now_ms().saturating_add(ttl));
        Ok(obj)
    }

    /// Записывает объект. Срок из `new_obj` заменяет прежний; иначе прежний
    /// срок снимается, если не задан `keep_ttl`.
    pub fn put(
        &mut self,
        key: impl Into<String>,
        mut obj: Object,
        opts: PutOptions,
    ) {
        let key = key.into();
        let now = self.now_ms();
        let had_expired = self.is_expired(&key, now);
        match obj.expires_at.take() {
            Some(at) => {
                self.expires.insert(key.clone(), at);
            }
            None if !opts.keep_ttl || had_expired => {
                self.expires.remove(&key);
            }
            None => {}
        }
        obj.touch(now);
        self.objects.insert(key, obj);
    }

    /// Удаляет ключ; `false`, если живого ключа не было.
    pub fn del(
        &mut self,
        key: &str,
    ) -> bool {
        self.get_del(key).is_some()
    }

    /// `GETDEL`: удаляет ключ и возвращает его объект.
    pub fn get_del(
        &mut self,
        key: &str,
    ) -> Option<Object> {
        if !self.check_live(key) {
            return None;
        }
        self.expires.remove(key);
        self.objects.remove(key)
    }

    /// `RENAME`: переносит объект вместе со сроком, затирая `to`.
    /// `false`, если `from` не существует.
    pub fn rename(
        &mut self,
        from: &str,
        to: &str,
    ) -> bool {
        if !self.check_live(from) {
            return false;
        }
        if from == to {
            return true;
        }
        let expiry = self.expires.remove(from);
        let Some(obj) = self.objects.remove(from) else {
            return false;
        };
        match expiry {
            Some(at) => self.expires.insert(to.to_owned(), at),
            None => self.expires.remove(to),
        };
        self.objects.insert(to.to_owned(), obj);
        true
    }

    /// `KEYS pattern`: живые ключи, подходящие под glob-шаблон, по порядку.
    pub fn keys(
        &self,
        pattern: &str,
    ) -> EngineResult<Vec<String>> {
        let matcher = Glob::new(pattern)
            .map_err(|e| EngineError::invalid(format!("bad pattern {pattern:?}: {e}")))?
            .compile_matcher();
        let now = self.now_ms();
        let mut keys: Vec<String> = self
            .objects
            .keys()
            .filter(|k| !self.is_expired(k, now) && matcher.is_match(k.as_str()))
            .cloned()
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }

    /// `DBSIZE`: включает истёкшие, но ещё не удалённые ключи.
    pub fn db_size(&self) -> usize {
        self.objects.len()
    }

    pub fn flush(&mut self) {
        self.objects.clear();
        self.expires.clear();
    }

    /// Ставит срок `now + ttl_ms`; `false`, если ключа нет.
    pub fn set_expiry(
        &mut self,
        key: &str,
        ttl_ms: u64,
    ) -> bool {
        let at = self.now_ms().saturating_add(ttl_ms);
        self.set_unix_time_expiry(key, at)
    }

    /// Ставит абсолютный срок; `false`, если ключа нет.
    pub fn set_unix_time_expiry(
        &mut self,
        key: &str,
        at_ms: u64,
    ) -> bool {
        if !self.check_live(key) {
            return false;
        }
        self.expires.insert(key.to_owned(), at_ms);
        true
    }

    /// Абсолютный срок живого ключа, если он задан.
    pub fn get_expiry(
        &mut self,
        key: &str,
    ) -> Option<u64> {
        if !self.check_live(key) {
            return None;
        }
        self.expires.get(key).copied()
    }

    /// `PERSIST`: снимает срок; `true`, если он был.
    pub fn persist(
        &mut self,
        key: &str,
    ) -> bool {
        self.check_live(key) && self.expires.remove(key).is_some()
    }

    /// `EXPIRE`/`PEXPIREAT` с опциями: ставит срок `at_ms`, если ключ есть и
    /// условия выполнены. Ошибка только для неизвестных или несовместимых
    /// опций.
    pub fn evaluate_and_set_expiry<S: AsRef<str>>(
        &mut self,
        key: &str,
        options: &[S],
        at_ms: u64,
    ) -> EngineResult<bool> {
        let flags = ExpiryFlags::parse(options)?;
        if !self.check_live(key) {
            return Ok(false);
        }
        let current = self.expires.get(key).copied();
        if !flags.allows(current, at_ms) {
            return Ok(false);
        }
        self.expires.insert(key.to_owned(), at_ms);
        Ok(true)
    }

    fn remove_expired<I: IntoIterator<Item = String>>(
        &mut self,
        keys: I,
    ) -> usize {
        let mut removed = 0;
        for key in keys {
            self.objects.remove(&key);
            self.expires.remove(&key);
            removed += 1;
        }
        removed
    }

    /// Удаляет все истёкшие ключи.
    pub fn delete_expired_keys(&mut self) -> usize {
        let now = self.now_ms();
        let expired: Vec<String> = self
            .expires
            .iter()
            .filter(|&(_, &at)| at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        let removed = self.remove_expired(expired);
        if removed > 0 {
            debug!(removed, remaining = self.objects.len(), "deleted expired keys");
        }
        removed
    }

    /// Один проход активной чистки: проверяет до `expiry.sweep_limit`
    /// случайных ключей со сроком и удаляет истёкшие.
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.now_ms();
        let limit = self.settings.expiry.sweep_limit;
        let expired: Vec<String> = self
            .expires
            .iter()
            .choose_multiple(&mut thread_rng(), limit)
            .into_iter()
            .filter(|&(_, &at)| at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        let removed = self.remove_expired(expired);
        if removed > 0 {
            debug!(removed, limit, "expiry sweep removed keys");
        }
        removed
    }

    pub fn new_deque(&self) -> EngineResult<SegmentedDeque> {
        SegmentedDeque::with_min_node_size(self.settings.deque.min_node_size)
    }

    pub fn new_bloom_filter(&self) -> EngineResult<BloomFilter> {
        BloomFilter::new(self.settings.bloom)
    }

    pub fn new_cuckoo_filter(&self) -> EngineResult<CuckooFilter> {
        CuckooFilter::new(self.settings.cuckoo)
    }

    pub fn new_count_min_sketch(&self) -> EngineResult<CountMinSketch> {
        CountMinSketch::from_error_rate(self.settings.cms.error_rate, self.settings.cms.probability)
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
