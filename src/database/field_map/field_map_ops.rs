use crate::engine::clock;

/// Значение поля вместе с его сроком жизни.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldItem {
    pub value: String,
    /// Абсолютный срок в мс Unix-эпохи; `None`, если поле вечное
    pub expires_at: Option<u64>,
}

/// Хеш, у каждого поля которого может быть свой TTL.
///
/// Обязательные методы принимают текущее время явно (`*_at`), остальные
/// берут его из системных часов. Истёкшее поле ведёт себя как отсутствующее;
/// методы с `&mut self` удаляют его при обращении.
pub trait FieldMap {
    /// Записывает вечное поле. Возвращает `true`, если живое поле уже было.
    fn set_at(
        &mut self,
        field: &str,
        value: &str,
        now_ms: u64,
    ) -> bool;

    /// Записывает поле со сроком `ttl_ms`; при `ttl_ms <= 0` поле удаляется.
    /// Возвращает `true`, если живое поле уже было.
    fn set_with_expiry_at(
        &mut self,
        field: &str,
        value: &str,
        ttl_ms: i64,
        now_ms: u64,
    ) -> bool;

    fn get_with_expiry_at(
        &mut self,
        field: &str,
        now_ms: u64,
    ) -> Option<FieldItem>;

    /// Удаляет поле; `true`, если оно было живым.
    fn delete_at(
        &mut self,
        field: &str,
        now_ms: u64,
    ) -> bool;

    fn clear(&mut self);

    /// Меняет срок жизни существующего поля, значение сохраняется.
    /// `ttl_ms <= 0` удаляет поле. `false`, если живого поля нет.
    fn set_expiry_at(
        &mut self,
        field: &str,
        ttl_ms: i64,
        now_ms: u64,
    ) -> bool;

    /// Количество живых полей.
    fn len_at(
        &self,
        now_ms: u64,
    ) -> usize;

    /// Живые пары `(поле, значение)`, отсортированные по полю.
    fn items_at(
        &self,
        now_ms: u64,
    ) -> Vec<(String, String)>;

    /// Удаляет все истёкшие поля; возвращает их количество.
    fn purge_expired_at(
        &mut self,
        now_ms: u64,
    ) -> usize;

    fn get_at(
        &mut self,
        field: &str,
        now_ms: u64,
    ) -> Option<String> {
        self.get_with_expiry_at(field, now_ms).map(|item| item.value)
    }

    fn has_at(
        &mut self,
        field: &str,
        now_ms: u64,
    ) -> bool {
        self.get_with_expiry_at(field, now_ms).is_some()
    }

    fn keys_at(
        &self,
        now_ms: u64,
    ) -> Vec<String> {
        self.items_at(now_ms).into_iter().map(|(k, _)| k).collect()
    }

    fn values_at(
        &self,
        now_ms: u64,
    ) -> Vec<String> {
        self.items_at(now_ms).into_iter().map(|(_, v)| v).collect()
    }

    fn set(
        &mut self,
        field: &str,
        value: &str,
    ) -> bool {
        self.set_at(field, value, clock::now_ms())
    }

    fn set_with_expiry(
        &mut self,
        field: &str,
        value: &str,
        ttl_ms: i64,
    ) -> bool {
        self.set_with_expiry_at(field, value, ttl_ms, clock::now_ms())
    }

    fn get(
        &mut self,
        field: &str,
    ) -> Option<String> {
        self.get_at(field, clock::now_ms())
    }

    fn get_with_expiry(
        &mut self,
        field: &str,
    ) -> Option<FieldItem> {
        self.get_with_expiry_at(field, clock::now_ms())
    }

    fn has(
        &mut self,
        field: &str,
    ) -> bool {
        self.has_at(field, clock::now_ms())
    }

    fn delete(
        &mut self,
        field: &str,
    ) -> bool {
        self.delete_at(field, clock::now_ms())
    }

    fn set_expiry(
        &mut self,
        field: &str,
        ttl_ms: i64,
    ) -> bool {
        self.set_expiry_at(field, ttl_ms, clock::now_ms())
    }

    fn len(&self) -> usize {
        self.len_at(clock::now_ms())
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn keys(&self) -> Vec<String> {
        self.keys_at(clock::now_ms())
    }

    fn values(&self) -> Vec<String> {
        self.values_at(clock::now_ms())
    }

    fn items(&self) -> Vec<(String, String)> {
        self.items_at(clock::now_ms())
    }

    fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(clock::now_ms())
    }
}

/// Абсолютный срок для TTL; `None`, если `ttl_ms <= 0`.
pub(crate) fn deadline(
    now_ms: u64,
    ttl_ms: i64,
) -> Option<u64> {
    u64::try_from(ttl_ms)
        .ok()
        .filter(|&ttl| ttl > 0)
        .map(|ttl| now_ms.saturating_add(ttl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline() {
        assert_eq!(deadline(100, 50), Some(150));
        assert_eq!(deadline(100, 0), None);
        assert_eq!(deadline(100, -5), None);
        assert_eq!(deadline(u64::MAX - 1, 10), Some(u64::MAX));
    }
}
