use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

/// Где вставлять элемент относительно опорного (`LINSERT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
}

/// Общий интерфейс двусторонней очереди строк.
///
/// Реализуется сегментированной очередью и простой однобуферной, что даёт
/// возможность дифференциального тестирования одной против другой.
pub trait DequeOps {
    /// Количество элементов.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Добавляет элемент в начало; возвращает новую длину.
    fn lpush(
        &mut self,
        value: &str,
    ) -> EngineResult<usize>;

    /// Добавляет элемент в конец; возвращает новую длину.
    fn rpush(
        &mut self,
        value: &str,
    ) -> EngineResult<usize>;

    /// Снимает элемент с начала. `DequeEmpty`, если очередь пуста.
    fn lpop(&mut self) -> EngineResult<String>;

    /// Снимает элемент с конца. `DequeEmpty`, если очередь пуста.
    fn rpop(&mut self) -> EngineResult<String>;

    /// Вставляет `element` до или после первого вхождения `pivot`.
    ///
    /// Возвращает новую длину или `None`, если `pivot` не найден (очередь при
    /// этом не меняется). Протокольный слой отвечает на `None` значением `-1`.
    fn linsert(
        &mut self,
        pivot: &str,
        element: &str,
        position: InsertPosition,
    ) -> EngineResult<Option<usize>>;

    /// Элементы с `start` по `stop` включительно; отрицательные индексы
    /// считаются от конца.
    fn lrange(
        &self,
        start: i64,
        stop: i64,
    ) -> EngineResult<Vec<String>>;

    /// Все элементы по порядку.
    fn to_vec(&self) -> EngineResult<Vec<String>> {
        self.lrange(0, -1)
    }
}

impl FromStr for InsertPosition {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("before") {
            Ok(Self::Before)
        } else if s.eq_ignore_ascii_case("after") {
            Ok(Self::After)
        } else {
            Err(EngineError::invalid(format!(
                "syntax error: expected BEFORE or AFTER, got {s:?}"
            )))
        }
    }
}

/// Приводит пару индексов `LRANGE` к полуинтервалу `[from, to)`.
///
/// Возвращает `None`, если диапазон пуст.
pub(crate) fn normalize_range(
    start: i64,
    stop: i64,
    len: usize,
) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize + 1))
}
