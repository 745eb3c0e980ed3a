use std::io::{Read, Write};

use byteorder::{BigEndian, WriteBytesExt};
use tracing::trace;

use super::{normalize_range, DequeOps, InsertPosition};
use crate::{
    database::{
        binary,
        list_entry::{decode, decode_last, ListEntry, PreparedEntry},
    },
    error::{EngineError, EngineResult},
};

/// Минимальная ёмкость нового узла в байтах.
pub const DEFAULT_MIN_NODE_SIZE: usize = 256;

/// Наибольшая допустимая минимальная ёмкость узла.
pub const MAX_MIN_NODE_SIZE: usize = 1 << 20;

/// Верхняя граница числа узлов и элементов при восстановлении.
const MAX_RESTORE_COUNT: u64 = u32::MAX as u64;

type NodeId = usize;

/// Узел очереди: непрерывный участок записей `list_entry`.
///
/// У головного узла живые данные начинаются с `left_idx` очереди, у остальных с
/// нуля. Освобождённые узлы остаются в арене пустыми и переиспользуются.
#[derive(Debug, Clone, Default)]
struct Node {
    buf: Vec<u8>,
    /// Целевая ёмкость узла; `buf.len()` никогда не превышает её после
    /// `rpush`, но может после `lpush`/`linsert`, которые подгоняют её.
    cap: usize,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

/// Двусторонняя очередь из связанных буферных узлов.
///
/// Узлы живут в арене (`Vec<Node>` + список свободных индексов) и ссылаются
/// друг на друга индексами. `lpush` пишет записи назад от курсора `left_idx`
/// в головном узле; байты копируются только когда места слева от курсора не
/// хватает.
#[derive(Debug, Clone)]
pub struct SegmentedDeque {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    /// Смещение первой живой записи в головном узле
    left_idx: usize,
    len: usize,
    min_node_size: usize,
}

/// Итератор по записям от головы к хвосту.
pub struct SegmentedIter<'a> {
    deque: &'a SegmentedDeque,
    node: Option<NodeId>,
    pos: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Node {
    #[inline]
    fn spare(&self) -> usize {
        self.cap.saturating_sub(self.buf.len())
    }
}

impl SegmentedDeque {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            left_idx: 0,
            len: 0,
            min_node_size: DEFAULT_MIN_NODE_SIZE,
        }
    }

    /// Очередь с заданной минимальной ёмкостью узла в байтах.
    pub fn with_min_node_size(min_node_size: usize) -> EngineResult<Self> {
        if min_node_size == 0 || min_node_size > MAX_MIN_NODE_SIZE {
            return Err(EngineError::invalid(format!(
                "deque node size must be in 1..={MAX_MIN_NODE_SIZE}, got {min_node_size}"
            )));
        }
        Ok(Self {
            min_node_size,
            ..Self::new()
        })
    }

    pub fn min_node_size(&self) -> usize {
        self.min_node_size
    }

    /// Количество живых узлов.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn iter(&self) -> SegmentedIter<'_> {
        SegmentedIter {
            deque: self,
            node: self.head,
            pos: self.left_idx,
        }
    }

    /// Начало живых данных узла.
    #[inline]
    fn live_start(
        &self,
        id: NodeId,
    ) -> usize {
        if self.head == Some(id) {
            self.left_idx
        } else {
            0
        }
    }

    fn alloc(
        &mut self,
        buf: Vec<u8>,
        cap: usize,
    ) -> NodeId {
        let node = Node {
            buf,
            cap,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn link_front(
        &mut self,
        id: NodeId,
    ) {
        self.nodes[id].next = self.head;
        match self.head {
            Some(old) => self.nodes[old].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    fn link_back(
        &mut self,
        id: NodeId,
    ) {
        self.nodes[id].prev = self.tail;
        match self.tail {
            Some(old) => self.nodes[old].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }

    fn link_after(
        &mut self,
        anchor: NodeId,
        id: NodeId,
    ) {
        let next = self.nodes[anchor].next;
        self.nodes[id].prev = Some(anchor);
        self.nodes[id].next = next;
        self.nodes[anchor].next = Some(id);
        match next {
            Some(n) => self.nodes[n].prev = Some(id),
            None => self.tail = Some(id),
        }
    }

    /// Отцепляет узел и возвращает его в арену.
    fn release(
        &mut self,
        id: NodeId,
    ) {
        let Node { prev, next, .. } = std::mem::take(&mut self.nodes[id]);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => {
                self.head = next;
                self.left_idx = 0;
            }
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.free.push(id);
    }

    fn new_node_cap(
        &self,
        entry_len: usize,
    ) -> usize {
        entry_len.max(self.min_node_size)
    }

    /// Сериализует очередь.
    ///
    /// Формат (big-endian): `len u64`, `left_idx u32`, `min_node_size u32`,
    /// `node_count u32`, затем для каждого узла от головы `byte_len u32` и
    /// байты буфера целиком, включая пустой префикс головы.
    pub fn write_to<W: Write>(
        &self,
        w: &mut W,
    ) -> std::io::Result<()> {
        w.write_u64::<BigEndian>(self.len as u64)?;
        w.write_u32::<BigEndian>(self.left_idx as u32)?;
        w.write_u32::<BigEndian>(self.min_node_size as u32)?;
        w.write_u32::<BigEndian>(self.node_count() as u32)?;
        let mut node = self.head;
        while let Some(id) = node {
            let buf = &self.nodes[id].buf;
            w.write_u32::<BigEndian>(buf.len() as u32)?;
            w.write_all(buf)?;
            node = self.nodes[id].next;
        }
        Ok(())
    }

    /// Восстанавливает очередь и проверяет её структуру: каждый узел
    /// непуст, курсор головы внутри буфера, все записи декодируются, их
    /// число совпадает с заявленной длиной.
    pub fn read_from<R: Read>(r: &mut R) -> EngineResult<Self> {
        let len = binary::read_u64(r, "deque length")?;
        let left_idx = binary::read_u32(r, "deque left index")? as usize;
        let min_node_size = binary::read_u32(r, "deque node size")? as usize;
        let node_count = binary::read_u32(r, "deque node count")? as u64;

        let mut deque = Self::with_min_node_size(min_node_size)
            .map_err(|e| EngineError::corrupted(e.to_string()))?;
        deque.len = binary::checked_len(len, MAX_RESTORE_COUNT, "deque length")?;

        for i in 0..binary::checked_len(node_count, MAX_RESTORE_COUNT, "deque node count")? {
            let byte_len = binary::read_u32(r, "deque node length")?;
            let buf = binary::read_bytes(r, byte_len as u64, "deque node")?;
            let floor = if i == 0 { left_idx } else { 0 };
            if buf.len() <= floor {
                return Err(EngineError::corrupted("deque node has no live entries"));
            }
            let cap = buf.len().max(min_node_size);
            let id = deque.alloc(buf, cap);
            deque.link_back(id);
        }
        if deque.head.is_none() && left_idx != 0 {
            return Err(EngineError::corrupted("empty deque with non-zero left index"));
        }
        deque.left_idx = left_idx;

        let mut counted = 0usize;
        for entry in deque.iter() {
            entry?.to_owned_string()?;
            counted += 1;
        }
        if counted != deque.len {
            return Err(EngineError::corrupted(format!(
                "deque declares {} entries, found {counted}",
                deque.len
            )));
        }
        Ok(deque)
    }

    /// Ищет первую запись, равную `target`: узел, смещение и размер записи.
    fn find(
        &self,
        target: &ListEntry<'_>,
    ) -> EngineResult<Option<(NodeId, usize, usize)>> {
        let mut node = self.head;
        while let Some(id) = node {
            let buf = &self.nodes[id].buf;
            let mut pos = self.live_start(id);
            while pos < buf.len() {
                let (entry, total) = decode(&buf[pos..])?;
                if entry == *target {
                    return Ok(Some((id, pos, total)));
                }
                pos += total;
            }
            node = self.nodes[id].next;
        }
        Ok(None)
    }
}

/// Дописывает запись в конец буфера; при ошибке буфер не меняется.
fn append_entry(
    buf: &mut Vec<u8>,
    entry: &PreparedEntry<'_>,
) -> EngineResult<()> {
    let start = buf.len();
    buf.resize(start + entry.len(), 0);
    entry.write_into(&mut buf[start..]).inspect_err(|_| buf.truncate(start))
}

impl DequeOps for SegmentedDeque {
    fn len(&self) -> usize {
        self.len
    }

    fn lpush(
        &mut self,
        value: &str,
    ) -> EngineResult<usize> {
        let entry = PreparedEntry::new(value)?;
        let size = entry.len();

        match self.head {
            // Есть место слева от курсора: пишем без сдвига.
            Some(h) if self.left_idx >= size => {
                let at = self.left_idx - size;
                entry.write_into(&mut self.nodes[h].buf[at..self.left_idx])?;
                self.left_idx = at;
            }
            // Места мало: собираем новый буфер головы из записи и живых байт.
            Some(h) if self.left_idx > 0 => {
                let node = &mut self.nodes[h];
                let mut buf = Vec::with_capacity(size + node.buf.len() - self.left_idx);
                append_entry(&mut buf, &entry)?;
                buf.extend_from_slice(&node.buf[self.left_idx..]);
                node.cap = node.cap.max(buf.len());
                node.buf = buf;
                self.left_idx = 0;
            }
            _ => {
                let cap = self.new_node_cap(size);
                let mut buf = vec![0u8; cap];
                entry.write_into(&mut buf[cap - size..])?;
                let id = self.alloc(buf, cap);
                self.link_front(id);
                self.left_idx = cap - size;
            }
        }
        self.len += 1;
        Ok(self.len)
    }

    fn rpush(
        &mut self,
        value: &str,
    ) -> EngineResult<usize> {
        let entry = PreparedEntry::new(value)?;
        let size = entry.len();

        match self.tail {
            Some(t) if self.nodes[t].spare() >= size => {
                append_entry(&mut self.nodes[t].buf, &entry)?;
            }
            _ => {
                let cap = self.new_node_cap(size);
                let mut buf = Vec::with_capacity(cap);
                append_entry(&mut buf, &entry)?;
                let id = self.alloc(buf, cap);
                if self.head.is_none() {
                    self.left_idx = 0;
                }
                self.link_back(id);
            }
        }
        self.len += 1;
        Ok(self.len)
    }

    fn lpop(&mut self) -> EngineResult<String> {
        let head = self.head.ok_or(EngineError::DequeEmpty)?;
        let buf = &self.nodes[head].buf;
        let (entry, total) = decode(&buf[self.left_idx..])?;
        let value = entry.to_owned_string()?;

        self.left_idx += total;
        self.len -= 1;
        if self.left_idx >= self.nodes[head].buf.len() {
            self.release(head);
        }
        Ok(value)
    }

    fn rpop(&mut self) -> EngineResult<String> {
        let tail = self.tail.ok_or(EngineError::DequeEmpty)?;
        let live = self.live_start(tail);
        let buf = &self.nodes[tail].buf;
        let (entry, start) = decode_last(&buf[live..])?;
        let value = entry.to_owned_string()?;

        self.nodes[tail].buf.truncate(live + start);
        self.len -= 1;
        if self.nodes[tail].buf.len() <= live {
            self.release(tail);
        }
        Ok(value)
    }

    fn linsert(
        &mut self,
        pivot: &str,
        element: &str,
        position: InsertPosition,
    ) -> EngineResult<Option<usize>> {
        let target = PreparedEntry::new(pivot)?.as_entry();
        let entry = PreparedEntry::new(element)?;
        let bytes = entry.to_vec()?;

        let Some((id, pos, total)) = self.find(&target)? else {
            return Ok(None);
        };
        let at = match position {
            InsertPosition::Before => pos,
            InsertPosition::After => pos + total,
        };

        let node_len = self.nodes[id].buf.len();
        if bytes.len() <= self.nodes[id].spare() {
            // Помещается в узел: сдвиг только внутри него.
            self.nodes[id].buf.splice(at..at, bytes);
        } else if at == node_len {
            // Хвост узла без места: запись уходит в новый следующий узел.
            let cap = self.new_node_cap(bytes.len());
            let next = self.alloc(bytes, cap);
            self.link_after(id, next);
            trace!(node = id, new_node = next, "deque node appended on insert");
        } else {
            // Узел переполнен: всё после точки вставки уезжает в новый узел.
            // Хвост копируется до изменения исходного узла.
            let moved = self.nodes[id].buf[at..].to_vec();
            let moved_cap = self.new_node_cap(moved.len());
            let split = self.alloc(moved, moved_cap);
            self.link_after(id, split);

            let node = &mut self.nodes[id];
            node.buf.truncate(at);
            node.buf.extend_from_slice(&bytes);
            node.cap = node.cap.max(node.buf.len());
            trace!(node = id, new_node = split, "deque node split on insert");
        }
        self.len += 1;
        Ok(Some(self.len))
    }

    fn lrange(
        &self,
        start: i64,
        stop: i64,
    ) -> EngineResult<Vec<String>> {
        let Some((from, to)) = normalize_range(start, stop, self.len) else {
            return Ok(Vec::new());
        };
        self.iter()
            .skip(from)
            .take(to - from)
            .map(|entry| entry.and_then(|e| e.to_owned_string()))
            .collect()
    }
}

impl<'a> Iterator for SegmentedIter<'a> {
    type Item = EngineResult<ListEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let deque: &'a SegmentedDeque = self.deque;
        loop {
            let id = self.node?;
            let node = &deque.nodes[id];
            if self.pos < node.buf.len() {
                return Some(match decode(&node.buf[self.pos..]) {
                    Ok((entry, total)) => {
                        self.pos += total;
                        Ok(entry)
                    }
                    Err(e) => {
                        self.node = None;
                        Err(e)
                    }
                });
            }
            self.node = node.next;
            self.pos = 0;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for SegmentedDeque {
    fn default() -> Self {
        Self::new()
    }
}

/// Две очереди равны, если равны их последовательности элементов.
impl PartialEq for SegmentedDeque {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.len == other.len && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn small() -> SegmentedDeque {
        SegmentedDeque::with_min_node_size(8).unwrap()
    }

    /// Тест проверяет порядок `LPUSH a, b, c` и трёх `LPOP`.
    #[test]
    fn test_lpush_lpop_order() {
        let mut d = SegmentedDeque::new();
        for v in ["a", "b", "c"] {
            d.lpush(v).unwrap();
        }
        assert_eq!(d.lpop().unwrap(), "c");
        assert_eq!(d.lpop().unwrap(), "b");
        assert_eq!(d.lpop().unwrap(), "a");
        assert_eq!(d.lpop(), Err(EngineError::DequeEmpty));
        assert_eq!(d.node_count(), 0);
    }

    #[test]
    fn test_rpush_rpop_lifo() {
        let mut d = small();
        for i in 0..50 {
            d.rpush(&format!("v{i}")).unwrap();
        }
        assert!(d.node_count() > 1);
        for i in (0..50).rev() {
            assert_eq!(d.rpop().unwrap(), format!("v{i}"));
        }
        assert_eq!(d.rpop(), Err(EngineError::DequeEmpty));
        assert_eq!(d.node_count(), 0);
    }

    /// Тест проверяет FIFO для каждого конца при перемешанных операциях на
    /// маленьких узлах, где записи постоянно пересекают границы.
    #[test]
    fn test_mixed_ends_small_nodes() {
        let mut d = small();
        d.rpush("r1").unwrap();
        d.lpush("l1").unwrap();
        d.rpush("12345").unwrap();
        d.lpush("l2-long-value").unwrap();
        d.rpush("r3").unwrap();
        assert_eq!(d.to_vec().unwrap(), vec!["l2-long-value", "l1", "r1", "12345", "r3"]);
        assert_eq!(d.lpop().unwrap(), "l2-long-value");
        assert_eq!(d.rpop().unwrap(), "r3");
        assert_eq!(d.rpop().unwrap(), "12345");
        assert_eq!(d.lpop().unwrap(), "l1");
        assert_eq!(d.lpop().unwrap(), "r1");
        assert!(d.is_empty());
    }

    /// Тест проверяет, что `rpop` корректно опустошает головной узел, у
    /// которого курсор `left_idx` не на нуле.
    #[test]
    fn test_rpop_drains_head_with_cursor() {
        let mut d = SegmentedDeque::new();
        d.lpush("x").unwrap();
        d.lpush("y").unwrap();
        assert_eq!(d.rpop().unwrap(), "x");
        assert_eq!(d.rpop().unwrap(), "y");
        assert_eq!(d.node_count(), 0);
        d.rpush("z").unwrap();
        assert_eq!(d.lpop().unwrap(), "z");
    }

    #[test]
    fn test_lpush_reallocates_head_when_room_is_short() {
        let mut d = small();
        d.lpush("ab").unwrap(); // 4 байта, курсор на 4
        d.lpush("0123456789").unwrap(); // 12 байт, места нет
        assert_eq!(d.node_count(), 1);
        assert_eq!(d.to_vec().unwrap(), vec!["0123456789", "ab"]);
    }

    #[test]
    fn test_linsert_before_after_missing() {
        let mut d = SegmentedDeque::new();
        for v in ["a", "b", "c"] {
            d.rpush(v).unwrap();
        }
        assert_eq!(d.linsert("b", "d", InsertPosition::Before).unwrap(), Some(4));
        assert_eq!(d.to_vec().unwrap(), vec!["a", "d", "b", "c"]);
        assert_eq!(d.linsert("c", "e", InsertPosition::After).unwrap(), Some(5));
        assert_eq!(d.to_vec().unwrap(), vec!["a", "d", "b", "c", "e"]);
        assert_eq!(d.linsert("nope", "x", InsertPosition::Before).unwrap(), None);
        assert_eq!(d.len(), 5);

        let mut empty = SegmentedDeque::new();
        assert_eq!(empty.linsert("a", "b", InsertPosition::After).unwrap(), None);
    }

    /// Тест проверяет разбиение переполненного узла при вставке в середину.
    #[test]
    fn test_linsert_splits_full_node() {
        let mut d = small();
        for v in ["aa", "bb"] {
            d.rpush(v).unwrap(); // 4 + 4 байта: узел заполнен
        }
        assert_eq!(d.node_count(), 1);
        assert_eq!(d.linsert("bb", "mid", InsertPosition::Before).unwrap(), Some(3));
        assert_eq!(d.node_count(), 2);
        assert_eq!(d.to_vec().unwrap(), vec!["aa", "mid", "bb"]);
        assert_eq!(d.rpop().unwrap(), "bb");
        assert_eq!(d.rpop().unwrap(), "mid");
        assert_eq!(d.lpop().unwrap(), "aa");
    }

    #[test]
    fn test_linsert_into_head_with_cursor() {
        let mut d = small();
        d.lpush("q").unwrap();
        d.lpush("p").unwrap();
        assert_eq!(d.linsert("q", "pq", InsertPosition::Before).unwrap(), Some(3));
        assert_eq!(d.to_vec().unwrap(), vec!["p", "pq", "q"]);
        assert_eq!(d.lpop().unwrap(), "p");
        assert_eq!(d.lpop().unwrap(), "pq");
        assert_eq!(d.lpop().unwrap(), "q");
    }

    #[test]
    fn test_lrange_across_nodes() {
        let mut d = small();
        for i in 0..20 {
            d.rpush(&i.to_string()).unwrap();
        }
        assert_eq!(d.lrange(-3, -1).unwrap(), vec!["17", "18", "19"]);
        assert_eq!(d.lrange(5, 7).unwrap(), vec!["5", "6", "7"]);
        assert!(d.lrange(30, 40).unwrap().is_empty());
    }

    #[test]
    fn test_arena_reuses_released_nodes() {
        let mut d = small();
        for round in 0..10 {
            for i in 0..5 {
                d.rpush(&format!("{round}-{i}")).unwrap();
            }
            for _ in 0..5 {
                d.lpop().unwrap();
            }
        }
        assert!(d.nodes.len() <= 5);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut d = small();
        d.lpush("head").unwrap();
        for i in 0..10 {
            d.rpush(&format!("item-{i}")).unwrap();
        }
        d.lpush("-42").unwrap();

        let mut bytes = Vec::new();
        d.write_to(&mut bytes).unwrap();
        let restored = SegmentedDeque::read_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(restored, d);
        assert_eq!(restored.to_vec().unwrap(), d.to_vec().unwrap());
        assert_eq!(restored.min_node_size(), 8);
    }

    #[test]
    fn test_restore_rejects_bad_counts() {
        let mut d = SegmentedDeque::new();
        d.rpush("a").unwrap();
        let mut bytes = Vec::new();
        d.write_to(&mut bytes).unwrap();

        let mut wrong_len = bytes.clone();
        wrong_len[7] = 2;
        assert!(matches!(
            SegmentedDeque::read_from(&mut Cursor::new(&wrong_len)),
            Err(EngineError::CorruptedObject(_))
        ));

        let truncated = &bytes[..bytes.len() - 1];
        assert!(SegmentedDeque::read_from(&mut Cursor::new(truncated)).is_err());
    }

    /// Тест проверяет, что восстановление отвергает запись, которую нельзя
    /// прочитать с конца из-за backlen без бита продолжения.
    #[test]
    fn test_restore_rejects_non_canonical_backlen() {
        let mut d = SegmentedDeque::new();
        d.rpush(&"v".repeat(198)).unwrap();
        let mut bytes = Vec::new();
        d.write_to(&mut bytes).unwrap();
        let last = bytes.len() - 1;
        bytes[last] &= 0x7F;
        assert!(matches!(
            SegmentedDeque::read_from(&mut Cursor::new(&bytes)),
            Err(EngineError::CorruptedObject(_))
        ));
    }

    /// Тест проверяет, что вставка после последнего элемента полного узла
    /// заводит новый узел, а не растит текущий сверх ёмкости.
    #[test]
    fn test_linsert_after_tail_respects_node_cap() {
        let mut d = small();
        for v in ["aa", "bb"] {
            d.rpush(v).unwrap();
        }
        assert_eq!(d.node_count(), 1);

        let mut expected = vec!["aa".to_string(), "bb".to_string()];
        let mut pivot = "bb".to_string();
        for i in 0..4 {
            let value = format!("t{i}");
            assert!(d.linsert(&pivot, &value, InsertPosition::After).unwrap().is_some());
            expected.push(value.clone());
            pivot = value;
        }
        assert_eq!(d.to_vec().unwrap(), expected);
        assert!(d.node_count() > 1);
        assert!(d.nodes.iter().all(|n| n.buf.len() <= n.cap));
        assert_eq!(d.rpop().unwrap(), "t3");
        assert_eq!(d.lpop().unwrap(), "aa");
    }
}
