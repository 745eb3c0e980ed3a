use std::sync::Arc;

use zkv::{
    database::FieldMap, dump, restore, DequeOps, EngineError, EngineSettings, InsertOutcome,
    ManualClock, Object, ObjectEncoding, ObjectStore, ObjectType, PutOptions, StatusCode, Value,
};

const START: u64 = 1_700_000_000_000;

fn store() -> (ObjectStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    (ObjectStore::with_clock(EngineSettings::default(), clock.clone()), clock)
}

/// Тест проходит путь очереди: создание, изменение на месте, DUMP и
/// RESTORE в другое хранилище.
#[test]
fn test_deque_lifecycle_across_stores() {
    let (mut src, _) = store();
    let deque = src.new_deque().unwrap();
    src.put("jobs", Object::from_value(Value::Deque(deque)), PutOptions::default());

    {
        let obj = src
            .get_typed("jobs", ObjectType::ByteList, ObjectEncoding::Deque)
            .unwrap()
            .unwrap();
        let jobs = obj.as_deque_mut().unwrap();
        for i in 0..500 {
            jobs.rpush(&format!("job-{i}")).unwrap();
        }
        jobs.lpush("42").unwrap();
        assert_eq!(jobs.linsert("job-0", "urgent", zkv::InsertPosition::Before).unwrap(), Some(502));
        assert_eq!(jobs.linsert("nope", "x", zkv::InsertPosition::After).unwrap(), None);
    }

    let bytes = dump(src.get_no_touch("jobs").unwrap()).unwrap();
    let (mut dst, _) = store();
    dst.put("jobs", restore(&bytes).unwrap(), PutOptions::default());

    let jobs = dst.get("jobs").unwrap().as_deque().unwrap();
    assert_eq!(jobs.len(), 502);
    assert_eq!(jobs.lrange(0, 2).unwrap(), vec!["42", "urgent", "job-0"]);
    assert_eq!(jobs.lrange(-1, -1).unwrap(), vec!["job-499"]);
    assert!(jobs.node_count() > 1);
}

#[test]
fn test_filters_through_store() {
    let (mut s, _) = store();
    let bloom = s.new_bloom_filter().unwrap();
    let cuckoo = s.new_cuckoo_filter().unwrap();
    let cms = s.new_count_min_sketch().unwrap();
    s.put("seen", Object::from_value(Value::Bloom(bloom)), PutOptions::default());
    s.put("cache", Object::from_value(Value::Cuckoo(cuckoo)), PutOptions::default());
    s.put("freq", Object::from_value(Value::Cms(cms)), PutOptions::default());

    for i in 0..200 {
        let item = format!("user:{i}");
        s.get("seen").unwrap().as_bloom_mut().unwrap().add(item.as_bytes()).unwrap();
        assert_eq!(
            s.get("cache").unwrap().as_cuckoo_mut().unwrap().add(item.as_bytes()).unwrap(),
            InsertOutcome::Inserted
        );
        s.get("freq").unwrap().as_cms_mut().unwrap().incr_by(b"hot", 2);
    }

    for key in ["seen", "cache", "freq"] {
        let bytes = dump(s.get_no_touch(key).unwrap()).unwrap();
        let restored = restore(&bytes).unwrap();
        assert_eq!(restored.value(), s.get_no_touch(key).unwrap().value());
    }

    let cuckoo = s.get("cache").unwrap().as_cuckoo_mut().unwrap();
    assert!(cuckoo.contains(b"user:7").unwrap());
    assert!(cuckoo.remove(b"user:7").unwrap());
    assert_eq!(cuckoo.info().items_deleted, 1);

    let freq = s.get("freq").unwrap().as_cms().unwrap();
    assert!(freq.query(b"hot") >= 400);
    assert_eq!(freq.total_count(), 400);

    assert!(matches!(
        s.get("seen").unwrap().as_cuckoo(),
        Err(EngineError::WrongTypeOperation { .. })
    ));
}

/// Тест проверяет, что срок поля живёт независимо от срока ключа.
#[test]
fn test_field_map_and_key_expiry() {
    let (mut s, clock) = store();
    let obj = s
        .new_obj(
            Value::FieldMap(Default::default()),
            Some(10_000),
            ObjectType::Hash,
            ObjectEncoding::ExpiringHash,
        )
        .unwrap();
    s.put("session", obj, PutOptions::default());

    let now = s.now_ms();
    {
        let fields = s.get("session").unwrap().as_field_map_mut().unwrap();
        fields.set_at("user", "alice", now);
        fields.set_with_expiry_at("token", "t-1", 500, now);
    }

    clock.advance(500);
    let now = s.now_ms();
    let fields = s.get("session").unwrap().as_field_map_mut().unwrap();
    assert_eq!(fields.get_at("token", now), None);
    assert_eq!(fields.keys_at(now), vec!["user"]);

    clock.advance(9_500);
    assert!(s.get("session").is_none());
}

#[test]
fn test_restore_rejects_tampered_dump() {
    let obj = Object::from_value(Value::from_string("payload"));
    let mut bytes = dump(&obj).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    let err = restore(&bytes).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::ChecksumMismatch);
}

#[test]
fn test_integer_strings_use_int_encoding() {
    let (mut s, _) = store();
    s.put("n", Object::from_value(Value::from_string("-17")), PutOptions::default());
    s.put("s", Object::from_value(Value::from_string("017")), PutOptions::default());
    assert_eq!(s.get("n").unwrap().encoding(), ObjectEncoding::Int);
    assert_eq!(s.get("s").unwrap().encoding(), ObjectEncoding::Raw);
}

/// Тест проверяет JSON-форму сводок `*.INFO`.
#[test]
fn test_info_summaries_serialize_to_json() {
    let mut cms = zkv::CountMinSketch::new(2, 10).unwrap();
    cms.incr_by(b"a", 3);
    let json = serde_json::to_value(cms.info()).unwrap();
    assert_eq!(json, serde_json::json!({"width": 10, "depth": 2, "count": 3}));

    let bloom = zkv::BloomFilter::new(zkv::BloomOptions::default()).unwrap();
    let json = serde_json::to_value(bloom.info()).unwrap();
    assert_eq!(json["capacity"], 1024);
    assert_eq!(json["hash_functions"], 7);
    assert_eq!(json["items_inserted"], 0);
}
