//! Engine Tests
//!
//! Topic log parsing, partition visibility in the materialized table, and
//! engines restoring topics in one- and two-member clusters.

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::directory::{Member, PartitionDirectory, Partitioner};
    use crate::engine::*;
    use crate::remote::HttpFetchClient;
    use crate::router::{KeyRouter, LookupError};
    use crate::store::LocalStore;
    use std::io::Write;
    use std::net::SocketAddr;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    const TOPIC: &str = "messages";
    const STORE: &str = "key-value-store";
    const NUM_PARTITIONS: u32 = 8;

    fn config(log_dir: &Path, seed_nodes: Vec<SocketAddr>) -> EngineConfig {
        EngineConfig {
            gossip_addr: "127.0.0.1:0".parse().unwrap(),
            seed_nodes,
            log_dir: log_dir.to_path_buf(),
            num_partitions: NUM_PARTITIONS,
            poll_interval: Duration::from_millis(50),
            fetch_timeout: Duration::from_millis(500),
        }
    }

    async fn engine(log_dir: &Path, port: u16, seeds: Vec<SocketAddr>) -> Arc<TableEngine> {
        let engine = TableEngine::new("test-app", Member::new("127.0.0.1", port), config(log_dir, seeds))
            .await
            .expect("engine should start");
        engine.build_table(TOPIC, STORE).unwrap();
        engine
    }

    async fn eventually<F: Fn() -> bool>(check: F, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        check()
    }

    fn read(engine: &TableEngine, key: &str) -> Option<Option<String>> {
        engine
            .local_store_handle(STORE)
            .and_then(|table| table.get_local(key).ok())
    }

    fn append_raw(log: &TopicLog, partition: u32, bytes: &[u8]) {
        let path = log.partition_path(partition);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(bytes).unwrap();
    }

    // ============================================================
    // TOPIC LOG
    // ============================================================

    #[tokio::test]
    async fn test_append_lands_in_key_partition() {
        let dir = tempfile::tempdir().unwrap();
        let log = TopicLog::new(dir.path(), TOPIC, NUM_PARTITIONS);

        let partition = log.append("a", Some("1")).await.unwrap();
        assert_eq!(partition, Partitioner::new(NUM_PARTITIONS).partition_for("a"));
        log.append("b", Some("2")).await.unwrap();
        log.append("a", None).await.unwrap();

        // "a" and "b" share partition 4 with 8 partitions.
        let (records, offset) = log.read_from(4, 0).await.unwrap();
        assert_eq!(
            records,
            vec![
                Record::new("a", Some("1")),
                Record::new("b", Some("2")),
                Record::new("a", None),
            ]
        );

        let (more, next) = log.read_from(4, offset).await.unwrap();
        assert!(more.is_empty());
        assert_eq!(next, offset);
    }

    #[tokio::test]
    async fn test_missing_partition_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = TopicLog::new(dir.path(), TOPIC, NUM_PARTITIONS);

        let (records, offset) = log.read_from(3, 0).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(offset, 0);
    }

    #[tokio::test]
    async fn test_incomplete_line_waits_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let log = TopicLog::new(dir.path(), TOPIC, NUM_PARTITIONS);

        log.append("a", Some("1")).await.unwrap();
        append_raw(&log, 4, br#"{"key":"b","val"#);

        let (records, offset) = log.read_from(4, 0).await.unwrap();
        assert_eq!(records, vec![Record::new("a", Some("1"))]);

        append_raw(&log, 4, b"ue\":\"2\"}\n");
        let (records, _) = log.read_from(4, offset).await.unwrap();
        assert_eq!(records, vec![Record::new("b", Some("2"))]);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = TopicLog::new(dir.path(), TOPIC, NUM_PARTITIONS);

        append_raw(&log, 0, b"not json\n\n{\"key\":\"x\",\"value\":\"y\"}\n");

        let (records, offset) = log.read_from(0, 0).await.unwrap();
        assert_eq!(records, vec![Record::new("x", Some("y"))]);
        assert_eq!(offset, std::fs::metadata(log.partition_path(0)).unwrap().len());
    }

    // ============================================================
    // MATERIALIZED TABLE
    // ============================================================

    #[test]
    fn test_partition_visibility() {
        let table = MaterializedTable::new(STORE, Partitioner::new(NUM_PARTITIONS));

        // "c" hashes to partition 2.
        assert!(table.get_local("c").is_err());

        let records = [Record::new("c", Some("3")), Record::new("e", Some("5"))];
        table.install_partition(2, MaterializedTable::restore(&records));
        assert_eq!(table.get_local("c"), Ok(Some("3".to_string())));
        assert_eq!(table.owned_partitions(), vec![2]);

        assert!(table.apply(2, &Record::new("c", None)));
        assert_eq!(table.get_local("c"), Ok(None));
        assert!(!table.apply(5, &Record::new("other", Some("x"))));
        assert_eq!(table.entry_count(), 1);

        assert!(table.drop_partition(2));
        assert!(table.get_local("e").is_err());
    }

    #[test]
    fn test_restore_replays_in_order() {
        let records = [
            Record::new("k", Some("1")),
            Record::new("k", Some("2")),
            Record::new("gone", Some("x")),
            Record::new("gone", None),
        ];
        let data = MaterializedTable::restore(&records);

        assert_eq!(data.get("k").map(|v| v.clone()), Some("2".to_string()));
        assert!(data.get("gone").is_none());
    }

    // ============================================================
    // ENGINE LIFECYCLE
    // ============================================================

    #[tokio::test]
    async fn test_engine_before_start_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 18080, vec![]).await;

        assert!(!engine.is_ready());
        assert!(engine.locate_owner(STORE, "a", string_key_encoder).is_none());
        assert!(engine.local_store_handle(STORE).is_none());
        assert!(engine.list_all_members(STORE).is_empty());

        let store = EngineStore::new(engine.clone(), STORE);
        assert!(store.get_local("a").is_err());
        let directory = EngineDirectory::new(engine.clone(), STORE);
        assert!(directory.locate_owner("a").is_none());

        engine.close().await;
    }

    #[tokio::test]
    async fn test_build_table_rejects_duplicates_and_late_registration() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 18080, vec![]).await;

        assert!(engine.build_table("other-topic", STORE).is_err());
        let view = engine.build_table("other-topic", "other-store").unwrap();
        assert_eq!(view.topic, "other-topic");
        assert_eq!(view.store_name, "other-store");

        engine.start().await;
        assert!(engine.build_table("late", "late-store").is_err());
        engine.close().await;
    }

    #[tokio::test]
    async fn test_single_member_materializes_topic() {
        let dir = tempfile::tempdir().unwrap();
        let log = TopicLog::new(dir.path(), TOPIC, NUM_PARTITIONS);
        log.append("a", Some("1")).await.unwrap();
        log.append("c", Some("3")).await.unwrap();
        log.append("c", None).await.unwrap();

        let engine = engine(dir.path(), 18080, vec![]).await;
        let local = engine.local_member().clone();
        engine.start().await;

        assert!(
            eventually(|| read(&engine, "a") == Some(Some("1".to_string())), Duration::from_secs(3)).await,
            "restore did not finish"
        );
        assert_eq!(read(&engine, "c"), Some(None));
        assert_eq!(engine.locate_owner(STORE, "a", string_key_encoder), Some(local.clone()));
        assert!(engine.locate_owner("unknown-store", "a", string_key_encoder).is_none());

        let members = engine.list_all_members(STORE);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].member, local);
        assert_eq!(members[0].partitions, (0..NUM_PARTITIONS).collect::<Vec<_>>());

        // New records are tailed.
        log.append("d", Some("4")).await.unwrap();
        log.append("a", Some("one")).await.unwrap();
        assert!(
            eventually(
                || read(&engine, "d") == Some(Some("4".to_string()))
                    && read(&engine, "a") == Some(Some("one".to_string())),
                Duration::from_secs(3)
            )
            .await
        );

        engine.close().await;
        assert!(engine.local_store_handle(STORE).is_none());
        assert!(engine.locate_owner(STORE, "a", string_key_encoder).is_none());
    }

    #[tokio::test]
    async fn test_router_over_engine() {
        let dir = tempfile::tempdir().unwrap();
        let log = TopicLog::new(dir.path(), TOPIC, NUM_PARTITIONS);
        log.append("b", Some("2")).await.unwrap();

        let engine = engine(dir.path(), 18080, vec![]).await;
        let router = KeyRouter::new(
            engine.local_member().clone(),
            Arc::new(EngineDirectory::new(engine.clone(), STORE)),
            Arc::new(EngineStore::new(engine.clone(), STORE)),
            Arc::new(HttpFetchClient::new().unwrap()),
            Duration::from_millis(500),
        );

        assert!(matches!(router.route("b").await, Err(LookupError::Unavailable(_))));

        engine.start().await;
        assert!(eventually(|| read(&engine, "b").is_some(), Duration::from_secs(3)).await);

        let found = router.route("b").await.unwrap();
        assert_eq!(found.value, "2");
        assert!(matches!(router.route("missing").await, Err(LookupError::NotFound)));

        engine.close().await;
        assert!(matches!(router.route("b").await, Err(LookupError::Unavailable(_))));
    }

    // ============================================================
    // TWO-MEMBER CLUSTER
    // ============================================================

    #[tokio::test]
    async fn test_two_members_split_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let log = TopicLog::new(dir.path(), TOPIC, NUM_PARTITIONS);
        for (key, value) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5")] {
            log.append(key, Some(value)).await.unwrap();
        }

        let first = engine(dir.path(), 18080, vec![]).await;
        first.start().await;
        let second = engine(dir.path(), 18081, vec![first.membership().local_node.gossip_addr]).await;
        second.start().await;

        let converged = eventually(
            || {
                let view = first.list_all_members(STORE);
                view.len() == 2 && view == second.list_all_members(STORE)
            },
            Duration::from_secs(5),
        )
        .await;
        assert!(converged, "members did not agree on the assignment");

        // Sorted by port: even partitions on 18080, odd ones on 18081.
        let view = first.list_all_members(STORE);
        assert_eq!(view[0].member.port, 18080);
        assert_eq!(view[0].partitions, vec![0, 2, 4, 6]);
        assert_eq!(view[1].partitions, vec![1, 3, 5, 7]);

        let engines = [first.clone(), second.clone()];
        for (key, value) in [("a", "1"), ("c", "3"), ("d", "4")] {
            let owner = first.locate_owner(STORE, key, string_key_encoder).unwrap();
            assert_eq!(second.locate_owner(STORE, key, string_key_encoder), Some(owner.clone()));

            let (owning, other): (Vec<_>, Vec<_>) =
                engines.iter().partition(|e| e.local_member() == &owner);
            assert!(
                eventually(|| read(&owning[0], key) == Some(Some(value.to_string())), Duration::from_secs(3)).await,
                "{} not served by its owner {}",
                key,
                owner
            );
            assert!(
                eventually(|| read(&other[0], key).is_none(), Duration::from_secs(3)).await,
                "{} still served by a non-owner",
                key
            );
        }

        second.close().await;
        first.close().await;
    }
}
