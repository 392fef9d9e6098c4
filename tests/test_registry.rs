#[cfg(test)]
mod registry_tests {
    use std::{sync::Arc, time::Duration};

    use chrono::Utc;
    use tokio::sync::{mpsc, watch};

    use poe_helper::{
        testing::*,
        trade::{AddOutcome, RegistrySettings, TradeRegistry, TradeState},
        watcher::{default_triggers, LogWatcher, TriggerSet},
    };

    #[tokio::test]
    async fn test_concurrent_writers_and_readers_agree_on_count() {
        let _trace_sub = tracing_subscriber::fmt::try_init();
        let registry = TradeRegistry::default();
        let now = Utc::now();

        let mut writers = Vec::new();
        for worker in 0..8 {
            let registry = registry.clone();
            writers.push(tokio::spawn(async move {
                let mut added = 0;
                for i in 0..50 {
                    // Every worker races for the same 25 pairs
                    let parsed = SomeTestParams::parsed_trade(
                        &format!("Buyer{}", (i + worker) % 25),
                        "Exalted Orb",
                        now,
                    );
                    if let AddOutcome::Added(_) = registry.add_trade(parsed).await {
                        added += 1;
                    }
                }
                added
            }));
        }

        let reader = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let snapshot = registry.list_active().await;
                    assert!(snapshot.len() <= 25);
                    assert!(snapshot.iter().all(|entry| entry.state == TradeState::New));
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut total_added = 0;
        for writer in writers {
            total_added += writer.await.unwrap();
        }
        reader.await.unwrap();

        assert_eq!(total_added, 25);
        assert_eq!(registry.active_count().await, 25);
    }

    #[tokio::test]
    async fn test_sweeper_task_expires_stale_entries() {
        let registry = TradeRegistry::new(RegistrySettings {
            dedup_bucket: Duration::from_secs(60),
            max_age: Duration::from_secs(1),
        });
        let stale = SomeTestParams::parsed_trade(
            "Old",
            "Goldrim",
            Utc::now() - chrono::Duration::seconds(10),
        );
        let stale_id = registry.add_trade(stale).await.trade_id();
        let fresh = SomeTestParams::parsed_trade(
            "New",
            "Goldrim",
            Utc::now() + chrono::Duration::seconds(60),
        );
        let fresh_id = registry.add_trade(fresh).await.trade_id();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = registry.spawn_sweeper(Duration::from_millis(20), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send_replace(true);
        sweeper.await.unwrap();

        assert_eq!(registry.get(stale_id).await.unwrap().state, TradeState::Expired);
        assert_eq!(registry.get(fresh_id).await.unwrap().state, TradeState::New);
    }

    #[tokio::test]
    async fn test_watcher_feeds_registry_in_log_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Client.txt");
        std::fs::write(&path, "").unwrap();
        let context = SomeTestParams::context(&path);
        let triggers = Arc::new(TriggerSet::compile(&default_triggers()).unwrap());

        let registry = TradeRegistry::default();
        let (trade_tx, trade_rx) = mpsc::channel(16);
        let ingest = registry.spawn_ingest(trade_rx);
        let watcher = LogWatcher::new(&context, triggers, trade_tx);
        let access = watcher.new_accessor();

        // First poll takes the starting offset
        tokio::time::sleep(Duration::from_millis(200)).await;

        let lines: String = ["Alpha", "Bravo", "Charlie"]
            .iter()
            .map(|player| format!("{}\n", SomeTestParams::incoming_line(player, "Chaos Orb")))
            .collect();
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        std::io::Write::write_all(&mut file, lines.as_bytes()).unwrap();

        let started = std::time::Instant::now();
        while registry.active_count().await < 3 {
            assert!(started.elapsed() < Duration::from_secs(5));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let players: Vec<String> = registry
            .list_active()
            .await
            .into_iter()
            .map(|entry| entry.player_name)
            .collect();
        assert_eq!(players, vec!["Charlie", "Bravo", "Alpha"]);

        access.shutdown().await.unwrap();
        watcher.task_handle.await.unwrap();
        ingest.await.unwrap();
    }
}
