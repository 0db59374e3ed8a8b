#[cfg(test)]
mod tests {
    use crate::{
        drop_shared, open, private_settings, row_count, shared_settings, unique_base, version,
    };
    use engine_core::{
        error::MigrationError,
        migration::{
            coordinator::SyncOutcome, events::MigrationEvent, store::VersionStore,
            tester::MigrationTester,
        },
    };
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    // Scenario: two processes start at the same version against an empty schema.
    // Expected Outcome: exactly one sets the schema up, the data is seeded once.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn concurrent_setup_runs_once() {
        let base = unique_base("concurrent");
        let db1 = open(shared_settings(&base, "0.4")).await;
        let db2 = open(shared_settings(&base, "0.4")).await;

        let (first, second) = tokio::join!(db1.migrate(), db2.migrate());
        let mut outcomes = vec![first.expect("db1 migrate"), second.expect("db2 migrate")];
        outcomes.retain(|outcome| *outcome != SyncOutcome::Created);

        assert_eq!(outcomes.len(), 1, "exactly one process sets up the schema");
        assert!(matches!(
            outcomes[0],
            SyncOutcome::Deferred | SyncOutcome::UpToDate
        ));
        assert_eq!(row_count(&db1, "test").await, 463);
        assert_eq!(
            db2.store().current_version().await.expect("current version"),
            Some(version("0.4"))
        );

        drop(db2);
        drop_shared(db1).await;
    }

    // Scenario: an old process is mid setup when a newer one starts.
    // Expected Outcome: the newer one waits, then steps the schema up.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn newer_process_waits_then_steps_up() {
        let base = unique_base("stepping");
        let db1 = open(shared_settings(&base, "0.2")).await;
        let db2 = open(shared_settings(&base, "1.0")).await;
        let mut events = db1.coordinator().subscribe();

        let newer = async {
            loop {
                match events.recv().await.expect("db1 events") {
                    MigrationEvent::Started { .. } => break,
                    _ => continue,
                }
            }
            db2.migrate().await
        };
        let (old, new) = tokio::join!(db1.migrate(), newer);

        assert_eq!(old.expect("db1 migrate"), SyncOutcome::Created);
        assert_eq!(
            new.expect("db2 migrate"),
            SyncOutcome::Migrated {
                from: version("0.2")
            }
        );
        assert_eq!(
            db2.store().current_version().await.expect("current version"),
            Some(version("1.0"))
        );
        assert_eq!(row_count(&db2, "test").await, 463);

        drop(db2);
        drop_shared(db1).await;
    }

    // Scenario: a process built for 49.12 meets a schema deployed at 50.2.
    // Expected Outcome: it refuses to run against the newer schema.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn older_process_rejects_newer_schema() {
        let base = unique_base("ahead");
        let newer = open(shared_settings(&base, "50.2")).await;
        assert_eq!(
            newer.migrate().await.expect("set up at 50.2"),
            SyncOutcome::Created
        );

        let older = open(shared_settings(&base, "49.12")).await;
        let err = older.migrate().await.expect_err("schema is ahead");

        assert!(matches!(err, MigrationError::SchemaAhead { .. }));
        assert_eq!(
            err.to_string(),
            "App db version 49.12 too low for installed db version 50.2"
        );

        drop(older);
        drop_shared(newer).await;
    }

    // Scenario: stepping to a version whose pre migration is broken.
    // Expected Outcome: the script error surfaces and the version lock is released.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn broken_pre_migration_releases_the_lock() {
        let session = open(private_settings("broken", "0.2")).await;
        session.migrate().await.expect("set up at 0.2");

        let err = session
            .coordinator()
            .migrate_to(version("500.1"))
            .await
            .expect_err("broken pre migration");

        match &err {
            MigrationError::Script { version: v, .. } => assert_eq!(*v, version("500.1")),
            other => panic!("expected a script error, got {other:?}"),
        }
        assert!(
            session
                .store()
                .in_progress()
                .await
                .expect("in progress")
                .is_empty()
        );
        assert_eq!(
            session.coordinator().current_version().await.expect("current version"),
            Some(version("0.2"))
        );

        session.close().await.expect("close session");
    }

    // Scenario: the same process migrates twice to the same target.
    // Expected Outcome: the second run is a no-op.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn repeated_migration_is_up_to_date() {
        let session = open(private_settings("repeat", "1.0")).await;

        assert_eq!(session.migrate().await.expect("set up"), SyncOutcome::Created);
        assert_eq!(session.migrate().await.expect("rerun"), SyncOutcome::UpToDate);

        session.close().await.expect("close session");
    }

    // Scenario: step a schema from 0.1 to 1.0 and set another up directly at 1.0.
    // Expected Outcome: both end with the same tables, columns, indexes and types,
    // and neither scratch schema is left behind.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn stepped_schema_matches_fresh_setup() {
        let base = unique_base("shape");
        let migrated = format!("{base}_migrated");
        let created = format!("{base}_created");
        let settings = shared_settings(&base, "1.0");

        let report = MigrationTester::new(&settings, version("0.1"), version("1.0"))
            .with_schema_bases(&migrated, &created)
            .run(CancellationToken::new())
            .await
            .expect("migration test");

        assert!(report.is_consistent(), "{:?}", report.mismatches);
        let columns = report.created.tables.get("test").expect("test table");
        assert!(columns.iter().any(|line| line.starts_with("column message text")));
        assert!(columns.iter().any(|line| line.starts_with("index test_message_idx")));
        assert!(report.migrated.tables.contains_key("version"));

        let checker = open(shared_settings(&base, "1.0")).await;
        let leftover = checker
            .database()
            .query(
                "SELECT nspname::text FROM pg_namespace WHERE nspname::text IN ($1, $2)",
                vec![migrated.into(), created.into()],
            )
            .await
            .expect("list schemas");
        assert!(leftover.is_empty());
        drop_shared(checker).await;
    }
}
