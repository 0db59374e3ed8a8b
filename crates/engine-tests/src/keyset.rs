#[cfg(test)]
mod tests {
    use crate::{open, private_settings, version};
    use connectors::DbError;
    use engine_core::{error::QueryError, session::SchemaSession};
    use model::{core::value::Value, pagination::page::KeysetConnection};
    use planner::keyset::{ContinueQuery, Keyset, StartQuery};
    use tracing_test::traced_test;

    const COLUMNS: [&str; 3] = ["id", "tags", "message"];

    /// A private schema set up at 0.3, then stepped to 1.0 so `test` holds
    /// its 463 seeded rows.
    async fn seeded_session() -> SchemaSession {
        let session = open(private_settings("keyset", "0.3")).await;
        session.migrate().await.expect("set up at 0.3");
        session
            .coordinator()
            .migrate_to(version("1.0"))
            .await
            .expect("migrate to 1.0");
        session
    }

    fn ids(page: &KeysetConnection) -> Vec<i64> {
        page.rows()
            .map(|row| row.value_of("id").and_then(Value::as_i64).expect("id"))
            .collect()
    }

    async fn fetch(session: &SchemaSession, keyset: Keyset) -> KeysetConnection {
        session.keyset().query(&keyset).await.expect("keyset page")
    }

    fn test_table() -> Keyset {
        Keyset::new("test").select(COLUMNS)
    }

    // Scenario: a single row read from the start of the table.
    // Expected Outcome: the total covers every row and only a next page exists.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn first_row_reports_totals() {
        let session = seeded_session().await;

        let keyset = test_table()
            .start(StartQuery::new("id").first(1))
            .expect("start query");
        let page = fetch(&session, keyset).await;

        assert_eq!(ids(&page), vec![1]);
        assert_eq!(page.page_info.total_count, 463);
        assert!(page.page_info.has_next_page);
        assert!(!page.page_info.has_prev_page);

        session.close().await.expect("close session");
    }

    // Scenario: the last ten rows, with and without naming `last` explicitly.
    // Expected Outcome: both read the newest ids in descending order.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn last_rows_read_newest_first() {
        let session = seeded_session().await;

        let explicit = test_table()
            .start(StartQuery::new("id").last(10))
            .expect("start query");
        let page = fetch(&session, explicit).await;

        assert_eq!(ids(&page), (454..=463).rev().collect::<Vec<_>>());
        assert_eq!(page.page_info.total_count, 463);
        assert!(page.page_info.has_next_page);
        assert!(!page.page_info.has_prev_page);

        let defaulted = test_table()
            .start(StartQuery::new("id").default_last(true))
            .expect("start query");
        let page = fetch(&session, defaulted).await;

        assert_eq!(ids(&page), (444..=463).rev().collect::<Vec<_>>());
        assert!(page.page_info.has_next_page);
        assert!(!page.page_info.has_prev_page);

        session.close().await.expect("close session");
    }

    // Scenario: walk forward one page from a cursor, then back again.
    // Expected Outcome: the backward page equals the first one, in the same order.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn cursors_walk_both_ways() {
        let session = seeded_session().await;

        let first = fetch(
            &session,
            test_table()
                .start(StartQuery::new("id").first(10))
                .expect("start query"),
        )
        .await;
        assert_eq!(ids(&first), (1..=10).collect::<Vec<_>>());

        let cursor = first.end_cursor().expect("end cursor");
        let second = fetch(
            &session,
            test_table()
                .continue_from(cursor, ContinueQuery::next(10))
                .expect("continue query"),
        )
        .await;
        assert_eq!(ids(&second), (11..=20).collect::<Vec<_>>());
        assert!(second.page_info.has_next_page);
        assert!(second.page_info.has_prev_page);

        let cursor = second.start_cursor().expect("start cursor");
        let back = fetch(
            &session,
            test_table()
                .continue_from(cursor, ContinueQuery::prev(10))
                .expect("continue query"),
        )
        .await;
        assert_eq!(ids(&back), ids(&first));
        assert!(back.page_info.has_next_page);
        assert!(!back.page_info.has_prev_page);

        session.close().await.expect("close session");
    }

    // Scenario: rank rows by trigram similarity of their message.
    // Expected Outcome: only the rows rewritten by the 1.0 post migration match.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn search_ranks_similar_messages() {
        let session = seeded_session().await;

        let keyset = test_table()
            .start(StartQuery::new("message").search("hello").first(20))
            .expect("start query");
        let page = fetch(&session, keyset).await;

        let mut found = ids(&page);
        found.sort_unstable();
        assert_eq!(found, vec![100, 200, 300, 400]);
        for row in page.rows() {
            let message = row.value_of("message").and_then(Value::as_str);
            assert!(message.is_some_and(|m| m.starts_with("hello")));
        }

        session.close().await.expect("close session");
    }

    // Scenario: an equality filter narrows the page and the total.
    // Expected Outcome: only rows with id % 3 = 1 are counted.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn filters_narrow_the_total() {
        let session = seeded_session().await;

        let keyset = test_table()
            .raw_where("tags @> array['tag1']")
            .start(StartQuery::new("id").first(5))
            .expect("start query");
        let page = fetch(&session, keyset).await;

        assert_eq!(ids(&page), vec![1, 4, 7, 10, 13]);
        assert_eq!(page.page_info.total_count, 155);
        assert!(page.page_info.has_next_page);

        session.close().await.expect("close session");
    }

    // Scenario: continue past the final page, and filter on a value no row has.
    // Expected Outcome: empty pages report neither a next nor a previous page.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn empty_pages_have_no_neighbours() {
        let session = seeded_session().await;

        let tail = || test_table().raw_where("id > 455");
        let last = fetch(
            &session,
            tail().start(StartQuery::new("id").first(10)).expect("start query"),
        )
        .await;
        assert_eq!(ids(&last), (456..=463).collect::<Vec<_>>());
        assert!(!last.page_info.has_next_page);

        let cursor = last.end_cursor().expect("end cursor");
        let past_end = fetch(
            &session,
            tail()
                .continue_from(cursor, ContinueQuery::next(10))
                .expect("continue query"),
        )
        .await;
        assert!(past_end.edges.is_empty());
        assert_eq!(past_end.page_info.total_count, 8);
        assert!(!past_end.page_info.has_next_page);
        assert!(!past_end.page_info.has_prev_page);

        let nothing = fetch(
            &session,
            test_table()
                .where_eq("id", -1)
                .start(StartQuery::new("id").first(10))
                .expect("start query"),
        )
        .await;
        assert!(nothing.edges.is_empty());
        assert_eq!(nothing.page_info.total_count, 0);
        assert!(!nothing.page_info.has_next_page);
        assert!(!nothing.page_info.has_prev_page);

        session.close().await.expect("close session");
    }

    // Scenario: the page reads fine but its boundary check compares the id
    // column with text the page selected under that name.
    // Expected Outcome: the query fails, its transaction is rolled back and
    // the session keeps serving pages.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn failed_boundary_check_rolls_back() {
        let session = seeded_session().await;

        let broken = Keyset::new("test")
            .select(["'not a number' as id"])
            .start(StartQuery::new("id").first(5))
            .expect("start query");
        let err = session
            .keyset()
            .query(&broken)
            .await
            .expect_err("boundary check on a text seek value");
        assert!(matches!(err, QueryError::Database(_)));

        let page = fetch(
            &session,
            test_table()
                .start(StartQuery::new("id").first(2))
                .expect("start query"),
        )
        .await;
        assert_eq!(ids(&page), vec![1, 2]);

        session.close().await.expect("close session");
    }

    // Scenario: an integer array column next to an interval column, which has
    // no value mapping.
    // Expected Outcome: the array reads as a JSON array, the interval fails
    // with a decode error naming its column.
    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a running postgres"]
    async fn unsupported_columns_fail_to_decode() {
        let session = seeded_session().await;
        let db = session.database();

        let rows = db
            .query("SELECT array[1, null, 3]::int4[] AS nums", vec![])
            .await
            .expect("int array");
        match rows[0].value_of("nums") {
            Some(Value::Json(json)) => assert_eq!(json.to_string(), "[1,null,3]"),
            other => panic!("expected a JSON array, got {other:?}"),
        }

        let err = db
            .query("SELECT '1 day'::interval AS span", vec![])
            .await
            .expect_err("interval has no value mapping");
        match err {
            DbError::Decode { column, type_name, .. } => {
                assert_eq!(column, "span");
                assert_eq!(type_name, "interval");
            }
            other => panic!("expected a decode error, got {other}"),
        }

        session.close().await.expect("close session");
    }
}
