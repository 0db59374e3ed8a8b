//! Statement assembly and cursor tests for the keyset builder.

use model::{
    core::value::Value,
    pagination::params::{SeekDirection, SeekParam},
    records::row::RowData,
};
use planner::keyset::{ContinueQuery, Keyset, KeysetError, StartQuery};

fn test_keyset() -> Keyset {
    Keyset::new("test")
}

#[test]
fn test_seek_after_statement() {
    let sql = test_keyset().seek(SeekParam::new("id").value(1)).to_sql();
    assert_eq!(
        sql,
        r#"SELECT "test".* FROM "test" WHERE "test"."id" is not null AND "test"."id" > '1' ORDER BY "test"."id" ASC LIMIT 20"#
    );
}

#[test]
fn test_seek_before_reads_towards_the_cursor() {
    let sql = test_keyset()
        .seek(SeekParam::new("id").value(1))
        .before()
        .to_sql();
    assert_eq!(
        sql,
        r#"SELECT "test".* FROM "test" WHERE "test"."id" is not null AND "test"."id" < '1' ORDER BY "test"."id" DESC LIMIT 20"#
    );
}

#[test]
fn test_filters_follow_seeks_and_raw_clauses_lead() {
    let sql = test_keyset()
        .raw_where("id > 0")
        .raw_order("id asc nulls last")
        .not_null("message")
        .intersect("tags", vec!["b".into()])
        .where_eq("id", 1)
        .in_values("id", vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        .seek(SeekParam::new("id").desc(true))
        .limit(5)
        .to_sql();
    assert_eq!(
        sql,
        concat!(
            r#"SELECT "test".* FROM "test" WHERE id > 0 AND "test"."id" is not null"#,
            r#" AND "id" IN ('1','2','3') AND "test"."id" = '1' AND "tags" && ARRAY['b']"#,
            r#" AND "test"."message" IS NOT NULL"#,
            r#" ORDER BY "test"."id" DESC, id asc nulls last LIMIT 5"#
        )
    );
}

#[test]
fn test_most_recent_seek_sorts_first() {
    let sql = test_keyset()
        .seek(SeekParam::new("id"))
        .seek(SeekParam::new("created_at").desc(true))
        .to_sql();
    assert!(sql.ends_with(r#"ORDER BY "test"."created_at" DESC, "test"."id" ASC LIMIT 20"#));
}

#[test]
fn test_select_joins_and_group_by() {
    let sql = test_keyset()
        .select(["test.id", "count(other.id) as others"])
        .raw_join("left join other on other.test_id = test.id")
        .raw_group_by("test.id")
        .seek(SeekParam::new("id"))
        .to_sql();
    assert_eq!(
        sql,
        concat!(
            r#"SELECT test.id, count(other.id) as others FROM "test" left join other on other.test_id = test.id"#,
            r#" WHERE "test"."id" is not null GROUP BY test.id ORDER BY "test"."id" ASC LIMIT 20"#
        )
    );
}

#[test]
fn test_search_seek_selects_similarity_next_to_all_columns() {
    let sql = test_keyset()
        .start(StartQuery::new("message").search("a").first(3))
        .unwrap()
        .to_sql();
    assert!(sql.starts_with(r#"SELECT "test".*, similarity("test"."message", 'a') as sml FROM"#));
    assert!(sql.contains(r#"similarity("test"."message", 'a') > '0.01'"#));
    assert!(sql.contains(r#"ORDER BY similarity("test"."message", 'a') DESC LIMIT 3"#));

    let long = test_keyset()
        .start(StartQuery::new("message").search("abcd"))
        .unwrap()
        .to_sql();
    assert!(long.contains(r#"> '0.2'"#));
}

#[test]
fn test_total_count_ignores_seeks() {
    let keyset = test_keyset()
        .seek(SeekParam::new("id").value(10))
        .where_eq("message", "hi")
        .raw_where("id < 400");
    assert_eq!(
        keyset.total_count_sql(),
        r#"SELECT count(*)::int FROM "test" WHERE id < 400 AND "test"."message" = 'hi'"#
    );
    assert_eq!(
        test_keyset().total_count_sql(),
        r#"SELECT count(*)::int FROM "test""#
    );
}

#[test]
fn test_start_rejects_first_and_last() {
    let err = test_keyset()
        .start(StartQuery::new("id").first(1).last(1))
        .unwrap_err();
    assert!(matches!(err, KeysetError::InvalidQuery("first", "last")));
    assert!(err.to_string().contains("`first` and `last`"));
}

#[test]
fn test_start_direction_defaults() {
    let first = test_keyset().start(StartQuery::new("id").first(5)).unwrap();
    assert!(!first.primary_seek().unwrap().desc);
    assert_eq!(first.page_size(), 5);

    let last = test_keyset().start(StartQuery::new("id").last(10)).unwrap();
    assert!(last.primary_seek().unwrap().desc);

    let search_first = test_keyset()
        .start(StartQuery::new("message").search("x").first(5))
        .unwrap();
    assert!(search_first.primary_seek().unwrap().desc);

    let search_last = test_keyset()
        .start(StartQuery::new("message").search("x").last(5))
        .unwrap();
    assert!(!search_last.primary_seek().unwrap().desc);

    let explicit = test_keyset()
        .start(StartQuery::new("id").last(5).desc(false))
        .unwrap();
    assert!(!explicit.primary_seek().unwrap().desc);
}

#[test]
fn test_start_falls_back_to_default_page_size() {
    let keyset = test_keyset().start(StartQuery::new("id")).unwrap();
    assert_eq!(keyset.page_size(), 20);
    assert!(!keyset.primary_seek().unwrap().desc);

    let keyset = test_keyset()
        .start(StartQuery::new("id").default_last(true))
        .unwrap();
    assert_eq!(keyset.page_size(), 20);
    assert!(keyset.primary_seek().unwrap().desc);
}

#[test]
fn test_cursor_round_trip_reproduces_sql() {
    let keyset = test_keyset()
        .seek(
            SeekParam::new("id")
                .value(0)
                .search("my search query"),
        )
        .not_null("id")
        .in_values("id", vec![Value::Int(1), Value::Int(2)])
        .where_eq("id", 1)
        .intersect("tags", vec!["a".into()]);

    let restored = test_keyset().with_cursor(&keyset.to_cursor().unwrap()).unwrap();
    assert_eq!(keyset.to_sql(), restored.to_sql());
}

#[test]
fn test_cursor_round_trip_with_text_values() {
    let keyset = test_keyset()
        .seek(SeekParam::new("created_at").value("2021-03-04T05:06:07Z").desc(true))
        .seek(SeekParam::new("group_id").maybe_equal(4).value(4))
        .where_eq("message", "it's")
        .is_null("deleted_at");

    let restored = test_keyset().with_cursor(&keyset.to_cursor().unwrap()).unwrap();
    assert_eq!(keyset.to_sql(), restored.to_sql());
}

#[test]
fn test_continue_keeps_seek_params() {
    let keyset = test_keyset()
        .seek(SeekParam::new("id").value(1).desc(true))
        .is_null("id");
    let cursor = keyset.to_cursor().unwrap();

    let next = test_keyset()
        .continue_from(&cursor, ContinueQuery::next(1))
        .unwrap();
    let prev = test_keyset()
        .continue_from(&cursor, ContinueQuery::prev(1))
        .unwrap();

    let expected: Vec<_> = keyset.seek_params().cloned().collect();
    assert_eq!(next.seek_params().cloned().collect::<Vec<_>>(), expected);
    assert_eq!(prev.seek_params().cloned().collect::<Vec<_>>(), expected);
    assert_eq!(next.direction(), SeekDirection::After);
    assert_eq!(prev.direction(), SeekDirection::Before);
    assert_eq!(next.page_size(), 1);
}

#[test]
fn test_continue_defaults_and_conflicts() {
    let cursor = test_keyset().seek(SeekParam::new("id").value(3)).to_cursor().unwrap();

    let keyset = test_keyset()
        .continue_from(&cursor, ContinueQuery::default())
        .unwrap();
    assert_eq!(keyset.page_size(), 20);
    assert_eq!(keyset.direction(), SeekDirection::After);

    let both = ContinueQuery {
        next: Some(1),
        prev: Some(1),
    };
    assert!(matches!(
        test_keyset().continue_from(&cursor, both),
        Err(KeysetError::InvalidQuery("next", "prev"))
    ));
}

#[test]
fn test_continue_with_bad_cursor() {
    assert!(matches!(
        test_keyset().continue_from("not a cursor!", ContinueQuery::next(1)),
        Err(KeysetError::CursorDecode(_))
    ));
}

#[test]
fn test_from_row_does_not_touch_the_original() {
    let keyset = test_keyset().seek(SeekParam::new("id"));
    let row = RowData::from_pairs("test", [("id", Value::Int(1))]);

    let positioned = keyset.from_row(&row);
    assert_eq!(keyset.primary_seek().unwrap().value, None);
    assert_eq!(positioned.primary_seek().unwrap().value, Some(Value::Int(1)));
}

#[test]
fn test_from_row_reads_similarity_and_qualified_columns() {
    let keyset = test_keyset()
        .seek(SeekParam::new("message").search("abc"))
        .seek(SeekParam::new("other.rank"));
    let row = RowData::from_pairs(
        "test",
        [("sml", Value::Float(0.5)), ("rank", Value::Int(7))],
    );

    let positioned = keyset.from_row(&row);
    let values: Vec<_> = positioned.seek_params().map(|s| s.value.clone()).collect();
    assert_eq!(values, vec![Some(Value::Float(0.5)), Some(Value::Int(7))]);
}

#[test]
fn test_probes_are_skipped_without_a_seek_value() {
    let keyset = test_keyset().start(StartQuery::new("id").first(1)).unwrap();

    let with_id = RowData::from_pairs("test", [("id", Value::Int(1))]);
    let next = keyset.next_probe(&with_id).unwrap();
    assert!(next.contains(r#""test"."id" > '1'"#));
    assert!(next.ends_with("LIMIT 1"));
    let prev = keyset.prev_probe(&with_id).unwrap();
    assert!(prev.contains(r#""test"."id" < '1'"#));

    let without = RowData::from_pairs("test", [("id", Value::Null)]);
    assert!(keyset.next_probe(&without).is_none());
    assert!(keyset.prev_probe(&without).is_none());
}

#[test]
fn test_edges_carry_row_cursors() {
    let keyset = test_keyset().seek(SeekParam::new("id"));
    let rows = vec![
        RowData::from_pairs("test", [("id", Value::Int(1))]),
        RowData::from_pairs("test", [("id", Value::Int(2))]),
    ];
    let edges = keyset.edges(rows).unwrap();
    assert_eq!(edges.len(), 2);

    let resumed = test_keyset()
        .continue_from(&edges[1].cursor, ContinueQuery::next(10))
        .unwrap();
    assert_eq!(resumed.primary_seek().unwrap().value, Some(Value::Int(2)));
}

#[test]
fn test_cursor_round_trip_with_jsonb_and_text_array_filters() {
    let keyset = test_keyset()
        .where_eq("meta", Value::Json(serde_json::json!(["a"])))
        .where_eq("kind", Value::Json(serde_json::json!("x")))
        .where_eq("tags", Value::StringArray(vec!["a".into(), "b".into()]))
        .in_values("doc", vec![Value::Json(serde_json::json!({"k": 1}))])
        .seek(SeekParam::new("id").value(3));

    let sql = keyset.to_sql();
    assert!(sql.contains(r#""test"."meta" = '["a"]'::jsonb"#));
    assert!(sql.contains(r#""test"."kind" = '"x"'"#));

    let restored = test_keyset().with_cursor(&keyset.to_cursor().unwrap()).unwrap();
    assert_eq!(restored.to_sql(), sql);
}

#[test]
fn test_edges_on_array_seek_can_be_continued() {
    let keyset = test_keyset().seek(SeekParam::new("tags"));
    let rows = vec![RowData::from_pairs(
        "test",
        [("tags", Value::StringArray(vec!["a".into()]))],
    )];
    let edges = keyset.edges(rows).unwrap();

    let resumed = test_keyset()
        .continue_from(&edges[0].cursor, ContinueQuery::next(5))
        .unwrap();
    assert_eq!(
        resumed.primary_seek().unwrap().value,
        Some(Value::StringArray(vec!["a".into()]))
    );
    assert_eq!(
        resumed.to_sql(),
        keyset.from_row(&edges[0].node).limit(5).to_sql()
    );
}
