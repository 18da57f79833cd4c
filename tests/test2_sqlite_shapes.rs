#![cfg(feature = "sqlite")]

mod common;

use common::{people_session, unique_db_path};
use sql_session::prelude::*;

async fn seeded(prefix: &str) -> Result<Session<SqliteConnection>, SessionError> {
    let mut session = people_session(prefix).await?;
    let inserted = session
        .execute_non_query(
            "INSERT INTO people (id, name, score) VALUES (1, 'ann', 1.5);
             INSERT INTO people (id, name, score) VALUES (2, 'ben', NULL);
             INSERT INTO people (id, name, score) VALUES (3, 'cy', 3.0);",
            &CancellationToken::new(),
        )
        .await?;
    assert_eq!(inserted, 3);
    Ok(session)
}

#[tokio::test(flavor = "multi_thread")]
async fn non_query_counts_rows_not_selects() -> Result<(), SessionError> {
    let mut session = seeded("non_query").await?;
    let cancel = CancellationToken::new();

    let changed = session
        .execute_non_query("UPDATE people SET score = 0 WHERE id > 1", &cancel)
        .await?;
    assert_eq!(changed, 2);

    let changed = session
        .execute_non_query("SELECT * FROM people", &cancel)
        .await?;
    assert_eq!(changed, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn scalar_distinguishes_no_rows_from_null() -> Result<(), SessionError> {
    let mut session = seeded("scalar").await?;
    let cancel = CancellationToken::new();

    let missing = session
        .execute_scalar(
            Command::text("SELECT name FROM people WHERE id = @id").bind("id", 42),
            &cancel,
        )
        .await?;
    assert_eq!(missing, None);

    let null = session
        .execute_scalar("SELECT score FROM people WHERE id = 2", &cancel)
        .await?;
    assert_eq!(null, Some(DbValue::Null));

    let score = session
        .command("SELECT score FROM people WHERE name = @name")
        .bind("name", "ann")
        .scalar()
        .await?;
    assert_eq!(score.and_then(|v| v.to_f64()), Some(1.5));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn data_table_and_data_set() -> Result<(), SessionError> {
    let mut session = seeded("tables").await?;
    let cancel = CancellationToken::new();

    let table = session
        .execute_data_table("SELECT id, name FROM people ORDER BY id", &cancel)
        .await?;
    assert_eq!(table.columns().to_vec(), vec!["id", "name"]);
    assert_eq!(table.len(), 3);
    assert_eq!(
        table.row(2).and_then(|r| r.get("name")),
        Some(&DbValue::Text("cy".into()))
    );

    let empty = session
        .execute_data_table("SELECT id FROM people WHERE id < 0", &cancel)
        .await?;
    assert!(empty.is_empty());
    assert_eq!(empty.columns().to_vec(), vec!["id"]);

    let set = session
        .execute_data_set(
            "SELECT COUNT(*) AS n FROM people;
             UPDATE people SET score = 9 WHERE id = 1;
             SELECT name, score FROM people WHERE id = 1;",
            &cancel,
        )
        .await?;
    assert_eq!(set.len(), 2);
    assert_eq!(set.tables()[0].first_value(), Some(&DbValue::Int(3)));
    let second = &set.tables()[1];
    assert_eq!(second.columns().to_vec(), vec!["name", "score"]);
    assert_eq!(
        second.row(0).and_then(|r| r.get("score")),
        Some(&DbValue::Float(9.0))
    );
    assert_eq!(session.connection_state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn reader_streams_and_closes_when_done() -> Result<(), SessionError> {
    let mut session = seeded("reader").await?;
    let cancel = CancellationToken::new();

    let mut reader = session
        .execute_reader("SELECT id, name FROM people ORDER BY id", &cancel)
        .await?;
    assert_eq!(reader.columns().to_vec(), vec!["id", "name"]);

    let mut names = Vec::new();
    while let Some(row) = reader.next_row(&cancel).await? {
        names.push(row.get("name").and_then(|v| v.as_text()).map(str::to_owned));
    }
    assert!(reader.is_closed());
    assert!(reader.next_row(&cancel).await?.is_none());
    drop(reader);

    assert_eq!(
        names,
        vec![Some("ann".into()), Some("ben".into()), Some("cy".into())]
    );
    assert_eq!(session.connection_state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_a_reader_early_releases_the_connection() -> Result<(), SessionError> {
    let mut session = seeded("reader_drop").await?;
    let cancel = CancellationToken::new();

    let mut reader = session
        .execute_reader("SELECT id FROM people ORDER BY id", &cancel)
        .await?;
    let first = reader.next_row(&cancel).await?.expect("first row");
    assert_eq!(first.get_by_index(0), Some(&DbValue::Int(1)));
    drop(reader);
    assert_eq!(session.connection_state(), ConnectionState::Closed);

    // the session is usable again straight away
    let changed = session
        .execute_non_query("DELETE FROM people WHERE id = 3", &cancel)
        .await?;
    assert_eq!(changed, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn reader_inside_transaction_leaves_connection_open() -> Result<(), SessionError> {
    let mut session = seeded("reader_tx").await?;
    let cancel = CancellationToken::new();

    session.begin_transaction(&cancel).await?;
    session
        .execute_non_query("INSERT INTO people (id, name) VALUES (4, 'dee')", &cancel)
        .await?;
    let table = session
        .execute_reader("SELECT name FROM people ORDER BY id", &cancel)
        .await?
        .into_table(&cancel)
        .await?;
    assert_eq!(table.len(), 4);
    assert_eq!(session.connection_state(), ConnectionState::Open);
    session.commit_transaction().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_input_is_an_invalid_argument() -> Result<(), SessionError> {
    let mut session = seeded("bad_input").await?;
    let cancel = CancellationToken::new();

    let err = session.execute_non_query("   ", &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(session.connection_state(), ConnectionState::Closed);

    let err = session
        .execute_scalar("SELECT name FROM people WHERE id = @id", &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = session
        .execute_scalar(Command::text("SELECT ?").bind("x", 1), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = session
        .execute_non_query(Command::stored_procedure("refresh_people"), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(session.connection_state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn every_value_kind_round_trips_through_a_row() -> Result<(), SessionError> {
    let mut session: Session<SqliteConnection> =
        Session::new(SessionOptions::new(unique_db_path("values")))?;
    let cancel = CancellationToken::new();
    let at = chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|d| d.and_hms_opt(12, 30, 0))
        .expect("valid timestamp");

    let table = session
        .execute_data_table(
            Command::text("SELECT @i AS i, @f AS f, @t AS t, @b AS b, @n AS n, @x AS x, @ts AS ts")
                .bind("i", 7_i64)
                .bind("f", 0.25)
                .bind("t", "txt")
                .bind("b", true)
                .bind("n", DbValue::Null)
                .bind("x", vec![1_u8, 2, 3])
                .bind("ts", at),
            &cancel,
        )
        .await?;
    let row = table.row(0).expect("one row");
    assert_eq!(row.get("i"), Some(&DbValue::Int(7)));
    assert_eq!(row.get("f"), Some(&DbValue::Float(0.25)));
    assert_eq!(row.get("t"), Some(&DbValue::Text("txt".into())));
    // SQLite has no boolean storage class
    assert_eq!(row.get("b"), Some(&DbValue::Int(1)));
    assert_eq!(row.get("n"), Some(&DbValue::Null));
    assert_eq!(row.get("x"), Some(&DbValue::Blob(vec![1, 2, 3])));
    assert_eq!(row.get("ts"), Some(&DbValue::Text("2024-02-29 12:30:00".into())));
    Ok(())
}
