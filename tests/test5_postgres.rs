#![cfg(feature = "postgres")]

//! Runs against a live server only when `SQL_SESSION_PG_URL` is set, e.g.
//! `host=localhost user=postgres password=postgres dbname=testing`.

use std::time::Duration;

use sql_session::prelude::*;
use sql_session::PostgresConnection;

fn pg_url() -> Option<String> {
    std::env::var("SQL_SESSION_PG_URL").ok()
}

fn unique_table(prefix: &str) -> String {
    let ns = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}_{}_{ns}", std::process::id())
}

#[test]
fn connection_strings_are_checked_up_front() {
    let provisioner = ConnectionProvisioner::<PostgresConnection>::new();
    let err = provisioner.create_connection_with("user=postgres").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = provisioner
        .create_connection_with("host=localhost user=postgres port=notaport")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let conn = provisioner
        .create_connection_with("postgresql://postgres@localhost:5432/testing")
        .unwrap();
    assert_eq!(conn.config().get_dbname(), Some("testing"));
}

#[tokio::test(flavor = "multi_thread")]
async fn postgres_session_round_trip() -> Result<(), SessionError> {
    let Some(url) = pg_url() else {
        return Ok(());
    };
    let table = unique_table("people");
    let cancel = CancellationToken::new();
    let mut session: Session<PostgresConnection> = Session::new(SessionOptions::new(url))?;

    session
        .execute_non_query(
            format!("CREATE TABLE {table} (id INT PRIMARY KEY, name TEXT NOT NULL, seen TIMESTAMP)"),
            &cancel,
        )
        .await?;
    assert_eq!(session.connection_state(), ConnectionState::Closed);

    session.begin_transaction(&cancel).await?;
    for (id, name) in [(99, "alice"), (100, "alice!")] {
        let inserted = session
            .execute_non_query(
                Command::text(format!("INSERT INTO {table} (id, name) VALUES (@id, @name)"))
                    .bind("id", id)
                    .bind("name", name),
                &cancel,
            )
            .await?;
        assert_eq!(inserted, 1);
    }
    let updated = session
        .execute_non_query(
            Command::text(format!("UPDATE {table} SET seen = @at WHERE id >= @id"))
                .bind("at", chrono::Utc::now().naive_utc())
                .bind("id", 99),
            &cancel,
        )
        .await?;
    assert_eq!(updated, 2);
    session.commit_transaction().await?;

    let count = session
        .execute_scalar(format!("SELECT COUNT(*) FROM {table}"), &cancel)
        .await?;
    assert_eq!(count, Some(DbValue::Int(2)));

    session.begin_transaction(&cancel).await?;
    session
        .execute_non_query(format!("DELETE FROM {table}"), &cancel)
        .await?;
    session.rollback_transaction().await?;
    session.rollback_transaction().await?;

    let rows = session
        .execute_data_table(
            Command::text(format!("SELECT id, name FROM {table} WHERE id >= @min ORDER BY id"))
                .bind("min", 99),
            &cancel,
        )
        .await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows.row(1).and_then(|r| r.get("name")),
        Some(&DbValue::Text("alice!".into()))
    );

    let mut reader = session
        .execute_reader(format!("SELECT id FROM {table} ORDER BY id"), &cancel)
        .await?;
    let mut ids = Vec::new();
    while let Some(row) = reader.next_row(&cancel).await? {
        ids.push(row.get_by_index(0).and_then(DbValue::to_i64));
    }
    drop(reader);
    assert_eq!(ids, vec![Some(99), Some(100)]);
    assert_eq!(session.connection_state(), ConnectionState::Closed);

    let set = session
        .execute_data_set(
            format!("SELECT COUNT(*) AS n FROM {table}; SELECT 'x' AS tag"),
            &cancel,
        )
        .await?;
    assert_eq!(set.len(), 2);

    // several statements can't carry bound values
    let err = session
        .execute_non_query(
            Command::text(format!("DELETE FROM {table} WHERE id = @id; SELECT 1")).bind("id", 1),
            &cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    session
        .execute_non_query(format!("DROP TABLE {table}"), &cancel)
        .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn postgres_cancel_interrupts_the_server() -> Result<(), SessionError> {
    let Some(url) = pg_url() else {
        return Ok(());
    };
    let mut session: Session<PostgresConnection> = Session::new(SessionOptions::new(url))?;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let res = tokio::time::timeout(
        Duration::from_secs(20),
        session.execute_non_query("SELECT pg_sleep(30)", &cancel),
    )
    .await
    .expect("cancel request should end the statement");
    assert!(res.unwrap_err().is_cancelled());
    assert_eq!(session.connection_state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn postgres_commit_after_failed_statement_is_reported() -> Result<(), SessionError> {
    let Some(url) = pg_url() else {
        return Ok(());
    };
    let table = unique_table("aborted");
    let cancel = CancellationToken::new();
    let mut session: Session<PostgresConnection> = Session::new(SessionOptions::new(url))?;
    session
        .execute_non_query(format!("CREATE TABLE {table} (id INT PRIMARY KEY)"), &cancel)
        .await?;

    session.begin_transaction(&cancel).await?;
    session
        .execute_non_query(format!("INSERT INTO {table} VALUES (1)"), &cancel)
        .await?;
    let err = session
        .execute_non_query(format!("INSERT INTO {table} VALUES (1)"), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendFailure);
    // Postgres keeps the aborted transaction open until it is rolled back
    assert!(session.in_transaction());

    let err = session.commit_transaction().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendFailure);
    assert!(err.to_string().contains("aborted"));
    assert!(!session.in_transaction());
    assert_eq!(session.connection_state(), ConnectionState::Closed);

    let count = session
        .execute_scalar(format!("SELECT COUNT(*) FROM {table}"), &cancel)
        .await?;
    assert_eq!(count, Some(DbValue::Int(0)));

    // a clean transaction afterwards commits normally
    session.begin_transaction(&cancel).await?;
    session
        .execute_non_query(format!("INSERT INTO {table} VALUES (2)"), &cancel)
        .await?;
    session.commit_transaction().await?;
    let count = session
        .execute_scalar(format!("SELECT COUNT(*) FROM {table}"), &cancel)
        .await?;
    assert_eq!(count, Some(DbValue::Int(1)));

    session
        .execute_non_query(format!("DROP TABLE {table}"), &cancel)
        .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn postgres_scalar_of_columnless_rows_is_none() -> Result<(), SessionError> {
    let Some(url) = pg_url() else {
        return Ok(());
    };
    let cancel = CancellationToken::new();
    let mut session: Session<PostgresConnection> = Session::new(SessionOptions::new(url))?;

    let value = session
        .execute_scalar("SELECT FROM generate_series(1, 2)", &cancel)
        .await?;
    assert_eq!(value, None);

    let value = session
        .execute_scalar(
            Command::text("SELECT FROM generate_series(1, @n::int)").bind("n", 2),
            &cancel,
        )
        .await?;
    assert_eq!(value, None);
    Ok(())
}
