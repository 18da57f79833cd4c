#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use common::unique_db_path;
use sql_session::prelude::*;
use sql_session::sqlite::SqliteConnectOptions;

#[test]
fn blocking_session_runs_without_a_runtime() -> Result<(), SessionError> {
    let mut session: BlockingSession<SqliteConnection> =
        BlockingSession::new(SessionOptions::new(unique_db_path("blocking")))?;
    session.execute_non_query("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)")?;

    session.begin_transaction()?;
    assert!(session.in_transaction());
    for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
        session.execute_non_query(Command::text("INSERT INTO kv VALUES (@k, @v)").bind("k", k).bind("v", v))?;
    }
    session.commit_transaction()?;
    assert_eq!(session.connection_state(), ConnectionState::Closed);

    let total = session.execute_scalar("SELECT SUM(v) FROM kv")?;
    assert_eq!(total, Some(DbValue::Int(6)));

    let keys: Vec<String> = session
        .execute_reader("SELECT k FROM kv ORDER BY k")?
        .map(|row| {
            row.map(|r| {
                r.get("k")
                    .and_then(DbValue::as_text)
                    .unwrap_or_default()
                    .to_owned()
            })
        })
        .collect::<Result<_, _>>()?;
    assert_eq!(keys, vec!["a", "b", "c"]);
    assert_eq!(session.connection_state(), ConnectionState::Closed);

    let set = session.execute_data_set("SELECT 1; SELECT 2, 3")?;
    assert_eq!(set.len(), 2);

    session.dispose();
    let err = session.execute_scalar("SELECT 1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    Ok(())
}

#[test]
fn blocking_token_cancels_calls() -> Result<(), SessionError> {
    let mut session: BlockingSession<SqliteConnection> =
        BlockingSession::new(SessionOptions::new(unique_db_path("blocking_cancel")))?;
    session.cancellation_token().cancel();
    let err = session.execute_scalar("SELECT 1").unwrap_err();
    assert!(err.is_cancelled());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shared_session_serializes_tasks() -> Result<(), Box<dyn std::error::Error>> {
    let session: Session<SqliteConnection> =
        Session::new(SessionOptions::new(unique_db_path("shared")))?;
    let shared = SharedSession::new(session);
    shared
        .lock()
        .await
        .execute_non_query(
            "CREATE TABLE hits (id INTEGER PRIMARY KEY)",
            &CancellationToken::new(),
        )
        .await?;

    let mut handles = Vec::new();
    for id in 1..=8_i64 {
        let shared = shared.clone();
        handles.push(tokio::spawn(async move {
            let mut session = shared.checkout().await;
            let cancel = CancellationToken::new();
            session.begin_transaction(&cancel).await?;
            session
                .execute_non_query(Command::text("INSERT INTO hits VALUES (@id)").bind("id", id), &cancel)
                .await?;
            session.commit_transaction().await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let mut session = shared.lock().await;
    let hits = session
        .execute_scalar("SELECT COUNT(*) FROM hits", &CancellationToken::new())
        .await?;
    assert_eq!(hits, Some(DbValue::Int(8)));
    assert!(shared.try_checkout().is_none());
    Ok(())
}

#[test]
fn provisioner_builds_unopened_handles() -> Result<(), SessionError> {
    let provisioner = ConnectionProvisioner::<SqliteConnection>::with_connection_string(
        "Data Source=main.db;Foreign Keys=True",
    )?;
    let conn = provisioner.create_connection()?;
    assert_eq!(conn.options().data_source, "main.db");
    assert_eq!(conn.options().foreign_keys, Some(true));

    let other = provisioner.create_connection_with("other.db")?;
    assert_eq!(other.options(), &SqliteConnectOptions::new("other.db"));
    assert_eq!(provisioner.connection_string(), Some("Data Source=main.db;Foreign Keys=True"));

    let err = provisioner
        .create_connection_with("Data Source=x.db;Bogus=1")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = Session::<SqliteConnection>::new(SessionOptions::new("")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn session_from_prebuilt_connection() -> Result<(), SessionError> {
    let options = SqliteConnectOptions::new(unique_db_path("prebuilt"));
    let mut session = Session::from_connection(SqliteConnection::new(options));
    session.set_logger(Some(Arc::new(TracingLogger::new(LogLevel::Error))));
    let value = session
        .execute_scalar("SELECT 'ok'", &CancellationToken::new())
        .await?;
    assert_eq!(value.and_then(|v| v.as_text().map(str::to_owned)), Some("ok".into()));
    Ok(())
}
