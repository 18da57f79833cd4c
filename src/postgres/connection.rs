use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{StreamExt, pin_mut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{CancelToken, Client, Config as PgConfig, NoTls};
use tokio_util::sync::CancellationToken;

use super::config::parse_config;
use super::params::{as_refs, positional_values};
use super::query::{self, build_table, column_names, fold_simple, row_values};
use crate::command::{Command, CommandKind};
use crate::driver::{
    DbConnection, Interrupt, NoInterrupt, ROW_BUFFER, RowStream, interrupt_on_cancel,
};
use crate::error::SessionError;
use crate::params::BIND_MARKER;
use crate::results::DataSet;
use crate::translation::to_positional;
use crate::types::{ConnectionState, DbValue};

struct PgInterrupt(CancelToken);

impl Interrupt for PgInterrupt {
    fn interrupt(&self) {
        let token = self.0.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = token.cancel_query(NoTls).await {
                    tracing::debug!(error = %e, "postgres cancel request failed");
                }
            });
        }
    }
}

/// A command rewritten for the extended protocol.
struct Prepared {
    sql: String,
    values: Vec<DbValue>,
    statements: usize,
}

impl Prepared {
    fn new(command: &Command) -> Result<Self, SessionError> {
        let text = match command.kind() {
            CommandKind::Text => command.command_text().to_owned(),
            CommandKind::StoredProcedure => {
                let args: Vec<String> = command
                    .parameters()
                    .iter()
                    .map(|p| format!("{} => {}", p.bare_name(), p.name()))
                    .collect();
                format!("CALL {}({})", command.command_text(), args.join(", "))
            }
        };
        let positional = to_positional(&text, BIND_MARKER);
        let values = positional_values(command, &positional.names)?;
        if !values.is_empty() && positional.statements > 1 {
            return Err(SessionError::InvalidArgument(
                "parameterized Postgres commands must contain a single statement".into(),
            ));
        }
        Ok(Self {
            sql: positional.sql.into_owned(),
            values,
            statements: positional.statements,
        })
    }

    /// Several statements with nothing to bind go through the simple protocol.
    fn is_simple(&self) -> bool {
        self.statements > 1
    }
}

/// A single `tokio-postgres` client plus the task driving its socket.
pub struct PostgresConnection {
    config: PgConfig,
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
    interrupt: Arc<dyn Interrupt>,
    state: ConnectionState,
    in_transaction: bool,
    // set when a statement fails inside the transaction; the server then refuses
    // everything but ROLLBACK and turns COMMIT into a rollback
    aborted: Arc<AtomicBool>,
}

impl PostgresConnection {
    #[must_use]
    pub fn new(config: PgConfig) -> Self {
        Self {
            config,
            client: None,
            driver: None,
            interrupt: Arc::new(NoInterrupt),
            state: ConnectionState::Unopened,
            in_transaction: false,
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PgConfig {
        &self.config
    }

    fn client(&self) -> Result<&Client, SessionError> {
        self.client
            .as_ref()
            .ok_or_else(|| SessionError::InvalidState("Postgres connection is not open".into()))
    }

    /// Flag the open transaction as aborted when a statement that reached the server
    /// failed.
    fn track<T>(&self, res: Result<T, SessionError>, started: bool) -> Result<T, SessionError> {
        if res.is_err() && started && self.in_transaction {
            self.aborted.store(true, Ordering::SeqCst);
        }
        res
    }

    fn end_transaction(&mut self) {
        self.in_transaction = false;
        self.aborted.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DbConnection for PostgresConnection {
    const BACKEND: &'static str = "Postgres";

    fn from_connection_string(connection_string: &str) -> Result<Self, SessionError> {
        Ok(Self::new(parse_config(connection_string)?))
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn open(&mut self) -> Result<(), SessionError> {
        if self.state.is_open() {
            return Ok(());
        }
        let (client, connection) = self.config.connect(NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "postgres connection terminated");
            }
        });
        self.interrupt = Arc::new(PgInterrupt(client.cancel_token()));
        self.client = Some(client);
        self.driver = Some(driver);
        self.state = ConnectionState::Open;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        if self.client.take().is_some() {
            self.state = ConnectionState::Closed;
        }
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.end_transaction();
        self.interrupt = Arc::new(NoInterrupt);
        Ok(())
    }

    fn interrupt_handle(&self) -> Arc<dyn Interrupt> {
        Arc::clone(&self.interrupt)
    }

    async fn begin(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        let client = self.client()?;
        interrupt_on_cancel(
            async { client.batch_execute("BEGIN").await.map_err(SessionError::from) },
            cancel,
            self.interrupt.as_ref(),
        )
        .await?;
        self.in_transaction = true;
        self.aborted.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        let client = self.client()?;
        if self.aborted.load(Ordering::SeqCst) {
            let res = client.batch_execute("ROLLBACK").await;
            self.end_transaction();
            res?;
            return Err(SessionError::BackendFailure(
                "transaction aborted by earlier error; rolled back instead of committed".into(),
            ));
        }
        let res = client.batch_execute("COMMIT").await;
        // the server ends the transaction whether or not COMMIT succeeds
        self.end_transaction();
        Ok(res?)
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        let res = self.client()?.batch_execute("ROLLBACK").await;
        self.end_transaction();
        Ok(res?)
    }

    async fn transaction_active(&mut self) -> Result<bool, SessionError> {
        Ok(self.client.is_some() && self.in_transaction)
    }

    async fn execute(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<u64, SessionError> {
        let prepared = Prepared::new(command)?;
        let client = self.client()?;
        let work = async {
            if prepared.values.is_empty() {
                let messages = client.simple_query(&prepared.sql).await?;
                return Ok(fold_simple(messages).rows_affected);
            }
            let stmt = client.prepare(&prepared.sql).await?;
            let affected = client.execute(&stmt, &as_refs(&prepared.values)).await?;
            // row-returning statements report rows read, not rows changed
            Ok::<_, SessionError>(if stmt.columns().is_empty() { affected } else { 0 })
        };
        let started = !cancel.is_cancelled();
        let res = interrupt_on_cancel(work, cancel, self.interrupt.as_ref()).await;
        self.track(res, started)
    }

    async fn query_scalar(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<Option<DbValue>, SessionError> {
        let prepared = Prepared::new(command)?;
        let client = self.client()?;
        let work = async {
            if prepared.is_simple() {
                let outcome = fold_simple(client.simple_query(&prepared.sql).await?);
                return Ok(outcome
                    .set
                    .tables()
                    .first()
                    .and_then(|t| t.first_value().cloned()));
            }
            let stmt = client.prepare(&prepared.sql).await?;
            let refs = as_refs(&prepared.values);
            let rows = client
                .query_raw(&stmt, refs.iter().map(|p| *p as &dyn ToSql))
                .await?;
            pin_mut!(rows);
            match rows.next().await {
                Some(row) => {
                    let row = row?;
                    // `SELECT FROM t` yields rows without columns
                    if row.is_empty() {
                        return Ok(None);
                    }
                    Ok(Some(query::postgres_extract_value(&row, 0)?))
                }
                None => Ok::<_, SessionError>(None),
            }
        };
        let started = !cancel.is_cancelled();
        let res = interrupt_on_cancel(work, cancel, self.interrupt.as_ref()).await;
        self.track(res, started)
    }

    async fn query_stream(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<RowStream, SessionError> {
        let prepared = Prepared::new(command)?;
        let client = self.client()?;
        let (tx, rx) = mpsc::channel(ROW_BUFFER);
        let started = !cancel.is_cancelled();

        if prepared.is_simple() {
            let outcome = interrupt_on_cancel(
                async {
                    let messages = client.simple_query(&prepared.sql).await?;
                    Ok::<_, SessionError>(fold_simple(messages))
                },
                cancel,
                self.interrupt.as_ref(),
            )
            .await;
            let table = self.track(outcome, started)?.set.into_first_table();
            let columns = table.columns().to_vec();
            tokio::spawn(async move {
                for row in table.into_rows() {
                    if tx.send(Ok(row.into_values())).await.is_err() {
                        break;
                    }
                }
            });
            return Ok(RowStream::new(columns, rx, Arc::clone(&self.interrupt)));
        }

        let opened = interrupt_on_cancel(
            async {
                let stmt = client.prepare(&prepared.sql).await?;
                let refs = as_refs(&prepared.values);
                let rows = client
                    .query_raw(&stmt, refs.iter().map(|p| *p as &dyn ToSql))
                    .await?;
                Ok::<_, SessionError>((stmt, rows))
            },
            cancel,
            self.interrupt.as_ref(),
        )
        .await;
        let (stmt, rows) = self.track(opened, started)?;

        let aborted = self.in_transaction.then(|| Arc::clone(&self.aborted));
        tokio::spawn(async move {
            pin_mut!(rows);
            while let Some(next) = rows.next().await {
                let message = next
                    .map_err(SessionError::from)
                    .and_then(|row| row_values(&row));
                let failed = message.is_err();
                if failed {
                    if let Some(aborted) = &aborted {
                        aborted.store(true, Ordering::SeqCst);
                    }
                }
                if tx.send(message).await.is_err() || failed {
                    break;
                }
            }
        });
        Ok(RowStream::new(
            column_names(&stmt),
            rx,
            Arc::clone(&self.interrupt),
        ))
    }

    async fn query_sets(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<DataSet, SessionError> {
        let prepared = Prepared::new(command)?;
        let client = self.client()?;
        let work = async {
            if prepared.is_simple() {
                return Ok(fold_simple(client.simple_query(&prepared.sql).await?).set);
            }
            let stmt = client.prepare(&prepared.sql).await?;
            let rows = client.query(&stmt, &as_refs(&prepared.values)).await?;
            let mut set = DataSet::new();
            if !stmt.columns().is_empty() {
                set.push_table(build_table(&stmt, &rows)?);
            }
            Ok::<_, SessionError>(set)
        };
        let started = !cancel.is_cancelled();
        let res = interrupt_on_cancel(work, cancel, self.interrupt.as_ref()).await;
        self.track(res, started)
    }
}
