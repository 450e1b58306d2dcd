//! Forward-only result cursor.
//!
//! A cursor buffers one row at a time and converts cells on demand. Under an
//! autocommit transaction, running off the end or closing the cursor commits the
//! transaction. The remote resources are always released before that commit.

use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use rust_decimal::Decimal;

use crate::config::Operation;
use crate::conversion::{ColumnReader, ConversionContext, ConversionSettings, LobReader};
use crate::error::{DriverError, Result};
use crate::session::Session;
use crate::transaction::TransactionHandle;
use crate::transport::{RemoteCursor, RemotePrepared};
use crate::types::{AtomType, ColumnMetadata, HostValue, LobReference, TargetKind, WireValue};

/// Large-object channel of one cursor. Conversion contexts only hold a `Weak` to it,
/// so reads fail once the cursor has released its resources.
struct LobChannel {
    session: Arc<Session>,
    timeout: Option<Duration>,
}

impl LobReader for LobChannel {
    fn read_lob(&self, lob: &LobReference) -> Result<Vec<u8>> {
        self.session.call(
            Operation::Fetch,
            self.timeout,
            self.session.transport().read_lob(lob),
        )
    }
}

/// Server-side resources owned by an open cursor.
struct CursorResources {
    remote: RemoteCursor,
    /// Ad-hoc prepared statement created for this cursor alone.
    prepared: Option<RemotePrepared>,
    _lobs: Arc<dyn LobReader>,
}

impl CursorResources {
    /// Dispose the prepared statement, then close the remote cursor. Both are
    /// attempted; the first failure is returned.
    fn release(self, session: &Session) -> Result<()> {
        let disposed = match &self.prepared {
            Some(prepared) => session.call(
                Operation::Close,
                None,
                session.transport().dispose_prepared(prepared),
            ),
            None => Ok(()),
        };
        let closed = session.call(
            Operation::Close,
            None,
            session.transport().close_cursor(&self.remote),
        );
        disposed.and(closed)
    }
}

pub struct ResultCursor {
    handle: Arc<TransactionHandle>,
    resources: Option<CursorResources>,
    ctx: ConversionContext,
    columns: Option<Vec<ColumnMetadata>>,
    row: Option<Vec<WireValue>>,
    row_number: usize,
    max_rows: Option<usize>,
    timeout: Option<Duration>,
    after_last: bool,
    finished: bool,
    was_null: bool,
}

impl ResultCursor {
    pub(crate) fn open(
        handle: Arc<TransactionHandle>,
        remote: RemoteCursor,
        prepared: Option<RemotePrepared>,
        settings: ConversionSettings,
        max_rows: Option<usize>,
        timeout: Option<Duration>,
    ) -> Self {
        let lobs: Arc<dyn LobReader> = Arc::new(LobChannel {
            session: Arc::clone(handle.session()),
            timeout,
        });
        let ctx = ConversionContext::new(settings).with_lob_reader(Arc::downgrade(&lobs));
        tracing::trace!(cursor = remote.id, tx = handle.remote().id, "cursor opened");
        Self {
            handle,
            resources: Some(CursorResources {
                remote,
                prepared,
                _lobs: lobs,
            }),
            ctx,
            columns: None,
            row: None,
            row_number: 0,
            max_rows,
            timeout,
            after_last: false,
            finished: false,
            was_null: false,
        }
    }

    fn session(&self) -> &Session {
        self.handle.session()
    }

    fn open_resources(&self) -> Result<&CursorResources> {
        self.resources
            .as_ref()
            .ok_or_else(|| DriverError::Closed("result cursor is closed".into()))
    }

    /// Column metadata, fetched from the server on first use.
    ///
    /// # Errors
    /// Returns `DriverError::Closed` if the cursor was closed before the columns
    /// were described, or the transport failure.
    pub fn columns(&mut self) -> Result<&[ColumnMetadata]> {
        if self.columns.is_none() {
            let remote = self.open_resources()?.remote.clone();
            let session = self.session();
            let described = session.call(
                Operation::Fetch,
                self.timeout,
                session.transport().describe_cursor(&remote),
            )?;
            self.columns = Some(described);
        }
        Ok(self.columns.as_deref().unwrap_or_default())
    }

    /// Move to the next row.
    ///
    /// Returns false once the rows (or the row cap) are exhausted. An exhausted
    /// autocommit cursor closes itself, which commits its transaction.
    ///
    /// # Errors
    /// Returns `DriverError::Closed` if the cursor or its transaction is closed, or the
    /// fetch/commit failure.
    pub fn advance(&mut self) -> Result<bool> {
        if self.after_last {
            return Ok(false);
        }
        let remote = self.open_resources()?.remote.clone();
        if self.handle.is_closed() {
            return Err(DriverError::Closed(
                "the transaction of this cursor has ended".into(),
            ));
        }
        self.columns()?;

        let capped = self.max_rows.is_some_and(|max| self.row_number >= max);
        let next = if capped {
            None
        } else {
            let session = self.session();
            session.call(
                Operation::Fetch,
                self.timeout,
                session.transport().fetch_row(&remote),
            )?
        };

        match next {
            Some(values) => {
                self.row = Some(values);
                self.row_number += 1;
                Ok(true)
            }
            None => {
                self.after_last = true;
                self.row = None;
                if self.handle.is_autocommit() {
                    self.close()?;
                }
                Ok(false)
            }
        }
    }

    /// Wire value of 1-based column `index` in the current row.
    ///
    /// # Errors
    /// Returns `DriverError::InvalidColumnIndex` for an index outside the row, or
    /// `DriverError::Execution` when the cursor is not on a row.
    pub fn value_at(&self, index: usize) -> Result<&WireValue> {
        let row = self.row.as_ref().ok_or_else(|| {
            DriverError::Execution("result cursor is not positioned on a row".into())
        })?;
        index
            .checked_sub(1)
            .and_then(|i| row.get(i))
            .ok_or(DriverError::InvalidColumnIndex {
                index,
                column_count: row.len(),
            })
    }

    /// Read with a pre-resolved reader. Prefer this in loops over [`get`](Self::get).
    ///
    /// # Errors
    /// Column index or conversion errors.
    pub fn read(&mut self, index: usize, reader: &ColumnReader) -> Result<HostValue> {
        self.read_in(index, reader, None)
    }

    fn read_in(
        &mut self,
        index: usize,
        reader: &ColumnReader,
        ctx: Option<ConversionContext>,
    ) -> Result<HostValue> {
        let ctx = ctx.or_else(|| {
            self.declared_scale(index)
                .map(|scale| self.ctx.clone().with_scale(scale))
        });
        let ctx = ctx.as_ref().unwrap_or(&self.ctx);
        let value = self.value_at(index)?;
        let is_null = value.is_null();
        let converted = reader.read(value, ctx);
        self.was_null = is_null;
        converted
    }

    /// Scale declared by the column's metadata; decimal reads default to it.
    fn declared_scale(&self, index: usize) -> Option<u32> {
        let column = self.columns.as_ref()?.get(index.checked_sub(1)?)?;
        (column.atom_type == AtomType::Decimal).then_some(column.scale).flatten()
    }

    /// # Errors
    /// Column index or conversion errors.
    pub fn get(&mut self, index: usize, target: TargetKind) -> Result<HostValue> {
        self.read(index, &ColumnReader::new(target))
    }

    /// Read interpreting zone-free values in `calendar`.
    ///
    /// # Errors
    /// Column index or conversion errors.
    pub fn get_with_calendar(
        &mut self,
        index: usize,
        target: TargetKind,
        calendar: FixedOffset,
    ) -> Result<HostValue> {
        let ctx = self.ctx.clone().with_calendar(calendar);
        self.read_in(index, &ColumnReader::new(target), Some(ctx))
    }

    /// Decimal at `scale`, subject to the connection's rounding policy.
    ///
    /// # Errors
    /// Column index or conversion errors; `OutOfRangeConversion` if the rounding
    /// policy refuses to drop digits.
    pub fn get_decimal_with_scale(&mut self, index: usize, scale: u32) -> Result<Option<Decimal>> {
        let ctx = self.ctx.clone().with_scale(scale);
        let value = self.read_in(index, &ColumnReader::new(TargetKind::Decimal), Some(ctx))?;
        Ok(value.as_decimal())
    }

    /// Resolve the conversion for `target` once, for repeated reads.
    #[must_use]
    pub fn getter(&self, target: TargetKind) -> ColumnReader {
        ColumnReader::new(target)
    }

    /// 1-based index of the column called `name`, compared case-insensitively.
    ///
    /// # Errors
    /// Returns `DriverError::Execution` if there is no such column.
    pub fn find_column(&mut self, name: &str) -> Result<usize> {
        self.columns()?
            .iter()
            .position(|c| c.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .map(|i| i + 1)
            .ok_or_else(|| DriverError::Execution(format!("no column named {name}")))
    }

    /// Whether the last value read was a wire null.
    #[must_use]
    pub fn was_null(&self) -> bool {
        self.was_null
    }

    /// 1-based number of the current row; 0 before the first.
    #[must_use]
    pub fn row_number(&self) -> usize {
        self.row_number
    }

    #[must_use]
    pub fn is_after_last(&self) -> bool {
        self.after_last
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.resources.is_none()
    }

    #[must_use]
    pub fn transaction(&self) -> &Arc<TransactionHandle> {
        &self.handle
    }

    /// Release the cursor and, under autocommit, commit its transaction.
    ///
    /// The prepared statement and remote cursor are released first. Calling this
    /// again does nothing.
    ///
    /// # Errors
    /// The first release or commit failure. The cursor is closed regardless.
    pub fn close(&mut self) -> Result<()> {
        let Some(resources) = self.resources.take() else {
            return Ok(());
        };
        tracing::trace!(cursor = resources.remote.id, "cursor close");
        self.row = None;
        let released = resources.release(self.session());
        let finished = self.finish();
        released.and(finished)
    }

    /// Commit an autocommit transaction once.
    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.handle.finish()
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        if self.resources.is_some()
            && let Err(e) = self.close()
        {
            tracing::warn!(error = %e, "failed to close dropped result cursor");
        }
    }
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("tx", &self.handle.remote().id)
            .field("row_number", &self.row_number)
            .field("after_last", &self.after_last)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
