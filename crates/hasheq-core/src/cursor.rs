//! # Result Cursor
//!
//! Streamed query results returned by a `GraphStore` transaction.
//!
//! A cursor is released exactly once: either explicitly through `close`, or
//! implicitly when it is dropped. Dropping covers every early return and
//! `?` exit, so server-side resources behind a cursor are never leaked.
//! Exhaustion is reported as `Ok(None)` and never as an error.

use crate::HashEqError;

type Rows<T> = Box<dyn Iterator<Item = Result<T, HashEqError>> + Send>;
type CloseHook = Box<dyn FnOnce() + Send>;

/// A forward-only sequence of store rows.
pub struct Cursor<T> {
    rows: Rows<T>,
    on_close: Option<CloseHook>,
}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("open", &self.on_close.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Cursor<T> {
    /// Cursor over rows that were already materialized.
    #[must_use]
    pub fn from_rows(rows: Vec<T>) -> Self {
        Self::from_results(rows.into_iter().map(Ok))
    }

    /// Cursor over a fallible row stream.
    #[must_use]
    pub fn from_results<I>(rows: I) -> Self
    where
        I: Iterator<Item = Result<T, HashEqError>> + Send + 'static,
    {
        Self {
            rows: Box::new(rows),
            on_close: Some(Box::new(|| {})),
        }
    }
}

impl<T> Cursor<T> {
    /// Run `hook` when the cursor is released.
    #[must_use]
    pub fn on_close(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Read the next row. `Ok(None)` means the cursor is exhausted.
    pub fn read_document(&mut self) -> Result<Option<T>, HashEqError> {
        if self.on_close.is_none() {
            return Ok(None);
        }
        match self.rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => {
                self.release();
                Err(e)
            }
            None => {
                self.release();
                Ok(None)
            }
        }
    }

    /// Read every remaining row, then release the cursor.
    pub fn drain(mut self) -> Result<Vec<T>, HashEqError> {
        let mut rows = Vec::new();
        while let Some(row) = self.read_document()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Drain and require at most one row.
    ///
    /// More than one row is an `IntegrityViolation` naming `operation`, the
    /// key produced by `key`, and the row count.
    pub fn at_most_one(
        self,
        operation: &str,
        key: impl FnOnce() -> String,
    ) -> Result<Option<T>, HashEqError> {
        let mut rows = self.drain()?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            n => {
                let key = key();
                tracing::error!(operation, key = %key, rows = n, "cardinality check failed");
                Err(HashEqError::IntegrityViolation {
                    operation: operation.to_string(),
                    key,
                    rows: n,
                })
            }
        }
    }

    /// Release the cursor without reading the remaining rows.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl<T> Drop for Cursor<T> {
    fn drop(&mut self) {
        self.release();
    }
}
