//! Bounded in-process pipe between the export producer and its reader.
//!
//! The writer side batches bytes into chunks and sends them over a bounded
//! channel, so at most `capacity` chunks are buffered at any time. A
//! producer-side failure is sent down the same channel and surfaces on the
//! reader's next `read` call.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

use crate::core::error::TransferError;

type Chunk = Result<Vec<u8>, TransferError>;

/// Create a pipe holding at most `capacity` chunks of up to `chunk_size` bytes.
pub fn pipe(capacity: usize, chunk_size: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = sync_channel(capacity.max(1));
    let closed = Arc::new(AtomicBool::new(false));

    let writer = PipeWriter {
        tx,
        buf: Vec::with_capacity(chunk_size.max(1)),
        chunk_size: chunk_size.max(1),
        closed,
    };
    let reader = PipeReader {
        rx,
        current: Vec::new(),
        pos: 0,
        failed: false,
    };

    (writer, reader)
}

/// Producer end of the pipe.
pub struct PipeWriter {
    tx: SyncSender<Chunk>,
    buf: Vec<u8>,
    chunk_size: usize,
    closed: Arc<AtomicBool>,
}

impl PipeWriter {
    /// A handle that can close the pipe with an error while the writer
    /// itself is owned by something else (e.g. a zip writer).
    pub fn closer(&self) -> PipeCloser {
        PipeCloser {
            tx: self.tx.clone(),
            closed: self.closed.clone(),
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() || self.closed.load(Ordering::SeqCst) {
            self.buf.clear();
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(self.chunk_size));
        self.tx
            .send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive reader was dropped"))
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        // Bytes written after an error close are discarded.
        if self.closed.load(Ordering::SeqCst) {
            return Ok(data.len());
        }

        let room = self.chunk_size - self.buf.len();
        let n = room.min(data.len());
        self.buf.extend_from_slice(&data[..n]);

        if self.buf.len() >= self.chunk_size {
            self.send_buffered()?;
        }

        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let _ = self.send_buffered();
    }
}

/// Closes a pipe with an error.
pub struct PipeCloser {
    tx: SyncSender<Chunk>,
    closed: Arc<AtomicBool>,
}

impl PipeCloser {
    /// Deliver `err` to the reader. Everything written afterwards is dropped.
    pub fn close_with_error(self, err: TransferError) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Err(err));
        }
    }
}

/// Consumer end of the pipe.
///
/// A producer error is returned as an [`io::Error`] of kind `Other` wrapping
/// the [`TransferError`]; use [`transfer_error`] to recover it.
pub struct PipeReader {
    rx: Receiver<Chunk>,
    current: Vec<u8>,
    pos: usize,
    failed: bool,
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        while self.pos >= self.current.len() {
            if self.failed {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "archive stream already failed",
                ));
            }
            match self.rx.recv() {
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Ok(Err(err)) => {
                    self.failed = true;
                    return Err(io::Error::new(io::ErrorKind::Other, err));
                }
                // Every sender is gone: clean end of stream.
                Err(_) => return Ok(0),
            }
        }

        let n = (self.current.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Recover the producer's [`TransferError`] from a read error, if that is
/// what it carries.
pub fn transfer_error(err: &io::Error) -> Option<&TransferError> {
    err.get_ref()?.downcast_ref::<TransferError>()
}

/// Convert a read error into a [`TransferError`], keeping the producer's
/// error when present.
pub fn into_transfer_error(err: io::Error) -> TransferError {
    if transfer_error(&err).is_some() {
        if let Some(inner) = err.into_inner() {
            if let Ok(transfer) = inner.downcast::<TransferError>() {
                return *transfer;
            }
        }
        return TransferError::repository("archive stream failed");
    }
    TransferError::io("failed to read archive stream", err)
}
