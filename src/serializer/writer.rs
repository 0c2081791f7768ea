//! Record-aligned chunking.

use std::io;

use super::{OutputSink, SerializeStatus, WriteResult};

/// Buffers records into chunks of at most `sink.chunk_size()` bytes.
///
/// A chunk only ever ends on a record boundary. A record longer than the
/// chunk size is sent on its own. Once the sink aborts, every later write is
/// dropped and the stream is never ended.
pub struct ChunkWriter<'s, S: OutputSink + ?Sized> {
    sink: &'s mut S,
    chunk_size: usize,
    buffer: String,
    aborted: bool,
    chunks_written: usize,
}

impl<'s, S: OutputSink + ?Sized> ChunkWriter<'s, S> {
    /// Create a writer over `sink`.
    pub fn new(sink: &'s mut S) -> Self {
        let chunk_size = sink.chunk_size().max(1);
        Self {
            sink,
            chunk_size,
            buffer: String::with_capacity(chunk_size),
            aborted: false,
            chunks_written: 0,
        }
    }

    /// Whether the sink asked to stop.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Chunks handed to the sink so far.
    pub fn chunks_written(&self) -> usize {
        self.chunks_written
    }

    /// Append one record.
    pub fn write_record(&mut self, record: &str) -> io::Result<()> {
        if self.aborted {
            return Ok(());
        }
        if !self.buffer.is_empty() && self.buffer.len() + record.len() > self.chunk_size {
            self.flush()?;
            if self.aborted {
                return Ok(());
            }
        }
        self.buffer.push_str(record);
        if self.buffer.len() >= self.chunk_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.aborted || self.buffer.is_empty() {
            return Ok(());
        }
        let result = self.sink.write_chunk(&self.buffer)?;
        self.buffer.clear();
        self.chunks_written += 1;
        if result == WriteResult::Abort {
            tracing::debug!(chunks = self.chunks_written, "Sink aborted serialization");
            self.aborted = true;
        }
        Ok(())
    }

    /// Flush the last chunk and end the stream, unless aborted.
    pub fn finish(mut self) -> io::Result<SerializeStatus> {
        self.flush()?;
        if self.aborted {
            return Ok(SerializeStatus::Aborted);
        }
        self.sink.end_of_stream()?;
        Ok(SerializeStatus::Completed)
    }
}
