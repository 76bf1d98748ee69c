//! Destinations for a stage's output lines: memory or a redirect file.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::{PipelineError, PipelineResult};

/// How a redirect target is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// Create or empty the file.
    Truncate,
    /// Create the file or add to its end.
    Append,
}

/// An open redirect file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Open `path` right away so an unwritable target fails before the stage runs.
    pub fn open(path: &Path, mode: RedirectMode) -> PipelineResult<Self> {
        let mut options = std::fs::OpenOptions::new();
        options.create(true);
        match mode {
            RedirectMode::Truncate => options.write(true).truncate(true),
            RedirectMode::Append => options.append(true),
        };

        let file = options.open(path).map_err(|source| PipelineError::Redirect {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(File::from_std(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Where a stage puts each line it reads from one of its output streams.
#[derive(Debug)]
pub enum LineSink {
    Memory(Vec<String>),
    File(FileSink),
}

impl Default for LineSink {
    fn default() -> Self {
        LineSink::Memory(Vec::new())
    }
}

impl LineSink {
    /// Store one line (without its terminator).
    pub async fn push(&mut self, line: String) -> io::Result<()> {
        match self {
            LineSink::Memory(lines) => {
                lines.push(line);
                Ok(())
            }
            LineSink::File(sink) => {
                sink.writer.write_all(line.as_bytes()).await?;
                sink.writer.write_all(b"\n").await
            }
        }
    }

    /// Flush and close a file sink. Returns the captured lines, which are
    /// empty for a file sink.
    pub async fn finish(self) -> io::Result<Vec<String>> {
        match self {
            LineSink::Memory(lines) => Ok(lines),
            LineSink::File(mut sink) => {
                sink.writer.shutdown().await?;
                Ok(Vec::new())
            }
        }
    }
}
