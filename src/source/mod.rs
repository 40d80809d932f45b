//! Record sources.
//!
//! A record source yields text lines tagged with their file and line
//! number, lazily and without rewinding. The file-backed implementation
//! walks a directory of CDR exports in name order; the in-memory one backs
//! tests.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// One line of CDR input with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub file: String,
    pub line_no: u64,
    pub text: String,
}

/// Source errors. An `Open` error skips the file, not the batch.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {file}: {source}")]
    Open {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {file}: {source}")]
    Read {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    /// The file the failure belongs to.
    pub fn file(&self) -> &str {
        match self {
            SourceError::Open { file, .. } | SourceError::Read { file, .. } => file,
        }
    }
}

/// Lazy, forward-only sequence of tagged input lines.
#[async_trait]
pub trait RecordSource: Send {
    /// The next line, or `None` at total end of stream.
    async fn next_line(&mut self) -> Result<Option<SourceLine>, SourceError>;
}

/// Reads CDR files from disk in deterministic (name-sorted) order.
pub struct FileRecordSource {
    pending: Vec<PathBuf>,
    current: Option<OpenFile>,
}

struct OpenFile {
    name: String,
    lines: Lines<BufReader<File>>,
    line_no: u64,
}

impl FileRecordSource {
    /// A source over a directory (every `.csv`/`.txt` file, sorted by name)
    /// or a single file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let path = path.as_ref();
        if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| {
                    p.is_file()
                        && matches!(
                            p.extension().and_then(|e| e.to_str()),
                            Some("csv") | Some("txt") | Some("CSV") | Some("TXT")
                        )
                })
                .collect();
            files.sort();
            debug!(dir = %path.display(), files = files.len(), "scanned input directory");
            // pop() takes from the back
            files.reverse();
            Ok(FileRecordSource {
                pending: files,
                current: None,
            })
        } else {
            Ok(FileRecordSource {
                pending: vec![path.to_path_buf()],
                current: None,
            })
        }
    }

    /// A source over an explicit file list, read in the given order.
    pub fn from_files(files: Vec<PathBuf>) -> Self {
        let mut pending = files;
        pending.reverse();
        FileRecordSource {
            pending,
            current: None,
        }
    }

    fn open_next(&mut self) -> Result<bool, SourceError> {
        let Some(path) = self.pending.pop() else {
            return Ok(false);
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = File::open(&path).map_err(|source| SourceError::Open {
            file: name.clone(),
            source,
        })?;
        debug!(file = %name, "reading CDR file");
        self.current = Some(OpenFile {
            name,
            lines: BufReader::new(file).lines(),
            line_no: 0,
        });
        Ok(true)
    }
}

#[async_trait]
impl RecordSource for FileRecordSource {
    async fn next_line(&mut self) -> Result<Option<SourceLine>, SourceError> {
        loop {
            let Some(open) = self.current.as_mut() else {
                match self.open_next() {
                    Ok(true) => continue,
                    Ok(false) => return Ok(None),
                    Err(e) => {
                        warn!(error = %e, "skipping unreadable file");
                        return Err(e);
                    }
                }
            };
            match open.lines.next() {
                Some(Ok(text)) => {
                    open.line_no += 1;
                    return Ok(Some(SourceLine {
                        file: open.name.clone(),
                        line_no: open.line_no,
                        text,
                    }));
                }
                Some(Err(source)) => {
                    let file = open.name.clone();
                    self.current = None;
                    return Err(SourceError::Read { file, source });
                }
                None => {
                    self.current = None;
                }
            }
        }
    }
}

/// In-memory source for tests and hosted callers.
pub struct MemoryRecordSource {
    lines: std::vec::IntoIter<SourceLine>,
}

impl MemoryRecordSource {
    pub fn new(lines: Vec<SourceLine>) -> Self {
        MemoryRecordSource {
            lines: lines.into_iter(),
        }
    }

    /// Wrap raw text as numbered lines of one synthetic file.
    pub fn from_text(file: &str, text: &str) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| SourceLine {
                file: file.to_string(),
                line_no: (i + 1) as u64,
                text: line.to_string(),
            })
            .collect();
        Self::new(lines)
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn next_line(&mut self) -> Result<Option<SourceLine>, SourceError> {
        Ok(self.lines.next())
    }
}
