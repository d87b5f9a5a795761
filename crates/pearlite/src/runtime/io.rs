//! Output sinks and file handles.
//!
//! The engine never prints directly: all output flows through an
//! [`OutputSink`] owned by the embedding host, so tests and embedders can
//! capture it. File handles attach to globs via `open`.

use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::Path,
};

/// Destination for `print`/`say`/`warn` output.
pub trait OutputSink {
    fn out(&mut self, text: &str);
    fn err(&mut self, text: &str);
}

/// Process stdout/stderr sink, the default for [`crate::Interp::new`].
#[derive(Debug, Default)]
pub struct StdSink;

impl OutputSink for StdSink {
    fn out(&mut self, text: &str) {
        print!("{text}");
    }

    fn err(&mut self, text: &str) {
        eprint!("{text}");
    }
}

/// Capturing sink for tests and embedders.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub out: String,
    pub err: String,
}

impl OutputSink for BufferSink {
    fn out(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn err(&mut self, text: &str) {
        self.err.push_str(text);
    }
}

/// Clonable sink for tests and hosts that need to read output back after
/// handing the interpreter its sink.
#[derive(Debug, Default, Clone)]
pub struct SharedSink(std::rc::Rc<std::cell::RefCell<BufferSink>>);

impl SharedSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stdout(&self) -> String {
        self.0.borrow().out.clone()
    }

    #[must_use]
    pub fn stderr(&self) -> String {
        self.0.borrow().err.clone()
    }
}

impl OutputSink for SharedSink {
    fn out(&mut self, text: &str) {
        self.0.borrow_mut().out.push_str(text);
    }

    fn err(&mut self, text: &str) {
        self.0.borrow_mut().err.push_str(text);
    }
}

/// A file handle attached to a glob.
#[derive(Debug)]
pub enum IoHandle {
    Read(BufReader<File>),
    Write(File),
}

impl IoHandle {
    /// Opens a handle for a 3-arg `open` mode: `<`, `>`, or `>>`.
    pub fn open(mode: &str, path: &Path) -> std::io::Result<Self> {
        match mode {
            "<" => Ok(Self::Read(BufReader::new(File::open(path)?))),
            ">" => Ok(Self::Write(File::create(path)?)),
            ">>" => Ok(Self::Write(OpenOptions::new().create(true).append(true).open(path)?)),
            other => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Unknown open mode '{other}'"),
            )),
        }
    }

    /// Reads one line including its newline; `None` at EOF or on a
    /// write-only handle.
    pub fn read_line(&mut self) -> Option<String> {
        match self {
            Self::Read(reader) => {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => None,
                    Ok(_) => Some(line),
                }
            }
            Self::Write(_) => None,
        }
    }

    /// Writes text; silently ignored on a read handle (Perl warns).
    pub fn write_str(&mut self, text: &str) {
        if let Self::Write(file) = self {
            let _ = file.write_all(text.as_bytes());
        }
    }
}
