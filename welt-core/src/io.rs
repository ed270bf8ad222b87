// Copyright (c) 2026-present Welt Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Resource handle that hides whether scene text came from a file on disk or
//! from an in-memory stream handed to the engine by the embedder.

use std::{
    fmt::{Display, Formatter},
    fs::File,
    io::{BufReader, Cursor, Read},
    path::Path,
};

#[derive(Debug)]
pub enum FileError {
    Io(std::io::Error),
    Custom(String),
}

impl std::error::Error for FileError {}

impl Display for FileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FileError::Io(e) => write!(f, "io error: {e}"),
            FileError::Custom(e) => write!(f, "{e}"),
        }
    }
}

impl From<std::io::Error> for FileError {
    fn from(e: std::io::Error) -> Self {
        FileError::Io(e)
    }
}

/// A readable scene resource. The parser consumes one of these without ever
/// knowing where the bytes come from.
pub enum ResourceHandle {
    Memory(Cursor<Vec<u8>>),
    File(BufReader<File>),
}

impl ResourceHandle {
    pub fn from_memory(bytes: Vec<u8>) -> Self {
        Self::Memory(Cursor::new(bytes))
    }

    pub fn from_str(text: &str) -> Self {
        Self::from_memory(text.as_bytes().to_vec())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FileError> {
        Ok(Self::File(BufReader::new(File::open(path)?)))
    }

    /// Reads the entire resource into memory.
    pub fn read_to_end(mut self) -> Result<Vec<u8>, FileError> {
        let mut bytes = Vec::new();
        Read::read_to_end(&mut self, &mut bytes)?;
        Ok(bytes)
    }
}

impl Read for ResourceHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            ResourceHandle::Memory(cursor) => cursor.read(buf),
            ResourceHandle::File(reader) => reader.read(buf),
        }
    }
}

#[cfg(test)]
mod test {
    use super::ResourceHandle;

    #[test]
    fn memory_handle_round_trips() {
        let handle = ResourceHandle::from_str("Group { }");
        assert_eq!(handle.read_to_end().unwrap(), b"Group { }");
    }
}
