//! Line-oriented reading over any byte stream.

use std::io::{self, BufRead, BufReader, Read};

/// Reads text lines from a stream, tracking how many bytes were consumed.
///
/// Lines keep their terminating `\n`; the last line may lack one.
///
/// # Example
///
/// ```ignore
/// let file = resolver.open_file_object(&spec)?;
/// let mut text = TextFile::new(file);
/// let header = text.read_line()?;
/// for line in text.lines() {
///     println!("{}", line?);
/// }
/// ```
pub struct TextFile<R> {
    reader: BufReader<R>,
    offset: u64,
}

impl<R: Read> TextFile<R> {
    /// Wrap a stream positioned where reading should start.
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            offset: 0,
        }
    }

    /// Read the next line, or an empty string at end of stream.
    pub fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        self.offset += n as u64;
        Ok(line)
    }

    /// Read lines until end of stream.
    ///
    /// With a size hint, stops as soon as the lines read so far add up to at
    /// least `size_hint` bytes.
    pub fn read_lines(&mut self, size_hint: Option<usize>) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut total = 0usize;
        loop {
            let line = self.read_line()?;
            if line.is_empty() {
                break;
            }
            total += line.len();
            lines.push(line);
            if size_hint.is_some_and(|hint| total >= hint) {
                break;
            }
        }
        Ok(lines)
    }

    /// Bytes consumed from the start of the wrapped stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Iterate over the remaining lines.
    pub fn lines(&mut self) -> Lines<'_, R> {
        Lines { text: self }
    }

    /// Unwrap the stream. Buffered but unread data is lost.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

/// Iterator over the lines of a [`TextFile`].
pub struct Lines<'a, R> {
    text: &'a mut TextFile<R>,
}

impl<R: Read> Iterator for Lines<'_, R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.text.read_line() {
            Ok(line) if line.is_empty() => None,
            other => Some(other),
        }
    }
}
