//! Scrolls: files opened by Squire code.
//!
//! A scroll lives in the arena as an `Other` object and owns its file
//! handle. Sweeping the scroll drops the handle, which closes the file.
//! Reads are unbuffered so `tell` and `seek` always agree with what has
//! been consumed.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// An open (or explicitly closed) file.
#[derive(Debug)]
pub struct Scroll {
    filename: String,
    mode: String,
    file: Option<File>,
}

impl Scroll {
    /// Opens `filename` with an `fopen`-style `mode`: `r`, `w` or `a`,
    /// optionally followed by `+`. A `b` anywhere in the mode is ignored.
    pub fn open(filename: &str, mode: &str) -> io::Result<Self> {
        let file = open_options(mode)?.open(filename)?;
        Ok(Self {
            filename: filename.to_string(),
            mode: mode.to_string(),
            file: Some(file),
        })
    }

    /// The path the scroll was opened with.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The mode the scroll was opened with.
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Whether [`Scroll::close`] has not been called yet.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn file(&mut self) -> io::Result<&mut File> {
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(io::Error::other(format!("scroll '{}' is closed", self.filename))),
        }
    }

    /// Reads at most `amount` bytes.
    pub fn read(&mut self, amount: u64) -> io::Result<String> {
        let mut bytes = Vec::new();
        Read::take(self.file()?, amount).read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads through the next newline, which is kept. Returns an empty
    /// text at the end of the file.
    pub fn read_line(&mut self) -> io::Result<String> {
        let file = self.file()?;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while file.read(&mut byte)? == 1 {
            line.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Reads everything from the current position on.
    pub fn read_to_end(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        self.file()?.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Writes all of `text` at the cursor.
    pub fn write(&mut self, text: &str) -> io::Result<()> {
        self.file()?.write_all(text.as_bytes())
    }

    /// Moves the cursor. `whence` is `0` (start), `1` (current position)
    /// or `2` (end). Returns the new position.
    pub fn seek(&mut self, offset: i64, whence: i64) -> io::Result<u64> {
        let from = match whence {
            0 => SeekFrom::Start(u64::try_from(offset).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "cannot seek before the start")
            })?),
            1 => SeekFrom::Current(offset),
            2 => SeekFrom::End(offset),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unknown seek origin {whence}"),
                ));
            }
        };
        self.file()?.seek(from)
    }

    /// The current position.
    pub fn tell(&mut self) -> io::Result<u64> {
        self.file()?.stream_position()
    }

    /// Closes the file. Every later operation fails.
    pub fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => {
                drop(file);
                Ok(())
            }
            None => Err(io::Error::other(format!("scroll '{}' is already closed", self.filename))),
        }
    }
}

fn open_options(mode: &str) -> io::Result<OpenOptions> {
    let flags: String = mode.chars().filter(|&c| c != 'b').collect();
    let mut options = OpenOptions::new();
    match flags.as_str() {
        "r" => options.read(true),
        "r+" => options.read(true).write(true),
        "w" => options.write(true).create(true).truncate(true),
        "w+" => options.read(true).write(true).create(true).truncate(true),
        "a" => options.append(true).create(true),
        "a+" => options.read(true).append(true).create(true),
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown file mode '{mode}'"),
            ));
        }
    };
    Ok(options)
}
