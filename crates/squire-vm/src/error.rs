// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the Squire virtual machine.
//!
//! Only conditions that can never be handled by Squire code live here.
//! Everything a program may `catch` is thrown as a value instead; see
//! [`Unwind`](crate::runtime::exception::Unwind).

use thiserror::Error;

use crate::runtime::value::Genus;

/// Result type for fatal VM operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end execution.
#[derive(Debug, Error)]
pub enum Error {
    /// An opcode word that does not name any instruction.
    #[error("unknown opcode {opcode:#x} at instruction {ip}")]
    UnknownOpcode {
        /// The raw word
        opcode: u32,
        /// Where it was fetched
        ip: usize,
    },

    /// An interrupt word that does not name any interrupt.
    #[error("unknown interrupt {interrupt:#x} at instruction {ip}")]
    UnknownInterrupt {
        /// The raw word
        interrupt: u32,
        /// Where it was fetched
        ip: usize,
    },

    /// The instruction stream referenced something that does not exist.
    #[error("malformed codeblock: {0}")]
    MalformedCodeblock(String),

    /// A value was decoded as a genus it does not have.
    #[error("expected a {expected} but found a {found}")]
    WrongGenus {
        /// Genus the caller required
        expected: Genus,
        /// Genus actually present
        found: Genus,
    },

    /// A handle that does not point at a live heap slot.
    #[error("dangling heap reference #{0}")]
    DanglingReference(u32),

    /// The arena cannot fit the objects the runtime itself needs.
    #[error("heap of {0} slots is too small to start the runtime")]
    HeapTooSmall(usize),

    /// No entry journey was registered.
    #[error("program has no entry journey")]
    MissingEntry,

    /// A throw reached the top of the program without a handler.
    #[error("uncaught exception encountered: {0}")]
    Uncaught(String),

    /// The program asked to terminate the process.
    #[error("program exited with status {0}")]
    Exit(i32),

    /// A program image could not be decoded or encoded.
    #[error("invalid program image: {0}")]
    Image(#[from] postcard::Error),

    /// A program image file could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::MalformedCodeblock`].
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedCodeblock(message.into())
    }

    /// The process exit status this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Exit(code) => *code,
            _ => 1,
        }
    }

    /// [`Error::exit_code`] narrowed to a process status byte. Codes that
    /// are non-zero stay non-zero after narrowing.
    pub fn exit_status(&self) -> u8 {
        match self.exit_code() {
            0 => 0,
            code => match (code & 0xff) as u8 {
                0 => 1,
                status => status,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::UnknownOpcode { opcode: 0xff, ip: 3 };
        assert_eq!(err.to_string(), "unknown opcode 0xff at instruction 3");

        let err = Error::WrongGenus {
            expected: Genus::Text,
            found: Genus::Numeral,
        };
        assert_eq!(err.to_string(), "expected a Text but found a Numeral");

        let err = Error::Uncaught("Ni()".into());
        assert_eq!(err.to_string(), "uncaught exception encountered: Ni()");
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(Error::Exit(7).exit_code(), 7);
        assert_eq!(Error::MissingEntry.exit_code(), 1);
        assert_eq!(Error::malformed("bad").exit_code(), 1);
    }

    #[test]
    fn test_exit_status_stays_nonzero() {
        assert_eq!(Error::Exit(0).exit_status(), 0);
        assert_eq!(Error::Exit(3).exit_status(), 3);
        assert_eq!(Error::Exit(259).exit_status(), 3);
        assert_eq!(Error::Exit(256).exit_status(), 1);
        assert_eq!(Error::Exit(-1).exit_status(), 255);
        assert_eq!(Error::MissingEntry.exit_status(), 1);
    }
}
