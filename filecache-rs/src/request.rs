//! Provides a parser for the single request line sent by a client.
//!
//! The protocol couldn't be any simpler: after connecting, a client sends the name of the
//! requested file terminated by a newline (`\n`, optionally preceded by `\r`). The line must not
//! exceed [MAX_REQUEST_LEN](MAX_REQUEST_LEN) bytes (including the terminator) and has to be valid
//! UTF-8. The server then responds with the raw contents of the file and closes the connection.
//!
//! As the line might arrive in several chunks, [Request::parse](Request::parse) distinguishes
//! three cases: a complete request, a partial one (keep on reading) and a malformed one.
//!
//! # Examples
//!
//! ```
//! # use bytes::BytesMut;
//! # use filecache::request::Request;
//! let request = Request::parse(&BytesMut::from("docs/index.html\n")).unwrap().unwrap();
//! assert_eq!(request.filename(), "docs/index.html");
//!
//! // A partial request...
//! assert_eq!(Request::parse(&BytesMut::from("docs/ind")).unwrap().is_none(), true);
//!
//! // An invalid request...
//! assert_eq!(Request::parse(&BytesMut::from("\n")).is_err(), true);
//! ```
use anyhow::{anyhow, Context};
use bytes::BytesMut;

/// Contains the maximal length of a request line in bytes, including the terminating newline.
pub const MAX_REQUEST_LEN: usize = 1000;

const LF: u8 = b'\n';
const CR: u8 = b'\r';

/// Represents a parsed request, which is nothing more than the requested file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    filename: String,
}

impl Request {
    /// Tries to parse a request from the given byte buffer.
    ///
    /// Returns **Ok(None)** as long as no newline has been received and the buffer is still
    /// shorter than [MAX_REQUEST_LEN](MAX_REQUEST_LEN). Returns an **Err** for oversized lines,
    /// empty names and names which aren't valid UTF-8.
    pub fn parse(data: &BytesMut) -> anyhow::Result<Option<Request>> {
        let end = match data.iter().take(MAX_REQUEST_LEN).position(|byte| *byte == LF) {
            Some(end) => end,
            None if data.len() < MAX_REQUEST_LEN => return Ok(None),
            None => {
                return Err(anyhow!(
                    "The request exceeds the maximal length of {} bytes.",
                    MAX_REQUEST_LEN
                ))
            }
        };

        let mut line = &data[..end];
        if line.last() == Some(&CR) {
            line = &line[..line.len() - 1];
        }
        if line.is_empty() {
            return Err(anyhow!("The request doesn't contain a file name."));
        }

        let filename = std::str::from_utf8(line).context("The file name is not valid UTF-8.")?;

        Ok(Some(Request {
            filename: filename.to_owned(),
        }))
    }

    /// Returns the requested file name.
    pub fn filename(&self) -> &str {
        &self.filename
    }
}
