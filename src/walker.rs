//! The load-command walker.
//!
//! Load commands are packed back to back after the header and each one
//! records its own byte length, which is the only way to find the next.
//! The walker steps through them with a bounds-checked cursor and decodes
//! the records this crate cares about; everything else is passed through
//! as [`LoadCommand::Other`].

use crate::error::{Error, Result};
use crate::macho::{
    self, EntryPointCommand, Header, SegmentCommand, UuidCommand, HEADER_SIZE,
    LOAD_COMMAND_SIZE,
};

/// A byte cursor that refuses to move past the end of its buffer.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    /// Offset of `data[0]` from the start of the header, for error reports.
    base: usize,
}

impl<'a> Cursor<'a> {
    /// A cursor over `data`, which starts `base` bytes into the header.
    pub fn new(data: &'a [u8], base: usize) -> Cursor<'a> {
        Cursor { data, pos: 0, base }
    }

    /// Offset of the cursor from the start of the header.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Bytes left before the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The unread bytes, without advancing.
    pub fn peek(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Take the next `n` bytes and advance past them, or fail without
    /// moving if fewer than `n` remain.
    pub fn advance(&mut self, n: usize, reason: &'static str) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::Malformed {
                offset: self.offset(),
                reason,
            });
        }
        let taken = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(taken)
    }
}

/// One decoded load command.
#[derive(Debug, Clone, Copy)]
pub enum LoadCommand<'a> {
    /// `LC_SEGMENT_64`.
    Segment(SegmentCommand<'a>),
    /// `LC_MAIN`.
    EntryPoint(EntryPointCommand<'a>),
    /// `LC_UUID`.
    Uuid(UuidCommand<'a>),
    /// Any other command, undecoded.
    Other {
        /// The command type.
        cmd: u32,
        /// The command's full `cmdsize` bytes.
        data: &'a [u8],
    },
}

impl<'a> LoadCommand<'a> {
    fn decode(cmd: u32, data: &'a [u8], offset: usize) -> Result<LoadCommand<'a>> {
        let malformed = |reason| Error::Malformed { offset, reason };
        Ok(match cmd {
            macho::LC_SEGMENT_64 => {
                LoadCommand::Segment(SegmentCommand::parse(data).map_err(malformed)?)
            }
            macho::LC_MAIN => {
                LoadCommand::EntryPoint(EntryPointCommand::parse(data).map_err(malformed)?)
            }
            macho::LC_UUID => LoadCommand::Uuid(UuidCommand::parse(data).map_err(malformed)?),
            _ => LoadCommand::Other { cmd, data },
        })
    }
}

/// A lazy iterator over a header's load commands.
///
/// Yields at most `ncmds` items. The first error ends the iteration.
#[derive(Debug, Clone)]
pub struct LoadCommands<'a> {
    cursor: Cursor<'a>,
    remaining: u32,
}

impl<'a> LoadCommands<'a> {
    /// Walk the load commands of an already parsed header.
    pub fn new(header: &Header<'a>) -> LoadCommands<'a> {
        tracing::trace!(
            ncmds = header.ncmds(),
            sizeofcmds = header.sizeofcmds(),
            "walking load commands"
        );
        LoadCommands {
            cursor: Cursor::new(header.command_bytes(), HEADER_SIZE),
            remaining: header.ncmds(),
        }
    }

    fn next_command(&mut self) -> Result<LoadCommand<'a>> {
        let offset = self.cursor.offset();
        let head = self.cursor.peek();
        if head.len() < LOAD_COMMAND_SIZE {
            return Err(Error::Malformed {
                offset,
                reason: "load command truncated",
            });
        }
        let cmd = u32::from_ne_bytes([head[0], head[1], head[2], head[3]]);
        let cmdsize = u32::from_ne_bytes([head[4], head[5], head[6], head[7]]) as usize;
        if cmdsize < LOAD_COMMAND_SIZE {
            return Err(Error::Malformed {
                offset,
                reason: "command size smaller than load_command",
            });
        }

        let data = self
            .cursor
            .advance(cmdsize, "command size past end of command area")?;
        LoadCommand::decode(cmd, data, offset)
    }
}

impl<'a> Iterator for LoadCommands<'a> {
    type Item = Result<LoadCommand<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        match self.next_command() {
            Ok(command) => {
                if self.remaining == 0 && self.cursor.remaining() != 0 {
                    tracing::debug!(
                        unused = self.cursor.remaining(),
                        "load commands end before sizeofcmds"
                    );
                }
                Some(Ok(command))
            }
            Err(err) => {
                tracing::debug!(%err, "rejecting load command stream");
                self.remaining = 0;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

/// Parse the header at the start of `data` and walk its load commands.
pub fn load_commands(data: &[u8]) -> Result<LoadCommands<'_>> {
    let header = Header::parse(data)?;
    Ok(LoadCommands::new(&header))
}
