//! Read-only views over the 64-bit Mach-O structures found in a loaded
//! image's header.
//!
//! Every view borrows the image's memory. Fields are read in native byte
//! order, which is the order the loader mapped them in.

use std::convert::TryFrom;
use std::fmt;

use crate::error::{Error, Result};

/// `MH_MAGIC_64`, the magic of a native-endian 64-bit header.
pub const MH_MAGIC_64: u32 = 0xfeed_facf;

/// `LC_REQ_DYLD`, or'ed into commands the loader must understand.
pub const LC_REQ_DYLD: u32 = 0x8000_0000;
/// `LC_SEGMENT_64`.
pub const LC_SEGMENT_64: u32 = 0x19;
/// `LC_UUID`.
pub const LC_UUID: u32 = 0x1b;
/// `LC_MAIN`, the entry point command.
pub const LC_MAIN: u32 = 0x28 | LC_REQ_DYLD;

/// Name of the segment holding the header and code.
pub const SEG_TEXT: &str = "__TEXT";

/// `sizeof(struct mach_header_64)`.
pub const HEADER_SIZE: usize = 32;
/// `sizeof(struct load_command)`.
pub const LOAD_COMMAND_SIZE: usize = 8;
/// `sizeof(struct segment_command_64)`.
pub const SEGMENT_COMMAND_SIZE: usize = 72;
/// `sizeof(struct section_64)`.
pub const SECTION_SIZE: usize = 80;
/// `sizeof(struct entry_point_command)`.
pub const ENTRY_POINT_COMMAND_SIZE: usize = 24;
/// `sizeof(struct uuid_command)`.
pub const UUID_COMMAND_SIZE: usize = 24;

#[inline]
fn field_u32<const N: usize>(raw: &[u8; N], off: usize) -> u32 {
    u32::from_ne_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]])
}

#[inline]
fn field_u64<const N: usize>(raw: &[u8; N], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&raw[off..off + 8]);
    u64::from_ne_bytes(b)
}

/// Decode a fixed-size, NUL-padded name field.
fn fixed_name(bytes: &[u8]) -> &str {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).unwrap_or("")
}

/// Borrow exactly `N` leading bytes of `data` as an array.
fn prefix<const N: usize>(data: &[u8]) -> Option<&[u8; N]> {
    data.get(..N).and_then(|b| <&[u8; N]>::try_from(b).ok())
}

/// A validated `mach_header_64` together with its load-command area.
#[derive(Clone, Copy)]
pub struct Header<'a> {
    raw: &'a [u8; HEADER_SIZE],
    commands: &'a [u8],
}

impl<'a> Header<'a> {
    /// Parse the header at the start of `data`.
    ///
    /// `data` must cover the fixed header and the full `sizeofcmds` bytes
    /// that follow it.
    pub fn parse(data: &'a [u8]) -> Result<Header<'a>> {
        let raw = prefix::<HEADER_SIZE>(data).ok_or(Error::Malformed {
            offset: 0,
            reason: "mach header truncated",
        })?;

        let magic = field_u32(raw, 0);
        if magic != MH_MAGIC_64 {
            return Err(Error::UnsupportedFormat { magic });
        }

        let sizeofcmds = field_u32(raw, 20) as usize;
        let commands = HEADER_SIZE
            .checked_add(sizeofcmds)
            .and_then(|end| data.get(HEADER_SIZE..end))
            .ok_or(Error::Malformed {
                offset: HEADER_SIZE,
                reason: "command area exceeds mapped header",
            })?;

        Ok(Header { raw, commands })
    }

    /// CPU type.
    pub fn cputype(&self) -> u32 {
        field_u32(self.raw, 4)
    }

    /// File type (`MH_EXECUTE`, `MH_DYLIB`, ...).
    pub fn filetype(&self) -> u32 {
        field_u32(self.raw, 12)
    }

    /// Number of load commands.
    pub fn ncmds(&self) -> u32 {
        field_u32(self.raw, 16)
    }

    /// Byte length of the load-command area.
    pub fn sizeofcmds(&self) -> u32 {
        field_u32(self.raw, 20)
    }

    /// Header flags.
    pub fn flags(&self) -> u32 {
        field_u32(self.raw, 24)
    }

    /// The load-command area, `sizeofcmds` bytes long.
    pub fn command_bytes(&self) -> &'a [u8] {
        self.commands
    }
}

impl<'a> fmt::Debug for Header<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Header")
            .field("cputype", &self.cputype())
            .field("filetype", &self.filetype())
            .field("ncmds", &self.ncmds())
            .field("sizeofcmds", &self.sizeofcmds())
            .finish()
    }
}

/// A `segment_command_64` and the sections declared right after it.
#[derive(Clone, Copy)]
pub struct SegmentCommand<'a> {
    raw: &'a [u8; SEGMENT_COMMAND_SIZE],
    sections: &'a [u8],
}

impl<'a> SegmentCommand<'a> {
    /// Decode a segment command from its full `cmdsize` bytes.
    pub fn parse(data: &'a [u8]) -> std::result::Result<SegmentCommand<'a>, &'static str> {
        let raw = prefix::<SEGMENT_COMMAND_SIZE>(data).ok_or("segment command truncated")?;
        let nsects = field_u32(raw, 64) as usize;
        let sections = nsects
            .checked_mul(SECTION_SIZE)
            .and_then(|len| data.get(SEGMENT_COMMAND_SIZE..SEGMENT_COMMAND_SIZE.checked_add(len)?))
            .ok_or("sections overrun segment command")?;
        Ok(SegmentCommand { raw, sections })
    }

    /// Segment name, e.g. `__TEXT`.
    pub fn name(&self) -> &'a str {
        fixed_name(&self.raw[8..24])
    }

    /// Stated virtual memory address.
    pub fn vmaddr(&self) -> u64 {
        field_u64(self.raw, 24)
    }

    /// Size in memory.
    pub fn vmsize(&self) -> u64 {
        field_u64(self.raw, 32)
    }

    /// Offset of the segment in the file.
    pub fn fileoff(&self) -> u64 {
        field_u64(self.raw, 40)
    }

    /// Size in the file.
    pub fn filesize(&self) -> u64 {
        field_u64(self.raw, 48)
    }

    /// Number of sections declared in this segment.
    pub fn nsects(&self) -> u32 {
        field_u32(self.raw, 64)
    }

    /// Iterate this segment's sections in declaration order.
    pub fn sections(&self) -> SectionIter<'a> {
        SectionIter {
            chunks: self.sections.chunks_exact(SECTION_SIZE),
        }
    }
}

impl<'a> fmt::Debug for SegmentCommand<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SegmentCommand")
            .field("name", &self.name())
            .field("vmaddr", &format_args!("{:#x}", self.vmaddr()))
            .field("vmsize", &format_args!("{:#x}", self.vmsize()))
            .field("nsects", &self.nsects())
            .finish()
    }
}

/// An iterator over the sections of one segment.
#[derive(Debug, Clone)]
pub struct SectionIter<'a> {
    chunks: std::slice::ChunksExact<'a, u8>,
}

impl<'a> Iterator for SectionIter<'a> {
    type Item = Section<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks
            .next()
            .and_then(prefix::<SECTION_SIZE>)
            .map(|raw| Section { raw })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl<'a> ExactSizeIterator for SectionIter<'a> {}

/// A `section_64` record, borrowed from the live image.
///
/// This is a view: it is only meaningful while the image stays loaded.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Section<'a> {
    raw: &'a [u8; SECTION_SIZE],
}

impl<'a> Section<'a> {
    /// Section name, e.g. `__text`.
    pub fn name(&self) -> &'a str {
        fixed_name(&self.raw[0..16])
    }

    /// Name of the segment this section claims to belong to.
    pub fn segment_name(&self) -> &'a str {
        fixed_name(&self.raw[16..32])
    }

    /// Stated virtual memory address.
    pub fn address(&self) -> u64 {
        field_u64(self.raw, 32)
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        field_u64(self.raw, 40)
    }

    /// File offset of the section's contents.
    pub fn offset(&self) -> u32 {
        field_u32(self.raw, 48)
    }

    /// Section alignment, as a power of two.
    pub fn align(&self) -> u32 {
        field_u32(self.raw, 52)
    }

    /// Section type and attribute flags.
    pub fn flags(&self) -> u32 {
        field_u32(self.raw, 64)
    }

    /// Whether `svma` falls inside this section's stated address range.
    pub fn contains(&self, svma: u64) -> bool {
        svma >= self.address() && svma - self.address() < self.size()
    }

    /// The raw record as mapped in the image.
    pub fn raw(&self) -> &'a [u8] {
        &self.raw[..]
    }

    /// Address of the record itself in memory.
    pub fn as_ptr(&self) -> *const u8 {
        self.raw.as_ptr()
    }
}

impl<'a> fmt::Debug for Section<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Section")
            .field("segment", &self.segment_name())
            .field("name", &self.name())
            .field("address", &format_args!("{:#x}", self.address()))
            .field("size", &format_args!("{:#x}", self.size()))
            .finish()
    }
}

/// An `entry_point_command` (`LC_MAIN`).
#[derive(Clone, Copy)]
pub struct EntryPointCommand<'a> {
    raw: &'a [u8; ENTRY_POINT_COMMAND_SIZE],
}

impl<'a> EntryPointCommand<'a> {
    /// Decode an entry point command from its full `cmdsize` bytes.
    pub fn parse(data: &'a [u8]) -> std::result::Result<EntryPointCommand<'a>, &'static str> {
        prefix::<ENTRY_POINT_COMMAND_SIZE>(data)
            .map(|raw| EntryPointCommand { raw })
            .ok_or("entry point command truncated")
    }

    /// File offset of `main()`.
    pub fn entryoff(&self) -> u64 {
        field_u64(self.raw, 8)
    }

    /// Initial stack size, zero for the default.
    pub fn stacksize(&self) -> u64 {
        field_u64(self.raw, 16)
    }
}

impl<'a> fmt::Debug for EntryPointCommand<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EntryPointCommand")
            .field("entryoff", &format_args!("{:#x}", self.entryoff()))
            .field("stacksize", &self.stacksize())
            .finish()
    }
}

/// A `uuid_command` (`LC_UUID`).
#[derive(Clone, Copy)]
pub struct UuidCommand<'a> {
    raw: &'a [u8; UUID_COMMAND_SIZE],
}

impl<'a> UuidCommand<'a> {
    /// Decode a UUID command from its full `cmdsize` bytes.
    pub fn parse(data: &'a [u8]) -> std::result::Result<UuidCommand<'a>, &'static str> {
        prefix::<UUID_COMMAND_SIZE>(data)
            .map(|raw| UuidCommand { raw })
            .ok_or("uuid command truncated")
    }

    /// The image's 128-bit UUID.
    pub fn uuid(&self) -> [u8; 16] {
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&self.raw[8..24]);
        uuid
    }
}

impl<'a> fmt::Debug for UuidCommand<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("UuidCommand")
            .field("uuid", &self.uuid())
            .finish()
    }
}
