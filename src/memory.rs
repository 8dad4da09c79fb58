//! An [`ImageList`](../trait.ImageList.html) backed by ordinary buffers.
//!
//! Useful for exercising the extractors against synthetic headers, or
//! against headers copied out of another process.

use std::ffi::{CStr, CString};

use crate::macho::{
    self, ENTRY_POINT_COMMAND_SIZE, HEADER_SIZE, LOAD_COMMAND_SIZE, SECTION_SIZE,
    SEGMENT_COMMAND_SIZE, UUID_COMMAND_SIZE,
};
use crate::ImageList;

const CPU_TYPE_ARM64: u32 = 0x0100_000c;
const MH_EXECUTE: u32 = 0x2;

/// Stated size of every section the builder emits.
pub const BUILDER_SECTION_SIZE: u64 = 0x100;

#[derive(Debug, Clone)]
struct Entry {
    path: CString,
    header: Option<Vec<u8>>,
}

/// A list of images held in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryImages {
    entries: Vec<Entry>,
}

impl InMemoryImages {
    /// An empty list.
    pub fn new() -> InMemoryImages {
        InMemoryImages::default()
    }

    /// Append an image with the given path and header bytes; returns its
    /// index.
    ///
    /// Interior NUL bytes in `path` truncate it.
    pub fn push<P: AsRef<[u8]>>(&mut self, path: P, header: Vec<u8>) -> u32 {
        self.push_entry(path.as_ref(), Some(header))
    }

    /// Append an image that has a path but no header, as the loader
    /// reports for an image that is being unloaded.
    pub fn push_without_header<P: AsRef<[u8]>>(&mut self, path: P) -> u32 {
        self.push_entry(path.as_ref(), None)
    }

    fn push_entry(&mut self, path: &[u8], header: Option<Vec<u8>>) -> u32 {
        let end = path.iter().position(|&b| b == 0).unwrap_or(path.len());
        let path = CString::new(&path[..end]).unwrap_or_default();
        self.entries.push(Entry { path, header });
        (self.entries.len() - 1) as u32
    }
}

impl ImageList for InMemoryImages {
    fn count(&self) -> u32 {
        self.entries.len() as u32
    }

    fn path_at(&self, index: u32) -> Option<&CStr> {
        self.entries
            .get(index as usize)
            .map(|entry| entry.path.as_c_str())
    }

    fn header_at(&self, index: u32) -> Option<&[u8]> {
        self.entries
            .get(index as usize)
            .and_then(|entry| entry.header.as_deref())
    }
}

/// Assembles a native-endian 64-bit Mach-O header and load commands.
///
/// Section `i` of a segment at `vmaddr` is placed at
/// `vmaddr + i * BUILDER_SECTION_SIZE` with size `BUILDER_SECTION_SIZE`.
#[derive(Debug, Clone, Default)]
pub struct ImageBuilder {
    commands: Vec<Vec<u8>>,
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_ne_bytes());
}

fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_ne_bytes());
}

fn put_name(buf: &mut Vec<u8>, name: &str) {
    let mut field = [0u8; 16];
    let len = name.len().min(16);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    buf.extend_from_slice(&field);
}

impl ImageBuilder {
    /// A builder with no load commands.
    pub fn new() -> ImageBuilder {
        ImageBuilder::default()
    }

    /// Append an `LC_SEGMENT_64` with one section per name.
    pub fn segment(mut self, name: &str, vmaddr: u64, sections: &[&str]) -> ImageBuilder {
        let cmdsize = SEGMENT_COMMAND_SIZE + sections.len() * SECTION_SIZE;
        let vmsize = (sections.len() as u64).max(1) * BUILDER_SECTION_SIZE;

        let mut cmd = Vec::with_capacity(cmdsize);
        put_u32(&mut cmd, macho::LC_SEGMENT_64);
        put_u32(&mut cmd, cmdsize as u32);
        put_name(&mut cmd, name);
        put_u64(&mut cmd, vmaddr);
        put_u64(&mut cmd, vmsize);
        put_u64(&mut cmd, 0); // fileoff
        put_u64(&mut cmd, vmsize); // filesize
        put_u32(&mut cmd, 5); // maxprot
        put_u32(&mut cmd, 5); // initprot
        put_u32(&mut cmd, sections.len() as u32);
        put_u32(&mut cmd, 0); // flags

        for (i, section) in sections.iter().enumerate() {
            let offset = i as u64 * BUILDER_SECTION_SIZE;
            put_name(&mut cmd, section);
            put_name(&mut cmd, name);
            put_u64(&mut cmd, vmaddr + offset);
            put_u64(&mut cmd, BUILDER_SECTION_SIZE);
            put_u32(&mut cmd, offset as u32);
            put_u32(&mut cmd, 4); // align
            for _ in 0..6 {
                // reloff, nreloc, flags, reserved1..3
                put_u32(&mut cmd, 0);
            }
        }

        self.commands.push(cmd);
        self
    }

    /// Append an `LC_MAIN` command.
    pub fn entry_point(mut self, entryoff: u64) -> ImageBuilder {
        let mut cmd = Vec::with_capacity(ENTRY_POINT_COMMAND_SIZE);
        put_u32(&mut cmd, macho::LC_MAIN);
        put_u32(&mut cmd, ENTRY_POINT_COMMAND_SIZE as u32);
        put_u64(&mut cmd, entryoff);
        put_u64(&mut cmd, 0); // stacksize
        self.commands.push(cmd);
        self
    }

    /// Append an `LC_UUID` command.
    pub fn uuid(mut self, uuid: [u8; 16]) -> ImageBuilder {
        let mut cmd = Vec::with_capacity(UUID_COMMAND_SIZE);
        put_u32(&mut cmd, macho::LC_UUID);
        put_u32(&mut cmd, UUID_COMMAND_SIZE as u32);
        cmd.extend_from_slice(&uuid);
        self.commands.push(cmd);
        self
    }

    /// Append an arbitrary command; `cmdsize` covers `payload` plus the
    /// eight-byte command prefix.
    pub fn raw_command(mut self, cmd: u32, payload: &[u8]) -> ImageBuilder {
        let mut raw = Vec::with_capacity(LOAD_COMMAND_SIZE + payload.len());
        put_u32(&mut raw, cmd);
        put_u32(&mut raw, (LOAD_COMMAND_SIZE + payload.len()) as u32);
        raw.extend_from_slice(payload);
        self.commands.push(raw);
        self
    }

    /// Lay out the header followed by every command.
    pub fn build(self) -> Vec<u8> {
        let sizeofcmds: usize = self.commands.iter().map(Vec::len).sum();

        let mut image = Vec::with_capacity(HEADER_SIZE + sizeofcmds);
        put_u32(&mut image, macho::MH_MAGIC_64);
        put_u32(&mut image, CPU_TYPE_ARM64);
        put_u32(&mut image, 0); // cpusubtype
        put_u32(&mut image, MH_EXECUTE);
        put_u32(&mut image, self.commands.len() as u32);
        put_u32(&mut image, sizeofcmds as u32);
        put_u32(&mut image, 0); // flags
        put_u32(&mut image, 0); // reserved

        for cmd in &self.commands {
            image.extend_from_slice(cmd);
        }
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_insertion_order() {
        let mut images = InMemoryImages::new();
        assert_eq!(images.push("/usr/lib/libSystem.B.dylib", vec![]), 0);
        assert_eq!(images.push_without_header("/usr/lib/libobjc.A.dylib"), 1);
        assert_eq!(images.count(), 2);

        assert_eq!(
            images.path_at(1).unwrap().to_bytes(),
            b"/usr/lib/libobjc.A.dylib"
        );
        assert!(images.header_at(0).is_some());
        assert!(images.header_at(1).is_none());
        assert!(images.path_at(2).is_none());
        assert!(images.header_at(2).is_none());
    }

    #[test]
    fn paths_are_cut_at_nul() {
        let mut images = InMemoryImages::new();
        images.push(&b"/tmp/a\0b"[..], vec![]);
        assert_eq!(images.path_at(0).unwrap().to_bytes(), b"/tmp/a");
    }

    #[test]
    fn builder_sizes_add_up() {
        let image = ImageBuilder::new()
            .segment("__TEXT", 0x1000, &["__text", "__const"])
            .entry_point(0x10)
            .uuid([7; 16])
            .raw_command(0x2, &[0; 8])
            .build();
        assert_eq!(
            image.len(),
            HEADER_SIZE
                + SEGMENT_COMMAND_SIZE
                + 2 * SECTION_SIZE
                + ENTRY_POINT_COMMAND_SIZE
                + UUID_COMMAND_SIZE
                + 16
        );
    }
}
