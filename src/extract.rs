//! Queries built on the load-command walker.

use crate::error::{Error, Result};
use crate::macho::{Section, SEG_TEXT};
use crate::walker::{load_commands, LoadCommand, LoadCommands};
use crate::ImageList;

/// Where an image was designed to load, and where its entry point sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaseReference {
    /// `vmaddr` of the `__TEXT` segment.
    pub static_base_address: u64,
    /// `entryoff` of the `LC_MAIN` command.
    pub entry_offset: u64,
}

impl BaseReference {
    /// Stated address of the entry point, assuming `__TEXT` starts at file
    /// offset zero as it does for every image the loader maps.
    pub fn static_entry_address(&self) -> Option<u64> {
        self.static_base_address.checked_add(self.entry_offset)
    }
}

fn walk<L: ImageList + ?Sized>(images: &L, index: u32) -> Result<LoadCommands<'_>> {
    let header = images
        .header_at(index)
        .ok_or(Error::InvalidHeader { index })?;
    load_commands(header)
}

/// Read the static base address and entry offset of image `index`.
///
/// Both must be present; the first `__TEXT` segment and the first
/// `LC_MAIN` win. The walk ends as soon as both are known.
pub fn find_base_reference<L: ImageList + ?Sized>(images: &L, index: u32) -> Result<BaseReference> {
    let mut base = None;
    let mut entry = None;

    for command in walk(images, index)? {
        match command? {
            LoadCommand::Segment(seg) if base.is_none() && seg.name() == SEG_TEXT => {
                base = Some(seg.vmaddr());
            }
            LoadCommand::EntryPoint(cmd) if entry.is_none() => {
                entry = Some(cmd.entryoff());
            }
            _ => continue,
        }
        if base.is_some() && entry.is_some() {
            break;
        }
    }

    match (base, entry) {
        (Some(static_base_address), Some(entry_offset)) => Ok(BaseReference {
            static_base_address,
            entry_offset,
        }),
        (None, _) => Err(Error::NotFound(format!("{} segment in image {}", SEG_TEXT, index))),
        (_, None) => Err(Error::NotFound(format!("entry point in image {}", index))),
    }
}

/// Collect every section of image `index`, segment by segment, each in
/// declaration order.
///
/// A readable image without sections yields an empty vector. The
/// sections borrow `images` and are only meaningful while the image stays
/// loaded.
pub fn find_sections<L: ImageList + ?Sized>(images: &L, index: u32) -> Result<Vec<Section<'_>>> {
    let mut sections = Vec::new();

    for command in walk(images, index)? {
        if let LoadCommand::Segment(seg) = command? {
            let segment_sections = seg.sections();
            if segment_sections.len() == 0 {
                continue;
            }
            sections
                .try_reserve(segment_sections.len())
                .map_err(|_| Error::AllocationFailure)?;
            sections.extend(segment_sections);
        }
    }

    tracing::trace!(index, count = sections.len(), "collected sections");
    Ok(sections)
}

/// Read the `LC_UUID` of image `index`.
pub fn find_uuid<L: ImageList + ?Sized>(images: &L, index: u32) -> Result<[u8; 16]> {
    for command in walk(images, index)? {
        if let LoadCommand::Uuid(cmd) = command? {
            return Ok(cmd.uuid());
        }
    }
    Err(Error::NotFound(format!("uuid in image {}", index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::HEADER_SIZE;
    use crate::memory::{ImageBuilder, InMemoryImages, BUILDER_SECTION_SIZE};

    fn single(image: Vec<u8>) -> InMemoryImages {
        let mut images = InMemoryImages::new();
        images.push("/tmp/Sample", image);
        images
    }

    #[test]
    fn base_reference_from_text_and_main() {
        let images = single(
            ImageBuilder::new()
                .segment("__PAGEZERO", 0, &[])
                .segment("__TEXT", 0x1_0000_0000, &["__text"])
                .segment("__DATA", 0x1_0000_8000, &["__data"])
                .entry_point(0x4010)
                .build(),
        );
        let base = find_base_reference(&images, 0).unwrap();
        assert_eq!(
            base,
            BaseReference {
                static_base_address: 0x1_0000_0000,
                entry_offset: 0x4010,
            }
        );
        assert_eq!(base.static_entry_address(), Some(0x1_0000_4010));
    }

    #[test]
    fn entry_point_may_precede_text() {
        let images = single(
            ImageBuilder::new()
                .entry_point(0x20)
                .segment("__TEXT", 0x4000, &[])
                .build(),
        );
        let base = find_base_reference(&images, 0).unwrap();
        assert_eq!(base.static_base_address, 0x4000);
        assert_eq!(base.entry_offset, 0x20);
    }

    #[test]
    fn base_reference_needs_both_fields() {
        let dylib = single(ImageBuilder::new().segment("__TEXT", 0x0, &["__text"]).build());
        assert!(matches!(
            find_base_reference(&dylib, 0),
            Err(Error::NotFound(_))
        ));

        let no_text = single(
            ImageBuilder::new()
                .segment("__DATA", 0x8000, &[])
                .entry_point(0x10)
                .build(),
        );
        assert!(matches!(
            find_base_reference(&no_text, 0),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn first_text_and_main_win() {
        let images = single(
            ImageBuilder::new()
                .segment("__TEXT", 0x1000, &[])
                .entry_point(0x10)
                .segment("__TEXT", 0x2000, &[])
                .entry_point(0x20)
                .build(),
        );
        let base = find_base_reference(&images, 0).unwrap();
        assert_eq!(base.static_base_address, 0x1000);
        assert_eq!(base.entry_offset, 0x10);
    }

    #[test]
    fn walk_stops_once_both_are_found() {
        // The trailing command is corrupt but never reached.
        let mut image = ImageBuilder::new()
            .segment("__TEXT", 0x1000, &[])
            .entry_point(0x10)
            .raw_command(0x2, &[0; 8])
            .build();
        let last = image.len() - 16;
        image[last + 4..last + 8].copy_from_slice(&0u32.to_ne_bytes());
        let images = single(image);

        assert!(find_base_reference(&images, 0).is_ok());
        assert!(matches!(
            find_sections(&images, 0),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn sections_in_segment_then_declaration_order() {
        let images = single(
            ImageBuilder::new()
                .segment("__PAGEZERO", 0, &[])
                .segment("__TEXT", 0x1000, &["__text", "__stubs"])
                .entry_point(0x10)
                .segment("__DATA", 0x8000, &["__data", "__bss", "__common"])
                .build(),
        );
        let sections = find_sections(&images, 0).unwrap();
        let names: Vec<_> = sections
            .iter()
            .map(|s| (s.segment_name(), s.name()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("__TEXT", "__text"),
                ("__TEXT", "__stubs"),
                ("__DATA", "__data"),
                ("__DATA", "__bss"),
                ("__DATA", "__common"),
            ]
        );
        assert_eq!(sections[1].address(), 0x1000 + BUILDER_SECTION_SIZE);
        assert_eq!(sections[4].address(), 0x8000 + 2 * BUILDER_SECTION_SIZE);
    }

    #[test]
    fn sections_point_into_the_header() {
        let images = single(ImageBuilder::new().segment("__TEXT", 0x1000, &["__text"]).build());
        let header = images.header_at(0).unwrap();
        let sections = find_sections(&images, 0).unwrap();
        let expected = header[HEADER_SIZE + 72..].as_ptr();
        assert_eq!(sections[0].as_ptr(), expected);
    }

    #[test]
    fn no_sections_is_an_empty_success() {
        let no_segments = single(ImageBuilder::new().entry_point(0x10).build());
        assert_eq!(find_sections(&no_segments, 0).unwrap().len(), 0);

        let empty_segments = single(
            ImageBuilder::new()
                .segment("__PAGEZERO", 0, &[])
                .segment("__LINKEDIT", 0x9000, &[])
                .build(),
        );
        assert!(find_sections(&empty_segments, 0).unwrap().is_empty());

        let no_commands = single(ImageBuilder::new().build());
        assert!(find_sections(&no_commands, 0).unwrap().is_empty());
    }

    #[test]
    fn missing_header_is_invalid_header() {
        let mut images = InMemoryImages::new();
        images.push_without_header("/tmp/Gone");

        assert_eq!(
            find_sections(&images, 0).unwrap_err(),
            Error::InvalidHeader { index: 0 }
        );
        assert_eq!(
            find_base_reference(&images, 5).unwrap_err(),
            Error::InvalidHeader { index: 5 }
        );
        assert_eq!(
            find_uuid(&images, u32::MAX).unwrap_err(),
            Error::InvalidHeader { index: u32::MAX }
        );
    }

    #[test]
    fn uuid_lookup() {
        let uuid = [0xab; 16];
        let images = single(
            ImageBuilder::new()
                .segment("__TEXT", 0x1000, &[])
                .uuid(uuid)
                .build(),
        );
        assert_eq!(find_uuid(&images, 0).unwrap(), uuid);

        let without = single(ImageBuilder::new().segment("__TEXT", 0x1000, &[]).build());
        assert!(matches!(find_uuid(&without, 0), Err(Error::NotFound(_))));
    }

    #[test]
    fn queries_are_idempotent() {
        let images = single(
            ImageBuilder::new()
                .segment("__TEXT", 0x1000, &["__text", "__const"])
                .entry_point(0x10)
                .build(),
        );
        assert_eq!(
            find_base_reference(&images, 0),
            find_base_reference(&images, 0)
        );
        assert_eq!(find_sections(&images, 0), find_sections(&images, 0));
    }
}
