extern crate dylib_mem;

use dylib_mem::memory::{ImageBuilder, InMemoryImages};
use dylib_mem::{
    find_base_reference, find_image_index, find_sections, BaseReference, Error, ImageList,
};

fn process() -> InMemoryImages {
    let mut images = InMemoryImages::new();
    images.push(
        "/usr/lib/dyld",
        ImageBuilder::new()
            .segment("__TEXT", 0x0, &["__text"])
            .build(),
    );
    images.push(
        "/Applications/Game.app/Contents/MacOS/Game",
        ImageBuilder::new()
            .segment("__TEXT", 0x1_0000_0000, &["__text", "__stubs", "__cstring"])
            .entry_point(0x4010)
            .build(),
    );
    images.push_without_header("/usr/lib/libunloaded.dylib");
    images
}

#[test]
fn locate_then_extract() {
    let images = process();
    let index = find_image_index(&images, "Game").unwrap();
    assert_eq!(index, 1);

    assert_eq!(
        find_base_reference(&images, index).unwrap(),
        BaseReference {
            static_base_address: 0x1_0000_0000,
            entry_offset: 0x4010,
        }
    );

    let sections = find_sections(&images, index).unwrap();
    let names: Vec<_> = sections.iter().map(|s| s.name()).collect();
    assert_eq!(names, ["__text", "__stubs", "__cstring"]);
}

#[test]
fn section_count_matches_nsects() {
    let images = process();
    for index in 0..images.count() {
        let header = match images.header_at(index) {
            Some(header) => header,
            None => continue,
        };
        let expected: u32 = dylib_mem::load_commands(header)
            .unwrap()
            .filter_map(|cmd| match cmd.unwrap() {
                dylib_mem::LoadCommand::Segment(seg) => Some(seg.nsects()),
                _ => None,
            })
            .sum();
        assert_eq!(find_sections(&images, index).unwrap().len(), expected as usize);
    }
}

#[test]
fn unloaded_and_out_of_range_images() {
    let images = process();
    let unloaded = find_image_index(&images, "libunloaded.dylib").unwrap();
    assert_eq!(
        find_sections(&images, unloaded).unwrap_err(),
        Error::InvalidHeader { index: unloaded }
    );
    assert_eq!(
        find_base_reference(&images, 99).unwrap_err(),
        Error::InvalidHeader { index: 99 }
    );
}

#[test]
fn dylib_without_entry_point() {
    let images = process();
    let dyld = find_image_index(&images, "dyld").unwrap();
    assert!(matches!(
        find_base_reference(&images, dyld),
        Err(Error::NotFound(_))
    ));
    assert_eq!(find_sections(&images, dyld).unwrap().len(), 1);
}
