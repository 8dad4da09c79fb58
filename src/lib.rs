//! # `dylib-mem`
//!
//! Find a Mach-O image loaded in this process by name, and read back what
//! its header says about it: the address it was linked to load at, the
//! file offset of its entry point, and the sections it declares.
//!
//! Everything is read straight out of the header the loader mapped, by
//! walking the image's load commands. No symbol table is consulted.
//!
//! ## Example
//!
//! ```no_run
//! use dylib_mem::{find_base_reference, find_image_index, find_sections, TargetImageList};
//!
//! let images = TargetImageList::lock();
//! let index = find_image_index(&images, "MyApp").unwrap();
//!
//! let base = find_base_reference(&images, index).unwrap();
//! println!("linked at {:#x}, entry at +{:#x}", base.static_base_address, base.entry_offset);
//!
//! for sect in find_sections(&images, index).unwrap() {
//!     println!("    {},{} @ {:#x}", sect.segment_name(), sect.name(), sect.address());
//! }
//! ```
//!
//! ## Addresses
//!
//! The addresses returned here are *stated* virtual memory addresses
//! (SVMAs): the values recorded in the header, before the loader slides
//! the image to wherever it actually ends up. To turn a runtime address
//! back into a static one, subtract the slide; the static base address of
//! `__TEXT` is the anchor for that arithmetic.
//!
//! ## Lifetimes
//!
//! Every [`Section`] borrows the image's mapped header. It is only
//! meaningful while the image stays loaded, which the borrow of the image
//! list expresses but cannot enforce against a concurrent `dlclose`.

#![deny(missing_docs)]

#[cfg(any(target_os = "macos", target_os = "ios"))]
#[macro_use]
extern crate lazy_static;

use std::ffi::CStr;

mod error;
mod extract;
mod locate;
pub mod macho;
pub mod memory;
pub mod walker;

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub mod macos;

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub mod unsupported;

/// The [`ImageList` trait](./trait.ImageList.html) implementation for the
/// target operating system.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub type TargetImageList = macos::DyldImages;

/// The [`ImageList` trait](./trait.ImageList.html) implementation for the
/// target operating system.
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub type TargetImageList = unsupported::NoImages;

pub use error::{Error, Result};
pub use extract::{find_base_reference, find_sections, find_uuid, BaseReference};
pub use locate::{basename, find_image_index};
pub use macho::Section;
pub use walker::{load_commands, LoadCommand, LoadCommands};

/// The set of images loaded into a process, indexed from zero.
///
/// Implementations must keep the count, paths and headers stable for as
/// long as a borrow of the list is alive.
pub trait ImageList {
    /// Number of images currently loaded.
    fn count(&self) -> u32;

    /// Filesystem path of image `index`, or `None` if out of range.
    fn path_at(&self, index: u32) -> Option<&CStr>;

    /// The mapped header of image `index` followed by its load commands,
    /// or `None` if out of range or the image has no header.
    fn header_at(&self, index: u32) -> Option<&[u8]>;
}

impl<'a, L: ImageList + ?Sized> ImageList for &'a L {
    #[inline]
    fn count(&self) -> u32 {
        (**self).count()
    }

    #[inline]
    fn path_at(&self, index: u32) -> Option<&CStr> {
        (**self).path_at(index)
    }

    #[inline]
    fn header_at(&self, index: u32) -> Option<&[u8]> {
        (**self).header_at(index)
    }
}
