//! The fallback implementation of the [`ImageList`
//! trait](../trait.ImageList.html) for targets without dyld.

use crate::ImageList;

use std::ffi::CStr;

/// An image list that is always empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImages;

impl NoImages {
    /// Mirrors `DyldImages::lock` so callers can stay target independent.
    pub fn lock() -> NoImages {
        NoImages
    }
}

impl ImageList for NoImages {
    #[inline]
    fn count(&self) -> u32 {
        0
    }

    #[inline]
    fn path_at(&self, _index: u32) -> Option<&CStr> {
        None
    }

    #[inline]
    fn header_at(&self, _index: u32) -> Option<&[u8]> {
        None
    }
}
