//! The macOS implementation of the [`ImageList`
//! trait](../trait.ImageList.html), backed by dyld.

use crate::macho::HEADER_SIZE;
use crate::ImageList;

use std::ffi::CStr;
use std::slice;
use std::sync::{Mutex, MutexGuard, PoisonError};

lazy_static! {
    /// A lock protecting dyld FFI calls.
    ///
    /// dyld offers no atomic way to walk its image list, so take this lock
    /// whenever you dynamically load or unload images, to avoid racing with
    /// a [`DyldImages`] snapshot.
    pub static ref DYLD_LOCK: Mutex<()> = Mutex::new(());
}

/// The images dyld has loaded into this process.
///
/// Wraps `_dyld_image_count`, `_dyld_get_image_name` and
/// `_dyld_get_image_header` from `<mach-o/dyld.h>`. Holds [`DYLD_LOCK`]
/// for as long as it lives.
#[derive(Debug)]
pub struct DyldImages {
    _lock: MutexGuard<'static, ()>,
}

impl DyldImages {
    /// Take the dyld lock and expose the current image list.
    pub fn lock() -> DyldImages {
        let guard = DYLD_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        DyldImages { _lock: guard }
    }
}

#[allow(deprecated)]
impl ImageList for DyldImages {
    fn count(&self) -> u32 {
        unsafe { libc::_dyld_image_count() }
    }

    fn path_at(&self, index: u32) -> Option<&CStr> {
        let name = unsafe { libc::_dyld_get_image_name(index) };
        if name.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(name) })
        }
    }

    fn header_at(&self, index: u32) -> Option<&[u8]> {
        let header = unsafe { libc::_dyld_get_image_header(index) } as *const u8;
        if header.is_null() {
            return None;
        }

        // `sizeofcmds` sits at the same offset in 32- and 64-bit headers, and
        // the load commands always follow the header in the same mapping.
        let fixed = unsafe { slice::from_raw_parts(header, HEADER_SIZE) };
        let sizeofcmds = u32::from_ne_bytes([fixed[20], fixed[21], fixed[22], fixed[23]]);
        let len = HEADER_SIZE.checked_add(sizeofcmds as usize)?;
        Some(unsafe { slice::from_raw_parts(header, len) })
    }
}
