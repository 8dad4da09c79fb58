//! Finding an image by the base name of its path.

use crate::error::{Error, Result};
use crate::ImageList;

/// The final `/`-separated component of `path`.
///
/// Trailing slashes are ignored, as `basename(3)` does.
pub fn basename(path: &[u8]) -> &[u8] {
    let mut end = path.len();
    while end > 1 && path[end - 1] == b'/' {
        end -= 1;
    }
    let trimmed = &path[..end];
    match trimmed.iter().rposition(|&b| b == b'/') {
        Some(slash) if trimmed.len() > 1 => &trimmed[slash + 1..],
        _ => trimmed,
    }
}

/// Find the lowest index whose image path has base name `name`.
///
/// The comparison is exact and case sensitive.
pub fn find_image_index<L: ImageList + ?Sized>(images: &L, name: &str) -> Result<u32> {
    let count = images.count();
    for index in 0..count {
        let path = match images.path_at(index) {
            Some(path) => path,
            None => continue,
        };
        if basename(path.to_bytes()) == name.as_bytes() {
            tracing::debug!(index, path = %path.to_string_lossy(), "image located");
            return Ok(index);
        }
    }
    tracing::debug!(name, count, "no loaded image matches");
    Err(Error::NotFound(format!("image {}", name)))
}
