extern crate dylib_mem;

use dylib_mem::{find_base_reference, find_image_index, find_sections, TargetImageList};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let name = match std::env::args().nth(1) {
        Some(name) => name,
        None => {
            eprintln!("usage: dump_sections <image name>");
            std::process::exit(2);
        }
    };

    let images = TargetImageList::lock();
    let index = match find_image_index(&images, &name) {
        Ok(index) => index,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };
    println!("{} (image {})", name, index);

    match find_base_reference(&images, index) {
        Ok(base) => println!(
            "    static base 0x{:x}, entry offset 0x{:x}",
            base.static_base_address, base.entry_offset
        ),
        Err(err) => println!("    ({})", err),
    }

    match find_sections(&images, index) {
        Ok(sections) => {
            for sect in sections {
                println!(
                    "    0x{:x}: section {},{} ({} bytes)",
                    sect.address(),
                    sect.segment_name(),
                    sect.name(),
                    sect.size()
                );
            }
        }
        Err(err) => println!("    ({})", err),
    }
}
