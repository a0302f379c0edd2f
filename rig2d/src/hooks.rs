//! Host capability hooks.
//!
//! The runtime never reads files or talks to a GPU itself. Asset decoders and
//! renderer integrations that sit on top of this crate receive their I/O
//! through an explicit [`HostHooks`] value injected at system initialization,
//! so there is no process-wide mutable configuration to override.

use std::cell::Cell;
use std::io;
use std::rc::Rc;

/// Opaque reference to a drawable texture owned by the host renderer.
///
/// Handles are minted by [`HostHooks::create_texture`]; the runtime only
/// stores and forwards them on emitted quads.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TextureHandle(pub u64);

/// Decoded image pixels handed to the texture-creation hook.
#[derive(Clone, Debug)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8, row-major, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
}

type ReadFileFn = dyn Fn(&str) -> io::Result<Vec<u8>>;
type CreateTextureFn = dyn Fn(&ImageData) -> TextureHandle;

/// Pluggable host services used while building a skeleton template.
pub struct HostHooks {
    pub read_file: Box<ReadFileFn>,
    pub create_texture: Box<CreateTextureFn>,
}

impl HostHooks {
    pub fn new(read_file: Box<ReadFileFn>, create_texture: Box<CreateTextureFn>) -> Self {
        Self {
            read_file,
            create_texture,
        }
    }

    pub fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        (self.read_file)(path)
    }

    pub fn create_texture(&self, image: &ImageData) -> TextureHandle {
        (self.create_texture)(image)
    }
}

impl Default for HostHooks {
    /// Reads through `std::fs` and mints sequential placeholder handles.
    /// Hosts with a real renderer replace `create_texture`.
    fn default() -> Self {
        let next = Rc::new(Cell::new(1u64));
        Self {
            read_file: Box::new(|path| std::fs::read(path)),
            create_texture: Box::new(move |_image| {
                let handle = TextureHandle(next.get());
                next.set(next.get() + 1);
                handle
            }),
        }
    }
}

impl std::fmt::Debug for HostHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHooks").finish_non_exhaustive()
    }
}
