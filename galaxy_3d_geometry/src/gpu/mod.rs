/// GPU seam - buffer objects, fences and draw submission
///
/// The geometry layer never talks to a graphics API directly. Backends
/// (OpenGL, Vulkan...) implement these traits and are injected into the
/// GeometryStore and the renderer façades.

pub mod buffer_object;
pub mod sync_object;
pub mod draw;

// In-memory implementations for tests and headless tools
pub mod mock;

pub use buffer_object::*;
pub use sync_object::*;
pub use draw::*;
