/*!
# Galaxy 3D Geometry

CPU-side geometry storage and draw batching for the Galaxy 3D editor renderers.

All vertex and index data of the editor lives in a few large buffers which are
mirrored to GPU buffer objects. Renderers hand out small opaque handles and
submit batched indexed draws over those shared buffers.

## Architecture

- **ContinuousBuffer**: growable element array with slot-based sub-allocation
- **GeometryStore**: multi-buffered vertex + index ContinuousBuffers, fenced per frame
- **CompactWindingVertexBuffer**: packed storage for windings of one size
- **GeometryRenderer / SurfaceRenderer / WindingRenderer**: handle-based façades
- **BufferObjectProvider / SyncObjectProvider / DrawCallIssuer**: the GPU seam,
  implemented by a graphics backend
*/

// Internal modules
mod error;
pub mod log;
pub mod gpu;
pub mod storage;
pub mod winding;
pub mod renderer;
pub mod utils;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
        pub use crate::log::{set_logger, reset_logger, set_min_severity, min_severity};
    }

    // GPU seam sub-module
    pub mod gpu {
        pub use crate::gpu::*;
    }

    // Storage sub-module
    pub mod storage {
        pub use crate::storage::*;
    }

    // Winding sub-module
    pub mod winding {
        pub use crate::winding::*;
    }

    // Render sub-module with the renderer façades
    pub mod render {
        pub use crate::renderer::*;
    }
}

// Re-export math library at crate root
pub use glam;
