//! Image processing — the opaque collaborator behind the deferral protocol.
//!
//! The rest of the crate treats pixel work as a single operation behind the
//! [`ImageBackend`] trait: *render this variation spec to this path*. The
//! gate and materializer never look inside; they only care that rendering
//! the same [`VariationParams`] twice produces the same bytes.
//!
//! - **Backend**: [`ImageBackend`] trait + [`VariationParams`]
//! - **RustBackend**: pure-Rust implementation on the `image` crate
//!   (Lanczos3 resize, anchored/focal cover-crops, rotation, flips)

pub mod backend;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend, VariationParams};
pub use rust_backend::RustBackend;
