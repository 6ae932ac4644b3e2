//! # Delayed Variations
//!
//! A deferred image variation server. Derived image sizes are *named*
//! eagerly but *generated* lazily: a resize request costs one small JSON
//! record instead of pixel work, and the real resize happens on the first
//! HTTP request for the derived filename.
//!
//! # Architecture: Name Now, Render Later
//!
//! Four components cooperate around one naming convention:
//!
//! ```text
//! 1. Namer         (source, WxH, options)  →  photo.600x400-nw.jpg     (pure)
//! 2. Gate          resize request          →  photo.600x400-nw.jpg.queue
//! 3. Materializer  404 + queue record      →  real resize, serve bytes
//! 4. Cleanup       source deleted          →  remove its records by prefix
//! ```
//!
//! The derived filename is a deterministic function of the request, so the
//! gate can hand back a URL without rendering anything. The queue record
//! next to the would-be file carries everything the materializer needs to
//! reproduce the render later. Once materialized, the file exists and the
//! server never consults the queue for that name again.
//!
//! This design holds up under the failure modes that matter:
//!
//! - **Crash mid-render**: the record was deleted first, so the client sees
//!   a plain 404 and recovers by re-requesting through the gate.
//! - **Concurrent requests**: rendering is deterministic, so two racing
//!   materializations of the same record converge on identical bytes.
//! - **Deleted originals**: records are scoped by filename prefix, so bulk
//!   cleanup for `foo.jpg` cannot touch `foobar.jpg`'s queue.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`naming`] | Pure derived-filename construction: crop codes, suffixes, rotation tags |
//! | [`options`] | The resize option table and its merge precedence (defaults ← config ← request) |
//! | [`sizer`] | The deferral gate — decides defer-or-execute per request |
//! | [`queue`] | Pending-record store: JSON `.queue` files next to the would-be variation |
//! | [`materialize`] | Consumes a record, runs the real resize, hands back servable bytes |
//! | [`serve`] | HTTP front end with not-found interception |
//! | [`source`] | Source images, focus sidecars, and the variation value type |
//! | [`imaging`] | Pixel work behind the [`imaging::ImageBackend`] trait (pure-Rust backend) |
//! | [`config`] | TOML config: root, URL prefix, resize defaults, deferral policy |
//!
//! # Design Decisions
//!
//! ## Filenames Are the Protocol
//!
//! There is no database and no job queue service. The derived filename
//! encodes the full request (`photo.600x400-nw.jpg`), the `.queue` sidecar
//! is the pending state, and the file's existence is the completed state.
//! Everything is inspectable with `ls` and recoverable with `rm`.
//!
//! ## Records Die Before the Render
//!
//! The materializer deletes the queue record before rendering, not after.
//! A crash mid-render therefore loses the deferral rather than wedging it
//! permanently; the cost is one redundant deferral round-trip on recovery.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate (Lanczos3 resampling) for
//! decode, resize, and encode. No ImageMagick, no system dependencies; the
//! binary is self-contained. The [`imaging::ImageBackend`] trait keeps the
//! gate and materializer independent of the pixel pipeline, and the mock
//! backend behind it lets the protocol be tested without encoding a single
//! image.

pub mod config;
pub mod imaging;
pub mod materialize;
pub mod naming;
pub mod options;
pub mod queue;
pub mod serve;
pub mod sizer;
pub mod source;
