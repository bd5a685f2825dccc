//! Builds Windows `.rsrc` COFF objects (`.syso` files) that embed an application manifest.
//!
//! The object is described as a schema tree ([`schema::CoffObject`]), laid out by a pure
//! offset pass ([`Layout`]) and then serialized by walking the resolved tree ([`emit()`]).
//!
//! ```rust,no_run
//! use rsrc::{Arch, ManifestResource, RsrcSettings};
//!
//! let written = ManifestResource::from_path("app.exe.manifest")?
//!     .with_configuration(RsrcSettings::new().arch(Arch::Amd64))
//!     .write_to_path("rsrc.syso")?;
//! println!("wrote {} bytes", written);
//! # Ok::<(), rsrc::RsrcError>(())
//! ```
#![forbid(unsafe_code)]
#![deny(unused_must_use)]

pub mod err;
pub mod ico;
pub mod layout;
pub mod reader;
pub mod schema;
pub mod walk;

mod emit;
mod resource;
mod settings;
mod sized_stream;

pub use emit::{emit, emit_node};
pub use err::{DecodeError, IconError, LayoutError, Result, RsrcError};
pub use layout::Layout;
pub use reader::CoffResourceObject;
pub use resource::{ManifestResource, validate_icon_file};
pub use schema::CoffObject;
pub use settings::{Arch, DEFAULT_LANGUAGE_ID, RsrcSettings};
pub use sized_stream::SizedStream;
