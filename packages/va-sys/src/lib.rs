//! Raw VA-API (libva) bindings.
//!
//! This crate provides low-level bindings to libva, covering the subset of
//! the API needed for hardware H.264 encoding: display bring-up, config and
//! context lifecycle, surface and buffer management, picture submission and
//! coded-data retrieval. The declarations are hand-maintained against the
//! official `va/va.h`, `va/va_enc_h264.h` and `va/va_drm.h` headers.
//!
//! For a higher-level, safe API, use the `vastream-codec` crate instead.
//!
//! ## Modules
//!
//! - [`va`] - core VA-API types, constants and functions
//! - [`va_enc_h264`] - H.264 encode parameter buffers
//! - [`va_drm`] - DRM render-node display acquisition

#![allow(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    clippy::all,
    dead_code
)]

pub mod va;
pub mod va_drm;
pub mod va_enc_h264;

pub use va::*;
pub use va_drm::*;
pub use va_enc_h264::*;
