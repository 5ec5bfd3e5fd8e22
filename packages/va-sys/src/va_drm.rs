//! DRM render-node display acquisition from `va/va_drm.h`.

use std::os::raw::c_int;

use crate::va::VADisplay;

#[link(name = "va-drm")]
extern "C" {
    /// Returns a `VADisplay` backed by an open DRM file descriptor
    /// (typically `/dev/dri/renderD128`). The caller keeps ownership of the
    /// descriptor and must keep it open for the lifetime of the display.
    pub fn vaGetDisplayDRM(fd: c_int) -> VADisplay;
}
