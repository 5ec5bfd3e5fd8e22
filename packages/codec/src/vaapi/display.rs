//! VA-API display bring-up and status handling.

use std::ffi::CStr;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

use tracing::info;
use va_sys as va;

use crate::CodecError;

/// Extension trait turning raw `VAStatus` codes into [`CodecError`]s with
/// the failing call name and the driver's error string attached.
pub(crate) trait VaStatusExt {
    fn check(self, call: &'static str) -> Result<(), CodecError>;
}

impl VaStatusExt for va::VAStatus {
    fn check(self, call: &'static str) -> Result<(), CodecError> {
        if self == va::VA_STATUS_SUCCESS {
            return Ok(());
        }
        let detail = unsafe {
            let ptr = va::vaErrorStr(self);
            if ptr.is_null() {
                format!("status {self:#x}")
            } else {
                CStr::from_ptr(ptr).to_string_lossy().into_owned()
            }
        };
        Err(CodecError::VaCall { call, detail })
    }
}

/// An initialized VA-API display backed by a DRM render node.
///
/// The node's file descriptor stays open for the display's lifetime;
/// dropping the display terminates the driver connection before the
/// descriptor closes.
pub struct Display {
    handle: va::VADisplay,
    _node: File,
}

// The libva display handle may be used from multiple threads as long as
// calls against a single context are serialized, which the encode session
// and output worker guarantee through the surface tracker.
unsafe impl Send for Display {}
unsafe impl Sync for Display {}

impl Display {
    /// Open the first usable DRM render node and initialize libva on it.
    pub fn open() -> Result<Self, CodecError> {
        let mut last_failure = String::from("no render nodes present under /dev/dri");

        for minor in 128..=135 {
            let path = format!("/dev/dri/renderD{minor}");
            let node = match OpenOptions::new().read(true).write(true).open(&path) {
                Ok(file) => file,
                Err(err) => {
                    last_failure = format!("{path}: {err}");
                    continue;
                }
            };

            let handle = unsafe { va::vaGetDisplayDRM(node.as_raw_fd()) };
            if handle.is_null() {
                last_failure = format!("{path}: vaGetDisplayDRM returned no display");
                continue;
            }

            let mut major = 0;
            let mut minor_version = 0;
            let status = unsafe { va::vaInitialize(handle, &mut major, &mut minor_version) };
            if status != va::VA_STATUS_SUCCESS {
                let detail = unsafe { CStr::from_ptr(va::vaErrorStr(status)) };
                last_failure = format!("{path}: vaInitialize: {}", detail.to_string_lossy());
                continue;
            }

            info!(
                node = %path,
                version = format_args!("{major}.{minor_version}"),
                "VA-API display initialized"
            );
            return Ok(Self {
                handle,
                _node: node,
            });
        }

        Err(CodecError::NoRenderNode(last_failure))
    }

    /// The raw display handle for FFI calls.
    #[must_use]
    pub fn handle(&self) -> va::VADisplay {
        self.handle
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        unsafe {
            va::vaTerminate(self.handle);
        }
    }
}
