//! Video frames handed to the output driver, with optional HDR metadata.
//!
//! Two frame families exist. Synthetic frames ([`PlainVideoFrame`],
//! [`HdrVideoFrame`]) are plain Rust values answering the driver's queries
//! verbatim from their constructor arguments. Driver-owned frames surface
//! here only through the [`MutableVideoFrame`] write interface, because the
//! driver's own frame objects cannot carry caller-attached metadata without
//! the decoration path in [`attach_hdr_metadata`].

use common_io::{FrameFlags, HdrMetadata, PixelFormat, metadata_id};
use std::ptr::NonNull;
use thiserror::Error;

/// Failure signal of the per-field metadata protocol.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The field id is outside the recognized set, or the frame does not
    /// carry metadata at all.
    #[error("invalid metadata field id {0:#010x}")]
    InvalidArgument(u32),
}

/// A non-owning view over caller-supplied pixel memory.
///
/// The memory must stay valid, and must not be mutated by the caller, for
/// the entire lifetime of every frame built on top of it; the bridge never
/// copies or frees it. Concurrent reads by the driver and the consumer are
/// the caller's to serialize.
#[derive(Clone, Copy, Debug)]
pub struct VideoBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl VideoBuffer {
    /// # Safety
    /// `ptr` must point at `len` readable bytes satisfying the lifetime
    /// contract above.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| VideoBuffer { ptr, len })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// The view itself is freely shareable; serializing access to the bytes is
// the caller's contract.
unsafe impl Send for VideoBuffer {}
unsafe impl Sync for VideoBuffer {}

/// Geometry and pixel layout of a frame.
///
/// `row_bytes * height` must not exceed the capacity of the backing buffer;
/// the bridge does not check this bound, violating it is undefined at the
/// driver boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameDesc {
    pub width: u32,
    pub height: u32,
    pub row_bytes: usize,
    pub pixel_format: PixelFormat,
}

impl FrameDesc {
    pub fn buffer_len(&self) -> usize {
        self.row_bytes * self.height as usize
    }
}

/// The baseline frame protocol the driver consumes.
///
/// All getters return the constructor-supplied values verbatim. The
/// [`metadata`](VideoFrame::metadata) method is the widening capability
/// query of the component model: a frame that also implements the metadata
/// extension returns itself, every other frame answers `None`.
pub trait VideoFrame: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn row_bytes(&self) -> usize;
    fn pixel_format(&self) -> PixelFormat;
    fn flags(&self) -> FrameFlags;
    fn bytes(&self) -> *const u8;

    fn metadata(&self) -> Option<&dyn FrameMetadata> {
        None
    }
}

/// The metadata-extension protocol, dispatching lookups by raw field id.
pub trait FrameMetadata {
    fn metadata_int(&self, id: u32) -> Result<i64, FrameError>;
    fn metadata_float(&self, id: u32) -> Result<f64, FrameError>;

    /// Flag-valued lookups are not carried by this provider.
    fn metadata_flag(&self, id: u32) -> Result<bool, FrameError> {
        Err(FrameError::InvalidArgument(id))
    }

    /// String-valued lookups are not carried by this provider.
    fn metadata_string(&self, id: u32) -> Result<String, FrameError> {
        Err(FrameError::InvalidArgument(id))
    }

    /// Raw-byte lookups are not carried by this provider.
    fn metadata_bytes(&self, id: u32) -> Result<Vec<u8>, FrameError> {
        Err(FrameError::InvalidArgument(id))
    }
}

/// Write interface of a driver-owned mutable frame. Every setter collapses
/// the driver status to a plain success flag.
pub trait MutableVideoFrame: VideoFrame {
    fn set_flags(&mut self, flags: FrameFlags) -> bool;
    fn set_metadata_int(&mut self, id: u32, value: i64) -> bool;
    fn set_metadata_float(&mut self, id: u32, value: f64) -> bool;
}

enum FrameBytes {
    Borrowed(VideoBuffer),
    Owned(Vec<u8>),
}

impl FrameBytes {
    fn as_ptr(&self) -> *const u8 {
        match self {
            FrameBytes::Borrowed(view) => view.as_ptr(),
            FrameBytes::Owned(bytes) => bytes.as_ptr(),
        }
    }

    /// Owned storage only. Borrowed memory belongs to the caller and is
    /// not handed out mutably.
    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self {
            FrameBytes::Borrowed(_) => None,
            FrameBytes::Owned(bytes) => Some(bytes),
        }
    }
}

/// A frame without metadata: reports no HDR flag and rejects every
/// metadata query.
pub struct PlainVideoFrame {
    desc: FrameDesc,
    bytes: FrameBytes,
}

impl PlainVideoFrame {
    /// Wraps caller-owned memory without taking ownership.
    pub fn with_buffer(desc: FrameDesc, buffer: VideoBuffer) -> Self {
        PlainVideoFrame {
            desc,
            bytes: FrameBytes::Borrowed(buffer),
        }
    }

    /// Allocates zeroed backing storage sized to the descriptor.
    pub fn allocate(desc: FrameDesc) -> Self {
        PlainVideoFrame {
            bytes: FrameBytes::Owned(vec![0; desc.buffer_len()]),
            desc,
        }
    }

    /// Mutable view of the pixel data, for frames with owned storage.
    pub fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.bytes.as_mut_slice()
    }
}

impl VideoFrame for PlainVideoFrame {
    fn width(&self) -> u32 {
        self.desc.width
    }
    fn height(&self) -> u32 {
        self.desc.height
    }
    fn row_bytes(&self) -> usize {
        self.desc.row_bytes
    }
    fn pixel_format(&self) -> PixelFormat {
        self.desc.pixel_format
    }
    fn flags(&self) -> FrameFlags {
        FrameFlags::empty()
    }
    fn bytes(&self) -> *const u8 {
        self.bytes.as_ptr()
    }
}

/// A frame that always carries a full HDR metadata block. Once constructed
/// the contains-HDR-metadata flag is fixed; a frame not meant to carry
/// metadata should be a [`PlainVideoFrame`] instead.
pub struct HdrVideoFrame {
    desc: FrameDesc,
    bytes: FrameBytes,
    hdr: HdrMetadata,
}

impl HdrVideoFrame {
    /// Wraps caller-owned memory without taking ownership.
    pub fn with_buffer(desc: FrameDesc, buffer: VideoBuffer, hdr: HdrMetadata) -> Self {
        HdrVideoFrame {
            desc,
            bytes: FrameBytes::Borrowed(buffer),
            hdr,
        }
    }

    /// Allocates zeroed backing storage sized to the descriptor.
    pub fn allocate(desc: FrameDesc, hdr: HdrMetadata) -> Self {
        HdrVideoFrame {
            bytes: FrameBytes::Owned(vec![0; desc.buffer_len()]),
            desc,
            hdr,
        }
    }

    /// Mutable view of the pixel data, for frames with owned storage.
    pub fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.bytes.as_mut_slice()
    }

    pub fn hdr_metadata(&self) -> &HdrMetadata {
        &self.hdr
    }
}

impl VideoFrame for HdrVideoFrame {
    fn width(&self) -> u32 {
        self.desc.width
    }
    fn height(&self) -> u32 {
        self.desc.height
    }
    fn row_bytes(&self) -> usize {
        self.desc.row_bytes
    }
    fn pixel_format(&self) -> PixelFormat {
        self.desc.pixel_format
    }
    fn flags(&self) -> FrameFlags {
        FrameFlags::CONTAINS_HDR_METADATA
    }
    fn bytes(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    fn metadata(&self) -> Option<&dyn FrameMetadata> {
        Some(self)
    }
}

impl FrameMetadata for HdrVideoFrame {
    fn metadata_int(&self, id: u32) -> Result<i64, FrameError> {
        self.hdr.int_field(id).ok_or(FrameError::InvalidArgument(id))
    }

    fn metadata_float(&self, id: u32) -> Result<f64, FrameError> {
        self.hdr
            .float_field(id)
            .ok_or(FrameError::InvalidArgument(id))
    }
}

/// Decorates a driver-owned mutable frame with an HDR metadata block.
///
/// Writes the contains-HDR-metadata flag, then the fourteen fields in the
/// driver's expected order: EOTF, the twelve float fields, colorspace.
/// Returns `false` as soon as a field write is rejected. Fields written up
/// to that point are NOT rolled back; the frame is left partially
/// decorated, exactly as the driver leaves it.
pub fn attach_hdr_metadata(frame: &mut dyn MutableVideoFrame, hdr: &HdrMetadata) -> bool {
    let mut success = frame.set_flags(FrameFlags::CONTAINS_HDR_METADATA);

    success &= frame.set_metadata_int(metadata_id::HDR_EOTF, hdr.eotf)
        && hdr
            .float_fields_in_write_order()
            .iter()
            .all(|&(id, value)| frame.set_metadata_float(id, value))
        && frame.set_metadata_int(
            metadata_id::COLORSPACE,
            hdr.colorspace.as_raw() as i64,
        );
    success
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_io::Colorspace;

    fn desc() -> FrameDesc {
        FrameDesc {
            width: 1920,
            height: 1080,
            row_bytes: 1920 * 4,
            pixel_format: PixelFormat::Bgra8,
        }
    }

    #[test]
    fn hdr_frame_reports_flag_and_all_fields() {
        let hdr = HdrMetadata::rec709(2);
        let frame = HdrVideoFrame::allocate(desc(), hdr);

        assert!(frame.flags().contains(FrameFlags::CONTAINS_HDR_METADATA));
        let meta = frame.metadata().expect("hdr frame widens to metadata");
        assert_eq!(meta.metadata_int(metadata_id::HDR_EOTF), Ok(2));
        assert_eq!(
            meta.metadata_int(metadata_id::COLORSPACE),
            Ok(Colorspace::Rec709.as_raw() as i64)
        );
        for (id, value) in hdr.float_fields_in_write_order() {
            assert_eq!(meta.metadata_float(id), Ok(value));
        }
    }

    #[test]
    fn hdr_frame_rejects_unknown_and_unsupported_queries() {
        let frame = HdrVideoFrame::allocate(desc(), HdrMetadata::rec709(0));
        let meta = frame.metadata().unwrap();

        assert_eq!(
            meta.metadata_int(0x1234_5678),
            Err(FrameError::InvalidArgument(0x1234_5678))
        );
        assert_eq!(
            meta.metadata_float(metadata_id::COLORSPACE),
            Err(FrameError::InvalidArgument(metadata_id::COLORSPACE))
        );
        assert!(meta.metadata_flag(metadata_id::HDR_EOTF).is_err());
        assert!(meta.metadata_string(metadata_id::HDR_EOTF).is_err());
        assert!(meta.metadata_bytes(metadata_id::HDR_EOTF).is_err());
    }

    #[test]
    fn plain_frame_has_no_flag_and_no_metadata() {
        let frame = PlainVideoFrame::allocate(desc());
        assert!(frame.flags().is_empty());
        assert!(frame.metadata().is_none());
    }

    #[test]
    fn borrowed_buffer_is_not_copied() {
        let mut pixels = vec![0u8; 16];
        let ptr = pixels.as_mut_ptr();
        let buffer = unsafe { VideoBuffer::from_raw_parts(ptr, pixels.len()) }.unwrap();
        let frame = PlainVideoFrame::with_buffer(
            FrameDesc {
                width: 2,
                height: 2,
                row_bytes: 8,
                pixel_format: PixelFormat::Bgra8,
            },
            buffer,
        );
        assert_eq!(frame.bytes(), ptr as *const u8);
    }
}
