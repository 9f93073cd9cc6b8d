//! Shared value types for the DeckLink playout bridge.
//!
//! Everything in here mirrors a hardware-defined constant or a value the
//! driver reports verbatim. Nothing is recomputed and nothing is validated;
//! the driver is the sole authority on which values are meaningful.

use bitflags::bitflags;

/// Builds the big-endian four-character code the DeckLink API uses for most
/// of its enumeration constants.
pub const fn fourcc(tag: [u8; 4]) -> u32 {
    u32::from_be_bytes(tag)
}

/// Pixel formats supported by the playout path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit BGRA, full range.
    Bgra8,
    /// 10-bit RGB, limited range.
    Rgb10,
}

impl PixelFormat {
    pub const fn as_raw(self) -> u32 {
        match self {
            PixelFormat::Bgra8 => fourcc(*b"BGRA"),
            PixelFormat::Rgb10 => fourcc(*b"r210"),
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            x if x == fourcc(*b"BGRA") => Some(PixelFormat::Bgra8),
            x if x == fourcc(*b"r210") => Some(PixelFormat::Rgb10),
            _ => None,
        }
    }
}

/// Scan structure of a display mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldDominance {
    LowerFieldFirst,
    UpperFieldFirst,
    Progressive,
    ProgressiveSegmented,
}

impl FieldDominance {
    pub const fn as_raw(self) -> u32 {
        match self {
            FieldDominance::LowerFieldFirst => fourcc(*b"lowr"),
            FieldDominance::UpperFieldFirst => fourcc(*b"uppr"),
            FieldDominance::Progressive => fourcc(*b"prog"),
            FieldDominance::ProgressiveSegmented => fourcc(*b"psf "),
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            x if x == fourcc(*b"lowr") => Some(FieldDominance::LowerFieldFirst),
            x if x == fourcc(*b"uppr") => Some(FieldDominance::UpperFieldFirst),
            x if x == fourcc(*b"prog") => Some(FieldDominance::Progressive),
            x if x == fourcc(*b"psf ") => Some(FieldDominance::ProgressiveSegmented),
            _ => None,
        }
    }
}

/// Colorspace tags carried in HDR frame metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Colorspace {
    Rec601,
    Rec709,
    Rec2020,
}

impl Colorspace {
    pub const fn as_raw(self) -> u32 {
        match self {
            Colorspace::Rec601 => fourcc(*b"r601"),
            Colorspace::Rec709 => fourcc(*b"r709"),
            Colorspace::Rec2020 => fourcc(*b"2020"),
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            x if x == fourcc(*b"r601") => Some(Colorspace::Rec601),
            x if x == fourcc(*b"r709") => Some(Colorspace::Rec709),
            x if x == fourcc(*b"2020") => Some(Colorspace::Rec2020),
            _ => None,
        }
    }
}

bitflags! {
    /// Colorspace hints reported per display mode.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DisplayModeFlags: u32 {
        const COLORSPACE_REC601 = 1 << 1;
        const COLORSPACE_REC709 = 1 << 2;
        const COLORSPACE_REC2020 = 1 << 3;
    }
}

bitflags! {
    /// Per-frame flags understood by the output driver.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FrameFlags: u32 {
        const FLIP_VERTICAL = 1 << 0;
        const CONTAINS_HDR_METADATA = 1 << 1;
    }
}

/// What the driver reports happened to a previously scheduled frame.
///
/// These are the only four states the hardware surfaces; anything else the
/// driver ever sends collapses to [`CompletionResult::Unknown`].
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionResult {
    Displayed = 0,
    DroppedLate = 1,
    Flushed = 2,
    Unknown = 3,
}

impl CompletionResult {
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Maps the driver's completion codes. Late and dropped frames are the
    /// same outcome for a playout consumer and fold together.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => CompletionResult::Displayed,
            1 | 2 => CompletionResult::DroppedLate,
            3 => CompletionResult::Flushed,
            _ => CompletionResult::Unknown,
        }
    }
}

/// HDR metadata field identifiers, as dispatched by the frame metadata
/// protocol. Raw `u32` rather than an enum so that unrecognized ids can be
/// rejected at the lookup, the way the hardware does it.
pub mod metadata_id {
    use super::fourcc;

    pub const HDR_EOTF: u32 = fourcc(*b"eotf");
    pub const HDR_PRIMARIES_RED_X: u32 = fourcc(*b"hdrx");
    pub const HDR_PRIMARIES_RED_Y: u32 = fourcc(*b"hdry");
    pub const HDR_PRIMARIES_GREEN_X: u32 = fourcc(*b"hdgx");
    pub const HDR_PRIMARIES_GREEN_Y: u32 = fourcc(*b"hdgy");
    pub const HDR_PRIMARIES_BLUE_X: u32 = fourcc(*b"hdbx");
    pub const HDR_PRIMARIES_BLUE_Y: u32 = fourcc(*b"hdby");
    pub const HDR_WHITE_POINT_X: u32 = fourcc(*b"hdwx");
    pub const HDR_WHITE_POINT_Y: u32 = fourcc(*b"hdwy");
    pub const HDR_MAX_DISPLAY_MASTERING_LUMINANCE: u32 = fourcc(*b"hdml");
    pub const HDR_MIN_DISPLAY_MASTERING_LUMINANCE: u32 = fourcc(*b"hmil");
    pub const HDR_MAX_CONTENT_LIGHT_LEVEL: u32 = fourcc(*b"mcll");
    pub const HDR_MAX_FRAME_AVERAGE_LIGHT_LEVEL: u32 = fourcc(*b"fall");
    pub const COLORSPACE: u32 = fourcc(*b"cspc");
}

/// A CIE 1931 xy coordinate pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chromaticity {
    pub x: f64,
    pub y: f64,
}

/// The full 14-field HDR metadata block attached to a video frame:
/// EOTF id, six primary chromaticities, two white-point coordinates,
/// four luminance/light-level figures and a colorspace id.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HdrMetadata {
    pub eotf: i64,
    pub red: Chromaticity,
    pub green: Chromaticity,
    pub blue: Chromaticity,
    pub white_point: Chromaticity,
    pub max_display_mastering_luminance: f64,
    pub min_display_mastering_luminance: f64,
    pub max_content_light_level: f64,
    pub max_frame_average_light_level: f64,
    pub colorspace: Colorspace,
}

impl HdrMetadata {
    /// Rec.709 primaries with the mastering figures typical for an SDR
    /// signal carried over an HDR-capable link (EOTF 0 = traditional gamma).
    pub fn rec709(eotf: i64) -> Self {
        HdrMetadata {
            eotf,
            red: Chromaticity { x: 0.640, y: 0.330 },
            green: Chromaticity { x: 0.300, y: 0.600 },
            blue: Chromaticity { x: 0.150, y: 0.060 },
            white_point: Chromaticity { x: 0.3127, y: 0.3290 },
            max_display_mastering_luminance: 1000.0,
            min_display_mastering_luminance: 0.0001,
            max_content_light_level: 1000.0,
            max_frame_average_light_level: 50.0,
            colorspace: Colorspace::Rec709,
        }
    }

    /// Looks up one of the two integer-valued fields.
    pub fn int_field(&self, id: u32) -> Option<i64> {
        match id {
            metadata_id::HDR_EOTF => Some(self.eotf),
            metadata_id::COLORSPACE => Some(self.colorspace.as_raw() as i64),
            _ => None,
        }
    }

    /// Looks up one of the twelve float-valued fields.
    pub fn float_field(&self, id: u32) -> Option<f64> {
        match id {
            metadata_id::HDR_PRIMARIES_RED_X => Some(self.red.x),
            metadata_id::HDR_PRIMARIES_RED_Y => Some(self.red.y),
            metadata_id::HDR_PRIMARIES_GREEN_X => Some(self.green.x),
            metadata_id::HDR_PRIMARIES_GREEN_Y => Some(self.green.y),
            metadata_id::HDR_PRIMARIES_BLUE_X => Some(self.blue.x),
            metadata_id::HDR_PRIMARIES_BLUE_Y => Some(self.blue.y),
            metadata_id::HDR_WHITE_POINT_X => Some(self.white_point.x),
            metadata_id::HDR_WHITE_POINT_Y => Some(self.white_point.y),
            metadata_id::HDR_MAX_DISPLAY_MASTERING_LUMINANCE => {
                Some(self.max_display_mastering_luminance)
            }
            metadata_id::HDR_MIN_DISPLAY_MASTERING_LUMINANCE => {
                Some(self.min_display_mastering_luminance)
            }
            metadata_id::HDR_MAX_CONTENT_LIGHT_LEVEL => Some(self.max_content_light_level),
            metadata_id::HDR_MAX_FRAME_AVERAGE_LIGHT_LEVEL => {
                Some(self.max_frame_average_light_level)
            }
            _ => None,
        }
    }

    /// The twelve float fields in the order the driver expects them to be
    /// written during in-place decoration.
    pub fn float_fields_in_write_order(&self) -> [(u32, f64); 12] {
        [
            (metadata_id::HDR_PRIMARIES_RED_X, self.red.x),
            (metadata_id::HDR_PRIMARIES_RED_Y, self.red.y),
            (metadata_id::HDR_PRIMARIES_GREEN_X, self.green.x),
            (metadata_id::HDR_PRIMARIES_GREEN_Y, self.green.y),
            (metadata_id::HDR_PRIMARIES_BLUE_X, self.blue.x),
            (metadata_id::HDR_PRIMARIES_BLUE_Y, self.blue.y),
            (metadata_id::HDR_WHITE_POINT_X, self.white_point.x),
            (metadata_id::HDR_WHITE_POINT_Y, self.white_point.y),
            (
                metadata_id::HDR_MAX_DISPLAY_MASTERING_LUMINANCE,
                self.max_display_mastering_luminance,
            ),
            (
                metadata_id::HDR_MIN_DISPLAY_MASTERING_LUMINANCE,
                self.min_display_mastering_luminance,
            ),
            (
                metadata_id::HDR_MAX_CONTENT_LIGHT_LEVEL,
                self.max_content_light_level,
            ),
            (
                metadata_id::HDR_MAX_FRAME_AVERAGE_LIGHT_LEVEL,
                self.max_frame_average_light_level,
            ),
        ]
    }
}

/// A hardware-supported combination of resolution, frame rate and scan
/// structure, as enumerated from an output-capable device.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayMode {
    /// Driver mode code (a four-character code).
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Frame rate is the rational `frame_scale / frame_duration` fps.
    pub frame_duration: i64,
    pub frame_scale: i64,
    pub field_dominance: FieldDominance,
    pub flags: DisplayModeFlags,
}

impl DisplayMode {
    pub fn fps(&self) -> f64 {
        if self.frame_duration == 0 {
            return 0.0;
        }
        self.frame_scale as f64 / self.frame_duration as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_matches_driver_constants() {
        assert_eq!(PixelFormat::Bgra8.as_raw(), 0x4247_5241);
        assert_eq!(PixelFormat::Rgb10.as_raw(), 0x7232_3130);
        assert_eq!(Colorspace::Rec2020.as_raw(), 0x3230_3230);
        assert_eq!(metadata_id::HDR_EOTF, 0x656F_7466);
    }

    #[test]
    fn pixel_format_round_trip() {
        for pf in [PixelFormat::Bgra8, PixelFormat::Rgb10] {
            assert_eq!(PixelFormat::from_raw(pf.as_raw()), Some(pf));
        }
        assert_eq!(PixelFormat::from_raw(0), None);
    }

    #[test]
    fn completion_result_folds_late_and_dropped() {
        assert_eq!(CompletionResult::from_raw(0), CompletionResult::Displayed);
        assert_eq!(CompletionResult::from_raw(1), CompletionResult::DroppedLate);
        assert_eq!(CompletionResult::from_raw(2), CompletionResult::DroppedLate);
        assert_eq!(CompletionResult::from_raw(3), CompletionResult::Flushed);
        assert_eq!(CompletionResult::from_raw(99), CompletionResult::Unknown);
    }

    #[test]
    fn hdr_metadata_answers_all_fourteen_fields() {
        let hdr = HdrMetadata::rec709(0);
        assert_eq!(hdr.int_field(metadata_id::HDR_EOTF), Some(0));
        assert_eq!(
            hdr.int_field(metadata_id::COLORSPACE),
            Some(Colorspace::Rec709.as_raw() as i64)
        );
        for (id, value) in hdr.float_fields_in_write_order() {
            assert_eq!(hdr.float_field(id), Some(value));
        }
        assert_eq!(hdr.int_field(0xDEAD_BEEF), None);
        assert_eq!(hdr.float_field(metadata_id::HDR_EOTF), None);
    }

    #[test]
    fn display_mode_fps() {
        let mode = DisplayMode {
            id: fourcc(*b"Hp25"),
            name: "1080p25".to_owned(),
            width: 1920,
            height: 1080,
            frame_duration: 1000,
            frame_scale: 25000,
            field_dominance: FieldDominance::Progressive,
            flags: DisplayModeFlags::COLORSPACE_REC709,
        };
        assert_eq!(mode.fps(), 25.0);
    }
}
