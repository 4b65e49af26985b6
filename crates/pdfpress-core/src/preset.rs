//! Compression preset resolution.
//!
//! Maps a requested quality (1-100) or discrete level (0-3) onto one of four
//! Ghostscript device tiers plus the image-downsampling parameters that go
//! with it. Resolution is pure and total over the valid domain; out-of-range
//! values are rejected before any file I/O happens.

use crate::error::PdfPressError;

/// Ghostscript output device tier, ordered from lowest to highest fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceTier {
    Screen,
    Ebook,
    Printer,
    Prepress,
}

impl DeviceTier {
    /// Value for the `-dPDFSETTINGS` flag.
    pub fn setting(&self) -> &'static str {
        match self {
            DeviceTier::Screen => "/screen",
            DeviceTier::Ebook => "/ebook",
            DeviceTier::Printer => "/printer",
            DeviceTier::Prepress => "/prepress",
        }
    }

    /// Short name used in logs and response metadata.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceTier::Screen => "screen",
            DeviceTier::Ebook => "ebook",
            DeviceTier::Printer => "printer",
            DeviceTier::Prepress => "prepress",
        }
    }
}

/// Parameter bundle handed to the compression pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionPreset {
    pub tier: DeviceTier,
    /// Target resolution for color image downsampling.
    pub color_dpi: u32,
    /// Target resolution for grayscale image downsampling.
    pub gray_dpi: u32,
    /// Target resolution for monochrome image downsampling.
    pub mono_dpi: u32,
    /// Lossy (DCT) image quality factor, 1-100.
    pub jpeg_quality: u8,
    /// Whether image downsampling is enabled at all.
    pub downsample: bool,
}

impl CompressionPreset {
    fn new(tier: DeviceTier, color_dpi: u32, jpeg_quality: u8, downsample: bool) -> Self {
        // Mono images tolerate much higher resolutions than continuous-tone
        // ones at comparable size cost.
        let mono_dpi = match tier {
            DeviceTier::Screen => 150,
            DeviceTier::Ebook => 300,
            DeviceTier::Printer => 600,
            DeviceTier::Prepress => 1200,
        };
        Self {
            tier,
            color_dpi,
            gray_dpi: color_dpi,
            mono_dpi,
            jpeg_quality,
            downsample,
        }
    }

    /// The most aggressive fixed profile, used as the safety net when the
    /// requested preset produces nothing usable.
    pub fn fallback() -> Self {
        Self::new(DeviceTier::Screen, 72, 40, true)
    }

    /// Whether the escalation pass may run for this preset. Only the two
    /// lowest-fidelity tiers escalate; a caller who asked for printer or
    /// prepress quality did not ask for a color-space downgrade.
    pub fn allows_escalation(&self) -> bool {
        self.tier <= DeviceTier::Ebook
    }
}

/// Resolve a 1-100 quality value to a preset.
///
/// Boundaries are closed on the low side of each tier: 25 is still screen,
/// 26 is ebook, and so on.
pub fn resolve_quality(quality: u8) -> Result<CompressionPreset, PdfPressError> {
    if !(1..=100).contains(&quality) {
        return Err(PdfPressError::Validation(format!(
            "Quality must be between 1 and 100, got {}",
            quality
        )));
    }

    let preset = match quality {
        1..=25 => CompressionPreset::new(DeviceTier::Screen, 72, 50, true),
        26..=60 => CompressionPreset::new(DeviceTier::Ebook, 135, 60, true),
        61..=85 => CompressionPreset::new(DeviceTier::Printer, 225, 75, true),
        _ => CompressionPreset::new(DeviceTier::Prepress, 300, 85, true),
    };
    Ok(preset)
}

/// Resolve a discrete 0-3 level to a preset.
///
/// Level 3 keeps images at their native resolution (downsampling off);
/// everything below trades resolution for size.
pub fn resolve_level(level: u8) -> Result<CompressionPreset, PdfPressError> {
    let preset = match level {
        0 => CompressionPreset::new(DeviceTier::Screen, 72, 45, true),
        1 => CompressionPreset::new(DeviceTier::Ebook, 120, 60, true),
        2 => CompressionPreset::new(DeviceTier::Printer, 250, 75, true),
        3 => CompressionPreset::new(DeviceTier::Prepress, 300, 85, false),
        other => {
            return Err(PdfPressError::Validation(format!(
                "Level must be 0, 1, 2 or 3, got {}",
                other
            )))
        }
    };
    Ok(preset)
}
