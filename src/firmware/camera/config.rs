use super::sensor::PixelFormat;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FrameSize {
    Qvga,
    Vga,
    Svga,
    Xga,
    Sxga,
    Uxga,
}

impl FrameSize {
    pub(crate) const fn dimensions(self) -> (u16, u16) {
        match self {
            Self::Qvga => (320, 240),
            Self::Vga => (640, 480),
            Self::Svga => (800, 600),
            Self::Xga => (1024, 768),
            Self::Sxga => (1280, 1024),
            Self::Uxga => (1600, 1200),
        }
    }

    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Qvga => "QVGA",
            Self::Vga => "VGA",
            Self::Svga => "SVGA",
            Self::Xga => "XGA",
            Self::Sxga => "SXGA",
            Self::Uxga => "UXGA",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BufferLocation {
    Dram,
    #[allow(dead_code)]
    Psram,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GrabPolicy {
    /// Fill a buffer only when one is free; frames may be stale under load.
    WhenEmpty,
    /// Always overwrite with the newest frame.
    #[allow(dead_code)]
    Latest,
}

impl GrabPolicy {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::WhenEmpty => "when_empty",
            Self::Latest => "latest",
        }
    }
}

/// Tunable sensor configuration. One instance is active per process; the
/// initializer may swap it for a ladder fallback between bring-up attempts.
/// Pin assignments are not part of this type: they are fixed per hardware
/// revision (`SENSOR_PINS`) and never change at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SensorConfig {
    pub(crate) xclk_hz: u32,
    pub(crate) pixel_format: PixelFormat,
    pub(crate) frame_size: FrameSize,
    /// 2..=60, lower is better quality.
    pub(crate) jpeg_quality: u8,
    pub(crate) frame_buffers: u8,
    pub(crate) buffer_location: BufferLocation,
    pub(crate) grab_policy: GrabPolicy,
}

pub(crate) const LADDER_LEN: usize = 3;

/// Bring-up fallback ladder, best first. Degrades clock rate before frame
/// size; which rung succeeds depends on board power and sensor batch.
pub(crate) fn sensor_fallback_ladder() -> [SensorConfig; LADDER_LEN] {
    let preferred = SensorConfig {
        xclk_hz: 20_000_000,
        pixel_format: PixelFormat::Jpeg,
        frame_size: FrameSize::Svga,
        jpeg_quality: 12,
        frame_buffers: 2,
        buffer_location: BufferLocation::Dram,
        grab_policy: GrabPolicy::WhenEmpty,
    };
    [
        preferred,
        SensorConfig {
            xclk_hz: 10_000_000,
            ..preferred
        },
        SensorConfig {
            xclk_hz: 10_000_000,
            frame_size: FrameSize::Qvga,
            frame_buffers: 1,
            ..preferred
        },
    ]
}

/// Post-init calibration applied best-effort after bring-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SensorTuning {
    pub(crate) jpeg_quality: i8,
    pub(crate) contrast: i8,
}

impl SensorTuning {
    pub(crate) const fn defaults() -> Self {
        Self {
            jpeg_quality: 5,
            contrast: 2,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct SensorPinMap {
    pub(crate) xclk: u8,
    pub(crate) pclk: u8,
    pub(crate) vsync: u8,
    pub(crate) href: u8,
    pub(crate) sda: u8,
    pub(crate) scl: u8,
    pub(crate) data: [u8; 8],
}

/// DVP wiring for this hardware revision. The GPIO moves in
/// `runtime::run` must stay in lockstep with this table.
pub(crate) const SENSOR_PINS: SensorPinMap = SensorPinMap {
    xclk: 15,
    pclk: 13,
    vsync: 6,
    href: 7,
    sda: 4,
    scl: 5,
    data: [11, 9, 8, 10, 12, 18, 17, 16],
};
