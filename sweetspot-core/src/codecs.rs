// ============================================================================
// sweetspot-core/src/codecs.rs
// ============================================================================
//
// CODEC REGISTRY: Typed Encoder Schemas
//
// One `CodecSpec` per supported encoder: its quality parameter and range, its
// presets ordered fastest first, an optional hardware vendor and the schema
// of advanced options it accepts. The table is immutable and built once.
//
// Preset order matters beyond presentation: the Pareto analysis breaks exact
// metric ties in favour of the preset with the lower index here.

use crate::error::{CoreError, CoreResult};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Concurrent encode sessions allowed on consumer NVIDIA cards.
pub const NVENC_CONSUMER_SESSION_LIMIT: usize = 5;

/// Inclusive range of an encoder's native quality parameter. Lower values
/// mean higher quality and larger files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityRange {
    pub min: u32,
    pub max: u32,
}

impl QualityRange {
    pub fn new(min: u32, max: u32) -> CoreResult<Self> {
        if min > max {
            return Err(CoreError::Config(format!(
                "quality range is inverted: {min} > {max}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn contains_range(&self, other: &QualityRange) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    /// Values from `min` to `max` inclusive in steps of `step`; `max` is always
    /// included even when the step does not land on it.
    pub fn values(&self, step: u32) -> Vec<u32> {
        let step = step.max(1) as usize;
        let mut values: Vec<u32> = (self.min..=self.max).step_by(step).collect();
        if values.last() != Some(&self.max) {
            values.push(self.max);
        }
        values
    }
}

impl fmt::Display for QualityRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HardwareVendor {
    Nvidia,
    Intel,
    Amd,
}

impl HardwareVendor {
    /// Vendor-imposed limit on concurrent encode sessions, if any.
    pub fn session_limit(&self) -> Option<usize> {
        match self {
            HardwareVendor::Nvidia => Some(NVENC_CONSUMER_SESSION_LIMIT),
            HardwareVendor::Intel | HardwareVendor::Amd => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum OptionKind {
    Integer { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Choice(&'static [&'static str]),
    Flag,
}

/// Description of one advanced encoder option.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptionDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: OptionKind,
    pub default: Option<&'static str>,
}

impl OptionDescriptor {
    const fn new(key: &'static str, label: &'static str, kind: OptionKind) -> Self {
        Self {
            key,
            label,
            kind,
            default: None,
        }
    }

    /// Checks a raw option value against this descriptor.
    pub fn check(&self, value: &str) -> CoreResult<()> {
        let invalid = |reason: String| CoreError::InvalidOption {
            key: self.key.to_string(),
            reason,
        };
        match self.kind {
            OptionKind::Integer { min, max } => {
                let parsed: i64 = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{value}' is not an integer")))?;
                if !(min..=max).contains(&parsed) {
                    return Err(invalid(format!("{parsed} is outside {min}..={max}")));
                }
            }
            OptionKind::Float { min, max } => {
                let parsed: f64 = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{value}' is not a number")))?;
                if !(parsed.is_finite() && parsed >= min && parsed <= max) {
                    return Err(invalid(format!("{parsed} is outside {min}..={max}")));
                }
            }
            OptionKind::Choice(choices) => {
                if !choices.contains(&value) {
                    return Err(invalid(format!(
                        "'{value}' is not one of {}",
                        choices.join(", ")
                    )));
                }
            }
            OptionKind::Flag => {
                if !matches!(value, "0" | "1" | "true" | "false") {
                    return Err(invalid(format!("'{value}' is not a boolean flag")));
                }
            }
        }
        Ok(())
    }
}

/// Static description of a supported encoder.
#[derive(Debug, Clone, Serialize)]
pub struct CodecSpec {
    pub name: &'static str,
    pub display_name: &'static str,
    /// Name of the rate-control parameter the quality value feeds.
    pub rate_control: &'static str,
    pub quality_range: QualityRange,
    /// Presets ordered fastest first.
    pub presets: &'static [&'static str],
    pub default_preset: &'static str,
    pub hardware: Option<HardwareVendor>,
    pub advanced_options: &'static [OptionDescriptor],
}

impl CodecSpec {
    /// Position of `preset` in the speed ordering (0 = fastest).
    pub fn preset_index(&self, preset: &str) -> Option<usize> {
        self.presets.iter().position(|p| *p == preset)
    }

    pub fn validate_preset(&self, preset: &str) -> CoreResult<()> {
        if self.preset_index(preset).is_none() {
            return Err(CoreError::Config(format!(
                "preset '{}' is not valid for {} (expected one of: {})",
                preset,
                self.name,
                self.presets.join(", ")
            )));
        }
        Ok(())
    }

    pub fn validate_quality_range(&self, range: &QualityRange) -> CoreResult<()> {
        if !self.quality_range.contains_range(range) {
            return Err(CoreError::Config(format!(
                "quality range {} lies outside {}'s {} range {}",
                range, self.name, self.rate_control, self.quality_range
            )));
        }
        Ok(())
    }

    pub fn option(&self, key: &str) -> Option<&OptionDescriptor> {
        self.advanced_options.iter().find(|o| o.key == key)
    }

    /// Validates user supplied advanced options against this codec's schema.
    pub fn validate_options(&self, options: &BTreeMap<String, String>) -> CoreResult<()> {
        for (key, value) in options {
            let descriptor = self.option(key).ok_or_else(|| CoreError::InvalidOption {
                key: key.clone(),
                reason: format!("not supported by {}", self.name),
            })?;
            descriptor.check(value)?;
        }
        Ok(())
    }
}

const X264_PRESETS: &[&str] = &[
    "ultrafast", "superfast", "veryfast", "faster", "fast", "medium", "slow", "slower", "veryslow",
];
const SVT_PRESETS: &[&str] = &[
    "13", "12", "11", "10", "9", "8", "7", "6", "5", "4", "3", "2", "1", "0",
];
const CPU_USED_PRESETS: &[&str] = &["8", "7", "6", "5", "4", "3", "2", "1", "0"];
const NVENC_PRESETS: &[&str] = &["p1", "p2", "p3", "p4", "p5", "p6", "p7"];
const QSV_PRESETS: &[&str] = &["veryfast", "faster", "fast", "medium", "slow", "slower", "veryslow"];
const AMF_PRESETS: &[&str] = &["speed", "balanced", "quality"];

const X264_OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor::new(
        "tune",
        "Tune",
        OptionKind::Choice(&["film", "animation", "grain", "stillimage", "fastdecode", "zerolatency"]),
    ),
    OptionDescriptor::new("profile", "Profile", OptionKind::Choice(&["baseline", "main", "high"])),
    OptionDescriptor::new("bf", "B-frames", OptionKind::Integer { min: 0, max: 16 }),
    OptionDescriptor::new("refs", "Reference frames", OptionKind::Integer { min: 1, max: 16 }),
    OptionDescriptor::new("aq-mode", "AQ mode", OptionKind::Integer { min: 0, max: 3 }),
];

const X265_OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor::new(
        "tune",
        "Tune",
        OptionKind::Choice(&["psnr", "ssim", "grain", "fastdecode", "zerolatency", "animation"]),
    ),
    OptionDescriptor::new("profile", "Profile", OptionKind::Choice(&["main", "main10"])),
    OptionDescriptor::new("aq-mode", "AQ mode", OptionKind::Integer { min: 0, max: 4 }),
    OptionDescriptor::new("psy-rd", "Psy-RD strength", OptionKind::Float { min: 0.0, max: 5.0 }),
];

const SVT_OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor {
        key: "film-grain",
        label: "Film grain synthesis",
        kind: OptionKind::Integer { min: 0, max: 50 },
        default: Some("0"),
    },
    OptionDescriptor::new("tune", "Tune", OptionKind::Integer { min: 0, max: 2 }),
    OptionDescriptor::new("enable-overlays", "Overlay frames", OptionKind::Flag),
    OptionDescriptor::new("scd", "Scene change detection", OptionKind::Flag),
];

const AOM_OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor::new("row-mt", "Row multithreading", OptionKind::Flag),
    OptionDescriptor::new("tiles", "Tiles", OptionKind::Choice(&["1x1", "2x1", "2x2", "4x2", "4x4"])),
    OptionDescriptor::new("aq-mode", "AQ mode", OptionKind::Integer { min: 0, max: 3 }),
];

const VP9_OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor::new("row-mt", "Row multithreading", OptionKind::Flag),
    OptionDescriptor::new("deadline", "Deadline", OptionKind::Choice(&["good", "best", "realtime"])),
];

const NVENC_OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor::new("rc-lookahead", "Lookahead", OptionKind::Integer { min: 0, max: 32 }),
    OptionDescriptor::new("spatial-aq", "Spatial AQ", OptionKind::Flag),
    OptionDescriptor::new("temporal-aq", "Temporal AQ", OptionKind::Flag),
    OptionDescriptor::new("multipass", "Multipass", OptionKind::Choice(&["disabled", "qres", "fullres"])),
];

const QSV_OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor::new("look_ahead", "Lookahead", OptionKind::Flag),
    OptionDescriptor::new("look_ahead_depth", "Lookahead depth", OptionKind::Integer { min: 0, max: 100 }),
];

const AMF_OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor::new("vbaq", "Variance based AQ", OptionKind::Flag),
    OptionDescriptor::new("preanalysis", "Pre-analysis", OptionKind::Flag),
];

static CODECS: &[CodecSpec] = &[
    CodecSpec {
        name: "libx264",
        display_name: "H.264 (x264)",
        rate_control: "crf",
        quality_range: QualityRange { min: 0, max: 51 },
        presets: X264_PRESETS,
        default_preset: "medium",
        hardware: None,
        advanced_options: X264_OPTIONS,
    },
    CodecSpec {
        name: "libx265",
        display_name: "HEVC (x265)",
        rate_control: "crf",
        quality_range: QualityRange { min: 0, max: 51 },
        presets: X264_PRESETS,
        default_preset: "medium",
        hardware: None,
        advanced_options: X265_OPTIONS,
    },
    CodecSpec {
        name: "libsvtav1",
        display_name: "AV1 (SVT-AV1)",
        rate_control: "crf",
        quality_range: QualityRange { min: 0, max: 63 },
        presets: SVT_PRESETS,
        default_preset: "6",
        hardware: None,
        advanced_options: SVT_OPTIONS,
    },
    CodecSpec {
        name: "libaom-av1",
        display_name: "AV1 (libaom)",
        rate_control: "crf",
        quality_range: QualityRange { min: 0, max: 63 },
        presets: CPU_USED_PRESETS,
        default_preset: "4",
        hardware: None,
        advanced_options: AOM_OPTIONS,
    },
    CodecSpec {
        name: "libvpx-vp9",
        display_name: "VP9 (libvpx)",
        rate_control: "crf",
        quality_range: QualityRange { min: 0, max: 63 },
        presets: CPU_USED_PRESETS,
        default_preset: "4",
        hardware: None,
        advanced_options: VP9_OPTIONS,
    },
    CodecSpec {
        name: "h264_nvenc",
        display_name: "H.264 (NVENC)",
        rate_control: "cq",
        quality_range: QualityRange { min: 0, max: 51 },
        presets: NVENC_PRESETS,
        default_preset: "p4",
        hardware: Some(HardwareVendor::Nvidia),
        advanced_options: NVENC_OPTIONS,
    },
    CodecSpec {
        name: "hevc_nvenc",
        display_name: "HEVC (NVENC)",
        rate_control: "cq",
        quality_range: QualityRange { min: 0, max: 51 },
        presets: NVENC_PRESETS,
        default_preset: "p4",
        hardware: Some(HardwareVendor::Nvidia),
        advanced_options: NVENC_OPTIONS,
    },
    CodecSpec {
        name: "av1_nvenc",
        display_name: "AV1 (NVENC)",
        rate_control: "cq",
        quality_range: QualityRange { min: 0, max: 51 },
        presets: NVENC_PRESETS,
        default_preset: "p4",
        hardware: Some(HardwareVendor::Nvidia),
        advanced_options: NVENC_OPTIONS,
    },
    CodecSpec {
        name: "h264_qsv",
        display_name: "H.264 (Quick Sync)",
        rate_control: "global_quality",
        quality_range: QualityRange { min: 1, max: 51 },
        presets: QSV_PRESETS,
        default_preset: "medium",
        hardware: Some(HardwareVendor::Intel),
        advanced_options: QSV_OPTIONS,
    },
    CodecSpec {
        name: "hevc_qsv",
        display_name: "HEVC (Quick Sync)",
        rate_control: "global_quality",
        quality_range: QualityRange { min: 1, max: 51 },
        presets: QSV_PRESETS,
        default_preset: "medium",
        hardware: Some(HardwareVendor::Intel),
        advanced_options: QSV_OPTIONS,
    },
    CodecSpec {
        name: "h264_amf",
        display_name: "H.264 (AMF)",
        rate_control: "qp",
        quality_range: QualityRange { min: 0, max: 51 },
        presets: AMF_PRESETS,
        default_preset: "balanced",
        hardware: Some(HardwareVendor::Amd),
        advanced_options: AMF_OPTIONS,
    },
    CodecSpec {
        name: "hevc_amf",
        display_name: "HEVC (AMF)",
        rate_control: "qp",
        quality_range: QualityRange { min: 0, max: 51 },
        presets: AMF_PRESETS,
        default_preset: "balanced",
        hardware: Some(HardwareVendor::Amd),
        advanced_options: AMF_OPTIONS,
    },
];

static REGISTRY: Lazy<HashMap<&'static str, &'static CodecSpec>> =
    Lazy::new(|| CODECS.iter().map(|spec| (spec.name, spec)).collect());

/// Looks up a codec by its encoder name (e.g. `libx264`).
pub fn lookup(name: &str) -> CoreResult<&'static CodecSpec> {
    REGISTRY
        .get(name)
        .copied()
        .ok_or_else(|| CoreError::UnknownCodec(name.to_string()))
}

/// All registered codecs in declaration order.
pub fn all_codecs() -> &'static [CodecSpec] {
    CODECS
}
