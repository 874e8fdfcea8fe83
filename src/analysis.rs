//! Heuristic face and scene classification from pixel statistics.
//!
//! Both analyzers are total: malformed input degrades to an explicit
//! "unknown" result and is never surfaced to the caller. The labels are
//! coarse buckets over brightness, hue and saturation, not a trained model.

use chrono::{Local, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::{VisionError, VisionResult};
use crate::frame::{self, Frame};

/// Size faces are normalised to before statistics are taken.
pub const FACE_SAMPLE_SIZE: u32 = 128;
/// Size scenes are normalised to before statistics are taken.
pub const SCENE_SAMPLE_SIZE: u32 = 256;

pub const MIN_CONFIDENCE: f64 = 0.5;
pub const MAX_CONFIDENCE: f64 = 0.9;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ----------------------------------------------------------------------------
// Bucket tables
// ----------------------------------------------------------------------------

/// Half-open interval `[low, high)` mapped to a label.
#[derive(Clone, Copy, Debug)]
pub struct Bucket<L> {
    pub low: f64,
    pub high: f64,
    pub label: L,
}

/// Ordered interval table evaluated first-match, with a fallback label for
/// values outside every interval (including the open top end, e.g. 255).
#[derive(Clone, Copy, Debug)]
pub struct BucketTable<L: 'static> {
    buckets: &'static [Bucket<L>],
    fallback: L,
}

impl<L: Copy + 'static> BucketTable<L> {
    pub const fn new(buckets: &'static [Bucket<L>], fallback: L) -> Self {
        Self { buckets, fallback }
    }

    pub fn classify(&self, value: f64) -> L {
        self.buckets
            .iter()
            .find(|bucket| bucket.low <= value && value < bucket.high)
            .map(|bucket| bucket.label)
            .unwrap_or(self.fallback)
    }

    pub fn buckets(&self) -> &'static [Bucket<L>] {
        self.buckets
    }
}

pub const SKIN_TONES: BucketTable<SkinTone> = BucketTable {
    buckets: &[
        Bucket {
            low: 0.0,
            high: 85.0,
            label: SkinTone::Dark,
        },
        Bucket {
            low: 85.0,
            high: 170.0,
            label: SkinTone::Medium,
        },
        Bucket {
            low: 170.0,
            high: 255.0,
            label: SkinTone::Light,
        },
    ],
    fallback: SkinTone::Medium,
};

pub const HAIR_COLORS: BucketTable<HairColor> = BucketTable {
    buckets: &[
        Bucket {
            low: 0.0,
            high: 20.0,
            label: HairColor::Black,
        },
        Bucket {
            low: 20.0,
            high: 40.0,
            label: HairColor::Brown,
        },
        Bucket {
            low: 40.0,
            high: 60.0,
            label: HairColor::DarkBrown,
        },
        Bucket {
            low: 60.0,
            high: 100.0,
            label: HairColor::LightBrown,
        },
        Bucket {
            low: 100.0,
            high: 255.0,
            label: HairColor::Blonde,
        },
    ],
    fallback: HairColor::Brown,
};

pub const EYE_COLORS: BucketTable<EyeColor> = BucketTable {
    buckets: &[
        Bucket {
            low: 0.0,
            high: 50.0,
            label: EyeColor::DarkBrown,
        },
        Bucket {
            low: 50.0,
            high: 100.0,
            label: EyeColor::Brown,
        },
        Bucket {
            low: 100.0,
            high: 150.0,
            label: EyeColor::Hazel,
        },
        Bucket {
            low: 150.0,
            high: 255.0,
            label: EyeColor::BlueGreen,
        },
    ],
    fallback: EyeColor::Brown,
};

// ----------------------------------------------------------------------------
// Labels
// ----------------------------------------------------------------------------

macro_rules! label_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

label_enum!(SkinTone {
    Dark => "dark",
    Medium => "medium",
    Light => "light",
    Unknown => "unknown",
});

label_enum!(HairColor {
    Black => "black",
    Brown => "brown",
    DarkBrown => "dark brown",
    LightBrown => "light brown",
    Blonde => "blonde",
    Unknown => "unknown",
});

label_enum!(HairStyle {
    Natural => "natural",
    Unknown => "unknown",
});

label_enum!(EyeColor {
    DarkBrown => "dark brown",
    Brown => "brown",
    Hazel => "hazel",
    BlueGreen => "blue/green",
    Unknown => "unknown",
});

label_enum!(Lighting {
    Dark => "dark",
    Moderate => "moderate",
    Bright => "bright",
    Unknown => "unknown",
});

label_enum!(SceneType {
    Indoor => "indoor",
    Outdoor => "outdoor",
    Neutral => "neutral",
    Unknown => "unknown",
});

// ----------------------------------------------------------------------------
// Face analysis
// ----------------------------------------------------------------------------

/// Mean statistics of a face sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelStats {
    /// Mean BT.601 gray level, 0..=255.
    pub brightness: f64,
    /// Mean 8-bit hue, 0..180.
    pub hue: f64,
    /// Mean 8-bit saturation, 0..=255.
    pub saturation: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceTraits {
    pub skin_tone: SkinTone,
    pub hair_color: HairColor,
    pub hair_style: HairStyle,
    pub eye_color: EyeColor,
    pub confidence: f64,
}

/// Outcome of classifying one face region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FaceAnalysis {
    Classified(FaceTraits),
    /// The region could not be processed.
    Unidentified,
}

impl FaceAnalysis {
    pub fn description(&self) -> String {
        match self {
            FaceAnalysis::Classified(traits) => format!(
                "Person with {} skin, {} hair",
                traits.skin_tone, traits.hair_color
            ),
            FaceAnalysis::Unidentified => "Unidentified person".to_string(),
        }
    }

    /// Attributes with the placeholder values filled in for `Unidentified`.
    pub fn traits(&self) -> FaceTraits {
        match self {
            FaceAnalysis::Classified(traits) => *traits,
            FaceAnalysis::Unidentified => FaceTraits {
                skin_tone: SkinTone::Unknown,
                hair_color: HairColor::Unknown,
                hair_style: HairStyle::Unknown,
                eye_color: EyeColor::Unknown,
                confidence: MIN_CONFIDENCE,
            },
        }
    }

    pub fn is_classified(&self) -> bool {
        matches!(self, FaceAnalysis::Classified(_))
    }
}

#[derive(Serialize)]
struct FaceAnalysisJson {
    description: String,
    details: FaceDetailsJson,
}

#[derive(Serialize)]
struct FaceDetailsJson {
    skin_tone: SkinTone,
    hair: HairJson,
    eyes: EyesJson,
    confidence: f64,
}

#[derive(Serialize)]
struct HairJson {
    color: HairColor,
    style: HairStyle,
}

#[derive(Serialize)]
struct EyesJson {
    color: EyeColor,
}

impl Serialize for FaceAnalysis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let traits = self.traits();
        FaceAnalysisJson {
            description: self.description(),
            details: FaceDetailsJson {
                skin_tone: traits.skin_tone,
                hair: HairJson {
                    color: traits.hair_color,
                    style: traits.hair_style,
                },
                eyes: EyesJson {
                    color: traits.eye_color,
                },
                confidence: traits.confidence,
            },
        }
        .serialize(serializer)
    }
}

/// Monotonic in brightness, clamped to `[0.5, 0.9]`. Non-finite input maps to 0.5.
pub fn confidence_from_brightness(brightness: f64) -> f64 {
    let ratio = brightness / 255.0;
    if !ratio.is_finite() {
        return MIN_CONFIDENCE;
    }
    ratio.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Map precomputed statistics onto the label tables.
pub fn classify_face(stats: PixelStats) -> FaceAnalysis {
    FaceAnalysis::Classified(FaceTraits {
        skin_tone: SKIN_TONES.classify(stats.brightness),
        hair_color: HAIR_COLORS.classify(stats.hue),
        hair_style: HairStyle::Natural,
        eye_color: EYE_COLORS.classify(stats.saturation),
        confidence: confidence_from_brightness(stats.brightness),
    })
}

/// Mean brightness, hue and saturation of a region normalised to 128x128.
pub fn face_stats(region: &Frame) -> VisionResult<PixelStats> {
    let sample = frame::resize(region, FACE_SAMPLE_SIZE, FACE_SAMPLE_SIZE)?;
    let count = sample.pixels().len() as f64;
    if count == 0.0 {
        return Err(VisionError::malformed("face sample has no pixels"));
    }

    let (mut gray_sum, mut hue_sum, mut sat_sum) = (0u64, 0u64, 0u64);
    for pixel in sample.pixels() {
        let [hue, sat, _] = frame::to_hsv(pixel);
        gray_sum += frame::luma(pixel) as u64;
        hue_sum += hue as u64;
        sat_sum += sat as u64;
    }

    Ok(PixelStats {
        brightness: gray_sum as f64 / count,
        hue: hue_sum as f64 / count,
        saturation: sat_sum as f64 / count,
    })
}

/// Classify a face region. Never fails: unusable input yields `Unidentified`.
pub fn analyze_face(region: &Frame) -> FaceAnalysis {
    match face_stats(region) {
        Ok(stats) => classify_face(stats),
        Err(err) => {
            log::warn!("face analysis degraded: {}", err);
            FaceAnalysis::Unidentified
        }
    }
}

// ----------------------------------------------------------------------------
// Scene analysis
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SceneAnalysis {
    pub description: String,
    pub lighting: Lighting,
    pub scene_type: SceneType,
    pub timestamp: String,
}

impl SceneAnalysis {
    /// Placeholder used when no frame could be analyzed.
    pub fn unavailable(description: impl Into<String>, at: NaiveDateTime) -> Self {
        Self {
            description: description.into(),
            lighting: Lighting::Unknown,
            scene_type: SceneType::Unknown,
            timestamp: format_timestamp(at),
        }
    }

    pub fn is_known(&self) -> bool {
        self.lighting != Lighting::Unknown
    }
}

/// Mean and population standard deviation of the scene's gray levels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneStats {
    pub brightness: f64,
    pub contrast: f64,
}

type SceneRule = (SceneType, fn(&SceneStats) -> bool);

const SCENE_RULES: &[SceneRule] = &[
    (SceneType::Indoor, is_indoor),
    (SceneType::Outdoor, is_outdoor),
    (SceneType::Neutral, always),
];

fn is_indoor(stats: &SceneStats) -> bool {
    stats.brightness < 150.0 && stats.contrast < 50.0
}

fn is_outdoor(stats: &SceneStats) -> bool {
    stats.brightness > 180.0 && stats.contrast > 60.0
}

fn always(_: &SceneStats) -> bool {
    true
}

pub fn lighting_for(brightness: f64) -> Lighting {
    if brightness < 85.0 {
        Lighting::Dark
    } else if brightness < 170.0 {
        Lighting::Moderate
    } else {
        Lighting::Bright
    }
}

pub fn scene_type_for(stats: &SceneStats) -> SceneType {
    SCENE_RULES
        .iter()
        .find(|(_, rule)| rule(stats))
        .map(|(scene_type, _)| *scene_type)
        .unwrap_or(SceneType::Neutral)
}

pub fn scene_stats(frame: &Frame) -> VisionResult<SceneStats> {
    let sample = frame::resize(frame, SCENE_SAMPLE_SIZE, SCENE_SAMPLE_SIZE)?;
    let gray = frame::to_gray(&sample);
    let count = gray.pixels().len() as f64;
    if count == 0.0 {
        return Err(VisionError::malformed("scene sample has no pixels"));
    }

    let mean = gray.pixels().map(|p| p.0[0] as f64).sum::<f64>() / count;
    let variance = gray
        .pixels()
        .map(|p| {
            let d = p.0[0] as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / count;

    Ok(SceneStats {
        brightness: mean,
        contrast: variance.sqrt(),
    })
}

/// Classify a whole frame, stamped with the given time. Pure.
pub fn analyze_scene_at(frame: &Frame, at: NaiveDateTime) -> SceneAnalysis {
    match scene_stats(frame) {
        Ok(stats) => {
            let lighting = lighting_for(stats.brightness);
            let scene_type = scene_type_for(&stats);
            SceneAnalysis {
                description: format!("A {} {} scene", lighting, scene_type),
                lighting,
                scene_type,
                timestamp: format_timestamp(at),
            }
        }
        Err(err) => {
            log::warn!("scene analysis degraded: {}", err);
            SceneAnalysis::unavailable("Unable to analyze scene", at)
        }
    }
}

/// Classify a whole frame, stamped with the local time.
pub fn analyze_scene(frame: &Frame) -> SceneAnalysis {
    analyze_scene_at(frame, now())
}

pub(crate) fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub(crate) fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
