//! Chart entity types produced by the report parser
//!
//! A [`Chart`] is built once from report text and is read-only afterwards.
//! Every scalar field is optional: absence in the source text is not an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One of the twelve fixed palace slots, in chart vocabulary order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PalaceName {
    #[serde(rename = "命宫")]
    Life,
    #[serde(rename = "兄弟宫")]
    Siblings,
    #[serde(rename = "夫妻宫")]
    Spouse,
    #[serde(rename = "子女宫")]
    Children,
    #[serde(rename = "财帛宫")]
    Wealth,
    #[serde(rename = "疾厄宫")]
    Health,
    #[serde(rename = "迁移宫")]
    Travel,
    #[serde(rename = "交友宫")]
    Friends,
    #[serde(rename = "官禄宫")]
    Career,
    #[serde(rename = "田宅宫")]
    Property,
    #[serde(rename = "福德宫")]
    Fortune,
    #[serde(rename = "父母宫")]
    Parents,
}

impl PalaceName {
    /// All palaces in vocabulary order.
    pub const ALL: [PalaceName; 12] = [
        PalaceName::Life,
        PalaceName::Siblings,
        PalaceName::Spouse,
        PalaceName::Children,
        PalaceName::Wealth,
        PalaceName::Health,
        PalaceName::Travel,
        PalaceName::Friends,
        PalaceName::Career,
        PalaceName::Property,
        PalaceName::Fortune,
        PalaceName::Parents,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PalaceName::Life => "命宫",
            PalaceName::Siblings => "兄弟宫",
            PalaceName::Spouse => "夫妻宫",
            PalaceName::Children => "子女宫",
            PalaceName::Wealth => "财帛宫",
            PalaceName::Health => "疾厄宫",
            PalaceName::Travel => "迁移宫",
            PalaceName::Friends => "交友宫",
            PalaceName::Career => "官禄宫",
            PalaceName::Property => "田宅宫",
            PalaceName::Fortune => "福德宫",
            PalaceName::Parents => "父母宫",
        }
    }

    /// Resolve a label such as `命  宫` or `财帛宫`; interior whitespace is ignored.
    pub fn from_label(label: &str) -> Option<Self> {
        let compact: String = label.chars().filter(|c| !c.is_whitespace()).collect();
        Self::ALL.into_iter().find(|p| p.as_str() == compact)
    }

    /// Match a palace name at the start of `text` (whitespace already removed).
    pub(crate) fn strip_prefix_of(text: &str) -> Option<(Self, &str)> {
        Self::ALL
            .into_iter()
            .find_map(|p| text.strip_prefix(p.as_str()).map(|rest| (p, rest)))
    }
}

impl fmt::Display for PalaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report banner fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub api: Option<String>,
    pub app: Option<String>,
    pub code: Option<String>,
}

/// Header block of the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfo {
    pub gender: Option<String>,
    pub longitude: Option<f64>,
    pub clock_time: Option<String>,
    pub solar_time: Option<String>,
    pub lunar_time: Option<String>,
    pub solar_pillars: Option<String>,
    pub non_solar_pillars: Option<String>,
    /// Elemental-cycle descriptor (五行局).
    pub element: Option<String>,
    pub body_master: Option<String>,
    pub life_master: Option<String>,
    /// Year governor (子年斗君).
    pub dou_jun: Option<String>,
    /// Which palace hosts the body palace, as written in the header.
    pub body_palace: Option<String>,
}

/// The four symbolic transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformationType {
    #[serde(rename = "禄")]
    Lu,
    #[serde(rename = "权")]
    Quan,
    #[serde(rename = "科")]
    Ke,
    #[serde(rename = "忌")]
    Ji,
}

impl TransformationType {
    pub const ALL: [TransformationType; 4] = [
        TransformationType::Lu,
        TransformationType::Quan,
        TransformationType::Ke,
        TransformationType::Ji,
    ];

    pub fn glyph(self) -> char {
        match self {
            TransformationType::Lu => '禄',
            TransformationType::Quan => '权',
            TransformationType::Ke => '科',
            TransformationType::Ji => '忌',
        }
    }

    /// First transformation glyph appearing in `tag`, if any.
    pub fn find_in(tag: &str) -> Option<Self> {
        tag.chars()
            .find_map(|c| Self::ALL.into_iter().find(|t| t.glyph() == c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformationOrigin {
    /// Fixed at birth (`生年` prefix).
    Natal,
    /// Self-transformation away from the palace (`↓`).
    Outbound,
    /// Self-transformation toward the palace (`↑`).
    Inbound,
    Unmarked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FourTransformation {
    #[serde(rename = "type")]
    pub kind: TransformationType,
    pub origin: TransformationOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Star {
    pub name: String,
    pub attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub four_transformation: Option<FourTransformation>,
}

impl Star {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            four_transformation: None,
        }
    }

    /// Compact rendering used in prompts, e.g. `紫微(旺)[生年科]`.
    pub fn describe(&self) -> String {
        let mut out = self.name.clone();
        if !self.attributes.is_empty() {
            out.push('(');
            out.push_str(&self.attributes.join(","));
            out.push(')');
        }
        if let Some(ft) = self.four_transformation {
            let prefix = match ft.origin {
                TransformationOrigin::Natal => "生年",
                TransformationOrigin::Outbound => "↓",
                TransformationOrigin::Inbound => "↑",
                TransformationOrigin::Unmarked => "",
            };
            out.push('[');
            out.push_str(prefix);
            out.push(ft.kind.glyph());
            out.push(']');
        }
        out
    }
}

/// Auxiliary indicator lines of a palace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spirits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_spirit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_spirit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub life_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taisui_spirit: Option<String>,
}

impl Spirits {
    pub fn is_empty(&self) -> bool {
        self.year_spirit.is_none()
            && self.general_spirit.is_none()
            && self.life_stage.is_none()
            && self.taisui_spirit.is_none()
    }
}

/// Major / minor / annual period labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodLabels {
    pub major: Option<String>,
    pub minor: Vec<String>,
    pub yearly: Vec<String>,
}

impl PeriodLabels {
    /// First integer in the major-period label (`6~15` -> 6).
    pub fn major_start_age(&self) -> Option<i32> {
        self.major.as_deref().and_then(first_integer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Palace {
    /// Bracketed positional label (stem-branch).
    pub position: String,
    pub main_stars: Vec<Star>,
    pub assist_stars: Vec<Star>,
    pub minor_stars: Vec<Star>,
    pub spirits: Spirits,
    pub ages: PeriodLabels,
    pub is_body_palace: bool,
    pub is_karma_palace: bool,
}

impl Palace {
    pub fn new(position: impl Into<String>) -> Self {
        Self {
            position: position.into(),
            ..Self::default()
        }
    }

    /// Every star in the palace carrying a transformation.
    pub fn transformed_stars(&self) -> impl Iterator<Item = &Star> {
        self.main_stars
            .iter()
            .chain(&self.assist_stars)
            .chain(&self.minor_stars)
            .filter(|s| s.four_transformation.is_some())
    }
}

/// Parsed chart: header info plus the palaces found in the text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub version: VersionInfo,
    pub basic_info: BasicInfo,
    pub palaces: BTreeMap<PalaceName, Palace>,
}

impl Chart {
    pub fn palace(&self, name: PalaceName) -> Option<&Palace> {
        self.palaces.get(&name)
    }
}

/// First run of ASCII digits in `text`, parsed as an integer.
pub(crate) fn first_integer(text: &str) -> Option<i32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
