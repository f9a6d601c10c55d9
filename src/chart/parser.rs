//! Report text parser
//!
//! The report is a tree-drawn outline: each entry line starts with a run of
//! tree characters (`│`, spaces) followed by a branch glyph `├` or a corner
//! glyph `└`, then `label : value`. Lines are classified one at a time and a
//! palace block is bounded by the next glyph line at the same or shallower
//! indentation, so blocks of any length are handled without backtracking.
//!
//! Parsing is total. A field that cannot be found stays `None` or empty.

use super::types::{
    BasicInfo, Chart, FourTransformation, Palace, PalaceName, Star, TransformationOrigin,
    TransformationType, VersionInfo,
};

const BRANCH: char = '├';
const CORNER: char = '└';
const NONE_PLACEHOLDER: &str = "无";
const BODY_PALACE_MARKER: &str = "[身宫]";
const KARMA_PALACE_MARKER: &str = "[来因]";

/// Labels that belong inside a palace block, even when the report is drawn
/// without nesting.
const PALACE_FIELD_LABELS: [&str; 11] = [
    "主星", "辅星", "小星", "神煞", "岁前星", "将前星", "十二长生", "太岁煞禄", "大限", "小限",
    "流年",
];

/// One classified report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line<'a> {
    /// Glyph line. `depth` is the number of characters before the glyph.
    Entry { depth: usize, body: &'a str },
    /// Anything else (banners, blank lines, bare `key: value` lines).
    Plain(&'a str),
}

impl<'a> Line<'a> {
    fn classify(raw: &'a str) -> Self {
        let mut depth = 0;
        for (idx, ch) in raw.char_indices() {
            match ch {
                BRANCH | CORNER => {
                    return Line::Entry {
                        depth,
                        body: &raw[idx + ch.len_utf8()..],
                    }
                }
                '│' | '|' | ' ' | '\t' | '\u{3000}' => depth += 1,
                _ => break,
            }
        }
        Line::Plain(raw)
    }

    fn text(&self) -> &'a str {
        match *self {
            Line::Entry { body, .. } => body,
            Line::Plain(text) => text,
        }
    }
}

/// Palace header recognised on an entry line.
#[derive(Debug)]
struct PalaceHeader {
    name: PalaceName,
    position: String,
    body_marker: bool,
    karma_marker: bool,
}

impl PalaceHeader {
    fn recognise(body: &str) -> Option<Self> {
        let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        let (name, rest) = PalaceName::strip_prefix_of(&compact)?;
        let rest = rest.strip_prefix('[')?;
        let close = rest.find(']')?;
        let position = rest[..close].to_string();
        if position.is_empty() {
            return None;
        }
        let trailing = &rest[close..];
        Some(Self {
            name,
            position,
            body_marker: trailing.contains(BODY_PALACE_MARKER),
            karma_marker: trailing.contains(KARMA_PALACE_MARKER),
        })
    }
}

/// Splits `label : value` on the first ASCII or full-width colon. The label
/// comes back with whitespace removed.
fn split_field(text: &str) -> Option<(String, &str)> {
    let idx = text.find([':', '：'])?;
    let sep_len = text[idx..].chars().next().map_or(1, char::len_utf8);
    let label: String = text[..idx].chars().filter(|c| !c.is_whitespace()).collect();
    if label.is_empty() {
        return None;
    }
    Some((label, text[idx + sep_len..].trim()))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Leading run of characters accepted by `keep`, trimmed.
fn leading_run(value: &str, keep: impl Fn(char) -> bool) -> Option<String> {
    let end = value.find(|c: char| !keep(c)).unwrap_or(value.len());
    non_empty(&value[..end])
}

fn timestamp_value(value: &str) -> Option<String> {
    leading_run(value, |c| c.is_ascii_digit() || matches!(c, '-' | ':' | '/' | ' '))
}

fn set_once(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Parser for the outline chart report.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChartParser;

impl ChartParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse report text into a [`Chart`]. Never fails; missing fields are
    /// left empty and palaces not present in the text are absent from the map.
    pub fn parse(&self, text: &str) -> Chart {
        let lines: Vec<Line<'_>> = text.lines().map(Line::classify).collect();
        let mut chart = Chart::default();

        let mut idx = 0;
        while idx < lines.len() {
            if let Line::Entry { depth, body } = lines[idx] {
                if let Some(header) = PalaceHeader::recognise(body) {
                    let end = Self::block_end(&lines, idx + 1, depth);
                    let palace = Self::build_palace(&header, &lines[idx + 1..end]);
                    // First block for a name wins.
                    chart.palaces.entry(header.name).or_insert(palace);
                    idx = end;
                    continue;
                }
            }
            Self::read_header_line(lines[idx].text(), &mut chart);
            idx += 1;
        }

        tracing::debug!(palaces = chart.palaces.len(), "parsed chart report");
        chart
    }

    /// Index of the first line after the block opened at `header_depth`.
    fn block_end(lines: &[Line<'_>], start: usize, header_depth: usize) -> usize {
        for (offset, line) in lines[start..].iter().enumerate() {
            let Line::Entry { depth, body } = *line else {
                continue;
            };
            if PalaceHeader::recognise(body).is_some() {
                return start + offset;
            }
            if depth > header_depth {
                continue;
            }
            let is_palace_field = split_field(body)
                .map(|(label, _)| label)
                .or_else(|| Some(body.chars().filter(|c| !c.is_whitespace()).collect()))
                .is_some_and(|label| PALACE_FIELD_LABELS.contains(&label.as_str()));
            if !is_palace_field {
                return start + offset;
            }
        }
        lines.len()
    }

    fn build_palace(header: &PalaceHeader, block: &[Line<'_>]) -> Palace {
        let mut palace = Palace::new(header.position.clone());
        palace.is_body_palace = header.body_marker;
        palace.is_karma_palace = header.karma_marker;

        for line in block {
            let text = line.text();
            if text.contains(BODY_PALACE_MARKER) {
                palace.is_body_palace = true;
            }
            if text.contains(KARMA_PALACE_MARKER) {
                palace.is_karma_palace = true;
            }

            let Some((label, value)) = split_field(text) else {
                continue;
            };
            match label.as_str() {
                "主星" => palace.main_stars = parse_star_list(value),
                "辅星" => palace.assist_stars = parse_star_list(value),
                "小星" => palace.minor_stars = parse_star_list(value),
                "岁前星" => set_once(&mut palace.spirits.year_spirit, non_empty(value)),
                "将前星" => set_once(&mut palace.spirits.general_spirit, non_empty(value)),
                "十二长生" => set_once(&mut palace.spirits.life_stage, non_empty(value)),
                "太岁煞禄" => set_once(&mut palace.spirits.taisui_spirit, non_empty(value)),
                "大限" => set_once(&mut palace.ages.major, non_empty(value)),
                "小限" => palace.ages.minor = parse_label_list(value),
                "流年" => palace.ages.yearly = parse_label_list(value),
                _ => {}
            }
        }
        palace
    }

    fn read_header_line(text: &str, chart: &mut Chart) {
        for segment in text.split([';', '；']) {
            let Some((label, value)) = split_field(segment) else {
                continue;
            };
            let info: &mut BasicInfo = &mut chart.basic_info;
            let version: &mut VersionInfo = &mut chart.version;
            match label.as_str() {
                "API版本" => set_once(
                    &mut version.api,
                    leading_run(value, |c| c.is_ascii_digit() || c == '.'),
                ),
                "App版本" => set_once(
                    &mut version.app,
                    leading_run(value, |c| c.is_ascii_digit() || c == '.'),
                ),
                "安星码" => set_once(
                    &mut version.code,
                    leading_run(value, |c| c.is_alphanumeric() || c == '_'),
                ),
                "性别" => set_once(
                    &mut info.gender,
                    value.split_whitespace().next().map(str::to_string),
                ),
                "地理经度" => {
                    if info.longitude.is_none() {
                        info.longitude =
                            leading_run(value, |c| c.is_ascii_digit() || c == '.')
                                .and_then(|v| v.parse().ok());
                    }
                }
                "钟表时间" => set_once(&mut info.clock_time, timestamp_value(value)),
                "真太阳时" => set_once(&mut info.solar_time, timestamp_value(value)),
                "农历时间" => set_once(&mut info.lunar_time, non_empty(value)),
                "节气四柱" => set_once(&mut info.solar_pillars, non_empty(value)),
                "非节气四柱" => set_once(&mut info.non_solar_pillars, non_empty(value)),
                "五行局数" => set_once(&mut info.element, non_empty(value)),
                "身主" => set_once(&mut info.body_master, non_empty(value)),
                "命主" => set_once(&mut info.life_master, non_empty(value)),
                "子年斗君" => set_once(&mut info.dou_jun, non_empty(value)),
                "身宫" => set_once(&mut info.body_palace, non_empty(value)),
                _ => {}
            }
        }
    }
}

/// Parse a comma separated label list (`5,17,29`). The `无` placeholder
/// yields an empty list.
fn parse_label_list(value: &str) -> Vec<String> {
    if value.trim() == NONE_PLACEHOLDER {
        return Vec::new();
    }
    value
        .split([',', '，'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a star list such as `紫微[旺][生年科],天府[庙]`.
///
/// Tokens are separated by commas, enumeration commas or whitespace outside
/// brackets. Each bracket group is either a transformation tag (contains one
/// of 禄/权/科/忌) or a plain attribute. A star keeps at most one
/// transformation: when several tags qualify, the last one wins.
pub fn parse_star_list(value: &str) -> Vec<Star> {
    let value = value.trim();
    if value.is_empty() || value == NONE_PLACEHOLDER {
        return Vec::new();
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut bracket_depth = 0usize;
    for ch in value.chars() {
        match ch {
            '[' => {
                bracket_depth += 1;
                current.push(ch);
            }
            ']' => {
                bracket_depth = bracket_depth.saturating_sub(1);
                current.push(ch);
            }
            ',' | '，' | '、' if bracket_depth == 0 => tokens.push(std::mem::take(&mut current)),
            c if c.is_whitespace() && bracket_depth == 0 => {
                tokens.push(std::mem::take(&mut current))
            }
            c => current.push(c),
        }
    }
    tokens.push(current);

    tokens
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && *t != NONE_PLACEHOLDER)
        .filter_map(parse_star_token)
        .collect()
}

fn parse_star_token(token: &str) -> Option<Star> {
    let name_end = token.find('[').unwrap_or(token.len());
    let name = token[..name_end].trim();
    if name.is_empty() {
        return None;
    }

    let mut star = Star::new(name);
    let mut rest = &token[name_end..];
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else {
            break;
        };
        let tag = after[..close].trim();
        if !tag.is_empty() {
            match classify_transformation(tag) {
                Some(ft) => star.four_transformation = Some(ft),
                None => star.attributes.push(tag.to_string()),
            }
        }
        rest = &after[close + 1..];
    }
    Some(star)
}

/// Classify a bracket tag as a transformation, reading its origin from the
/// leading marker.
fn classify_transformation(tag: &str) -> Option<FourTransformation> {
    let kind = TransformationType::find_in(tag)?;
    let origin = if tag.starts_with('↓') {
        TransformationOrigin::Outbound
    } else if tag.starts_with('↑') {
        TransformationOrigin::Inbound
    } else if tag.starts_with("生年") {
        TransformationOrigin::Natal
    } else {
        TransformationOrigin::Unmarked
    };
    Some(FourTransformation { kind, origin })
}

/// Convenience wrapper around [`ChartParser::parse`].
pub fn parse(text: &str) -> Chart {
    ChartParser::new().parse(text)
}
