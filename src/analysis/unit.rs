//! Generation units: one prompt, one expected JSON shape
//!
//! Every unit is built from the chart alone (plus derived age arithmetic),
//! so units of the same stage are independent of each other.

use super::types::Topic;
use crate::chart::{BasicInfo, Chart, Palace, PalaceName, Star};
use std::fmt::Write;

/// Birth-year arithmetic shared by prompt building and enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeline {
    pub birth_year: i32,
    pub birth_year_estimated: bool,
    pub current_year: i32,
    /// East-Asian reckoning: `current_year - birth_year + 1`
    pub current_age: i32,
    pub start_luck_age: Option<i32>,
    pub start_luck_year: Option<i32>,
}

impl Timeline {
    /// Calendar year in which the chart holder reaches `age`.
    pub fn year_of_age(&self, age: i32) -> i32 {
        self.birth_year.saturating_add(age).saturating_sub(1)
    }

    fn start_luck_text(&self) -> String {
        match (self.start_luck_age, self.start_luck_year) {
            (Some(age), Some(year)) => format!("{}岁（{}年）", age, year),
            _ => "未知".to_string(),
        }
    }
}

/// What a unit asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    Overview,
    Palaces(Vec<PalaceName>),
    YearlyFortune {
        start_year: i32,
        end_year: i32,
        start_age: i32,
        end_age: i32,
    },
    Special(Vec<Topic>),
    Suggestions,
}

impl UnitKind {
    /// Short label used in logs, warnings and errors.
    pub fn label(&self) -> String {
        match self {
            UnitKind::Overview => "overview".to_string(),
            UnitKind::Palaces(names) => format!("palaces {}", join_palaces(names)),
            UnitKind::YearlyFortune {
                start_year,
                end_year,
                ..
            } => format!("yearly fortune {}-{}", start_year, end_year),
            UnitKind::Special(topics) => {
                let keys: Vec<&str> = topics.iter().map(|t| t.key()).collect();
                format!("special topics {}", keys.join(","))
            }
            UnitKind::Suggestions => "suggestions".to_string(),
        }
    }

    /// Top-level keys the response is expected to carry.
    pub fn response_keys(&self) -> &'static [&'static str] {
        match self {
            UnitKind::Overview => &["overall"],
            UnitKind::Palaces(_) => &["palaces"],
            UnitKind::YearlyFortune { .. } => &["yearlyFortune"],
            UnitKind::Special(_) => &["specialAnalysis"],
            UnitKind::Suggestions => &["suggestions", "keyEvents"],
        }
    }
}

/// A single request to the generation service.
#[derive(Debug, Clone)]
pub struct GenerationUnit {
    pub kind: UnitKind,
    pub prompt: String,
}

const PREAMBLE: &str = "你现在是紫微斗数专家。请综合使用三合紫微、飞星紫微、河洛紫微、钦天四化等技法，";

const QUOTE_RULE: &str = "内容中如需引用请使用中文引号「」或《》，不要使用英文双引号。";

/// Palaces shown in the overview prompt: the life palace and its trines.
const OVERVIEW_PALACES: [PalaceName; 4] = [
    PalaceName::Life,
    PalaceName::Wealth,
    PalaceName::Career,
    PalaceName::Travel,
];

impl GenerationUnit {
    pub fn label(&self) -> String {
        self.kind.label()
    }

    pub fn overview(chart: &Chart) -> Self {
        let mut prompt = String::new();
        prompt.push_str(PREAMBLE);
        prompt.push_str("根据以下命盘信息，仅分析【格局总论】和【命主性格】。\n");
        prompt.push_str("要求：三合紫微用于定格局、飞星紫微用于看隐性性格；请结合四化飞星逻辑，深度分析命盘格局高低。结论必须有推导链，点名具体宫位/主星/四化/组合，避免空话。\n\n");
        prompt.push_str("【命主基本信息】\n");
        prompt.push_str(&format_basic_info(&chart.basic_info));
        prompt.push_str("\n\n【命宫、身宫及三方四正】\n");
        prompt.push_str(&format_palaces(chart, &OVERVIEW_PALACES));
        prompt.push('\n');
        prompt.push_str("请严格输出JSON（不要包含Markdown或多余文字），仅包含overall对象，不要返回其他字段。白话解读要写清「因果」，说明结论怎么推出来；推算依据写成3-5条要点，必须点名具体宫位/主星/四化/组合；每条结论都要给出2-4条对应化解/强化建议；");
        prompt.push_str(QUOTE_RULE);
        prompt.push_str("格式如下：\n");
        prompt.push_str(
            r#"{
  "overall": {
    "pattern": "格局总论（300字以上，深度分析命盘格局高低、成格与破格）",
    "patternPlain": "格局总论的白话解读",
    "patternBasis": ["依据1", "依据2", "依据3"],
    "patternSolutions": ["建议1", "建议2"],
    "personality": "性格特质（200字以上，分析显性与隐性性格、优缺点）",
    "personalityPlain": "性格特质的白话解读",
    "personalityBasis": ["依据1", "依据2", "依据3"],
    "personalitySolutions": ["建议1", "建议2"],
    "lifeTrend": "人生大势（200字以上，概括一生起伏、成就高低）",
    "lifeTrendPlain": "人生大势的白话解读",
    "lifeTrendBasis": ["依据1", "依据2", "依据3"],
    "lifeTrendSolutions": ["建议1", "建议2"]
  }
}"#,
        );

        Self {
            kind: UnitKind::Overview,
            prompt,
        }
    }

    pub fn palaces(chart: &Chart, names: &[PalaceName]) -> Self {
        let schema: Vec<String> = names
            .iter()
            .map(|name| {
                format!(
                    r#"    "{}": {{ "analysis": "...", "analysisPlain": "...", "basis": ["..."], "solutions": ["..."], "keywords": ["..."] }}"#,
                    name
                )
            })
            .collect();

        let mut prompt = String::new();
        prompt.push_str(PREAMBLE);
        prompt.push_str("对该命盘进行【十二宫位】的详细扫描分析。\n");
        prompt.push_str("要求：不仅要看本宫星曜（三合），还要结合河洛紫微的对应宫位原理，以及各宫位的自化（钦天四化）现象进行吉凶判断；每宫结论必须有推导链，点名具体宫位/主星/四化/组合，避免空话；说明宫位间的飞宫四化与三方四正联动。\n");
        let _ = writeln!(prompt, "仅分析以下宫位：{}。\n", join_palaces(names));
        prompt.push_str("【宫位详细信息】\n");
        prompt.push_str(&format_palaces(chart, names));
        prompt.push('\n');
        prompt.push_str("请严格输出JSON（不要包含Markdown或多余文字），仅包含palaces对象，不要返回其他字段。每宫位至少150字，包含具体吉凶判断和关键词；白话解读80-120字；推算依据写成3-5条要点，必须点名具体宫位/主星/四化/组合；每宫位给出2-4条对应化解/强化建议；");
        prompt.push_str(QUOTE_RULE);
        prompt.push_str("格式如下：\n");
        let _ = write!(prompt, "{{\n  \"palaces\": {{\n{}\n  }}\n}}", schema.join(",\n"));

        Self {
            kind: UnitKind::Palaces(names.to_vec()),
            prompt,
        }
    }

    pub fn yearly_fortune(chart: &Chart, timeline: &Timeline, start_age: i32, end_age: i32) -> Self {
        let start_year = timeline.year_of_age(start_age);
        let end_year = timeline.year_of_age(end_age);

        let mut prompt = String::new();
        prompt.push_str(PREAMBLE);
        prompt.push_str("分析该命盘的【流年运势】。\n");
        let _ = writeln!(
            prompt,
            "要求：重点运用钦天四化的流年四化叠宫技巧，以及飞星的流年大限应期理论，判断每年的具体吉凶和事件；每年结论必须有推导链，点名相关宫位/主星/四化，避免空话；若为凶/大凶必须给出化解方案，若为吉/大吉给出强化建议。只输出{}-{}年范围内的年份，并确保年龄与年份对应。\n",
            start_year, end_year
        );
        let _ = writeln!(prompt, "【时间范围】{}-{}年", start_year, end_year);
        let _ = writeln!(prompt, "【年龄范围】{}-{}虚岁", start_age, end_age);
        let _ = writeln!(prompt, "【起运年龄】{}", timeline.start_luck_text());
        let _ = writeln!(prompt, "【基本信息】{}", basic_info_json(&chart.basic_info));
        prompt.push_str("【命盘信息】\n");
        prompt.push_str(&format_palaces(chart, &PalaceName::ALL));
        prompt.push('\n');
        prompt.push_str("请严格输出JSON（不要包含Markdown或多余文字），仅包含yearlyFortune数组，不要返回其他字段。每年至少80字；白话解读40-80字；推算依据写成2-4条要点，点名相关宫位/主星/四化；每年给出2-3条对应化解/强化建议；");
        prompt.push_str(QUOTE_RULE);
        prompt.push_str("格式如下：\n");
        let _ = write!(
            prompt,
            r#"{{
  "yearlyFortune": [
    {{
      "year": {},
      "age": {},
      "fortune": "详细运势描述...",
      "fortunePlain": "白话解读...",
      "basis": ["依据1", "依据2"],
      "solutions": ["建议1", "建议2"],
      "focus": ["关键词1", "关键词2"],
      "level": "大吉/吉/平/凶/大凶",
      "warning": "关键提醒"
    }}
  ]
}}"#,
            start_year, start_age
        );

        Self {
            kind: UnitKind::YearlyFortune {
                start_year,
                end_year,
                start_age,
                end_age,
            },
            prompt,
        }
    }

    pub fn special(chart: &Chart, timeline: &Timeline, topics: &[Topic]) -> Self {
        let labels: Vec<&str> = topics.iter().map(|t| t.label()).collect();
        let schema: Vec<String> = topics
            .iter()
            .map(|t| {
                let key = t.key();
                format!(
                    "    \"{key}\": \"{brief}\",\n    \"{key}Plain\": \"{label}白话解读\",\n    \"{key}Basis\": [\"依据1\", \"依据2\", \"依据3\"],\n    \"{key}Solutions\": [\"建议1\", \"建议2\"]",
                    key = key,
                    brief = t.brief(),
                    label = t.label()
                )
            })
            .collect();

        let mut prompt = String::new();
        prompt.push_str(PREAMBLE);
        prompt.push_str("对该命盘进行【专项深度分析】。\n");
        prompt.push_str("要求：给出具体的化解建议与可执行的人生规划方向（写在solutions中，不要新增字段）；结论必须有推导链，点名具体宫位/主星/四化/组合，避免空话；白话解读要写清因果与推导；");
        prompt.push_str(QUOTE_RULE);
        prompt.push('\n');
        let _ = writeln!(prompt, "仅分析以下主题：{}。\n", labels.join("、"));
        push_context(&mut prompt, chart, timeline);
        prompt.push_str("请严格输出JSON（不要包含Markdown或多余文字），仅包含specialAnalysis对象，不要返回其他字段。每段落包含白话解读80-120字，推算依据写成3-5条要点，并给出2-4条对应化解/强化建议。格式如下：\n");
        let _ = write!(
            prompt,
            "{{\n  \"specialAnalysis\": {{\n{}\n  }}\n}}",
            schema.join(",\n")
        );

        Self {
            kind: UnitKind::Special(topics.to_vec()),
            prompt,
        }
    }

    pub fn suggestions(chart: &Chart, timeline: &Timeline) -> Self {
        let mut prompt = String::new();
        prompt.push_str(PREAMBLE);
        prompt.push_str("对该命盘给出【化解建议】与【关键事件提示】。\n");
        prompt.push_str("要求：结论必须有推导链，点名具体宫位/主星/四化/组合，避免空话；若提及问题必须给出化解方案；关键事件列出6-10条，覆盖早年/中年/未来10年，标注时间范围、吉凶与影响程度，并给出对应化解/行动建议。\n\n");
        push_context(&mut prompt, chart, timeline);
        prompt.push_str("请严格输出JSON（不要包含Markdown或多余文字），仅包含suggestions与keyEvents对象，不要返回其他字段。白话解读80-120字；推算依据写成2-5条要点；每项给出2-4条对应建议；");
        prompt.push_str(QUOTE_RULE);
        prompt.push_str("格式如下：\n");
        prompt.push_str(
            r#"{
  "suggestions": {
    "solutions": ["化解建议1", "化解建议2", "化解建议3"],
    "solutionsPlain": "化解建议白话解读",
    "solutionsBasis": ["依据1", "依据2"],
    "luckyElements": {
      "directions": ["利方1", "利方2"],
      "colors": ["幸运色1", "幸运色2"],
      "numbers": [1, 6, 8]
    },
    "lifePlanning": "人生整体规划建议（300字）",
    "lifePlanningPlain": "人生规划白话解读",
    "lifePlanningBasis": ["依据1", "依据2", "依据3"]
  },
  "keyEvents": [
    {
      "timeRange": "时间范围（公历年或年龄段）",
      "ageRange": "年龄范围（虚岁）",
      "area": "事业/财运/感情/健康/学业/人际等",
      "event": "关键事件描述",
      "level": "大吉/吉/平/凶/大凶",
      "impact": "轻/中/重",
      "basis": ["依据1", "依据2", "依据3"],
      "solutions": ["建议1", "建议2"]
    }
  ]
}"#,
        );

        Self {
            kind: UnitKind::Suggestions,
            prompt,
        }
    }
}

fn push_context(prompt: &mut String, chart: &Chart, timeline: &Timeline) {
    let _ = writeln!(prompt, "【当前时间】{}年", timeline.current_year);
    let _ = writeln!(prompt, "【起运年龄】{}", timeline.start_luck_text());
    let _ = writeln!(prompt, "【命主基本信息】{}", basic_info_json(&chart.basic_info));
    prompt.push_str("【命盘信息】\n");
    prompt.push_str(&format_palaces(chart, &PalaceName::ALL));
    prompt.push('\n');
}

fn join_palaces(names: &[PalaceName]) -> String {
    names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join("、")
}

fn basic_info_json(info: &BasicInfo) -> String {
    serde_json::to_string(info).unwrap_or_default()
}

fn format_basic_info(info: &BasicInfo) -> String {
    let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "未知".to_string());
    format!(
        "性别: {}, 农历: {}, 五行局: {}, 命主: {}, 身主: {}",
        field(&info.gender),
        field(&info.lunar_time),
        field(&info.element),
        field(&info.life_master),
        field(&info.body_master)
    )
}

fn format_stars(stars: &[Star]) -> String {
    if stars.is_empty() {
        return "无".to_string();
    }
    stars.iter().map(Star::describe).collect::<Vec<_>>().join(", ")
}

fn format_palace(name: PalaceName, palace: &Palace) -> String {
    let mut out = String::new();
    let _ = write!(out, "【{}】位于{}", name, palace.position);
    if palace.is_body_palace {
        out.push_str("[身宫]");
    }
    if palace.is_karma_palace {
        out.push_str("[来因]");
    }
    out.push('\n');
    let _ = writeln!(out, "  主星: {}", format_stars(&palace.main_stars));
    let _ = writeln!(out, "  辅星: {}", format_stars(&palace.assist_stars));
    if !palace.minor_stars.is_empty() {
        let _ = writeln!(out, "  小星: {}", format_stars(&palace.minor_stars));
    }
    let transformed: Vec<String> = palace.transformed_stars().map(Star::describe).collect();
    if !transformed.is_empty() {
        let _ = writeln!(out, "  四化: {}", transformed.join(", "));
    }
    if let Some(major) = &palace.ages.major {
        let _ = writeln!(out, "  大限: {}", major);
    }
    out
}

/// Requested palaces in the given order; palaces absent from the chart are skipped.
fn format_palaces(chart: &Chart, names: &[PalaceName]) -> String {
    names
        .iter()
        .filter_map(|name| chart.palace(*name).map(|p| format_palace(*name, p)))
        .collect()
}
