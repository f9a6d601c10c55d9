//! Common test utilities for chart parsing and analysis tests
//!
//! Provides a complete sample report plus canned generation responses that
//! answer every unit of the pipeline.

#![allow(dead_code)]

use serde_json::{json, Map, Value};
use ziwei::PalaceName;

/// Birth year encoded in [`SAMPLE_REPORT`].
pub const BIRTH_YEAR: i32 = 1990;

/// Current year used by the pipeline tests; gives a current age of 35.
pub const CURRENT_YEAR: i32 = 2024;

/// A complete nested-outline report with all twelve palaces.
pub const SAMPLE_REPORT: &str = "\
紫微斗数命盘
│
├基本信息
│ │
│ ├API 版本 : 1.2.0
│ ├App版本 : 3.1.0
│ ├安星码 : ZW_2024
│ ├性别 : 男
│ ├地理经度 : 116.40
│ ├钟表时间 : 1990-05-01 08:00
│ ├真太阳时 : 1990-05-01 07:45
│ ├农历时间 : 庚午年四月初七辰时
│ ├节气四柱 : 庚午 辛巳 甲子 戊辰
│ ├非节气四柱 : 庚午 庚辰 甲子 戊辰
│ ├五行局数 : 水二局
│ └身主:文昌; 命主:巨门; 子年斗君:寅; 身宫:财帛宫
│
├命盘十二宫
│ │
│ ├命  宫[甲申][来因]
│ │ ├主星 : 紫微[旺][生年科],天府[庙]
│ │ ├辅星 : 左辅[旺]
│ │ ├小星 : 天刑,三台
│ │ ├神煞
│ │ │ ├岁前星 : 岁建
│ │ │ ├将前星 : 将星
│ │ │ ├十二长生 : 长生
│ │ │ └太岁煞禄 : 太岁
│ │ ├大限 : 6~15
│ │ ├小限 : 5,17,29
│ │ └流年 : 1,13,25
│ ├兄弟宫[癸未]
│ │ ├主星 : 天机[平][↑忌]
│ │ ├辅星 : 无
│ │ ├小星 : 无
│ │ ├大限 : 16~25
│ │ ├小限 : 6,18,30
│ │ └流年 : 2,14,26
│ ├夫妻宫[壬午]
│ │ ├主星 : 无
│ │ ├辅星 : 右弼[庙][↓科]
│ │ ├小星 : 红鸾
│ │ ├大限 : 26~35
│ │ ├小限 : 7,19,31
│ │ └流年 : 3,15,27
│ ├子女宫[辛巳]
│ │ ├主星 : 太阳[旺][生年禄]
│ │ ├辅星 : 文曲[陷]
│ │ ├小星 : 无
│ │ ├大限 : 36~45
│ │ ├小限 : 8,20,32
│ │ └流年 : 4,16,28
│ ├财帛宫[庚辰][身宫]
│ │ ├主星 : 武曲[庙][权]
│ │ ├辅星 : 禄存
│ │ ├小星 : 无
│ │ ├大限 : 46~55
│ │ ├小限 : 9,21,33
│ │ └流年 : 5,17,29
│ ├疾厄宫[己卯]
│ │ ├主星 : 天同[平]
│ │ ├辅星 : 擎羊[陷]
│ │ ├小星 : 无
│ │ ├大限 : 56~65
│ │ ├小限 : 10,22,34
│ │ └流年 : 6,18,30
│ ├迁移宫[戊寅]
│ │ ├主星 : 七杀[庙]
│ │ ├辅星 : 天马
│ │ ├小星 : 无
│ │ ├大限 : 66~75
│ │ ├小限 : 11,23,35
│ │ └流年 : 7,19,31
│ ├交友宫[己丑]
│ │ ├主星 : 天梁[陷]
│ │ ├辅星 : 无
│ │ ├小星 : 无
│ │ ├大限 : 76~85
│ │ ├小限 : 12,24,36
│ │ └流年 : 8,20,32
│ ├官禄宫[戊子]
│ │ ├主星 : 廉贞[平][生年忌],贪狼[陷]
│ │ ├辅星 : 文昌[得]
│ │ ├小星 : 无
│ │ ├大限 : 86~95
│ │ ├小限 : 1,13,25
│ │ └流年 : 9,21,33
│ ├田宅宫[丁亥]
│ │ ├主星 : 巨门[旺]
│ │ ├辅星 : 无
│ │ ├小星 : 无
│ │ ├大限 : 96~105
│ │ ├小限 : 2,14,26
│ │ └流年 : 10,22,34
│ ├福德宫[丙戌]
│ │ ├主星 : 太阴[庙][↑禄]
│ │ ├辅星 : 天钺
│ │ ├小星 : 无
│ │ ├大限 : 106~115
│ │ ├小限 : 3,15,27
│ │ └流年 : 11,23,35
│ └父母宫[乙酉]
│   ├主星 : 天相[得]
│   ├辅星 : 陀罗[陷]
│   ├小星 : 无
│   ├大限 : 116~125
│   ├小限 : 4,16,28
│   └流年 : 12,24,36
│
└备注
  └生成工具 : 文墨天机
";

/// Palace analysis object in the requested shape.
pub fn palace_analysis(name: PalaceName) -> Value {
    json!({
        "analysis": format!("{}分析", name),
        "analysisPlain": "白话",
        "basis": ["依据1", "依据2", "依据3"],
        "solutions": ["建议1", "建议2"],
        "keywords": ["关键词"]
    })
}

/// `{"palaces": {...}}` response covering `names`.
pub fn palaces_response(names: &[PalaceName]) -> String {
    let palaces: Map<String, Value> = names
        .iter()
        .map(|n| (n.as_str().to_string(), palace_analysis(*n)))
        .collect();
    json!({ "palaces": palaces }).to_string()
}

/// Yearly entry; `age` omitted so enrichment has to back-fill it.
pub fn yearly_entry(year: i32, fortune: &str) -> Value {
    json!({
        "year": year,
        "fortune": fortune,
        "fortunePlain": "白话",
        "basis": ["依据"],
        "solutions": ["建议"],
        "focus": ["事业"],
        "level": "平",
        "warning": "注意"
    })
}

/// One response object answering every unit: the orchestrator only keeps
/// the keys and years each unit asked for.
pub fn universal_response() -> String {
    let palaces: Map<String, Value> = PalaceName::ALL
        .iter()
        .map(|n| (n.as_str().to_string(), palace_analysis(*n)))
        .collect();
    let years: Vec<Value> = (BIRTH_YEAR..=CURRENT_YEAR)
        .map(|y| yearly_entry(y, "运势"))
        .collect();

    let mut special = Map::new();
    for key in ["career", "study", "marriage", "health", "relationship"] {
        special.insert(key.to_string(), json!(format!("{}分析", key)));
        special.insert(format!("{}Plain", key), json!("白话"));
        special.insert(format!("{}Basis", key), json!(["依据"]));
        special.insert(format!("{}Solutions", key), json!(["建议"]));
    }

    json!({
        "overall": {
            "pattern": "紫府同宫格",
            "patternPlain": "白话",
            "personality": "稳重",
            "lifeTrend": "先难后易"
        },
        "palaces": palaces,
        "yearlyFortune": years,
        "specialAnalysis": special,
        "suggestions": {
            "solutions": ["多行善"],
            "luckyElements": {"directions": ["东"], "colors": ["绿"], "numbers": [3, 8]}
        },
        "keyEvents": [
            {"timeRange": "2015-2017", "area": "事业", "event": "升迁", "level": "吉"}
        ]
    })
    .to_string()
}

/// Needle matching the batch prompt for exactly `names`.
pub fn palace_needle(names: &[PalaceName]) -> String {
    let joined: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
    format!("仅分析以下宫位：{}。", joined.join("、"))
}

/// Needle matching the yearly prompt for one year range.
pub fn yearly_needle(start_year: i32, end_year: i32) -> String {
    format!("【时间范围】{}-{}年", start_year, end_year)
}

pub const OVERVIEW_NEEDLE: &str = "【格局总论】";
pub const SUGGESTIONS_NEEDLE: &str = "【关键事件提示】";
