//! Chart report parsing and the chart entity model

mod parser;
mod types;

pub use parser::{parse, parse_star_list, ChartParser};
pub use types::{
    BasicInfo, Chart, FourTransformation, Palace, PalaceName, PeriodLabels, Spirits, Star,
    TransformationOrigin, TransformationType, VersionInfo,
};

