pub mod analysis;
pub mod bwic_input;
pub mod config;

pub use analysis::{
    Analysis, BidScenario, ParseWarning, ReportSection, MAX_SCENARIOS, MIN_SCENARIOS,
    MISSING_SECTION_MARKER,
};
pub use bwic_input::{
    AnalysisInput, BwicDetails, ComparableTrade, HistoricalBwic, MarketContext, TraceData,
    TraderConstraints, ValuationData,
};
pub use config::{
    AnalysisConfig, ApiKey, BwicConfig, Credentials, DeadlinePolicy, ModelConfig, RetryConfig,
};
