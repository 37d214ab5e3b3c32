pub mod adjustment;
pub mod benchmark;
pub mod comparables;
pub mod drivers;
pub mod investment;
pub mod negotiation;

pub use adjustment::{ConditionTable, PriceAdjuster};
pub use benchmark::compute_benchmark;
pub use comparables::ComparableMatcher;
pub use drivers::{DriverTable, ValueDriverModel};
pub use investment::{analyze_investment, InvestmentAnalysis};
pub use negotiation::estimate_negotiation;
