pub mod aggregate;
pub mod bucket;
pub mod derive;
pub mod filter;

pub use aggregate::{aggregate, AggregatedInterval, AggregationStage};
pub use bucket::AveragingInterval;
pub use derive::{derive, derive_all, BinSeries, DerivationStage, DsdRecord};
pub use filter::{BinExclusion, ConditionalFilter};
