pub mod cache;
pub mod resolver;
pub mod single_flight;
pub mod source;

pub use cache::{RateCache, RateKey};
pub use resolver::{Clock, ConversionItem, FixedClock, RateResolver, RefreshReport, SystemClock};
pub use single_flight::SingleFlight;
pub use source::{
    CbrDailyArchive, CrossRateSource, DailyArchive, FrankfurterSource, FxError, RateSource,
};
