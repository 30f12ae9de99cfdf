pub mod detection;
pub mod interval;
pub mod level;
pub mod mode;
pub mod period;

pub use detection::*;
pub use interval::{Interval, IntervalSeries};
pub use level::*;
pub use mode::PeriodMode;
pub use period::{Period, PeriodInterval, PeriodSummary, RelaxationMarkers};
