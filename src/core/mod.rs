pub mod calendar;
pub mod outlier_filter;
pub mod overlap;
pub mod period_builder;
pub mod post_process;
pub mod qualification;
pub mod reference;
pub mod relaxation;
pub mod statistics;
