pub mod dataset;
pub mod error;
pub mod filters;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod plot;
pub mod segments;
pub mod signal;

pub use dataset::*;
pub use error::*;
pub use filters::*;
pub use metrics::*;
pub use segments::*;
pub use signal::*;
