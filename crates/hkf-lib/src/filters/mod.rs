pub mod kalman;

pub use kalman::*;
