//! 레짐 탐지를 위한 도메인 모델.

mod classification;
mod indicator;
mod parameters;
mod regime;

pub use classification::*;
pub use indicator::*;
pub use parameters::*;
pub use regime::*;
