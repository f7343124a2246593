mod license;

pub use license::*;
