// Network sources: the transport seam and its reqwest implementation.

pub mod http_source;
pub mod traits;
