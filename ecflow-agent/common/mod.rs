pub mod clock;
pub mod regmap;
pub mod transport;

pub use clock::{Delay, ThreadDelay};
pub use regmap::RegisterMap;
pub use transport::RetryTransport;
