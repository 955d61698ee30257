pub mod price_history;
pub mod scanner;
pub mod signals;

pub use price_history::{PriceHistory, PriceSample};
pub use scanner::{OpportunityScanner, ScannerConfig};
pub use signals::{detect_momentum, detect_whale, Signal, SignalConfig};
