pub mod activity;
pub mod notifier;
pub mod position_monitor;

pub use activity::ActivityFeed;
pub use notifier::Notifier;
