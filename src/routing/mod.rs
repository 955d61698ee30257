pub mod optimizer;

pub use optimizer::{
    expected_slippage_bps, min_acceptable_amount_out, Route, RouteError, RouteLeg, RouteOptimizer,
    RouteRequest, RoutingConfig,
};
