use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::math::{apply_bps, BPS_DENOMINATOR};
use crate::venues::SwapLeg;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Fills land anywhere from the quote down to this much below it.
    pub slippage_bps: u32,
    /// Gas charged per leg, quote base units.
    pub gas_fee: u128,
    /// Chance that a leg reverts outright.
    pub failure_bps: u32,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            slippage_bps: 20,
            gas_fee: 500_000,
            failure_bps: 0,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedFill {
    Filled {
        amount_out: u128,
        fee_paid: u128,
        tx_hash: String,
    },
    Reverted {
        fee_paid: u128,
        reason: String,
    },
}

/// Stands in for the gateway in Simulation and Paper mode. Outcomes are
/// random but reproducible for a given seed and call order.
pub struct FillSimulator {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
    counter: Mutex<u64>,
}

impl FillSimulator {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng: Mutex::new(rng),
            counter: Mutex::new(0),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Fill `leg` against a fresh `quoted_out`. Reverts like the chain would
    /// when the fill lands under `min_acceptable_amount_out`.
    pub fn fill(&self, leg: &SwapLeg, quoted_out: u128) -> SimulatedFill {
        let (fails, slip_bps) = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let fails = self.config.failure_bps > 0 && rng.gen_range(0..10_000u32) < self.config.failure_bps;
            let slip = if self.config.slippage_bps > 0 {
                rng.gen_range(0..=self.config.slippage_bps.min(BPS_DENOMINATOR))
            } else {
                0
            };
            (fails, slip)
        };
        let fee_paid = self.config.gas_fee;

        if fails {
            tracing::debug!(venue = %leg.venue, token_in = %leg.token_in, "Simulated leg reverted");
            return SimulatedFill::Reverted {
                fee_paid,
                reason: "simulated revert".to_string(),
            };
        }

        let amount_out = quoted_out.saturating_sub(apply_bps(quoted_out, slip_bps));
        if amount_out < leg.min_acceptable_amount_out {
            return SimulatedFill::Reverted {
                fee_paid,
                reason: format!(
                    "fill {} below minimum {}",
                    amount_out, leg.min_acceptable_amount_out
                ),
            };
        }

        let seq = {
            let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
            *counter += 1;
            *counter
        };
        SimulatedFill::Filled {
            amount_out,
            fee_paid,
            tx_hash: format!("sim-{}-{seq:06}", self.config.seed),
        }
    }
}
