//! Owner / affiliate split of a single subscriber's rate.
//!
//! Every aggregate the contract keeps is a sum of `Split`s produced here. The
//! affiliate share is rounded down and the owner absorbs the dust.

/// Basis-point denominator for `affiliate_portion_bps`.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Result of splitting one subscriber rate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Split {
    pub owner: i128,
    pub affiliate: i128,
    /// Credential receiving `affiliate`, `None` when the subscriber is unattributed.
    pub credential: Option<u64>,
}

impl Split {
    pub fn total(&self) -> i128 {
        self.owner + self.affiliate
    }
}

/// Split `rate` between the owner and the credential it is attributed to.
///
/// `rate` is expected to be positive; `portion_bps` must not exceed
/// [`BPS_DENOMINATOR`]. The multiplication is done on quotient and remainder
/// separately so it cannot overflow for any `i128` rate.
pub fn split_rate(rate: i128, portion_bps: u32, credential: Option<u64>) -> Split {
    let affiliate = match credential {
        Some(_) => {
            let denominator = BPS_DENOMINATOR as i128;
            let bps = portion_bps as i128;
            (rate / denominator) * bps + (rate % denominator) * bps / denominator
        }
        None => 0,
    };

    Split {
        owner: rate - affiliate,
        affiliate,
        credential,
    }
}
