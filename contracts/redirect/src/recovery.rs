use soroban_sdk::{symbol_short, token, Address, Env};

use crate::{access, is_locked, ContractError};

/// Move everything above `min_retained` to the operator. Bookkeeping is not
/// touched: this drains dust and stuck deposits, it does not redistribute.
pub(crate) fn sweep(
    env: &Env,
    caller: &Address,
    token: &Address,
    min_retained: i128,
) -> Result<i128, ContractError> {
    let config = access::require_operator(env, caller)?;
    if !is_locked(env) {
        return Err(ContractError::NotLocked);
    }
    if min_retained < 0 {
        return Err(ContractError::InvalidAmount);
    }

    let token_client = token::Client::new(env, token);
    let agent = env.current_contract_address();
    let excess = token_client.balance(&agent) - min_retained;
    if excess <= 0 {
        return Ok(0);
    }

    token_client.transfer(&agent, &config.operator, &excess);

    env.events()
        .publish((symbol_short!("swept"), token.clone()), excess);
    Ok(excess)
}
