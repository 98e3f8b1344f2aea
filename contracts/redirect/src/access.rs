//! Accepted-token allow-list, role checks and mint eligibility.

use soroban_sdk::{symbol_short, Address, BytesN, Env, Vec};

use crate::{
    get_accepted_tokens, get_config, get_merkle_root, get_whitelist, merkle, registry,
    set_accepted_tokens, Config, ContractError,
};

pub(crate) fn is_accepted_token(env: &Env, token: &Address) -> bool {
    get_accepted_tokens(env).contains(token)
}

pub(crate) fn add_accepted_token(env: &Env, token: &Address) -> Result<(), ContractError> {
    let mut tokens = get_accepted_tokens(env);
    if tokens.contains(token) {
        return Err(ContractError::AlreadyAccepted);
    }
    tokens.push_back(token.clone());
    set_accepted_tokens(env, &tokens);

    env.events()
        .publish((symbol_short!("token"), symbol_short!("accepted")), token.clone());
    Ok(())
}

/// Authenticate `caller` and check it is the owner. Returns the config so
/// owner-only mutators can update it without a second read.
pub(crate) fn require_owner(env: &Env, caller: &Address) -> Result<Config, ContractError> {
    caller.require_auth();
    let config = get_config(env);
    if *caller != config.owner {
        return Err(ContractError::Unauthorized);
    }
    Ok(config)
}

pub(crate) fn require_operator(env: &Env, caller: &Address) -> Result<Config, ContractError> {
    caller.require_auth();
    let config = get_config(env);
    if *caller != config.operator {
        return Err(ContractError::Unauthorized);
    }
    Ok(config)
}

/// Mint gate. With the whitelist disabled anyone may mint without limit.
pub(crate) fn check_mint_eligibility(
    env: &Env,
    account: &Address,
    proof: &Vec<BytesN<32>>,
) -> Result<(), ContractError> {
    let whitelist = get_whitelist(env);
    if !whitelist.enabled {
        return Ok(());
    }

    let root = get_merkle_root(env);
    if !merkle::verify(env, &root, merkle::leaf_for(env, account), proof) {
        return Err(ContractError::NotWhitelisted);
    }
    if registry::mint_count_of(env, account) >= whitelist.mint_cap {
        return Err(ContractError::MintLimitExceeded);
    }
    Ok(())
}

pub(crate) fn verify_eligible(env: &Env, account: &Address, proof: &Vec<BytesN<32>>) -> bool {
    check_mint_eligibility(env, account, proof).is_ok()
}
