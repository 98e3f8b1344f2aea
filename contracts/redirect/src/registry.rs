//! Affiliate credentials: minting, code binding, ownership and the index of
//! subscribers attributed to each credential.

use soroban_sdk::{symbol_short, Address, BytesN, Env, IntoVal, String, Val, Vec};

use crate::{
    access, get_metadata, load_credential, next_credential_id, read_or, save_credential,
    set_next_credential_id, write_list, ContractError, Credential, DataKey, LEDGER_BUMP,
    LEDGER_THRESHOLD,
};

/// Longest accepted attribution code, in bytes.
pub(crate) const MAX_CODE_LEN: u32 = 64;
/// Longest accepted base URI, in bytes.
pub(crate) const MAX_BASE_URI_LEN: u32 = 192;

pub(crate) fn mint(
    env: &Env,
    minter: &Address,
    code: String,
    proof: &Vec<BytesN<32>>,
) -> Result<u64, ContractError> {
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return Err(ContractError::InvalidCode);
    }
    access::check_mint_eligibility(env, minter, proof)?;
    if resolve_code(env, &code).is_some() {
        return Err(ContractError::CodeTaken);
    }

    let id = next_credential_id(env);
    set_next_credential_id(env, id + 1);

    let credential = Credential {
        id,
        code: code.clone(),
        owner: minter.clone(),
        minter: minter.clone(),
    };
    save_credential(env, &credential);
    put(env, &DataKey::Code(code.clone()), &id);

    let mut holdings = holdings_of(env, minter);
    holdings.push_back(id);
    write_list(env, &DataKey::Holdings(minter.clone()), &holdings);

    put(
        env,
        &DataKey::MintCount(minter.clone()),
        &(mint_count_of(env, minter) + 1),
    );

    env.events()
        .publish((symbol_short!("minted"), minter.clone()), (id, code));
    Ok(id)
}

/// Resolve an attribution tag. Empty and unknown tags resolve to `None`.
pub(crate) fn resolve_code(env: &Env, code: &String) -> Option<u64> {
    if code.is_empty() {
        return None;
    }
    env.storage().persistent().get(&DataKey::Code(code.clone()))
}

pub(crate) fn beneficiary_of(env: &Env, id: u64) -> Result<Address, ContractError> {
    Ok(load_credential(env, id)?.owner)
}

pub(crate) fn holdings_of(env: &Env, owner: &Address) -> Vec<u64> {
    read_or(env, &DataKey::Holdings(owner.clone()), Vec::new(env))
}

pub(crate) fn mint_count_of(env: &Env, account: &Address) -> u32 {
    read_or(env, &DataKey::MintCount(account.clone()), 0u32)
}

/// Move a credential from `from` to `to`. Only ownership and the holdings
/// index change; subscriptions keep pointing at the credential id.
pub(crate) fn reassign(
    env: &Env,
    from: &Address,
    to: &Address,
    id: u64,
) -> Result<(), ContractError> {
    let mut credential = load_credential(env, id)?;
    if credential.owner != *from {
        return Err(ContractError::NotOwner);
    }
    if from == to {
        return Ok(());
    }

    credential.owner = to.clone();
    save_credential(env, &credential);

    let mut from_holdings = holdings_of(env, from);
    if let Some(index) = from_holdings.first_index_of(id) {
        from_holdings.remove(index);
    }
    write_list(env, &DataKey::Holdings(from.clone()), &from_holdings);

    let mut to_holdings = holdings_of(env, to);
    to_holdings.push_back(id);
    write_list(env, &DataKey::Holdings(to.clone()), &to_holdings);

    env.events()
        .publish((symbol_short!("transfer"), from.clone(), to.clone()), id);
    Ok(())
}

pub(crate) fn token_uri(env: &Env, id: u64) -> Result<String, ContractError> {
    let code = load_credential(env, id)?.code;
    let base = get_metadata(env).base_uri;

    let base_len = base.len() as usize;
    let end = base_len + code.len() as usize;
    let mut buf = [0u8; (MAX_BASE_URI_LEN + MAX_CODE_LEN) as usize];
    base.copy_into_slice(&mut buf[..base_len]);
    code.copy_into_slice(&mut buf[base_len..end]);
    Ok(String::from_bytes(env, &buf[..end]))
}

// Attributed subscribers are kept one entry per slot, so attaching and
// detaching cost the same however popular a code is. Detach moves the last
// slot into the freed one; enumeration order is not stable across removals.

pub(crate) fn subscriber_count(env: &Env, id: u64) -> u32 {
    read_or(env, &DataKey::AttributedCount(id), 0u32)
}

pub(crate) fn subscribers_of(env: &Env, id: u64) -> Vec<Address> {
    let mut subscribers = Vec::new(env);
    for slot in 0..subscriber_count(env, id) {
        if let Some(subscriber) = env
            .storage()
            .persistent()
            .get(&DataKey::AttributedAt(id, slot))
        {
            subscribers.push_back(subscriber);
        }
    }
    subscribers
}

pub(crate) fn attach(env: &Env, id: u64, subscriber: &Address) {
    let slot_key = DataKey::AttributedSlot(id, subscriber.clone());
    if env.storage().persistent().has(&slot_key) {
        return;
    }

    let slot = subscriber_count(env, id);
    put(env, &DataKey::AttributedAt(id, slot), subscriber);
    put(env, &slot_key, &slot);
    put(env, &DataKey::AttributedCount(id), &(slot + 1));
}

pub(crate) fn detach(env: &Env, id: u64, subscriber: &Address) {
    let slot_key = DataKey::AttributedSlot(id, subscriber.clone());
    let slot: u32 = match env.storage().persistent().get(&slot_key) {
        Some(slot) => slot,
        None => return,
    };

    let last = subscriber_count(env, id) - 1;
    let storage = env.storage().persistent();
    if slot != last {
        if let Some(moved) = storage.get::<DataKey, Address>(&DataKey::AttributedAt(id, last)) {
            put(env, &DataKey::AttributedAt(id, slot), &moved);
            put(env, &DataKey::AttributedSlot(id, moved), &slot);
        }
    }
    storage.remove(&DataKey::AttributedAt(id, last));
    storage.remove(&slot_key);
    if last == 0 {
        storage.remove(&DataKey::AttributedCount(id));
    } else {
        put(env, &DataKey::AttributedCount(id), &last);
    }
}

fn put<V: IntoVal<Env, Val>>(env: &Env, key: &DataKey, value: &V) {
    env.storage().persistent().set(key, value);
    env.storage()
        .persistent()
        .extend_ttl(key, LEDGER_THRESHOLD, LEDGER_BUMP);
}

pub(crate) fn codes_of(env: &Env, ids: &Vec<u64>) -> Vec<String> {
    let mut codes = Vec::new(env);
    for id in ids.iter() {
        let code = match load_credential(env, id) {
            Ok(credential) => credential.code,
            Err(_) => String::from_str(env, ""),
        };
        codes.push_back(code);
    }
    codes
}
