//! Subscription state machine and outgoing leg bookkeeping.
//!
//! Each transition runs in three steps: validate, persist the new subscription
//! and aggregates, then `settle` the legs of every receiver whose derived rate
//! may have moved. The adjustments produced by `settle` are what the flow host
//! applies to the agent's outgoing streams.

use soroban_sdk::{symbol_short, Address, Env, String, Vec};

use crate::{
    access, get_config, is_locked, load_subscription, read_or, read_rate, registry,
    remove_subscription, save_subscription,
    split::{split_rate, Split},
    write_list, write_rate, Config, ContractError, DataKey, FlowAdjustment, RedirectEvent,
    Subscription,
};

pub(crate) fn create(
    env: &Env,
    token: &Address,
    subscriber: &Address,
    rate: i128,
    tag: &String,
) -> Result<Vec<FlowAdjustment>, ContractError> {
    if !access::is_accepted_token(env, token) {
        return Err(ContractError::TokenNotAccepted);
    }
    if is_locked(env) {
        return Err(ContractError::Locked);
    }
    if rate <= 0 {
        return Err(ContractError::InvalidRate);
    }
    if let Some(existing) = load_subscription(env, subscriber) {
        return Err(if existing.token == *token {
            ContractError::DuplicateSubscription
        } else {
            ContractError::TokenMismatch
        });
    }

    let config = get_config(env);
    let credential = registry::resolve_code(env, tag);
    let beneficiary = match credential {
        Some(id) => Some(registry::beneficiary_of(env, id)?),
        None => None,
    };

    let subscription = Subscription {
        token: token.clone(),
        rate,
        credential,
    };
    apply(
        env,
        token,
        &split_rate(rate, config.affiliate_portion_bps, credential),
        1,
    );
    save_subscription(env, subscriber, &subscription);
    if let Some(id) = credential {
        registry::attach(env, id, subscriber);
    }

    let adjustments = settle(env, token, receivers(env, &config, beneficiary));

    env.events().publish(
        (symbol_short!("created"), subscriber.clone()),
        RedirectEvent::Created(subscription),
    );
    Ok(adjustments)
}

pub(crate) fn update(
    env: &Env,
    token: &Address,
    subscriber: &Address,
    new_rate: i128,
) -> Result<Vec<FlowAdjustment>, ContractError> {
    let mut subscription = active_subscription(env, token, subscriber)?;
    if new_rate <= 0 {
        return Err(ContractError::InvalidRate);
    }
    if is_locked(env) && new_rate > subscription.rate {
        return Err(ContractError::Locked);
    }

    let config = get_config(env);
    let beneficiary = match subscription.credential {
        Some(id) => Some(registry::beneficiary_of(env, id)?),
        None => None,
    };

    let bps = config.affiliate_portion_bps;
    let old_rate = subscription.rate;
    apply(env, token, &split_rate(old_rate, bps, subscription.credential), -1);
    apply(env, token, &split_rate(new_rate, bps, subscription.credential), 1);

    subscription.rate = new_rate;
    save_subscription(env, subscriber, &subscription);

    let adjustments = settle(env, token, receivers(env, &config, beneficiary));

    env.events().publish(
        (symbol_short!("updated"), subscriber.clone()),
        RedirectEvent::Updated(old_rate, new_rate),
    );
    Ok(adjustments)
}

/// End a subscription.
///
/// `initiator` is `None` when the host reports that the subscriber closed its
/// own inflow. Otherwise the receiving side is closing the share: the
/// initiator must be the owner or the credential's beneficiary, and the
/// subscriber's inbound leg is deleted along with it.
pub(crate) fn terminate(
    env: &Env,
    token: &Address,
    subscriber: &Address,
    initiator: Option<&Address>,
) -> Result<Vec<FlowAdjustment>, ContractError> {
    let subscription = active_subscription(env, token, subscriber)?;

    let config = get_config(env);
    let beneficiary = match subscription.credential {
        Some(id) => Some(registry::beneficiary_of(env, id)?),
        None => None,
    };
    if let Some(initiator) = initiator {
        if *initiator != config.owner && beneficiary.as_ref() != Some(initiator) {
            return Err(ContractError::Unauthorized);
        }
    }

    apply(
        env,
        token,
        &split_rate(
            subscription.rate,
            config.affiliate_portion_bps,
            subscription.credential,
        ),
        -1,
    );
    remove_subscription(env, subscriber);
    if let Some(id) = subscription.credential {
        registry::detach(env, id, subscriber);
    }

    let mut adjustments = settle(env, token, receivers(env, &config, beneficiary));
    if initiator.is_some() {
        adjustments.push_back(FlowAdjustment {
            token: token.clone(),
            sender: subscriber.clone(),
            receiver: env.current_contract_address(),
            previous_rate: subscription.rate,
            new_rate: 0,
        });
    }

    env.events().publish(
        (symbol_short!("ended"), subscriber.clone()),
        RedirectEvent::Ended(initiator.unwrap_or(subscriber).clone()),
    );
    Ok(adjustments)
}

/// Record that `receiver` deleted its incoming leg. The derived aggregates
/// are left alone; only the leg in effect drops to zero.
pub(crate) fn leg_closed(
    env: &Env,
    token: &Address,
    receiver: &Address,
) -> Result<(), ContractError> {
    let leg_key = DataKey::Leg(token.clone(), receiver.clone());
    let previous = read_rate(env, &leg_key);
    if previous == 0 {
        return Err(ContractError::NotActive);
    }

    write_rate(env, &leg_key, 0);
    let total_key = DataKey::LegTotal(token.clone());
    write_rate(env, &total_key, read_rate(env, &total_key) - previous);

    let drift_key = DataKey::Drifted(token.clone());
    let mut drifted: Vec<Address> = read_or(env, &drift_key, Vec::new(env));
    if !drifted.contains(receiver) {
        drifted.push_back(receiver.clone());
        write_list(env, &drift_key, &drifted);
    }

    env.events().publish(
        (symbol_short!("drifted"), token.clone()),
        RedirectEvent::Drifted(receiver.clone(), previous),
    );
    Ok(())
}

/// Bring the legs of `touched` receivers, plus any receiver queued by
/// `leg_closed`, in line with their derived rates.
pub(crate) fn settle(env: &Env, token: &Address, touched: Vec<Address>) -> Vec<FlowAdjustment> {
    let drift_key = DataKey::Drifted(token.clone());
    let mut pending: Vec<Address> = read_or(env, &drift_key, Vec::new(env));
    if !pending.is_empty() {
        env.storage().persistent().remove(&drift_key);
    }

    for receiver in touched.iter() {
        if !pending.contains(&receiver) {
            pending.push_back(receiver);
        }
    }

    let config = get_config(env);
    let mut adjustments = Vec::new(env);
    for receiver in pending.iter() {
        if let Some(adjustment) = sync_leg(env, &config, token, &receiver) {
            adjustments.push_back(adjustment);
        }
    }
    adjustments
}

pub(crate) fn is_balanced(env: &Env, token: &Address) -> bool {
    let total = read_rate(env, &DataKey::TotalInflow(token.clone()));
    let owner = read_rate(env, &DataKey::OwnerShare(token.clone()));
    let affiliates = read_rate(env, &DataKey::AffiliateTotal(token.clone()));
    let legs = read_rate(env, &DataKey::LegTotal(token.clone()));
    total == owner + affiliates && legs == total
}

fn active_subscription(
    env: &Env,
    token: &Address,
    subscriber: &Address,
) -> Result<Subscription, ContractError> {
    load_subscription(env, subscriber)
        .filter(|s| s.token == *token)
        .ok_or(ContractError::NotActive)
}

fn receivers(env: &Env, config: &Config, beneficiary: Option<Address>) -> Vec<Address> {
    let mut receivers = Vec::new(env);
    receivers.push_back(config.owner.clone());
    if let Some(beneficiary) = beneficiary {
        receivers.push_back(beneficiary);
    }
    receivers
}

/// Add (`sign == 1`) or remove (`sign == -1`) one subscriber's split.
fn apply(env: &Env, token: &Address, split: &Split, sign: i128) {
    let total_key = DataKey::TotalInflow(token.clone());
    write_rate(env, &total_key, read_rate(env, &total_key) + sign * split.total());

    let owner_key = DataKey::OwnerShare(token.clone());
    write_rate(env, &owner_key, read_rate(env, &owner_key) + sign * split.owner);

    if let Some(id) = split.credential {
        let share_key = DataKey::AffiliateShare(token.clone(), id);
        write_rate(env, &share_key, read_rate(env, &share_key) + sign * split.affiliate);

        let affiliates_key = DataKey::AffiliateTotal(token.clone());
        write_rate(
            env,
            &affiliates_key,
            read_rate(env, &affiliates_key) + sign * split.affiliate,
        );
    }
}

/// Rate `receiver` is owed in `token`: the shares of every credential it
/// holds, plus the owner share if it is the owner.
fn derived_rate(env: &Env, config: &Config, token: &Address, receiver: &Address) -> i128 {
    let mut rate = 0i128;
    for id in registry::holdings_of(env, receiver).iter() {
        rate += read_rate(env, &DataKey::AffiliateShare(token.clone(), id));
    }
    if *receiver == config.owner {
        rate += read_rate(env, &DataKey::OwnerShare(token.clone()));
    }
    rate
}

fn sync_leg(
    env: &Env,
    config: &Config,
    token: &Address,
    receiver: &Address,
) -> Option<FlowAdjustment> {
    let leg_key = DataKey::Leg(token.clone(), receiver.clone());
    let previous = read_rate(env, &leg_key);
    let target = derived_rate(env, config, token, receiver);
    if previous == target {
        return None;
    }

    write_rate(env, &leg_key, target);
    let total_key = DataKey::LegTotal(token.clone());
    write_rate(env, &total_key, read_rate(env, &total_key) - previous + target);

    let adjustment = FlowAdjustment {
        token: token.clone(),
        sender: env.current_contract_address(),
        receiver: receiver.clone(),
        previous_rate: previous,
        new_rate: target,
    };
    env.events().publish(
        (symbol_short!("leg"), token.clone()),
        RedirectEvent::Leg(adjustment.clone()),
    );
    Some(adjustment)
}
