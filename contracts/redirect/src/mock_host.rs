//! In-memory flow host for tests.
//!
//! Keeps one rate per `(token, sender, receiver)` and rejects primitives that
//! do not match the legs it holds, the way the streaming protocol does.

use soroban_sdk::{contract, contractimpl, contracttype, Address, Env, Vec};

use crate::FlowAdjustment;

#[contracttype]
#[derive(Clone)]
pub enum HostKey {
    Flow(Address, Address, Address),
    Calls,
}

#[contract]
pub struct MockHost;

#[contractimpl]
impl MockHost {
    pub fn create_flow(env: Env, token: Address, sender: Address, receiver: Address, rate: i128) {
        let key = HostKey::Flow(token, sender, receiver);
        assert!(!env.storage().persistent().has(&key), "flow already exists");
        assert!(rate > 0, "flow rate must be positive");
        env.storage().persistent().set(&key, &rate);
        Self::count_call(&env);
    }

    pub fn update_flow(env: Env, token: Address, sender: Address, receiver: Address, rate: i128) {
        let key = HostKey::Flow(token, sender, receiver);
        assert!(env.storage().persistent().has(&key), "flow does not exist");
        assert!(rate > 0, "flow rate must be positive");
        env.storage().persistent().set(&key, &rate);
        Self::count_call(&env);
    }

    pub fn delete_flow(env: Env, token: Address, sender: Address, receiver: Address) {
        let key = HostKey::Flow(token, sender, receiver);
        assert!(env.storage().persistent().has(&key), "flow does not exist");
        env.storage().persistent().remove(&key);
        Self::count_call(&env);
    }

    pub fn flow_rate(env: Env, token: Address, sender: Address, receiver: Address) -> i128 {
        env.storage()
            .persistent()
            .get(&HostKey::Flow(token, sender, receiver))
            .unwrap_or(0)
    }

    pub fn calls(env: Env) -> u32 {
        env.storage().instance().get(&HostKey::Calls).unwrap_or(0)
    }
}

impl MockHost {
    fn count_call(env: &Env) {
        let calls: u32 = env.storage().instance().get(&HostKey::Calls).unwrap_or(0);
        env.storage().instance().set(&HostKey::Calls, &(calls + 1));
    }
}

/// Apply adjustments returned by a host callback, as the host would.
pub fn apply(host: &MockHostClient, adjustments: &Vec<FlowAdjustment>) {
    for adjustment in adjustments.iter() {
        if adjustment.previous_rate == 0 {
            host.create_flow(
                &adjustment.token,
                &adjustment.sender,
                &adjustment.receiver,
                &adjustment.new_rate,
            );
        } else if adjustment.new_rate == 0 {
            host.delete_flow(&adjustment.token, &adjustment.sender, &adjustment.receiver);
        } else {
            host.update_flow(
                &adjustment.token,
                &adjustment.sender,
                &adjustment.receiver,
                &adjustment.new_rate,
            );
        }
    }
}
