//! Outgoing calls to the flow host.
//!
//! Host callbacks (`on_*`) cannot call back into the host, since Soroban
//! rejects re-entry, so they hand their adjustments back to the caller. Every
//! other entry point that moves a leg applies the adjustments here, after all
//! state has been written.

use soroban_sdk::{contractclient, Address, Env, Vec};

use crate::{get_config, FlowAdjustment};

/// Create/update/delete primitives of the continuous-payment protocol.
#[contractclient(name = "FlowHostClient")]
pub trait FlowHost {
    fn create_flow(env: Env, token: Address, sender: Address, receiver: Address, rate: i128);
    fn update_flow(env: Env, token: Address, sender: Address, receiver: Address, rate: i128);
    fn delete_flow(env: Env, token: Address, sender: Address, receiver: Address);
}

pub(crate) fn push(env: &Env, adjustments: &Vec<FlowAdjustment>) {
    if adjustments.is_empty() {
        return;
    }

    let host = FlowHostClient::new(env, &get_config(env).host);
    for adjustment in adjustments.iter() {
        let FlowAdjustment {
            token,
            sender,
            receiver,
            previous_rate,
            new_rate,
        } = adjustment;

        if previous_rate == 0 {
            host.create_flow(&token, &sender, &receiver, &new_rate);
        } else if new_rate == 0 {
            host.delete_flow(&token, &sender, &receiver);
        } else {
            host.update_flow(&token, &sender, &receiver, &new_rate);
        }
    }
}
