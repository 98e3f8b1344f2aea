//! Randomised event sequences against the contract and an in-memory host.
//!
//! After every host callback, share closure, transfer, reconcile or lock
//! toggle the per-token aggregates must still add up, the legs running on
//! the host must equal the agent's bookkeeping, and every token without a
//! pending receiver-side closure must have its legs summing to the inflow.

use proptest::prelude::*;
use soroban_sdk::{testutils::Address as _, Address, BytesN, Env, String, Vec};

use crate::{
    mock_host::{self, MockHost, MockHostClient},
    FluxoraRedirect, FluxoraRedirectClient, Metadata,
};

const USERS: usize = 5;
const CODES: usize = 3;
const TOKENS: usize = 2;
const CODE_NAMES: [&str; CODES] = ["c0", "c1", "c2"];

#[derive(Clone, Debug)]
enum Action {
    Open {
        who: usize,
        token: usize,
        rate: i128,
        code: Option<usize>,
    },
    Update {
        who: usize,
        token: usize,
        rate: i128,
    },
    Terminate {
        who: usize,
        token: usize,
    },
    CloseShare {
        who: usize,
        by_owner: bool,
    },
    Transfer {
        code: usize,
        to: usize,
    },
    CloseLeg {
        receiver: usize,
        token: usize,
    },
    Reconcile(usize),
    Lock(bool),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (0..USERS, 0..TOKENS, 1i128..1_000_000, proptest::option::of(0..CODES))
            .prop_map(|(who, token, rate, code)| Action::Open {
                who,
                token,
                rate,
                code,
            }),
        3 => (0..USERS, 0..TOKENS, 1i128..1_000_000)
            .prop_map(|(who, token, rate)| Action::Update { who, token, rate }),
        2 => (0..USERS, 0..TOKENS).prop_map(|(who, token)| Action::Terminate { who, token }),
        2 => (0..USERS, any::<bool>())
            .prop_map(|(who, by_owner)| Action::CloseShare { who, by_owner }),
        2 => (0..CODES, 0..USERS).prop_map(|(code, to)| Action::Transfer { code, to }),
        2 => (0..USERS + 1, 0..TOKENS)
            .prop_map(|(receiver, token)| Action::CloseLeg { receiver, token }),
        1 => (0..TOKENS).prop_map(Action::Reconcile),
        1 => any::<bool>().prop_map(Action::Lock),
    ]
}

/// Expected subscription of one user: (token index, rate, credential id).
type Expected = Option<(usize, i128, Option<u64>)>;

struct World<'a> {
    env: Env,
    agent: Address,
    client: FluxoraRedirectClient<'a>,
    host: MockHostClient<'a>,
    owner: Address,
    operator: Address,
    users: [Address; USERS],
    tokens: [Address; TOKENS],
}

impl<'a> World<'a> {
    fn new() -> Self {
        let env = Env::default();
        env.mock_all_auths();
        env.budget().reset_unlimited();

        let agent = env.register_contract(None, FluxoraRedirect);
        let client = FluxoraRedirectClient::new(&env, &agent);
        let host_id = env.register_contract(None, MockHost);
        let host = MockHostClient::new(&env, &host_id);

        let owner = Address::generate(&env);
        let operator = Address::generate(&env);
        let users = core::array::from_fn(|_| Address::generate(&env));
        let tokens = core::array::from_fn(|_| Address::generate(&env));

        client.init(
            &owner,
            &operator,
            &host_id,
            &2_500,
            &BytesN::from_array(&env, &[0u8; 32]),
            &Metadata {
                name: String::from_str(&env, "TradeableFlow"),
                symbol: String::from_str(&env, "TF"),
                base_uri: String::from_str(&env, ""),
            },
        );
        for token in tokens.iter() {
            client.add_accepted_token(&owner, token);
        }
        // Whitelist is off by default: users 0..CODES each mint one code.
        for (user, name) in users.iter().zip(CODE_NAMES) {
            client.mint(user, &String::from_str(&env, name), &Vec::new(&env));
        }

        World {
            env,
            agent,
            client,
            host,
            owner,
            operator,
            users,
            tokens,
        }
    }

    fn code(&self, index: usize) -> String {
        String::from_str(&self.env, CODE_NAMES[index])
    }

    fn receiver(&self, index: usize) -> &Address {
        self.users.get(index).unwrap_or(&self.owner)
    }

    fn check(&self, expected: &[Expected; USERS], drifted: &[bool; TOKENS]) {
        for (t, token) in self.tokens.iter().enumerate() {
            let mut affiliates = 0i128;
            for id in 1..=CODES as u64 {
                affiliates += self.client.affiliate_outflow(token, &id);
            }
            let total = self.client.total_inflow(token);
            assert_eq!(total, self.client.owner_outflow(token) + affiliates);

            let inflow: i128 = expected
                .iter()
                .filter_map(|e| e.filter(|(et, _, _)| *et == t).map(|(_, rate, _)| rate))
                .sum();
            assert_eq!(total, inflow);

            if drifted[t] {
                assert!(self.client.net_flow(token) < 0);
            } else {
                assert!(self.client.is_balanced(token));
                assert_eq!(self.client.net_flow(token), 0);
            }

            for receiver in self.users.iter().chain(core::iter::once(&self.owner)) {
                assert_eq!(
                    self.host.flow_rate(token, &self.agent, receiver),
                    self.client.outflow_to(token, receiver)
                );
            }
            for (user, e) in self.users.iter().zip(expected.iter()) {
                let rate = e.filter(|(et, _, _)| *et == t).map_or(0, |(_, rate, _)| rate);
                assert_eq!(self.host.flow_rate(token, user, &self.agent), rate);
            }
        }

        for (user, e) in self.users.iter().zip(expected.iter()) {
            let actual = self.client.subscription(user).map(|s| {
                let t = self.tokens.iter().position(|x| *x == s.token).unwrap();
                (t, s.rate, s.credential)
            });
            assert_eq!(actual, *e);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_host_legs_track_bookkeeping(actions in prop::collection::vec(action(), 1..24)) {
        let world = World::new();
        let client = &world.client;
        let host = &world.host;
        let mut expected: [Expected; USERS] = [None; USERS];
        let mut drifted = [false; TOKENS];
        let mut locked = false;

        for action in actions {
            match action {
                Action::Open { who, token, rate, code } => {
                    let tag = code
                        .map(|c| world.code(c))
                        .unwrap_or(String::from_str(&world.env, ""));
                    let (token_id, user) = (&world.tokens[token], &world.users[who]);
                    if let Ok(Ok(adjustments)) =
                        client.try_on_flow_created(token_id, user, &rate, &tag)
                    {
                        prop_assert!(!locked && expected[who].is_none());
                        host.create_flow(token_id, user, &world.agent, &rate);
                        mock_host::apply(host, &adjustments);
                        expected[who] = Some((token, rate, code.map(|c| c as u64 + 1)));
                        drifted[token] = false;
                    }
                }
                Action::Update { who, token, rate } => {
                    let (token_id, user) = (&world.tokens[token], &world.users[who]);
                    if let Ok(Ok(adjustments)) = client.try_on_flow_updated(token_id, user, &rate) {
                        let (t, old, credential) = expected[who].unwrap();
                        prop_assert_eq!(t, token);
                        prop_assert!(!locked || rate <= old);
                        host.update_flow(token_id, user, &world.agent, &rate);
                        mock_host::apply(host, &adjustments);
                        expected[who] = Some((t, rate, credential));
                        drifted[token] = false;
                    }
                }
                Action::Terminate { who, token } => {
                    let (token_id, user) = (&world.tokens[token], &world.users[who]);
                    if let Ok(Ok(adjustments)) = client.try_on_flow_terminated(token_id, user) {
                        host.delete_flow(token_id, user, &world.agent);
                        mock_host::apply(host, &adjustments);
                        expected[who] = None;
                        drifted[token] = false;
                    }
                }
                Action::CloseShare { who, by_owner } => {
                    let subscriber = &world.users[who];
                    let initiator = if by_owner {
                        world.owner.clone()
                    } else {
                        client
                            .affiliate_of_subscriber(subscriber)
                            .unwrap_or(subscriber.clone())
                    };
                    if let Some((token, _, _)) = expected[who] {
                        let token_id = &world.tokens[token];
                        let res = client.try_close_share(&initiator, token_id, subscriber);
                        if matches!(res, Ok(Ok(_))) {
                            expected[who] = None;
                            drifted[token] = false;
                        } else {
                            // Only the owner or the beneficiary may close a share.
                            prop_assert!(!by_owner && initiator == *subscriber);
                        }
                    }
                }
                Action::Transfer { code, to } => {
                    let id = code as u64 + 1;
                    let holder = client.beneficiary_of(&id);
                    let res = client.try_transfer(&holder, &world.users[to], &id);
                    prop_assert!(matches!(res, Ok(Ok(_))));
                    drifted = [false; TOKENS];
                }
                Action::CloseLeg { receiver, token } => {
                    let (token_id, receiver) = (&world.tokens[token], world.receiver(receiver));
                    if client.outflow_to(token_id, receiver) > 0 {
                        host.delete_flow(token_id, &world.agent, receiver);
                        client.on_leg_closed(token_id, receiver);
                        drifted[token] = true;
                    }
                }
                Action::Reconcile(token) => {
                    client.reconcile(&world.tokens[token]);
                    drifted[token] = false;
                }
                Action::Lock(value) => {
                    client.set_lock(&world.operator, &value);
                    locked = value;
                }
            }

            world.check(&expected, &drifted);
        }
    }
}
