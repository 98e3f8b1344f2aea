#![no_std]

#[cfg(test)]
extern crate std;

mod access;
mod accountant;
mod host;
mod merkle;
mod recovery;
mod registry;
mod split;

pub use host::{FlowHost, FlowHostClient};

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, Address, BytesN, Env,
    IntoVal, String, TryFromVal, Val, Vec,
};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Global configuration for the redirect agent.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Receives the residual share of every inflow and administers the agent.
    pub owner: Address,
    /// Lock switch and balance sweeps.
    pub operator: Address,
    /// Streaming protocol allowed to deliver flow lifecycle callbacks.
    pub host: Address,
    /// Share of an attributed inflow redirected to the affiliate, in basis points.
    pub affiliate_portion_bps: u32,
}

/// Collection metadata of the affiliate credentials.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Metadata {
    pub name: String,
    pub symbol: String,
    /// Prefix of every `token_uri`; the credential's code is appended to it.
    pub base_uri: String,
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WhitelistConfig {
    pub enabled: bool,
    pub mint_cap: u32,
}

/// Transferable affiliate credential (NFT). Never destroyed.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credential {
    pub id: u64,
    pub code: String,
    /// Current beneficiary of this credential's outflow share.
    pub owner: Address,
    pub minter: Address,
}

/// A subscriber's active inflow. Attribution is fixed when the inflow is created.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subscription {
    pub token: Address,
    pub rate: i128,
    pub credential: Option<u64>,
}

/// Instruction for the flow host: set the `sender -> receiver` leg in `token`
/// from `previous_rate` to `new_rate`. A zero `previous_rate` means create,
/// a zero `new_rate` means delete.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlowAdjustment {
    pub token: Address,
    pub sender: Address,
    pub receiver: Address,
    pub previous_rate: i128,
    pub new_rate: i128,
}

#[contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ContractError {
    TokenNotAccepted = 1,
    Locked = 2,
    DuplicateSubscription = 3,
    NotActive = 4,
    NotWhitelisted = 5,
    MintLimitExceeded = 6,
    CodeTaken = 7,
    AlreadyAccepted = 8,
    NotOwner = 9,
    Unauthorized = 10,
    InvalidRate = 11,
    TokenMismatch = 12,
    InvalidCode = 13,
    CredentialNotFound = 14,
    NotLocked = 15,
    InvalidAmount = 16,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RedirectEvent {
    Created(Subscription),
    Updated(i128, i128),
    Ended(Address),
    Leg(FlowAdjustment),
    Drifted(Address, i128),
}

/// Namespace for all contract storage keys.
#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Config,                         // Instance: owner/operator/host/portion.
    Metadata,                       // Instance: credential collection name/symbol/base URI.
    Locked,                         // Instance: lock flag.
    AcceptedTokens,                 // Instance: append-only token allow-list.
    Whitelist,                      // Instance: WhitelistConfig.
    MerkleRoot,                     // Instance: whitelist root.
    NextCredentialId,               // Instance: credential id counter (first id is 1).
    Credential(u64),                // Persistent: credential record.
    Code(String),                   // Persistent: code -> credential id.
    MintCount(Address),             // Persistent: credentials minted by an address.
    Holdings(Address),              // Persistent: credential ids held by an address.
    AttributedCount(u64),           // Persistent: number of subscribers attributed to a credential.
    AttributedAt(u64, u32),         // Persistent: (credential, slot) -> subscriber.
    AttributedSlot(u64, Address),   // Persistent: (credential, subscriber) -> slot.
    Subscription(Address),          // Persistent: subscriber -> active inflow.
    TotalInflow(Address),           // Persistent: token -> sum of subscriber rates.
    OwnerShare(Address),            // Persistent: token -> owner aggregate.
    AffiliateShare(Address, u64),   // Persistent: (token, credential) -> affiliate aggregate.
    AffiliateTotal(Address),        // Persistent: token -> sum of affiliate aggregates.
    Leg(Address, Address),          // Persistent: (token, receiver) -> outgoing rate in effect.
    LegTotal(Address),              // Persistent: token -> sum of outgoing legs.
    Drifted(Address),               // Persistent: token -> receivers awaiting reconciliation.
}

// ---------------------------------------------------------------------------
// Storage helpers
// ---------------------------------------------------------------------------

pub(crate) const LEDGER_THRESHOLD: u32 = 17280;
pub(crate) const LEDGER_BUMP: u32 = 120960;

pub(crate) fn get_config(env: &Env) -> Config {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .expect("contract not initialised: missing config")
}

pub(crate) fn set_config(env: &Env, config: &Config) {
    env.storage().instance().set(&DataKey::Config, config);
    env.storage()
        .instance()
        .extend_ttl(LEDGER_THRESHOLD, LEDGER_BUMP);
}

pub(crate) fn get_metadata(env: &Env) -> Metadata {
    env.storage()
        .instance()
        .get(&DataKey::Metadata)
        .expect("contract not initialised: missing metadata")
}

pub(crate) fn is_locked(env: &Env) -> bool {
    env.storage()
        .instance()
        .get(&DataKey::Locked)
        .unwrap_or(false)
}

pub(crate) fn set_locked(env: &Env, locked: bool) {
    env.storage().instance().set(&DataKey::Locked, &locked);
}

pub(crate) fn get_accepted_tokens(env: &Env) -> Vec<Address> {
    env.storage()
        .instance()
        .get(&DataKey::AcceptedTokens)
        .unwrap_or_else(|| Vec::new(env))
}

pub(crate) fn set_accepted_tokens(env: &Env, tokens: &Vec<Address>) {
    env.storage().instance().set(&DataKey::AcceptedTokens, tokens);
}

pub(crate) fn get_whitelist(env: &Env) -> WhitelistConfig {
    env.storage()
        .instance()
        .get(&DataKey::Whitelist)
        .unwrap_or(WhitelistConfig {
            enabled: false,
            mint_cap: 1,
        })
}

pub(crate) fn set_whitelist(env: &Env, whitelist: &WhitelistConfig) {
    env.storage().instance().set(&DataKey::Whitelist, whitelist);
}

pub(crate) fn get_merkle_root(env: &Env) -> BytesN<32> {
    env.storage()
        .instance()
        .get(&DataKey::MerkleRoot)
        .expect("contract not initialised: missing merkle root")
}

pub(crate) fn set_merkle_root(env: &Env, root: &BytesN<32>) {
    env.storage().instance().set(&DataKey::MerkleRoot, root);
}

pub(crate) fn next_credential_id(env: &Env) -> u64 {
    env.storage()
        .instance()
        .get(&DataKey::NextCredentialId)
        .unwrap_or(1u64)
}

pub(crate) fn set_next_credential_id(env: &Env, id: u64) {
    env.storage().instance().set(&DataKey::NextCredentialId, &id);
}

pub(crate) fn load_credential(env: &Env, id: u64) -> Result<Credential, ContractError> {
    env.storage()
        .persistent()
        .get(&DataKey::Credential(id))
        .ok_or(ContractError::CredentialNotFound)
}

pub(crate) fn save_credential(env: &Env, credential: &Credential) {
    let key = DataKey::Credential(credential.id);
    env.storage().persistent().set(&key, credential);
    env.storage()
        .persistent()
        .extend_ttl(&key, LEDGER_THRESHOLD, LEDGER_BUMP);
}

pub(crate) fn load_subscription(env: &Env, subscriber: &Address) -> Option<Subscription> {
    env.storage()
        .persistent()
        .get(&DataKey::Subscription(subscriber.clone()))
}

pub(crate) fn save_subscription(env: &Env, subscriber: &Address, subscription: &Subscription) {
    let key = DataKey::Subscription(subscriber.clone());
    env.storage().persistent().set(&key, subscription);
    env.storage()
        .persistent()
        .extend_ttl(&key, LEDGER_THRESHOLD, LEDGER_BUMP);
}

pub(crate) fn remove_subscription(env: &Env, subscriber: &Address) {
    env.storage()
        .persistent()
        .remove(&DataKey::Subscription(subscriber.clone()));
}

/// Read a persistent value, falling back to `default` when the key is absent.
pub(crate) fn read_or<T>(env: &Env, key: &DataKey, default: T) -> T
where
    T: TryFromVal<Env, Val>,
{
    env.storage().persistent().get(key).unwrap_or(default)
}

/// Write a list under `key`, dropping the entry entirely once it is empty.
pub(crate) fn write_list<T>(env: &Env, key: &DataKey, list: &Vec<T>)
where
    Vec<T>: IntoVal<Env, Val>,
{
    if list.is_empty() {
        if env.storage().persistent().has(key) {
            env.storage().persistent().remove(key);
        }
    } else {
        env.storage().persistent().set(key, list);
        env.storage()
            .persistent()
            .extend_ttl(key, LEDGER_THRESHOLD, LEDGER_BUMP);
    }
}

pub(crate) fn read_rate(env: &Env, key: &DataKey) -> i128 {
    read_or(env, key, 0i128)
}

/// Write a rate under `key`, dropping the entry entirely once it reaches zero.
pub(crate) fn write_rate(env: &Env, key: &DataKey, rate: i128) {
    if rate == 0 {
        if env.storage().persistent().has(key) {
            env.storage().persistent().remove(key);
        }
    } else {
        env.storage().persistent().set(key, &rate);
        env.storage()
            .persistent()
            .extend_ttl(key, LEDGER_THRESHOLD, LEDGER_BUMP);
    }
}

// ---------------------------------------------------------------------------
// Contract Implementation
// ---------------------------------------------------------------------------

#[contract]
pub struct FluxoraRedirect;

#[contractimpl]
impl FluxoraRedirect {
    /// Initialise the agent with its roles, the affiliate portion and the
    /// whitelist Merkle root.
    ///
    /// Must be called exactly once before any other operation.
    ///
    /// # Parameters
    /// - `owner`: receives the residual share of every inflow; administers tokens and the whitelist
    /// - `operator`: may lock/unlock the agent and sweep stranded balances while locked
    /// - `host`: streaming protocol address that authorizes every `on_*` callback
    /// - `affiliate_portion_bps`: affiliate share of an attributed inflow (e.g. 2000 = 20%)
    /// - `merkle_root`: root of the whitelist tree used by `mint` when the whitelist is enabled
    /// - `metadata`: name, symbol and base URI of the credential collection
    ///
    /// # Panics
    /// - If called more than once
    /// - If `affiliate_portion_bps` exceeds 10 000
    /// - If `metadata.base_uri` is longer than 192 bytes
    pub fn init(
        env: Env,
        owner: Address,
        operator: Address,
        host: Address,
        affiliate_portion_bps: u32,
        merkle_root: BytesN<32>,
        metadata: Metadata,
    ) {
        if env.storage().instance().has(&DataKey::Config) {
            panic!("already initialised");
        }
        assert!(
            affiliate_portion_bps <= split::BPS_DENOMINATOR,
            "affiliate portion exceeds 10000 bps"
        );
        assert!(
            metadata.base_uri.len() <= registry::MAX_BASE_URI_LEN,
            "base uri too long"
        );

        set_config(
            &env,
            &Config {
                owner,
                operator,
                host,
                affiliate_portion_bps,
            },
        );
        env.storage().instance().set(&DataKey::Metadata, &metadata);
        set_merkle_root(&env, &merkle_root);
        set_next_credential_id(&env, 1);
        set_locked(&env, false);
    }

    // -- Flow lifecycle callbacks ------------------------------------------

    /// A subscriber opened an inflow to the agent.
    ///
    /// Resolves `tag` to an affiliate credential (empty or unknown tags leave
    /// the subscriber unattributed), records the subscription with that
    /// attribution for its whole lifetime and re-balances the owner and
    /// affiliate legs.
    ///
    /// # Authorization
    /// - Requires authorization from the configured host
    ///
    /// # Errors
    /// - `TokenNotAccepted` if `token` is not on the allow-list
    /// - `Locked` while the agent is locked
    /// - `InvalidRate` if `rate <= 0`
    /// - `DuplicateSubscription` if the subscriber already streams this token
    /// - `TokenMismatch` if the subscriber already streams another token
    ///
    /// # Returns
    /// The outgoing leg adjustments the host must apply in the same call.
    pub fn on_flow_created(
        env: Env,
        token: Address,
        subscriber: Address,
        rate: i128,
        tag: String,
    ) -> Result<Vec<FlowAdjustment>, ContractError> {
        get_config(&env).host.require_auth();
        accountant::create(&env, &token, &subscriber, rate, &tag)
    }

    /// A subscriber changed the rate of its inflow.
    ///
    /// The attribution captured at creation is reused; the owner and affiliate
    /// aggregates move by the difference between the old and new split.
    /// While locked, only decreases are accepted.
    ///
    /// # Errors
    /// - `NotActive` if the subscriber has no inflow in `token`
    /// - `InvalidRate` if `new_rate <= 0` (closing goes through termination)
    /// - `Locked` if locked and `new_rate` is above the current rate
    pub fn on_flow_updated(
        env: Env,
        token: Address,
        subscriber: Address,
        new_rate: i128,
    ) -> Result<Vec<FlowAdjustment>, ContractError> {
        get_config(&env).host.require_auth();
        accountant::update(&env, &token, &subscriber, new_rate)
    }

    /// A subscriber closed its inflow. Never blocked by the lock.
    ///
    /// # Errors
    /// - `NotActive` if the subscriber has no inflow in `token`
    pub fn on_flow_terminated(
        env: Env,
        token: Address,
        subscriber: Address,
    ) -> Result<Vec<FlowAdjustment>, ContractError> {
        get_config(&env).host.require_auth();
        accountant::terminate(&env, &token, &subscriber, None)
    }

    /// The receiver of one of the agent's outgoing legs deleted it directly.
    ///
    /// The leg is recorded at zero and the receiver is queued for
    /// reconciliation, which happens on the next event touching `token` or
    /// through [`FluxoraRedirect::reconcile`]. Until then `is_balanced(token)`
    /// reports the gap.
    ///
    /// # Errors
    /// - `NotActive` if the agent runs no leg to `receiver` in `token`
    pub fn on_leg_closed(
        env: Env,
        token: Address,
        receiver: Address,
    ) -> Result<(), ContractError> {
        get_config(&env).host.require_auth();
        accountant::leg_closed(&env, &token, &receiver)
    }

    /// Close a subscriber's share from the receiving side.
    ///
    /// `initiator` is the owner or the current beneficiary of the credential
    /// the subscriber is attributed to. The subscriber's contribution is
    /// removed from every aggregate and its attribution is cleared. The
    /// agent then deletes the subscriber's inbound leg and re-balances its
    /// outgoing legs on the host. Never blocked by the lock.
    ///
    /// # Errors
    /// - `NotActive` if the subscriber has no inflow in `token`
    /// - `Unauthorized` if `initiator` receives no part of this subscriber's inflow
    ///
    /// # Returns
    /// The adjustments applied on the host.
    pub fn close_share(
        env: Env,
        initiator: Address,
        token: Address,
        subscriber: Address,
    ) -> Result<Vec<FlowAdjustment>, ContractError> {
        initiator.require_auth();
        let adjustments =
            accountant::terminate(&env, &token, &subscriber, Some(&initiator))?;
        host::push(&env, &adjustments);
        Ok(adjustments)
    }

    /// Re-open every leg of `token` that a receiver closed, at its derived
    /// rate, by calling the host. Anyone may call this; the host itself
    /// picks drifted legs up on its next callback instead.
    pub fn reconcile(env: Env, token: Address) -> Vec<FlowAdjustment> {
        let adjustments = accountant::settle(&env, &token, Vec::new(&env));
        host::push(&env, &adjustments);
        adjustments
    }

    // -- Affiliate credentials ---------------------------------------------

    /// Mint an affiliate credential bound to `code`.
    ///
    /// # Errors
    /// - `InvalidCode` if `code` is empty or longer than 64 bytes
    /// - `NotWhitelisted` if the whitelist is enabled and `proof` does not place
    ///   `minter` in the tree
    /// - `MintLimitExceeded` if the whitelist is enabled and `minter` reached the mint cap
    /// - `CodeTaken` if `code` was already claimed
    ///
    /// # Returns
    /// The new credential id (ids start at 1).
    pub fn mint(
        env: Env,
        minter: Address,
        code: String,
        proof: Vec<BytesN<32>>,
    ) -> Result<u64, ContractError> {
        minter.require_auth();
        registry::mint(&env, &minter, code, &proof)
    }

    /// Transfer a credential. Subscriptions attributed to it keep their
    /// attribution; their affiliate share follows the new holder, and the legs
    /// of `from` and `to` are re-balanced on the host in every accepted token.
    ///
    /// # Errors
    /// - `CredentialNotFound` for an unknown id
    /// - `NotOwner` if `from` does not hold the credential
    pub fn transfer(
        env: Env,
        from: Address,
        to: Address,
        credential_id: u64,
    ) -> Result<Vec<FlowAdjustment>, ContractError> {
        from.require_auth();
        registry::reassign(&env, &from, &to, credential_id)?;

        let mut touched = Vec::new(&env);
        touched.push_back(from);
        touched.push_back(to);

        let mut adjustments = Vec::new(&env);
        for token in get_accepted_tokens(&env).iter() {
            adjustments.append(&accountant::settle(&env, &token, touched.clone()));
        }
        host::push(&env, &adjustments);
        Ok(adjustments)
    }

    pub fn name(env: Env) -> String {
        get_metadata(&env).name
    }

    pub fn symbol(env: Env) -> String {
        get_metadata(&env).symbol
    }

    /// Base URI followed by the credential's code.
    pub fn token_uri(env: Env, credential_id: u64) -> Result<String, ContractError> {
        registry::token_uri(&env, credential_id)
    }

    pub fn resolve_code(env: Env, code: String) -> Option<u64> {
        registry::resolve_code(&env, &code)
    }

    pub fn beneficiary_of(env: Env, credential_id: u64) -> Result<Address, ContractError> {
        registry::beneficiary_of(&env, credential_id)
    }

    pub fn credential(env: Env, credential_id: u64) -> Result<Credential, ContractError> {
        load_credential(&env, credential_id)
    }

    /// Number of credentials currently held by `owner`.
    pub fn balance_of(env: Env, owner: Address) -> u32 {
        registry::holdings_of(&env, &owner).len()
    }

    pub fn holdings_of(env: Env, owner: Address) -> Vec<u64> {
        registry::holdings_of(&env, &owner)
    }

    pub fn mint_count_of(env: Env, account: Address) -> u32 {
        registry::mint_count_of(&env, &account)
    }

    /// Subscribers whose active inflow is attributed to `credential_id`.
    pub fn subscribers_of(env: Env, credential_id: u64) -> Vec<Address> {
        registry::subscribers_of(&env, credential_id)
    }

    pub fn subscriber_count(env: Env, credential_id: u64) -> u32 {
        registry::subscriber_count(&env, credential_id)
    }

    /// Codes for a batch of credential ids, in input order. Unknown ids map
    /// to an empty string instead of failing the batch.
    pub fn codes_of(env: Env, credential_ids: Vec<u64>) -> Vec<String> {
        registry::codes_of(&env, &credential_ids)
    }

    pub fn credential_of_subscriber(env: Env, subscriber: Address) -> Option<u64> {
        load_subscription(&env, &subscriber).and_then(|s| s.credential)
    }

    /// Current beneficiary of the subscriber's attributed share, if any.
    pub fn affiliate_of_subscriber(env: Env, subscriber: Address) -> Option<Address> {
        load_subscription(&env, &subscriber)
            .and_then(|s| s.credential)
            .and_then(|id| load_credential(&env, id).ok())
            .map(|c| c.owner)
    }

    // -- Views ---------------------------------------------------------------

    pub fn get_config(env: Env) -> Config {
        get_config(&env)
    }

    pub fn subscription(env: Env, subscriber: Address) -> Option<Subscription> {
        load_subscription(&env, &subscriber)
    }

    pub fn is_accepted_token(env: Env, token: Address) -> bool {
        access::is_accepted_token(&env, &token)
    }

    pub fn accepted_tokens(env: Env) -> Vec<Address> {
        get_accepted_tokens(&env)
    }

    pub fn is_locked(env: Env) -> bool {
        is_locked(&env)
    }

    pub fn whitelist(env: Env) -> WhitelistConfig {
        get_whitelist(&env)
    }

    /// Whether `account` may mint right now with `proof`.
    pub fn verify_eligible(env: Env, account: Address, proof: Vec<BytesN<32>>) -> bool {
        access::verify_eligible(&env, &account, &proof)
    }

    pub fn total_inflow(env: Env, token: Address) -> i128 {
        read_rate(&env, &DataKey::TotalInflow(token))
    }

    /// Owner aggregate derived from subscriptions (not the leg in effect).
    pub fn owner_outflow(env: Env, token: Address) -> i128 {
        read_rate(&env, &DataKey::OwnerShare(token))
    }

    /// Affiliate aggregate of one credential derived from subscriptions.
    pub fn affiliate_outflow(env: Env, token: Address, credential_id: u64) -> i128 {
        read_rate(&env, &DataKey::AffiliateShare(token, credential_id))
    }

    /// Outgoing leg rate currently in effect towards `receiver`.
    pub fn outflow_to(env: Env, token: Address, receiver: Address) -> i128 {
        read_rate(&env, &DataKey::Leg(token, receiver))
    }

    /// Outgoing minus incoming rate of the agent; zero when fully balanced,
    /// negative while a closed leg awaits reconciliation.
    pub fn net_flow(env: Env, token: Address) -> i128 {
        read_rate(&env, &DataKey::LegTotal(token.clone()))
            - read_rate(&env, &DataKey::TotalInflow(token))
    }

    /// Conservation check: inflow equals owner plus affiliate aggregates, and
    /// the legs in effect sum to the inflow.
    pub fn is_balanced(env: Env, token: Address) -> bool {
        accountant::is_balanced(&env, &token)
    }
}

#[contractimpl]
impl FluxoraRedirect {
    /// Add a token to the allow-list. Tokens are never removed.
    ///
    /// # Errors
    /// - `Unauthorized` if `caller` is not the owner
    /// - `AlreadyAccepted` if the token is already listed
    pub fn add_accepted_token(
        env: Env,
        caller: Address,
        token: Address,
    ) -> Result<(), ContractError> {
        access::require_owner(&env, &caller)?;
        access::add_accepted_token(&env, &token)
    }

    /// Lock or unlock the agent. Idempotent.
    ///
    /// A locked agent rejects new inflows and rate increases; terminations,
    /// share closures and decreases still go through.
    ///
    /// # Errors
    /// - `Unauthorized` if `caller` is not the operator
    pub fn set_lock(env: Env, caller: Address, locked: bool) -> Result<(), ContractError> {
        access::require_operator(&env, &caller)?;
        set_locked(&env, locked);
        env.events().publish((symbol_short!("locked"),), locked);
        Ok(())
    }

    /// Enable or disable whitelist-gated minting and set the per-address cap.
    /// The cap only applies while the whitelist is enabled.
    pub fn set_whitelist(
        env: Env,
        caller: Address,
        enabled: bool,
        mint_cap: u32,
    ) -> Result<(), ContractError> {
        access::require_owner(&env, &caller)?;
        set_whitelist(&env, &WhitelistConfig { enabled, mint_cap });
        env.events()
            .publish((symbol_short!("whitelst"),), (enabled, mint_cap));
        Ok(())
    }

    pub fn set_merkle_root(
        env: Env,
        caller: Address,
        root: BytesN<32>,
    ) -> Result<(), ContractError> {
        access::require_owner(&env, &caller)?;
        set_merkle_root(&env, &root);
        env.events().publish((symbol_short!("root"),), root);
        Ok(())
    }

    /// Hand ownership to `new_owner`.
    ///
    /// The owner share of every accepted token moves to the new owner at
    /// once: the old owner's legs close or shrink and the new owner's open or
    /// grow on the host. The applied adjustments are returned.
    ///
    /// # Errors
    /// - `Unauthorized` if `caller` is not the current owner
    pub fn set_owner(
        env: Env,
        caller: Address,
        new_owner: Address,
    ) -> Result<Vec<FlowAdjustment>, ContractError> {
        let mut config = access::require_owner(&env, &caller)?;
        let old_owner = config.owner.clone();
        config.owner = new_owner.clone();
        set_config(&env, &config);

        let mut touched = Vec::new(&env);
        touched.push_back(old_owner.clone());
        touched.push_back(new_owner.clone());

        let mut adjustments = Vec::new(&env);
        for token in get_accepted_tokens(&env).iter() {
            adjustments.append(&accountant::settle(&env, &token, touched.clone()));
        }
        host::push(&env, &adjustments);

        env.events().publish(
            (symbol_short!("owner"), symbol_short!("updated")),
            (old_owner, new_owner),
        );
        Ok(adjustments)
    }

    /// Rotate the operator key. Owner only.
    pub fn set_operator(
        env: Env,
        caller: Address,
        new_operator: Address,
    ) -> Result<(), ContractError> {
        let mut config = access::require_owner(&env, &caller)?;
        let old_operator = config.operator.clone();
        config.operator = new_operator.clone();
        set_config(&env, &config);

        env.events().publish(
            (symbol_short!("operator"), symbol_short!("updated")),
            (old_operator, new_operator),
        );
        Ok(())
    }

    /// Drain the agent's balance of `token` above `min_retained` to the operator.
    ///
    /// Last-resort recovery of balance stranded by upstream rounding or stuck
    /// deposits. Subscription and aggregate bookkeeping is left untouched.
    ///
    /// # Errors
    /// - `Unauthorized` if `caller` is not the operator
    /// - `NotLocked` unless the agent is locked
    /// - `InvalidAmount` if `min_retained` is negative
    ///
    /// # Returns
    /// The amount transferred (0 when the balance does not exceed `min_retained`).
    pub fn sweep(
        env: Env,
        caller: Address,
        token: Address,
        min_retained: i128,
    ) -> Result<i128, ContractError> {
        recovery::sweep(&env, &caller, &token, min_retained)
    }
}

#[cfg(test)]
mod mock_host;


#[cfg(test)]
mod property_test;
