#![no_std]

//! # Magic Tree Game
//!
//! A garden game where each player grows a single magic tree: fertilize it on
//! a cooldown, collect fruit, and harvest fruit into a point balance that is
//! kept **encrypted** on-chain. Points are redeemed for the reward token
//! through a two-step asynchronous flow: the player registers a redemption
//! intent with an encrypted amount, then triggers a decryption request; a
//! decryption oracle later calls back with the cleartext values and a proof,
//! and only then is the redemption settled.
//!
//! **Encryption Gateway Integration:**
//! All ciphertext arithmetic and decryption is delegated to a gateway
//! contract. The tree contract only ever holds opaque ciphertext handles;
//! it never observes plaintext balances outside the oracle callback.

use soroban_sdk::{
    contract, contractclient, contracterror, contractimpl, contracttype,
    token, vec, Address, Bytes, BytesN, Env, Symbol, Vec,
};

// ============================================================================
// Ciphertext Gateway Client Interface (Required)
// ============================================================================

#[contractclient(name = "CipherGatewayClient")]
pub trait CipherGateway {
    /// Validate an externally encrypted input against its proof.
    ///
    /// The proof binds the ciphertext to the consuming contract and the
    /// submitting user; replay under a different binding fails inside the
    /// gateway. Returns the internal handle for the attested value.
    fn attest_input(
        env: Env,
        handle: BytesN<32>,
        proof: Bytes,
        binding: Address,
        user: Address,
    ) -> BytesN<32>;

    /// Handle for an encryption of zero.
    fn zero(env: Env) -> BytesN<32>;

    /// Homomorphically add a plaintext value; returns a fresh handle.
    fn add_plain(env: Env, handle: BytesN<32>, value: u32) -> BytesN<32>;

    /// Homomorphic subtraction clamped at zero. The result never goes
    /// negative and the comparison outcome is never revealed.
    fn sub_to_floor(env: Env, minuend: BytesN<32>, subtrahend: BytesN<32>) -> BytesN<32>;

    /// Queue an asynchronous decryption of the given handles. The oracle
    /// delivers cleartexts and a proof to the caller out-of-band.
    fn request_reveal(env: Env, handles: Vec<BytesN<32>>) -> u64;

    /// Verify delivered cleartexts against the decryption proof.
    fn verify_reveal(env: Env, request_id: u64, cleartexts: Bytes, proof: Bytes) -> bool;
}

// ============================================================================
// Reward Token Client Interface
// ============================================================================

#[contractclient(name = "RewardTokenClient")]
pub trait RewardToken {
    fn mint(env: Env, to: Address, amount: i128);
}

// ============================================================================
// Data Structures
// ============================================================================

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tree {
    pub fertilize_count: u32,
    pub daily_fertilize_count: u32,
    pub last_action_time: u64,
    pub fruit_count: u32,
    pub encrypted_points: BytesN<32>,
}

/// View shape for a player's tree, with derived cooldown/cap fields.
/// Returned with `exists = false` and zeroed fields for unknown players.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreeInfo {
    pub exists: bool,
    pub fertilize_count: u32,
    pub daily_fertilize_count: u32,
    pub daily_fertilize_remaining: u32,
    pub last_action_time: u64,
    pub fruit_count: u32,
    pub encrypted_points: BytesN<32>,
    pub cooldown_remaining: u64,
}

/// One redemption attempt.
///
/// `decryption_request_id` stays 0 until the decryption is dispatched and is
/// then fixed forever; re-dispatch attempts are absorbed without a second
/// oracle request. `revealed_spend`/`revealed_total` are only meaningful once
/// `is_resolved` is true.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RedeemRequest {
    pub requester: Address,
    pub claimed_amount: u32,
    pub amount_commitment: BytesN<32>,
    pub is_resolved: bool,
    pub revealed_spend: u32,
    pub revealed_total: u32,
    pub decryption_request_id: u64,
    pub created_at: u64,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    GatewayAddress,
    RewardTokenAddress,
    PaymentTokenAddress,
    TotalPlayers,
    RedeemCount,
    TokensMinted,
    Tree(Address),
    Redeem(u64),
    LatestRedeem(Address),
    OracleRequest(u64),
}

// ============================================================================
// Error Codes
// ============================================================================

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Error {
    NotInitialized = 1,
    TreeAlreadyExists = 2,
    TreeNotFound = 3,
    WrongPayment = 4,
    CooldownActive = 5,
    DailyLimitReached = 6,
    NoFruits = 7,
    ZeroAmount = 8,
    RequestNotFound = 9,
    NotRequester = 10,
    AlreadyResolved = 11,
    UnknownOracleRequest = 12,
    InvalidDecryptionProof = 13,
    InvalidCleartexts = 14,
    LeaderboardUnavailable = 15,
}

// ============================================================================
// Constants
// ============================================================================

const MINT_PRICE: i128 = 10_000_000; // 1.0 of the 7-decimal payment token
const COOLDOWN_TIME: u64 = 30; // seconds between fertilizations
const FERTILIZE_FOR_FRUIT: u32 = 5;
const MAX_DAILY_FERTILIZE: u32 = 30;
const DAY_IN_SECONDS: u64 = 86_400;

const HARVEST_MIN_POINTS: u64 = 100;
const HARVEST_MAX_POINTS: u64 = 500;

// Points-per-token rate grows by RATE_TIER_STEP for every RATE_TIER_SIZE
// players, throttling emission as the player base grows.
const BASE_RATE: u64 = 1;
const RATE_TIER_SIZE: u64 = 500;
const RATE_TIER_STEP: u64 = 2;

const TOKEN_UNIT: i128 = 10_000_000; // 7 decimals
const TOTAL_TOKEN_SUPPLY: i128 = 100_000_000 * TOKEN_UNIT;

// Two big-endian u32s: (spend, total-before-spend).
const CLEARTEXTS_LEN: u32 = 8;

const RECORD_TTL_LEDGERS: u32 = 518_400; // 30 days

// ============================================================================
// Contract Definition
// ============================================================================

#[contract]
pub struct MagicTree;

#[contractimpl]
impl MagicTree {
    /// Initialize the contract.
    ///
    /// # Arguments
    /// * `admin` - Admin address (can upgrade, withdraw, and reconfigure)
    /// * `gateway` - Address of the ciphertext gateway contract
    /// * `reward_token` - Address of the reward token contract (mint sink)
    /// * `payment_token` - Token the mint fee is collected in
    pub fn __constructor(
        env: Env,
        admin: Address,
        gateway: Address,
        reward_token: Address,
        payment_token: Address,
    ) {
        let storage = env.storage().instance();
        storage.set(&DataKey::Admin, &admin);
        storage.set(&DataKey::GatewayAddress, &gateway);
        storage.set(&DataKey::RewardTokenAddress, &reward_token);
        storage.set(&DataKey::PaymentTokenAddress, &payment_token);
        storage.set(&DataKey::TotalPlayers, &0u64);
        storage.set(&DataKey::RedeemCount, &0u64);
        storage.set(&DataKey::TokensMinted, &0i128);
    }

    // ========================================================================
    // Game Progression
    // ========================================================================

    /// Mint the caller's tree. One tree per address, exact payment required.
    ///
    /// # Arguments
    /// * `player` - The minting player (must authorize)
    /// * `payment` - Offered fee; must equal the mint price exactly
    pub fn mint_tree(env: Env, player: Address, payment: i128) -> Result<(), Error> {
        player.require_auth();

        let key = DataKey::Tree(player.clone());
        if env.storage().persistent().has(&key) {
            return Err(Error::TreeAlreadyExists);
        }
        if payment != MINT_PRICE {
            return Err(Error::WrongPayment);
        }

        let payment_token: Address = env
            .storage()
            .instance()
            .get(&DataKey::PaymentTokenAddress)
            .ok_or(Error::NotInitialized)?;
        token::Client::new(&env, &payment_token).transfer(
            &player,
            &env.current_contract_address(),
            &MINT_PRICE,
        );

        let gateway = Self::gateway(&env)?;
        let tree = Tree {
            fertilize_count: 0,
            daily_fertilize_count: 0,
            last_action_time: 0,
            fruit_count: 0,
            encrypted_points: gateway.zero(),
        };
        env.storage().persistent().set(&key, &tree);
        env.storage()
            .persistent()
            .extend_ttl(&key, RECORD_TTL_LEDGERS, RECORD_TTL_LEDGERS);

        let total: u64 = env
            .storage()
            .instance()
            .get(&DataKey::TotalPlayers)
            .unwrap_or(0);
        env.storage()
            .instance()
            .set(&DataKey::TotalPlayers, &(total + 1));

        env.events().publish(
            (Symbol::new(&env, "tree"), Symbol::new(&env, "minted")),
            (player, env.ledger().timestamp()),
        );
        Ok(())
    }

    /// Fertilize the caller's tree.
    ///
    /// Enforces the per-action cooldown and the daily cap. The daily counter
    /// rolls over once 24 hours have elapsed since the last fertilization.
    /// Every 5th fertilization grows one fruit.
    pub fn fertilize(env: Env, player: Address) -> Result<(), Error> {
        player.require_auth();

        let key = DataKey::Tree(player.clone());
        let mut tree: Tree = env
            .storage()
            .persistent()
            .get(&key)
            .ok_or(Error::TreeNotFound)?;

        let now = env.ledger().timestamp();
        let elapsed = now.saturating_sub(tree.last_action_time);
        if elapsed < COOLDOWN_TIME {
            return Err(Error::CooldownActive);
        }
        if elapsed >= DAY_IN_SECONDS {
            tree.daily_fertilize_count = 0;
        }
        if tree.daily_fertilize_count >= MAX_DAILY_FERTILIZE {
            return Err(Error::DailyLimitReached);
        }

        tree.fertilize_count += 1;
        tree.daily_fertilize_count += 1;
        tree.last_action_time = now;
        if tree.fertilize_count % FERTILIZE_FOR_FRUIT == 0 {
            tree.fruit_count += 1;
        }

        env.storage().persistent().set(&key, &tree);
        env.storage()
            .persistent()
            .extend_ttl(&key, RECORD_TTL_LEDGERS, RECORD_TTL_LEDGERS);

        env.events().publish(
            (Symbol::new(&env, "tree"), Symbol::new(&env, "fertilized")),
            (player, tree.fertilize_count, now),
        );
        Ok(())
    }

    /// Harvest one fruit into the encrypted point balance.
    ///
    /// The point value is sampled uniformly from [100, 500] and credited
    /// homomorphically; the resulting balance stays opaque. The emitted
    /// events carry no plaintext point value.
    pub fn harvest_fruit(env: Env, player: Address) -> Result<(), Error> {
        player.require_auth();

        let key = DataKey::Tree(player.clone());
        let mut tree: Tree = env
            .storage()
            .persistent()
            .get(&key)
            .ok_or(Error::TreeNotFound)?;
        if tree.fruit_count == 0 {
            return Err(Error::NoFruits);
        }

        tree.fruit_count -= 1;

        let points = env
            .prng()
            .gen_range::<u64>(HARVEST_MIN_POINTS..=HARVEST_MAX_POINTS) as u32;
        let gateway = Self::gateway(&env)?;
        tree.encrypted_points = gateway.add_plain(&tree.encrypted_points, &points);

        env.storage().persistent().set(&key, &tree);
        env.storage()
            .persistent()
            .extend_ttl(&key, RECORD_TTL_LEDGERS, RECORD_TTL_LEDGERS);

        let now = env.ledger().timestamp();
        env.events().publish(
            (Symbol::new(&env, "fruit"), Symbol::new(&env, "harvested")),
            (player.clone(), tree.fruit_count, now),
        );
        env.events().publish(
            (Symbol::new(&env, "fruit"), Symbol::new(&env, "decomposed")),
            (player, now),
        );
        Ok(())
    }

    // ========================================================================
    // Token Redemption - Asynchronous Flow
    // ========================================================================

    /// Step 1: register a redemption intent.
    ///
    /// The player submits the amount twice: as an attested ciphertext (the
    /// commitment the oracle will later decrypt) and as a plaintext claim.
    /// Nothing is debited here; the claim is reconciled against the true
    /// encrypted state only in the oracle callback.
    ///
    /// # Arguments
    /// * `player` - The redeeming player (must authorize)
    /// * `encrypted_amount` - Externally encrypted spend amount
    /// * `claimed_amount` - Plaintext amount the player asserts
    /// * `proof` - Input proof binding the ciphertext to this contract/player
    ///
    /// # Returns
    /// * `u64` - The allocated redemption id (first id is 1)
    pub fn request_redeem_tokens(
        env: Env,
        player: Address,
        encrypted_amount: BytesN<32>,
        claimed_amount: u32,
        proof: Bytes,
    ) -> Result<u64, Error> {
        player.require_auth();

        if !env
            .storage()
            .persistent()
            .has(&DataKey::Tree(player.clone()))
        {
            return Err(Error::TreeNotFound);
        }
        if claimed_amount == 0 {
            return Err(Error::ZeroAmount);
        }

        // The gateway rejects proofs replayed from another contract or user.
        let gateway = Self::gateway(&env)?;
        let commitment = gateway.attest_input(
            &encrypted_amount,
            &proof,
            &env.current_contract_address(),
            &player,
        );

        let count: u64 = env
            .storage()
            .instance()
            .get(&DataKey::RedeemCount)
            .unwrap_or(0);
        let redeem_id = count + 1;
        env.storage()
            .instance()
            .set(&DataKey::RedeemCount, &redeem_id);

        let now = env.ledger().timestamp();
        let request = RedeemRequest {
            requester: player.clone(),
            claimed_amount,
            amount_commitment: commitment,
            is_resolved: false,
            revealed_spend: 0,
            revealed_total: 0,
            decryption_request_id: 0,
            created_at: now,
        };
        let key = DataKey::Redeem(redeem_id);
        env.storage().persistent().set(&key, &request);
        env.storage()
            .persistent()
            .extend_ttl(&key, RECORD_TTL_LEDGERS, RECORD_TTL_LEDGERS);

        // Last-write-wins pointer so clients can find their newest request.
        let latest_key = DataKey::LatestRedeem(player.clone());
        env.storage().persistent().set(&latest_key, &redeem_id);
        env.storage()
            .persistent()
            .extend_ttl(&latest_key, RECORD_TTL_LEDGERS, RECORD_TTL_LEDGERS);

        env.events().publish(
            (Symbol::new(&env, "redeem"), Symbol::new(&env, "requested")),
            (player, redeem_id, claimed_amount, now),
        );
        Ok(redeem_id)
    }

    /// Step 2: dispatch the asynchronous decryption for a pending redemption.
    ///
    /// Only the original requester may trigger this. The first call sends the
    /// stored commitment together with the account's current encrypted
    /// balance to the gateway; repeat calls on an already-dispatched request
    /// are absorbed as no-ops so the oracle is never asked twice.
    pub fn request_decryption(env: Env, caller: Address, redeem_id: u64) -> Result<(), Error> {
        caller.require_auth();

        let key = DataKey::Redeem(redeem_id);
        let mut request: RedeemRequest = env
            .storage()
            .persistent()
            .get(&key)
            .ok_or(Error::RequestNotFound)?;

        if caller != request.requester {
            return Err(Error::NotRequester);
        }
        if request.is_resolved {
            return Err(Error::AlreadyResolved);
        }
        if request.decryption_request_id != 0 {
            // Already dispatched; safe to retry, nothing more to do.
            return Ok(());
        }

        let tree: Tree = env
            .storage()
            .persistent()
            .get(&DataKey::Tree(request.requester.clone()))
            .ok_or(Error::TreeNotFound)?;

        let gateway = Self::gateway(&env)?;
        let oracle_request_id = gateway.request_reveal(&vec![
            &env,
            request.amount_commitment.clone(),
            tree.encrypted_points.clone(),
        ]);

        request.decryption_request_id = oracle_request_id;
        env.storage().persistent().set(&key, &request);
        env.storage()
            .persistent()
            .extend_ttl(&key, RECORD_TTL_LEDGERS, RECORD_TTL_LEDGERS);

        let route_key = DataKey::OracleRequest(oracle_request_id);
        env.storage().persistent().set(&route_key, &redeem_id);
        env.storage()
            .persistent()
            .extend_ttl(&route_key, RECORD_TTL_LEDGERS, RECORD_TTL_LEDGERS);

        env.events().publish(
            (
                Symbol::new(&env, "decryption"),
                Symbol::new(&env, "requested"),
            ),
            (redeem_id, oracle_request_id),
        );
        Ok(())
    }

    /// Step 3: oracle callback with the decrypted values.
    ///
    /// Public entry point guarded by the decryption proof: a caller without a
    /// valid proof for `oracle_request_id` cannot get past verification.
    /// Resolves the redemption exactly once; stale or duplicate deliveries
    /// for an already-resolved request are rejected without any state change.
    ///
    /// # Arguments
    /// * `oracle_request_id` - Id returned by the gateway at dispatch time
    /// * `cleartexts` - 8 bytes: spend and total-before-spend, big-endian u32s
    /// * `proof` - Decryption proof for the cleartexts
    pub fn callback_redeem_tokens(
        env: Env,
        oracle_request_id: u64,
        cleartexts: Bytes,
        proof: Bytes,
    ) -> Result<(), Error> {
        let gateway = Self::gateway(&env)?;
        if !gateway.verify_reveal(&oracle_request_id, &cleartexts, &proof) {
            return Err(Error::InvalidDecryptionProof);
        }

        let redeem_id: u64 = env
            .storage()
            .persistent()
            .get(&DataKey::OracleRequest(oracle_request_id))
            .ok_or(Error::UnknownOracleRequest)?;

        let key = DataKey::Redeem(redeem_id);
        let mut request: RedeemRequest = env
            .storage()
            .persistent()
            .get(&key)
            .ok_or(Error::RequestNotFound)?;
        if request.is_resolved {
            return Err(Error::AlreadyResolved);
        }

        let (revealed_spend, revealed_total) =
            Self::decode_cleartexts(&cleartexts).ok_or(Error::InvalidCleartexts)?;

        request.revealed_spend = revealed_spend;
        request.revealed_total = revealed_total;
        request.is_resolved = true;

        if revealed_spend != request.claimed_amount {
            Self::store_request(&env, &key, &request);
            Self::emit_failed(&env, &request.requester, redeem_id, "claim_mismatch");
            return Ok(());
        }
        if revealed_spend > revealed_total {
            Self::store_request(&env, &key, &request);
            Self::emit_failed(&env, &request.requester, redeem_id, "insufficient");
            return Ok(());
        }

        // Rate is captured at resolution time, against the live player count.
        let rate = Self::rate_for(Self::total_players(&env));
        let tokens_received = (revealed_spend as i128) * TOKEN_UNIT / (rate as i128);

        let minted: i128 = env
            .storage()
            .instance()
            .get(&DataKey::TokensMinted)
            .unwrap_or(0);
        if minted + tokens_received > TOTAL_TOKEN_SUPPLY {
            Self::store_request(&env, &key, &request);
            Self::emit_failed(&env, &request.requester, redeem_id, "supply");
            return Ok(());
        }

        // Debit the encrypted balance, clamped at zero.
        let tree_key = DataKey::Tree(request.requester.clone());
        let mut tree: Tree = env
            .storage()
            .persistent()
            .get(&tree_key)
            .ok_or(Error::TreeNotFound)?;
        tree.encrypted_points =
            gateway.sub_to_floor(&tree.encrypted_points, &request.amount_commitment);
        env.storage().persistent().set(&tree_key, &tree);
        env.storage()
            .persistent()
            .extend_ttl(&tree_key, RECORD_TTL_LEDGERS, RECORD_TTL_LEDGERS);

        let reward_token: Address = env
            .storage()
            .instance()
            .get(&DataKey::RewardTokenAddress)
            .ok_or(Error::NotInitialized)?;
        RewardTokenClient::new(&env, &reward_token).mint(&request.requester, &tokens_received);
        env.storage()
            .instance()
            .set(&DataKey::TokensMinted, &(minted + tokens_received));

        Self::store_request(&env, &key, &request);
        env.events().publish(
            (Symbol::new(&env, "redeem"), Symbol::new(&env, "processed")),
            (
                request.requester.clone(),
                redeem_id,
                revealed_spend,
                tokens_received,
            ),
        );
        Ok(())
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Tree state for any player, with derived cooldown and daily-cap fields.
    pub fn get_tree_info(env: Env, user: Address) -> TreeInfo {
        let tree: Option<Tree> = env.storage().persistent().get(&DataKey::Tree(user));
        let now = env.ledger().timestamp();
        match tree {
            Some(tree) => {
                let elapsed = now.saturating_sub(tree.last_action_time);
                let cooldown_remaining = COOLDOWN_TIME.saturating_sub(elapsed);
                let daily = if elapsed >= DAY_IN_SECONDS {
                    0
                } else {
                    tree.daily_fertilize_count
                };
                TreeInfo {
                    exists: true,
                    fertilize_count: tree.fertilize_count,
                    daily_fertilize_count: daily,
                    daily_fertilize_remaining: MAX_DAILY_FERTILIZE - daily,
                    last_action_time: tree.last_action_time,
                    fruit_count: tree.fruit_count,
                    encrypted_points: tree.encrypted_points,
                    cooldown_remaining,
                }
            }
            None => TreeInfo {
                exists: false,
                fertilize_count: 0,
                daily_fertilize_count: 0,
                daily_fertilize_remaining: MAX_DAILY_FERTILIZE,
                last_action_time: 0,
                fruit_count: 0,
                encrypted_points: BytesN::from_array(&env, &[0u8; 32]),
                cooldown_remaining: 0,
            },
        }
    }

    /// Full status of a redemption request.
    pub fn get_redeem_status(env: Env, redeem_id: u64) -> Result<RedeemRequest, Error> {
        env.storage()
            .persistent()
            .get(&DataKey::Redeem(redeem_id))
            .ok_or(Error::RequestNotFound)
    }

    pub fn is_decryption_requested(env: Env, redeem_id: u64) -> Result<bool, Error> {
        let request: RedeemRequest = env
            .storage()
            .persistent()
            .get(&DataKey::Redeem(redeem_id))
            .ok_or(Error::RequestNotFound)?;
        Ok(request.decryption_request_id != 0)
    }

    /// The player's most recent redemption id, or 0 if they never redeemed.
    pub fn get_user_latest_request(env: Env, user: Address) -> u64 {
        env.storage()
            .persistent()
            .get(&DataKey::LatestRedeem(user))
            .unwrap_or(0)
    }

    /// Current points-per-token rate, derived from the live player count.
    pub fn get_current_exchange_rate(env: Env) -> u64 {
        Self::rate_for(Self::total_players(&env))
    }

    /// Unminted share of the reward token supply, in basis points (0-10000).
    pub fn get_token_remaining_percentage(env: Env) -> u32 {
        let minted: i128 = env
            .storage()
            .instance()
            .get(&DataKey::TokensMinted)
            .unwrap_or(0);
        ((TOTAL_TOKEN_SUPPLY - minted) * 10_000 / TOTAL_TOKEN_SUPPLY) as u32
    }

    pub fn get_total_players(env: Env) -> u64 {
        Self::total_players(&env)
    }

    /// The caller's own encrypted point balance handle. Decryption of the
    /// handle is a client-side operation against the gateway; this contract
    /// only hands the owner their handle.
    pub fn get_encrypted_points(env: Env, user: Address) -> Result<BytesN<32>, Error> {
        user.require_auth();
        let tree: Tree = env
            .storage()
            .persistent()
            .get(&DataKey::Tree(user))
            .ok_or(Error::TreeNotFound)?;
        Ok(tree.encrypted_points)
    }

    /// Collected mint fees currently held by the contract.
    pub fn get_balance(env: Env) -> Result<i128, Error> {
        let payment_token: Address = env
            .storage()
            .instance()
            .get(&DataKey::PaymentTokenAddress)
            .ok_or(Error::NotInitialized)?;
        Ok(token::Client::new(&env, &payment_token).balance(&env.current_contract_address()))
    }

    /// Rankings cannot be computed over encrypted balances.
    pub fn get_leaderboard(_env: Env, _limit: u32) -> Result<(), Error> {
        Err(Error::LeaderboardUnavailable)
    }

    // ========================================================================
    // Admin
    // ========================================================================

    /// Update the gateway address (admin only).
    pub fn set_gateway(env: Env, new_gateway: Address) -> Result<(), Error> {
        let admin: Address = env
            .storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(Error::NotInitialized)?;
        admin.require_auth();

        env.storage()
            .instance()
            .set(&DataKey::GatewayAddress, &new_gateway);
        Ok(())
    }

    /// Transfer the collected mint fees to the admin (admin only).
    pub fn withdraw(env: Env) -> Result<(), Error> {
        let admin: Address = env
            .storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(Error::NotInitialized)?;
        admin.require_auth();

        let payment_token: Address = env
            .storage()
            .instance()
            .get(&DataKey::PaymentTokenAddress)
            .ok_or(Error::NotInitialized)?;
        let client = token::Client::new(&env, &payment_token);
        let balance = client.balance(&env.current_contract_address());
        if balance > 0 {
            client.transfer(&env.current_contract_address(), &admin, &balance);
        }
        Ok(())
    }

    /// Update the contract WASM hash (upgrade contract).
    ///
    /// # Arguments
    /// * `new_wasm_hash` - The hash of the new WASM binary
    pub fn upgrade(env: Env, new_wasm_hash: BytesN<32>) {
        let admin: Address = env
            .storage()
            .instance()
            .get(&DataKey::Admin)
            .expect("Admin not set");
        admin.require_auth();

        env.deployer().update_current_contract_wasm(new_wasm_hash);
    }

    // ========================================================================
    // Internal Helper Functions
    // ========================================================================

    fn gateway(env: &Env) -> Result<CipherGatewayClient<'_>, Error> {
        let gateway_addr: Address = env
            .storage()
            .instance()
            .get(&DataKey::GatewayAddress)
            .ok_or(Error::NotInitialized)?;
        Ok(CipherGatewayClient::new(env, &gateway_addr))
    }

    fn total_players(env: &Env) -> u64 {
        env.storage()
            .instance()
            .get(&DataKey::TotalPlayers)
            .unwrap_or(0)
    }

    /// Points-per-token rate for a given player count.
    fn rate_for(total_players: u64) -> u64 {
        BASE_RATE + (total_players / RATE_TIER_SIZE) * RATE_TIER_STEP
    }

    /// Decode (spend, total) from the oracle cleartexts.
    fn decode_cleartexts(cleartexts: &Bytes) -> Option<(u32, u32)> {
        if cleartexts.len() != CLEARTEXTS_LEN {
            return None;
        }
        let mut buf = [0u8; 8];
        for i in 0..8u32 {
            buf[i as usize] = cleartexts.get(i)?;
        }
        let spend = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let total = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Some((spend, total))
    }

    fn store_request(env: &Env, key: &DataKey, request: &RedeemRequest) {
        env.storage().persistent().set(key, request);
        env.storage()
            .persistent()
            .extend_ttl(key, RECORD_TTL_LEDGERS, RECORD_TTL_LEDGERS);
    }

    fn emit_failed(env: &Env, requester: &Address, redeem_id: u64, reason: &str) {
        env.events().publish(
            (Symbol::new(env, "redeem"), Symbol::new(env, "failed")),
            (requester.clone(), redeem_id, Symbol::new(env, reason)),
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
