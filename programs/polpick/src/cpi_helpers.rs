//! CPI (Cross-Program Invocation) helpers for PolPick
//!
//! This module provides PDA derivations for other Solana programs (and
//! off-chain clients) that place trades or look up pools. The account
//! structs for CPI are the ones Anchor generates under `polpick::cpi::accounts`.
//!
//! # Example
//!
//! ```ignore
//! use polpick::cpi;
//! use polpick::cpi::accounts::MakeTrade;
//!
//! // The bet PDA is seeded with the pool's current bet count
//! let (bet, _) = polpick::cpi_helpers::derive_bet_pda(&pool_key, bets_count, &polpick::ID);
//!
//! // In your program's instruction handler:
//! let cpi_accounts = MakeTrade {
//!     game: ctx.accounts.game.to_account_info(),
//!     pool: ctx.accounts.pool.to_account_info(),
//!     bet: ctx.accounts.bet.to_account_info(),
//!     bettor: ctx.accounts.bettor.to_account_info(),
//!     system_program: ctx.accounts.system_program.to_account_info(),
//! };
//!
//! let cpi_ctx = CpiContext::new(ctx.accounts.polpick_program.to_account_info(), cpi_accounts);
//! polpick::cpi::make_trade(cpi_ctx, pool_id, bets_count, Side::Up, amount, metadata)?;
//! ```

use anchor_lang::prelude::*;
use solana_hash::Hash;

use crate::{BET_SEED, GAME_SEED, POOL_SEED};

/// Derive the game session PDA address
pub fn derive_game_pda(controller: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[GAME_SEED, controller.as_ref()], program_id)
}

/// Derive the pool PDA address
pub fn derive_pool_pda(game: &Pubkey, pool_id: &[u8; 32], program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[POOL_SEED, game.as_ref(), pool_id.as_ref()], program_id)
}

/// Derive the bet PDA address for the `bet_index`-th bet placed in a pool
pub fn derive_bet_pda(pool: &Pubkey, bet_index: u32, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[BET_SEED, pool.as_ref(), &bet_index.to_le_bytes()],
        program_id,
    )
}

/// Bet PDAs for a settlement batch, in the order `settle_batch` expects them
pub fn derive_settlement_batch(
    pool: &Pubkey,
    batch: std::ops::Range<u32>,
    program_id: &Pubkey,
) -> Vec<Pubkey> {
    batch
        .map(|index| derive_bet_pda(pool, index, program_id).0)
        .collect()
}

/// Pool id for a human-readable label.
///
/// Labels up to 31 bytes are right-padded with zeros, matching the usual
/// bytes32 string encoding (so "pool1" maps to the same id everywhere).
/// Longer labels are hashed with SHA-256.
pub fn pool_id_from_label(label: &str) -> [u8; 32] {
    let bytes = label.as_bytes();
    if bytes.len() < 32 {
        let mut id = [0u8; 32];
        id[..bytes.len()].copy_from_slice(bytes);
        return id;
    }
    let digest: Hash = solana_sha256_hasher::hash(bytes);
    digest.to_bytes()
}

/// Inverse of `pool_id_from_label` for padded ids. Hashed ids return `None`.
pub fn label_from_pool_id(pool_id: &[u8; 32]) -> Option<String> {
    let end = pool_id.iter().position(|b| *b == 0)?;
    if pool_id[end..].iter().any(|b| *b != 0) {
        return None;
    }
    String::from_utf8(pool_id[..end].to_vec()).ok()
}
