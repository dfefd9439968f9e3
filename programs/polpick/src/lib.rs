use anchor_lang::prelude::*;
use anchor_lang::system_program;
use std::ops::Range;

pub mod cpi_helpers;

declare_id!("7nLtHuCCiANcYJYCiRWmWu1rokX9FGEUrKZZaTFqYnLr");

pub const GAME_SEED: &[u8] = b"game";
pub const POOL_SEED: &[u8] = b"pool";
pub const BET_SEED: &[u8] = b"bet";

pub const BPS_DENOMINATOR: u64 = 10_000;
pub const MAX_FEE_BPS: u16 = 1_000; // 10%

pub const MAX_AVATAR_URL_LEN: usize = 128;
pub const MAX_COUNTRY_CODE_LEN: usize = 8;
pub const MAX_TAG_LEN: usize = 32;

/// PolPick
/// Up/down price prediction pools run by a single game controller.
/// Stakes are escrowed in the pool account and paid out pari-mutuel style.

#[program]
pub mod polpick {
    use super::*;

    // ==================== SESSION ====================

    /// Create a game session owned by `controller`, who must sign as payer.
    /// The game starts stopped; the controller must call `start_game`.
    pub fn initialize_game(
        ctx: Context<InitializeGame>,
        controller: Pubkey,
        fee_bps: u16,
        tie_policy: TiePolicy,
    ) -> Result<()> {
        let clock = Clock::get()?;
        let game = GameSession::new(
            &ctx.accounts.payer.key(),
            controller,
            fee_bps,
            tie_policy,
            clock.unix_timestamp,
            ctx.bumps.game,
        )?;
        ctx.accounts.game.set_inner(game);

        msg!("Game session initialized for controller {}", controller);

        emit!(GameInitialized {
            game: ctx.accounts.game.key(),
            controller,
            fee_bps,
            tie_policy,
        });

        Ok(())
    }

    /// Update settlement config. Only pools created afterwards pick it up.
    pub fn update_config(
        ctx: Context<UpdateConfig>,
        fee_bps: u16,
        tie_policy: TiePolicy,
    ) -> Result<()> {
        let game = &mut ctx.accounts.game;
        game.require_controller(&ctx.accounts.authority.key())?;
        game.configure(fee_bps, tie_policy)?;

        emit!(ConfigUpdated {
            game: game.key(),
            fee_bps,
            tie_policy,
        });

        Ok(())
    }

    pub fn start_game(ctx: Context<SetRunning>) -> Result<()> {
        let game = &mut ctx.accounts.game;
        game.set_running(&ctx.accounts.authority.key(), true)?;

        msg!("Game started");
        emit!(GameStateChanged {
            game: game.key(),
            is_running: true,
        });

        Ok(())
    }

    pub fn stop_game(ctx: Context<SetRunning>) -> Result<()> {
        let game = &mut ctx.accounts.game;
        game.set_running(&ctx.accounts.authority.key(), false)?;

        msg!("Game stopped");
        emit!(GameStateChanged {
            game: game.key(),
            is_running: false,
        });

        Ok(())
    }

    pub fn is_running(ctx: Context<GetGame>) -> Result<bool> {
        Ok(ctx.accounts.game.is_running)
    }

    // ==================== POOLS ====================

    /// Create a pool. Pools are open for bets as soon as they exist.
    pub fn create_pool(
        ctx: Context<CreatePool>,
        pool_id: [u8; 32],
        min_bet_amount: u64,
        max_bet_amount: u64,
        pool_bets_limit: u32,
    ) -> Result<()> {
        let clock = Clock::get()?;
        let game_key = ctx.accounts.game.key();
        let pool = ctx.accounts.game.open_pool(
            &ctx.accounts.authority.key(),
            &ctx.accounts.pool,
            game_key,
            pool_id,
            PoolLimits {
                min_bet_amount,
                max_bet_amount,
                pool_bets_limit,
            },
            clock.unix_timestamp,
            ctx.bumps.pool,
        )?;
        ctx.accounts.pool.set_inner(pool);

        msg!(
            "Pool created: bets {}..={} limit {}",
            min_bet_amount,
            max_bet_amount,
            pool_bets_limit
        );

        emit!(PoolCreated {
            game: game_key,
            pool: ctx.accounts.pool.key(),
            pool_id,
            min_bet_amount,
            max_bet_amount,
            pool_bets_limit,
        });

        Ok(())
    }

    pub fn is_pool_open(ctx: Context<GetPool>, _pool_id: [u8; 32]) -> Result<bool> {
        let pool = load_pool(&ctx.accounts.pool)?;
        Ok(pool.is_open())
    }

    pub fn get_pool(ctx: Context<GetPool>, _pool_id: [u8; 32]) -> Result<PoolSnapshot> {
        let pool = load_pool(&ctx.accounts.pool)?;
        Ok(pool.snapshot())
    }

    // ==================== TRADING ====================

    /// Stake `amount` lamports on `side` of an open pool.
    /// `bet_index` must equal the pool's current bet count; it seeds the bet PDA.
    pub fn make_trade(
        ctx: Context<MakeTrade>,
        _pool_id: [u8; 32],
        bet_index: u32,
        side: Side,
        amount: u64,
        metadata: BetMetadata,
    ) -> Result<()> {
        ctx.accounts.game.authorize_trade(&metadata)?;

        let mut pool = load_pool(&ctx.accounts.pool)?;
        pool.place_trade(bet_index, side, amount)?;

        // Escrow the stake in the pool account
        let cpi_context = CpiContext::new(
            ctx.accounts.system_program.to_account_info(),
            system_program::Transfer {
                from: ctx.accounts.bettor.to_account_info(),
                to: ctx.accounts.pool.to_account_info(),
            },
        );
        system_program::transfer(cpi_context, amount)?;
        store_pool(&ctx.accounts.pool, &pool)?;

        let clock = Clock::get()?;
        let pool_key = ctx.accounts.pool.key();
        let bettor_key = ctx.accounts.bettor.key();
        ctx.accounts.bet.set_inner(Bet {
            pool: pool_key,
            bettor: bettor_key,
            index: bet_index,
            side,
            amount,
            metadata: metadata.clone(),
            placed_at: clock.unix_timestamp,
            settled: false,
            payout: 0,
            bump: ctx.bumps.bet,
        });

        emit!(TradePlaced {
            pool: pool_key,
            pool_id: pool.pool_id,
            bettor: bettor_key,
            bet_index,
            side,
            amount,
            up_total: pool.up_bet_group.total,
            down_total: pool.down_bet_group.total,
            avatar_url: metadata.avatar_url,
            country_code: metadata.country_code,
            white_label_id: metadata.white_label_id,
            game_id: metadata.game_id,
        });

        Ok(())
    }

    // ==================== ROUNDS ====================

    /// Capture the round's start price and close the pool to new bets.
    /// `batch_size` bounds how many bets each `settle_batch` call pays out.
    pub fn trigger(
        ctx: Context<Trigger>,
        _pool_id: [u8; 32],
        time_ms: i64,
        price: u64,
        batch_size: u16,
    ) -> Result<()> {
        ctx.accounts
            .game
            .authorize_trigger(&ctx.accounts.authority.key())?;

        let mut pool = load_pool(&ctx.accounts.pool)?;
        pool.trigger(time_ms, price, batch_size)?;
        store_pool(&ctx.accounts.pool, &pool)?;

        msg!("Round triggered at {} with price {}", time_ms, price);

        emit!(RoundTriggered {
            pool: ctx.accounts.pool.key(),
            pool_id: pool.pool_id,
            start_price: price,
            round_start_time: time_ms,
            batch_size,
        });

        Ok(())
    }

    /// Fix the round outcome from the final observed price.
    /// Allowed while the game is stopped so stakes never get stuck.
    pub fn resolve_round(
        ctx: Context<ResolveRound>,
        _pool_id: [u8; 32],
        end_price: u64,
        end_time: i64,
    ) -> Result<()> {
        ctx.accounts
            .game
            .require_controller(&ctx.accounts.authority.key())?;

        let mut pool = load_pool(&ctx.accounts.pool)?;
        let outcome = pool.resolve(end_price, end_time)?;
        store_pool(&ctx.accounts.pool, &pool)?;

        msg!(
            "Round resolved: {:?} ({} -> {}), fee {}",
            outcome,
            pool.start_price,
            end_price,
            pool.fee_amount
        );

        emit!(RoundResolved {
            pool: ctx.accounts.pool.key(),
            pool_id: pool.pool_id,
            end_price,
            round_end_time: end_time,
            outcome,
            fee_amount: pool.fee_amount,
        });

        Ok(())
    }

    /// Pay out the next batch of bets in insertion order.
    /// remaining_accounts: `[bet, bettor]` pairs for exactly that batch.
    pub fn settle_batch<'info>(
        ctx: Context<'_, '_, '_, 'info, SettleBatch<'info>>,
        _pool_id: [u8; 32],
    ) -> Result<()> {
        ctx.accounts
            .game
            .require_controller(&ctx.accounts.authority.key())?;

        let mut pool = load_pool(&ctx.accounts.pool)?;
        let batch = pool.next_settlement_batch()?;
        require!(
            ctx.remaining_accounts.len() == batch.len() * 2,
            PolpickError::InvalidSettlementAccounts
        );

        let pool_key = ctx.accounts.pool.key();
        let pool_info = ctx.accounts.pool.to_account_info();
        let mut batch_paid = 0u64;

        for (index, pair) in batch.clone().zip(ctx.remaining_accounts.chunks(2)) {
            let bet_info = &pair[0];
            let bettor_info = &pair[1];
            require!(
                bet_info.owner == &crate::ID,
                PolpickError::InvalidSettlementAccounts
            );

            let mut bet = {
                let data = bet_info.try_borrow_data()?;
                Bet::try_deserialize(&mut &data[..])?
            };
            require!(
                bet.pool == pool_key
                    && bet.index == index
                    && bet.bettor == bettor_info.key()
                    && !bet.settled,
                PolpickError::InvalidSettlementAccounts
            );

            let payout = pool.payout_for(bet.side, bet.amount)?;
            move_lamports(&pool_info, bettor_info, payout)?;
            batch_paid = batch_paid
                .checked_add(payout)
                .ok_or(PolpickError::MathOverflow)?;

            bet.settled = true;
            bet.payout = payout;
            {
                let mut data = bet_info.try_borrow_mut_data()?;
                bet.try_serialize(&mut &mut data[..])?;
            }

            emit!(BetSettled {
                pool: pool_key,
                bet_index: index,
                bettor: bet.bettor,
                side: bet.side,
                amount: bet.amount,
                payout,
            });
        }

        let finished = pool.record_settled(batch.end, batch_paid)?;
        msg!(
            "Settled bets {}..{} of {}, paid {}",
            batch.start,
            batch.end,
            pool.bets_count,
            batch_paid
        );

        if finished {
            let residual = pool.residual()?;
            move_lamports(
                &pool_info,
                &ctx.accounts.authority.to_account_info(),
                residual,
            )?;

            emit!(PoolSettled {
                pool: pool_key,
                pool_id: pool.pool_id,
                paid_out: pool.paid_out,
                residual,
            });
        }
        store_pool(&ctx.accounts.pool, &pool)?;

        Ok(())
    }
}

// === Helper Functions ===

/// Read a pool that may not exist. Every pool-addressed instruction takes the
/// pool unchecked so that a missing pool surfaces as `PoolNotFound`.
fn load_pool(info: &AccountInfo) -> Result<Pool> {
    if info.owner != &crate::ID || info.data_is_empty() {
        return err!(PolpickError::PoolNotFound);
    }
    let data = info.try_borrow_data()?;
    let pool = Pool::try_deserialize(&mut &data[..])?;
    require!(pool.created, PolpickError::PoolNotFound);
    Ok(pool)
}

/// Write a pool loaded with `load_pool` back into its account.
fn store_pool(info: &AccountInfo, pool: &Pool) -> Result<()> {
    let mut data = info.try_borrow_mut_data()?;
    pool.try_serialize(&mut &mut data[..])
}

/// Move lamports out of a program-owned account.
fn move_lamports(from: &AccountInfo, to: &AccountInfo, amount: u64) -> Result<()> {
    if amount == 0 {
        return Ok(());
    }
    let from_balance = from
        .lamports()
        .checked_sub(amount)
        .ok_or(PolpickError::MathOverflow)?;
    let to_balance = to
        .lamports()
        .checked_add(amount)
        .ok_or(PolpickError::MathOverflow)?;
    **from.try_borrow_mut_lamports()? = from_balance;
    **to.try_borrow_mut_lamports()? = to_balance;
    Ok(())
}

fn mul_div(a: u64, b: u64, denominator: u64) -> Result<u64> {
    let value = (a as u128)
        .checked_mul(b as u128)
        .ok_or(PolpickError::MathOverflow)?
        .checked_div(denominator as u128)
        .ok_or(PolpickError::MathOverflow)?;
    u64::try_from(value).map_err(|_| error!(PolpickError::MathOverflow))
}

/// Outcome of a round given its start/end prices and the stake on each side.
/// A winning side with no stake pushes, so nobody loses to an empty side.
pub fn decide_outcome(
    start_price: u64,
    end_price: u64,
    tie_policy: TiePolicy,
    up_total: u64,
    down_total: u64,
) -> RoundOutcome {
    let outcome = match end_price.cmp(&start_price) {
        std::cmp::Ordering::Greater => RoundOutcome::Up,
        std::cmp::Ordering::Less => RoundOutcome::Down,
        std::cmp::Ordering::Equal => match tie_policy {
            TiePolicy::Push => RoundOutcome::Push,
            TiePolicy::HouseWins => RoundOutcome::HouseWins,
        },
    };
    match outcome {
        RoundOutcome::Up if up_total == 0 => RoundOutcome::Push,
        RoundOutcome::Down if down_total == 0 => RoundOutcome::Push,
        other => other,
    }
}

/// Fee taken at resolution: a cut of the losing side, nothing on a push,
/// everything when the house wins a tie.
pub fn settlement_fee(
    outcome: RoundOutcome,
    up_total: u64,
    down_total: u64,
    fee_bps: u16,
) -> Result<u64> {
    match outcome {
        RoundOutcome::Up => mul_div(down_total, fee_bps as u64, BPS_DENOMINATOR),
        RoundOutcome::Down => mul_div(up_total, fee_bps as u64, BPS_DENOMINATOR),
        RoundOutcome::Push | RoundOutcome::Undecided => Ok(0),
        RoundOutcome::HouseWins => up_total
            .checked_add(down_total)
            .ok_or_else(|| error!(PolpickError::MathOverflow)),
    }
}

/// Payout for a single bet. Each bet is computed on its own from the pool
/// aggregates, so the result does not depend on how bets are batched.
pub fn compute_payout(
    amount: u64,
    side: Side,
    outcome: RoundOutcome,
    up_total: u64,
    down_total: u64,
    fee_amount: u64,
) -> Result<u64> {
    let winning_side = match outcome {
        RoundOutcome::Undecided => return err!(PolpickError::RoundNotResolved),
        RoundOutcome::Push => return Ok(amount),
        RoundOutcome::HouseWins => return Ok(0),
        RoundOutcome::Up => Side::Up,
        RoundOutcome::Down => Side::Down,
    };
    if side != winning_side {
        return Ok(0);
    }

    let winning_total = match winning_side {
        Side::Up => up_total,
        Side::Down => down_total,
    };
    let distributable = up_total
        .checked_add(down_total)
        .ok_or(PolpickError::MathOverflow)?
        .checked_sub(fee_amount)
        .ok_or(PolpickError::MathOverflow)?;

    mul_div(amount, distributable, winning_total)
}

// === Account Structures ===

#[derive(Accounts)]
#[instruction(controller: Pubkey)]
pub struct InitializeGame<'info> {
    #[account(
        init,
        payer = payer,
        space = 8 + GameSession::INIT_SPACE,
        seeds = [GAME_SEED, controller.as_ref()],
        bump
    )]
    pub game: Account<'info, GameSession>,

    #[account(mut)]
    pub payer: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct UpdateConfig<'info> {
    #[account(mut, seeds = [GAME_SEED, game.controller.as_ref()], bump = game.bump)]
    pub game: Account<'info, GameSession>,

    pub authority: Signer<'info>,
}

#[derive(Accounts)]
pub struct SetRunning<'info> {
    #[account(mut, seeds = [GAME_SEED, game.controller.as_ref()], bump = game.bump)]
    pub game: Account<'info, GameSession>,

    pub authority: Signer<'info>,
}

#[derive(Accounts)]
pub struct GetGame<'info> {
    #[account(seeds = [GAME_SEED, game.controller.as_ref()], bump = game.bump)]
    pub game: Account<'info, GameSession>,
}

#[derive(Accounts)]
#[instruction(pool_id: [u8; 32])]
pub struct CreatePool<'info> {
    #[account(mut, seeds = [GAME_SEED, game.controller.as_ref()], bump = game.bump)]
    pub game: Account<'info, GameSession>,

    #[account(
        init_if_needed,
        payer = authority,
        space = 8 + Pool::INIT_SPACE,
        seeds = [POOL_SEED, game.key().as_ref(), pool_id.as_ref()],
        bump
    )]
    pub pool: Account<'info, Pool>,

    #[account(mut)]
    pub authority: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(pool_id: [u8; 32])]
pub struct GetPool<'info> {
    #[account(seeds = [GAME_SEED, game.controller.as_ref()], bump = game.bump)]
    pub game: Account<'info, GameSession>,

    /// CHECK: address is derived from the pool id; existence is checked by `load_pool`
    #[account(seeds = [POOL_SEED, game.key().as_ref(), pool_id.as_ref()], bump)]
    pub pool: UncheckedAccount<'info>,
}

#[derive(Accounts)]
#[instruction(pool_id: [u8; 32], bet_index: u32)]
pub struct MakeTrade<'info> {
    #[account(seeds = [GAME_SEED, game.controller.as_ref()], bump = game.bump)]
    pub game: Account<'info, GameSession>,

    /// CHECK: address is derived from the pool id; existence is checked by `load_pool`
    #[account(mut, seeds = [POOL_SEED, game.key().as_ref(), pool_id.as_ref()], bump)]
    pub pool: UncheckedAccount<'info>,

    #[account(
        init,
        payer = bettor,
        space = 8 + Bet::INIT_SPACE,
        seeds = [BET_SEED, pool.key().as_ref(), &bet_index.to_le_bytes()],
        bump
    )]
    pub bet: Account<'info, Bet>,

    #[account(mut)]
    pub bettor: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(pool_id: [u8; 32])]
pub struct Trigger<'info> {
    #[account(seeds = [GAME_SEED, game.controller.as_ref()], bump = game.bump)]
    pub game: Account<'info, GameSession>,

    /// CHECK: address is derived from the pool id; existence is checked by `load_pool`
    #[account(mut, seeds = [POOL_SEED, game.key().as_ref(), pool_id.as_ref()], bump)]
    pub pool: UncheckedAccount<'info>,

    pub authority: Signer<'info>,
}

#[derive(Accounts)]
#[instruction(pool_id: [u8; 32])]
pub struct ResolveRound<'info> {
    #[account(seeds = [GAME_SEED, game.controller.as_ref()], bump = game.bump)]
    pub game: Account<'info, GameSession>,

    /// CHECK: address is derived from the pool id; existence is checked by `load_pool`
    #[account(mut, seeds = [POOL_SEED, game.key().as_ref(), pool_id.as_ref()], bump)]
    pub pool: UncheckedAccount<'info>,

    pub authority: Signer<'info>,
}

#[derive(Accounts)]
#[instruction(pool_id: [u8; 32])]
pub struct SettleBatch<'info> {
    #[account(seeds = [GAME_SEED, game.controller.as_ref()], bump = game.bump)]
    pub game: Account<'info, GameSession>,

    /// CHECK: address is derived from the pool id; existence is checked by `load_pool`
    #[account(mut, seeds = [POOL_SEED, game.key().as_ref(), pool_id.as_ref()], bump)]
    pub pool: UncheckedAccount<'info>,

    /// Receives the fee and rounding residual once the pool is fully settled.
    #[account(mut)]
    pub authority: Signer<'info>,
}

// === State Accounts ===

#[account]
#[derive(InitSpace, Debug)]
pub struct GameSession {
    pub controller: Pubkey,
    pub is_running: bool,
    pub fee_bps: u16,
    pub tie_policy: TiePolicy,
    pub total_pools: u64,
    pub created_at: i64,
    pub bump: u8,
}

impl GameSession {
    /// Session for `controller`. The payer must be the controller itself.
    pub fn new(
        payer: &Pubkey,
        controller: Pubkey,
        fee_bps: u16,
        tie_policy: TiePolicy,
        created_at: i64,
        bump: u8,
    ) -> Result<Self> {
        require!(*payer == controller, PolpickError::Unauthorized);
        require!(fee_bps <= MAX_FEE_BPS, PolpickError::FeeTooHigh);
        Ok(Self {
            controller,
            is_running: false,
            fee_bps,
            tie_policy,
            total_pools: 0,
            created_at,
            bump,
        })
    }

    pub fn require_controller(&self, caller: &Pubkey) -> Result<()> {
        require!(*caller == self.controller, PolpickError::Unauthorized);
        Ok(())
    }

    pub fn require_running(&self) -> Result<()> {
        require!(self.is_running, PolpickError::GameNotRunning);
        Ok(())
    }

    /// Starting a running game (or stopping a stopped one) is not an error.
    pub fn set_running(&mut self, caller: &Pubkey, running: bool) -> Result<()> {
        self.require_controller(caller)?;
        self.is_running = running;
        Ok(())
    }

    pub fn configure(&mut self, fee_bps: u16, tie_policy: TiePolicy) -> Result<()> {
        require!(fee_bps <= MAX_FEE_BPS, PolpickError::FeeTooHigh);
        self.fee_bps = fee_bps;
        self.tie_policy = tie_policy;
        Ok(())
    }

    /// Checks for `create_pool`, in order, then the new pool with this
    /// session's settlement config. `existing` is whatever the pool address
    /// holds now; a failed check leaves it and the session untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn open_pool(
        &mut self,
        caller: &Pubkey,
        existing: &Pool,
        session: Pubkey,
        pool_id: [u8; 32],
        limits: PoolLimits,
        created_at: i64,
        bump: u8,
    ) -> Result<Pool> {
        self.require_controller(caller)?;
        require!(!existing.created, PolpickError::PoolAlreadyExists);

        let pool = Pool::open(
            session,
            pool_id,
            limits,
            self.fee_bps,
            self.tie_policy,
            created_at,
            bump,
        )?;
        self.total_pools = self
            .total_pools
            .checked_add(1)
            .ok_or(PolpickError::MathOverflow)?;
        Ok(pool)
    }

    pub fn authorize_trigger(&self, caller: &Pubkey) -> Result<()> {
        self.require_controller(caller)?;
        self.require_running()
    }

    /// Anyone may trade, but only while the game runs.
    pub fn authorize_trade(&self, metadata: &BetMetadata) -> Result<()> {
        self.require_running()?;
        metadata.validate()
    }
}

#[account]
#[derive(InitSpace, Debug)]
pub struct Pool {
    pub session: Pubkey,
    pub pool_id: [u8; 32],
    pub created: bool,
    pub min_bet_amount: u64,
    pub max_bet_amount: u64,
    pub pool_bets_limit: u32,
    pub fee_bps: u16,
    pub tie_policy: TiePolicy,
    pub status: PoolStatus,

    // Round
    pub start_price: u64,
    pub round_start_time: i64,
    pub settle_batch_size: u16,
    pub end_price: u64,
    pub round_end_time: i64,
    pub outcome: RoundOutcome,
    pub fee_amount: u64,

    // Stakes
    pub up_bet_group: BetGroup,
    pub down_bet_group: BetGroup,
    pub bets_count: u32,

    // Settlement progress
    pub settle_cursor: u32,
    pub paid_out: u64,

    pub created_at: i64,
    pub bump: u8,
}

impl Pool {
    pub fn open(
        session: Pubkey,
        pool_id: [u8; 32],
        limits: PoolLimits,
        fee_bps: u16,
        tie_policy: TiePolicy,
        created_at: i64,
        bump: u8,
    ) -> Result<Self> {
        limits.validate()?;

        Ok(Self {
            session,
            pool_id,
            created: true,
            min_bet_amount: limits.min_bet_amount,
            max_bet_amount: limits.max_bet_amount,
            pool_bets_limit: limits.pool_bets_limit,
            fee_bps,
            tie_policy,
            status: PoolStatus::Open,
            start_price: 0,
            round_start_time: 0,
            settle_batch_size: 0,
            end_price: 0,
            round_end_time: 0,
            outcome: RoundOutcome::Undecided,
            fee_amount: 0,
            up_bet_group: BetGroup::default(),
            down_bet_group: BetGroup::default(),
            bets_count: 0,
            settle_cursor: 0,
            paid_out: 0,
            created_at,
            bump,
        })
    }

    pub fn is_open(&self) -> bool {
        self.created && self.status == PoolStatus::Open
    }

    pub fn group(&self, side: Side) -> &BetGroup {
        match side {
            Side::Up => &self.up_bet_group,
            Side::Down => &self.down_bet_group,
        }
    }

    pub fn total_staked(&self) -> Result<u64> {
        self.up_bet_group
            .total
            .checked_add(self.down_bet_group.total)
            .ok_or_else(|| error!(PolpickError::MathOverflow))
    }

    /// Validate and book a stake. Returns the bet's insertion index.
    /// Nothing is written unless every check passes.
    pub fn record_trade(&mut self, side: Side, amount: u64) -> Result<u32> {
        require!(self.is_open(), PolpickError::PoolNotOpen);
        require!(amount >= self.min_bet_amount, PolpickError::BetTooSmall);
        require!(amount <= self.max_bet_amount, PolpickError::BetTooLarge);

        let bets_count = self
            .bets_count
            .checked_add(1)
            .ok_or(PolpickError::MathOverflow)?;
        require!(
            bets_count <= self.pool_bets_limit,
            PolpickError::PoolBetLimitReached
        );

        let group = self.group(side).with_stake(amount)?;
        // Both sides share one total so it must stay representable
        require!(
            group
                .total
                .checked_add(self.group(side.opposite()).total)
                .is_some(),
            PolpickError::MathOverflow
        );

        let index = self.bets_count;
        match side {
            Side::Up => self.up_bet_group = group,
            Side::Down => self.down_bet_group = group,
        }
        self.bets_count = bets_count;
        Ok(index)
    }

    /// `record_trade` for a bet whose PDA was seeded with `bet_index`.
    pub fn place_trade(&mut self, bet_index: u32, side: Side, amount: u64) -> Result<u32> {
        require!(self.is_open(), PolpickError::PoolNotOpen);
        require!(
            bet_index == self.bets_count,
            PolpickError::BetIndexMismatch
        );
        self.record_trade(side, amount)
    }

    pub fn trigger(&mut self, time_ms: i64, price: u64, batch_size: u16) -> Result<()> {
        require!(
            self.status == PoolStatus::Open,
            PolpickError::AlreadyTriggered
        );
        require!(batch_size > 0, PolpickError::InvalidBatchSize);

        self.start_price = price;
        self.round_start_time = time_ms;
        self.settle_batch_size = batch_size;
        self.status = PoolStatus::Triggered;
        Ok(())
    }

    pub fn resolve(&mut self, end_price: u64, end_time: i64) -> Result<RoundOutcome> {
        match self.status {
            PoolStatus::Open => return err!(PolpickError::RoundNotTriggered),
            PoolStatus::Settling | PoolStatus::Resolved => {
                return err!(PolpickError::AlreadyResolved)
            }
            PoolStatus::Triggered => {}
        }

        let up_total = self.up_bet_group.total;
        let down_total = self.down_bet_group.total;
        let outcome = decide_outcome(
            self.start_price,
            end_price,
            self.tie_policy,
            up_total,
            down_total,
        );
        let fee_amount = settlement_fee(outcome, up_total, down_total, self.fee_bps)?;

        self.end_price = end_price;
        self.round_end_time = end_time;
        self.outcome = outcome;
        self.fee_amount = fee_amount;
        self.status = if self.bets_count == 0 {
            PoolStatus::Resolved
        } else {
            PoolStatus::Settling
        };
        Ok(outcome)
    }

    pub fn payout_for(&self, side: Side, amount: u64) -> Result<u64> {
        compute_payout(
            amount,
            side,
            self.outcome,
            self.up_bet_group.total,
            self.down_bet_group.total,
            self.fee_amount,
        )
    }

    /// Bet indices the next `settle_batch` call must process.
    pub fn next_settlement_batch(&self) -> Result<Range<u32>> {
        require!(
            self.status == PoolStatus::Settling,
            PolpickError::RoundNotResolved
        );
        let remaining = self.bets_count.saturating_sub(self.settle_cursor);
        let len = remaining.min(self.settle_batch_size as u32);
        Ok(self.settle_cursor..self.settle_cursor + len)
    }

    /// Advance the settlement cursor. Returns true once every bet is paid.
    pub fn record_settled(&mut self, batch_end: u32, paid: u64) -> Result<bool> {
        require!(
            self.status == PoolStatus::Settling,
            PolpickError::RoundNotResolved
        );
        require!(
            batch_end > self.settle_cursor && batch_end <= self.bets_count,
            PolpickError::InvalidSettlementAccounts
        );

        let paid_out = self
            .paid_out
            .checked_add(paid)
            .ok_or(PolpickError::MathOverflow)?;
        require!(
            paid_out <= self.total_staked()?,
            PolpickError::MathOverflow
        );

        self.paid_out = paid_out;
        self.settle_cursor = batch_end;
        if self.settle_cursor == self.bets_count {
            self.status = PoolStatus::Resolved;
            return Ok(true);
        }
        Ok(false)
    }

    /// Fee plus rounding dust left in escrow after every payout.
    pub fn residual(&self) -> Result<u64> {
        self.total_staked()?
            .checked_sub(self.paid_out)
            .ok_or_else(|| error!(PolpickError::MathOverflow))
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            pool_id: self.pool_id,
            created: self.created,
            min_bet_amount: self.min_bet_amount,
            max_bet_amount: self.max_bet_amount,
            pool_bets_limit: self.pool_bets_limit,
            status: self.status,
            start_price: self.start_price,
            round_start_time: self.round_start_time,
            up_bet_group: self.up_bet_group,
            down_bet_group: self.down_bet_group,
            bets_count: self.bets_count,
            end_price: self.end_price,
            outcome: self.outcome,
            fee_amount: self.fee_amount,
            paid_out: self.paid_out,
        }
    }
}

#[account]
#[derive(InitSpace)]
pub struct Bet {
    pub pool: Pubkey,
    pub bettor: Pubkey,
    pub index: u32,
    pub side: Side,
    pub amount: u64,
    pub metadata: BetMetadata,
    pub placed_at: i64,
    pub settled: bool,
    pub payout: u64,
    pub bump: u8,
}

// === Types ===

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, InitSpace)]
pub enum Side {
    Up,
    Down,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Up => Side::Down,
            Side::Down => Side::Up,
        }
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, InitSpace)]
pub enum TiePolicy {
    /// Every stake is returned, no fee.
    Push,
    /// Every stake goes to the controller.
    HouseWins,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, InitSpace)]
pub enum PoolStatus {
    Open,
    Triggered,
    Settling,
    Resolved,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, InitSpace)]
pub enum RoundOutcome {
    Undecided,
    Up,
    Down,
    Push,
    HouseWins,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, Default, InitSpace)]
pub struct BetGroup {
    pub total: u64,
    pub count: u32,
}

impl BetGroup {
    pub fn with_stake(&self, amount: u64) -> Result<Self> {
        Ok(Self {
            total: self
                .total
                .checked_add(amount)
                .ok_or(PolpickError::MathOverflow)?,
            count: self
                .count
                .checked_add(1)
                .ok_or(PolpickError::MathOverflow)?,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PoolLimits {
    pub min_bet_amount: u64,
    pub max_bet_amount: u64,
    pub pool_bets_limit: u32,
}

impl PoolLimits {
    pub fn validate(&self) -> Result<()> {
        require!(
            self.min_bet_amount > 0 && self.min_bet_amount <= self.max_bet_amount,
            PolpickError::InvalidBetRange
        );
        require!(self.pool_bets_limit >= 1, PolpickError::InvalidLimit);
        Ok(())
    }
}

/// Off-chain attribution carried with a bet. Never used in settlement.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq, InitSpace)]
pub struct BetMetadata {
    #[max_len(128)]
    pub avatar_url: String,
    #[max_len(8)]
    pub country_code: String,
    #[max_len(32)]
    pub white_label_id: String,
    #[max_len(32)]
    pub game_id: String,
}

impl BetMetadata {
    pub fn validate(&self) -> Result<()> {
        require!(
            self.avatar_url.len() <= MAX_AVATAR_URL_LEN
                && self.country_code.len() <= MAX_COUNTRY_CODE_LEN
                && self.white_label_id.len() <= MAX_TAG_LEN
                && self.game_id.len() <= MAX_TAG_LEN,
            PolpickError::MetadataTooLong
        );
        Ok(())
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub pool_id: [u8; 32],
    pub created: bool,
    pub min_bet_amount: u64,
    pub max_bet_amount: u64,
    pub pool_bets_limit: u32,
    pub status: PoolStatus,
    pub start_price: u64,
    pub round_start_time: i64,
    pub up_bet_group: BetGroup,
    pub down_bet_group: BetGroup,
    pub bets_count: u32,
    pub end_price: u64,
    pub outcome: RoundOutcome,
    pub fee_amount: u64,
    pub paid_out: u64,
}

// === Events ===

#[event]
pub struct GameInitialized {
    pub game: Pubkey,
    pub controller: Pubkey,
    pub fee_bps: u16,
    pub tie_policy: TiePolicy,
}

#[event]
pub struct ConfigUpdated {
    pub game: Pubkey,
    pub fee_bps: u16,
    pub tie_policy: TiePolicy,
}

#[event]
pub struct GameStateChanged {
    pub game: Pubkey,
    pub is_running: bool,
}

#[event]
pub struct PoolCreated {
    pub game: Pubkey,
    pub pool: Pubkey,
    pub pool_id: [u8; 32],
    pub min_bet_amount: u64,
    pub max_bet_amount: u64,
    pub pool_bets_limit: u32,
}

#[event]
pub struct TradePlaced {
    pub pool: Pubkey,
    pub pool_id: [u8; 32],
    pub bettor: Pubkey,
    pub bet_index: u32,
    pub side: Side,
    pub amount: u64,
    pub up_total: u64,
    pub down_total: u64,
    pub avatar_url: String,
    pub country_code: String,
    pub white_label_id: String,
    pub game_id: String,
}

#[event]
pub struct RoundTriggered {
    pub pool: Pubkey,
    pub pool_id: [u8; 32],
    pub start_price: u64,
    pub round_start_time: i64,
    pub batch_size: u16,
}

#[event]
pub struct RoundResolved {
    pub pool: Pubkey,
    pub pool_id: [u8; 32],
    pub end_price: u64,
    pub round_end_time: i64,
    pub outcome: RoundOutcome,
    pub fee_amount: u64,
}

#[event]
pub struct BetSettled {
    pub pool: Pubkey,
    pub bet_index: u32,
    pub bettor: Pubkey,
    pub side: Side,
    pub amount: u64,
    pub payout: u64,
}

#[event]
pub struct PoolSettled {
    pub pool: Pubkey,
    pub pool_id: [u8; 32],
    pub paid_out: u64,
    pub residual: u64,
}

// === Errors ===

#[error_code]
pub enum PolpickError {
    #[msg("Only game controller can do this")]
    Unauthorized,
    #[msg("Game is not running")]
    GameNotRunning,
    #[msg("Pool does not exist")]
    PoolNotFound,
    #[msg("Pool already exists")]
    PoolAlreadyExists,
    #[msg("Min bet must be positive and not exceed max bet")]
    InvalidBetRange,
    #[msg("Pool bets limit must be at least 1")]
    InvalidLimit,
    #[msg("Bet is below minimum")]
    BetTooSmall,
    #[msg("Bet exceeds maximum")]
    BetTooLarge,
    #[msg("Pool bets limit reached")]
    PoolBetLimitReached,
    #[msg("Round already triggered")]
    AlreadyTriggered,
    #[msg("Pool is not open for bets")]
    PoolNotOpen,
    #[msg("Settlement batch size must be at least 1")]
    InvalidBatchSize,
    #[msg("Round has not been triggered")]
    RoundNotTriggered,
    #[msg("Round already resolved")]
    AlreadyResolved,
    #[msg("Round is not awaiting settlement")]
    RoundNotResolved,
    #[msg("Settlement accounts do not match the next batch")]
    InvalidSettlementAccounts,
    #[msg("Bet metadata field too long")]
    MetadataTooLong,
    #[msg("Fee cannot exceed 10%")]
    FeeTooHigh,
    #[msg("Math overflow")]
    MathOverflow,
    #[msg("Bet index does not match the pool's bet count")]
    BetIndexMismatch,
}
