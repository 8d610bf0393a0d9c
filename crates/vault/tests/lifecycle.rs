use {
    num::{BigInt, Signed},
    pool_math::{Bfp, bfp},
    primitive_types::U256,
    std::{sync::Arc, thread},
    testlib::assert_equal_with_error,
    vault::{
        Account,
        Config,
        Error,
        ErrorKind,
        ExitPoolRequest,
        JoinPoolRequest,
        PoolId,
        Token,
        Vault,
        accounting::PoolStatus,
        batch::{BatchSwapStep, SingleSwap, SwapKind},
        clock::ManualClock,
        oracle::{SampleBuffer, Variable},
        pools::{PoolParams, PoolType},
        transfers::{FundManagement, Ledger, MockAssetTransfers, TransferError},
        user_data::{ExitKind, JoinKind},
    },
};

const START: u64 = 1_700_000_000;

struct Setup {
    vault: Vault,
    ledger: Arc<Ledger>,
    clock: Arc<ManualClock>,
}

fn setup(config: Config) -> Setup {
    observe::tracing::initialize_reentrant("warn,vault=debug");
    let ledger = Arc::new(Ledger::new());
    let clock = Arc::new(ManualClock::new(START));
    let vault = Vault::new(config, clock.clone(), ledger.clone()).unwrap();
    Setup {
        vault,
        ledger,
        clock,
    }
}

fn token(id: u64) -> Token {
    Token::from_low_u64_be(0x1000 + id)
}

fn alice() -> Account {
    Account::from_low_u64_be(0xa11ce)
}

fn bob() -> Account {
    Account::from_low_u64_be(0xb0b)
}

fn units(value: u64) -> U256 {
    U256::exp10(18) * value
}

fn fund(ledger: &Ledger, account: Account, tokens: &[Token], amount: U256) {
    for token in tokens {
        ledger.mint(account, *token, amount).unwrap();
    }
}

fn weighted_pool(vault: &Vault, pool_type: PoolType, tokens: [Token; 2]) -> PoolId {
    vault
        .register_pool(
            PoolParams::weighted(
                pool_type,
                tokens.to_vec(),
                vec![bfp!("0.5"), bfp!("0.5")],
                bfp!("0.01"),
            )
            .with_oracle(pool_type == PoolType::WeightedTwoToken),
        )
        .unwrap()
}

fn initialize(vault: &Vault, pool_id: PoolId, amounts: &[U256]) {
    let pool = vault.pool(pool_id).unwrap();
    vault
        .join_pool(
            pool_id,
            alice(),
            alice(),
            JoinPoolRequest {
                assets: pool.tokens().to_vec(),
                max_amounts_in: amounts.to_vec(),
                user_data: JoinKind::Init {
                    amounts_in: amounts.to_vec(),
                }
                .encode(pool.pool_type())
                .unwrap(),
                from_internal_balance: false,
            },
        )
        .unwrap();
}

fn single_swap(pool_id: PoolId, kind: SwapKind, from: Token, to: Token, amount: U256) -> SingleSwap {
    SingleSwap {
        pool_id,
        kind,
        asset_in: from,
        asset_out: to,
        amount,
        user_data: Vec::new(),
    }
}

fn big(value: U256) -> BigInt {
    number::conversions::u256_to_big_int(&value)
}

#[test]
fn weighted_pool_lifecycle() {
    let Setup { vault, ledger, .. } = setup(Config::default());
    let tokens = [token(1), token(2)];
    fund(&ledger, alice(), &tokens, units(1_000));
    let pool_id = weighted_pool(&vault, PoolType::Weighted, tokens);
    assert_eq!(
        vault.pool_status(pool_id).unwrap(),
        PoolStatus::Uninitialized
    );

    initialize(&vault, pool_id, &[units(100), units(200)]);
    assert_eq!(vault.pool_status(pool_id).unwrap(), PoolStatus::Active);
    let supply = U256::from_dec_str("282842712474613352312").unwrap();
    assert_eq!(vault.total_supply(pool_id).unwrap(), supply);
    assert_eq!(
        vault.shares_of(pool_id, alice()).unwrap(),
        supply - 1_000_000
    );
    assert_eq!(ledger.balance_of(alice(), token(1)), units(900));
    assert_eq!(ledger.reserves_of(token(2)), units(200));

    // A second initialization is a state error.
    let err = vault
        .join_pool(
            pool_id,
            alice(),
            alice(),
            JoinPoolRequest {
                assets: tokens.to_vec(),
                max_amounts_in: vec![U256::MAX; 2],
                user_data: JoinKind::Init {
                    amounts_in: vec![units(1), units(1)],
                }
                .encode(PoolType::Weighted)
                .unwrap(),
                from_internal_balance: false,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyInitialized));
    assert_eq!(err.kind(), ErrorKind::State);

    let amount_out = vault
        .swap(
            single_swap(pool_id, SwapKind::GivenIn, token(1), token(2), units(10)),
            FundManagement::external(alice()),
            units(18),
            START,
        )
        .unwrap();
    assert_eq!(
        amount_out,
        U256::from_dec_str("18016378525932666000").unwrap()
    );
    assert_eq!(ledger.balance_of(alice(), token(2)), units(800) + amount_out);

    // Exit everything alice holds into her internal balance.
    let shares = vault.shares_of(pool_id, alice()).unwrap();
    let change = vault
        .exit_pool(
            pool_id,
            alice(),
            alice(),
            ExitPoolRequest {
                assets: tokens.to_vec(),
                min_amounts_out: vec![U256::zero(); 2],
                user_data: ExitKind::ExactSharesInForTokensOut { shares_in: shares }.encode(),
                to_internal_balance: true,
            },
        )
        .unwrap();
    assert_eq!(vault.shares_of(pool_id, alice()).unwrap(), U256::zero());
    assert_eq!(vault.total_supply(pool_id).unwrap(), 1_000_000.into());
    assert_eq!(
        ledger.internal_balance_of(alice(), token(1)),
        change.amounts[0].as_uint256()
    );
    let (_, balances) = vault.get_pool_tokens(pool_id).unwrap();
    assert_eq!(ledger.reserves_of(token(1)), balances[0]);
    assert!(!balances[0].is_zero());
}

#[test]
fn managed_pool_owner_withdraws_management_fee() {
    let Setup { vault, ledger, .. } = setup(Config::default());
    let tokens = [token(1), token(2)];
    fund(&ledger, alice(), &tokens, units(1_000));
    let pool_id = vault
        .register_pool(
            PoolParams::weighted(
                PoolType::Managed,
                tokens.to_vec(),
                vec![bfp!("0.5"), bfp!("0.5")],
                bfp!("0.01"),
            )
            .with_owner(bob())
            .with_management_swap_fee_percentage(bfp!("0.1")),
        )
        .unwrap();
    initialize(&vault, pool_id, &[units(100), units(200)]);
    vault
        .swap(
            single_swap(pool_id, SwapKind::GivenIn, token(1), token(2), units(10)),
            FundManagement::external(alice()),
            U256::zero(),
            START,
        )
        .unwrap();

    let withdraw = |sender: Account| {
        vault.exit_pool(
            pool_id,
            sender,
            sender,
            ExitPoolRequest {
                assets: tokens.to_vec(),
                min_amounts_out: vec![U256::zero(); 2],
                user_data: ExitKind::ManagementFeeTokensOut.encode(),
                to_internal_balance: false,
            },
        )
    };
    let err = withdraw(alice()).unwrap_err();
    assert!(matches!(err, Error::CallerNotOwner));

    let change = withdraw(bob()).unwrap();
    let fee = U256::from_dec_str("12859994866549500").unwrap();
    assert_eq!(change.management_fee_shares.as_uint256(), fee);
    assert_eq!(change.shares.as_uint256(), fee);
    assert_eq!(vault.shares_of(pool_id, bob()).unwrap(), U256::zero());
    for (token, amount) in tokens.iter().zip(&change.amounts) {
        assert!(!amount.is_zero());
        assert_eq!(ledger.balance_of(bob(), *token), amount.as_uint256());
    }
}

#[test]
fn single_swap_limits() {
    let Setup { vault, ledger, .. } = setup(Config::default());
    let tokens = [token(1), token(2)];
    fund(&ledger, alice(), &tokens, units(1_000));
    let pool_id = weighted_pool(&vault, PoolType::Weighted, tokens);
    initialize(&vault, pool_id, &[units(100), units(100)]);
    let before = vault.get_pool_tokens(pool_id).unwrap();

    let err = vault
        .swap(
            single_swap(pool_id, SwapKind::GivenIn, token(1), token(2), units(1)),
            FundManagement::external(alice()),
            units(1),
            START,
        )
        .unwrap_err();
    assert!(matches!(err, Error::SwapLimit));
    assert_eq!(err.kind(), ErrorKind::Limit);

    let err = vault
        .swap(
            single_swap(pool_id, SwapKind::GivenOut, token(1), token(2), units(1)),
            FundManagement::external(alice()),
            units(1),
            START,
        )
        .unwrap_err();
    assert!(matches!(err, Error::SwapLimit));

    let err = vault
        .swap(
            single_swap(pool_id, SwapKind::GivenOut, token(1), token(2), units(1)),
            FundManagement::external(alice()),
            units(2),
            START - 1,
        )
        .unwrap_err();
    assert!(matches!(err, Error::SwapDeadline));
    assert_eq!(vault.get_pool_tokens(pool_id).unwrap(), before);

    let amount_in = vault
        .swap(
            single_swap(pool_id, SwapKind::GivenOut, token(1), token(2), units(1)),
            FundManagement::external(alice()),
            units(2),
            START,
        )
        .unwrap();
    assert!(amount_in > units(1) && amount_in < units(2));
    assert_eq!(ledger.balance_of(alice(), token(1)), units(900) - amount_in);
}

#[test]
fn swap_round_trip_without_fee_returns_the_input() {
    let Setup { vault, ledger, .. } = setup(Config {
        min_swap_fee_percentage: Bfp::zero(),
        ..Default::default()
    });
    let tokens = [token(1), token(2)];
    fund(&ledger, alice(), &tokens, units(1_000));
    let pool_id = vault
        .register_pool(PoolParams::weighted(
            PoolType::Weighted,
            tokens.to_vec(),
            vec![bfp!("0.3"), bfp!("0.7")],
            Bfp::zero(),
        ))
        .unwrap();
    initialize(&vault, pool_id, &[units(100), units(200)]);

    let funds = FundManagement::external(alice());
    let out = vault
        .swap(
            single_swap(pool_id, SwapKind::GivenIn, token(1), token(2), units(10)),
            funds,
            U256::zero(),
            START,
        )
        .unwrap();
    let back = vault
        .swap(
            single_swap(pool_id, SwapKind::GivenIn, token(2), token(1), out),
            funds,
            U256::zero(),
            START,
        )
        .unwrap();
    // Rounding favours the pool, so the trader never gains.
    assert!(back <= units(10));
    assert_eq!(back, U256::from_dec_str("9999999999996666000").unwrap());
    // Each power is widened by 1e-14 relative, amplified by 1 / (1 - base^exp)
    // in the amount out.
    assert_equal_with_error(back, units(10), 1e-12);
}

#[test]
fn batch_swaps_chain_amounts_and_roll_back() {
    let Setup { vault, ledger, .. } = setup(Config::default());
    let assets = [token(1), token(2), token(3)];
    fund(&ledger, alice(), &assets, units(1_000));
    let first = weighted_pool(&vault, PoolType::Weighted, [token(1), token(2)]);
    let second = weighted_pool(&vault, PoolType::Weighted, [token(2), token(3)]);
    initialize(&vault, first, &[units(100), units(100)]);
    initialize(&vault, second, &[units(100), units(100)]);

    let steps = [
        BatchSwapStep {
            pool_id: first,
            asset_in_index: 0,
            asset_out_index: 1,
            amount: units(10),
            user_data: Vec::new(),
        },
        BatchSwapStep {
            pool_id: second,
            asset_in_index: 1,
            asset_out_index: 2,
            amount: U256::zero(),
            user_data: Vec::new(),
        },
    ];
    let funds = FundManagement::external(alice());
    let before = (
        vault.get_pool_tokens(first).unwrap(),
        vault.get_pool_tokens(second).unwrap(),
    );

    let quoted = vault
        .query_batch_swap(SwapKind::GivenIn, &steps, &assets)
        .unwrap();
    assert_eq!(quoted[0], -big(units(10)));
    assert_eq!(quoted[1], BigInt::default());
    assert!(quoted[2].is_positive());

    // Asking for more than the route yields fails as a whole.
    let limits = [-big(units(10)), BigInt::default(), big(units(100))];
    let err = vault
        .batch_swap(SwapKind::GivenIn, &steps, &assets, funds, &limits, START)
        .unwrap_err();
    assert!(matches!(err, Error::SwapLimit));
    assert_eq!(
        (
            vault.get_pool_tokens(first).unwrap(),
            vault.get_pool_tokens(second).unwrap(),
        ),
        before
    );
    assert_eq!(ledger.balance_of(alice(), token(1)), units(900));

    let limits = [-big(units(10)), BigInt::default(), BigInt::default()];
    let deltas = vault
        .batch_swap(SwapKind::GivenIn, &steps, &assets, funds, &limits, START)
        .unwrap();
    assert_eq!(deltas, quoted);
    let received = number::conversions::big_int_to_u256(&deltas[2]).unwrap();
    assert_eq!(ledger.balance_of(alice(), token(3)), units(900) + received);
    assert_eq!(ledger.balance_of(alice(), token(2)), units(800));
    let (_, first_balances) = vault.get_pool_tokens(first).unwrap();
    let (_, second_balances) = vault.get_pool_tokens(second).unwrap();
    assert_eq!(first_balances[0], units(110));
    assert_eq!(first_balances[1] + second_balances[0], units(200));
}

#[test]
fn failed_transfers_roll_back_batches() {
    let mut transfers = MockAssetTransfers::new();
    transfers.expect_settle().returning(|_, incoming, _| {
        // Joins pay in without paying out, swaps do both.
        if incoming.len() == 2 {
            Ok(())
        } else {
            Err(TransferError::InsufficientBalance)
        }
    });
    let clock = Arc::new(ManualClock::new(START));
    let vault = Vault::new(Config::default(), clock, Arc::new(transfers)).unwrap();
    let pool_id = weighted_pool(&vault, PoolType::Weighted, [token(1), token(2)]);
    initialize(&vault, pool_id, &[units(100), units(100)]);
    let before = vault.pool(pool_id).unwrap();

    let err = vault
        .swap(
            single_swap(pool_id, SwapKind::GivenIn, token(1), token(2), units(1)),
            FundManagement::external(alice()),
            U256::zero(),
            START,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Transfer(TransferError::InsufficientBalance)
    ));
    assert_eq!(err.kind(), ErrorKind::Transfer);
    let after = vault.pool(pool_id).unwrap();
    assert_eq!(after.balances(), before.balances());
    assert_eq!(after.snapshot(), before.snapshot());
}

#[test]
fn protocol_fees_are_collected_in_tokens() {
    let Setup { vault, ledger, .. } = setup(Config {
        protocol_swap_fee_percentage: bfp!("0.5"),
        ..Default::default()
    });
    let tokens = [token(1), token(2)];
    fund(&ledger, alice(), &tokens, units(1_000));
    let pool_id = weighted_pool(&vault, PoolType::Weighted, tokens);
    initialize(&vault, pool_id, &[units(100), units(200)]);
    vault
        .swap(
            single_swap(pool_id, SwapKind::GivenIn, token(1), token(2), units(10)),
            FundManagement::external(alice()),
            U256::zero(),
            START,
        )
        .unwrap();
    vault
        .exit_pool(
            pool_id,
            alice(),
            alice(),
            ExitPoolRequest {
                assets: tokens.to_vec(),
                min_amounts_out: vec![U256::zero(); 2],
                user_data: ExitKind::ExactSharesInForTokensOut {
                    shares_in: units(1),
                }
                .encode(),
                to_internal_balance: false,
            },
        )
        .unwrap();

    let collected = vault.collected_protocol_fees();
    let fee = U256::from_dec_str("49999999999999995").unwrap();
    assert_eq!(collected.get(&token(1)), Some(&fee));
    assert_eq!(collected.get(&token(2)), None);
    let (_, balances) = vault.get_pool_tokens(pool_id).unwrap();
    assert_eq!(ledger.reserves_of(token(1)), balances[0] + fee);
    assert_eq!(ledger.reserves_of(token(2)), balances[1]);
}

#[test]
fn stable_pool_lifecycle() {
    let Setup { vault, ledger, .. } = setup(Config::default());
    let tokens = [token(1), token(2), token(3)];
    fund(&ledger, alice(), &tokens, units(1_000));
    fund(&ledger, bob(), &tokens, units(1_000));
    let pool_id = vault
        .register_pool(PoolParams::stable(
            PoolType::Stable,
            tokens.to_vec(),
            200,
            bfp!("0.0004"),
        ))
        .unwrap();
    initialize(&vault, pool_id, &[units(100), units(100), units(100)]);
    // Balanced stable pools have an invariant equal to the sum of balances.
    assert_eq!(vault.total_supply(pool_id).unwrap(), units(300));

    let out = vault
        .swap(
            single_swap(pool_id, SwapKind::GivenIn, token(1), token(3), units(10)),
            FundManagement::external(alice()),
            units(9),
            START,
        )
        .unwrap();
    // Close to one to one near balance.
    assert!(out > bfp!("9.9").as_uint256() && out < units(10));

    vault
        .join_pool(
            pool_id,
            bob(),
            bob(),
            JoinPoolRequest {
                assets: tokens.to_vec(),
                max_amounts_in: vec![units(20); 3],
                user_data: JoinKind::AllTokensInForExactSharesOut {
                    shares_out: units(30),
                }
                .encode(PoolType::Stable)
                .unwrap(),
                from_internal_balance: false,
            },
        )
        .unwrap();
    assert_eq!(vault.shares_of(pool_id, bob()).unwrap(), units(30));

    let err = vault
        .exit_pool(
            pool_id,
            bob(),
            bob(),
            ExitPoolRequest {
                assets: tokens.to_vec(),
                min_amounts_out: vec![units(30), U256::zero(), U256::zero()],
                user_data: ExitKind::ExactSharesInForOneTokenOut {
                    shares_in: units(30),
                    token_index: 0,
                }
                .encode(),
                to_internal_balance: false,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::ExitBelowMin));

    vault
        .exit_pool(
            pool_id,
            bob(),
            bob(),
            ExitPoolRequest {
                assets: tokens.to_vec(),
                min_amounts_out: vec![units(29), U256::zero(), U256::zero()],
                user_data: ExitKind::ExactSharesInForOneTokenOut {
                    shares_in: units(30),
                    token_index: 0,
                }
                .encode(),
                to_internal_balance: false,
            },
        )
        .unwrap();
    assert_eq!(vault.shares_of(pool_id, bob()).unwrap(), U256::zero());
}

#[test]
fn oracle_samples_follow_committed_operations() {
    let Setup {
        vault,
        ledger,
        clock,
    } = setup(Config::default());
    let oracle = Arc::new(SampleBuffer::new(vault.config().oracle.clone()));
    vault.subscribe(oracle.clone());
    let tokens = [token(1), token(2)];
    fund(&ledger, alice(), &tokens, units(1_000));
    let pool_id = weighted_pool(&vault, PoolType::WeightedTwoToken, tokens);
    initialize(&vault, pool_id, &[units(100), units(100)]);
    assert_eq!(oracle.samples(pool_id).len(), 1);

    clock.advance(300);
    vault
        .swap(
            single_swap(pool_id, SwapKind::GivenIn, token(1), token(2), units(10)),
            FundManagement::external(alice()),
            U256::zero(),
            START + 300,
        )
        .unwrap();
    assert_eq!(oracle.samples(pool_id).len(), 2);

    // A rejected swap records nothing.
    vault
        .swap(
            single_swap(pool_id, SwapKind::GivenIn, token(1), token(2), units(10)),
            FundManagement::external(alice()),
            U256::MAX,
            START + 300,
        )
        .unwrap_err();
    assert_eq!(oracle.samples(pool_id).len(), 2);

    let (_, balances) = vault.get_pool_tokens(pool_id).unwrap();
    let spot_price = Bfp::from_wei(balances[0])
        .div_down(Bfp::from_wei(balances[1]))
        .unwrap();
    assert_equal_with_error(
        oracle
            .latest(pool_id, Variable::PairPrice)
            .unwrap()
            .as_uint256(),
        spot_price.as_uint256(),
        0.0005,
    );
    // The price was one for the whole window before the swap.
    let average = oracle
        .time_weighted_average(pool_id, Variable::PairPrice, 300, 0, START + 300)
        .unwrap();
    assert_eq!(average, Bfp::one());
}

#[test]
fn paused_pools_reject_operations_until_the_buffer_period_ends() {
    let Setup {
        vault,
        ledger,
        clock,
    } = setup(Config::default());
    let tokens = [token(1), token(2)];
    fund(&ledger, alice(), &tokens, units(1_000));
    let pool_id = weighted_pool(&vault, PoolType::Weighted, tokens);
    initialize(&vault, pool_id, &[units(100), units(100)]);
    vault.set_paused(pool_id, true).unwrap();

    let swap = || {
        vault.swap(
            single_swap(pool_id, SwapKind::GivenIn, token(1), token(2), units(1)),
            FundManagement::external(alice()),
            U256::zero(),
            u64::MAX,
        )
    };
    assert!(matches!(swap(), Err(Error::Paused)));

    let pause = vault.pool(pool_id).unwrap().pause_state();
    clock.set(pause.buffer_period_end + 1);
    assert_eq!(vault.pool_status(pool_id).unwrap(), PoolStatus::Active);
    swap().unwrap();
    assert!(matches!(
        vault.set_paused(pool_id, true),
        Err(Error::PauseWindowExpired)
    ));
}

#[test]
fn concurrent_swaps_keep_reserves_consistent() {
    let Setup { vault, ledger, .. } = setup(Config::default());
    let assets = [token(1), token(2), token(3)];
    let first = weighted_pool(&vault, PoolType::Weighted, [token(1), token(2)]);
    let second = weighted_pool(&vault, PoolType::Weighted, [token(2), token(3)]);
    fund(&ledger, alice(), &assets, units(1_000));
    initialize(&vault, first, &[units(100), units(100)]);
    initialize(&vault, second, &[units(100), units(100)]);

    let traders: Vec<_> = (0..4).map(|i| Account::from_low_u64_be(0x100 + i)).collect();
    for trader in &traders {
        fund(&ledger, *trader, &assets, units(100));
    }

    thread::scope(|scope| {
        for (i, trader) in traders.iter().enumerate() {
            let vault = &vault;
            scope.spawn(move || {
                let (pool_id, pair) = if i % 2 == 0 {
                    (first, [token(1), token(2)])
                } else {
                    (second, [token(2), token(3)])
                };
                for round in 0..20 {
                    let (from, to) = if round % 2 == 0 {
                        (pair[0], pair[1])
                    } else {
                        (pair[1], pair[0])
                    };
                    vault
                        .swap(
                            single_swap(pool_id, SwapKind::GivenIn, from, to, bfp!("0.5").as_uint256()),
                            FundManagement::external(*trader),
                            U256::zero(),
                            START,
                        )
                        .unwrap();
                }
            });
        }
    });

    let (_, first_balances) = vault.get_pool_tokens(first).unwrap();
    let (_, second_balances) = vault.get_pool_tokens(second).unwrap();
    assert_eq!(ledger.reserves_of(token(1)), first_balances[0]);
    assert_eq!(
        ledger.reserves_of(token(2)),
        first_balances[1] + second_balances[0]
    );
    assert_eq!(ledger.reserves_of(token(3)), second_balances[1]);
}
