mod common;

use common::*;
use pharos_swapper::actions::{fetch_balances, SwapAction, SwapOutcome};
use pharos_swapper::assets::SwapPair;
use pharos_swapper::chain::{SwapRequest, TxOp};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::time::Instant;

fn swaps_sent(chain: &MockChain) -> u64 {
    chain.sent().iter().filter(|op| matches!(op, TxOp::Swap(_))).count() as u64
}

fn wrap_legs_sent(chain: &MockChain) -> bool {
    chain
        .sent()
        .iter()
        .any(|op| matches!(op, TxOp::Wrap { .. } | TxOp::Unwrap { .. }))
}

#[tokio::test]
async fn native_only_wallet_wraps_then_fails_every_route() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), 1);
    let chain = Arc::new(MockChain::with_native(ether(1)));
    chain.fail_router(ZENITH);
    chain.fail_router(FAROSWAP);
    let key = identity(1);

    ctx.stats.init(key.secret(), "0xfeed").await.unwrap();
    ctx.stats.ensure_targets(key.secret(), 5, 5).await.unwrap();

    let balances = fetch_balances(chain.as_ref(), &ctx.assets, ctx.executor.rpc_retry())
        .await
        .unwrap();
    let outcome = SwapAction::new(&ctx, chain.as_ref(), key.secret(), None)
        .run(&balances)
        .await
        .unwrap();

    match outcome {
        SwapOutcome::RoutesExhausted { pair } => assert_eq!(pair.from, "PHRS"),
        other => panic!("unexpected outcome {:?}", other),
    }

    // the wrap leg landed and stayed; only approvals followed it
    let sent = chain.sent();
    assert!(matches!(sent[0], TxOp::Wrap { .. }));
    assert!(sent[1..].iter().all(|op| matches!(op, TxOp::Approve { .. })));
    assert!(!chain.token(WPHRS).is_zero());
    assert!(chain.native() < ether(1));

    // two routers × two fee tiers
    assert_eq!(chain.swap_estimates.lock().unwrap().len(), 4);

    let record = ctx.stats.get_stats(key.secret()).await.unwrap().unwrap();
    assert_eq!(record.swaps.total, 0);
}

#[tokio::test]
async fn router_is_banned_after_threshold_cycles() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), 3);
    let chain = Arc::new(MockChain::default());
    chain.set_token(USDC, 100_000_000u64.into());
    chain.fail_router(ZENITH);

    let pair = SwapPair::new("USDC", "USDT");
    let client = chain.as_ref();
    let executor = &ctx.executor;

    for cycle in 1..=4 {
        chain.swap_estimates.lock().unwrap().clear();
        let result = ctx
            .selector
            .swap(&pair, Some("Zenith"), |router, fee| async move {
                let op = TxOp::Swap(SwapRequest {
                    router: router.address,
                    token_in: addr(USDC),
                    token_out: addr(USDT),
                    fee,
                    amount_in: 1_000u64.into(),
                });
                executor.submit(client, &op).await
            })
            .await
            .unwrap();
        assert_eq!(result.router.name, "Faroswap");

        let tried: HashSet<_> = chain
            .swap_estimates
            .lock()
            .unwrap()
            .iter()
            .map(|(router, _)| *router)
            .collect();
        assert_eq!(tried.contains(&addr(ZENITH)), cycle <= 3, "cycle {}", cycle);
        assert_eq!(ctx.selector.is_banned(&pair, "Zenith"), cycle >= 3, "cycle {}", cycle);
    }

    // other pairs still go through Zenith first
    let order = ctx
        .selector
        .attempt_order(&SwapPair::new("USDC", "WPHRS"), Some("Zenith"));
    assert_eq!(order[0].name, "Zenith");
}

#[tokio::test]
async fn token_to_native_unwraps_the_received_amount() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), 1);
    let chain = Arc::new(MockChain::default());
    // no native balance, so every candidate starts from USDC or WPHRS
    chain.set_token(USDC, 50_000_000u64.into());
    chain.set_token(WPHRS, ether(2));
    let key = identity(2);
    ctx.stats.init(key.secret(), "0xfeed").await.unwrap();
    ctx.stats.ensure_targets(key.secret(), 5, 5).await.unwrap();

    // repeat until the random pick lands on USDC→PHRS
    for _ in 0..200 {
        let before_sent = chain.sent().len();
        let balances = fetch_balances(chain.as_ref(), &ctx.assets, ctx.executor.rpc_retry())
            .await
            .unwrap();
        let outcome = SwapAction::new(&ctx, chain.as_ref(), key.secret(), Some("Faroswap"))
            .run(&balances)
            .await
            .unwrap();

        if let SwapOutcome::Swapped { pair, router } = outcome {
            assert_eq!(router, "Faroswap");
            if pair.to == "PHRS" {
                let sent = chain.sent();
                let swap = sent[before_sent..]
                    .iter()
                    .find_map(|op| match op {
                        TxOp::Swap(req) => Some(req.clone()),
                        _ => None,
                    })
                    .unwrap();
                let unwrap = sent.last().unwrap();
                assert_eq!(
                    *unwrap,
                    TxOp::Unwrap {
                        wrapped: addr(WPHRS),
                        amount: swap.amount_in
                    }
                );
                return;
            }
        }
    }
    panic!("USDC→PHRS never picked");
}

#[tokio::test]
async fn successful_swap_is_recorded_against_winning_router() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), 1);
    let chain = Arc::new(MockChain::default());
    chain.set_token(USDT, 80_000_000u64.into());
    chain.fail_router(ZENITH);
    let key = identity(3);
    ctx.stats.init(key.secret(), "0xfeed").await.unwrap();
    ctx.stats.ensure_targets(key.secret(), 5, 5).await.unwrap();

    let balances = fetch_balances(chain.as_ref(), &ctx.assets, ctx.executor.rpc_retry())
        .await
        .unwrap();
    let outcome = SwapAction::new(&ctx, chain.as_ref(), key.secret(), Some("Zenith"))
        .run(&balances)
        .await
        .unwrap();
    assert!(matches!(outcome, SwapOutcome::Swapped { ref router, .. } if router == "Faroswap"));

    let record = ctx.stats.get_stats(key.secret()).await.unwrap().unwrap();
    assert_eq!(record.swaps.total, 1);
    assert_eq!(record.swaps.get("Faroswap"), 1);
    assert_eq!(record.swaps.get("Zenith"), 0);

    // the router was approved once before the swap
    assert!(chain
        .sent()
        .iter()
        .any(|op| matches!(op, TxOp::Approve { spender, .. } if *spender == addr(FAROSWAP))));
}

#[tokio::test]
async fn empty_wallet_is_a_no_op() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), 1);
    let chain = Arc::new(MockChain::default());
    let key = identity(4);

    let balances = fetch_balances(chain.as_ref(), &ctx.assets, ctx.executor.rpc_retry())
        .await
        .unwrap();
    let outcome = SwapAction::new(&ctx, chain.as_ref(), key.secret(), None)
        .run(&balances)
        .await
        .unwrap();

    assert_eq!(outcome, SwapOutcome::NoCandidate);
    assert!(chain.sent().is_empty());
}

#[tokio::test]
async fn landed_swap_counts_when_wrapped_balance_is_unreadable() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), 1);
    let chain = Arc::new(MockChain::default());
    chain.set_token(USDC, 50_000_000u64.into());
    let flaky = FlakyWrappedReads::new(chain.clone());
    let key = identity(5);
    ctx.stats.init(key.secret(), "0xfeed").await.unwrap();
    ctx.stats.ensure_targets(key.secret(), 5, 5).await.unwrap();

    for _ in 0..200 {
        let balances = fetch_balances(chain.as_ref(), &ctx.assets, ctx.executor.rpc_retry())
            .await
            .unwrap();
        flaky.arm();
        let outcome = SwapAction::new(&ctx, &flaky, key.secret(), Some("Faroswap"))
            .run(&balances)
            .await
            .unwrap();

        let record = ctx.stats.get_stats(key.secret()).await.unwrap().unwrap();
        assert_eq!(record.swaps.total, swaps_sent(&chain));

        if let SwapOutcome::Swapped { pair, .. } = outcome {
            if pair.to == "PHRS" {
                assert!(!wrap_legs_sent(&chain));
                return;
            }
        }
    }
    panic!("no swap into PHRS was picked");
}

#[tokio::test]
async fn failed_unwrap_still_counts_the_swap() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), 1);
    let chain = Arc::new(MockChain::default());
    chain.set_token(USDC, 50_000_000u64.into());
    chain.fail_unwraps();
    let key = identity(6);
    ctx.stats.init(key.secret(), "0xfeed").await.unwrap();
    ctx.stats.ensure_targets(key.secret(), 5, 5).await.unwrap();

    for _ in 0..200 {
        let balances = fetch_balances(chain.as_ref(), &ctx.assets, ctx.executor.rpc_retry())
            .await
            .unwrap();
        let outcome = SwapAction::new(&ctx, chain.as_ref(), key.secret(), Some("Faroswap"))
            .run(&balances)
            .await
            .unwrap();

        if let SwapOutcome::Swapped { pair, .. } = outcome {
            if pair.to == "PHRS" {
                let record = ctx.stats.get_stats(key.secret()).await.unwrap().unwrap();
                assert_eq!(record.swaps.total, swaps_sent(&chain));
                assert!(!wrap_legs_sent(&chain));
                assert!(!chain.token(WPHRS).is_zero());
                return;
            }
        }
    }
    panic!("no swap into PHRS was picked");
}

#[tokio::test]
async fn stables_only_mode_keeps_native_pairs_without_wrap_legs() {
    let dir = tempdir().unwrap();
    let ctx = context_from(&format!("mode = 2\n{}", config_toml(dir.path(), 1)));
    let chain = Arc::new(MockChain::with_native(ether(1)));
    chain.set_token(WPHRS, ether(5));
    chain.set_token(USDC, 50_000_000u64.into());
    let key = identity(7);
    ctx.stats.init(key.secret(), "0xfeed").await.unwrap();
    ctx.stats.ensure_targets(key.secret(), 5, 5).await.unwrap();

    let (mut from_native, mut to_native) = (false, false);
    for _ in 0..200 {
        let balances = fetch_balances(chain.as_ref(), &ctx.assets, ctx.executor.rpc_retry())
            .await
            .unwrap();
        let before = chain.sent().len();
        let outcome = SwapAction::new(&ctx, chain.as_ref(), key.secret(), None)
            .run(&balances)
            .await
            .unwrap();

        if let SwapOutcome::Swapped { pair, .. } = outcome {
            let sent = chain.sent();
            let swap = sent[before..]
                .iter()
                .find_map(|op| match op {
                    TxOp::Swap(req) => Some(req.clone()),
                    _ => None,
                })
                .unwrap();
            if pair.from == "PHRS" {
                assert_eq!(swap.token_in, addr(WPHRS));
                from_native = true;
            }
            if pair.to == "PHRS" {
                assert_eq!(swap.token_out, addr(WPHRS));
                to_native = true;
            }
        }
        if from_native && to_native {
            break;
        }
    }

    assert!(from_native && to_native);
    assert!(!wrap_legs_sent(&chain));
    assert_eq!(chain.native(), ether(1));
}

#[tokio::test(start_paused = true)]
async fn approval_rides_in_the_swap_slot() {
    let dir = tempdir().unwrap();
    let toml = config_toml(dir.path(), 1)
        .replace("global_gap_min_sec = 0", "global_gap_min_sec = 10")
        .replace("global_gap_max_sec = 0", "global_gap_max_sec = 10");
    let ctx = context_from(&toml);
    let chain = Arc::new(MockChain::default());
    chain.set_token(USDC, 50_000_000u64.into());
    let key = identity(8);
    ctx.stats.init(key.secret(), "0xfeed").await.unwrap();
    ctx.stats.ensure_targets(key.secret(), 5, 5).await.unwrap();

    let balances = fetch_balances(chain.as_ref(), &ctx.assets, ctx.executor.rpc_retry())
        .await
        .unwrap();
    let started = Instant::now();
    let outcome = SwapAction::new(&ctx, chain.as_ref(), key.secret(), Some("Faroswap"))
        .run(&balances)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(matches!(outcome, SwapOutcome::Swapped { .. }));
    let sent = chain.sent();
    assert!(matches!(sent[0], TxOp::Approve { .. }));
    // every gated tx after the first waits one 10 s gap; the approval takes none
    let gated = sent
        .iter()
        .filter(|op| !matches!(op, TxOp::Approve { .. }))
        .count() as u64;
    assert_eq!(elapsed.as_secs(), 10 * (gated - 1));
    assert!(elapsed < Duration::from_secs(10 * gated));
}
