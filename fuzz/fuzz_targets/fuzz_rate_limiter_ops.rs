// Copyright (c) 2026 Amunchain
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use omnisupply::core::{
    security::rate_limiter::{OperationType, RateLimitConfig, RateLimiter},
    types::Address,
};

#[derive(Debug, Arbitrary)]
enum Op {
    Consume { account: u8, amount: u32, advance: u16 },
    RefundLast,
}

fuzz_target!(|ops: Vec<Op>| {
    let cfg = RateLimitConfig {
        window_secs: 60,
        max_amount_per_window: 1_000_000,
        max_tx_per_window: 5,
        global_daily_cap: 10_000_000,
    };
    let Ok(limiter) = RateLimiter::new(Address::from_low_u64(1), cfg.clone()) else {
        return;
    };
    let mut now = 1_000u64;
    let mut last = None;
    for op in ops {
        match op {
            Op::Consume { account, amount, advance } => {
                now += u64::from(advance);
                let who = Address::from_low_u64(u64::from(account) + 2);
                let consumed =
                    limiter.check_and_consume(who, OperationType::Bridge, u128::from(amount), now);
                if let Ok(c) = consumed {
                    last = Some(c);
                }
                let rem = limiter
                    .remaining_capacity(who, OperationType::Bridge, now)
                    .expect("limiter state");
                assert!(rem.amount <= cfg.max_amount_per_window);
                assert!(rem.transactions <= cfg.max_tx_per_window);
                assert!(rem.global_amount <= cfg.global_daily_cap);
            }
            Op::RefundLast => {
                if let Some(c) = last.take() {
                    let _ = limiter.refund(&c);
                }
            }
        }
    }
});
