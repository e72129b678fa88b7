use chrono::Utc;
use taskpay_ledger::{LedgerEngine, SignupRequest, WithdrawalMethod, WithdrawalOutcome};
use taskpay_types::UsdAmount;

fn signup(name: &str, phone: &str, referred_by: Option<&str>) -> SignupRequest {
    SignupRequest {
        name: name.to_string(),
        email: format!("{}@example.com", name),
        phone: phone.to_string(),
        referred_by: referred_by.map(|s| s.to_string()),
    }
}

/// Ledger conservation: the balance after a mix of approvals, referral
/// credits and withdrawals equals earnings + bonuses - withdrawn gross.
#[tokio::test]
async fn test_ledger_conservation() {
    let engine = LedgerEngine::in_memory();

    println!("\n=== Testing Ledger Conservation ===");

    let referrer = engine
        .signup(signup("xavier", "0711111111", None), Utc::now())
        .await
        .unwrap();
    let worker = engine
        .signup(
            signup("yara", "0722222222", Some(&referrer.referral_code)),
            Utc::now(),
        )
        .await
        .unwrap();
    let user = worker.user_id.clone();

    // Referrer got the $5 signup bonus immediately, before yara did anything
    let r = engine.wallet.get_profile(&referrer.user_id).await.unwrap();
    assert_eq!(r.balance, UsdAmount::from_usd(5.0));
    assert_eq!(r.total_referrals, 1);
    println!("✓ Signup bonus credited to referrer");

    // Approve a known set of task payments
    let payments = [20.0, 25.0, 18.0, 30.0, 22.0];
    for usd in payments {
        engine
            .wallet
            .credit_task_earnings(&user, UsdAmount::from_usd(usd))
            .await
            .unwrap();
    }
    let expected_earned: UsdAmount = payments.iter().map(|u| UsdAmount::from_usd(*u)).sum();
    let profile = engine.wallet.get_profile(&user).await.unwrap();
    assert_eq!(profile.balance, expected_earned);
    assert_eq!(profile.total_earned, expected_earned);
    assert_eq!(profile.approved_tasks, payments.len() as u32);
    println!("✓ Balance equals sum of approved payments");

    // Make the user withdrawal-eligible and pull out a gross amount
    engine
        .wallet
        .update_profile(&user, |p| {
            p.has_done_onboarding_task = true;
            p.approved_tasks = 15;
            Ok(())
        })
        .await
        .unwrap();

    let withdrawn = UsdAmount::from_usd(40.0);
    let outcome = engine
        .withdrawals
        .submit(
            &user,
            withdrawn,
            WithdrawalMethod::MobileMoney {
                phone: "0722222222".to_string(),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, WithdrawalOutcome::Accepted(_)));

    let profile = engine.wallet.get_profile(&user).await.unwrap();
    assert_eq!(profile.balance, expected_earned.checked_sub(withdrawn).unwrap());
    // Lifetime earnings are unaffected by withdrawals
    assert_eq!(profile.total_earned, expected_earned);
    println!("✓ Withdrawal debits exactly the gross amount");

    println!("\n=== Ledger Conservation Holds ===");
}

/// The documented boundary cases: $10.00 gross nets $9.80 (rejected),
/// $10.21 gross nets ≈$10.006 (accepted).
#[tokio::test]
async fn test_withdrawal_floor_boundary() {
    let engine = LedgerEngine::in_memory();
    let profile = engine
        .signup(signup("wendy", "0733333333", None), Utc::now())
        .await
        .unwrap();
    let user = profile.user_id;

    engine
        .wallet
        .update_profile(&user, |p| {
            p.has_done_onboarding_task = true;
            p.approved_tasks = 15;
            p.balance = UsdAmount::from_usd(50.0);
            Ok(())
        })
        .await
        .unwrap();

    let mobile = || WithdrawalMethod::MobileMoney {
        phone: "0733333333".to_string(),
    };

    let outcome = engine
        .withdrawals
        .submit(&user, UsdAmount::from_usd(10.0), mobile(), Utc::now())
        .await
        .unwrap();
    assert!(matches!(outcome, WithdrawalOutcome::Ineligible(_)));
    println!("✓ $10.00 gross (net $9.80) rejected");

    let outcome = engine
        .withdrawals
        .submit(&user, UsdAmount::from_cents(1021), mobile(), Utc::now())
        .await
        .unwrap();
    assert!(matches!(outcome, WithdrawalOutcome::Accepted(_)));
    println!("✓ $10.21 gross (net ≈$10.006) accepted");
}

/// Concurrent submissions race for the same balance; exactly one wins.
#[tokio::test]
async fn test_concurrent_withdrawals_cannot_double_debit() {
    let engine = std::sync::Arc::new(LedgerEngine::in_memory());
    let profile = engine
        .signup(signup("vera", "0744444444", None), Utc::now())
        .await
        .unwrap();
    let user = profile.user_id;

    engine
        .wallet
        .update_profile(&user, |p| {
            p.has_done_onboarding_task = true;
            p.approved_tasks = 15;
            p.balance = UsdAmount::from_usd(20.0);
            Ok(())
        })
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let engine = engine.clone();
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            engine
                .withdrawals
                .submit(
                    &user,
                    UsdAmount::from_usd(15.0),
                    WithdrawalMethod::MobileMoney {
                        phone: "0744444444".to_string(),
                    },
                    Utc::now() + chrono::Duration::milliseconds(i),
                )
                .await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(WithdrawalOutcome::Accepted(_)) => accepted += 1,
            Ok(WithdrawalOutcome::Ineligible(_)) => {}
            Err(_) => {}
        }
    }

    assert_eq!(accepted, 1, "only one $15 withdrawal fits a $20 balance");
    let profile = engine.wallet.get_profile(&user).await.unwrap();
    assert_eq!(profile.balance, UsdAmount::from_usd(5.0));
    println!("✓ One of four racing withdrawals accepted, balance {}", profile.balance);
}

/// Repeated VIP-upgrade notifications credit the referrer exactly once.
#[tokio::test]
async fn test_vip_bonus_once_per_referred_user() {
    let engine = LedgerEngine::in_memory();

    let referrer = engine
        .signup(signup("xavier", "0711111111", None), Utc::now())
        .await
        .unwrap();
    let a = engine
        .signup(
            signup("alice", "0755555555", Some(&referrer.referral_code)),
            Utc::now(),
        )
        .await
        .unwrap();
    let b = engine
        .signup(
            signup("bob", "0766666666", Some(&referrer.referral_code)),
            Utc::now(),
        )
        .await
        .unwrap();

    for _ in 0..5 {
        engine.referrals.record_vip_upgrade(&a).await.unwrap();
    }
    engine.referrals.record_vip_upgrade(&b).await.unwrap();

    let profile = engine.wallet.get_profile(&referrer.user_id).await.unwrap();
    assert_eq!(profile.vip_referrals, 2);
    // 2 signups x $5 + 2 distinct VIP upgrades x $10
    assert_eq!(profile.balance, UsdAmount::from_usd(30.0));
    println!("✓ VIP bonus credited once per referred user");
}
