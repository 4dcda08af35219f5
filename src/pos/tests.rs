use super::*;

fn dec(value: &str) -> Decimal {
    value.parse().expect("valid decimal literal")
}

fn cash(amount: &str, tendered: &str) -> PaymentDraft {
    PaymentDraft {
        method: PaymentMethod::Cash,
        amount: dec(amount),
        tendered: Some(dec(tendered)),
        reference: None,
    }
}

fn card(amount: &str, reference: &str) -> PaymentDraft {
    PaymentDraft {
        method: PaymentMethod::Card,
        amount: dec(amount),
        tendered: None,
        reference: Some(reference.to_string()),
    }
}

#[test]
fn test_split_across_cash_and_card_settles() {
    let mut register = SplitRegister::new(dec("100.00"));

    register.add(cash("40.00", "50.00")).unwrap();
    assert_eq!(register.balance(), dec("60.00"));
    assert!(!register.is_settled());

    register.add(card("60.00", "AUTH-123")).unwrap();
    assert_eq!(register.balance(), dec("0.00"));
    assert!(register.is_settled());
    assert_eq!(register.paid(), dec("100.00"));
}

#[test]
fn test_cash_change_is_computed() {
    let mut register = SplitRegister::new(dec("35.50"));
    let applied = register.add(cash("35.50", "50.00")).unwrap();

    assert_eq!(applied.change_given, Some(dec("14.50")));
    assert!(register.is_settled());
}

#[test]
fn test_cash_requires_sufficient_tendered() {
    let mut register = SplitRegister::new(dec("20.00"));

    assert_eq!(
        register.add(cash("20.00", "15.00")),
        Err(SplitError::InsufficientTendered)
    );
    assert_eq!(
        register.add(PaymentDraft {
            method: PaymentMethod::Cash,
            amount: dec("20.00"),
            tendered: None,
            reference: None,
        }),
        Err(SplitError::InsufficientTendered)
    );
    assert_eq!(register.balance(), dec("20.00"));
}

#[test]
fn test_card_requires_reference() {
    let mut register = SplitRegister::new(dec("20.00"));

    let draft = PaymentDraft {
        method: PaymentMethod::Card,
        amount: dec("20.00"),
        tendered: None,
        reference: Some("   ".to_string()),
    };
    assert_eq!(
        register.add(draft),
        Err(SplitError::MissingReference { method: "CARD" })
    );
}

#[test]
fn test_overpayment_is_rejected() {
    let mut register = SplitRegister::new(dec("50.00"));
    register.add(card("30.00", "AUTH-1")).unwrap();

    assert_eq!(
        register.add(card("25.00", "AUTH-2")),
        Err(SplitError::Overpayment {
            amount: dec("25.00"),
            balance: dec("20.00"),
        })
    );
}

#[test]
fn test_sub_cent_remainder_counts_as_settled() {
    let mut register = SplitRegister::new(dec("10.005"));

    // Total rounds to 10.01; paying 10.01 clears it exactly.
    register.add(card("10.01", "AUTH-1")).unwrap();
    assert!(register.is_settled());
    assert_eq!(register.balance(), dec("0.00"));
}

#[test]
fn test_settled_register_rejects_more_payments() {
    let mut register = SplitRegister::new(dec("10.00"));
    register.add(card("10.00", "AUTH-1")).unwrap();

    assert_eq!(
        register.add(card("1.00", "AUTH-2")),
        Err(SplitError::AlreadySettled)
    );
}

#[test]
fn test_non_positive_amount_is_rejected() {
    let mut register = SplitRegister::new(dec("10.00"));

    assert_eq!(
        register.add(card("0.00", "AUTH-1")),
        Err(SplitError::NonPositiveAmount)
    );
    assert_eq!(
        register.add(card("-5.00", "AUTH-1")),
        Err(SplitError::NonPositiveAmount)
    );
}

#[test]
fn test_quick_fill_halves_odd_balance() {
    let register = SplitRegister::new(dec("100.10"));
    assert_eq!(register.quick_fill(50), dec("50.05"));
}

#[test]
fn test_quick_fill_rounds_half_up() {
    let register = SplitRegister::new(dec("100.01"));
    // 50% of 100.01 = 50.005, rounds away from zero to 50.01.
    assert_eq!(register.quick_fill(50), dec("50.01"));
}

#[test]
fn test_quick_fill_full_balance_and_clamp() {
    let mut register = SplitRegister::new(dec("80.00"));
    register.add(card("30.00", "AUTH-1")).unwrap();

    assert_eq!(register.quick_fill(100), dec("50.00"));
    assert_eq!(register.quick_fill(200), dec("50.00"));
    assert_eq!(register.quick_fill(0), dec("0.00"));
}

#[test]
fn test_with_paid_seeds_partial_payment() {
    let register = SplitRegister::with_paid(dec("120.00"), dec("45.50"));

    assert_eq!(register.balance(), dec("74.50"));
    assert!(!register.is_settled());
}

#[test]
fn test_remove_restores_balance() {
    let mut register = SplitRegister::new(dec("60.00"));
    register.add(card("20.00", "AUTH-1")).unwrap();
    register.add(card("40.00", "AUTH-2")).unwrap();
    assert!(register.is_settled());

    let removed = register.remove(0).unwrap();
    assert_eq!(removed.amount, dec("20.00"));
    assert_eq!(register.balance(), dec("20.00"));
    assert!(register.remove(5).is_none());
}

#[test]
fn test_method_parse_round_trip() {
    for method in [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Transfer,
        PaymentMethod::Mobile,
    ] {
        assert_eq!(PaymentMethod::parse(method.as_str()), Some(method));
    }
    assert_eq!(PaymentMethod::parse("cash"), Some(PaymentMethod::Cash));
    assert_eq!(PaymentMethod::parse("cheque"), None);
}
