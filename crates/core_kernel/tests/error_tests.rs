//! Tests for core_kernel error types

use chrono::NaiveDate;
use core_kernel::error::CoreError;
use core_kernel::{Currency, FxError, PortError, RateType};
use rust_decimal_macros::dec;

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Invalid input");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "Invalid input"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_unknown_currency_display() {
    let error = "XXX".parse::<Currency>().unwrap_err();
    assert_eq!(error.to_string(), "Unknown currency code: XXX");
}

#[test]
fn test_unknown_rate_type() {
    let error = "FORWARD".parse::<RateType>().unwrap_err();
    assert!(matches!(error, CoreError::UnknownRateType(ref t) if t == "FORWARD"));
}

#[test]
fn test_fx_error_converts_into_core_error() {
    let fx = FxError::RateNotFound {
        from: Currency::EUR,
        to: Currency::AED,
        date: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        rate_type: RateType::Spot,
    };
    let error: CoreError = fx.into();

    let message = error.to_string();
    assert!(message.contains("EUR"));
    assert!(message.contains("2024-06-30"));
}

#[test]
fn test_invalid_rate_display() {
    let error = FxError::InvalidRate {
        from: Currency::USD,
        to: Currency::AED,
        rate: dec!(-1),
    };
    assert_eq!(error.to_string(), "Invalid rate -1 from USD to AED");
}

mod port_error {
    use super::*;

    #[test]
    fn test_not_found() {
        let error = PortError::not_found("Document", "DOC-1");
        assert!(error.is_not_found());
        assert!(!error.is_transient());
    }

    #[test]
    fn test_connection_is_transient() {
        assert!(PortError::connection("refused").is_transient());
        let timeout = PortError::Timeout {
            operation: "lock_document".into(),
            duration_ms: 5_000,
        };
        assert!(timeout.is_transient());
    }

    #[test]
    fn test_conflict_is_not_transient() {
        let error = PortError::conflict("document:DOC-1 is not locked by this transaction");
        assert!(!error.is_transient());
        assert!(error.to_string().contains("not locked"));
    }

    #[test]
    fn test_port_error_wraps_into_fx_error() {
        let fx: FxError = PortError::internal("boom").into();
        assert!(matches!(fx, FxError::Source(_)));
    }
}
