//! Unit tests for the Identifiers module
//!
//! Tests cover creation, parsing, conversion and display formatting of the
//! ledger identifier types.

use core_kernel::{
    AllocationId, DocumentId, JournalEntryId, JournalLineId, PaymentId, TaxFilingId,
};
use std::collections::HashSet;
use uuid::Uuid;

mod journal_entry_id {
    use super::*;

    #[test]
    fn test_new_generates_unique_ids() {
        let ids: HashSet<JournalEntryId> = (0..100).map(|_| JournalEntryId::new()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_new_ids_are_time_ordered() {
        let first = JournalEntryId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = JournalEntryId::new();
        assert!(first < second);
    }

    #[test]
    fn test_uuid_round_trip() {
        let uuid = Uuid::now_v7();
        let id = JournalEntryId::from_uuid(uuid);
        assert_eq!(*id.as_uuid(), uuid);
        assert_eq!(Uuid::from(id), uuid);
        assert_eq!(JournalEntryId::from(uuid), id);
    }
}

mod display_and_parse {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(JournalEntryId::prefix(), "JE");
        assert_eq!(JournalLineId::prefix(), "JL");
        assert_eq!(DocumentId::prefix(), "DOC");
        assert_eq!(PaymentId::prefix(), "PAY");
        assert_eq!(AllocationId::prefix(), "ALC");
        assert_eq!(TaxFilingId::prefix(), "CTF");
    }

    #[test]
    fn test_display_includes_prefix() {
        let id = PaymentId::new();
        assert_eq!(id.to_string(), format!("PAY-{}", id.as_uuid()));
    }

    #[test]
    fn test_parse_with_and_without_prefix() {
        let id = TaxFilingId::new();
        assert_eq!(id.to_string().parse::<TaxFilingId>().unwrap(), id);
        assert_eq!(id.as_uuid().to_string().parse::<TaxFilingId>().unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("DOC-not-a-uuid".parse::<DocumentId>().is_err());
    }
}

mod serialization {
    use super::*;

    #[test]
    fn test_serializes_as_bare_uuid() {
        let id = DocumentId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));

        let back: DocumentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
