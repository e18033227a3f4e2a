//! Property-based tests for remote error normalization

use proptest::prelude::*;
use strand_client::{convert_known_errors, ClientError, ErrorKind, Exhaustion};
use strand_core::{RpcError, StatusCode, StrandError};

fn rpc(code: StatusCode, message: String) -> StrandError {
    StrandError::Rpc(RpcError::new(code, message))
}

proptest! {
    #[test]
    fn props_usage_limit_suffix_is_bandwidth(head in "[ -~]{0,40}") {
        let err = convert_known_errors(
            rpc(StatusCode::ResourceExhausted, format!("{}Exceeded Usage Limit", head)),
            "b",
            "k",
        );
        prop_assert_eq!(err.kind(), ErrorKind::BandwidthLimitExceeded);
        prop_assert!(err.matches(&Exhaustion::BandwidthLimitExceeded));
    }

    #[test]
    fn props_rate_limit_suffix_is_too_many_requests(head in "[ -~]{0,40}") {
        let err = convert_known_errors(
            rpc(StatusCode::ResourceExhausted, format!("{}Too Many Requests", head)),
            "b",
            "k",
        );
        prop_assert_eq!(err.kind(), ErrorKind::TooManyRequests);
        prop_assert!(err.is_rpc(StatusCode::ResourceExhausted));
    }

    #[test]
    fn props_other_exhaustion_messages_stay_wrapped(message in "[a-z ]{0,40}") {
        // lowercase only, so neither suffix can appear
        let err = convert_known_errors(rpc(StatusCode::ResourceExhausted, message), "b", "k");
        prop_assert_eq!(err.kind(), ErrorKind::Other);
        prop_assert!(err.is_rpc(StatusCode::ResourceExhausted));
    }

    #[test]
    fn props_bucket_name_is_recovered_from_message(
        name in "[a-z0-9][a-z0-9.-]{0,30}",
        context in "[a-z]{1,10}",
    ) {
        let err = convert_known_errors(
            rpc(StatusCode::NotFound, format!("bucket not found: {}", name)),
            &context,
            "k",
        );
        prop_assert!(matches!(&err, ClientError::BucketNotFound(b) if *b == name));
    }

    #[test]
    fn props_object_not_found_reports_context_key(
        detail in "[ -~]{0,30}",
        key in "[a-z/]{1,20}",
    ) {
        let err = convert_known_errors(
            rpc(StatusCode::NotFound, format!("object not found{}", detail)),
            "b",
            &key,
        );
        prop_assert!(matches!(&err, ClientError::ObjectNotFound(k) if *k == key));
    }
}
