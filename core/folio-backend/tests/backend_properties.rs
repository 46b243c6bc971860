use folio_backend::host::{cms_branch, content_hash, parse_cms_branch};
use folio_backend::{BackendError, RetryConfig};
use proptest::prelude::*;
use std::time::Duration;

fn collection_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,12}"
}

fn entry_path() -> impl Strategy<Value = String> {
    "[a-z0-9_]{1,8}(/[a-z0-9_-]{1,8}){0,3}\\.(md|yml|json)"
}

proptest! {
    #[test]
    fn cms_branches_parse_back(collection in collection_name(), path in entry_path()) {
        let branch = cms_branch(&collection, &path);
        prop_assert_eq!(parse_cms_branch(&branch), Some((collection.as_str(), path.as_str())));

        let qualified = format!("refs/heads/{branch}");
        prop_assert_eq!(parse_cms_branch(&qualified), Some((collection.as_str(), path.as_str())));
    }

    #[test]
    fn other_branches_are_not_cms_branches(name in "[a-z]{1,10}") {
        prop_assert_eq!(parse_cms_branch(&name), None);
    }

    #[test]
    fn content_hash_tracks_content(a in proptest::collection::vec(any::<u8>(), 0..256),
                                   b in proptest::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(content_hash(&a), content_hash(&a.clone()));
        prop_assert_eq!(content_hash(&a) == content_hash(&b), a == b);
    }

    #[test]
    fn backoff_is_capped(attempt in 1u32..40, initial_ms in 1u64..2_000, max_ms in 1u64..60_000) {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(initial_ms))
            .with_max_delay(Duration::from_millis(max_ms));
        let delay = config.delay_for_attempt(attempt);
        prop_assert!(delay.as_secs_f64() <= max_ms as f64 / 1000.0 * 1.25 + 1e-6);

        let steady = config.clone().without_jitter();
        prop_assert!(steady.delay_for_attempt(attempt) <= steady.delay_for_attempt(attempt + 1));
    }

    #[test]
    fn retry_after_never_exceeds_the_cap(secs in 0u64..10_000, max_secs in 1u64..120) {
        let config = RetryConfig::new(5)
            .with_max_delay(Duration::from_secs(max_secs))
            .without_jitter();
        let err = BackendError::RateLimited { retry_after_secs: Some(secs) };
        prop_assert!(config.delay_after(1, &err) <= Duration::from_secs(max_secs));
    }
}

#[test]
fn first_attempt_has_no_delay() {
    assert_eq!(RetryConfig::default().delay_for_attempt(0), Duration::ZERO);
}
