//! Debug assertion macros for translation and adapter invariants.
//!
//! Only active in debug builds; release builds compile them away.

// =============================================================================
// Translation: span count preserved
// =============================================================================

/// Assert that translation neither dropped nor duplicated spans.
///
/// **Invariant**: `input.len() == output.span_count()`
///
/// Used in: `transform::translate()` before returning
macro_rules! debug_assert_span_count_preserved {
    ($input:expr, $output:expr) => {
        debug_assert_eq!(
            $input,
            $output,
            "translation changed the span count: {} in, {} out",
            $input,
            $output
        )
    };
}

// =============================================================================
// Translation: groups are distinct
// =============================================================================

/// Assert that no two groups in a slice have equivalent key fields.
///
/// **Invariant**: `∀ i < j: !same(groups[i].key, groups[j].key)`
///
/// Used in: `transform::translate()` for resource groups and for the scope
/// groups inside each resource group
macro_rules! debug_assert_groups_distinct {
    ($groups:expr, $key:ident, $same:path, $what:literal) => {
        if cfg!(debug_assertions) {
            let groups = &$groups;
            for (i, a) in groups.iter().enumerate() {
                for b in &groups[i + 1..] {
                    debug_assert!(
                        !$same(a.$key, b.$key),
                        "{} grouping produced two equal groups",
                        $what
                    );
                }
            }
        }
    };
}

// =============================================================================
// Adapter: closed flag mirrors the locked state
// =============================================================================

/// Assert that the lock-free `closed` flag agrees with the state it mirrors.
///
/// **Invariant**: `(state == Shutdown) == closed`, observed under the state lock
///
/// Used in: `SpanExporterAdapter::forward()` and
/// `SpanExporterAdapter::shutdown_consumer()` after taking the state lock
macro_rules! debug_assert_closed_flag_matches {
    ($state:expr, $closed:expr) => {
        debug_assert_eq!(
            !$state.is_ready(),
            $closed,
            "closed flag out of sync with adapter state {:?}",
            $state
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_closed_flag_matches;
pub(crate) use debug_assert_groups_distinct;
pub(crate) use debug_assert_span_count_preserved;
