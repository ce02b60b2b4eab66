//! Property-based tests for the variable expander and stats accumulator.

use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use mcp_stress::stats::{RunStats, StatsEvent};
use mcp_stress::variables::VariableExpander;

fn event_strategy() -> impl Strategy<Value = StatsEvent> {
    prop_oneof![
        (1u64..5000).prop_map(|ms| StatsEvent::Success {
            latency: Duration::from_millis(ms),
        }),
        ("[a-z]{1,6}", prop::option::of(1u64..5000)).prop_map(|(label, ms)| {
            StatsEvent::Failure {
                label,
                latency: ms.map(Duration::from_millis),
            }
        }),
        Just(StatsEvent::SessionCreated),
    ]
}

proptest! {
    #[test]
    fn randint_draws_stay_in_range(min in 0u64..1000, span in 0u64..1000) {
        let max = min + span;
        let expander = VariableExpander::new();
        let template = json!(format!("{{{{random.randint({min},{max})}}}}"));
        let value = expander.expand(&template).unwrap();
        let drawn = value.as_u64().expect("randint resolves to an integer");
        prop_assert!(drawn >= min && drawn <= max, "draw {drawn} outside [{min},{max}]");
    }

    #[test]
    fn counter_is_strictly_sequential(count in 1usize..100) {
        let expander = VariableExpander::new();
        for expected in 1..=count as u64 {
            let value = expander.expand(&json!("{{counter}}")).unwrap();
            prop_assert_eq!(value.as_u64(), Some(expected));
        }
    }

    #[test]
    fn embedded_placeholders_always_yield_strings(
        prefix in "[a-z]{0,8}",
        suffix in "[a-z]{1,8}",
    ) {
        let expander = VariableExpander::new();
        let template = json!(format!("{prefix}{{{{counter}}}}{suffix}"));
        let value = expander.expand(&template).unwrap();
        prop_assert!(value.is_string());
    }

    #[test]
    fn expansion_preserves_array_length_and_map_keys(
        strings in prop::collection::vec("[a-z]{0,12}", 0..20),
    ) {
        let expander = VariableExpander::new();
        let template = json!({
            "items": strings,
            "id": "{{counter}}",
        });
        let expanded = expander.expand(&template).unwrap();
        let object = expanded.as_object().unwrap();
        prop_assert_eq!(object.len(), 2);
        prop_assert_eq!(object["items"].as_array().unwrap().len(), strings.len());
    }

    #[test]
    fn stats_invariants_hold_for_any_event_sequence(
        events in prop::collection::vec(event_strategy(), 0..200),
    ) {
        let mut stats = RunStats::new();
        for event in events {
            stats.apply(event);
        }
        prop_assert_eq!(stats.requests_sent, stats.successes + stats.failures);
        prop_assert!(stats.requests_received <= stats.requests_sent);
        prop_assert_eq!(stats.latencies().len() as u64, stats.requests_received);
        prop_assert_eq!(stats.error_labels().len() as u64, stats.failures);

        let summary = stats.summarize();
        prop_assert_eq!(summary.error_summary.is_some(), stats.failures > 0);
        if let Some(table) = &summary.error_summary {
            prop_assert_eq!(table.values().sum::<u64>(), stats.failures);
        }
    }

    #[test]
    fn summary_mean_is_bounded_by_extremes(
        latencies in prop::collection::vec(0.001f64..10.0, 1..100),
    ) {
        let mut stats = RunStats::new();
        for &latency in &latencies {
            stats.record_success(latency);
        }
        let summary = stats.summarize();
        let times = &summary.response_times;
        prop_assert!(times.min_ms <= times.avg_ms + 1e-9);
        prop_assert!(times.avg_ms <= times.max_ms + 1e-9);
    }
}
