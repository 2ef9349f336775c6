// Integration tests for types

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn test_market_tags() {
        assert_eq!(MarketKind::DayAhead.tag(), "DA");
        assert_eq!(MarketKind::RealTime.to_string(), "RT");
        assert_eq!(QuantityKind::Price.tag(), "cleared_price");
        assert_eq!(ClearingType::Uncongested.to_string(), "UNCONGESTED");
    }

    #[test]
    fn test_trace_indexing_is_independent_per_axis() {
        let mut trace = IterationTrace::new(2, 3, 5);
        trace.set_price(1, 2, 4, 7.5);
        trace.set_quantity(0, 1, 3, -2.0);
        trace.set_mismatch(1, 4, 0.25);

        assert_eq!(trace.price(1, 2, 4), 7.5);
        assert_eq!(trace.price(0, 2, 4), 0.0);
        assert_eq!(trace.quantity(0, 1, 3), -2.0);
        assert_eq!(trace.mismatch(1, 4), 0.25);
        assert_eq!(trace.mismatch(0, 4), 0.0);
    }

    #[test]
    fn test_trace_rows_truncate_to_columns() {
        let mut trace = IterationTrace::new(2, 2, 10);
        for k in 0..10 {
            trace.set_price(0, 0, k, k as f64);
            trace.set_price(1, 0, k, -(k as f64));
        }

        let rows = trace.price_rows(0, 3);
        assert_eq!(rows, vec![vec![0.0, 1.0, 2.0], vec![0.0, -1.0, -2.0]]);
    }

    #[test]
    fn test_total_quantity_and_max_mismatch() {
        let mut trace = IterationTrace::new(2, 3, 4);
        trace.set_quantity(0, 0, 1, 10.0);
        trace.set_quantity(0, 1, 1, -4.0);
        trace.set_quantity(0, 2, 1, -1.0);
        trace.set_mismatch(0, 2, -0.5);
        trace.set_mismatch(1, 2, 0.75);

        assert_eq!(trace.total_quantity(0, 1), 5.0);
        assert_eq!(trace.max_abs_mismatch(2), 0.75);
    }

    #[test]
    fn test_error_display_carries_counters() {
        let err = GridClearError::ConvergenceFailed { iterations: 1599, backoffs: 11 };
        let text = err.to_string();
        assert!(text.contains("1599"));
        assert!(text.contains("11"));
    }
}
