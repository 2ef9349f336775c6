// Integration tests for consensus

#[cfg(test)]
mod tests {
    use crate::*;
    use gridclear_curves::{GeneratorCost, QuadraticCostCurveProvider};
    use gridclear_report::ConvergenceRecorder;
    use gridclear_transport::{PeerReply, ScriptContext, ScriptedFederate};
    use gridclear_types::{ClearingType, GridClearError, MarketKind, MarketState, QuantityKind, RawBid};
    use std::fs;

    /// Hub supplying up to 400 kW between 0 and 1 $/kWh
    fn hub_bid() -> RawBid {
        RawBid::new(vec![0.0, 1.0], vec![0.0, -400.0])
    }

    fn rt_market(bid: RawBid, previous: f64) -> MarketState {
        let mut market = MarketState::new(1, 1);
        market.curve_rt = bid;
        market.cleared_q_rt = previous;
        market
    }

    /// Peer that echoes the hub price and consumes `base - 100·p`
    fn demand_reply(ctx: &ScriptContext<'_>, base: &[f64]) -> Option<PeerReply> {
        let prices = ctx.latest_price?.to_vec();
        let quantities = prices
            .iter()
            .zip(base)
            .map(|(p, d)| -(d - 100.0 * p))
            .collect();
        Some(PeerReply { prices, quantities })
    }

    fn responsive_rt_federate() -> ScriptedFederate {
        ScriptedFederate::new("hub", MarketKind::RealTime, 0.0).with_peer("mg", |ctx| demand_reply(ctx, &[200.0]))
    }

    fn hub_solver(config: SolverConfig) -> ConsensusSolver {
        ConsensusSolver::new(config, AgentConfig::new("hub", &["mg"]).with_hub_bounding(), None).unwrap()
    }

    #[test]
    fn test_converges_against_balancing_peer() {
        let mut fed = ScriptedFederate::new("Sub_1", MarketKind::RealTime, 0.0).with_peer("MG_1", |_| {
            Some(PeerReply {
                prices: vec![0.0],
                quantities: vec![0.0],
            })
        });
        let mut market = rt_market(RawBid::new(vec![0.0, 10.0], vec![0.0, -100.0]), -50.0);
        let solver = ConsensusSolver::new(
            SolverConfig::real_time(),
            AgentConfig::new("Sub_1", &["MG_1"]).with_hub_bounding(),
            None,
        )
        .unwrap();

        let outcome = solver.clear(&mut fed, &mut market, MarketKind::RealTime, 0.0, 300.0).unwrap();

        assert_eq!(outcome.termination, Termination::Converged);
        assert!(outcome.iterations < 1600);
        assert_eq!(outcome.backoffs, 0);
        assert!(outcome.quantity[0].abs() <= 5e-2);
        assert!(outcome.final_mismatch() <= 5e-2);
        assert_eq!(market.trial_clear_type_rt, ClearingType::Uncongested);
    }

    #[test]
    fn test_converges_with_price_responsive_peer() {
        let mut fed = responsive_rt_federate();
        let mut market = rt_market(hub_bid(), 0.0);

        let outcome = hub_solver(SolverConfig::real_time())
            .clear(&mut fed, &mut market, MarketKind::RealTime, 0.0, 300.0)
            .unwrap();

        assert!(outcome.termination.is_converged());
        assert!((outcome.price[0] - 0.4).abs() < 0.01);
        assert!((outcome.quantity[0] + 160.0).abs() < 1.0);
        assert_eq!(market.pwclear_rt, outcome.price[0]);
    }

    #[test]
    fn test_mismatch_trend_does_not_grow() {
        let mut fed = responsive_rt_federate();
        let mut market = rt_market(hub_bid(), 0.0);

        let outcome = hub_solver(SolverConfig::real_time())
            .clear(&mut fed, &mut market, MarketKind::RealTime, 0.0, 300.0)
            .unwrap();

        let mismatch: Vec<f64> = (0..=outcome.iterations)
            .map(|k| outcome.trace.mismatch(0, k).abs())
            .collect();
        let windows: Vec<f64> = mismatch
            .chunks_exact(50)
            .map(|w| w.iter().sum::<f64>() / 50.0)
            .collect();
        assert!(windows.len() >= 2);
        for pair in windows.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-6, "rolling mismatch grew: {windows:?}");
        }
    }

    #[test]
    fn test_local_estimate_stays_on_curve() {
        let mut fed = responsive_rt_federate();
        let mut market = rt_market(hub_bid(), 0.0);

        let outcome = hub_solver(SolverConfig::real_time())
            .clear(&mut fed, &mut market, MarketKind::RealTime, 0.0, 300.0)
            .unwrap();

        for k in 0..=outcome.iterations {
            let q = outcome.trace.quantity(0, 0, k);
            let p = outcome.trace.price(0, 0, k);
            assert!((0.0..=400.0).contains(&q), "quantity {q} at {k}");
            assert!((0.0..=1.0).contains(&p), "price {p} at {k}");
        }
    }

    #[test]
    fn test_mismatch_uses_quantities_before_update() {
        let mut fed = responsive_rt_federate();
        let mut market = rt_market(hub_bid(), 0.0);
        market.uncontrolled_demand_rt = 40.0;

        let outcome = hub_solver(SolverConfig::real_time())
            .clear(&mut fed, &mut market, MarketKind::RealTime, 0.0, 300.0)
            .unwrap();

        let trace = &outcome.trace;
        let demand = 40.0;
        let mut differs_after_update = false;
        for k in 0..outcome.iterations {
            let before: f64 = (0..2).map(|a| trace.quantity(0, a, k)).sum();
            let after: f64 = (0..2).map(|a| trace.quantity(0, a, k + 1)).sum();
            assert!(
                (trace.mismatch(0, k + 1) - (demand - before)).abs() < 1e-9,
                "mismatch at {} not taken from column {k}",
                k + 1
            );
            if ((demand - after) - (demand - before)).abs() > 1e-6 {
                differs_after_update = true;
            }
        }
        assert!(differs_after_update);
        assert!((trace.mismatch(0, 0) - (demand - trace.total_quantity(0, 0))).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_peer_value_is_treated_as_stale() {
        let mut fed = ScriptedFederate::new("hub", MarketKind::RealTime, 0.0).with_peer("mg", |ctx| {
            let mut reply = demand_reply(ctx, &[200.0])?;
            if ctx.grant == 5 {
                reply.quantities = vec![f64::NAN];
            }
            Some(reply)
        });
        let mut market = rt_market(hub_bid(), 0.0);

        let outcome = hub_solver(SolverConfig::real_time())
            .clear(&mut fed, &mut market, MarketKind::RealTime, 0.0, 300.0)
            .unwrap();

        let trace = &outcome.trace;
        // the reply sent on grant 5 is collected at iteration 4
        assert_eq!(trace.quantity(0, 1, 4), trace.quantity(0, 1, 3));
        assert_ne!(trace.price(0, 1, 4), trace.price(0, 1, 3));
        for k in 0..=outcome.iterations {
            assert!(trace.mismatch(0, k).is_finite(), "mismatch at {k}");
            assert!(trace.price(0, 0, k).is_finite(), "price at {k}");
        }
        assert!(outcome.termination.is_converged());
        assert_eq!(outcome.backoffs, 0);
        assert!((outcome.price[0] - 0.4).abs() < 0.01);
    }

    #[test]
    fn test_silent_peer_is_pinned_in_real_time() {
        let mut fed = ScriptedFederate::new("hub", MarketKind::RealTime, 0.0).with_peer("mg", |ctx| {
            if (3..=7).contains(&ctx.grant) {
                return None;
            }
            demand_reply(ctx, &[200.0])
        });
        let mut market = rt_market(hub_bid(), 0.0);

        let outcome = hub_solver(SolverConfig::real_time())
            .clear(&mut fed, &mut market, MarketKind::RealTime, 0.0, 300.0)
            .unwrap();

        let trace = &outcome.trace;
        assert!(outcome.iterations > 7);
        for k in 2..=6 {
            assert_eq!(trace.quantity(0, 1, k), trace.quantity(0, 1, 1));
            assert_eq!(trace.price(0, 1, k), trace.price(0, 1, 1));
        }
        assert_ne!(trace.quantity(0, 1, 7), trace.quantity(0, 1, 1));
        assert_ne!(trace.quantity(0, 1, 1), 0.0);
    }

    #[test]
    fn test_zero_fill_reads_silent_price_as_zero() {
        let mut fed = ScriptedFederate::new("hub", MarketKind::DayAhead, 0.0).with_peer("mg", |ctx| {
            if ctx.grant == 2 {
                return None;
            }
            demand_reply(ctx, &[200.0, 100.0])
        });
        let mut market = MarketState::new(2, 2);
        market.curve_da = vec![hub_bid(), hub_bid()];
        market.cleared_q_da = vec![-100.0, -100.0];

        let outcome = hub_solver(SolverConfig::day_ahead())
            .clear(&mut fed, &mut market, MarketKind::DayAhead, 0.0, 0.05)
            .unwrap();

        let trace = &outcome.trace;
        for slot in 0..2 {
            assert!((trace.price(slot, 1, 0) - 0.25).abs() < 1e-9);
            assert_eq!(trace.price(slot, 1, 1), 0.0);
            assert_eq!(trace.quantity(slot, 1, 1), trace.quantity(slot, 1, 0));
            assert_ne!(trace.price(slot, 1, 2), 0.0);
        }
    }

    #[test]
    fn test_backoff_exhaustion_logs_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut fed = ScriptedFederate::new("hub", MarketKind::RealTime, 0.0).with_peer("mg", |_| {
            Some(PeerReply {
                prices: vec![0.0],
                quantities: vec![-1000.0],
            })
        });
        let mut market = rt_market(RawBid::new(vec![0.0, 1.0], vec![0.0, -100.0]), 0.0);
        let config = SolverConfig {
            iter_max: 5,
            gamma_max: 2,
            ..SolverConfig::real_time()
        };
        let solver = ConsensusSolver::new(
            config,
            AgentConfig::new("hub", &["mg"]),
            Some(ConvergenceRecorder::in_dir(dir.path())),
        )
        .unwrap();

        let outcome = solver.clear(&mut fed, &mut market, MarketKind::RealTime, 0.0, 300.0).unwrap();

        assert_eq!(outcome.termination, Termination::BackoffExhausted);
        assert_eq!(outcome.iterations, 4);
        assert_eq!(outcome.backoffs, 3);
        assert_eq!(outcome.granted, 300.0);
        assert_eq!(market.trial_cleared_quantity_rt, -outcome.trace.quantity(0, 0, 4));

        let log = fs::read_to_string(dir.path().join("Consensus_reports.txt")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("iteration 4"));
        assert!(lines[0].contains("backoffs 3"));

        assert!(dir.path().join("convergence/hub_lamda_RT_300.csv").exists());
        assert!(dir.path().join("convergence/hub_PG_RT_300.csv").exists());
        assert!(outcome.report.is_some());
    }

    #[test]
    fn test_day_ahead_sign_flip_and_window_tiling() {
        let mut fed = ScriptedFederate::new("hub", MarketKind::DayAhead, 0.0)
            .with_peer("mg", |ctx| demand_reply(ctx, &[200.0, 100.0]));
        let mut market = MarketState::new(2, 4);
        market.curve_da = vec![hub_bid(), hub_bid()];

        let outcome = hub_solver(SolverConfig::day_ahead())
            .clear(&mut fed, &mut market, MarketKind::DayAhead, 0.0, 3600.0)
            .unwrap();

        assert!(outcome.termination.is_converged());
        let k = outcome.iterations;
        let q0 = -outcome.trace.quantity(0, 0, k);
        let q1 = -outcome.trace.quantity(1, 0, k);
        assert_eq!(outcome.quantity, vec![q0, q1]);
        assert_eq!(market.trial_cleared_quantity_da, vec![q0, q1, q0, q1]);
        assert_eq!(market.pwclear_da.len(), 4);
        assert_eq!(market.pwclear_da[2], outcome.price[0]);
        assert_eq!(market.trial_clear_type_da, vec![ClearingType::Uncongested; 4]);
        assert!((outcome.price[0] - 0.4).abs() < 0.01);
        assert!((outcome.price[1] - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_real_time_sign_flip() {
        let mut fed = responsive_rt_federate();
        let mut market = rt_market(hub_bid(), 0.0);

        let outcome = hub_solver(SolverConfig::real_time())
            .clear(&mut fed, &mut market, MarketKind::RealTime, 0.0, 300.0)
            .unwrap();

        let internal = outcome.trace.quantity(0, 0, outcome.iterations);
        assert!(internal > 0.0);
        assert_eq!(market.trial_cleared_quantity_rt, -internal);
    }

    #[test]
    fn test_deadline_cuts_iteration_short() {
        let mut fed = responsive_rt_federate();
        let mut market = rt_market(hub_bid(), 0.0);

        let outcome = hub_solver(SolverConfig::real_time())
            .clear(&mut fed, &mut market, MarketKind::RealTime, 0.0, 0.05)
            .unwrap();

        assert_eq!(outcome.termination, Termination::DeadlineReached);
        assert_eq!(outcome.iterations, 5);
        assert_eq!(outcome.granted, 0.05);
        assert_eq!(market.trial_cleared_quantity_rt, outcome.quantity[0]);
    }

    #[test]
    fn test_late_messages_drained_after_window() {
        let mut fed = responsive_rt_federate();
        let mut market = rt_market(hub_bid(), 0.0);

        hub_solver(SolverConfig::real_time())
            .clear(&mut fed, &mut market, MarketKind::RealTime, 100.0, 400.0)
            .unwrap();

        assert_eq!(fed.granted(), 400.0);
        assert_eq!(fed.queued("mg", QuantityKind::Price), 0);
        assert_eq!(fed.queued("mg", QuantityKind::Quantity), 0);
    }

    #[test]
    fn test_ramp_limit_holds_quantity_near_previous() {
        let mut fed = responsive_rt_federate();
        let mut market = rt_market(hub_bid(), -100.0);
        let config = SolverConfig {
            ramp_limit: Some(10.0),
            ..SolverConfig::real_time()
        };

        let outcome = hub_solver(config)
            .clear(&mut fed, &mut market, MarketKind::RealTime, 0.0, 1.0)
            .unwrap();

        for k in 0..=outcome.iterations {
            let q = outcome.trace.quantity(0, 0, k);
            assert!((90.0..=110.0).contains(&q), "quantity {q} at {k}");
        }
    }

    #[test]
    fn test_generator_cost_provider_clears() {
        let mut fed = responsive_rt_federate();
        let mut market = rt_market(RawBid::default(), 0.0);
        let provider = QuadraticCostCurveProvider::new(
            GeneratorCost {
                a: 0.00125,
                b: 0.0,
                c: 5.0,
                size: 400.0,
            },
            1,
        );

        let outcome = hub_solver(SolverConfig::real_time())
            .clear_with(&mut fed, &mut market, &provider, MarketKind::RealTime, 0.0, 300.0)
            .unwrap();

        assert!(outcome.termination.is_converged());
        assert!((outcome.price[0] - 0.4).abs() < 0.01);
    }

    #[test]
    fn test_real_time_rejects_multi_slot_provider() {
        let mut fed = responsive_rt_federate();
        let mut market = rt_market(hub_bid(), 0.0);
        let provider = QuadraticCostCurveProvider::new(
            GeneratorCost {
                a: 0.00125,
                b: 0.0,
                c: 0.0,
                size: 400.0,
            },
            2,
        );

        let result = hub_solver(SolverConfig::real_time()).clear_with(
            &mut fed,
            &mut market,
            &provider,
            MarketKind::RealTime,
            0.0,
            300.0,
        );
        assert!(matches!(result, Err(GridClearError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = SolverConfig {
            iter_max: 1,
            ..SolverConfig::real_time()
        };
        assert!(ConsensusSolver::new(config, AgentConfig::new("hub", &["mg"]), None).is_err());
    }
}
