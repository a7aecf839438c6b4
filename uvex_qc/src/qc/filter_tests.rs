#[cfg(test)]
mod tests {
    use crate::core::domain::{Band, BandMetrics, FieldAggregate, FieldId, RunNumber};
    use crate::qc::filter::{Metric, QualityFilter, RejectReason, Verdict};
    use crate::qc::policy::{Limits, PolicySet, QualityPolicy, Threshold};
    use proptest::prelude::*;

    fn metrics(run: u32, seeing: f64, ellipticity: f64, airmass: f64) -> BandMetrics {
        BandMetrics {
            run: RunNumber(run),
            seeing: Some(seeing),
            ellipticity: Some(ellipticity),
            airmass: Some(airmass),
            sky: Some(1500.0),
            sources: Some(300),
            ..Default::default()
        }
    }

    fn good_field(number: u32) -> FieldAggregate {
        let mut field = FieldAggregate::new(FieldId::plain(number));
        field.set_band(Band::U, metrics(1, 1.2, 0.1, 1.3));
        field.set_band(Band::G, metrics(2, 1.2, 0.1, 1.3));
        field.set_band(Band::R, metrics(3, 1.2, 0.1, 1.3));
        field
    }

    fn builtin(name: &str) -> QualityFilter {
        QualityFilter::new(PolicySet::builtin().get(name).unwrap().clone())
    }

    #[test]
    fn test_missing_u_rejects_regardless_of_metrics() {
        let mut field = good_field(1);
        field.clear_band(Band::U);

        for name in ["dqc", "seeing-log", "unreduced"] {
            assert_eq!(
                builtin(name).evaluate(&field),
                Verdict::Rejected(RejectReason::MissingBand(Band::U)),
                "policy {}",
                name
            );
        }
    }

    #[test]
    fn test_dqc_ignores_u_metrics() {
        let mut field = good_field(1);
        field.set_band(Band::U, metrics(1, 3.5, 0.6, 2.5));

        assert_eq!(builtin("dqc").evaluate(&field), Verdict::Accepted);
    }

    #[test]
    fn test_dqc_limits_are_strict() {
        let mut field = good_field(1);
        field.set_band(Band::R, metrics(3, 1.7, 0.1, 1.3));

        let verdict = builtin("dqc").evaluate(&field);
        assert_eq!(
            verdict,
            Verdict::Rejected(RejectReason::MetricOutOfRange {
                band: Band::R,
                metric: Metric::Seeing,
                value: 1.7,
                limit: Threshold::Strict(1.7),
            })
        );
        if let Verdict::Rejected(reason) = verdict {
            assert_eq!(reason.to_string(), "r seeing 1.7 fails < 1.7");
        }
    }

    #[test]
    fn test_inclusive_limit_accepts_boundary() {
        let limits = Limits {
            seeing: Some(Threshold::Bound {
                value: 1.7,
                inclusive: true,
            }),
            ..Limits::none()
        };
        let filter = QualityFilter::new(QualityPolicy::new(vec![Band::R], limits));

        let mut field = good_field(1);
        field.set_band(Band::R, metrics(3, 1.7, 0.1, 1.3));
        assert_eq!(filter.evaluate(&field), Verdict::Accepted);
    }

    #[test]
    fn test_missing_metric_fails_limit() {
        let mut field = good_field(1);
        let mut g = metrics(2, 1.2, 0.1, 1.3);
        g.airmass = None;
        field.set_band(Band::G, g);

        assert_eq!(
            builtin("dqc").evaluate(&field),
            Verdict::Rejected(RejectReason::MetricMissing {
                band: Band::G,
                metric: Metric::Airmass
            })
        );
    }

    #[test]
    fn test_late_ra_override_accepts_incomplete_fields() {
        let mut field = FieldAggregate::new(FieldId::plain(2500));
        field.ra = Some(100.0);

        assert_eq!(builtin("dqc-late-ra").evaluate(&field), Verdict::AcceptedByOverride);
        assert!(!builtin("dqc").is_acceptable(&field));

        field.ra = Some(300.0);
        assert!(!builtin("dqc-late-ra").is_acceptable(&field));
    }

    #[test]
    fn test_seeing_log_limits() {
        let filter = builtin("seeing-log");
        let mut field = good_field(10);
        field.set_band(Band::U, metrics(1, 2.4, 0.1, 1.3));
        assert!(filter.is_acceptable(&field));

        let mut few_sources = metrics(2, 1.2, 0.1, 1.3);
        few_sources.sources = Some(2);
        field.set_band(Band::G, few_sources);
        assert!(matches!(
            filter.evaluate(&field),
            Verdict::Rejected(RejectReason::MetricOutOfRange {
                metric: Metric::Sources,
                ..
            })
        ));

        let mut late = field.clone();
        late.field = FieldId::offset(3000);
        assert_eq!(
            builtin("seeing-log-late-plane").evaluate(&late),
            Verdict::AcceptedByOverride
        );
    }

    #[test]
    fn test_late_plane_override_needs_all_bands() {
        let filter = builtin("seeing-log-late-plane");

        let mut partial = FieldAggregate::new(FieldId::plain(3000));
        partial.set_band(Band::R, metrics(3, 3.0, 0.5, 1.3));
        assert_eq!(
            filter.evaluate(&partial),
            Verdict::Rejected(RejectReason::MissingBand(Band::U))
        );

        let mut complete = good_field(3000);
        complete.set_band(Band::R, metrics(3, 3.0, 0.5, 1.3));
        assert_eq!(filter.evaluate(&complete), Verdict::AcceptedByOverride);

        complete.field = FieldId::plain(5000);
        assert!(!filter.is_acceptable(&complete));
    }

    #[test]
    fn test_unreduced_excludes_nights() {
        let filter = builtin("unreduced");
        let mut field = good_field(5);
        field.set_band(Band::G, metrics(2, 9.0, 0.9, 3.0));
        field.night = Some("20130714".to_string());
        assert!(filter.is_acceptable(&field));

        field.night = Some("20111124".to_string());
        assert_eq!(
            filter.evaluate(&field),
            Verdict::Rejected(RejectReason::ExcludedNight("20111124".to_string()))
        );
    }

    #[test]
    fn test_dqc_hei_requires_hei() {
        let mut field = good_field(1);
        assert_eq!(
            builtin("dqc-hei").evaluate(&field),
            Verdict::Rejected(RejectReason::MissingBand(Band::HeI))
        );

        field.set_band(Band::HeI, metrics(4, 1.2, 0.1, 1.3));
        assert!(builtin("dqc-hei").is_acceptable(&field));
    }

    #[test]
    fn test_filter_fields_summary() {
        let mut bad = good_field(2);
        bad.clear_band(Band::G);
        let fields = vec![good_field(3), bad.clone(), good_field(1), good_field(3)];

        let summary = builtin("dqc").filter_fields(&fields);
        let accepted: Vec<FieldId> = summary.accepted.iter().copied().collect();
        assert_eq!(accepted, vec![FieldId::plain(1), FieldId::plain(3)]);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(
            summary.rejected_fields().into_iter().collect::<Vec<_>>(),
            vec![FieldId::plain(2)]
        );
    }

    fn arb_metrics() -> impl Strategy<Value = Option<BandMetrics>> {
        prop::option::weighted(
            0.85,
            (
                prop::option::weighted(0.9, 0.5f64..4.0),
                prop::option::weighted(0.9, 0.0f64..0.6),
                prop::option::weighted(0.9, 1.0f64..3.0),
                prop::option::weighted(0.9, 100.0f64..20000.0),
                prop::option::weighted(0.9, 0u32..50),
            )
                .prop_map(|(seeing, ellipticity, airmass, sky, sources)| BandMetrics {
                    run: RunNumber(1),
                    seeing,
                    ellipticity,
                    airmass,
                    sky,
                    sources,
                    ..Default::default()
                }),
        )
    }

    fn arb_field() -> impl Strategy<Value = FieldAggregate> {
        (
            1u32..7636,
            prop::collection::vec(arb_metrics(), 4),
            prop::option::of(0.0f64..360.0),
        )
            .prop_map(|(number, bands, ra)| {
                let mut field = FieldAggregate::new(FieldId::plain(number));
                field.ra = ra;
                for (band, metrics) in Band::ALL.iter().zip(bands) {
                    if let Some(m) = metrics {
                        field.set_band(*band, m);
                    }
                }
                field
            })
    }

    fn tighten(limits: &Limits, factor: f64, sources_step: f64) -> Limits {
        Limits {
            seeing: limits.seeing.map(|t| t.with_value(t.value() * factor)),
            ellipticity: limits.ellipticity.map(|t| t.with_value(t.value() * factor)),
            airmass: limits.airmass.map(|t| t.with_value(t.value() * factor)),
            sky: limits.sky.map(|t| t.with_value(t.value() * factor)),
            sources: limits.sources.map(|t| t.with_value(t.value() + sources_step)),
        }
    }

    proptest! {
        #[test]
        fn prop_tightening_never_accepts_more(
            field in arb_field(),
            factor in 0.0f64..=1.0,
            sources_step in 0.0f64..20.0,
            name in prop::sample::select(vec![
                "dqc", "dqc-late-ra", "dqc-hei", "seeing-log", "seeing-log-late-plane",
            ]),
        ) {
            let loose = PolicySet::builtin().get(name).unwrap().clone();
            let mut tight = loose.clone();
            tight.limits = tighten(&loose.limits, factor, sources_step);
            for limits in tight.band_limits.values_mut() {
                *limits = tighten(limits, factor, sources_step);
            }

            let accepted_tight = QualityFilter::new(tight).is_acceptable(&field);
            let accepted_loose = QualityFilter::new(loose).is_acceptable(&field);
            prop_assert!(!accepted_tight || accepted_loose);
        }

        #[test]
        fn prop_accepted_fields_have_required_bands_or_override(field in arb_field()) {
            let filter = builtin("dqc");
            if filter.is_acceptable(&field) {
                prop_assert!(field.has_all(&[Band::U, Band::G, Band::R]));
            }
        }
    }
}
