// src/report_engine_tests.rs

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use reqwest::Client;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::clock::FixedClock;
    use crate::report_engine::*;
    use crate::roster_client::RosterClient;
    use crate::shift::{shift, ShiftRecord};
    use crate::test_support::spawn_server;
    use crate::timecard_client::tests::{reading, ScriptedPortal};
    use crate::timecard_client::{RetryPolicy, TimecardClient, TimecardError};

    // Monday 2026-10-19, 10:00; fortnight ends ten days later
    const NOW: &str = "2026-10-19 10:00";

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str(NOW, "%Y-%m-%d %H:%M").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn fortnight_end() -> NaiveDate {
        d("2026-10-29")
    }

    fn compose(completed: Decimal, c: &Classification) -> String {
        compose_report(
            DEFAULT_HOURS_CAP,
            completed,
            c.total_booked_hours,
            &c.within_fortnight,
            &c.beyond_fortnight,
        )
    }

    // --- Classification ---

    #[test]
    fn past_shifts_are_excluded() {
        let shifts = vec![
            shift("2026-10-18", "09:00", "17:00"),
            shift("2026-10-19", "06:00", "09:30"),
            shift("2026-10-19", "06:00", "10:00"),
        ];
        let c = classify_shifts(&shifts, now(), fortnight_end());

        assert!(c.within_fortnight.is_empty());
        assert!(c.beyond_fortnight.is_empty());
        assert_eq!(c.total_booked_hours, Decimal::ZERO);
    }

    #[test]
    fn in_progress_and_future_shifts_count() {
        let shifts = vec![
            shift("2026-10-19", "07:00", "15:00"),
            shift("2026-10-19", "14:00", "18:00"),
            shift("2026-10-20", "09:00", "17:00"),
            shift("2026-10-29", "07:00", "15:30"),
        ];
        let c = classify_shifts(&shifts, now(), fortnight_end());

        assert_eq!(c.within_fortnight, shifts);
        assert!(c.beyond_fortnight.is_empty());
        assert_eq!(c.total_booked_hours, dec!(28.5));
    }

    #[test]
    fn shifts_after_fortnight_end_are_listed_but_not_counted() {
        let shifts = vec![
            shift("2026-11-08", "09:00", "17:00"),
            shift("2026-10-30", "09:00", "17:00"),
        ];
        let c = classify_shifts(&shifts, now(), fortnight_end());

        assert!(c.within_fortnight.is_empty());
        assert_eq!(c.beyond_fortnight, shifts);
        assert_eq!(c.total_booked_hours, Decimal::ZERO);
    }

    #[test]
    fn booked_total_is_sum_over_within_set() {
        let shifts = vec![
            shift("2026-10-17", "09:00", "17:00"),
            shift("2026-10-21", "09:00", "13:15"),
            shift("2026-10-23", "22:00", "06:00"),
            shift("2026-11-02", "09:00", "17:00"),
            shift("2026-10-25", "08:00", "08:20"),
        ];
        let c = classify_shifts(&shifts, now(), fortnight_end());

        let expected: Decimal = c
            .within_fortnight
            .iter()
            .map(ShiftRecord::duration_hours)
            .sum();
        assert_eq!(c.within_fortnight.len(), 3);
        assert_eq!(c.total_booked_hours, expected);
    }

    #[test]
    fn overnight_shift_today_is_still_in_progress() {
        let mut late = now().date().and_hms_opt(23, 30, 0).unwrap();
        let shifts = vec![shift("2026-10-19", "22:00", "06:00")];

        let c = classify_shifts(&shifts, late, fortnight_end());
        assert_eq!(c.within_fortnight.len(), 1);
        assert_eq!(c.total_booked_hours, dec!(8));

        late = d("2026-10-20").and_hms_opt(7, 0, 0).unwrap();
        let c = classify_shifts(&shifts, late, fortnight_end());
        assert!(c.within_fortnight.is_empty());
    }

    // --- Report text ---

    #[test]
    fn exactly_at_cap_reports_zero_remaining() {
        let shifts = vec![shift("2026-10-20", "09:00", "17:00")];
        let c = classify_shifts(&shifts, now(), fortnight_end());
        let report = compose(dec!(40), &c);

        assert!(
            report.starts_with(
                "You Have Done 40.00 Hours, and You Got Future Bookings For 8.00 Hours, You Can Do 0.00 More Hours"
            ),
            "{report}"
        );
        assert!(!report.contains("Exceeded"));
    }

    #[test]
    fn over_cap_reports_exceeded_amount() {
        let shifts = vec![shift("2026-10-19", "14:00", "18:00"), shift("2026-10-21", "09:00", "11:00")];
        let c = classify_shifts(&shifts, now(), fortnight_end());
        assert_eq!(c.total_booked_hours, dec!(6));

        let report = compose(dec!(45), &c);
        assert!(report.contains("<b>Hours Exceeded By 3.00</b>"), "{report}");
        assert!(!report.contains("More Hours"));
    }

    #[test]
    fn far_shift_only_in_beyond_block() {
        let shifts = vec![shift("2026-11-08", "09:00", "17:00")];
        let c = classify_shifts(&shifts, now(), fortnight_end());
        let report = compose(dec!(10), &c);

        assert!(report.contains("Future Bookings For 0.00 Hours"));
        assert!(report.contains("You Can Do 38.00 More Hours"));
        let (this_fortnight, beyond) = report.split_once("Beyond This Fortnight:").unwrap();
        assert!(!this_fortnight.contains("2026-11-08"));
        assert!(beyond.contains("2026-11-08 <b>Sunday</b> Ward 4 Clayton 09:00 17:00"));
    }

    #[test]
    fn empty_lists_render_as_empty_blocks() {
        let report = compose(Decimal::ZERO, &Classification::default());
        assert_eq!(
            report,
            "You Have Done 0.00 Hours, and You Got Future Bookings For 0.00 Hours, You Can Do 48.00 More Hours\n\
             Here's Your Schedule For This Fortnight:\n\
             \n\
             Beyond This Fortnight:\n"
        );
    }

    #[test]
    fn shift_line_escapes_location_and_emphasises_day() {
        let mut s = shift("2026-10-20", "09:00", "17:00");
        s.location = "Ward <A> & B".to_string();
        s.assigner_note = Some("Jo".to_string());
        assert_eq!(
            render_shift(&s),
            "2026-10-20 <b>Tuesday</b> Ward &lt;A&gt; &amp; B Jo 09:00 17:00"
        );
    }

    #[test]
    fn fractional_hours_round_to_two_places() {
        let report = compose_report(
            DEFAULT_HOURS_CAP,
            dec!(10.125),
            dec!(0.3333333333),
            &[],
            &[],
        );
        assert!(report.contains("Done 10.13 Hours"), "{report}");
        assert!(report.contains("Bookings For 0.33 Hours"), "{report}");
        assert!(report.contains("You Can Do 37.54 More Hours"), "{report}");
    }

    #[test]
    fn extreme_totals_saturate_instead_of_overflowing() {
        let report = compose_report(DEFAULT_HOURS_CAP, Decimal::MAX, dec!(8), &[], &[]);
        assert!(report.contains("<b>Hours Exceeded By "), "{report}");
        assert!(report.contains(&format!("Done {:.2} Hours", Decimal::MAX)), "{report}");
    }

    #[test]
    fn compose_is_pure() {
        let shifts = vec![shift("2026-10-20", "09:00", "17:00"), shift("2026-11-20", "09:00", "17:00")];
        let c = classify_shifts(&shifts, now(), fortnight_end());
        assert_eq!(compose(dec!(12.5), &c), compose(dec!(12.5), &c));
    }

    // --- Generation ---

    fn engine(portal: Arc<ScriptedPortal>, roster_url: String) -> ReportEngine {
        let timecard = TimecardClient::new(
            portal,
            RetryPolicy {
                delay: Duration::ZERO,
                max_retries: None,
            },
        );
        ReportEngine::new(
            timecard,
            RosterClient::new(Client::new(), roster_url, "token"),
            Arc::new(FixedClock::parse(NOW)),
            DEFAULT_HOURS_CAP,
        )
    }

    #[tokio::test]
    async fn roster_outage_still_produces_report() {
        use axum::{http::StatusCode, routing::get, Router};
        let app = Router::new().route(
            "/roster",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let base = spawn_server(app).await;

        let portal = Arc::new(ScriptedPortal::hours(&["30"], "Fri 16/10"));
        let report = engine(portal, format!("{}/roster", base))
            .generate()
            .await
            .expect("report despite roster outage");

        assert!(report.starts_with(
            "You Have Done 30.00 Hours, and You Got Future Bookings For 0.00 Hours, You Can Do 18.00 More Hours"
        ));
        assert!(report.ends_with("Here's Your Schedule For This Fortnight:\n\nBeyond This Fortnight:\n"));
    }

    #[tokio::test]
    async fn generate_combines_timecard_and_roster() {
        use axum::{routing::get, Router};
        let body = r#"{"roster": {"shortfalls": [
            {"day": "2026-10-20", "shiftStart": "09:00", "shiftEnd": "17:00",
             "location4": {"description": "Ward 4"}, "location2": {"description": "Clayton"}},
            {"day": "2026-11-08", "shiftStart": "09:00", "shiftEnd": "17:00",
             "location4": {"description": "ICU"}, "location2": {"description": "Casey"},
             "notes": [{"text": "Priya"}]},
            {"day": "2026-10-18", "shiftStart": "09:00", "shiftEnd": "17:00",
             "location4": {"description": "ED"}, "location2": {"description": "Dandenong"}}
        ]}}"#;
        let app = Router::new().route("/roster", get(move || async move { body }));
        let base = spawn_server(app).await;

        // "Fri 16/10" + 13 days = 2026-10-29
        let portal = Arc::new(ScriptedPortal::new(vec![
            Ok(reading(Some("abc"), "Fri 16/10")),
            Ok(reading(Some("40"), "Fri 16/10")),
        ]));
        let report = engine(portal.clone(), format!("{}/roster", base))
            .generate()
            .await
            .unwrap();

        assert_eq!(portal.call_count(), 2);
        assert!(report.contains("You Can Do 0.00 More Hours"), "{report}");
        assert!(report.contains("2026-10-20 <b>Tuesday</b> Ward 4 Clayton 09:00 17:00"));
        assert!(report.contains("2026-11-08 <b>Sunday</b> ICU Casey Priya 09:00 17:00"));
        assert!(!report.contains("Dandenong"));
    }

    #[tokio::test]
    async fn timecard_hard_failure_aborts_generation() {
        let portal = Arc::new(ScriptedPortal::new(vec![Err(TimecardError::Browser(
            "navigation failed".to_string(),
        ))]));
        let result = engine(portal, "http://127.0.0.1:9/roster".to_string())
            .generate()
            .await;
        assert!(matches!(result, Err(ReportError::Timecard(TimecardError::Browser(_)))));
    }
}
