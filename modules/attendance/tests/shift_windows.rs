mod common;

use chrono::Duration;
use common::{date, harness, time, utc};
use tracing_test::traced_test;

use attendance::contract::model::WindowSource;
use attendance::domain::error::DomainError;

#[tokio::test]
async fn new_york_monday_shift_is_found_for_instant() {
    let h = harness(utc(2024, 3, 4, 14, 30, 0));
    let org = h.repo.add_org(None, None);
    let user = h.repo.add_user(org, None);
    let template = h
        .repo
        .add_template(org, 0, time(9, 0), time(17, 0), Some("America/New_York"));
    let assignment = h.repo.assign(template, user, date(2024, 1, 1), None);

    let window = h
        .service
        .active_window(user, utc(2024, 3, 4, 14, 30, 0))
        .await
        .unwrap()
        .expect("inside the shift");

    assert_eq!(window.start_utc, utc(2024, 3, 4, 14, 0, 0));
    assert_eq!(window.end_utc, utc(2024, 3, 4, 22, 0, 0));
    assert_eq!(window.timezone.name(), "America/New_York");
    assert_eq!(
        window.source,
        WindowSource::Assigned {
            template_id: template,
            assignment_id: assignment
        }
    );

    // After the spring-forward jump the same local shift starts an hour earlier in UTC.
    let summer = h
        .service
        .active_window(user, utc(2024, 3, 11, 13, 30, 0))
        .await
        .unwrap()
        .expect("inside the shift");
    assert_eq!(summer.start_utc, utc(2024, 3, 11, 13, 0, 0));

    assert!(h
        .service
        .active_window(user, utc(2024, 3, 4, 22, 0, 0))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn overnight_shift_is_active_after_midnight() {
    let h = harness(utc(2024, 3, 9, 2, 0, 0));
    let org = h.repo.add_org(Some("UTC"), None);
    let user = h.repo.add_user(org, None);
    // Friday 22:00 → Saturday 06:00
    let template = h.repo.add_template(org, 4, time(22, 0), time(6, 0), None);
    h.repo.assign(template, user, date(2024, 1, 1), None);

    let window = h
        .service
        .active_window(user, utc(2024, 3, 9, 2, 0, 0))
        .await
        .unwrap()
        .expect("overnight window");
    assert_eq!(window.start_utc, utc(2024, 3, 8, 22, 0, 0));
    assert_eq!(window.duration(), Duration::hours(8));
}

#[tokio::test]
async fn assignment_end_date_is_exclusive() {
    let h = harness(utc(2024, 3, 4, 10, 0, 0));
    let org = h.repo.add_org(None, None);
    let user = h.repo.add_user(org, None);
    let template = h.repo.add_template(org, 0, time(9, 0), time(17, 0), None);
    h.repo
        .assign(template, user, date(2024, 1, 1), Some(date(2024, 3, 4)));

    assert!(h
        .service
        .active_window(user, utc(2024, 3, 4, 10, 0, 0))
        .await
        .unwrap()
        .is_none());
    assert!(h
        .service
        .active_window(user, utc(2024, 2, 26, 10, 0, 0))
        .await
        .unwrap()
        .is_some());

    let around = h
        .service
        .windows_for_user(user, utc(2024, 3, 4, 10, 0, 0))
        .await
        .unwrap();
    assert_eq!(around.len(), 1);
    assert_eq!(around[0].start_utc, utc(2024, 2, 26, 9, 0, 0));
}

#[tokio::test]
async fn overlapping_assignments_yield_sorted_windows() {
    let h = harness(utc(2024, 3, 4, 0, 0, 0));
    let org = h.repo.add_org(None, None);
    let user = h.repo.add_user(org, None);
    let afternoon = h.repo.add_template(org, 0, time(12, 0), time(17, 0), None);
    let morning = h.repo.add_template(org, 0, time(9, 0), time(13, 0), None);
    h.repo.assign(afternoon, user, date(2024, 1, 1), None);
    h.repo.assign(morning, user, date(2024, 1, 1), None);

    let windows = h.service.windows_for_day(user, date(2024, 3, 4)).await.unwrap();
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].template_id(), Some(morning));
    assert_eq!(windows[1].template_id(), Some(afternoon));

    // Tuesday has no shift and the user has no unassigned access.
    assert!(h
        .service
        .windows_for_day(user, date(2024, 3, 5))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unassigned_user_gets_all_day_window_in_own_zone() {
    let h = harness(utc(2024, 3, 4, 0, 0, 0));
    let org = h.repo.add_org(Some("Europe/Berlin"), None);
    let user = h.repo.add_user_with(org, Some("Asia/Tokyo"), true, true);

    let windows = h.service.windows_for_day(user, date(2024, 3, 4)).await.unwrap();
    assert_eq!(windows.len(), 1);
    let fallback = &windows[0];
    assert!(fallback.is_fallback());
    assert_eq!(fallback.source, WindowSource::Unassigned);
    assert_eq!(fallback.start_utc, utc(2024, 3, 3, 15, 0, 0));
    assert_eq!(fallback.end_utc, utc(2024, 3, 4, 15, 0, 0));

    // The synthetic window never makes the user "in shift".
    assert!(h
        .service
        .active_window(user, utc(2024, 3, 4, 3, 0, 0))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn device_timezone_defers_to_organization() {
    let h = harness(utc(2024, 3, 4, 0, 0, 0));
    let org = h.repo.add_org(Some("Europe/Berlin"), None);
    let device_user = h.repo.add_user(org, Some("device"));
    let own_zone_user = h.repo.add_user(org, Some("America/Chicago"));

    assert_eq!(
        h.service.user_timezone(device_user).await.unwrap(),
        chrono_tz::Europe::Berlin
    );
    assert_eq!(
        h.service.user_timezone(own_zone_user).await.unwrap(),
        chrono_tz::America::Chicago
    );

    let (start, end) = h.service.day_bounds(device_user, date(2024, 3, 31)).await.unwrap();
    assert_eq!(start, utc(2024, 3, 30, 23, 0, 0));
    assert_eq!(end - start, Duration::hours(23));
}

#[traced_test]
#[tokio::test]
async fn unknown_template_zone_falls_back_to_default_with_warning() {
    let h = harness(utc(2024, 3, 4, 0, 0, 0));
    let org = h.repo.add_org(None, None);
    let user = h.repo.add_user(org, None);
    let template = h
        .repo
        .add_template(org, 0, time(9, 0), time(17, 0), Some("Mars/Olympus_Mons"));
    h.repo.assign(template, user, date(2024, 1, 1), None);

    let windows = h.service.windows_for_day(user, date(2024, 3, 4)).await.unwrap();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].start_utc, utc(2024, 3, 4, 9, 0, 0));
    assert!(logs_contain("unknown time zone"));
}

#[tokio::test]
async fn upcoming_schedule_clamps_and_deduplicates() {
    let h = harness(utc(2024, 3, 4, 0, 0, 0));
    let org = h.repo.add_org(None, None);
    let day_user = h.repo.add_user(org, None);
    let night_user = h.repo.add_user(org, None);
    h.repo
        .assign_every_day(org, day_user, time(9, 0), time(17, 0), date(2024, 1, 1));
    h.repo
        .assign_every_day(org, night_user, time(22, 0), time(6, 0), date(2024, 1, 1));

    let today = date(2024, 3, 4);
    assert_eq!(h.service.upcoming_schedule(day_user, today, 3).await.unwrap().len(), 3);
    assert_eq!(h.service.upcoming_schedule(day_user, today, 0).await.unwrap().len(), 1);
    assert_eq!(h.service.upcoming_schedule(day_user, today, 90).await.unwrap().len(), 31);

    // Overnight windows touch two days but are listed once.
    let nights = h.service.upcoming_schedule(night_user, today, 2).await.unwrap();
    assert_eq!(nights.len(), 3);
    assert!(nights.windows(2).all(|w| w[0].start_utc < w[1].start_utc));
    assert_eq!(nights[0].start_utc, utc(2024, 3, 3, 22, 0, 0));
    assert_eq!(nights[0].source_timezone, "UTC");
}

#[tokio::test]
async fn upcoming_schedule_skips_fallback_windows() {
    let h = harness(utc(2024, 3, 4, 0, 0, 0));
    let org = h.repo.add_org(None, None);
    let user = h.repo.add_user_with(org, None, true, true);

    let schedule = h
        .service
        .upcoming_schedule(user, date(2024, 3, 4), 7)
        .await
        .unwrap();
    assert!(schedule.is_empty());
}

#[tokio::test]
async fn early_start_tolerance() {
    let h = harness(utc(2024, 3, 4, 8, 50, 0));
    let org = h.repo.add_org(None, None);
    let user = h.repo.add_user(org, None);
    h.repo
        .assign_every_day(org, user, time(9, 0), time(17, 0), date(2024, 1, 1));

    let s = &h.service;
    assert!(s.can_start_before_shift(user, utc(2024, 3, 4, 8, 50, 0), 15).await.unwrap());
    assert!(!s.can_start_before_shift(user, utc(2024, 3, 4, 8, 50, 0), 5).await.unwrap());
    assert!(!s.can_start_before_shift(user, utc(2024, 3, 4, 8, 50, 0), 0).await.unwrap());
    // Clamped to 30 minutes.
    assert!(!s.can_start_before_shift(user, utc(2024, 3, 4, 8, 20, 0), 120).await.unwrap());
    assert!(s.can_start_before_shift(user, utc(2024, 3, 4, 8, 31, 0), 120).await.unwrap());
    // Already started.
    assert!(!s.can_start_before_shift(user, utc(2024, 3, 4, 9, 5, 0), 30).await.unwrap());
}

#[tokio::test]
async fn early_start_requires_same_local_date() {
    let h = harness(utc(2024, 3, 4, 23, 50, 0));
    let org = h.repo.add_org(None, None);
    let user = h.repo.add_user(org, None);
    h.repo
        .assign_every_day(org, user, time(0, 0), time(8, 0), date(2024, 1, 1));

    assert!(!h
        .service
        .can_start_before_shift(user, utc(2024, 3, 4, 23, 50, 0), 30)
        .await
        .unwrap());
}

#[tokio::test]
async fn unknown_user_is_reported() {
    let h = harness(utc(2024, 3, 4, 0, 0, 0));
    let err = h
        .service
        .windows_for_day(999, date(2024, 3, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::UserNotFound { id: 999 }));
}
