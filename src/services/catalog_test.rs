use super::*;
use crate::state::test_helpers;

fn action(name: &str, minutes: i32, position: i32) -> ServiceSubAction {
    ServiceSubAction { id: Uuid::new_v4(), service_id: Uuid::nil(), name: name.into(), duration_minutes: minutes, position }
}

// =============================================================================
// effective_duration
// =============================================================================

#[test]
fn simple_service_uses_own_duration() {
    assert_eq!(effective_duration(45, &[]), 45);
}

#[test]
fn complicated_service_sums_sub_actions() {
    let actions = vec![action("Bath", 20, 0), action("Dry", 15, 1), action("Cut", 40, 2)];
    assert_eq!(effective_duration(30, &actions), 75);
}

#[test]
fn effective_duration_saturates_instead_of_overflowing() {
    let actions = vec![action("Bath", i32::MAX, 0), action("Dry", 1, 1)];
    assert_eq!(effective_duration(10, &actions), i32::MAX);
}

// =============================================================================
// validation
// =============================================================================

#[test]
fn name_is_trimmed_and_required() {
    assert_eq!(validate_name("  Full groom ").unwrap(), "Full groom");
    assert!(matches!(validate_name("   "), Err(CatalogError::EmptyName)));
}

#[test]
fn price_must_be_finite_and_non_negative() {
    assert_eq!(validate_price(0.0).unwrap(), 0.0);
    assert_eq!(validate_price(149.9).unwrap(), 149.9);
    assert!(matches!(validate_price(-1.0), Err(CatalogError::InvalidPrice(_))));
    assert!(matches!(validate_price(f64::NAN), Err(CatalogError::InvalidPrice(_))));
    assert!(matches!(validate_price(f64::INFINITY), Err(CatalogError::InvalidPrice(_))));
}

#[test]
fn duration_must_be_positive_and_at_most_a_day() {
    assert_eq!(validate_duration(1).unwrap(), 1);
    assert_eq!(validate_duration(MAX_DURATION_MINUTES).unwrap(), MAX_DURATION_MINUTES);
    assert!(matches!(validate_duration(0), Err(CatalogError::InvalidDuration(0))));
    assert!(matches!(validate_duration(1441), Err(CatalogError::InvalidDuration(1441))));
}

#[test]
fn sub_action_errors_point_at_index() {
    let actions = vec![
        SubActionInput { name: "Bath".into(), duration_minutes: 20 },
        SubActionInput { name: " ".into(), duration_minutes: 10 },
    ];
    assert!(matches!(validate_sub_actions(actions), Err(CatalogError::InvalidSubAction(1))));

    let actions = vec![SubActionInput { name: "Dry".into(), duration_minutes: 0 }];
    assert!(matches!(validate_sub_actions(actions), Err(CatalogError::InvalidSubAction(0))));

    let actions = vec![SubActionInput { name: "Dry".into(), duration_minutes: i32::MAX }];
    assert!(matches!(validate_sub_actions(actions), Err(CatalogError::InvalidSubAction(0))));
}

#[test]
fn sub_actions_total_is_capped() {
    let actions = vec![
        SubActionInput { name: "Bath".into(), duration_minutes: 1000 },
        SubActionInput { name: "Cut".into(), duration_minutes: 441 },
    ];
    let err = validate_sub_actions(actions).unwrap_err();
    assert!(matches!(err, CatalogError::SubActionsTooLong));
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    let actions = vec![
        SubActionInput { name: "Bath".into(), duration_minutes: 1000 },
        SubActionInput { name: "Cut".into(), duration_minutes: 440 },
    ];
    assert_eq!(validate_sub_actions(actions).unwrap().len(), 2);
}

#[test]
fn sub_action_names_are_trimmed() {
    let actions = vec![SubActionInput { name: " Bath ".into(), duration_minutes: 20 }];
    let out = validate_sub_actions(actions).unwrap();
    assert_eq!(out[0].name, "Bath");
}

#[test]
fn error_codes_and_statuses() {
    assert_eq!(CatalogError::NotFound(Uuid::nil()).status(), StatusCode::NOT_FOUND);
    assert_eq!(CatalogError::EmptyName.error_code(), "E_VALIDATION");
    assert_eq!(CatalogError::InvalidOrder.error_code(), "E_INVALID_ORDER");
    assert!(!CatalogError::InvalidPrice(-1.0).retryable());
}

// =============================================================================
// validation runs before any write
// =============================================================================

#[tokio::test]
async fn create_rejects_bad_input_without_db() {
    let state = test_helpers::test_app_state();
    let err = create_service(
        &state.pool,
        ServiceInput { name: "Bath".into(), price: -10.0, duration_minutes: 30, is_active: None },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidPrice(_)));
}

#[tokio::test]
async fn update_rejects_bad_partial_fields_without_db() {
    let state = test_helpers::test_app_state();
    let err = update_service(
        &state.pool,
        Uuid::new_v4(),
        UpdateService { duration_minutes: Some(-5), ..UpdateService::default() },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidDuration(-5)));
}

#[tokio::test]
async fn set_sub_actions_rejects_invalid_list_without_db() {
    let state = test_helpers::test_app_state();
    let err = set_sub_actions(&state.pool, Uuid::new_v4(), vec![SubActionInput { name: String::new(), duration_minutes: 5 }])
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidSubAction(0)));
}

#[tokio::test]
async fn list_surfaces_database_error() {
    let state = test_helpers::test_app_state();
    let err = list_services(&state.pool).await.unwrap_err();
    assert!(err.retryable());
}

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn live_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required for live-db-tests");
        let pool = PgPoolOptions::new().connect(&url).await.expect("connect");
        sqlx::migrate!("src/db/migrations").run(&pool).await.expect("migrate");
        pool
    }

    #[tokio::test]
    async fn sub_actions_drive_effective_duration() {
        let pool = live_pool().await;
        let service = create_service(
            &pool,
            ServiceInput { name: format!("live-{}", Uuid::new_v4()), price: 200.0, duration_minutes: 60, is_active: None },
        )
        .await
        .unwrap();
        assert_eq!(service.effective_duration_minutes, 60);

        let service = set_sub_actions(
            &pool,
            service.id,
            vec![
                SubActionInput { name: "Bath".into(), duration_minutes: 25 },
                SubActionInput { name: "Cut".into(), duration_minutes: 50 },
            ],
        )
        .await
        .unwrap();
        assert_eq!(service.effective_duration_minutes, 75);
        assert_eq!(service.sub_actions[1].position, 1);

        let service = set_sub_actions(&pool, service.id, Vec::new()).await.unwrap();
        assert_eq!(service.effective_duration_minutes, 60);

        delete_service(&pool, service.id).await.unwrap();
        assert!(matches!(get_service(&pool, service.id).await, Err(CatalogError::NotFound(_))));
    }
}
