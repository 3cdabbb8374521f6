//! Customer types: the categories a station may be restricted to.

use axum::http::StatusCode;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ErrorCode, MSG_DATABASE, MSG_NOT_FOUND};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum CustomerTypeError {
    #[error("customer type name is empty")]
    EmptyName,
    #[error("customer type already exists: {0}")]
    Duplicate(String),
    #[error("customer type not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for CustomerTypeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyName => "E_VALIDATION",
            Self::Duplicate(_) => "E_DUPLICATE",
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::EmptyName => StatusCode::BAD_REQUEST,
            Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyName => "יש להזין שם לסוג הלקוח",
            Self::Duplicate(_) => "סוג לקוח בשם זה כבר קיים",
            Self::NotFound(_) => MSG_NOT_FOUND,
            Self::Database(_) => MSG_DATABASE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerType {
    pub id: Uuid,
    pub name: String,
}

/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_customer_types(pool: &PgPool) -> Result<Vec<CustomerType>, CustomerTypeError> {
    let rows = sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM customer_types ORDER BY name ASC")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(id, name)| CustomerType { id, name }).collect())
}

/// # Errors
///
/// Returns a validation error for blank names, [`CustomerTypeError::Duplicate`]
/// when the name is taken, or a database error.
pub async fn create_customer_type(pool: &PgPool, name: &str) -> Result<CustomerType, CustomerTypeError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CustomerTypeError::EmptyName);
    }

    let id: Option<Uuid> = sqlx::query_scalar(
        "INSERT INTO customer_types (name) VALUES ($1)
         ON CONFLICT (name) DO NOTHING
         RETURNING id",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    let id = id.ok_or_else(|| CustomerTypeError::Duplicate(name.to_owned()))?;
    Ok(CustomerType { id, name: name.to_owned() })
}

/// Delete a customer type. Station restrictions naming it cascade, so the
/// station cache is invalidated.
///
/// # Errors
///
/// Returns not-found or a database error.
pub async fn delete_customer_type(state: &AppState, id: Uuid) -> Result<(), CustomerTypeError> {
    let result = sqlx::query("DELETE FROM customer_types WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CustomerTypeError::NotFound(id));
    }
    state.stations.write().await.invalidate();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_helpers;

    #[tokio::test]
    async fn create_rejects_blank_name_without_database() {
        let state = test_helpers::test_app_state();
        let err = create_customer_type(&state.pool, "   ").await.unwrap_err();
        assert!(matches!(err, CustomerTypeError::EmptyName));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn duplicate_maps_to_conflict() {
        let err = CustomerTypeError::Duplicate("VIP".into());
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), "E_DUPLICATE");
    }

    #[tokio::test]
    async fn failed_delete_keeps_station_cache() {
        let state = test_helpers::test_app_state();
        test_helpers::seed_stations(&state, vec![test_helpers::dummy_station("Bay 1", 0)]).await;

        let err = delete_customer_type(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CustomerTypeError::Database(_)));
        assert!(state.stations.read().await.loaded);
    }

    #[cfg(feature = "live-db-tests")]
    mod live {
        use super::*;
        use sqlx::postgres::PgPoolOptions;

        async fn live_state() -> AppState {
            let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required for live-db-tests");
            let pool = PgPoolOptions::new().connect(&url).await.expect("connect");
            sqlx::migrate!("src/db/migrations").run(&pool).await.expect("migrate");
            AppState::new(pool, test_helpers::test_config())
        }

        #[tokio::test]
        async fn delete_invalidates_station_cache() {
            let state = live_state().await;
            let created = create_customer_type(&state.pool, &format!("live-{}", Uuid::new_v4())).await.unwrap();
            test_helpers::seed_stations(&state, vec![test_helpers::dummy_station("Bay 1", 0)]).await;

            delete_customer_type(&state, created.id).await.unwrap();
            assert!(!state.stations.read().await.loaded);

            test_helpers::seed_stations(&state, Vec::new()).await;
            let err = delete_customer_type(&state, created.id).await.unwrap_err();
            assert!(matches!(err, CustomerTypeError::NotFound(_)));
            assert!(state.stations.read().await.loaded);
        }
    }
}
