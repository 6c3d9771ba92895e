use async_trait::async_trait;
use sqlx::types::Json;

use crate::{
    application::repos::{RecommendationStore, RepoError},
    domain::entities::{ProductScore, UserRecommendationSet},
};

use super::{PostgresRepositories, util::map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UserRecommendationRow {
    user_id: String,
    products: Json<Vec<ProductScore>>,
}

impl From<UserRecommendationRow> for UserRecommendationSet {
    fn from(row: UserRecommendationRow) -> Self {
        UserRecommendationSet::new(row.user_id, row.products.0)
    }
}

#[async_trait]
impl RecommendationStore for PostgresRepositories {
    async fn find_user_recommendations(
        &self,
        user_id: &str,
    ) -> Result<Option<UserRecommendationSet>, RepoError> {
        let row = sqlx::query_as::<_, UserRecommendationRow>(
            r#"
            SELECT user_id, products
            FROM user_recommendations
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecommendationSet::from))
    }

    async fn upsert_user_recommendations(
        &self,
        set: &UserRecommendationSet,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO user_recommendations (user_id, products, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (user_id)
            DO UPDATE SET products = EXCLUDED.products, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&set.user_id)
        .bind(Json(&set.products))
        .execute(self.pool())
        .await
        .map(|_| ())
        .map_err(map_sqlx_error)
    }
}
