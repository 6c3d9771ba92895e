use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{EventFilter, EventStore, RepoError},
    domain::{
        entities::{InteractionEvent, ProductCounts},
        types::EventType,
    },
};

use super::{
    PostgresRepositories,
    util::{convert_count, map_sqlx_error},
};

#[derive(sqlx::FromRow)]
struct ProductCountsRow {
    product_id: Uuid,
    count: i64,
    view_count: i64,
    cart_add_count: i64,
    purchase_count: i64,
    last_interaction: OffsetDateTime,
}

impl TryFrom<ProductCountsRow> for ProductCounts {
    type Error = RepoError;

    fn try_from(row: ProductCountsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: row.product_id,
            count: convert_count(row.count)?,
            view_count: convert_count(row.view_count)?,
            cart_add_count: convert_count(row.cart_add_count)?,
            purchase_count: convert_count(row.purchase_count)?,
            last_interaction: row.last_interaction,
        })
    }
}

impl PostgresRepositories {
    fn push_event_type_count<'q>(
        qb: &mut QueryBuilder<'q, Postgres>,
        event_type: EventType,
        alias: &str,
    ) {
        qb.push(", COUNT(*) FILTER (WHERE event_type = ");
        qb.push_bind(event_type.as_str());
        qb.push(") AS ");
        qb.push(alias);
    }
}

#[async_trait]
impl EventStore for PostgresRepositories {
    async fn append(&self, event: &InteractionEvent) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO interaction_events (user_id, product_id, event_type, occurred_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&event.user_id)
        .bind(event.product_id)
        .bind(event.event_type.as_str())
        .bind(event.timestamp)
        .execute(self.pool())
        .await
        .map(|_| ())
        .map_err(map_sqlx_error)
    }

    async fn distinct_user_ids(&self) -> Result<Vec<String>, RepoError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT user_id
            FROM interaction_events
            GROUP BY user_id
            ORDER BY MIN(id)
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn aggregate_by_product(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<ProductCounts>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT product_id, COUNT(*) AS count");
        Self::push_event_type_count(&mut qb, EventType::View, "view_count");
        Self::push_event_type_count(&mut qb, EventType::CartAdd, "cart_add_count");
        Self::push_event_type_count(&mut qb, EventType::Purchase, "purchase_count");
        qb.push(", MAX(occurred_at) AS last_interaction FROM interaction_events WHERE TRUE");

        if let Some(user_id) = filter.user_id.as_ref() {
            qb.push(" AND user_id = ");
            qb.push_bind(user_id);
        }

        qb.push(" GROUP BY product_id ORDER BY MIN(id)");

        let rows = qb
            .build_query_as::<ProductCountsRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(ProductCounts::try_from).collect()
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.ping().await.map_err(map_sqlx_error)
    }
}
