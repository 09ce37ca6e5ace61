// Person registry: resolves match participants to people, creating unknown ones.
// The match repo only needs the trait; the SQLite registry backs it in this crate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row};
use tracing::instrument;

use crate::clock::Clock;
use crate::db::{datetime_from_millis, datetime_to_millis};
use crate::error::StoreResult;
use crate::models::{Person, SteamId};

#[async_trait]
pub trait PersonRegistry: Send + Sync {
    /// Existing person for `steam_id`, or a freshly created one.
    async fn resolve_or_create(&self, steam_id: SteamId) -> StoreResult<Person>;

    /// Known people among `steam_ids`. Unknown ids are absent from the map.
    async fn resolve_many(&self, steam_ids: &[SteamId]) -> StoreResult<HashMap<SteamId, Person>>;
}

pub async fn init_person_table(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS person (
            steam_id INTEGER PRIMARY KEY,
            persona_name TEXT NOT NULL DEFAULT '',
            created_on INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub struct SqlitePersonRegistry {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqlitePersonRegistry {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl PersonRegistry for SqlitePersonRegistry {
    #[instrument(skip(self), fields(repo = "person", operation = "resolve_or_create"))]
    async fn resolve_or_create(&self, steam_id: SteamId) -> StoreResult<Person> {
        sqlx::query(
            "INSERT INTO person (steam_id, persona_name, created_on) VALUES ($1, '', $2)
             ON CONFLICT(steam_id) DO NOTHING",
        )
        .bind(steam_id.0)
        .bind(datetime_to_millis(self.clock.now()))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT steam_id, persona_name, created_on FROM person WHERE steam_id = $1",
        )
        .bind(steam_id.0)
        .fetch_one(&self.pool)
        .await?;
        parse_person_row(&row)
    }

    #[instrument(
        skip(self, steam_ids),
        fields(repo = "person", operation = "resolve_many", ids_count = steam_ids.len())
    )]
    async fn resolve_many(&self, steam_ids: &[SteamId]) -> StoreResult<HashMap<SteamId, Person>> {
        if steam_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT steam_id, persona_name, created_on FROM person WHERE steam_id IN (",
        );
        let mut list = qb.separated(", ");
        for id in steam_ids {
            list.push_bind(id.0);
        }
        list.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            let person = parse_person_row(row)?;
            out.insert(person.steam_id, person);
        }
        Ok(out)
    }
}

fn parse_person_row(row: &SqliteRow) -> StoreResult<Person> {
    Ok(Person {
        steam_id: SteamId(row.try_get("steam_id")?),
        persona_name: row.try_get("persona_name")?,
        created_on: datetime_from_millis(row.try_get("created_on")?)?,
    })
}
