// Match statistics: one root row per finished match plus player, medic and team sums.
// Writes happen once at match end; reads rebuild the match and derive per-player ratios.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row};
use tracing::{debug, instrument};

use crate::db::{datetime_from_millis, datetime_to_millis};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Match, MatchMedicSum, MatchPlayerSum, MatchSummary, MatchTeamSum, MatchesQuery, Medigun,
    SteamId,
};
use crate::person::PersonRegistry;

pub async fn init_match_tables(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            match_id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_id INTEGER NOT NULL,
            map TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            created_on INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS match_player (
            match_player_id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id INTEGER NOT NULL REFERENCES matches(match_id) ON DELETE CASCADE,
            steam_id INTEGER NOT NULL REFERENCES person(steam_id),
            team INTEGER NOT NULL,
            time_start INTEGER,
            time_end INTEGER NOT NULL,
            kills INTEGER NOT NULL DEFAULT 0,
            assists INTEGER NOT NULL DEFAULT 0,
            deaths INTEGER NOT NULL DEFAULT 0,
            dominations INTEGER NOT NULL DEFAULT 0,
            dominated INTEGER NOT NULL DEFAULT 0,
            revenges INTEGER NOT NULL DEFAULT 0,
            damage INTEGER NOT NULL DEFAULT 0,
            damage_taken INTEGER NOT NULL DEFAULT 0,
            healing INTEGER NOT NULL DEFAULT 0,
            healing_taken INTEGER NOT NULL DEFAULT 0,
            health_packs INTEGER NOT NULL DEFAULT 0,
            backstabs INTEGER NOT NULL DEFAULT 0,
            headshots INTEGER NOT NULL DEFAULT 0,
            airshots INTEGER NOT NULL DEFAULT 0,
            captures INTEGER NOT NULL DEFAULT 0,
            shots INTEGER NOT NULL DEFAULT 0,
            extinguishes INTEGER NOT NULL DEFAULT 0,
            hits INTEGER NOT NULL DEFAULT 0,
            buildings INTEGER NOT NULL DEFAULT 0,
            buildings_destroyed INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS match_medic (
            match_medic_id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id INTEGER NOT NULL REFERENCES matches(match_id) ON DELETE CASCADE,
            steam_id INTEGER NOT NULL REFERENCES person(steam_id),
            healing INTEGER NOT NULL DEFAULT 0,
            charges INTEGER NOT NULL DEFAULT 0,
            drops INTEGER NOT NULL DEFAULT 0,
            avg_time_to_build INTEGER NOT NULL DEFAULT 0,
            avg_time_before_use INTEGER NOT NULL DEFAULT 0,
            near_full_charge_death INTEGER NOT NULL DEFAULT 0,
            avg_uber_length REAL NOT NULL DEFAULT 0,
            death_after_charge INTEGER NOT NULL DEFAULT 0,
            major_adv_lost INTEGER NOT NULL DEFAULT 0,
            biggest_adv_lost INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS match_team (
            match_team_id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id INTEGER NOT NULL REFERENCES matches(match_id) ON DELETE CASCADE,
            team INTEGER NOT NULL,
            kills INTEGER NOT NULL DEFAULT 0,
            damage INTEGER NOT NULL DEFAULT 0,
            charges INTEGER NOT NULL DEFAULT 0,
            drops INTEGER NOT NULL DEFAULT 0,
            caps INTEGER NOT NULL DEFAULT 0,
            mid_fights INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_match_player_match ON match_player(match_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_match_player_steam ON match_player(steam_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_match_medic_match ON match_medic(match_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_match_team_match ON match_team(match_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub struct MatchRepo {
    pool: SqlitePool,
    people: Arc<dyn PersonRegistry>,
}

impl MatchRepo {
    pub fn new(pool: SqlitePool, people: Arc<dyn PersonRegistry>) -> Self {
        Self { pool, people }
    }

    /// Writes a finished match and all its sums; returns the new match id.
    ///
    /// Participants are resolved into the person registry first. The match row and every sum
    /// are then written in one transaction, so a failed insert leaves nothing behind.
    /// Team sums are numbered by position (1-based), not by their `team` field.
    #[instrument(
        skip(self, m),
        fields(
            repo = "match",
            operation = "save_match",
            players = m.player_sums.len(),
            medics = m.medic_sums.len()
        )
    )]
    pub async fn save_match(&self, m: &Match) -> StoreResult<i64> {
        let participants: BTreeSet<SteamId> = m
            .player_sums
            .iter()
            .map(|p| p.steam_id)
            .chain(m.medic_sums.iter().map(|s| s.steam_id))
            .collect();
        if let Some(bad) = participants.iter().find(|id| !id.is_valid()) {
            return Err(StoreError::invalid(format!("invalid steam id {bad}")));
        }
        for steam_id in &participants {
            self.people.resolve_or_create(*steam_id).await?;
        }

        let mut tx = self.pool.begin().await?;

        let match_id = sqlx::query(
            "INSERT INTO matches (server_id, map, title, created_on) VALUES ($1, $2, $3, $4)",
        )
        .bind(m.server_id)
        .bind(&m.map_name)
        .bind(&m.title)
        .bind(datetime_to_millis(m.created_on))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for s in &m.player_sums {
            let time_end = s.time_end.unwrap_or(m.created_on);
            sqlx::query(
                r#"
                INSERT INTO match_player (
                    match_id, steam_id, team, time_start, time_end,
                    kills, assists, deaths, dominations, dominated, revenges,
                    damage, damage_taken, healing, healing_taken, health_packs,
                    backstabs, headshots, airshots, captures, shots, extinguishes,
                    hits, buildings, buildings_destroyed)
                VALUES (
                    $1, $2, $3, $4, $5,
                    $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22,
                    $23, $24, $25)
                "#,
            )
            .bind(match_id)
            .bind(s.steam_id.0)
            .bind(s.team)
            .bind(s.time_start.map(datetime_to_millis))
            .bind(datetime_to_millis(time_end))
            .bind(s.kills)
            .bind(s.assists)
            .bind(s.deaths)
            .bind(s.dominations)
            .bind(s.dominated)
            .bind(s.revenges)
            .bind(s.damage)
            .bind(s.damage_taken)
            .bind(s.healing)
            .bind(s.healing_taken)
            .bind(s.health_packs)
            .bind(s.backstabs)
            .bind(s.headshots)
            .bind(s.airshots)
            .bind(s.captures)
            .bind(s.shots)
            .bind(s.extinguishes)
            .bind(s.hits)
            .bind(s.buildings_built)
            .bind(s.buildings_destroyed)
            .execute(&mut *tx)
            .await?;
        }

        for s in &m.medic_sums {
            sqlx::query(
                r#"
                INSERT INTO match_medic (
                    match_id, steam_id, healing, charges, drops, avg_time_to_build,
                    avg_time_before_use, near_full_charge_death, avg_uber_length,
                    death_after_charge, major_adv_lost, biggest_adv_lost)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(match_id)
            .bind(s.steam_id.0)
            .bind(s.healing)
            .bind(s.total_charges())
            .bind(s.drops)
            .bind(s.avg_time_to_build)
            .bind(s.avg_time_before_use)
            .bind(s.near_full_charge_death)
            .bind(s.avg_uber_length)
            .bind(s.death_after_charge)
            .bind(s.major_adv_lost)
            .bind(s.biggest_adv_lost)
            .execute(&mut *tx)
            .await?;
        }

        for (i, s) in m.team_sums.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO match_team (match_id, team, kills, damage, charges, drops, caps, mid_fights)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(match_id)
            .bind(i as i64 + 1)
            .bind(s.kills)
            .bind(s.damage)
            .bind(s.charges)
            .bind(s.drops)
            .bind(s.caps)
            .bind(s.mid_fights)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(match_id, "match saved");
        Ok(match_id)
    }

    /// Rebuilds a match with its sums and the people behind them.
    #[instrument(skip(self), fields(repo = "match", operation = "get_match"))]
    pub async fn get_match(&self, match_id: i64) -> StoreResult<Match> {
        let root = sqlx::query(
            "SELECT server_id, map, title, created_on FROM matches WHERE match_id = $1",
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("match {match_id}")))?;

        let mut m = Match {
            match_id,
            server_id: root.try_get("server_id")?,
            map_name: root.try_get("map")?,
            title: root.try_get("title")?,
            created_on: datetime_from_millis(root.try_get("created_on")?)?,
            ..Default::default()
        };

        let player_rows = sqlx::query(
            r#"
            SELECT
                match_player_id, steam_id, team, time_start, time_end, kills, assists,
                deaths, dominations, dominated, revenges, damage, damage_taken, healing,
                healing_taken, health_packs, backstabs, headshots, airshots, captures, shots,
                extinguishes, hits, buildings, buildings_destroyed
            FROM match_player
            WHERE match_id = $1
            ORDER BY match_player_id ASC
            "#,
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        for row in &player_rows {
            m.player_sums.push(parse_player_row(row)?);
        }

        let medic_rows = sqlx::query(
            r#"
            SELECT
                match_medic_id, steam_id, healing, charges, drops, avg_time_to_build,
                avg_time_before_use, near_full_charge_death, avg_uber_length,
                death_after_charge, major_adv_lost, biggest_adv_lost
            FROM match_medic
            WHERE match_id = $1
            ORDER BY match_medic_id ASC
            "#,
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        for row in &medic_rows {
            m.medic_sums.push(parse_medic_row(row, match_id)?);
        }

        let team_rows = sqlx::query(
            r#"
            SELECT match_team_id, team, kills, damage, charges, drops, caps, mid_fights
            FROM match_team
            WHERE match_id = $1
            ORDER BY team ASC
            "#,
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        for row in &team_rows {
            m.team_sums.push(MatchTeamSum {
                match_team_id: row.try_get("match_team_id")?,
                match_id,
                team: row.try_get("team")?,
                kills: row.try_get("kills")?,
                damage: row.try_get("damage")?,
                charges: row.try_get("charges")?,
                drops: row.try_get("drops")?,
                caps: row.try_get("caps")?,
                mid_fights: row.try_get("mid_fights")?,
            });
        }

        let ids: Vec<SteamId> = m
            .player_sums
            .iter()
            .map(|p| p.steam_id)
            .chain(m.medic_sums.iter().map(|s| s.steam_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        m.players = self.people.resolve_many(&ids).await?.into_iter().collect();

        Ok(m)
    }

    /// Match listing with per-match sums over every player in the match.
    #[instrument(skip(self), fields(repo = "match", operation = "query_matches"))]
    pub async fn query_matches(&self, filter: &MatchesQuery) -> StoreResult<Vec<MatchSummary>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT
                m.match_id, m.server_id, m.map, m.created_on,
                COALESCE(SUM(mp.kills), 0) AS kills,
                COALESCE(SUM(mp.assists), 0) AS assists,
                COALESCE(SUM(mp.damage), 0) AS damage,
                COALESCE(SUM(mp.healing), 0) AS healing,
                COALESCE(SUM(mp.airshots), 0) AS airshots
            FROM matches m
            LEFT JOIN match_player mp ON m.match_id = mp.match_id
            WHERE 1 = 1"#,
        );
        if let Some(map) = filter.map_name.as_deref().filter(|s| !s.is_empty()) {
            qb.push(" AND m.map = ").push_bind(map.to_string());
        }
        if let Some(steam_id) = filter.steam_id {
            if !steam_id.is_valid() {
                return Err(StoreError::invalid(format!("invalid steam id {steam_id}")));
            }
            qb.push(" AND m.match_id IN (SELECT match_id FROM match_player WHERE steam_id = ")
                .push_bind(steam_id.0)
                .push(")");
        }
        qb.push(" GROUP BY m.match_id");
        qb.push(if filter.sort_desc {
            " ORDER BY m.match_id DESC"
        } else {
            " ORDER BY m.match_id ASC"
        });
        if filter.limit > 0 {
            qb.push(" LIMIT ").push_bind(filter.limit as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(MatchSummary {
                match_id: row.try_get("match_id")?,
                server_id: row.try_get("server_id")?,
                map_name: row.try_get("map")?,
                created_on: datetime_from_millis(row.try_get("created_on")?)?,
                kills: row.try_get("kills")?,
                assists: row.try_get("assists")?,
                damage: row.try_get("damage")?,
                healing: row.try_get("healing")?,
                airshots: row.try_get("airshots")?,
            });
        }
        Ok(out)
    }
}

fn parse_player_row(row: &SqliteRow) -> StoreResult<MatchPlayerSum> {
    let time_start = row
        .try_get::<Option<i64>, _>("time_start")?
        .map(datetime_from_millis)
        .transpose()?;
    let time_end = row
        .try_get::<Option<i64>, _>("time_end")?
        .map(datetime_from_millis)
        .transpose()?;
    let mut s = MatchPlayerSum {
        match_player_id: row.try_get("match_player_id")?,
        steam_id: SteamId(row.try_get("steam_id")?),
        team: row.try_get("team")?,
        time_start,
        time_end,
        kills: row.try_get("kills")?,
        assists: row.try_get("assists")?,
        deaths: row.try_get("deaths")?,
        dominations: row.try_get("dominations")?,
        dominated: row.try_get("dominated")?,
        revenges: row.try_get("revenges")?,
        damage: row.try_get("damage")?,
        damage_taken: row.try_get("damage_taken")?,
        healing: row.try_get("healing")?,
        healing_taken: row.try_get("healing_taken")?,
        health_packs: row.try_get("health_packs")?,
        backstabs: row.try_get("backstabs")?,
        headshots: row.try_get("headshots")?,
        airshots: row.try_get("airshots")?,
        captures: row.try_get("captures")?,
        shots: row.try_get("shots")?,
        extinguishes: row.try_get("extinguishes")?,
        hits: row.try_get("hits")?,
        buildings_built: row.try_get("buildings")?,
        buildings_destroyed: row.try_get("buildings_destroyed")?,
        kd_ratio: 0.0,
        kad_ratio: 0.0,
    };
    s.compute_ratios();
    Ok(s)
}

fn parse_medic_row(row: &SqliteRow, match_id: i64) -> StoreResult<MatchMedicSum> {
    let total: i64 = row.try_get("charges")?;
    let mut charges: BTreeMap<Medigun, i64> =
        Medigun::ALL.iter().map(|g| (*g, 0)).collect();
    charges.insert(Medigun::Uber, total);

    Ok(MatchMedicSum {
        match_medic_id: row.try_get("match_medic_id")?,
        match_id,
        steam_id: SteamId(row.try_get("steam_id")?),
        healing: row.try_get("healing")?,
        charges,
        drops: row.try_get("drops")?,
        avg_time_to_build: row.try_get("avg_time_to_build")?,
        avg_time_before_use: row.try_get("avg_time_before_use")?,
        near_full_charge_death: row.try_get("near_full_charge_death")?,
        avg_uber_length: row.try_get("avg_uber_length")?,
        death_after_charge: row.try_get("death_after_charge")?,
        major_adv_lost: row.try_get("major_adv_lost")?,
        biggest_adv_lost: row.try_get("biggest_adv_lost")?,
    })
}
