use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument, warn};

use super::errors::StoreError;
use super::rows::{HitsRow, SettingsRow, StatsRow, WeaponRow};
use super::store::StatsStore;

/// Schema statements, applied in order. Every statement is idempotent:
/// creates use `IF NOT EXISTS` and column widening is a no-op when repeated.
pub const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS lvl_base (
        steam VARCHAR(64) PRIMARY KEY,
        name VARCHAR(255) NOT NULL DEFAULT '',
        "value" INTEGER NOT NULL DEFAULT 0,
        "rank" INTEGER NOT NULL DEFAULT 0,
        kills INTEGER NOT NULL DEFAULT 0,
        deaths INTEGER NOT NULL DEFAULT 0,
        shoots BIGINT NOT NULL DEFAULT 0,
        hits BIGINT NOT NULL DEFAULT 0,
        headshots INTEGER NOT NULL DEFAULT 0,
        assists INTEGER NOT NULL DEFAULT 0,
        round_win INTEGER NOT NULL DEFAULT 0,
        round_lose INTEGER NOT NULL DEFAULT 0,
        playtime BIGINT NOT NULL DEFAULT 0,
        lastconnect BIGINT NOT NULL DEFAULT 0,
        game_wins INTEGER NOT NULL DEFAULT 0,
        game_losses INTEGER NOT NULL DEFAULT 0,
        games_played INTEGER NOT NULL DEFAULT 0,
        rounds_played INTEGER NOT NULL DEFAULT 0,
        damage BIGINT NOT NULL DEFAULT 0
    )"#,
    // Tables created with a 32-bit lastconnect; a no-op once widened.
    r#"ALTER TABLE lvl_base ALTER COLUMN lastconnect TYPE BIGINT"#,
    r#"CREATE INDEX IF NOT EXISTS idx_lvl_base_value ON lvl_base ("value")"#,
    r#"CREATE INDEX IF NOT EXISTS idx_lvl_base_rank ON lvl_base ("rank")"#,
    r#"CREATE INDEX IF NOT EXISTS idx_lvl_base_lastconnect ON lvl_base (lastconnect)"#,
    r#"CREATE TABLE IF NOT EXISTS lvl_base_settings (
        steam VARCHAR(64) PRIMARY KEY,
        messages BOOLEAN NOT NULL DEFAULT TRUE,
        summary BOOLEAN NOT NULL DEFAULT FALSE,
        rankchanges BOOLEAN NOT NULL DEFAULT TRUE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS lvl_base_weapons (
        steam VARCHAR(64) NOT NULL,
        classname VARCHAR(64) NOT NULL,
        kills INTEGER NOT NULL DEFAULT 0,
        deaths INTEGER NOT NULL DEFAULT 0,
        headshots INTEGER NOT NULL DEFAULT 0,
        hits BIGINT NOT NULL DEFAULT 0,
        shots BIGINT NOT NULL DEFAULT 0,
        damage BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (steam, classname)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS lvl_base_hits (
        "SteamID" VARCHAR(64) PRIMARY KEY,
        "DmgHealth" BIGINT NOT NULL DEFAULT 0,
        "DmgArmor" BIGINT NOT NULL DEFAULT 0,
        "Head" INTEGER NOT NULL DEFAULT 0,
        "Chest" INTEGER NOT NULL DEFAULT 0,
        "Belly" INTEGER NOT NULL DEFAULT 0,
        "LeftArm" INTEGER NOT NULL DEFAULT 0,
        "RightArm" INTEGER NOT NULL DEFAULT 0,
        "LeftLeg" INTEGER NOT NULL DEFAULT 0,
        "RightLeg" INTEGER NOT NULL DEFAULT 0,
        "Neak" INTEGER NOT NULL DEFAULT 0
    )"#,
];

const STATS_COLUMNS: &str = concat!(
    r#"steam, name, "value", "rank", kills, deaths, shoots, hits, headshots, assists, "#,
    "round_win, round_lose, playtime, lastconnect, game_wins, game_losses, games_played, ",
    "rounds_played, damage",
);

const HITS_COLUMNS: &str = concat!(
    r#""SteamID", "DmgHealth", "DmgArmor", "Head", "Chest", "Belly", "#,
    r#""LeftArm", "RightArm", "LeftLeg", "RightLeg", "Neak""#,
);

/// PostgreSQL implementation of the statistics store
pub struct PostgresStatsStore {
    pool: PgPool,
}

impl PostgresStatsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn log_failure(operation: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| {
        let err = StoreError::from(e);
        if !err.is_conflict() {
            warn!(error = %err, operation, "Statistics query failed");
        }
        err
    }
}

#[async_trait]
impl StatsStore for PostgresStatsStore {
    #[instrument(skip(self))]
    async fn migrate(&self) -> Result<(), StoreError> {
        for (index, statement) in MIGRATIONS.iter().enumerate() {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(log_failure("migrate"))?;
            debug!(step = index + 1, "Applied schema statement");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_stats(&self, steam: &str) -> Result<Option<StatsRow>, StoreError> {
        let query = format!("SELECT {STATS_COLUMNS} FROM lvl_base WHERE steam = $1");
        sqlx::query_as::<_, StatsRow>(&query)
            .bind(steam)
            .fetch_optional(&self.pool)
            .await
            .map_err(log_failure("fetch_stats"))
    }

    #[instrument(skip(self, row), fields(steam = %row.steam))]
    async fn insert_stats(&self, row: &StatsRow) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO lvl_base ({STATS_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"
        );
        bind_stats(sqlx::query(&query), row)
            .execute(&self.pool)
            .await
            .map_err(log_failure("insert_stats"))?;
        Ok(())
    }

    #[instrument(skip(self, row), fields(steam = %row.steam))]
    async fn update_stats(&self, row: &StatsRow) -> Result<u64, StoreError> {
        let result = bind_stats(
            sqlx::query(
                r#"UPDATE lvl_base SET name = $2, "value" = $3, "rank" = $4, kills = $5,
                   deaths = $6, shoots = $7, hits = $8, headshots = $9, assists = $10,
                   round_win = $11, round_lose = $12, playtime = $13, lastconnect = $14,
                   game_wins = $15, game_losses = $16, games_played = $17, rounds_played = $18,
                   damage = $19
                   WHERE steam = $1"#,
            ),
            row,
        )
        .execute(&self.pool)
        .await
        .map_err(log_failure("update_stats"))?;
        Ok(result.rows_affected())
    }

    async fn fetch_settings(&self, steam: &str) -> Result<Option<SettingsRow>, StoreError> {
        sqlx::query_as::<_, SettingsRow>(
            "SELECT steam, messages, summary, rankchanges FROM lvl_base_settings WHERE steam = $1",
        )
        .bind(steam)
        .fetch_optional(&self.pool)
        .await
        .map_err(log_failure("fetch_settings"))
    }

    async fn insert_settings(&self, row: &SettingsRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO lvl_base_settings (steam, messages, summary, rankchanges) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&row.steam)
        .bind(row.messages)
        .bind(row.summary)
        .bind(row.rankchanges)
        .execute(&self.pool)
        .await
        .map_err(log_failure("insert_settings"))?;
        Ok(())
    }

    async fn update_settings(&self, row: &SettingsRow) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE lvl_base_settings SET messages = $2, summary = $3, rankchanges = $4 \
             WHERE steam = $1",
        )
        .bind(&row.steam)
        .bind(row.messages)
        .bind(row.summary)
        .bind(row.rankchanges)
        .execute(&self.pool)
        .await
        .map_err(log_failure("update_settings"))?;
        Ok(result.rows_affected())
    }

    async fn fetch_weapons(&self, steam: &str) -> Result<Vec<WeaponRow>, StoreError> {
        sqlx::query_as::<_, WeaponRow>(
            "SELECT steam, classname, kills, deaths, headshots, hits, shots, damage \
             FROM lvl_base_weapons WHERE steam = $1 ORDER BY classname",
        )
        .bind(steam)
        .fetch_all(&self.pool)
        .await
        .map_err(log_failure("fetch_weapons"))
    }

    async fn insert_weapon(&self, row: &WeaponRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO lvl_base_weapons \
             (steam, classname, kills, deaths, headshots, hits, shots, damage) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&row.steam)
        .bind(&row.classname)
        .bind(row.kills)
        .bind(row.deaths)
        .bind(row.headshots)
        .bind(row.hits)
        .bind(row.shots)
        .bind(row.damage)
        .execute(&self.pool)
        .await
        .map_err(log_failure("insert_weapon"))?;
        Ok(())
    }

    async fn update_weapon(&self, row: &WeaponRow) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE lvl_base_weapons SET kills = $3, deaths = $4, headshots = $5, hits = $6, \
             shots = $7, damage = $8 WHERE steam = $1 AND classname = $2",
        )
        .bind(&row.steam)
        .bind(&row.classname)
        .bind(row.kills)
        .bind(row.deaths)
        .bind(row.headshots)
        .bind(row.hits)
        .bind(row.shots)
        .bind(row.damage)
        .execute(&self.pool)
        .await
        .map_err(log_failure("update_weapon"))?;
        Ok(result.rows_affected())
    }

    async fn fetch_hits(&self, steam: &str) -> Result<Option<HitsRow>, StoreError> {
        let query = format!(r#"SELECT {HITS_COLUMNS} FROM lvl_base_hits WHERE "SteamID" = $1"#);
        sqlx::query_as::<_, HitsRow>(&query)
            .bind(steam)
            .fetch_optional(&self.pool)
            .await
            .map_err(log_failure("fetch_hits"))
    }

    async fn insert_hits(&self, row: &HitsRow) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO lvl_base_hits ({HITS_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        );
        bind_hits(sqlx::query(&query), row)
            .execute(&self.pool)
            .await
            .map_err(log_failure("insert_hits"))?;
        Ok(())
    }

    async fn update_hits(&self, row: &HitsRow) -> Result<u64, StoreError> {
        let result = bind_hits(
            sqlx::query(
                r#"UPDATE lvl_base_hits SET "DmgHealth" = $2, "DmgArmor" = $3, "Head" = $4,
                   "Chest" = $5, "Belly" = $6, "LeftArm" = $7, "RightArm" = $8,
                   "LeftLeg" = $9, "RightLeg" = $10, "Neak" = $11 WHERE "SteamID" = $1"#,
            ),
            row,
        )
        .execute(&self.pool)
        .await
        .map_err(log_failure("update_hits"))?;
        Ok(result.rows_affected())
    }

    async fn count_above(&self, points: i32) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM lvl_base WHERE "value" > $1"#)
            .bind(points)
            .fetch_one(&self.pool)
            .await
            .map_err(log_failure("count_above"))?;
        Ok(count.max(0) as u64)
    }

    async fn count_players(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lvl_base")
            .fetch_one(&self.pool)
            .await
            .map_err(log_failure("count_players"))?;
        Ok(count.max(0) as u64)
    }

    async fn top_by_points(&self, limit: u32) -> Result<Vec<StatsRow>, StoreError> {
        let query = format!(
            r#"SELECT {STATS_COLUMNS} FROM lvl_base ORDER BY "value" DESC, steam ASC LIMIT $1"#
        );
        sqlx::query_as::<_, StatsRow>(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(log_failure("top_by_points"))
    }

    async fn top_by_playtime(&self, limit: u32) -> Result<Vec<StatsRow>, StoreError> {
        let query = format!(
            "SELECT {STATS_COLUMNS} FROM lvl_base ORDER BY playtime DESC, steam ASC LIMIT $1"
        );
        sqlx::query_as::<_, StatsRow>(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(log_failure("top_by_playtime"))
    }

    #[instrument(skip(self))]
    async fn delete_stale(&self, cutoff_epoch: i64) -> Result<u64, StoreError> {
        let purged: i64 = sqlx::query_scalar(
            r#"WITH purged AS (
                   DELETE FROM lvl_base WHERE lastconnect > 0 AND lastconnect < $1 RETURNING steam
               ), settings AS (
                   DELETE FROM lvl_base_settings WHERE steam IN (SELECT steam FROM purged)
               ), weapons AS (
                   DELETE FROM lvl_base_weapons WHERE steam IN (SELECT steam FROM purged)
               ), hits AS (
                   DELETE FROM lvl_base_hits WHERE "SteamID" IN (SELECT steam FROM purged)
               )
               SELECT COUNT(*) FROM purged"#,
        )
        .bind(cutoff_epoch)
        .fetch_one(&self.pool)
        .await
        .map_err(log_failure("delete_stale"))?;

        debug!(purged, "Stale identities removed from database");
        Ok(purged.max(0) as u64)
    }

    #[instrument(skip(self))]
    async fn reset_stats(&self, steam: &str, start_points: i32) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"UPDATE lvl_base SET "value" = $2, "rank" = 0, kills = 0, deaths = 0, shoots = 0,
               hits = 0, headshots = 0, assists = 0, round_win = 0, round_lose = 0, playtime = 0,
               game_wins = 0, game_losses = 0, games_played = 0, rounds_played = 0, damage = 0
               WHERE steam = $1"#,
        )
        .bind(steam)
        .bind(start_points)
        .execute(&self.pool)
        .await
        .map_err(log_failure("reset_stats"))?;
        Ok(result.rows_affected())
    }

    async fn delete_weapons(&self, steam: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM lvl_base_weapons WHERE steam = $1")
            .bind(steam)
            .execute(&self.pool)
            .await
            .map_err(log_failure("delete_weapons"))?;
        Ok(result.rows_affected())
    }

    async fn delete_hits(&self, steam: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(r#"DELETE FROM lvl_base_hits WHERE "SteamID" = $1"#)
            .bind(steam)
            .execute(&self.pool)
            .await
            .map_err(log_failure("delete_hits"))?;
        Ok(result.rows_affected())
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn bind_stats<'q>(query: PgQuery<'q>, row: &'q StatsRow) -> PgQuery<'q> {
    query
        .bind(&row.steam)
        .bind(&row.name)
        .bind(row.value)
        .bind(row.rank)
        .bind(row.kills)
        .bind(row.deaths)
        .bind(row.shoots)
        .bind(row.hits)
        .bind(row.headshots)
        .bind(row.assists)
        .bind(row.round_win)
        .bind(row.round_lose)
        .bind(row.playtime)
        .bind(row.lastconnect)
        .bind(row.game_wins)
        .bind(row.game_losses)
        .bind(row.games_played)
        .bind(row.rounds_played)
        .bind(row.damage)
}

fn bind_hits<'q>(query: PgQuery<'q>, row: &'q HitsRow) -> PgQuery<'q> {
    query
        .bind(&row.steam_id)
        .bind(row.dmg_health)
        .bind(row.dmg_armor)
        .bind(row.head)
        .bind(row.chest)
        .bind(row.belly)
        .bind(row.left_arm)
        .bind(row.right_arm)
        .bind(row.left_leg)
        .bind(row.right_leg)
        .bind(row.neck)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_migration_is_idempotent() {
        for statement in MIGRATIONS {
            let widening = statement.starts_with("ALTER TABLE") && statement.contains(" TYPE ");
            assert!(
                statement.contains("IF NOT EXISTS") || widening,
                "statement is not idempotent: {statement}"
            );
        }
    }

    #[test]
    fn lastconnect_holds_epochs_past_2038() {
        let create = MIGRATIONS
            .iter()
            .position(|s| s.contains("CREATE TABLE IF NOT EXISTS lvl_base ("))
            .unwrap();
        let widen = MIGRATIONS
            .iter()
            .position(|s| s.contains("ALTER COLUMN lastconnect TYPE BIGINT"))
            .unwrap();

        assert!(MIGRATIONS[create].contains("lastconnect BIGINT"));
        assert!(widen > create);
    }

    #[test]
    fn hits_table_keeps_legacy_column_names() {
        let hits = MIGRATIONS
            .iter()
            .find(|statement| statement.contains("lvl_base_hits"))
            .unwrap();
        assert!(hits.contains(r#""Neak""#));
        assert!(hits.contains(r#""SteamID""#));
    }
}
