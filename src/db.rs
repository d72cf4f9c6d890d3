use std::str::FromStr;

use anyhow::Context;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection};
use uuid::fmt::Hyphenated;
use uuid::Uuid;

use crate::models::{
    AssessmentKind, Cycle, DataExport, Grade, HistoryEntry, RawScores, StudentInputs,
    StudentSnapshot,
};

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url {database_url}"))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database {database_url}"))?;
    Ok(pool)
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Replaces the current snapshot wholesale.
pub async fn save_current(pool: &SqlitePool, snapshot: &StudentSnapshot) -> anyhow::Result<()> {
    let mut conn = pool.acquire().await?;
    upsert_current(&mut conn, snapshot).await?;
    tracing::debug!(student = %snapshot.student_name, "current snapshot saved");
    Ok(())
}

pub async fn load_current(pool: &SqlitePool) -> anyhow::Result<Option<StudentSnapshot>> {
    let row = sqlx::query("SELECT * FROM current_snapshot WHERE slot = 1")
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(snapshot_from_row).transpose()
}

pub async fn clear_current(pool: &SqlitePool) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM current_snapshot")
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Appends a snapshot to the history log and drops all but the newest
/// `max_entries` entries (never fewer than one).
pub async fn append_history(
    pool: &SqlitePool,
    snapshot: &StudentSnapshot,
    max_entries: usize,
) -> anyhow::Result<HistoryEntry> {
    let entry = HistoryEntry {
        id: Uuid::new_v4(),
        recorded_at: Utc::now(),
        snapshot: snapshot.clone(),
    };

    let mut tx = pool.begin().await?;
    insert_history(&mut tx, &entry).await?;
    let trimmed = trim_history(&mut tx, max_entries).await?;
    tx.commit().await?;

    if trimmed > 0 {
        tracing::debug!(trimmed, "history trimmed to {max_entries} entries");
    }
    Ok(entry)
}

/// History in insertion order, oldest first.
pub async fn load_history(pool: &SqlitePool) -> anyhow::Result<Vec<HistoryEntry>> {
    let rows = sqlx::query("SELECT * FROM snapshot_history ORDER BY seq")
        .fetch_all(pool)
        .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let id: Hyphenated = row.try_get("id")?;
        entries.push(HistoryEntry {
            id: id.into_uuid(),
            recorded_at: row.try_get("recorded_at")?,
            snapshot: snapshot_from_row(&row)?,
        });
    }
    Ok(entries)
}

/// History entries in which `kind` had been entered.
pub async fn history_for(
    pool: &SqlitePool,
    kind: AssessmentKind,
) -> anyhow::Result<Vec<HistoryEntry>> {
    let mut entries = load_history(pool).await?;
    entries.retain(|entry| entry.snapshot.inputs.scores.has_entry(kind));
    Ok(entries)
}

pub async fn clear_history(pool: &SqlitePool) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM snapshot_history")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn export_all(pool: &SqlitePool) -> anyhow::Result<DataExport> {
    Ok(DataExport {
        current: load_current(pool).await?,
        history: Some(load_history(pool).await?),
        exported_at: Utc::now(),
    })
}

/// Restores a backup. Only the parts the backup carries are replaced: a
/// missing `current` keeps the stored snapshot and a missing `history`
/// keeps the stored log. Returns the number of history entries imported.
pub async fn import_all(
    pool: &SqlitePool,
    data: &DataExport,
    max_entries: usize,
) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;

    if let Some(current) = &data.current {
        upsert_current(&mut tx, current).await?;
    }

    let mut kept = 0usize;
    if let Some(history) = &data.history {
        sqlx::query("DELETE FROM snapshot_history")
            .execute(&mut *tx)
            .await?;

        let skip = history.len().saturating_sub(max_entries.max(1));
        for entry in history.iter().skip(skip) {
            insert_history(&mut tx, entry).await?;
            kept += 1;
        }
        if skip > 0 {
            tracing::debug!(skipped = skip, "older backup entries dropped");
        }
    }

    tx.commit().await?;
    tracing::info!(
        kept,
        current = data.current.is_some(),
        history = data.history.is_some(),
        "backup imported"
    );
    Ok(kept)
}

async fn upsert_current(
    conn: &mut SqliteConnection,
    snapshot: &StudentSnapshot,
) -> anyhow::Result<()> {
    let inputs = &snapshot.inputs;
    let scores = &inputs.scores;
    sqlx::query(
        r#"
        INSERT INTO current_snapshot
        (slot, student_name, grade, cycle, elpac_test_grade,
         elpac_oral, elpac_written, sbac, i_ready, edcite_a, edcite_b, last_updated)
        VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (slot) DO UPDATE
        SET student_name = excluded.student_name,
            grade = excluded.grade,
            cycle = excluded.cycle,
            elpac_test_grade = excluded.elpac_test_grade,
            elpac_oral = excluded.elpac_oral,
            elpac_written = excluded.elpac_written,
            sbac = excluded.sbac,
            i_ready = excluded.i_ready,
            edcite_a = excluded.edcite_a,
            edcite_b = excluded.edcite_b,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(&snapshot.student_name)
    .bind(i64::from(inputs.grade.number()))
    .bind(i64::from(inputs.cycle.number()))
    .bind(i64::from(inputs.elpac_test_grade.number()))
    .bind(&scores.elpac_oral)
    .bind(&scores.elpac_written)
    .bind(&scores.sbac)
    .bind(&scores.i_ready)
    .bind(&scores.edcite_a)
    .bind(&scores.edcite_b)
    .bind(snapshot.last_updated)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_history(conn: &mut SqliteConnection, entry: &HistoryEntry) -> anyhow::Result<()> {
    let snapshot = &entry.snapshot;
    let inputs = &snapshot.inputs;
    let scores = &inputs.scores;
    sqlx::query(
        r#"
        INSERT INTO snapshot_history
        (id, recorded_at, student_name, grade, cycle, elpac_test_grade,
         elpac_oral, elpac_written, sbac, i_ready, edcite_a, edcite_b, last_updated)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.hyphenated())
    .bind(entry.recorded_at)
    .bind(&snapshot.student_name)
    .bind(i64::from(inputs.grade.number()))
    .bind(i64::from(inputs.cycle.number()))
    .bind(i64::from(inputs.elpac_test_grade.number()))
    .bind(&scores.elpac_oral)
    .bind(&scores.elpac_written)
    .bind(&scores.sbac)
    .bind(&scores.i_ready)
    .bind(&scores.edcite_a)
    .bind(&scores.edcite_b)
    .bind(snapshot.last_updated)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn trim_history(conn: &mut SqliteConnection, max_entries: usize) -> anyhow::Result<u64> {
    let keep = i64::try_from(max_entries.max(1)).unwrap_or(i64::MAX);
    let result = sqlx::query(
        r#"
        DELETE FROM snapshot_history
        WHERE seq NOT IN (
            SELECT seq FROM snapshot_history ORDER BY seq DESC LIMIT ?
        )
        "#,
    )
    .bind(keep)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

fn snapshot_from_row(row: &SqliteRow) -> anyhow::Result<StudentSnapshot> {
    Ok(StudentSnapshot {
        student_name: row.try_get("student_name")?,
        inputs: StudentInputs {
            grade: grade_column(row.try_get("grade")?)?,
            cycle: cycle_column(row.try_get("cycle")?)?,
            elpac_test_grade: grade_column(row.try_get("elpac_test_grade")?)?,
            scores: RawScores {
                elpac_oral: row.try_get("elpac_oral")?,
                elpac_written: row.try_get("elpac_written")?,
                sbac: row.try_get("sbac")?,
                i_ready: row.try_get("i_ready")?,
                edcite_a: row.try_get("edcite_a")?,
                edcite_b: row.try_get("edcite_b")?,
            },
        },
        last_updated: row.try_get("last_updated")?,
    })
}

fn grade_column(value: i64) -> anyhow::Result<Grade> {
    let number = u8::try_from(value).with_context(|| format!("bad grade column {value}"))?;
    Ok(Grade::try_from(number)?)
}

fn cycle_column(value: i64) -> anyhow::Result<Cycle> {
    let number = u8::try_from(value).with_context(|| format!("bad cycle column {value}"))?;
    Ok(Cycle::try_from(number)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    async fn memory_pool() -> SqlitePool {
        let pool = connect("sqlite::memory:").await.unwrap();
        init_db(&pool).await.unwrap();
        pool
    }

    fn at(minute: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::minutes(minute)
    }

    fn snapshot(name: &str, sbac: &str, minute: i64) -> StudentSnapshot {
        StudentSnapshot {
            student_name: name.to_string(),
            inputs: StudentInputs {
                grade: Grade::Eighth,
                cycle: Cycle::Second,
                elpac_test_grade: Grade::Seventh,
                scores: RawScores {
                    elpac_oral: "1580".to_string(),
                    elpac_written: "1575".to_string(),
                    sbac: sbac.to_string(),
                    ..RawScores::default()
                },
            },
            last_updated: at(minute),
        }
    }

    #[tokio::test]
    async fn current_snapshot_is_overwritten_wholesale() {
        let pool = memory_pool().await;
        assert_eq!(load_current(&pool).await.unwrap(), None);

        save_current(&pool, &snapshot("Maya Ortiz", "2500", 0))
            .await
            .unwrap();
        let mut second = snapshot("Maya Ortiz", "", 5);
        second.inputs.scores.edcite_b = "40".to_string();
        save_current(&pool, &second).await.unwrap();

        let loaded = load_current(&pool).await.unwrap().unwrap();
        assert_eq!(loaded, second);
        assert_eq!(loaded.inputs.scores.sbac, "");
    }

    #[tokio::test]
    async fn clear_current_reports_whether_anything_was_removed() {
        let pool = memory_pool().await;
        assert!(!clear_current(&pool).await.unwrap());
        save_current(&pool, &snapshot("Maya Ortiz", "", 0))
            .await
            .unwrap();
        assert!(clear_current(&pool).await.unwrap());
        assert_eq!(load_current(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn history_keeps_newest_entries_in_order() {
        let pool = memory_pool().await;
        for i in 0..55 {
            append_history(&pool, &snapshot(&format!("entry {i}"), "", i), 50)
                .await
                .unwrap();
        }

        let history = load_history(&pool).await.unwrap();
        assert_eq!(history.len(), 50);
        assert_eq!(history[0].snapshot.student_name, "entry 5");
        assert_eq!(history[49].snapshot.student_name, "entry 54");
    }

    #[tokio::test]
    async fn zero_cap_still_keeps_the_entry_just_saved() {
        let pool = memory_pool().await;
        append_history(&pool, &snapshot("old", "", 0), 50)
            .await
            .unwrap();
        let entry = append_history(&pool, &snapshot("new", "", 1), 0)
            .await
            .unwrap();

        let history = load_history(&pool).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, entry.id);
    }

    #[tokio::test]
    async fn history_for_filters_on_entered_assessment() {
        let pool = memory_pool().await;
        append_history(&pool, &snapshot("a", "2500", 0), 50)
            .await
            .unwrap();
        append_history(&pool, &snapshot("b", "", 1), 50)
            .await
            .unwrap();

        let sbac = history_for(&pool, AssessmentKind::Sbac).await.unwrap();
        assert_eq!(sbac.len(), 1);
        assert_eq!(sbac[0].snapshot.student_name, "a");

        let elpac = history_for(&pool, AssessmentKind::Elpac).await.unwrap();
        assert_eq!(elpac.len(), 2);
        assert!(history_for(&pool, AssessmentKind::IReady)
            .await
            .unwrap()
            .is_empty());

        assert_eq!(clear_history(&pool).await.unwrap(), 2);
        assert!(load_history(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn import_replaces_everything_from_export() {
        let source = memory_pool().await;
        save_current(&source, &snapshot("Maya Ortiz", "2500", 0))
            .await
            .unwrap();
        for i in 0..3 {
            append_history(&source, &snapshot("Maya Ortiz", "2500", i), 50)
                .await
                .unwrap();
        }
        let backup = export_all(&source).await.unwrap();

        let target = memory_pool().await;
        save_current(&target, &snapshot("Someone Else", "", 9))
            .await
            .unwrap();
        append_history(&target, &snapshot("Someone Else", "", 9), 50)
            .await
            .unwrap();

        let kept = import_all(&target, &backup, 50).await.unwrap();
        assert_eq!(kept, 3);

        let restored = export_all(&target).await.unwrap();
        assert_eq!(restored.current, backup.current);
        let ids = |data: &DataExport| {
            data.history
                .iter()
                .flatten()
                .map(|e| e.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&restored), ids(&backup));
    }

    #[tokio::test]
    async fn import_respects_history_cap() {
        let pool = memory_pool().await;
        let history = (0..4)
            .map(|i| HistoryEntry {
                id: Uuid::new_v4(),
                recorded_at: at(i),
                snapshot: snapshot(&format!("entry {i}"), "", i),
            })
            .collect();
        let backup = DataExport {
            current: None,
            history: Some(history),
            exported_at: at(10),
        };

        assert_eq!(import_all(&pool, &backup, 2).await.unwrap(), 2);
        let names: Vec<_> = load_history(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.snapshot.student_name)
            .collect();
        assert_eq!(names, vec!["entry 2", "entry 3"]);
        assert_eq!(load_current(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn import_keeps_what_the_backup_leaves_out() {
        let pool = memory_pool().await;
        let current = snapshot("Maya Ortiz", "2500", 0);
        save_current(&pool, &current).await.unwrap();
        let saved = append_history(&pool, &current, 50).await.unwrap();

        let bare: DataExport =
            serde_json::from_str(r#"{"exportedAt":"2026-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(bare.current, None);
        assert_eq!(bare.history, None);
        assert_eq!(import_all(&pool, &bare, 50).await.unwrap(), 0);

        assert_eq!(load_current(&pool).await.unwrap(), Some(current.clone()));
        let history = load_history(&pool).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, saved.id);

        // History only: the log is replaced, the snapshot stays.
        let history_only = DataExport {
            current: None,
            history: Some(Vec::new()),
            exported_at: at(20),
        };
        assert_eq!(import_all(&pool, &history_only, 50).await.unwrap(), 0);
        assert!(load_history(&pool).await.unwrap().is_empty());
        assert_eq!(load_current(&pool).await.unwrap(), Some(current));
    }

    #[tokio::test]
    async fn history_ids_survive_storage() {
        let pool = memory_pool().await;
        let entry = append_history(&pool, &snapshot("Maya Ortiz", "", 0), 50)
            .await
            .unwrap();
        let stored: String = sqlx::query_scalar("SELECT id FROM snapshot_history")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, entry.id.to_string());
        assert_eq!(load_history(&pool).await.unwrap()[0].id, entry.id);
    }
}
