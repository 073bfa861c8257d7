// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording queries. Derived fields are write-once: every update is guarded
//! by `IS NULL` so the first writer wins.

use doorstep_core::{DoorstepError, Intent, NewRecording, Recording, RecordingInsert};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::database::{Database, NOW, map_tr_err};
use crate::queries::json_column;

const RECORDING_COLUMNS: &str = "id, call_log_id, audio_url, audio_durable, duration_secs, \
     transcript, intent, notified_at, created_at, updated_at";

fn recording_from_row(row: &Row<'_>) -> rusqlite::Result<Recording> {
    let intent: Option<String> = row.get(6)?;
    Ok(Recording {
        id: row.get(0)?,
        call_log_id: row.get(1)?,
        audio_url: row.get(2)?,
        audio_durable: row.get(3)?,
        duration_secs: row.get(4)?,
        transcript: row.get(5)?,
        intent: intent.as_deref().map(|raw| json_column(6, raw)).transpose()?,
        notified_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn select_where(conn: &Connection, column: &str, value: &str) -> rusqlite::Result<Option<Recording>> {
    conn.query_row(
        &format!("SELECT {RECORDING_COLUMNS} FROM recordings WHERE {column} = ?1"),
        params![value],
        recording_from_row,
    )
    .optional()
}

pub async fn insert_recording(
    db: &Database,
    recording: &NewRecording,
) -> Result<RecordingInsert, DoorstepError> {
    let r = recording.clone();
    db.connection()
        .call(move |conn| -> Result<RecordingInsert, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let id = uuid::Uuid::new_v4().to_string();
            let inserted = tx.execute(
                "INSERT INTO recordings (id, call_log_id, audio_url, audio_durable, duration_secs)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(call_log_id) DO NOTHING",
                params![id, r.call_log_id, r.audio_url, r.audio_durable, r.duration_secs],
            )?;
            let row = select_where(&tx, "call_log_id", &r.call_log_id)?
                .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok(if inserted == 1 {
                RecordingInsert::Inserted(row)
            } else {
                RecordingInsert::Existing(row)
            })
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_recording(db: &Database, id: &str) -> Result<Option<Recording>, DoorstepError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Recording>, rusqlite::Error> {
            select_where(conn, "id", &id)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_recording_for_call(
    db: &Database,
    call_log_id: &str,
) -> Result<Option<Recording>, DoorstepError> {
    let call_log_id = call_log_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Recording>, rusqlite::Error> {
            select_where(conn, "call_log_id", &call_log_id)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_transcript_if_absent(
    db: &Database,
    recording_id: &str,
    transcript: &str,
) -> Result<bool, DoorstepError> {
    let id = recording_id.to_string();
    let transcript = transcript.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                &format!(
                    "UPDATE recordings SET transcript = ?2, updated_at = {NOW}
                     WHERE id = ?1 AND transcript IS NULL"
                ),
                params![id, transcript],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_intent_if_absent(
    db: &Database,
    recording_id: &str,
    intent: &Intent,
) -> Result<bool, DoorstepError> {
    let id = recording_id.to_string();
    let intent = serde_json::to_string(intent).map_err(DoorstepError::storage)?;
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                &format!(
                    "UPDATE recordings SET intent = ?2, updated_at = {NOW}
                     WHERE id = ?1 AND intent IS NULL"
                ),
                params![id, intent],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn claim_notification(db: &Database, recording_id: &str) -> Result<bool, DoorstepError> {
    let id = recording_id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                &format!(
                    "UPDATE recordings SET notified_at = {NOW}, updated_at = {NOW}
                     WHERE id = ?1 AND notified_at IS NULL"
                ),
                params![id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{calls, deliveries};
    use doorstep_core::{Customer, Delivery, DeliveryStatus, Priority};

    async fn with_call() -> (Database, String) {
        let db = Database::open_in_memory().await.unwrap();
        deliveries::insert_customer(
            &db,
            &Customer {
                id: "C1".into(),
                name: "Ada".into(),
                phone: "+15550001111".into(),
            },
        )
        .await
        .unwrap();
        deliveries::insert_delivery(
            &db,
            &Delivery {
                id: "D1".into(),
                customer_id: "C1".into(),
                agent_id: None,
                address: "1 Main St".into(),
                scheduled_at: "2026-01-01T10:00:00.000Z".into(),
                status: DeliveryStatus::Scheduled,
                created_at: "2026-01-01T00:00:00.000Z".into(),
                updated_at: "2026-01-01T00:00:00.000Z".into(),
            },
        )
        .await
        .unwrap();
        let call = calls::ensure_call(&db, "D1", "CA1").await.unwrap();
        (db, call.id)
    }

    fn new_recording(call_log_id: &str, url: &str) -> NewRecording {
        NewRecording {
            call_log_id: call_log_id.to_string(),
            audio_url: url.to_string(),
            audio_durable: true,
            duration_secs: 30,
        }
    }

    #[tokio::test]
    async fn second_insert_returns_existing_row() {
        let (db, call_id) = with_call().await;
        let first = insert_recording(&db, &new_recording(&call_id, "https://cdn/a.wav"))
            .await
            .unwrap();
        assert!(first.inserted());

        let second = insert_recording(&db, &new_recording(&call_id, "https://cdn/b.wav"))
            .await
            .unwrap();
        assert!(!second.inserted());
        assert_eq!(second.recording().id, first.recording().id);
        assert_eq!(second.recording().audio_url, "https://cdn/a.wav");
    }

    #[tokio::test]
    async fn audio_url_cannot_be_rewritten() {
        let (db, call_id) = with_call().await;
        let rec = insert_recording(&db, &new_recording(&call_id, "https://cdn/a.wav"))
            .await
            .unwrap()
            .into_recording();
        let id = rec.id.clone();
        let result = db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "UPDATE recordings SET audio_url = 'https://elsewhere' WHERE id = ?1",
                    params![id],
                )
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn transcript_first_writer_wins() {
        let (db, call_id) = with_call().await;
        let rec = insert_recording(&db, &new_recording(&call_id, "u"))
            .await
            .unwrap()
            .into_recording();
        assert!(set_transcript_if_absent(&db, &rec.id, "leave it at the door").await.unwrap());
        assert!(!set_transcript_if_absent(&db, &rec.id, "something else").await.unwrap());
        let stored = get_recording(&db, &rec.id).await.unwrap().unwrap();
        assert_eq!(stored.transcript.as_deref(), Some("leave it at the door"));
    }

    #[tokio::test]
    async fn intent_round_trips_through_json_column() {
        let (db, call_id) = with_call().await;
        let rec = insert_recording(&db, &new_recording(&call_id, "u"))
            .await
            .unwrap()
            .into_recording();
        let intent = Intent {
            priority: Priority::Urgent,
            time_sensitive: true,
            conditions: vec!["leave at door".into()],
            ..Intent::default()
        };
        assert!(set_intent_if_absent(&db, &rec.id, &intent).await.unwrap());
        assert!(!set_intent_if_absent(&db, &rec.id, &Intent::default()).await.unwrap());
        let stored = get_recording_for_call(&db, &call_id).await.unwrap().unwrap();
        assert_eq!(stored.intent, Some(intent));
    }

    #[tokio::test]
    async fn notification_is_claimed_once() {
        let (db, call_id) = with_call().await;
        let rec = insert_recording(&db, &new_recording(&call_id, "u"))
            .await
            .unwrap()
            .into_recording();
        assert!(claim_notification(&db, &rec.id).await.unwrap());
        assert!(!claim_notification(&db, &rec.id).await.unwrap());
        let stored = get_recording(&db, &rec.id).await.unwrap().unwrap();
        assert!(stored.notified_at.is_some());
    }
}
