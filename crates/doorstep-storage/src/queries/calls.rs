// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call log queries.
//!
//! Writes run inside `BEGIN IMMEDIATE` transactions so the read of the
//! current row and the conditional update happen under the write lock. The
//! partial unique index `idx_call_logs_one_active` backs the one-active-leg
//! rule at the schema level.

use doorstep_core::{CallLog, CallStatus, CallSync, DoorstepError, RecordingLeg};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::warn;

use crate::database::{Database, NOW, map_tr_err};
use crate::queries::parse_column;

const CALL_COLUMNS: &str =
    "id, delivery_id, call_sid, status, duration_secs, recording_url, created_at, updated_at";

const ACTIVE_STATUSES: &str = "('queued', 'initiated', 'ringing', 'answered')";

fn call_from_row(row: &Row<'_>) -> rusqlite::Result<CallLog> {
    let status: String = row.get(3)?;
    Ok(CallLog {
        id: row.get(0)?,
        delivery_id: row.get(1)?,
        call_sid: row.get(2)?,
        status: parse_column(3, &status)?,
        duration_secs: row.get(4)?,
        recording_url: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn select_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<CallLog>> {
    conn.query_row(
        &format!("SELECT {CALL_COLUMNS} FROM call_logs WHERE id = ?1"),
        params![id],
        call_from_row,
    )
    .optional()
}

fn select_by_sid(conn: &Connection, call_sid: &str) -> rusqlite::Result<Option<CallLog>> {
    conn.query_row(
        &format!("SELECT {CALL_COLUMNS} FROM call_logs WHERE call_sid = ?1"),
        params![call_sid],
        call_from_row,
    )
    .optional()
}

fn select_active(conn: &Connection, delivery_id: &str) -> rusqlite::Result<Option<CallLog>> {
    conn.query_row(
        &format!(
            "SELECT {CALL_COLUMNS} FROM call_logs
             WHERE delivery_id = ?1 AND status IN {ACTIVE_STATUSES}"
        ),
        params![delivery_id],
        call_from_row,
    )
    .optional()
}

fn insert_call(
    conn: &Connection,
    delivery_id: &str,
    call_sid: Option<&str>,
) -> rusqlite::Result<CallLog> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO call_logs (id, delivery_id, call_sid, status) VALUES (?1, ?2, ?3, 'queued')",
        params![id, delivery_id, call_sid],
    )?;
    select_by_id(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Writes status (and optionally duration) for a row and returns the new row.
fn write_status(
    conn: &Connection,
    id: &str,
    status: CallStatus,
    duration_secs: Option<u32>,
) -> rusqlite::Result<CallLog> {
    conn.execute(
        &format!(
            "UPDATE call_logs
             SET status = ?2, duration_secs = COALESCE(?3, duration_secs), updated_at = {NOW}
             WHERE id = ?1"
        ),
        params![id, status.to_string(), duration_secs],
    )?;
    select_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Forward-only status transition on an existing row.
fn transition(
    conn: &Connection,
    current: CallLog,
    status: CallStatus,
    duration_secs: Option<u32>,
) -> rusqlite::Result<CallSync> {
    let previous = current.status;
    if previous.can_advance_to(status) {
        let call = write_status(conn, &current.id, status, duration_secs)?;
        return Ok(CallSync {
            call,
            previous,
            transitioned: true,
        });
    }

    // A repeated terminal report may carry the authoritative call duration.
    let refresh_duration = previous == status
        && status.is_terminal()
        && duration_secs.is_some_and(|d| d > 0 && d != current.duration_secs);
    let call = if refresh_duration {
        write_status(conn, &current.id, status, duration_secs)?
    } else {
        current
    };
    Ok(CallSync {
        call,
        previous,
        transitioned: false,
    })
}

/// Resolves the CallLog for a provider call id. Returns the row and whether
/// it was created here.
fn resolve_call(
    conn: &Connection,
    delivery_id: &str,
    call_sid: &str,
) -> rusqlite::Result<(CallLog, bool)> {
    if let Some(call) = select_by_sid(conn, call_sid)? {
        return Ok((call, false));
    }

    if let Some(active) = select_active(conn, delivery_id)? {
        if active.call_sid.is_none() {
            conn.execute(
                &format!("UPDATE call_logs SET call_sid = ?2, updated_at = {NOW} WHERE id = ?1"),
                params![active.id, call_sid],
            )?;
            let call = select_by_id(conn, &active.id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            return Ok((call, false));
        }

        // The provider reports a leg we never saw placed while another leg is
        // still open. The open leg can no longer be live.
        warn!(
            delivery_id,
            stale_call_sid = active.call_sid.as_deref().unwrap_or_default(),
            call_sid,
            "closing stale active call leg"
        );
        write_status(conn, &active.id, CallStatus::Failed, None)?;
    }

    Ok((insert_call(conn, delivery_id, Some(call_sid))?, true))
}

pub async fn active_call(db: &Database, delivery_id: &str) -> Result<Option<CallLog>, DoorstepError> {
    let delivery_id = delivery_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<CallLog>, rusqlite::Error> {
            select_active(conn, &delivery_id)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn reserve_call_slot(
    db: &Database,
    delivery_id: &str,
) -> Result<Option<CallLog>, DoorstepError> {
    let delivery_id = delivery_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<CallLog>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if select_active(&tx, &delivery_id)?.is_some() {
                tx.commit()?;
                return Ok(None);
            }
            let call = insert_call(&tx, &delivery_id, None)?;
            tx.commit()?;
            Ok(Some(call))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn attach_call_sid(
    db: &Database,
    call_log_id: &str,
    call_sid: &str,
    status: CallStatus,
) -> Result<CallLog, DoorstepError> {
    let id = call_log_id.to_string();
    let sid = call_sid.to_string();
    let result = db
        .connection()
        .call(move |conn| -> Result<Option<CallLog>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(current) = select_by_id(&tx, &id)? else {
                return Ok(None);
            };
            if current.call_sid.is_none() {
                tx.execute(
                    &format!("UPDATE call_logs SET call_sid = ?2, updated_at = {NOW} WHERE id = ?1"),
                    params![id, sid],
                )?;
            }
            let current = select_by_id(&tx, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            let sync = transition(&tx, current, status, None)?;
            tx.commit()?;
            Ok(Some(sync.call))
        })
        .await
        .map_err(map_tr_err)?;

    let call = result.ok_or_else(|| DoorstepError::NotFound {
        entity: "call log",
        id: call_log_id.to_string(),
    })?;
    if call.call_sid.as_deref() != Some(call_sid) {
        return Err(DoorstepError::Conflict(format!(
            "call log {} is already bound to another call",
            call.id
        )));
    }
    Ok(call)
}

pub async fn ensure_call(
    db: &Database,
    delivery_id: &str,
    call_sid: &str,
) -> Result<CallLog, DoorstepError> {
    let delivery_id = delivery_id.to_string();
    let call_sid = call_sid.to_string();
    db.connection()
        .call(move |conn| -> Result<CallLog, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (call, _) = resolve_call(&tx, &delivery_id, &call_sid)?;
            tx.commit()?;
            Ok(call)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_call(db: &Database, id: &str) -> Result<Option<CallLog>, DoorstepError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<CallLog>, rusqlite::Error> { select_by_id(conn, &id) })
        .await
        .map_err(map_tr_err)
}

pub async fn get_call_by_sid(db: &Database, call_sid: &str) -> Result<Option<CallLog>, DoorstepError> {
    let call_sid = call_sid.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<CallLog>, rusqlite::Error> {
            select_by_sid(conn, &call_sid)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_calls(db: &Database, delivery_id: &str) -> Result<Vec<CallLog>, DoorstepError> {
    let delivery_id = delivery_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<CallLog>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CALL_COLUMNS} FROM call_logs
                 WHERE delivery_id = ?1 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map(params![delivery_id], call_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn apply_call_status(
    db: &Database,
    call_log_id: &str,
    status: CallStatus,
    duration_secs: Option<u32>,
) -> Result<CallSync, DoorstepError> {
    let id = call_log_id.to_string();
    let result = db
        .connection()
        .call(move |conn| -> Result<Option<CallSync>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(current) = select_by_id(&tx, &id)? else {
                return Ok(None);
            };
            let sync = transition(&tx, current, status, duration_secs)?;
            tx.commit()?;
            Ok(Some(sync))
        })
        .await
        .map_err(map_tr_err)?;

    result.ok_or_else(|| DoorstepError::NotFound {
        entity: "call log",
        id: call_log_id.to_string(),
    })
}

pub async fn attach_recording_leg(
    db: &Database,
    delivery_id: &str,
    call_sid: &str,
    recording_url: &str,
    duration_secs: u32,
) -> Result<RecordingLeg, DoorstepError> {
    let delivery_id = delivery_id.to_string();
    let call_sid = call_sid.to_string();
    let recording_url = recording_url.to_string();
    db.connection()
        .call(move |conn| -> Result<RecordingLeg, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (call, synthesized) = resolve_call(&tx, &delivery_id, &call_sid)?;
            if call.recording_url.is_some() {
                tx.commit()?;
                return Ok(RecordingLeg {
                    call,
                    synthesized,
                    applied: false,
                });
            }

            tx.execute(
                &format!("UPDATE call_logs SET recording_url = ?2, updated_at = {NOW} WHERE id = ?1"),
                params![call.id, recording_url],
            )?;
            let call = select_by_id(&tx, &call.id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;

            // A recording proves the customer picked up. A leg already known to
            // be live ends with the recording; an earlier one is at least answered.
            let call = if call.status.is_live() {
                transition(&tx, call, CallStatus::Completed, Some(duration_secs))?.call
            } else if !call.status.is_terminal() {
                transition(&tx, call, CallStatus::Answered, None)?.call
            } else {
                call
            };

            tx.commit()?;
            Ok(RecordingLeg {
                call,
                synthesized,
                applied: true,
            })
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::deliveries;
    use doorstep_core::{Customer, Delivery, DeliveryStatus};

    async fn seeded() -> Database {
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
        for id in ["D1", "D2"] {
            deliveries::insert_delivery(
                &db,
                &Delivery {
                    id: id.into(),
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
        }
        db
    }

    #[tokio::test]
    async fn reserve_allows_one_active_slot() {
        let db = seeded().await;
        let first = reserve_call_slot(&db, "D1").await.unwrap();
        assert!(first.is_some());
        assert!(reserve_call_slot(&db, "D1").await.unwrap().is_none());
        assert!(reserve_call_slot(&db, "D2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn terminal_slot_frees_the_delivery() {
        let db = seeded().await;
        let slot = reserve_call_slot(&db, "D1").await.unwrap().unwrap();
        apply_call_status(&db, &slot.id, CallStatus::Failed, None)
            .await
            .unwrap();
        assert!(reserve_call_slot(&db, "D1").await.unwrap().is_some());
        assert_eq!(list_calls(&db, "D1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn attach_sid_advances_status() {
        let db = seeded().await;
        let slot = reserve_call_slot(&db, "D1").await.unwrap().unwrap();
        let call = attach_call_sid(&db, &slot.id, "CA1", CallStatus::Initiated)
            .await
            .unwrap();
        assert_eq!(call.call_sid.as_deref(), Some("CA1"));
        assert_eq!(call.status, CallStatus::Initiated);
        assert_eq!(get_call_by_sid(&db, "CA1").await.unwrap().unwrap().id, slot.id);
    }

    #[tokio::test]
    async fn status_never_regresses() {
        let db = seeded().await;
        let slot = reserve_call_slot(&db, "D1").await.unwrap().unwrap();
        let answered = apply_call_status(&db, &slot.id, CallStatus::Answered, None)
            .await
            .unwrap();
        assert!(answered.transitioned);

        let stale = apply_call_status(&db, &slot.id, CallStatus::Ringing, None)
            .await
            .unwrap();
        assert!(!stale.transitioned);
        assert_eq!(stale.call.status, CallStatus::Answered);

        apply_call_status(&db, &slot.id, CallStatus::Completed, Some(20))
            .await
            .unwrap();
        let after = apply_call_status(&db, &slot.id, CallStatus::Failed, None)
            .await
            .unwrap();
        assert_eq!(after.call.status, CallStatus::Completed, "terminal is sticky");
    }

    #[tokio::test]
    async fn repeated_terminal_report_refreshes_duration() {
        let db = seeded().await;
        let slot = reserve_call_slot(&db, "D1").await.unwrap().unwrap();
        apply_call_status(&db, &slot.id, CallStatus::Completed, Some(30))
            .await
            .unwrap();
        let sync = apply_call_status(&db, &slot.id, CallStatus::Completed, Some(45))
            .await
            .unwrap();
        assert!(!sync.transitioned);
        assert_eq!(sync.call.duration_secs, 45);
    }

    #[tokio::test]
    async fn ensure_call_binds_reserved_slot() {
        let db = seeded().await;
        let slot = reserve_call_slot(&db, "D1").await.unwrap().unwrap();
        let call = ensure_call(&db, "D1", "CA9").await.unwrap();
        assert_eq!(call.id, slot.id);
        assert_eq!(call.call_sid.as_deref(), Some("CA9"));
    }

    #[tokio::test]
    async fn recording_leg_on_answered_call_completes_it() {
        let db = seeded().await;
        let slot = reserve_call_slot(&db, "D1").await.unwrap().unwrap();
        attach_call_sid(&db, &slot.id, "CA1", CallStatus::Answered)
            .await
            .unwrap();

        let leg = attach_recording_leg(&db, "D1", "CA1", "https://provider/RE1", 30)
            .await
            .unwrap();
        assert!(leg.applied);
        assert!(!leg.synthesized);
        assert_eq!(leg.call.status, CallStatus::Completed);
        assert_eq!(leg.call.duration_secs, 30);
        assert_eq!(leg.call.recording_url.as_deref(), Some("https://provider/RE1"));

        let replay = attach_recording_leg(&db, "D1", "CA1", "https://provider/RE1", 30)
            .await
            .unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.call, leg.call);
    }

    #[tokio::test]
    async fn recording_leg_without_call_synthesizes_answered() {
        let db = seeded().await;
        let leg = attach_recording_leg(&db, "D2", "CA2", "https://provider/RE2", 12)
            .await
            .unwrap();
        assert!(leg.synthesized);
        assert_eq!(leg.call.status, CallStatus::Answered);
        assert_eq!(leg.call.call_sid.as_deref(), Some("CA2"));

        // Replays keep it answered until the provider reports completion.
        let replay = attach_recording_leg(&db, "D2", "CA2", "https://provider/RE2", 12)
            .await
            .unwrap();
        assert_eq!(replay.call.status, CallStatus::Answered);

        let done = apply_call_status(&db, &leg.call.id, CallStatus::Completed, Some(45))
            .await
            .unwrap();
        assert_eq!(done.call.duration_secs, 45);
    }

    #[tokio::test]
    async fn unknown_leg_closes_stale_active_leg() {
        let db = seeded().await;
        let slot = reserve_call_slot(&db, "D1").await.unwrap().unwrap();
        attach_call_sid(&db, &slot.id, "CA-old", CallStatus::Ringing)
            .await
            .unwrap();

        let call = ensure_call(&db, "D1", "CA-new").await.unwrap();
        assert_ne!(call.id, slot.id);
        let old = get_call(&db, &slot.id).await.unwrap().unwrap();
        assert_eq!(old.status, CallStatus::Failed);
        assert_eq!(active_call(&db, "D1").await.unwrap().unwrap().id, call.id);
    }
}
