// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery, customer and agent queries.
//!
//! These rows belong to the external CRUD layer; the pipeline reads them and
//! only writes delivery status transitions and push-subscription cleanup.

use doorstep_core::{Agent, Customer, Delivery, DeliveryStatus, DoorstepError};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, NOW, map_tr_err};
use crate::queries::parse_column;

pub async fn insert_delivery(db: &Database, delivery: &Delivery) -> Result<(), DoorstepError> {
    let d = delivery.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO deliveries (id, customer_id, agent_id, address, scheduled_at,
                                         status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    d.id,
                    d.customer_id,
                    d.agent_id,
                    d.address,
                    d.scheduled_at,
                    d.status.to_string(),
                    d.created_at,
                    d.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_delivery(db: &Database, id: &str) -> Result<Option<Delivery>, DoorstepError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Delivery>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, customer_id, agent_id, address, scheduled_at, status,
                        created_at, updated_at
                 FROM deliveries WHERE id = ?1",
                params![id],
                |row| {
                    let status: String = row.get(5)?;
                    Ok(Delivery {
                        id: row.get(0)?,
                        customer_id: row.get(1)?,
                        agent_id: row.get(2)?,
                        address: row.get(3)?,
                        scheduled_at: row.get(4)?,
                        status: parse_column(5, &status)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Sets the delivery status unless the delivery already reached a terminal
/// status. Returns whether a row changed.
pub async fn set_delivery_status(
    db: &Database,
    id: &str,
    status: DeliveryStatus,
) -> Result<bool, DoorstepError> {
    let id = id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                &format!(
                    "UPDATE deliveries SET status = ?2, updated_at = {NOW}
                     WHERE id = ?1 AND status NOT IN ('completed', 'failed') AND status != ?2"
                ),
                params![id, status],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn insert_customer(db: &Database, customer: &Customer) -> Result<(), DoorstepError> {
    let c = customer.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO customers (id, name, phone) VALUES (?1, ?2, ?3)",
                params![c.id, c.name, c.phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_customer(db: &Database, id: &str) -> Result<Option<Customer>, DoorstepError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Customer>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, name, phone FROM customers WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Customer {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn insert_agent(db: &Database, agent: &Agent) -> Result<(), DoorstepError> {
    let a = agent.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO agents (id, name, phone, push_subscription) VALUES (?1, ?2, ?3, ?4)",
                params![a.id, a.name, a.phone, a.push_subscription],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_agent(db: &Database, id: &str) -> Result<Option<Agent>, DoorstepError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Agent>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, name, phone, push_subscription FROM agents WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Agent {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                        push_subscription: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn clear_push_subscription(db: &Database, agent_id: &str) -> Result<(), DoorstepError> {
    let agent_id = agent_id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE agents SET push_subscription = NULL WHERE id = ?1",
                params![agent_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
