// Clients repository
// CRUD operations for client records

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};

use crate::error::StorageError;

use super::models::Client;
use super::DatabaseManager;

impl DatabaseManager {
    /// Insert a new client
    pub fn create_client(&self, client: &Client) -> Result<(), StorageError> {
        self.with_connection(|conn| create_client_impl(conn, client))
    }

    /// Get a client by id
    pub fn get_client(&self, client_id: &str) -> Result<Option<Client>, StorageError> {
        self.with_connection(|conn| get_client_impl(conn, client_id))
    }

    /// List all clients ordered by name
    pub fn list_clients(&self) -> Result<Vec<Client>, StorageError> {
        self.with_connection(list_clients_impl)
    }

    /// Update a client's name and email
    pub fn update_client(&self, client_id: &str, name: &str, email: &str) -> Result<(), StorageError> {
        self.with_connection(|conn| update_client_impl(conn, client_id, name, email))
    }

    /// Delete a client and, via cascade, all of its transcriptions, personas
    /// and chat history
    pub fn delete_client(&self, client_id: &str) -> Result<(), StorageError> {
        self.with_connection(|conn| delete_client_impl(conn, client_id))
    }
}

fn create_client_impl(conn: &Connection, client: &Client) -> Result<()> {
    conn.execute(
        "INSERT INTO clients (id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![client.id, client.name, client.email, client.created_at],
    )
    .context("Failed to create client")?;

    log::info!("Created client {} ({})", client.name, client.id);
    Ok(())
}

fn get_client_impl(conn: &Connection, client_id: &str) -> Result<Option<Client>> {
    let result = conn.query_row(
        "SELECT id, name, email, created_at FROM clients WHERE id = ?",
        params![client_id],
        |row| {
            Ok(Client {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    );

    match result {
        Ok(client) => Ok(Some(client)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get client"),
    }
}

fn list_clients_impl(conn: &Connection) -> Result<Vec<Client>> {
    let mut stmt = conn
        .prepare("SELECT id, name, email, created_at FROM clients ORDER BY name")
        .context("Failed to prepare list_clients query")?;

    let clients = stmt
        .query_map([], |row| {
            Ok(Client {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .context("Failed to query clients")?;

    clients
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect clients")
}

fn update_client_impl(conn: &Connection, client_id: &str, name: &str, email: &str) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE clients SET name = ?, email = ? WHERE id = ?",
            params![name, email, client_id],
        )
        .context("Failed to update client")?;

    if updated == 0 {
        bail!("No client with id {}", client_id);
    }
    Ok(())
}

fn delete_client_impl(conn: &Connection, client_id: &str) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM clients WHERE id = ?", params![client_id])
        .context("Failed to delete client")?;

    if deleted == 0 {
        bail!("No client with id {}", client_id);
    }

    log::info!("Deleted client {} and all dependent records", client_id);
    Ok(())
}
