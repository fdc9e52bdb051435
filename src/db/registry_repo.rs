//! Repository functions over the registry tables, and the [`RegistryStore`] they back.
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::registry::{
    DomainRecord, DsData, HostRecord, RegistrarContact, RegistryError, RegistryStore,
};
use crate::validation::strip_trailing_dot;

fn corrupt(name: &str, reason: impl Into<String>) -> RegistryError {
    RegistryError::Corrupt {
        name: name.to_string(),
        reason: reason.into(),
    }
}

pub async fn publish_shard_count(db: &SqlitePool, tld: &str) -> Result<Option<u32>, RegistryError> {
    let count: Option<i64> = sqlx::query_scalar("SELECT publish_shards FROM tlds WHERE name = ?")
        .bind(strip_trailing_dot(tld))
        .fetch_optional(db)
        .await?;
    count
        .map(|c| u32::try_from(c).map_err(|_| corrupt(tld, format!("publish_shards = {c}"))))
        .transpose()
}

/// Create or reconfigure a TLD.
pub async fn upsert_tld(db: &SqlitePool, tld: &str, publish_shards: u32) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tlds (name, publish_shards) VALUES (?, ?)
        ON CONFLICT (name) DO UPDATE SET publish_shards = excluded.publish_shards
        "#,
    )
    .bind(strip_trailing_dot(tld))
    .bind(i64::from(publish_shards))
    .execute(db)
    .await?;
    Ok(())
}

/// Fetch a domain with its nameservers, DS data and subordinate hosts.
pub async fn find_domain(db: &SqlitePool, name: &str) -> Result<Option<DomainRecord>, RegistryError> {
    let name = strip_trailing_dot(name);
    let row = sqlx::query("SELECT name, registrar_id, publishable FROM domains WHERE name = ?")
        .bind(&name)
        .fetch_optional(db)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let nameservers: Vec<String> = sqlx::query_scalar(
        "SELECT host FROM domain_nameservers WHERE domain = ? ORDER BY position, host",
    )
    .bind(&name)
    .fetch_all(db)
    .await?;

    let ds_rows = sqlx::query(
        r#"
        SELECT key_tag, algorithm, digest_type, digest
        FROM ds_data
        WHERE domain = ?
        ORDER BY key_tag, algorithm, digest_type, digest
        "#,
    )
    .bind(&name)
    .fetch_all(db)
    .await?;
    let mut ds_data = Vec::with_capacity(ds_rows.len());
    for ds in ds_rows {
        let key_tag: i64 = ds.get("key_tag");
        let algorithm: i64 = ds.get("algorithm");
        let digest_type: i64 = ds.get("digest_type");
        ds_data.push(DsData {
            key_tag: u16::try_from(key_tag)
                .map_err(|_| corrupt(&name, format!("DS key tag {key_tag}")))?,
            algorithm: u8::try_from(algorithm)
                .map_err(|_| corrupt(&name, format!("DS algorithm {algorithm}")))?,
            digest_type: u8::try_from(digest_type)
                .map_err(|_| corrupt(&name, format!("DS digest type {digest_type}")))?,
            digest: ds.get("digest"),
        });
    }

    let subordinate_hosts: Vec<String> =
        sqlx::query_scalar("SELECT name FROM hosts WHERE superordinate_domain = ? ORDER BY name")
            .bind(&name)
            .fetch_all(db)
            .await?;

    Ok(Some(DomainRecord {
        name: row.get("name"),
        registrar_id: row.get("registrar_id"),
        publishable: row.get::<i64, _>("publishable") != 0,
        nameservers,
        ds_data,
        subordinate_hosts,
    }))
}

/// Store a domain, replacing its nameservers and DS data. Subordinate hosts come from the hosts
/// table and are not written here.
pub async fn upsert_domain(db: &SqlitePool, domain: &DomainRecord) -> sqlx::Result<()> {
    let name = strip_trailing_dot(&domain.name);
    let mut tx = db.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO domains (name, registrar_id, publishable) VALUES (?, ?, ?)
        ON CONFLICT (name) DO UPDATE SET
            registrar_id = excluded.registrar_id,
            publishable = excluded.publishable
        "#,
    )
    .bind(&name)
    .bind(&domain.registrar_id)
    .bind(if domain.publishable { 1 } else { 0 })
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM domain_nameservers WHERE domain = ?")
        .bind(&name)
        .execute(&mut *tx)
        .await?;
    for (position, host) in domain.nameservers.iter().enumerate() {
        sqlx::query(
            "INSERT OR IGNORE INTO domain_nameservers (domain, host, position) VALUES (?, ?, ?)",
        )
        .bind(&name)
        .bind(strip_trailing_dot(host))
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM ds_data WHERE domain = ?")
        .bind(&name)
        .execute(&mut *tx)
        .await?;
    for ds in &domain.ds_data {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO ds_data (domain, key_tag, algorithm, digest_type, digest)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&name)
        .bind(i64::from(ds.key_tag))
        .bind(i64::from(ds.algorithm))
        .bind(i64::from(ds.digest_type))
        .bind(&ds.digest)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

pub async fn find_host(db: &SqlitePool, name: &str) -> Result<Option<HostRecord>, RegistryError> {
    let name = strip_trailing_dot(name);
    let row = sqlx::query("SELECT name, registrar_id, superordinate_domain FROM hosts WHERE name = ?")
        .bind(&name)
        .fetch_optional(db)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let raw: Vec<String> =
        sqlx::query_scalar("SELECT address FROM host_addresses WHERE host = ? ORDER BY address")
            .bind(&name)
            .fetch_all(db)
            .await?;
    let addresses = raw
        .iter()
        .map(|a| {
            a.parse::<IpAddr>()
                .map_err(|_| corrupt(&name, format!("address '{a}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(HostRecord {
        name: row.get("name"),
        registrar_id: row.get("registrar_id"),
        addresses,
        superordinate_domain: row.get("superordinate_domain"),
    }))
}

/// Store a host, replacing its addresses.
pub async fn upsert_host(db: &SqlitePool, host: &HostRecord) -> sqlx::Result<()> {
    let name = strip_trailing_dot(&host.name);
    let mut tx = db.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO hosts (name, registrar_id, superordinate_domain) VALUES (?, ?, ?)
        ON CONFLICT (name) DO UPDATE SET
            registrar_id = excluded.registrar_id,
            superordinate_domain = excluded.superordinate_domain
        "#,
    )
    .bind(&name)
    .bind(&host.registrar_id)
    .bind(host.superordinate_domain.as_deref().map(strip_trailing_dot))
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM host_addresses WHERE host = ?")
        .bind(&name)
        .execute(&mut *tx)
        .await?;
    for address in &host.addresses {
        sqlx::query("INSERT OR IGNORE INTO host_addresses (host, address) VALUES (?, ?)")
            .bind(&name)
            .bind(address.to_string())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await
}

pub async fn find_registrar(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<RegistrarContact>, RegistryError> {
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM registrars WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    let Some(name) = name else {
        return Ok(None);
    };
    let admin_emails: Vec<String> = sqlx::query_scalar(
        "SELECT email FROM registrar_contacts WHERE registrar_id = ? ORDER BY email",
    )
    .bind(id)
    .fetch_all(db)
    .await?;
    Ok(Some(RegistrarContact {
        id: id.to_string(),
        name,
        admin_emails,
    }))
}

pub async fn upsert_registrar(db: &SqlitePool, registrar: &RegistrarContact) -> sqlx::Result<()> {
    let mut tx = db.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO registrars (id, name) VALUES (?, ?)
        ON CONFLICT (id) DO UPDATE SET name = excluded.name
        "#,
    )
    .bind(&registrar.id)
    .bind(&registrar.name)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM registrar_contacts WHERE registrar_id = ?")
        .bind(&registrar.id)
        .execute(&mut *tx)
        .await?;
    for email in &registrar.admin_emails {
        sqlx::query("INSERT OR IGNORE INTO registrar_contacts (registrar_id, email) VALUES (?, ?)")
            .bind(&registrar.id)
            .bind(email)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await
}

/// Record refresh requests so the names get batched and published again.
pub async fn insert_refresh_requests(
    db: &SqlitePool,
    domains: &[String],
    hosts: &[String],
    now: DateTime<Utc>,
) -> sqlx::Result<()> {
    let mut tx = db.begin().await?;
    let items = domains
        .iter()
        .map(|d| ("domain", d))
        .chain(hosts.iter().map(|h| ("host", h)));
    for (kind, name) in items {
        sqlx::query("INSERT INTO refresh_requests (kind, name, requested_at) VALUES (?, ?, ?)")
            .bind(kind)
            .bind(strip_trailing_dot(name))
            .bind(now)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await
}

/// Pending refresh requests as `(kind, name)`, oldest first.
pub async fn list_refresh_requests(db: &SqlitePool) -> sqlx::Result<Vec<(String, String)>> {
    sqlx::query_as("SELECT kind, name FROM refresh_requests ORDER BY id")
        .fetch_all(db)
        .await
}

/// [`RegistryStore`] over the SQLite registry tables.
#[derive(Clone)]
pub struct SqliteRegistry {
    db: SqlitePool,
}

impl SqliteRegistry {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RegistryStore for SqliteRegistry {
    async fn publish_shard_count(&self, tld: &str) -> Result<Option<u32>, RegistryError> {
        publish_shard_count(&self.db, tld).await
    }

    async fn load_domain(&self, name: &str) -> Result<Option<DomainRecord>, RegistryError> {
        find_domain(&self.db, name).await
    }

    async fn load_host(&self, name: &str) -> Result<Option<HostRecord>, RegistryError> {
        find_host(&self.db, name).await
    }

    async fn load_registrar(&self, id: &str) -> Result<Option<RegistrarContact>, RegistryError> {
        find_registrar(&self.db, id).await
    }

    async fn request_refresh(
        &self,
        domains: &[String],
        hosts: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        insert_refresh_requests(&self.db, domains, hosts, now).await?;
        Ok(())
    }
}
