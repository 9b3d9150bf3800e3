//! SQLite-backed product store
//!
//! Uses parameterized queries exclusively. Every write runs inside a
//! transaction. Ingestion holds the connection lock across its whole
//! read-reconcile-write sequence, so two concurrent observations of the
//! same URL cannot both read the same prior history and lose a point.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::Result;
use crate::model::{PricePoint, RegistrationOutcome, Snapshot, Subscriber, TrackedProduct};
use crate::reconcile::reconcile;

const PRODUCT_COLUMNS: &str = "id, url, title, image, currency, category, description, \
     discount_rate, is_out_of_stock, current_price, lowest_price, highest_price, average_price";

/// Thread-safe handle to the product database
///
/// Cloning shares the underlying connection; all operations serialize on
/// the connection lock.
#[derive(Clone)]
pub struct ProductStore {
    conn: Arc<Mutex<Connection>>,
}

impl ProductStore {
    /// Open (or create) the database at `path` and initialize the schema
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database, mainly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fold a snapshot into the stored record for its URL
    ///
    /// Reads the existing record, reconciles the snapshot against it and
    /// upserts the result, all under the connection lock inside one
    /// transaction. Returns the persisted record including its id.
    pub fn ingest_snapshot(&self, snapshot: &Snapshot) -> Result<TrackedProduct> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing = find_by_url_conn(&tx, &snapshot.url)?;
        let reconciled = reconcile(snapshot, existing.as_ref());
        let persisted = upsert_tx(&tx, &reconciled)?;

        tx.commit()?;
        Ok(persisted)
    }

    /// Insert-or-replace a reconciled record keyed by its URL
    ///
    /// Safe to retry: the product row is replaced with identical data and
    /// already-persisted history points are left alone.
    pub fn upsert(&self, product: &TrackedProduct) -> Result<TrackedProduct> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let persisted = upsert_tx(&tx, product)?;
        tx.commit()?;
        Ok(persisted)
    }

    /// Look up a product by its canonical URL
    pub fn find_by_url(&self, url: &str) -> Result<Option<TrackedProduct>> {
        let conn = self.conn.lock().unwrap();
        Ok(find_by_url_conn(&conn, url)?)
    }

    /// Look up a product by its store-assigned id
    pub fn find_by_id(&self, id: i64) -> Result<Option<TrackedProduct>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let mut stmt = conn.prepare_cached(&sql)?;
        let found = stmt
            .query_row(params![id], |row| {
                Ok((row.get::<_, i64>(0)?, product_from_row(row)?))
            })
            .optional()?;

        match found {
            Some((row_id, product)) => Ok(Some(hydrate(&conn, row_id, product)?)),
            None => Ok(None),
        }
    }

    /// List all tracked products, oldest first
    pub fn find_all(&self) -> Result<Vec<TrackedProduct>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM products ORDER BY id", PRODUCT_COLUMNS);
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows: rusqlite::Result<Vec<(i64, TrackedProduct)>> = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, product_from_row(row)?))
            })?
            .collect();

        let mut products = Vec::new();
        for (row_id, product) in rows? {
            products.push(hydrate(&conn, row_id, product)?);
        }
        Ok(products)
    }

    /// List up to `limit` products other than `id` (similar-products view)
    pub fn find_excluding(&self, id: i64, limit: usize) -> Result<Vec<TrackedProduct>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM products WHERE id != ?1 ORDER BY id LIMIT ?2",
            PRODUCT_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows: rusqlite::Result<Vec<(i64, TrackedProduct)>> = stmt
            .query_map(params![id, limit], |row| {
                Ok((row.get::<_, i64>(0)?, product_from_row(row)?))
            })?
            .collect();

        let mut products = Vec::new();
        for (row_id, product) in rows? {
            products.push(hydrate(&conn, row_id, product)?);
        }
        Ok(products)
    }

    /// Attach a contact address to a product
    ///
    /// The composite primary key on (product_id, email) makes concurrent
    /// registrations for the same address collapse to a single row.
    pub fn add_subscriber(&self, product_id: i64, email: &str) -> Result<RegistrationOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let product_exists: i64 = tx.query_row(
            "SELECT COUNT(*) FROM products WHERE id = ?1",
            params![product_id],
            |row| row.get(0),
        )?;
        if product_exists == 0 {
            return Ok(RegistrationOutcome::NotFound);
        }

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO subscribers (product_id, email) VALUES (?1, ?2)",
            params![product_id, email],
        )?;
        tx.commit()?;

        if inserted > 0 {
            log::info!("Registered {} for product {}", email, product_id);
            Ok(RegistrationOutcome::Added)
        } else {
            Ok(RegistrationOutcome::AlreadyPresent)
        }
    }
}

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `products`: one row per tracked product, keyed by canonical URL
/// - `price_history`: append-only price points, insertion-ordered per product
/// - `subscribers`: contact addresses, unique per product
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            image TEXT NOT NULL,
            currency TEXT NOT NULL,
            category TEXT NOT NULL,
            description TEXT,
            discount_rate REAL,
            is_out_of_stock INTEGER NOT NULL DEFAULT 0,
            current_price REAL NOT NULL,
            lowest_price REAL NOT NULL,
            highest_price REAL NOT NULL,
            average_price REAL NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Composite primary key: (product_id, seq) keeps points insertion-
        -- ordered and makes re-writing an already-persisted point a no-op
        CREATE TABLE IF NOT EXISTS price_history (
            product_id INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            price REAL NOT NULL,
            recorded_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (product_id, seq),
            FOREIGN KEY (product_id) REFERENCES products(id)
        );

        CREATE INDEX IF NOT EXISTS idx_price_history_product ON price_history(product_id);

        CREATE TABLE IF NOT EXISTS subscribers (
            product_id INTEGER NOT NULL,
            email TEXT NOT NULL,
            added_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (product_id, email),
            FOREIGN KEY (product_id) REFERENCES products(id)
        );
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

fn upsert_tx(tx: &Transaction<'_>, product: &TrackedProduct) -> rusqlite::Result<TrackedProduct> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO products
         (url, title, image, currency, category, description, discount_rate,
          is_out_of_stock, current_price, lowest_price, highest_price, average_price, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, datetime('now'))
         ON CONFLICT(url) DO UPDATE SET
             title = excluded.title,
             image = excluded.image,
             currency = excluded.currency,
             category = excluded.category,
             description = excluded.description,
             discount_rate = excluded.discount_rate,
             is_out_of_stock = excluded.is_out_of_stock,
             current_price = excluded.current_price,
             lowest_price = excluded.lowest_price,
             highest_price = excluded.highest_price,
             average_price = excluded.average_price,
             updated_at = datetime('now')",
    )?;
    stmt.execute(params![
        &product.url,
        &product.title,
        &product.image,
        &product.currency,
        &product.category,
        &product.description,
        product.discount_rate,
        product.is_out_of_stock,
        product.current_price,
        product.lowest_price,
        product.highest_price,
        product.average_price,
    ])?;

    let id: i64 = tx.query_row(
        "SELECT id FROM products WHERE url = ?1",
        params![&product.url],
        |row| row.get(0),
    )?;

    // Append-only: points already persisted under an earlier seq are left
    // untouched, only the new tail is written
    let mut hist = tx.prepare_cached(
        "INSERT OR IGNORE INTO price_history (product_id, seq, price) VALUES (?1, ?2, ?3)",
    )?;
    for (seq, point) in product.price_history.iter().enumerate() {
        hist.execute(params![id, seq as i64, point.price])?;
    }

    let mut persisted = product.clone();
    persisted.id = Some(id);
    Ok(persisted)
}

fn find_by_url_conn(conn: &Connection, url: &str) -> rusqlite::Result<Option<TrackedProduct>> {
    let sql = format!("SELECT {} FROM products WHERE url = ?1", PRODUCT_COLUMNS);
    let mut stmt = conn.prepare_cached(&sql)?;
    let found = stmt
        .query_row(params![url], |row| {
            Ok((row.get::<_, i64>(0)?, product_from_row(row)?))
        })
        .optional()?;

    match found {
        Some((row_id, product)) => Ok(Some(hydrate(conn, row_id, product)?)),
        None => Ok(None),
    }
}

/// Map a `products` row selected with [`PRODUCT_COLUMNS`]
///
/// History and subscribers are loaded separately via [`hydrate`].
fn product_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedProduct> {
    Ok(TrackedProduct {
        id: Some(row.get(0)?),
        url: row.get(1)?,
        title: row.get(2)?,
        image: row.get(3)?,
        currency: row.get(4)?,
        category: row.get(5)?,
        description: row.get(6)?,
        discount_rate: row.get(7)?,
        is_out_of_stock: row.get(8)?,
        current_price: row.get(9)?,
        lowest_price: row.get(10)?,
        highest_price: row.get(11)?,
        average_price: row.get(12)?,
        price_history: Vec::new(),
        subscribers: Vec::new(),
    })
}

fn hydrate(
    conn: &Connection,
    product_id: i64,
    mut product: TrackedProduct,
) -> rusqlite::Result<TrackedProduct> {
    let mut stmt = conn
        .prepare_cached("SELECT price FROM price_history WHERE product_id = ?1 ORDER BY seq")?;
    product.price_history = stmt
        .query_map(params![product_id], |row| {
            Ok(PricePoint { price: row.get(0)? })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn
        .prepare_cached("SELECT email FROM subscribers WHERE product_id = ?1 ORDER BY email")?;
    product.subscribers = stmt
        .query_map(params![product_id], |row| {
            Ok(Subscriber { email: row.get(0)? })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(product)
}
