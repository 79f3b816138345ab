//! sqlite-adapter: SQLite implementation of the shop repository ports.
//!
//! Purpose
//! - Persist users, products, orders and the order/product junction in a
//!   single file-based (or in-memory) database.
//! - Implements `UserRepository`, `ProductRepository` and `OrderRepository`
//!   from the `domain` crate.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - `order_date_time` is stored through rusqlite's chrono support
//!   (`YYYY-MM-DD HH:MM:SS[.fff]` text, no zone).
//! - `orders.user_id` carries no foreign key: deleting a user must leave their
//!   orders in place. The service checks the user exists before inserting.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use domain::{
    CoreError, Entity, NewOrder, NewProduct, NewUser, Order, OrderRepository, Product,
    ProductRepository, User, UserRepository,
};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

/// Default database location when no connection string is given.
pub const DEFAULT_DB_PATH: &str = "./data/shop.db";

/// SQLite-backed repository.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

/// Where a connection string points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    Memory,
    File(String),
}

/// Parse a connection string: `sqlite://<path>`, `sqlite:<path>`,
/// `sqlite::memory:`, `:memory:` or a bare path.
pub fn parse_conn_str(conn_str: &str) -> DbTarget {
    let s = conn_str.trim();
    let rest = s
        .strip_prefix("sqlite://")
        .or_else(|| s.strip_prefix("sqlite:"))
        .unwrap_or(s);
    if rest.is_empty() {
        return DbTarget::File(DEFAULT_DB_PATH.to_string());
    }
    if rest == ":memory:" {
        DbTarget::Memory
    } else {
        DbTarget::File(rest.to_string())
    }
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database; contents vanish with the repo.
    pub fn in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqerr)?;
        Self::with_connection(conn)
    }

    /// Open from a connection string (see [`parse_conn_str`]). Creates the
    /// parent directory of file databases.
    pub fn from_conn_str(conn_str: &str) -> Result<Self, CoreError> {
        match parse_conn_str(conn_str) {
            DbTarget::Memory => Self::in_memory(),
            DbTarget::File(path) => {
                if let Some(dir) = Path::new(&path).parent() {
                    if !dir.as_os_str().is_empty() {
                        std::fs::create_dir_all(dir).map_err(|e| {
                            CoreError::Repository(format!("create dir {}: {e}", dir.display()))
                        })?;
                    }
                }
                debug!(path = %path, "opening sqlite database");
                Self::new(path)
            }
        }
    }

    fn with_connection(conn: Connection) -> Result<Self, CoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(30) NOT NULL,
            email VARCHAR(100) NOT NULL UNIQUE,
            address VARCHAR(100)
        );
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product_name VARCHAR(100) NOT NULL UNIQUE,
            price REAL NOT NULL
        );
        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_date_time DATETIME NOT NULL,
            user_id INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders(user_id);
        CREATE TABLE IF NOT EXISTS order_product (
            order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            PRIMARY KEY (order_id, product_id)
        );
        CREATE INDEX IF NOT EXISTS idx_order_product_product ON order_product(product_id);
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("sqlite error: {e}"))
}

// Unique violations become AlreadyExists; everything else is a repository error.
fn map_write_err(e: rusqlite::Error, what: &str) -> CoreError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return CoreError::AlreadyExists(what.to_string());
        }
    }
    map_sqerr(e)
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        address: row.get(3)?,
    })
}

fn row_to_product(row: &rusqlite::Row) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        product_name: row.get(1)?,
        price: row.get(2)?,
    })
}

fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        order_date_time: row.get(1)?,
        user_id: row.get(2)?,
    })
}

const USER_COLS: &str = "id, name, email, address";
const PRODUCT_COLS: &str = "id, product_name, price";
const ORDER_COLS: &str = "id, order_date_time, user_id";

fn query_all<T, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>, CoreError> {
    let mut stmt = conn.prepare(sql).map_err(map_sqerr)?;
    let rows = stmt.query_map(params, map).map_err(map_sqerr)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
}

impl UserRepository for SqliteRepo {
    fn list_users(&self) -> Result<Vec<User>, CoreError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            &format!("SELECT {USER_COLS} FROM users ORDER BY id"),
            [],
            row_to_user,
        )
    }

    fn get_user(&self, id: i64) -> Result<Option<User>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn insert_user(&self, user: NewUser) -> Result<User, CoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users(name, email, address) VALUES (?1, ?2, ?3)",
            params![user.name, user.email, user.address],
        )
        .map_err(|e| map_write_err(e, &format!("email {}", user.email)))?;
        Ok(user.into_user(conn.last_insert_rowid()))
    }

    fn update_user(&self, id: i64, user: NewUser) -> Result<User, CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE users SET name = ?1, email = ?2, address = ?3 WHERE id = ?4",
                params![user.name, user.email, user.address, id],
            )
            .map_err(|e| map_write_err(e, &format!("email {}", user.email)))?;
        if changed == 0 {
            Err(CoreError::not_found(Entity::User, id))
        } else {
            Ok(user.into_user(id))
        }
    }

    fn delete_user(&self, id: i64) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::not_found(Entity::User, id))
        } else {
            Ok(())
        }
    }
}

impl ProductRepository for SqliteRepo {
    fn list_products(&self) -> Result<Vec<Product>, CoreError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            &format!("SELECT {PRODUCT_COLS} FROM products ORDER BY id"),
            [],
            row_to_product,
        )
    }

    fn get_product(&self, id: i64) -> Result<Option<Product>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {PRODUCT_COLS} FROM products WHERE id = ?1"),
            params![id],
            row_to_product,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn insert_product(&self, product: NewProduct) -> Result<Product, CoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO products(product_name, price) VALUES (?1, ?2)",
            params![product.product_name, product.price],
        )
        .map_err(|e| map_write_err(e, &format!("product_name {}", product.product_name)))?;
        Ok(product.into_product(conn.last_insert_rowid()))
    }

    fn update_product(&self, id: i64, product: NewProduct) -> Result<Product, CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE products SET product_name = ?1, price = ?2 WHERE id = ?3",
                params![product.product_name, product.price, id],
            )
            .map_err(|e| map_write_err(e, &format!("product_name {}", product.product_name)))?;
        if changed == 0 {
            Err(CoreError::not_found(Entity::Product, id))
        } else {
            Ok(product.into_product(id))
        }
    }

    fn delete_product(&self, id: i64) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        // The cascade covers this too; explicit so it holds even with foreign_keys off.
        tx.execute(
            "DELETE FROM order_product WHERE product_id = ?1",
            params![id],
        )
        .map_err(map_sqerr)?;
        let changed = tx
            .execute("DELETE FROM products WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        if changed == 0 {
            return Err(CoreError::not_found(Entity::Product, id));
        }
        tx.commit().map_err(map_sqerr)
    }
}

impl OrderRepository for SqliteRepo {
    fn list_orders(&self) -> Result<Vec<Order>, CoreError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            &format!("SELECT {ORDER_COLS} FROM orders ORDER BY id"),
            [],
            row_to_order,
        )
    }

    fn get_order(&self, id: i64) -> Result<Option<Order>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ORDER_COLS} FROM orders WHERE id = ?1"),
            params![id],
            row_to_order,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn insert_order(&self, order: NewOrder) -> Result<Order, CoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO orders(order_date_time, user_id) VALUES (?1, ?2)",
            params![order.order_date_time, order.user_id],
        )
        .map_err(map_sqerr)?;
        Ok(order.into_order(conn.last_insert_rowid()))
    }

    fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, CoreError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            &format!("SELECT {ORDER_COLS} FROM orders WHERE user_id = ?1 ORDER BY id"),
            params![user_id],
            row_to_order,
        )
    }

    fn list_order_products(&self, order_id: i64) -> Result<Vec<Product>, CoreError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            "SELECT p.id, p.product_name, p.price FROM products p \
             JOIN order_product op ON op.product_id = p.id \
             WHERE op.order_id = ?1 ORDER BY p.id",
            params![order_id],
            row_to_product,
        )
    }

    fn attach_product(&self, order_id: i64, product_id: i64) -> Result<bool, CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO order_product(order_id, product_id) VALUES (?1, ?2)",
                params![order_id, product_id],
            )
            .map_err(map_sqerr)?;
        Ok(changed > 0)
    }

    fn detach_product(&self, order_id: i64, product_id: i64) -> Result<bool, CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "DELETE FROM order_product WHERE order_id = ?1 AND product_id = ?2",
                params![order_id, product_id],
            )
            .map_err(map_sqerr)?;
        Ok(changed > 0)
    }
}
