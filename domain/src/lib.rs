//! Domain library for the shop API.
//!
//! Holds the entity types, the repository ports (traits), schema validation
//! and the error definitions. Keep adapters and IO concerns out of this crate;
//! persistence lives in `sqlite-adapter`, HTTP in `api-server`.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::NaiveDateTime;
use serde::Serialize;

/// Maximum length of `User::name`.
pub const USER_NAME_MAX: usize = 30;
/// Maximum length of `User::email`.
pub const USER_EMAIL_MAX: usize = 100;
/// Maximum length of `User::address`.
pub const USER_ADDRESS_MAX: usize = 100;
/// Maximum length of `Product::product_name`.
pub const PRODUCT_NAME_MAX: usize = 100;

/// Kind of resource, used to name the missing entity in `CoreError::NotFound`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    User,
    Product,
    Order,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::User => "user",
            Entity::Product => "product",
            Entity::Order => "order",
        }
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored customer.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub address: Option<String>,
}

/// Validated input for creating or fully replacing a user.
#[derive(Clone, Debug, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub address: Option<String>,
}

impl NewUser {
    pub fn into_user(self, id: i64) -> User {
        User {
            id,
            name: self.name,
            email: self.email,
            address: self.address,
        }
    }
}

/// A stored catalogue product.
#[derive(Clone, Debug, PartialEq)]
pub struct Product {
    pub id: i64,
    pub product_name: String,
    /// Unit price, rounded to two decimals on the way in.
    pub price: f64,
}

/// Validated input for creating or fully replacing a product.
#[derive(Clone, Debug, PartialEq)]
pub struct NewProduct {
    pub product_name: String,
    pub price: f64,
}

impl NewProduct {
    pub fn into_product(self, id: i64) -> Product {
        Product {
            id,
            product_name: self.product_name,
            price: self.price,
        }
    }
}

/// A stored order. Products are reached through `OrderRepository::list_order_products`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub id: i64,
    /// Wall-clock time of the order, without a zone.
    pub order_date_time: NaiveDateTime,
    pub user_id: i64,
}

/// Validated input for creating an order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub order_date_time: NaiveDateTime,
    pub user_id: i64,
}

impl NewOrder {
    pub fn into_order(self, id: i64) -> Order {
        Order {
            id,
            order_date_time: self.order_date_time,
            user_id: self.user_id,
        }
    }
}

/// Field name -> list of messages. Serializes as the body of a 400 response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl Display for FieldErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(" "))?;
        }
        Ok(())
    }
}

/// Repository port for users.
pub trait UserRepository: Send + Sync {
    /// All users ordered by id.
    fn list_users(&self) -> Result<Vec<User>, CoreError>;
    fn get_user(&self, id: i64) -> Result<Option<User>, CoreError>;
    fn insert_user(&self, user: NewUser) -> Result<User, CoreError>;
    /// Overwrite every mutable field. `NotFound` when the id is unknown.
    fn update_user(&self, id: i64, user: NewUser) -> Result<User, CoreError>;
    /// Remove the user row only; their orders stay in place.
    fn delete_user(&self, id: i64) -> Result<(), CoreError>;
}

/// Repository port for products.
pub trait ProductRepository: Send + Sync {
    fn list_products(&self) -> Result<Vec<Product>, CoreError>;
    fn get_product(&self, id: i64) -> Result<Option<Product>, CoreError>;
    fn insert_product(&self, product: NewProduct) -> Result<Product, CoreError>;
    fn update_product(&self, id: i64, product: NewProduct) -> Result<Product, CoreError>;
    /// Remove the product and its order memberships.
    fn delete_product(&self, id: i64) -> Result<(), CoreError>;
}

/// Repository port for orders and the order/product junction.
pub trait OrderRepository: Send + Sync {
    fn list_orders(&self) -> Result<Vec<Order>, CoreError>;
    fn get_order(&self, id: i64) -> Result<Option<Order>, CoreError>;
    fn insert_order(&self, order: NewOrder) -> Result<Order, CoreError>;
    fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, CoreError>;
    fn list_order_products(&self, order_id: i64) -> Result<Vec<Product>, CoreError>;
    /// Returns `false` if the pair was already present; never stores duplicates.
    fn attach_product(&self, order_id: i64, product_id: i64) -> Result<bool, CoreError>;
    /// Returns `false` if the pair was not present.
    fn detach_product(&self, order_id: i64, product_id: i64) -> Result<bool, CoreError>;
}

/// Everything the service needs from storage.
pub trait ShopRepository: UserRepository + ProductRepository + OrderRepository {}

impl<T: UserRepository + ProductRepository + OrderRepository> ShopRepository for T {}

/// Core domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },
    #[error("resource already exists: {0}")]
    AlreadyExists(String),
    #[error("product {product_id} not in order {order_id}")]
    ProductNotInOrder { order_id: i64, product_id: i64 },
    #[error("repository error: {0}")]
    Repository(String),
}

impl CoreError {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        CoreError::NotFound { entity, id }
    }
}

impl From<FieldErrors> for CoreError {
    fn from(errors: FieldErrors) -> Self {
        CoreError::Validation(errors)
    }
}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{}", pkg, ver)
}

pub mod adapters;
pub mod service;
pub mod validate;
