use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::{
    CoreError, NewOrder, NewProduct, NewUser, Order, OrderRepository, Product,
    ProductRepository, User, UserRepository,
};

/// Simple in-memory repository for tests and local demos. One mutex guards
/// every table so each call sees a consistent snapshot.
pub struct InMemoryRepo {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    products: BTreeMap<i64, Product>,
    orders: BTreeMap<i64, Order>,
    // (order_id, product_id)
    order_product: BTreeSet<(i64, i64)>,
    next_user_id: i64,
    next_product_id: i64,
    next_order_id: i64,
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn product_name_taken(&self, name: &str, except: Option<i64>) -> bool {
        self.products
            .values()
            .any(|p| p.product_name == name && Some(p.id) != except)
    }
}

// Ids start at 1 like an autoincrement column.
fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Tables::default()),
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, CoreError> {
        self.inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl UserRepository for InMemoryRepo {
    fn list_users(&self) -> Result<Vec<User>, CoreError> {
        Ok(self.tables()?.users.values().cloned().collect())
    }

    fn get_user(&self, id: i64) -> Result<Option<User>, CoreError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    fn insert_user(&self, user: NewUser) -> Result<User, CoreError> {
        let mut t = self.tables()?;
        if t.email_taken(&user.email, None) {
            return Err(CoreError::AlreadyExists(format!("email {}", user.email)));
        }
        let id = next_id(&mut t.next_user_id);
        let user = user.into_user(id);
        t.users.insert(id, user.clone());
        Ok(user)
    }

    fn update_user(&self, id: i64, user: NewUser) -> Result<User, CoreError> {
        let mut t = self.tables()?;
        if !t.users.contains_key(&id) {
            return Err(CoreError::not_found(crate::Entity::User, id));
        }
        if t.email_taken(&user.email, Some(id)) {
            return Err(CoreError::AlreadyExists(format!("email {}", user.email)));
        }
        let user = user.into_user(id);
        t.users.insert(id, user.clone());
        Ok(user)
    }

    fn delete_user(&self, id: i64) -> Result<(), CoreError> {
        match self.tables()?.users.remove(&id) {
            Some(_) => Ok(()),
            None => Err(CoreError::not_found(crate::Entity::User, id)),
        }
    }
}

impl ProductRepository for InMemoryRepo {
    fn list_products(&self) -> Result<Vec<Product>, CoreError> {
        Ok(self.tables()?.products.values().cloned().collect())
    }

    fn get_product(&self, id: i64) -> Result<Option<Product>, CoreError> {
        Ok(self.tables()?.products.get(&id).cloned())
    }

    fn insert_product(&self, product: NewProduct) -> Result<Product, CoreError> {
        let mut t = self.tables()?;
        if t.product_name_taken(&product.product_name, None) {
            return Err(CoreError::AlreadyExists(format!(
                "product_name {}",
                product.product_name
            )));
        }
        let id = next_id(&mut t.next_product_id);
        let product = product.into_product(id);
        t.products.insert(id, product.clone());
        Ok(product)
    }

    fn update_product(&self, id: i64, product: NewProduct) -> Result<Product, CoreError> {
        let mut t = self.tables()?;
        if !t.products.contains_key(&id) {
            return Err(CoreError::not_found(crate::Entity::Product, id));
        }
        if t.product_name_taken(&product.product_name, Some(id)) {
            return Err(CoreError::AlreadyExists(format!(
                "product_name {}",
                product.product_name
            )));
        }
        let product = product.into_product(id);
        t.products.insert(id, product.clone());
        Ok(product)
    }

    fn delete_product(&self, id: i64) -> Result<(), CoreError> {
        let mut t = self.tables()?;
        if t.products.remove(&id).is_none() {
            return Err(CoreError::not_found(crate::Entity::Product, id));
        }
        t.order_product.retain(|&(_, product_id)| product_id != id);
        Ok(())
    }
}

impl OrderRepository for InMemoryRepo {
    fn list_orders(&self) -> Result<Vec<Order>, CoreError> {
        Ok(self.tables()?.orders.values().cloned().collect())
    }

    fn get_order(&self, id: i64) -> Result<Option<Order>, CoreError> {
        Ok(self.tables()?.orders.get(&id).cloned())
    }

    fn insert_order(&self, order: NewOrder) -> Result<Order, CoreError> {
        let mut t = self.tables()?;
        let id = next_id(&mut t.next_order_id);
        let order = order.into_order(id);
        t.orders.insert(id, order.clone());
        Ok(order)
    }

    fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, CoreError> {
        Ok(self
            .tables()?
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    fn list_order_products(&self, order_id: i64) -> Result<Vec<Product>, CoreError> {
        let t = self.tables()?;
        Ok(t.order_product
            .range((order_id, i64::MIN)..=(order_id, i64::MAX))
            .filter_map(|(_, product_id)| t.products.get(product_id).cloned())
            .collect())
    }

    fn attach_product(&self, order_id: i64, product_id: i64) -> Result<bool, CoreError> {
        Ok(self.tables()?.order_product.insert((order_id, product_id)))
    }

    fn detach_product(&self, order_id: i64, product_id: i64) -> Result<bool, CoreError> {
        Ok(self.tables()?.order_product.remove(&(order_id, product_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".into(),
            email: email.into(),
            address: None,
        }
    }

    fn new_order(user_id: i64) -> NewOrder {
        NewOrder {
            order_date_time: NaiveDate::from_ymd_opt(2024, 1, 2)
                .and_then(|d| d.and_hms_opt(3, 4, 5))
                .unwrap(),
            user_id,
        }
    }

    #[test]
    fn ids_are_sequential_from_one() {
        let repo = InMemoryRepo::new();
        assert_eq!(repo.insert_user(new_user("a@e.com")).unwrap().id, 1);
        assert_eq!(repo.insert_user(new_user("b@e.com")).unwrap().id, 2);
        assert_eq!(repo.insert_order(new_order(1)).unwrap().id, 1);
    }

    #[test]
    fn duplicate_email_rejected() {
        let repo = InMemoryRepo::new();
        repo.insert_user(new_user("a@e.com")).unwrap();
        let err = repo.insert_user(new_user("a@e.com")).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists(_)));
    }

    #[test]
    fn update_may_keep_own_email() {
        let repo = InMemoryRepo::new();
        let u = repo.insert_user(new_user("a@e.com")).unwrap();
        let updated = repo
            .update_user(
                u.id,
                NewUser {
                    name: "Renamed".into(),
                    email: "a@e.com".into(),
                    address: Some("Somewhere".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Renamed");
    }

    #[test]
    fn duplicate_product_name_rejected() {
        let repo = InMemoryRepo::new();
        let p = NewProduct {
            product_name: "Lamp".into(),
            price: 1.0,
        };
        repo.insert_product(p.clone()).unwrap();
        assert!(matches!(
            repo.insert_product(p),
            Err(CoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn junction_is_a_set() {
        let repo = InMemoryRepo::new();
        let order = repo.insert_order(new_order(1)).unwrap();
        let product = repo
            .insert_product(NewProduct {
                product_name: "Lamp".into(),
                price: 1.0,
            })
            .unwrap();
        assert!(repo.attach_product(order.id, product.id).unwrap());
        assert!(!repo.attach_product(order.id, product.id).unwrap());
        assert_eq!(repo.list_order_products(order.id).unwrap().len(), 1);
        assert!(repo.detach_product(order.id, product.id).unwrap());
        assert!(!repo.detach_product(order.id, product.id).unwrap());
    }
}
