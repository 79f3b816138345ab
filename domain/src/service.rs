use crate::validate::{load_order, load_product, load_user};
use crate::{
    CoreError, Entity, NewOrder, NewProduct, NewUser, Order, Product, ShopRepository, User,
};
use serde_json::Value;

/// Result of associating a product with an order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddProductOutcome {
    /// The product was appended; carries the order as it is now.
    Added(Order),
    /// The product was already part of the order; nothing changed.
    AlreadyPresent,
}

/// Application service orchestrating validate -> check -> mutate for users,
/// products and orders.
///
/// Generic over the repository so the same rules run against SQLite in
/// production and the in-memory adapter in tests.
pub struct ShopService<R: ShopRepository> {
    repo: R,
}

impl<R: ShopRepository> ShopService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    // ---- users ----

    pub fn list_users(&self) -> Result<Vec<User>, CoreError> {
        self.repo.list_users()
    }

    pub fn get_user(&self, id: i64) -> Result<User, CoreError> {
        self.repo
            .get_user(id)?
            .ok_or_else(|| CoreError::not_found(Entity::User, id))
    }

    pub fn create_user(&self, payload: &Value) -> Result<User, CoreError> {
        let input: NewUser = load_user(payload)?;
        self.repo.insert_user(input)
    }

    /// Full replace. The id is checked before the payload is validated.
    pub fn replace_user(&self, id: i64, payload: &Value) -> Result<User, CoreError> {
        self.get_user(id)?;
        let input = load_user(payload)?;
        self.repo.update_user(id, input)
    }

    pub fn delete_user(&self, id: i64) -> Result<(), CoreError> {
        self.get_user(id)?;
        self.repo.delete_user(id)
    }

    // ---- products ----

    pub fn list_products(&self) -> Result<Vec<Product>, CoreError> {
        self.repo.list_products()
    }

    pub fn get_product(&self, id: i64) -> Result<Product, CoreError> {
        self.repo
            .get_product(id)?
            .ok_or_else(|| CoreError::not_found(Entity::Product, id))
    }

    pub fn create_product(&self, payload: &Value) -> Result<Product, CoreError> {
        let input: NewProduct = load_product(payload)?;
        self.repo.insert_product(input)
    }

    pub fn replace_product(&self, id: i64, payload: &Value) -> Result<Product, CoreError> {
        self.get_product(id)?;
        let input = load_product(payload)?;
        self.repo.update_product(id, input)
    }

    pub fn delete_product(&self, id: i64) -> Result<(), CoreError> {
        self.get_product(id)?;
        self.repo.delete_product(id)
    }

    // ---- orders ----

    pub fn list_orders(&self) -> Result<Vec<Order>, CoreError> {
        self.repo.list_orders()
    }

    pub fn get_order(&self, id: i64) -> Result<Order, CoreError> {
        self.repo
            .get_order(id)?
            .ok_or_else(|| CoreError::not_found(Entity::Order, id))
    }

    /// Create an order for an existing user. Nothing is written when the user is unknown.
    pub fn create_order(&self, payload: &Value) -> Result<Order, CoreError> {
        let input: NewOrder = load_order(payload)?;
        self.get_user(input.user_id)?;
        self.repo.insert_order(input)
    }

    pub fn add_product_to_order(
        &self,
        order_id: i64,
        product_id: i64,
    ) -> Result<AddProductOutcome, CoreError> {
        let order = self.get_order(order_id)?;
        self.get_product(product_id)?;
        if self.repo.attach_product(order_id, product_id)? {
            Ok(AddProductOutcome::Added(order))
        } else {
            Ok(AddProductOutcome::AlreadyPresent)
        }
    }

    pub fn remove_product_from_order(
        &self,
        order_id: i64,
        product_id: i64,
    ) -> Result<(), CoreError> {
        self.get_order(order_id)?;
        self.get_product(product_id)?;
        if self.repo.detach_product(order_id, product_id)? {
            Ok(())
        } else {
            Err(CoreError::ProductNotInOrder {
                order_id,
                product_id,
            })
        }
    }

    pub fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, CoreError> {
        self.get_user(user_id)?;
        self.repo.list_orders_for_user(user_id)
    }

    pub fn products_for_order(&self, order_id: i64) -> Result<Vec<Product>, CoreError> {
        self.get_order(order_id)?;
        self.repo.list_order_products(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryRepo;
    use serde_json::json;

    fn svc() -> ShopService<InMemoryRepo> {
        ShopService::new(InMemoryRepo::new())
    }

    fn seed(svc: &ShopService<InMemoryRepo>) -> (User, Product, Order) {
        let user = svc
            .create_user(&json!({"name": "Ada", "email": "ada@example.com", "address": "1 Loop Rd"}))
            .unwrap();
        let product = svc
            .create_product(&json!({"product_name": "Lamp", "price": 19.99}))
            .unwrap();
        let order = svc
            .create_order(&json!({"order_date_time": "2024-05-01T10:30:00", "user_id": user.id}))
            .unwrap();
        (user, product, order)
    }

    #[test]
    fn created_user_reads_back() {
        let svc = svc();
        let (user, _, _) = seed(&svc);
        let got = svc.get_user(user.id).unwrap();
        assert_eq!(got.name, "Ada");
        assert_eq!(got.email, "ada@example.com");
        assert_eq!(got.address.as_deref(), Some("1 Loop Rd"));
    }

    #[test]
    fn missing_user_is_not_found() {
        let err = svc().get_user(42).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotFound {
                entity: Entity::User,
                id: 42
            }
        ));
    }

    #[test]
    fn replace_user_checks_existence_before_payload() {
        let err = svc().replace_user(5, &json!({})).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn replace_user_overwrites_all_fields() {
        let svc = svc();
        let (user, _, _) = seed(&svc);
        let updated = svc
            .replace_user(user.id, &json!({"name": "Grace", "email": "grace@example.com"}))
            .unwrap();
        assert_eq!(updated.name, "Grace");
        assert_eq!(updated.address, None);
        assert_eq!(svc.get_user(user.id).unwrap(), updated);
    }

    #[test]
    fn invalid_payload_is_validation_error() {
        let err = svc().create_product(&json!({"price": "abc"})).unwrap_err();
        match err {
            CoreError::Validation(errs) => {
                assert!(errs.get("product_name").is_some());
                assert!(errs.get("price").is_some());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn order_for_unknown_user_writes_nothing() {
        let svc = svc();
        let err = svc
            .create_order(&json!({"order_date_time": "2024-05-01T10:30:00", "user_id": 77}))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotFound {
                entity: Entity::User,
                id: 77
            }
        ));
        assert!(svc.list_orders().unwrap().is_empty());
    }

    #[test]
    fn adding_same_product_twice_keeps_one_entry() {
        let svc = svc();
        let (_, product, order) = seed(&svc);
        let first = svc.add_product_to_order(order.id, product.id).unwrap();
        assert_eq!(first, AddProductOutcome::Added(order.clone()));
        let second = svc.add_product_to_order(order.id, product.id).unwrap();
        assert_eq!(second, AddProductOutcome::AlreadyPresent);
        assert_eq!(svc.products_for_order(order.id).unwrap(), vec![product]);
    }

    #[test]
    fn add_checks_order_before_product() {
        let svc = svc();
        let err = svc.add_product_to_order(9, 9).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotFound {
                entity: Entity::Order,
                ..
            }
        ));
    }

    #[test]
    fn removing_absent_product_leaves_set_unchanged() {
        let svc = svc();
        let (_, product, order) = seed(&svc);
        let other = svc
            .create_product(&json!({"product_name": "Desk", "price": 120}))
            .unwrap();
        svc.add_product_to_order(order.id, product.id).unwrap();

        let err = svc.remove_product_from_order(order.id, other.id).unwrap_err();
        assert!(matches!(err, CoreError::ProductNotInOrder { .. }));
        assert_eq!(svc.products_for_order(order.id).unwrap(), vec![product.clone()]);

        svc.remove_product_from_order(order.id, product.id).unwrap();
        assert!(svc.products_for_order(order.id).unwrap().is_empty());
    }

    #[test]
    fn deleting_user_keeps_orders() {
        let svc = svc();
        let (user, _, order) = seed(&svc);
        svc.delete_user(user.id).unwrap();
        assert!(matches!(svc.get_user(user.id), Err(CoreError::NotFound { .. })));
        assert_eq!(svc.get_order(order.id).unwrap(), order);
        assert!(matches!(
            svc.orders_for_user(user.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn deleting_product_drops_membership() {
        let svc = svc();
        let (_, product, order) = seed(&svc);
        svc.add_product_to_order(order.id, product.id).unwrap();
        svc.delete_product(product.id).unwrap();
        assert!(svc.products_for_order(order.id).unwrap().is_empty());
    }

    #[test]
    fn orders_for_user_lists_only_theirs() {
        let svc = svc();
        let (user, _, order) = seed(&svc);
        let other = svc
            .create_user(&json!({"name": "Bob", "email": "bob@example.com"}))
            .unwrap();
        svc.create_order(&json!({"order_date_time": "2024-06-01T08:00:00", "user_id": other.id}))
            .unwrap();
        assert_eq!(svc.orders_for_user(user.id).unwrap(), vec![order]);
    }
}
