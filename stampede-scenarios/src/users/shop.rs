use crate::graphql::{Auth, GraphQlClient, Operation};
use crate::queries::{
    add_to_cart_variables, products_variables, user_profile_variables, ADD_TO_CART, GET_PRODUCTS,
    GET_USER_PROFILE,
};
use serde_json::Value;
use stampede::prelude::*;

#[derive(Copy, Clone, Debug)]
pub enum ShopTask {
    UserProfile,
    Products,
    AddToCart,
}

/// Reads profiles and product pages and adds to the cart through the shop's
/// GraphQL API, checking the shape of each operation's data.
pub struct GraphQlShopUser {
    graphql: GraphQlClient,
}

impl GraphQlShopUser {
    pub fn new(graphql: GraphQlClient) -> Self {
        Self { graphql }
    }
}

fn non_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

pub fn check_user_profile(data: &Value) -> Result<(), String> {
    let user = data
        .get("user")
        .filter(|user| !user.is_null())
        .ok_or("Unexpected GraphQL response structure")?;
    if non_empty(user.get("id")) && non_empty(user.get("name")) {
        Ok(())
    } else {
        Err("Missing required user fields".to_string())
    }
}

pub fn check_products(data: &Value) -> Result<(), String> {
    match data.get("products") {
        Some(_) => Ok(()),
        None => Err("Invalid products response structure".to_string()),
    }
}

pub fn check_add_to_cart(data: &Value) -> Result<(), String> {
    let result = data.get("addToCart");
    let success = result
        .and_then(|r| r.get("success"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if success {
        return Ok(());
    }
    let message = result
        .and_then(|r| r.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown error");
    Err(format!("Mutation unsuccessful: {message}"))
}

impl User for GraphQlShopUser {
    type Task = ShopTask;

    fn tasks(&self) -> Result<TaskSet<ShopTask>, TaskSetError> {
        TaskSet::weighted([
            (ShopTask::UserProfile, 3),
            (ShopTask::Products, 2),
            (ShopTask::AddToCart, 1),
        ])
    }

    fn wait_time(&self) -> WaitTime {
        WaitTime::between_secs(1., 3.)
    }

    async fn execute(&mut self, task: ShopTask, ctx: &UserContext) {
        let (op, check): (Operation<'_>, fn(&Value) -> Result<(), String>) = match task {
            ShopTask::UserProfile => (
                Operation::new("GetUserProfile", GET_USER_PROFILE)
                    .variables(user_profile_variables("user123"))
                    .label("GraphQL: GetUserProfile"),
                check_user_profile,
            ),
            ShopTask::Products => (
                Operation::new("GetProducts", GET_PRODUCTS)
                    .variables(products_variables(20, 0))
                    .label("GraphQL: GetProducts"),
                check_products,
            ),
            ShopTask::AddToCart => (
                Operation::new("AddToCart", ADD_TO_CART)
                    .variables(add_to_cart_variables("prod123", 1))
                    .label("GraphQL: AddToCart (Mutation)"),
                check_add_to_cart,
            ),
        };

        let exchange = self.graphql.exchange(&op, Auth::None).await;
        ctx.fire(exchange.event_checked(&op, check));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_profile_shape() {
        assert!(check_user_profile(&json!({"user": {"id": "1", "name": "Ada"}})).is_ok());
        assert_eq!(
            check_user_profile(&json!({"user": {"id": "1", "name": ""}})).unwrap_err(),
            "Missing required user fields"
        );
        assert_eq!(
            check_user_profile(&json!({"viewer": {}})).unwrap_err(),
            "Unexpected GraphQL response structure"
        );
    }

    #[test]
    fn add_to_cart_reports_server_message() {
        assert!(check_add_to_cart(&json!({"addToCart": {"success": true}})).is_ok());
        assert_eq!(
            check_add_to_cart(&json!({"addToCart": {"success": false, "message": "Out of stock"}}))
                .unwrap_err(),
            "Mutation unsuccessful: Out of stock"
        );
        assert_eq!(
            check_add_to_cart(&json!({})).unwrap_err(),
            "Mutation unsuccessful: Unknown error"
        );
    }

    #[test]
    fn products_present() {
        assert!(check_products(&json!({"products": {"edges": []}})).is_ok());
        assert!(check_products(&json!({})).is_err());
    }
}
