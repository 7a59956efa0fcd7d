//! GraphQL documents and their variable builders.
use serde_json::{json, Value};

pub const LINE_ITEM_ROWS: &str = include_str!("../graphql/line_item_rows.graphql");
pub const ADD_MESSAGE_TO_CONVERSATIONS: &str =
    include_str!("../graphql/add_message_to_conversations.graphql");

pub const GET_USER_PROFILE: &str = include_str!("../graphql/get_user_profile.graphql");
pub const GET_PRODUCTS: &str = include_str!("../graphql/get_products.graphql");
pub const ADD_TO_CART: &str = include_str!("../graphql/add_to_cart.graphql");

/// The line items list view: managed items in every status, newest order
/// first, 25 per page, no pacing data.
pub fn line_item_rows_variables() -> Value {
    json!({
        "hasPaceInput": false,
        "filter": {
            "state": "MANAGED",
            "dates": {},
            "query": "",
            "statuses": ["CANCELED", "COMPLETE", "LIVE", "NEW", "PAUSED", "PENDING", "SOLD"],
        },
        "page": { "pageSize": 25 },
        "paceInput": null,
        "sort": { "direction": "DESC", "field": "DATE_OF_ORDER" },
    })
}

/// A single plain-text message, wrapped in a paragraph for the rich body.
pub fn add_message_variables(conversation_id: u64, body: &str, is_internal: bool) -> Value {
    json!({
        "input": {
            "messages": [{
                "body": format!("<p>{body}</p>"),
                "bodyPlainText": body,
                "conversationId": conversation_id,
                "fileIds": [],
                "isInternal": is_internal,
                "notificationData": {},
            }]
        }
    })
}

pub fn user_profile_variables(user_id: &str) -> Value {
    json!({ "userId": user_id })
}

pub fn products_variables(limit: u32, offset: u32) -> Value {
    json!({ "limit": limit, "offset": offset })
}

pub fn add_to_cart_variables(product_id: &str, quantity: u32) -> Value {
    json!({ "productId": product_id, "quantity": quantity })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_name_their_operation() {
        assert!(LINE_ITEM_ROWS.starts_with("query LineItemRows("));
        assert!(ADD_MESSAGE_TO_CONVERSATIONS.starts_with("mutation AddMessageToConversations("));
        assert!(GET_USER_PROFILE.contains("query GetUserProfile"));
        assert!(GET_PRODUCTS.contains("query GetProducts"));
        assert!(ADD_TO_CART.contains("mutation AddToCart"));
    }

    #[test]
    fn message_variables() {
        let vars = add_message_variables(419246, "Load test message 7", false);
        let msg = &vars["input"]["messages"][0];
        assert_eq!(msg["body"], "<p>Load test message 7</p>");
        assert_eq!(msg["bodyPlainText"], "Load test message 7");
        assert_eq!(msg["conversationId"], 419246);
        assert_eq!(msg["isInternal"], false);
    }

    #[test]
    fn line_item_variables() {
        let vars = line_item_rows_variables();
        assert_eq!(vars["page"]["pageSize"], 25);
        assert_eq!(vars["filter"]["statuses"].as_array().unwrap().len(), 7);
        assert!(vars["paceInput"].is_null());
    }
}
