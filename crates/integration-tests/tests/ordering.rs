//! Menu browsing, cart and checkout over HTTP.

use axum::http::StatusCode;
use serde_json::{Value, json};

use crave_core::UserRole;
use crave_integration_tests::TestApp;

fn names(body: &Value) -> Vec<&str> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect()
}

// ============================================================================
// Menu
// ============================================================================

#[tokio::test]
async fn test_menu_hides_unavailable_items() {
    let app = TestApp::new().await;
    let burger = app.add_food("Smash Burger", "Burgers", 1150, true).await;
    let hidden = app.add_food("Winter Stew", "Mains", 1400, false).await;
    app.add_food("Tomato Soup", "Mains", 650, true).await;
    let mut client = app.client();

    let resp = client.get("/api/foods").await;
    assert_eq!(resp.status, StatusCode::OK);
    let listed = names(&resp.body);
    assert!(listed.contains(&"Smash Burger"));
    assert!(listed.contains(&"Tomato Soup"));
    assert!(!listed.contains(&"Winter Stew"));

    let resp = client.get("/api/foods?category=Burgers").await;
    assert_eq!(names(&resp.body), vec!["Smash Burger"]);

    let resp = client.get("/api/foods?search=soup").await;
    assert_eq!(names(&resp.body), vec!["Tomato Soup"]);

    let resp = client.get(&format!("/api/foods/{}", burger.id)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["price"], 1150);

    let resp = client.get(&format!("/api/foods/{}", hidden.id)).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = client.get("/api/categories").await;
    let categories = resp.body.as_array().unwrap();
    assert!(categories.contains(&json!("Burgers")));
    assert!(categories.contains(&json!("Mains")));
}

// ============================================================================
// Cart
// ============================================================================

#[tokio::test]
async fn test_cart_requires_sign_in() {
    let app = TestApp::new().await;
    let resp = app.client().get("/api/cart").await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert!(resp.body["error"].is_string());
}

#[tokio::test]
async fn test_cart_merges_updates_and_removes_lines() {
    let app = TestApp::new().await;
    let pizza = app.add_food("Margherita", "Pizza", 1200, true).await;
    let cola = app.add_food("Cola", "Drinks", 250, true).await;
    let mut client = app.signed_in("hungry@example.com", UserRole::Customer).await;

    client
        .post("/api/cart", &json!({ "food_item_id": pizza.id, "quantity": 1 }))
        .await;
    let resp = client
        .post("/api/cart", &json!({ "food_item_id": pizza.id, "quantity": 2 }))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["lines"].as_array().unwrap().len(), 1);
    assert_eq!(resp.body["lines"][0]["quantity"], 3);
    assert_eq!(resp.body["total"], 3600);

    // Quantity defaults to one
    let resp = client
        .post("/api/cart", &json!({ "food_item_id": cola.id }))
        .await;
    assert_eq!(resp.body["item_count"], 4);
    assert_eq!(resp.body["total"], 3850);

    let resp = client
        .patch(&format!("/api/cart/{}", cola.id), &json!({ "quantity": 4 }))
        .await;
    assert_eq!(resp.body["total"], 4600);

    let resp = client.delete(&format!("/api/cart/{}", pizza.id)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["item_count"], 4);
    assert_eq!(resp.body["total"], 1000);

    let resp = client.delete(&format!("/api/cart/{}", pizza.id)).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = client.delete("/api/cart").await;
    assert_eq!(resp.body["removed"], 1);
    let resp = client.get("/api/cart").await;
    assert_eq!(resp.body["item_count"], 0);
    assert_eq!(resp.body["total"], 0);
}

#[tokio::test]
async fn test_cart_rejects_bad_quantities_and_hidden_items() {
    let app = TestApp::new().await;
    let fries = app.add_food("Fries", "Sides", 400, true).await;
    let gone = app.add_food("Seasonal Pie", "Desserts", 550, false).await;
    let mut client = app.signed_in("greedy@example.com", UserRole::Customer).await;

    let resp = client
        .post("/api/cart", &json!({ "food_item_id": fries.id, "quantity": 0 }))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    client
        .post("/api/cart", &json!({ "food_item_id": fries.id, "quantity": 98 }))
        .await;
    let resp = client
        .post("/api/cart", &json!({ "food_item_id": fries.id, "quantity": 2 }))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = client
        .post("/api/cart", &json!({ "food_item_id": gone.id }))
        .await;
    assert_eq!(resp.status, StatusCode::CONFLICT);

    let resp = client
        .post("/api/cart", &json!({ "food_item_id": 9999 }))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Checkout & Orders
// ============================================================================

#[tokio::test]
async fn test_checkout_places_order_and_clears_cart() {
    let app = TestApp::new().await;
    let wrap = app.add_food("Falafel Wrap", "Wraps", 895, true).await;
    let mut client = app.signed_in("diner@example.com", UserRole::Customer).await;

    client
        .post("/api/cart", &json!({ "food_item_id": wrap.id, "quantity": 2 }))
        .await;
    let resp = client
        .post(
            "/api/orders/checkout",
            &json!({ "delivery_address": "12 Market Street", "notes": "Ring twice" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["status"], "pending");
    assert_eq!(resp.body["total"], 1790);
    assert_eq!(resp.body["delivery_address"], "12 Market Street");
    assert_eq!(resp.body["notes"], "Ring twice");
    assert_eq!(resp.body["items"][0]["item_name"], "Falafel Wrap");
    assert_eq!(resp.body["items"][0]["unit_price"], 895);
    let order_id = resp.body["id"].as_i64().unwrap();

    let resp = client.get("/api/cart").await;
    assert_eq!(resp.body["item_count"], 0);

    let subject = format!("Your Crave order #{order_id} is confirmed");
    assert!(app.subjects_for("diner@example.com").contains(&subject));

    let resp = client.get(&format!("/api/orders/{order_id}")).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["items"].as_array().unwrap().len(), 1);

    let resp = client.get("/api/orders").await;
    assert_eq!(resp.body.as_array().unwrap().len(), 1);
    assert_eq!(resp.body[0]["id"], order_id);
}

#[tokio::test]
async fn test_checkout_uses_profile_address_when_omitted() {
    let app = TestApp::new().await;
    let salad = app.add_food("Greek Salad", "Salads", 780, true).await;
    let mut client = app.signed_in("regular@example.com", UserRole::Customer).await;

    client
        .post("/api/cart", &json!({ "food_item_id": salad.id }))
        .await;

    // No address anywhere yet
    let resp = client.post("/api/orders/checkout", &json!({})).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = client
        .patch(
            "/api/account/profile",
            &json!({ "address": "4 Harbour Lane", "phone": "+44 20 7946 0000" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["address"], "4 Harbour Lane");

    let resp = client.post("/api/orders/checkout", &json!({})).await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["delivery_address"], "4 Harbour Lane");

    // A blank address counts as no address
    client
        .post("/api/cart", &json!({ "food_item_id": salad.id }))
        .await;
    let resp = client
        .post(
            "/api/orders/checkout",
            &json!({ "delivery_address": "   " }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["delivery_address"], "4 Harbour Lane");
}

#[tokio::test]
async fn test_checkout_refuses_empty_cart_and_unavailable_items() {
    let app = TestApp::new().await;
    let special = app.add_food("Daily Special", "Mains", 1300, true).await;
    let mut client = app.signed_in("late@example.com", UserRole::Customer).await;
    let address = json!({ "delivery_address": "1 High Street" });

    let resp = client.post("/api/orders/checkout", &address).await;
    assert_eq!(resp.status, StatusCode::CONFLICT);

    client
        .post("/api/cart", &json!({ "food_item_id": special.id }))
        .await;
    let mut admin = app.signed_in("kitchen@example.com", UserRole::Admin).await;
    let resp = admin
        .post(
            &format!("/api/admin/foods/{}/availability", special.id),
            &json!({ "is_available": false }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = client.post("/api/orders/checkout", &address).await;
    assert_eq!(resp.status, StatusCode::CONFLICT);

    // The cart is left alone so the customer can fix it
    let resp = client.get("/api/cart").await;
    assert_eq!(resp.body["lines"][0]["is_available"], false);
}

#[tokio::test]
async fn test_cancel_only_while_pending() {
    let app = TestApp::new().await;
    let ramen = app.add_food("Tonkotsu Ramen", "Noodles", 1450, true).await;
    let mut client = app.signed_in("fickle@example.com", UserRole::Customer).await;

    client
        .post("/api/cart", &json!({ "food_item_id": ramen.id }))
        .await;
    let resp = client
        .post(
            "/api/orders/checkout",
            &json!({ "delivery_address": "9 Canal Row" }),
        )
        .await;
    let order_id = resp.body["id"].as_i64().unwrap();

    let resp = client
        .post(&format!("/api/orders/{order_id}/cancel"), &json!({}))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["status"], "cancelled");

    let resp = client
        .post(&format!("/api/orders/{order_id}/cancel"), &json!({}))
        .await;
    assert_eq!(resp.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_orders_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let curry = app.add_food("Green Curry", "Mains", 1250, true).await;
    let mut owner = app.signed_in("owner@example.com", UserRole::Customer).await;
    let mut other = app.signed_in("nosy@example.com", UserRole::Customer).await;

    owner
        .post("/api/cart", &json!({ "food_item_id": curry.id }))
        .await;
    let resp = owner
        .post(
            "/api/orders/checkout",
            &json!({ "delivery_address": "22 Elm Road" }),
        )
        .await;
    let order_id = resp.body["id"].as_i64().unwrap();

    let resp = other.get(&format!("/api/orders/{order_id}")).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    let resp = other
        .post(&format!("/api/orders/{order_id}/cancel"), &json!({}))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    let resp = other.get("/api/orders").await;
    assert_eq!(resp.body, json!([]));

    // Administrators see everything
    let mut admin = app.signed_in("manager@example.com", UserRole::Admin).await;
    let resp = admin.get(&format!("/api/orders/{order_id}")).await;
    assert_eq!(resp.status, StatusCode::OK);
}
