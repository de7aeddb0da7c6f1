//! HTTP implementations of the services' RPC client traits.
//!
//! Every call forwards the caller's identity and correlation id, is bounded
//! by the configured timeout, and is counted in `rpc_requests_total`.

use std::time::Duration;

use async_trait::async_trait;
use common::context::CORRELATION_ID_HEADER;
use common::identity::{USER_ID_HEADER, USER_ROLES_HEADER};
use common::{DeliveryId, OrderId, ProductId, RequestContext, RpcError, UserId};
use delivery::{OrderClient, OrderProjection, UserClient, UserProjection};
use order::{DeliveryClient, DeliveryProjection, ProductClient, ProductProjection};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::extract::GATEWAY_TOKEN_HEADER;

/// A JSON-over-HTTP client for one upstream service.
#[derive(Debug, Clone)]
pub struct HttpRpcClient {
    target: &'static str,
    base_url: String,
    client: reqwest::Client,
    gateway_token: Option<String>,
}

impl HttpRpcClient {
    pub fn new(
        target: &'static str,
        base_url: impl Into<String>,
        timeout: Duration,
        gateway_token: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            target,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            gateway_token,
        })
    }

    /// Issues `GET {base_url}{path}` and decodes the JSON body.
    ///
    /// 404 maps to [`RpcError::NotFound`]; every other failure, including
    /// timeouts and undecodable bodies, maps to [`RpcError::Unavailable`].
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<T, RpcError> {
        let url = format!("{}{}", self.base_url, path);
        let result = self.send(ctx, &url).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(RpcError::NotFound(_)) => "not_found",
            Err(RpcError::Unavailable(_)) => "unavailable",
        };
        metrics::counter!("rpc_requests_total", "target" => self.target, "outcome" => outcome)
            .increment(1);
        if let Err(RpcError::Unavailable(reason)) = &result {
            tracing::warn!(
                target_service = self.target,
                %url,
                %reason,
                correlation_id = %ctx.correlation_id,
                "rpc call failed"
            );
        }

        result
    }

    async fn send<T: DeserializeOwned>(&self, ctx: &RequestContext, url: &str) -> Result<T, RpcError> {
        let mut request = self
            .client
            .get(url)
            .header(USER_ID_HEADER, ctx.identity.user_id().as_str())
            .header(USER_ROLES_HEADER, ctx.identity.roles_header())
            .header(CORRELATION_ID_HEADER, ctx.correlation_id.to_string());
        if let Some(token) = &self.gateway_token {
            request = request.header(GATEWAY_TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RpcError::Unavailable(describe(&e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(RpcError::NotFound(url.to_string())),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| RpcError::Unavailable(format!("invalid response body: {e}"))),
            status => Err(RpcError::Unavailable(format!("{} returned {status}", self.target))),
        }
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

/// Order service client used by the delivery service.
#[derive(Debug, Clone)]
pub struct HttpOrderClient(pub HttpRpcClient);

#[async_trait]
impl OrderClient for HttpOrderClient {
    async fn get_order(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
    ) -> Result<OrderProjection, RpcError> {
        self.0.get_json(ctx, &format!("/orders/{order_id}")).await
    }
}

/// User service client used by the delivery service.
#[derive(Debug, Clone)]
pub struct HttpUserClient(pub HttpRpcClient);

#[async_trait]
impl UserClient for HttpUserClient {
    async fn get_user(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
    ) -> Result<UserProjection, RpcError> {
        self.0.get_json(ctx, &format!("/users/{user_id}")).await
    }
}

/// Product service client used by the order service.
#[derive(Debug, Clone)]
pub struct HttpProductClient(pub HttpRpcClient);

#[async_trait]
impl ProductClient for HttpProductClient {
    async fn get_product(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
    ) -> Result<ProductProjection, RpcError> {
        self.0.get_json(ctx, &format!("/products/{product_id}")).await
    }
}

/// Delivery service client used by the order service.
#[derive(Debug, Clone)]
pub struct HttpDeliveryClient(pub HttpRpcClient);

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn get_delivery(
        &self,
        ctx: &RequestContext,
        delivery_id: DeliveryId,
    ) -> Result<DeliveryProjection, RpcError> {
        self.0
            .get_json(ctx, &format!("/deliveries/{delivery_id}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::HeaderMap;
    use axum::routing::get;
    use common::{Identity, Money, Role};

    async fn serve(router: Router) -> HttpRpcClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        HttpRpcClient::new(
            "test-upstream",
            format!("http://{addr}"),
            Duration::from_secs(2),
            None,
        )
        .unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Identity::new("u-1", [Role::User]))
    }

    #[tokio::test]
    async fn test_product_service_response_is_decoded() {
        let router = Router::new().route(
            "/products/{id}",
            get(|Path(id): Path<i64>| async move {
                axum::Json(serde_json::json!({
                    "productId": id,
                    "productName": "kettle",
                    "productDescription": "1.7 litre",
                    "productPrice": 19.99,
                    "stock": 4
                }))
            }),
        );
        let products = HttpProductClient(serve(router).await);

        let product = products.get_product(&ctx(), ProductId::new(1)).await.unwrap();
        assert_eq!(product.product_id, ProductId::new(1));
        assert_eq!(product.name.as_deref(), Some("kettle"));
        assert_eq!(product.price, Money::from_cents(1999));
    }

    #[tokio::test]
    async fn test_order_service_response_is_decoded_with_forwarded_identity() {
        let router = Router::new().route(
            "/orders/{id}",
            get(|Path(id): Path<i64>, headers: HeaderMap| async move {
                let user_id = headers
                    .get(USER_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                axum::Json(serde_json::json!({
                    "orderId": id,
                    "userId": user_id,
                    "orderAmount": 39.98,
                    "orderStatus": "PENDING",
                    "isPaid": false
                }))
            }),
        );
        let orders = HttpOrderClient(serve(router).await);

        let order = orders.get_order(&ctx(), OrderId::new(100)).await.unwrap();
        assert_eq!(order.order_id, OrderId::new(100));
        assert_eq!(order.user_id.as_str(), "u-1");
        assert_eq!(order.status, "PENDING");
        assert_eq!(order.amount, Money::from_cents(3998));
    }

    #[tokio::test]
    async fn test_missing_route_maps_to_not_found() {
        let users = HttpUserClient(serve(Router::new()).await);

        let result = users.get_user(&ctx(), &UserId::new("u-1")).await;
        assert!(matches!(result, Err(RpcError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let client = HttpRpcClient::new(
            "product-service",
            "http://127.0.0.1:9",
            Duration::from_millis(200),
            None,
        )
        .unwrap();
        let result: Result<ProductProjection, RpcError> = client.get_json(&ctx(), "/products/1").await;
        assert!(matches!(result, Err(RpcError::Unavailable(_))));
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = HttpRpcClient::new(
            "order-service",
            "http://localhost:3000/",
            Duration::from_secs(1),
            None,
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:3000");
    }
}
