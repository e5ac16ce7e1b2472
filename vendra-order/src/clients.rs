use async_trait::async_trait;
use std::time::Duration;
use tonic::transport::Channel;
use uuid::Uuid;
use vendra_core::clients::{
    CartClient, CartLine, InventoryClient, StockCheck, StockUpdateItem, StockUpdateStatus,
};
use vendra_core::{CoreError, CoreResult};

pub mod marketplace {
    tonic::include_proto!("marketplace");
}

use marketplace::cart_service_client::CartServiceClient;
use marketplace::inventory_service_client::InventoryServiceClient;
use marketplace::{CheckStockRequest, GetCartItemsRequest, UpdateStockRequest};

/// gRPC facade over the inventory service. Every call is bounded by the
/// configured deadline so a stalled catalog service cannot stall the
/// order state machine.
pub struct GrpcInventoryClient {
    client: InventoryServiceClient<Channel>,
    timeout: Duration,
}

impl GrpcInventoryClient {
    pub async fn connect(endpoint: String, timeout: Duration) -> CoreResult<Self> {
        let client = InventoryServiceClient::connect(endpoint)
            .await
            .map_err(|e| CoreError::Unavailable(format!("inventory connect: {}", e)))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl InventoryClient for GrpcInventoryClient {
    async fn check_stock(&self, product_id: Uuid, quantity: u32) -> CoreResult<StockCheck> {
        let mut client = self.client.clone();
        let request = tonic::Request::new(CheckStockRequest {
            product_id: product_id.to_string(),
            quantity,
        });

        let response = tokio::time::timeout(self.timeout, client.check_stock(request))
            .await
            .map_err(|_| CoreError::Unavailable("inventory check_stock deadline exceeded".into()))?
            .map_err(|e| CoreError::Unavailable(format!("inventory check_stock: {}", e)))?
            .into_inner();

        Ok(StockCheck {
            in_stock: response.in_stock,
            available_qty: response.available_qty,
            reservation_token: if response.reservation_token.is_empty() {
                None
            } else {
                Some(response.reservation_token)
            },
        })
    }

    async fn update_stock(&self, items: &[StockUpdateItem]) -> CoreResult<Vec<StockUpdateStatus>> {
        let mut client = self.client.clone();
        let request = tonic::Request::new(UpdateStockRequest {
            items: items
                .iter()
                .map(|item| marketplace::StockUpdateItem {
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                    reservation_token: item.reservation_token.clone().unwrap_or_default(),
                })
                .collect(),
        });

        let response = tokio::time::timeout(self.timeout, client.update_stock(request))
            .await
            .map_err(|_| CoreError::Unavailable("inventory update_stock deadline exceeded".into()))?
            .map_err(|e| CoreError::Unavailable(format!("inventory update_stock: {}", e)))?
            .into_inner();

        response
            .items
            .into_iter()
            .map(|item| {
                let product_id = Uuid::parse_str(&item.product_id).map_err(|_| {
                    CoreError::Unavailable("inventory returned malformed product id".into())
                })?;
                Ok(StockUpdateStatus {
                    product_id,
                    updated: item.updated,
                    message: if item.message.is_empty() {
                        None
                    } else {
                        Some(item.message)
                    },
                })
            })
            .collect()
    }
}

/// gRPC facade over the cart service.
pub struct GrpcCartClient {
    client: CartServiceClient<Channel>,
    timeout: Duration,
}

impl GrpcCartClient {
    pub async fn connect(endpoint: String, timeout: Duration) -> CoreResult<Self> {
        let client = CartServiceClient::connect(endpoint)
            .await
            .map_err(|e| CoreError::Unavailable(format!("cart connect: {}", e)))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl CartClient for GrpcCartClient {
    async fn get_cart_items(&self, buyer_id: Uuid) -> CoreResult<Vec<CartLine>> {
        let mut client = self.client.clone();
        let request = tonic::Request::new(GetCartItemsRequest {
            buyer_id: buyer_id.to_string(),
        });

        let response = tokio::time::timeout(self.timeout, client.get_cart_items(request))
            .await
            .map_err(|_| CoreError::Unavailable("cart get_cart_items deadline exceeded".into()))?
            .map_err(|e| CoreError::Unavailable(format!("cart get_cart_items: {}", e)))?
            .into_inner();

        response
            .items
            .into_iter()
            .map(|line| {
                let product_id = Uuid::parse_str(&line.product_id).map_err(|_| {
                    CoreError::Unavailable("cart returned malformed product id".into())
                })?;
                let vendor_id = Uuid::parse_str(&line.vendor_id).map_err(|_| {
                    CoreError::Unavailable("cart returned malformed vendor id".into())
                })?;
                Ok(CartLine {
                    product_id,
                    vendor_id,
                    product_name: line.product_name,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
            })
            .collect()
    }
}
